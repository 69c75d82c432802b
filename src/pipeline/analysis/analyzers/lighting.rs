use super::{coverage, sample_step, CONFIDENCE_THRESHOLD_KEY};
use crate::common::AnalyzerSettings;
use crate::pipeline::analysis::core::{gate_confidence, AnalysisFrame, Analyzer, AnalyzerOutput};
use crate::pipeline::domain::{
    AnalysisResult, AnalyzerType, Suggestion, SuggestionKind, SuggestionPriority,
};

/// Contrast and colour-cast estimate from the RGB view.
pub struct LightingAnalyzer {
    confidence_threshold: f32,
    flat_contrast: f32,
    harsh_contrast: f32,
    cast_limit: f32,
    target_samples: u32,
}

impl LightingAnalyzer {
    pub fn new() -> Self {
        Self {
            confidence_threshold: 0.3,
            flat_contrast: 0.12,
            harsh_contrast: 0.45,
            cast_limit: 0.15,
            target_samples: 4_096,
        }
    }
}

impl Analyzer for LightingAnalyzer {
    fn analyzer_type(&self) -> AnalyzerType {
        AnalyzerType::Lighting
    }

    fn name(&self) -> &'static str {
        "LightingAnalyzer"
    }

    fn configure(&mut self, settings: &AnalyzerSettings) {
        if let Some(threshold) = settings.unit_float(CONFIDENCE_THRESHOLD_KEY) {
            self.confidence_threshold = threshold;
        }
        if let Some(flat) = settings.unit_float("flat_contrast") {
            self.flat_contrast = flat;
        }
        if let Some(harsh) = settings.unit_float("harsh_contrast") {
            self.harsh_contrast = harsh;
        }
        if let Some(cast) = settings.unit_float("cast_limit") {
            self.cast_limit = cast;
        }
    }

    fn analyze(&self, frame: &AnalysisFrame) -> AnalyzerOutput {
        let (width, height) = frame.dimensions;
        if width == 0 || height == 0 {
            return Ok(None);
        }
        let step = sample_step(width, height, self.target_samples) as usize;

        let mut luma_sum = 0.0f64;
        let mut luma_sq = 0.0f64;
        let mut red = 0u64;
        let mut blue = 0u64;
        let mut samples = 0u64;
        for y in (0..height).step_by(step) {
            for x in (0..width).step_by(step) {
                let [r, _, b] = frame.rgb.get_pixel(x, y).0;
                let l = frame.luma.get_pixel(x, y).0[0] as f64;
                luma_sum += l;
                luma_sq += l * l;
                red += r as u64;
                blue += b as u64;
                samples += 1;
            }
        }

        let n = samples as f64;
        let mean = luma_sum / n;
        let std_dev = (luma_sq / n - mean * mean).max(0.0).sqrt();
        // A std-dev of 128 is the two-tone maximum.
        let contrast = (std_dev / 128.0).min(1.0) as f32;
        let warmth = ((red as f64 - blue as f64) / n / 255.0) as f32;

        let confidence = coverage(samples, self.target_samples) * 0.85;
        let mut result = AnalysisResult::new(AnalyzerType::Lighting, confidence)
            .with_value("contrast", contrast)
            .with_value("warmth", warmth);

        if contrast < self.flat_contrast {
            result = result.with_suggestion(Suggestion::new(
                SuggestionKind::ImproveLighting,
                SuggestionPriority::Medium,
                "Light is flat",
                "Turn the subject toward a window or side light to add shape.",
                confidence,
            ));
        } else if contrast > self.harsh_contrast {
            result = result.with_suggestion(Suggestion::new(
                SuggestionKind::ImproveLighting,
                SuggestionPriority::Medium,
                "Light is harsh",
                "Move into open shade or diffuse the light source.",
                confidence,
            ));
        }

        if warmth.abs() > self.cast_limit {
            let (title, message) = if warmth > 0.0 {
                ("Warm colour cast", "Set a cooler white balance for neutral tones.")
            } else {
                ("Cool colour cast", "Set a warmer white balance for neutral tones.")
            };
            result = result.with_suggestion(
                Suggestion::new(
                    SuggestionKind::CorrectColorCast,
                    SuggestionPriority::Low,
                    title,
                    message,
                    confidence * warmth.abs().min(1.0),
                ),
            );
        }

        Ok(gate_confidence(result, self.confidence_threshold))
    }
}

impl Default for LightingAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
