use super::{coverage, sample_step, CONFIDENCE_THRESHOLD_KEY};
use crate::common::AnalyzerSettings;
use crate::pipeline::analysis::core::{gate_confidence, AnalysisFrame, Analyzer, AnalyzerOutput};
use crate::pipeline::domain::{
    AnalysisResult, AnalyzerType, Suggestion, SuggestionKind, SuggestionPriority,
};

/// Sharpness from the variance of the Laplacian over the luma plane.
pub struct FocusAnalyzer {
    confidence_threshold: f32,
    /// Laplacian variance that maps to a sharpness of 0.5.
    reference_variance: f64,
    soft_threshold: f32,
    target_samples: u32,
}

impl FocusAnalyzer {
    pub fn new() -> Self {
        Self {
            confidence_threshold: 0.3,
            reference_variance: 150.0,
            soft_threshold: 0.35,
            target_samples: 4_096,
        }
    }

    pub fn with_soft_threshold(mut self, threshold: f32) -> Self {
        self.soft_threshold = threshold.clamp(0.01, 0.99);
        self
    }

    fn laplacian_variance(&self, frame: &AnalysisFrame) -> Option<(f64, u64)> {
        let (width, height) = frame.dimensions;
        if width < 3 || height < 3 {
            return None;
        }
        let luma = &frame.luma;
        let step = sample_step(width - 2, height - 2, self.target_samples) as usize;

        let mut sum = 0.0f64;
        let mut sum_sq = 0.0f64;
        let mut samples = 0u64;
        for y in (1..height - 1).step_by(step) {
            for x in (1..width - 1).step_by(step) {
                let c = luma.get_pixel(x, y).0[0] as i32;
                let l = luma.get_pixel(x - 1, y).0[0] as i32;
                let r = luma.get_pixel(x + 1, y).0[0] as i32;
                let u = luma.get_pixel(x, y - 1).0[0] as i32;
                let d = luma.get_pixel(x, y + 1).0[0] as i32;
                let laplacian = (4 * c - l - r - u - d) as f64;
                sum += laplacian;
                sum_sq += laplacian * laplacian;
                samples += 1;
            }
        }

        let mean = sum / samples as f64;
        let variance = (sum_sq / samples as f64 - mean * mean).max(0.0);
        Some((variance, samples))
    }
}

impl Analyzer for FocusAnalyzer {
    fn analyzer_type(&self) -> AnalyzerType {
        AnalyzerType::Focus
    }

    fn name(&self) -> &'static str {
        "FocusAnalyzer"
    }

    fn configure(&mut self, settings: &AnalyzerSettings) {
        if let Some(threshold) = settings.unit_float(CONFIDENCE_THRESHOLD_KEY) {
            self.confidence_threshold = threshold;
        }
        if let Some(soft) = settings.unit_float("soft_threshold") {
            self.soft_threshold = soft.clamp(0.01, 0.99);
        }
        if let Some(reference) = settings.float("reference_variance").filter(|v| *v > 0.0) {
            self.reference_variance = reference;
        }
        if let Some(samples) = settings.count("target_samples") {
            self.target_samples = samples as u32;
        }
    }

    fn analyze(&self, frame: &AnalysisFrame) -> AnalyzerOutput {
        let Some((raw_variance, samples)) = self.laplacian_variance(frame) else {
            return Ok(None);
        };

        // Downsampling averages away fine detail; scale back so the verdict holds at every level.
        let variance = raw_variance * frame.downsample_factor as f64;
        let sharpness = (variance / (variance + self.reference_variance)) as f32;

        let soft = self.soft_threshold;
        let decisiveness = ((sharpness - soft).abs() / soft.max(1.0 - soft)).min(1.0);
        let confidence = coverage(samples, self.target_samples) * (0.55 + 0.45 * decisiveness);

        let mut result = AnalysisResult::new(AnalyzerType::Focus, confidence)
            .with_value("laplacian_variance", variance)
            .with_value("sharpness", sharpness)
            .with_value("in_focus", sharpness >= soft);

        if sharpness < soft {
            let priority = if sharpness < soft / 2.0 {
                SuggestionPriority::Critical
            } else {
                SuggestionPriority::High
            };
            result = result.with_suggestion(Suggestion::new(
                SuggestionKind::AdjustFocus,
                priority,
                "Image looks soft",
                "Tap on your subject to refocus before taking the shot.",
                confidence,
            ));
        }

        Ok(gate_confidence(result, self.confidence_threshold))
    }
}

impl Default for FocusAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
