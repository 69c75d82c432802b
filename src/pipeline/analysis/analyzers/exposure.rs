use super::{coverage, sample_step, CONFIDENCE_THRESHOLD_KEY};
use crate::common::AnalyzerSettings;
use crate::pipeline::analysis::core::{gate_confidence, AnalysisFrame, Analyzer, AnalyzerOutput};
use crate::pipeline::domain::{
    AnalysisResult, AnalyzerType, Suggestion, SuggestionKind, SuggestionPriority,
};

const HIGHLIGHT_LEVEL: usize = 250;
const SHADOW_LEVEL: usize = 5;

/// Histogram-based exposure check on the luma plane.
pub struct ExposureAnalyzer {
    confidence_threshold: f32,
    /// Share of clipped pixels that triggers a warning.
    clip_limit: f32,
    bright_mean: f32,
    dark_mean: f32,
    target_samples: u32,
}

#[derive(Debug, Clone, Copy)]
struct Histogram {
    mean: f32,
    highlights: f32,
    shadows: f32,
    samples: u64,
}

impl ExposureAnalyzer {
    pub fn new() -> Self {
        Self {
            confidence_threshold: 0.3,
            clip_limit: 0.05,
            bright_mean: 0.72,
            dark_mean: 0.22,
            target_samples: 8_192,
        }
    }

    fn histogram(&self, frame: &AnalysisFrame) -> Option<Histogram> {
        let (width, height) = frame.dimensions;
        if width == 0 || height == 0 {
            return None;
        }
        let step = sample_step(width, height, self.target_samples) as usize;

        let mut bins = [0u64; 256];
        let mut samples = 0u64;
        for y in (0..height).step_by(step) {
            for x in (0..width).step_by(step) {
                bins[frame.luma.get_pixel(x, y).0[0] as usize] += 1;
                samples += 1;
            }
        }

        let total: u64 = bins.iter().enumerate().map(|(v, c)| v as u64 * c).sum();
        let highlights: u64 = bins[HIGHLIGHT_LEVEL..].iter().sum();
        let shadows: u64 = bins[..=SHADOW_LEVEL].iter().sum();

        Some(Histogram {
            mean: total as f32 / samples as f32 / 255.0,
            highlights: highlights as f32 / samples as f32,
            shadows: shadows as f32 / samples as f32,
            samples,
        })
    }
}

impl Analyzer for ExposureAnalyzer {
    fn analyzer_type(&self) -> AnalyzerType {
        AnalyzerType::Exposure
    }

    fn name(&self) -> &'static str {
        "ExposureAnalyzer"
    }

    fn configure(&mut self, settings: &AnalyzerSettings) {
        if let Some(threshold) = settings.unit_float(CONFIDENCE_THRESHOLD_KEY) {
            self.confidence_threshold = threshold;
        }
        if let Some(limit) = settings.unit_float("clip_limit") {
            self.clip_limit = limit;
        }
        if let Some(bright) = settings.unit_float("bright_mean") {
            self.bright_mean = bright;
        }
        if let Some(dark) = settings.unit_float("dark_mean") {
            self.dark_mean = dark;
        }
    }

    fn analyze(&self, frame: &AnalysisFrame) -> AnalyzerOutput {
        let Some(histogram) = self.histogram(frame) else {
            return Ok(None);
        };

        let overexposed =
            histogram.highlights > self.clip_limit || histogram.mean > self.bright_mean;
        let underexposed = histogram.shadows > self.clip_limit || histogram.mean < self.dark_mean;

        // How far the mean sits from mid-grey, 0 at 0.5 and 1 at either end.
        let bias = (histogram.mean - 0.5) * 2.0;
        let clarity = if overexposed || underexposed {
            bias.abs().max(histogram.highlights.max(histogram.shadows))
        } else {
            1.0 - bias.abs()
        };
        let confidence =
            coverage(histogram.samples, self.target_samples) * (0.6 + 0.4 * clarity.min(1.0));

        let mut result = AnalysisResult::new(AnalyzerType::Exposure, confidence)
            .with_value("mean_brightness", histogram.mean)
            .with_value("clipped_highlights", histogram.highlights)
            .with_value("crushed_shadows", histogram.shadows)
            .with_value("exposure_bias", bias);

        if overexposed && !underexposed {
            let priority = if histogram.highlights > self.clip_limit * 5.0 {
                SuggestionPriority::Critical
            } else {
                SuggestionPriority::High
            };
            result = result.with_suggestion(Suggestion::new(
                SuggestionKind::ReduceExposure,
                priority,
                "Highlights are blown out",
                "Lower the exposure compensation or tap a bright area to meter from it.",
                confidence,
            ));
        } else if underexposed && !overexposed {
            let priority = if histogram.shadows > self.clip_limit * 5.0 {
                SuggestionPriority::Critical
            } else {
                SuggestionPriority::High
            };
            result = result.with_suggestion(Suggestion::new(
                SuggestionKind::IncreaseExposure,
                priority,
                "Scene is too dark",
                "Raise the exposure compensation or add light to the scene.",
                confidence,
            ));
        } else if overexposed && underexposed {
            result = result.with_suggestion(Suggestion::new(
                SuggestionKind::ImproveLighting,
                SuggestionPriority::Medium,
                "Scene exceeds dynamic range",
                "Both highlights and shadows are clipping; try HDR or soften the light.",
                confidence,
            ));
        }

        Ok(gate_confidence(result, self.confidence_threshold))
    }
}

impl Default for ExposureAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
