use super::{coverage, gradient, sample_step, CONFIDENCE_THRESHOLD_KEY};
use crate::common::AnalyzerSettings;
use crate::pipeline::analysis::core::{gate_confidence, AnalysisFrame, Analyzer, AnalyzerOutput};
use crate::pipeline::domain::{
    AnalysisResult, AnalysisValue, AnalyzerType, Suggestion, SuggestionKind, SuggestionPriority,
};

const THIRDS: [f32; 2] = [1.0 / 3.0, 2.0 / 3.0];

/// Where the visual weight sits: edge-energy centroid against the thirds grid.
pub struct CompositionAnalyzer {
    confidence_threshold: f32,
    center_tolerance: f32,
    thirds_tolerance: f32,
    /// Left-side share of energy outside `[min_balance, 1 - min_balance]` is lopsided.
    min_balance: f32,
    target_samples: u32,
}

#[derive(Debug, Clone, Copy)]
struct EnergyMap {
    centroid: (f32, f32),
    left_share: f32,
    mean_energy: f32,
    samples: u64,
}

impl CompositionAnalyzer {
    pub fn new() -> Self {
        Self {
            confidence_threshold: 0.3,
            center_tolerance: 0.08,
            thirds_tolerance: 0.12,
            min_balance: 0.25,
            target_samples: 4_096,
        }
    }

    fn energy_map(&self, frame: &AnalysisFrame) -> Option<EnergyMap> {
        let (width, height) = frame.dimensions;
        if width < 2 || height < 2 {
            return None;
        }
        let step = sample_step(width - 1, height - 1, self.target_samples) as usize;
        let half = width / 2;

        let mut total = 0u64;
        let mut left = 0u64;
        let mut weighted_x = 0u64;
        let mut weighted_y = 0u64;
        let mut samples = 0u64;
        for y in (0..height - 1).step_by(step) {
            for x in (0..width - 1).step_by(step) {
                let energy = gradient(&frame.luma, x, y) as u64;
                total += energy;
                weighted_x += energy * x as u64;
                weighted_y += energy * y as u64;
                if x < half {
                    left += energy;
                }
                samples += 1;
            }
        }

        if total == 0 {
            return None;
        }

        Some(EnergyMap {
            centroid: (
                weighted_x as f32 / total as f32 / width as f32,
                weighted_y as f32 / total as f32 / height as f32,
            ),
            left_share: left as f32 / total as f32,
            mean_energy: total as f32 / samples as f32,
            samples,
        })
    }
}

fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

fn thirds_distance(point: (f32, f32)) -> f32 {
    THIRDS
        .iter()
        .flat_map(|x| THIRDS.iter().map(move |y| distance(point, (*x, *y))))
        .fold(f32::MAX, f32::min)
}

impl Analyzer for CompositionAnalyzer {
    fn analyzer_type(&self) -> AnalyzerType {
        AnalyzerType::Composition
    }

    fn name(&self) -> &'static str {
        "CompositionAnalyzer"
    }

    fn configure(&mut self, settings: &AnalyzerSettings) {
        if let Some(threshold) = settings.unit_float(CONFIDENCE_THRESHOLD_KEY) {
            self.confidence_threshold = threshold;
        }
        if let Some(tolerance) = settings.unit_float("center_tolerance") {
            self.center_tolerance = tolerance;
        }
        if let Some(tolerance) = settings.unit_float("thirds_tolerance") {
            self.thirds_tolerance = tolerance;
        }
        if let Some(balance) = settings.unit_float("min_balance") {
            self.min_balance = balance.min(0.5);
        }
    }

    fn analyze(&self, frame: &AnalysisFrame) -> AnalyzerOutput {
        // Featureless frames have no weight to place.
        let Some(map) = self.energy_map(frame) else {
            return Ok(None);
        };

        let to_center = distance(map.centroid, (0.5, 0.5));
        let to_thirds = thirds_distance(map.centroid);
        let texture = (map.mean_energy / 32.0).min(1.0);
        let confidence = coverage(map.samples, self.target_samples) * (0.5 + 0.5 * texture);

        let mut result = AnalysisResult::new(AnalyzerType::Composition, confidence)
            .with_value(
                "visual_centroid",
                AnalysisValue::Point {
                    x: map.centroid.0,
                    y: map.centroid.1,
                },
            )
            .with_value("thirds_distance", to_thirds)
            .with_value("left_balance", map.left_share)
            .with_value("on_thirds", to_thirds <= self.thirds_tolerance);

        if to_center < self.center_tolerance {
            result = result.with_suggestion(Suggestion::new(
                SuggestionKind::RuleOfThirds,
                SuggestionPriority::Low,
                "Subject is dead center",
                "Shift the frame so the subject sits on one of the thirds lines.",
                confidence,
            ));
        } else if to_thirds > self.thirds_tolerance {
            result = result.with_suggestion(Suggestion::new(
                SuggestionKind::RuleOfThirds,
                SuggestionPriority::Low,
                "Align with the thirds grid",
                "Place the main point of interest where the grid lines cross.",
                confidence * 0.8,
            ));
        }

        if map.left_share < self.min_balance || map.left_share > 1.0 - self.min_balance {
            result = result.with_suggestion(Suggestion::new(
                SuggestionKind::BalanceFrame,
                SuggestionPriority::Low,
                "Frame feels lopsided",
                "Include something on the emptier side or recenter the shot.",
                confidence * 0.7,
            ));
        }

        Ok(gate_confidence(result, self.confidence_threshold))
    }
}

impl Default for CompositionAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::analysis::analyzers::test_support::{solid_frame, square_frame};

    fn analyze(frame: &AnalysisFrame) -> AnalysisResult {
        CompositionAnalyzer::new().analyze(frame).unwrap().unwrap()
    }

    #[test]
    fn centered_subject_suggests_thirds() {
        let result = analyze(&square_frame(90, 90, 40, 40, 10));
        assert!(result
            .suggestions
            .iter()
            .any(|s| s.title == "Subject is dead center"));
    }

    #[test]
    fn thirds_placement_is_recognised() {
        let result = analyze(&square_frame(90, 90, 25, 25, 10));
        assert!(result.number("thirds_distance").unwrap() < 0.05);
        assert!(result
            .suggestions
            .iter()
            .all(|s| s.kind != SuggestionKind::RuleOfThirds));
        // All the weight is on the left half.
        assert!(result
            .suggestions
            .iter()
            .any(|s| s.kind == SuggestionKind::BalanceFrame));
    }

    #[test]
    fn featureless_frame_has_no_result() {
        let analyzer = CompositionAnalyzer::new();
        assert_eq!(analyzer.analyze(&solid_frame(64, 64, [10, 200, 10])).unwrap(), None);
    }
}
