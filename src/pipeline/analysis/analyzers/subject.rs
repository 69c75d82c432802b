use super::{coverage, edge_energy_grid, sample_step, CONFIDENCE_THRESHOLD_KEY};
use crate::common::AnalyzerSettings;
use crate::pipeline::analysis::core::{
    gate_confidence, AnalysisFrame, Analyzer, AnalyzerOutput, ImageRegion,
};
use crate::pipeline::domain::{
    AnalysisResult, AnalysisValue, AnalyzerType, Suggestion, SuggestionKind, SuggestionPriority,
};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Finds the dominant detail-dense region of the frame and optionally tracks it.
pub struct SubjectAnalyzer {
    confidence_threshold: f32,
    grid_size: u32,
    max_tracked_objects: usize,
    tracking_enabled: bool,
    history_size: usize,
    min_subject_size: f32,
    min_dominance: f32,
    target_samples: u32,
    tracked: Mutex<VecDeque<(f32, f32)>>,
}

impl SubjectAnalyzer {
    pub fn new() -> Self {
        Self {
            confidence_threshold: 0.3,
            grid_size: 4,
            max_tracked_objects: 3,
            tracking_enabled: true,
            history_size: 10,
            min_subject_size: 0.1,
            min_dominance: 0.15,
            target_samples: 4_096,
            tracked: Mutex::new(VecDeque::new()),
        }
    }

    /// Record the subject position and return how far it moved since the last frame.
    fn track(&self, center: (f32, f32)) -> Option<f32> {
        let mut tracked = self.tracked.lock().unwrap_or_else(PoisonError::into_inner);
        let movement = tracked
            .back()
            .map(|last| ((center.0 - last.0).powi(2) + (center.1 - last.1).powi(2)).sqrt());
        tracked.push_back(center);
        while tracked.len() > self.history_size {
            tracked.pop_front();
        }
        movement
    }

    pub fn tracked_positions(&self) -> Vec<(f32, f32)> {
        self.tracked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }
}

impl Analyzer for SubjectAnalyzer {
    fn analyzer_type(&self) -> AnalyzerType {
        AnalyzerType::Subject
    }

    fn name(&self) -> &'static str {
        "SubjectAnalyzer"
    }

    fn configure(&mut self, settings: &AnalyzerSettings) {
        if let Some(threshold) = settings.unit_float(CONFIDENCE_THRESHOLD_KEY) {
            self.confidence_threshold = threshold;
        }
        if let Some(max) = settings.count("max_tracked_objects") {
            self.max_tracked_objects = max;
        }
        if let Some(enabled) = settings.bool("tracking_enabled") {
            self.tracking_enabled = enabled;
        }
        if let Some(size) = settings.count("history_size") {
            self.history_size = size;
        }
        if let Some(grid) = settings.count("grid_size") {
            self.grid_size = (grid as u32).clamp(2, 16);
        }
        if let Some(size) = settings.unit_float("min_subject_size") {
            self.min_subject_size = size;
        }
    }

    fn analyze(&self, frame: &AnalysisFrame) -> AnalyzerOutput {
        let (width, height) = frame.dimensions;
        let grid = self.grid_size;
        if width < grid * 2 || height < grid * 2 {
            return Ok(None);
        }

        let step = sample_step(width - 1, height - 1, self.target_samples);
        let cells = edge_energy_grid(&frame.luma, grid, grid, step);
        let total: u64 = cells.iter().sum();
        if total == 0 {
            return Ok(None);
        }

        let mut ranked: Vec<(usize, u64)> = cells.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        let (dominant_index, dominant_energy) = ranked[0];

        let cutoff = dominant_energy / 2;
        let strong_cells = ranked.iter().filter(|(_, e)| *e >= cutoff.max(1)).count();
        let subject_size = strong_cells as f32 / cells.len() as f32;
        let dominance = dominant_energy as f32 / total as f32;

        let cell_center = |index: usize| {
            let col = index as u32 % grid;
            let row = index as u32 / grid;
            ImageRegion::grid_cell(width, height, grid, grid, col, row)
                .normalized_center(width, height)
        };
        let center = cell_center(dominant_index);
        let candidates: Vec<(f32, f32)> = ranked
            .iter()
            .filter(|(_, e)| *e >= cutoff.max(1))
            .take(self.max_tracked_objects)
            .map(|(i, _)| cell_center(*i))
            .collect();

        let samples = ((width - 1) / step) as u64 * ((height - 1) / step) as u64;
        let confidence =
            coverage(samples, self.target_samples) * (0.4 + 0.6 * dominance.min(1.0));

        let mut result = AnalysisResult::new(AnalyzerType::Subject, confidence)
            .with_value(
                "subject_center",
                AnalysisValue::Point {
                    x: center.0,
                    y: center.1,
                },
            )
            .with_value("subject_size", subject_size)
            .with_value("dominance", dominance)
            .with_value("candidates", candidates.len() as f64);

        if self.tracking_enabled {
            if let Some(movement) = self.track(center) {
                result = result.with_value("movement", movement);
            }
        }

        if subject_size < self.min_subject_size {
            result = result.with_suggestion(Suggestion::new(
                SuggestionKind::MoveCloser,
                SuggestionPriority::Medium,
                "Subject is small in frame",
                "Step closer or zoom in so the subject fills more of the frame.",
                confidence,
            ));
        }
        if dominance < self.min_dominance {
            result = result.with_suggestion(Suggestion::new(
                SuggestionKind::IsolateSubject,
                SuggestionPriority::Low,
                "Busy background",
                "Simplify the background or use a wider aperture to isolate the subject.",
                confidence,
            ));
        }

        Ok(gate_confidence(result, self.confidence_threshold))
    }
}

impl Default for SubjectAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::SettingValue;
    use crate::pipeline::analysis::analyzers::test_support::{
        checkerboard_frame, solid_frame, square_frame,
    };

    #[test]
    fn small_square_is_a_small_dominant_subject() {
        let analyzer = SubjectAnalyzer::new();
        let result = analyzer
            .analyze(&square_frame(96, 96, 30, 30, 12))
            .unwrap()
            .unwrap();

        assert!(result.number("dominance").unwrap() > 0.9);
        assert_eq!(
            result.data.get("subject_center"),
            Some(&AnalysisValue::Point { x: 0.375, y: 0.375 })
        );
        assert!(result
            .suggestions
            .iter()
            .any(|s| s.kind == SuggestionKind::MoveCloser));
    }

    #[test]
    fn uniform_texture_is_a_busy_background() {
        let result = SubjectAnalyzer::new()
            .analyze(&checkerboard_frame(96, 96, 3))
            .unwrap()
            .unwrap();
        assert!(result
            .suggestions
            .iter()
            .any(|s| s.kind == SuggestionKind::IsolateSubject));
    }

    #[test]
    fn tracking_reports_movement_between_frames() {
        let analyzer = SubjectAnalyzer::new();
        analyzer.analyze(&square_frame(96, 96, 30, 30, 12)).unwrap();
        let result = analyzer
            .analyze(&square_frame(96, 96, 54, 54, 12))
            .unwrap()
            .unwrap();

        assert!(result.number("movement").unwrap() > 0.3);
        assert_eq!(analyzer.tracked_positions().len(), 2);
    }

    #[test]
    fn tracking_can_be_disabled_and_history_is_bounded() {
        let mut analyzer = SubjectAnalyzer::new();
        analyzer.configure(
            &AnalyzerSettings::new()
                .with("tracking_enabled", SettingValue::Bool(false))
                .with("max_tracked_objects", SettingValue::Int(1)),
        );
        let result = analyzer
            .analyze(&square_frame(96, 96, 30, 30, 12))
            .unwrap()
            .unwrap();
        assert!(result.number("movement").is_none());
        assert_eq!(result.number("candidates"), Some(1.0));
        assert!(analyzer.tracked_positions().is_empty());

        let mut analyzer = SubjectAnalyzer::new();
        analyzer.configure(&AnalyzerSettings::new().with("history_size", SettingValue::Int(2)));
        for _ in 0..5 {
            analyzer.analyze(&square_frame(96, 96, 30, 30, 12)).unwrap();
        }
        assert_eq!(analyzer.tracked_positions().len(), 2);
    }

    #[test]
    fn featureless_frame_has_no_subject() {
        let analyzer = SubjectAnalyzer::new();
        assert_eq!(analyzer.analyze(&solid_frame(96, 96, [50, 50, 50])).unwrap(), None);
    }
}
