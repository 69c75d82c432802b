use super::CONFIDENCE_THRESHOLD_KEY;
use crate::common::AnalyzerSettings;
use crate::pipeline::analysis::core::{gate_confidence, AnalysisFrame, Analyzer, AnalyzerOutput};
use crate::pipeline::domain::{
    AnalysisResult, AnalysisValue, AnalyzerType, Suggestion, SuggestionKind, SuggestionPriority,
};
use image::imageops::FilterType;
use image::GrayImage;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

const THUMBNAIL_SIZE: u32 = 16;

#[derive(Default)]
struct MotionHistory {
    thumbnails: VecDeque<GrayImage>,
    motion: VecDeque<f32>,
}

/// Camera shake estimate from frame-to-frame change of tiny luma thumbnails.
///
/// Needs at least two frames; the first frame only seeds the history.
pub struct StabilityAnalyzer {
    confidence_threshold: f32,
    history_size: usize,
    shake_threshold: f32,
    history: Mutex<MotionHistory>,
}

impl StabilityAnalyzer {
    pub fn new() -> Self {
        Self {
            confidence_threshold: 0.3,
            history_size: 8,
            shake_threshold: 0.08,
            history: Mutex::new(MotionHistory::default()),
        }
    }

    pub fn reset(&self) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.thumbnails.clear();
        history.motion.clear();
    }

    fn thumbnail(frame: &AnalysisFrame) -> GrayImage {
        image::imageops::resize(
            frame.luma.as_ref(),
            THUMBNAIL_SIZE,
            THUMBNAIL_SIZE,
            FilterType::Nearest,
        )
    }
}

/// Mean absolute pixel difference in `[0, 1]`.
fn mean_abs_diff(a: &GrayImage, b: &GrayImage) -> f32 {
    let total: u64 = a
        .pixels()
        .zip(b.pixels())
        .map(|(p, q)| (p.0[0] as i32 - q.0[0] as i32).unsigned_abs() as u64)
        .sum();
    let count = a.width() as u64 * a.height() as u64;
    if count == 0 {
        return 0.0;
    }
    total as f32 / count as f32 / 255.0
}

fn trend(motion: &VecDeque<f32>) -> &'static str {
    let Some(&latest) = motion.back() else {
        return "steady";
    };
    let earlier = motion.len() - 1;
    if earlier == 0 {
        return "steady";
    }
    let baseline = motion.iter().take(earlier).sum::<f32>() / earlier as f32;
    if latest > baseline * 1.5 + 0.01 {
        "increasing"
    } else if latest < baseline * 0.5 - 0.01 {
        "decreasing"
    } else {
        "steady"
    }
}

impl Analyzer for StabilityAnalyzer {
    fn analyzer_type(&self) -> AnalyzerType {
        AnalyzerType::Stability
    }

    fn name(&self) -> &'static str {
        "StabilityAnalyzer"
    }

    fn configure(&mut self, settings: &AnalyzerSettings) {
        if let Some(threshold) = settings.unit_float(CONFIDENCE_THRESHOLD_KEY) {
            self.confidence_threshold = threshold;
        }
        if let Some(size) = settings.count("history_size") {
            self.history_size = size.max(2);
        }
        if let Some(shake) = settings.unit_float("shake_threshold") {
            self.shake_threshold = shake;
        }
    }

    fn analyze(&self, frame: &AnalysisFrame) -> AnalyzerOutput {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(None);
        }
        let current = Self::thumbnail(frame);

        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let previous_motion = history
            .thumbnails
            .back()
            .map(|previous| mean_abs_diff(previous, &current));

        history.thumbnails.push_back(current);
        while history.thumbnails.len() > self.history_size {
            history.thumbnails.pop_front();
        }

        let Some(motion) = previous_motion else {
            return Ok(None);
        };
        history.motion.push_back(motion);
        while history.motion.len() > self.history_size {
            history.motion.pop_front();
        }

        let observed = history.motion.len();
        let motion_trend = trend(&history.motion);
        drop(history);

        // More history means a steadier baseline.
        let confidence = 0.5 + 0.5 * (observed as f32 / self.history_size as f32).min(1.0);
        let stability = (1.0 - motion / (self.shake_threshold * 4.0)).clamp(0.0, 1.0);

        let mut result = AnalysisResult::new(AnalyzerType::Stability, confidence)
            .with_value("motion", motion)
            .with_value("stability", stability)
            .with_value("trend", AnalysisValue::Text(motion_trend.to_string()));

        if motion > self.shake_threshold {
            let priority = if motion > self.shake_threshold * 2.0 {
                SuggestionPriority::Critical
            } else {
                SuggestionPriority::High
            };
            result = result.with_suggestion(Suggestion::new(
                SuggestionKind::HoldSteady,
                priority,
                "Camera is shaking",
                "Hold the phone with both hands or brace against something solid.",
                confidence,
            ));
        }

        Ok(gate_confidence(result, self.confidence_threshold))
    }
}

impl Default for StabilityAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::SettingValue;
    use crate::pipeline::analysis::analyzers::test_support::{solid_frame, square_frame};

    #[test]
    fn first_frame_only_seeds_history() {
        let analyzer = StabilityAnalyzer::new();
        assert_eq!(analyzer.analyze(&solid_frame(64, 64, [90, 90, 90])).unwrap(), None);
    }

    #[test]
    fn identical_frames_are_steady() {
        let analyzer = StabilityAnalyzer::new();
        let frame = square_frame(64, 64, 20, 20, 16);
        analyzer.analyze(&frame).unwrap();
        let result = analyzer.analyze(&frame).unwrap().unwrap();

        assert_eq!(result.number("motion"), Some(0.0));
        assert_eq!(result.number("stability"), Some(1.0));
        assert!(result.suggestions.is_empty());
    }

    #[test]
    fn large_change_reports_critical_shake() {
        let analyzer = StabilityAnalyzer::new();
        analyzer.analyze(&solid_frame(64, 64, [0, 0, 0])).unwrap();
        let result = analyzer
            .analyze(&solid_frame(64, 64, [255, 255, 255]))
            .unwrap()
            .unwrap();

        assert_eq!(result.number("motion"), Some(1.0));
        assert_eq!(result.suggestions[0].kind, SuggestionKind::HoldSteady);
        assert_eq!(result.suggestions[0].priority, SuggestionPriority::Critical);
        assert_eq!(
            result.data.get("trend"),
            Some(&AnalysisValue::Text("steady".to_string()))
        );
    }

    #[test]
    fn rising_motion_is_flagged_as_increasing() {
        let analyzer = StabilityAnalyzer::new();
        let grey = solid_frame(32, 32, [100, 100, 100]);
        for _ in 0..3 {
            analyzer.analyze(&grey).unwrap();
        }
        let result = analyzer
            .analyze(&solid_frame(32, 32, [200, 200, 200]))
            .unwrap()
            .unwrap();
        assert_eq!(
            result.data.get("trend"),
            Some(&AnalysisValue::Text("increasing".to_string()))
        );
    }

    #[test]
    fn reset_clears_history() {
        let mut analyzer = StabilityAnalyzer::new();
        analyzer.configure(&AnalyzerSettings::new().with("history_size", SettingValue::Int(3)));
        let frame = solid_frame(32, 32, [10, 10, 10]);
        analyzer.analyze(&frame).unwrap();
        assert!(analyzer.analyze(&frame).unwrap().is_some());

        analyzer.reset();
        assert_eq!(analyzer.analyze(&frame).unwrap(), None);
    }
}
