use crate::pipeline::domain::{AnalysisResult, CombinedResult, QualityLevel, Suggestion};
use chrono::Utc;
use uuid::Uuid;

/// Merges one frame's analyzer results into a single combined result.
#[derive(Debug, Clone, Copy)]
pub struct Aggregator {
    deduplicate: bool,
}

impl Aggregator {
    pub fn new() -> Self {
        Self { deduplicate: true }
    }

    /// Drop later suggestions with the same kind, title and message as an earlier one.
    pub fn with_deduplication(mut self, deduplicate: bool) -> Self {
        self.deduplicate = deduplicate;
        self
    }

    pub fn aggregate(
        &self,
        frame_id: Uuid,
        quality_level: QualityLevel,
        results: Vec<AnalysisResult>,
    ) -> CombinedResult {
        let overall_confidence = mean_confidence(&results);
        let suggestions = self.merge_suggestions(&results);

        CombinedResult {
            frame_id,
            timestamp: Utc::now(),
            quality_level,
            results,
            overall_confidence,
            suggestions,
            processing_time_us: 0,
        }
    }

    /// All suggestions, priority descending then confidence descending, stable for ties.
    pub fn merge_suggestions(&self, results: &[AnalysisResult]) -> Vec<Suggestion> {
        let mut suggestions: Vec<Suggestion> = results
            .iter()
            .flat_map(|r| r.suggestions.iter().cloned())
            .collect();

        suggestions.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.confidence.total_cmp(&a.confidence))
        });

        if self.deduplicate {
            let mut kept: Vec<Suggestion> = Vec::with_capacity(suggestions.len());
            for suggestion in suggestions {
                if !kept.iter().any(|k| k.same_content(&suggestion)) {
                    kept.push(suggestion);
                }
            }
            suggestions = kept;
        }
        suggestions
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Arithmetic mean of the confidences, each clamped to `[0, 1]`; 0.0 when there are none.
///
/// NaN confidences are left out of the mean.
pub fn mean_confidence(results: &[AnalysisResult]) -> f32 {
    let confidences: Vec<f64> = results
        .iter()
        .filter(|r| !r.confidence.is_nan())
        .map(|r| r.confidence.clamp(0.0, 1.0) as f64)
        .collect();
    if confidences.is_empty() {
        return 0.0;
    }
    (confidences.iter().sum::<f64>() / confidences.len() as f64) as f32
}
