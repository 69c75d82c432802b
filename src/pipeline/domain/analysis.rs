use crate::pipeline::domain::quality::QualityLevel;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The fixed set of analysis kinds the pipeline knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerType {
    Composition,
    Lighting,
    Subject,
    Focus,
    Exposure,
    Stability,
}

impl AnalyzerType {
    pub const ALL: [AnalyzerType; 6] = [
        AnalyzerType::Composition,
        AnalyzerType::Lighting,
        AnalyzerType::Subject,
        AnalyzerType::Focus,
        AnalyzerType::Exposure,
        AnalyzerType::Stability,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AnalyzerType::Composition => "composition",
            AnalyzerType::Lighting => "lighting",
            AnalyzerType::Subject => "subject",
            AnalyzerType::Focus => "focus",
            AnalyzerType::Exposure => "exposure",
            AnalyzerType::Stability => "stability",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(name.trim()))
    }

    /// Rank used when the budget does not cover every analyzer (higher runs first).
    pub fn default_priority(&self) -> u8 {
        match self {
            AnalyzerType::Focus => 10,
            AnalyzerType::Exposure => 9,
            AnalyzerType::Stability => 8,
            AnalyzerType::Composition => 7,
            AnalyzerType::Lighting => 6,
            AnalyzerType::Subject => 5,
        }
    }
}

impl std::fmt::Display for AnalyzerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Heterogeneous value in an analyzer's semantic data map.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnalysisValue {
    Number(f64),
    Flag(bool),
    Text(String),
    Point { x: f32, y: f32 },
}

impl From<f64> for AnalysisValue {
    fn from(value: f64) -> Self {
        AnalysisValue::Number(value)
    }
}

impl From<f32> for AnalysisValue {
    fn from(value: f32) -> Self {
        AnalysisValue::Number(value as f64)
    }
}

impl From<bool> for AnalysisValue {
    fn from(value: bool) -> Self {
        AnalysisValue::Flag(value)
    }
}

impl From<&str> for AnalysisValue {
    fn from(value: &str) -> Self {
        AnalysisValue::Text(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionPriority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    AdjustFocus,
    IncreaseExposure,
    ReduceExposure,
    ImproveLighting,
    CorrectColorCast,
    RuleOfThirds,
    BalanceFrame,
    MoveCloser,
    IsolateSubject,
    HoldSteady,
}

/// A single recommendation shown to the photographer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub kind: SuggestionKind,
    pub priority: SuggestionPriority,
    pub title: String,
    pub message: String,
    pub confidence: f32,
    pub actionable: bool,
}

impl Suggestion {
    pub fn new(
        kind: SuggestionKind,
        priority: SuggestionPriority,
        title: impl Into<String>,
        message: impl Into<String>,
        confidence: f32,
    ) -> Self {
        Self {
            kind,
            priority,
            title: title.into(),
            message: message.into(),
            confidence: clamp_unit(confidence),
            actionable: true,
        }
    }

    pub fn informational(mut self) -> Self {
        self.actionable = false;
        self
    }

    /// Two suggestions saying the same thing, regardless of confidence or priority.
    pub fn same_content(&self, other: &Suggestion) -> bool {
        self.kind == other.kind && self.title == other.title && self.message == other.message
    }
}

/// Output of one analyzer for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub analyzer_type: AnalyzerType,
    pub confidence: f32,
    pub data: IndexMap<String, AnalysisValue>,
    pub suggestions: Vec<Suggestion>,
}

impl AnalysisResult {
    pub fn new(analyzer_type: AnalyzerType, confidence: f32) -> Self {
        Self {
            analyzer_type,
            confidence: clamp_unit(confidence),
            data: IndexMap::new(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<AnalysisValue>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: Suggestion) -> Self {
        self.suggestions.push(suggestion);
        self
    }

    pub fn with_suggestions(mut self, suggestions: impl IntoIterator<Item = Suggestion>) -> Self {
        self.suggestions.extend(suggestions);
        self
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        match self.data.get(key)? {
            AnalysisValue::Number(v) => Some(*v),
            _ => None,
        }
    }
}

/// Merged output for one processed frame, handed to the consumer.
#[derive(Debug, Clone, Serialize)]
pub struct CombinedResult {
    pub frame_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub quality_level: QualityLevel,
    pub results: Vec<AnalysisResult>,
    pub overall_confidence: f32,
    pub suggestions: Vec<Suggestion>,
    pub processing_time_us: u64,
}

impl CombinedResult {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn result_for(&self, analyzer_type: AnalyzerType) -> Option<&AnalysisResult> {
        self.results
            .iter()
            .find(|r| r.analyzer_type == analyzer_type)
    }

    pub fn top_suggestion(&self) -> Option<&Suggestion> {
        self.suggestions.first()
    }
}

pub(crate) fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priorities_order_low_to_critical() {
        assert!(SuggestionPriority::Critical > SuggestionPriority::High);
        assert!(SuggestionPriority::High > SuggestionPriority::Medium);
        assert!(SuggestionPriority::Medium > SuggestionPriority::Low);
    }

    #[test]
    fn confidence_is_clamped_and_never_nan() {
        assert_eq!(AnalysisResult::new(AnalyzerType::Focus, 1.7).confidence, 1.0);
        assert_eq!(AnalysisResult::new(AnalyzerType::Focus, -0.2).confidence, 0.0);
        assert_eq!(
            AnalysisResult::new(AnalyzerType::Focus, f32::NAN).confidence,
            0.0
        );
    }

    #[test]
    fn analyzer_type_names_round_trip() {
        for analyzer_type in AnalyzerType::ALL {
            assert_eq!(AnalyzerType::from_name(analyzer_type.name()), Some(analyzer_type));
        }
        assert_eq!(AnalyzerType::from_name("FOCUS"), Some(AnalyzerType::Focus));
        assert_eq!(AnalyzerType::from_name("histogram"), None);
    }
}
