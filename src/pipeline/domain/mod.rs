pub mod analysis;
pub mod quality;

pub use analysis::{
    AnalysisResult, AnalysisValue, AnalyzerType, CombinedResult, Suggestion, SuggestionKind,
    SuggestionPriority,
};
pub use quality::{QualityLevel, QualityProfile, QualityProfiles, QualitySnapshot, ThrottleLevel};
