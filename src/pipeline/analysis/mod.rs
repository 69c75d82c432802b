pub mod analyzers;
pub mod core;
pub mod registry;

pub use analyzers::{default_analyzer, CONFIDENCE_THRESHOLD_KEY};
pub use self::core::{gate_confidence, AnalysisFrame, Analyzer, AnalyzerOutput, ImageRegion};
pub use registry::{AnalyzerDescriptor, AnalyzerRegistry};
