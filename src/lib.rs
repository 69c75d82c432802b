pub mod common;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod intake;
pub mod pipeline;

pub use common::{AnalyzerSettings, Frame, SettingValue};
pub use crate::config::Configuration;
pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use error::{AnalyzerError, AppError, FrameError};
pub use intake::{ChannelFrameSource, FrameSource, SyntheticCamera};
pub use pipeline::analysis::{Analyzer, AnalyzerRegistry};
pub use pipeline::domain::{
    AnalysisResult, AnalyzerType, CombinedResult, QualityLevel, QualitySnapshot, Suggestion,
    SuggestionPriority, ThrottleLevel,
};
pub use pipeline::monitoring::{MetricsSnapshot, SharedSystemSignals, SystemProbe, ThermalState};
pub use pipeline::orchestration::{ChannelConsumer, ResultConsumer};

use tracing::Level;

pub fn init_logging(level: Level) {
    tracing_subscriber::fmt().with_max_level(level).init();
}
