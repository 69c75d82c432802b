use thiserror::Error;

// Main Application Error Type

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Frame Error: {0}")]
    Frame(#[from] FrameError),
    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("The processing pipeline is closed.")]
    PipelineClosed,
}

// Analyzer Error Type
//
// Never leaves the dispatcher: every variant is counted as an analyzer failure
// and the analyzer is left out of the combined result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyzerError {
    #[error("Invalid analyzer input: {0}")]
    InvalidInput(String),
    #[error("Analysis failed: {0}")]
    Failed(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameError {
    #[error("Frame has no pixel data ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
    #[error("Pixel buffer holds {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },
}
