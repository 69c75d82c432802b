pub mod aggregator;
pub mod dispatcher;
pub mod preprocessing;
pub mod processor;
pub mod scheduler;

pub use aggregator::{mean_confidence, Aggregator};
pub use dispatcher::{AnalyzerOutcome, AnalyzerReport, DispatchMode, Dispatcher};
pub use processor::{run_worker, ChannelConsumer, FrameProcessor, FrameRequest, ResultConsumer};
pub use scheduler::{Admission, AdmittedFrame, DropReason, FrameScheduler, InFlightPermit};
