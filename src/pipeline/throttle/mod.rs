pub mod controller;
pub mod publisher;
pub mod task;

pub use controller::{PressureSignals, ThrottleController, ThrottleDecision};
pub use publisher::QualityPublisher;
pub use task::ThrottleTask;
