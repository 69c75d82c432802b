pub mod analysis;
pub mod domain;
pub mod monitoring;
pub mod orchestration;
pub mod throttle;
