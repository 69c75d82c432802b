pub mod frame;
pub mod settings;

pub use frame::Frame;
pub use settings::{AnalyzerSettings, SettingValue};
