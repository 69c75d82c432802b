pub mod source;

pub use source::{ChannelFrameSource, FrameSource, SyntheticCamera};
