pub mod frame;
pub mod source;

pub use frame::{BayerPattern, PixelEncoding, RawFrame, SampleLayout, TransformedFrame};
pub use source::{FrameSource, RawCapture, SyntheticBayerSource};
