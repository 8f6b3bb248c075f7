pub mod snapshot;

pub use snapshot::{to_rgb8, PngSnapshotSink};

use crate::capture::frame::TransformedFrame;
use crate::error::PipelineError;

/// Consumer of ordered frames pulled from the pipeline.
pub trait FrameSink {
    fn present(&mut self, frame: &TransformedFrame) -> Result<(), PipelineError>;
}
