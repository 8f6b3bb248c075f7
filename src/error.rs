//! Error types for the frame pipeline

use thiserror::Error;

/// Errors surfaced to callers of the pipeline API.
///
/// Per-frame problems (full channels, failed transforms, permanent gaps) never
/// show up here; they are absorbed by the pipeline and reported through
/// [`crate::pipeline::Telemetry`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline is already running")]
    AlreadyRunning,

    #[error("pipeline is not running")]
    NotRunning,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("frame source error: {0}")]
    Source(String),

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Reasons a raw frame cannot be demosaiced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("frame has zero dimension ({width}x{height})")]
    ZeroDimension { width: u32, height: u32 },

    #[error("raw buffer too short: expected {expected} bytes, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("transform panicked: {0}")]
    Panicked(String),

    #[error("transform returned sequence {actual} for raw frame {expected}")]
    SequenceMismatch { expected: u64, actual: u64 },
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error(transparent)]
    Invalid(#[from] PipelineError),
}
