pub mod analysis;
pub mod capture;
pub mod display;
pub mod error;
pub mod pipeline;
pub mod transform;
pub mod utils;

use std::path::{Path, PathBuf};

use arc_swap::ArcSwap;
use capture::frame::{BayerPattern, PixelEncoding, SampleLayout};
use serde::{Deserialize, Serialize};

pub use capture::frame::{RawFrame, TransformedFrame};
pub use error::{ConfigError, PipelineError, TransformError};
pub use pipeline::{FramePipeline, Offer, Telemetry};
pub use transform::Normalization;

/// Global configuration that can be atomically swapped at runtime
pub static CONFIG: once_cell::sync::Lazy<ArcSwap<Config>> =
    once_cell::sync::Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// Prefix for environment overrides, e.g. `BAYERFLOW__PIPELINE__WORKER_COUNT=8`
pub const ENV_PREFIX: &str = "BAYERFLOW";

/// System configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub pipeline: PipelineConfig,
    pub snapshot: SnapshotConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub pattern: BayerPattern,
    pub bits_per_sample: u8,
    pub layout: SampleLayout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub raw_capacity: usize,
    pub processed_capacity: usize,
    pub worker_count: usize,
    /// Extra reorder slots on top of `processed_capacity`
    pub reorder_slack: usize,
    /// How long a missing sequence number may hold back later frames
    pub gap_timeout_ms: u64,
    pub worker_poll_ms: u64,
    pub pin_workers: bool, // CPU affinity per worker
    pub normalization: Normalization,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    pub every_n: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            width: 2048,
            height: 1536,
            fps: 30,
            pattern: BayerPattern::Rggb,
            bits_per_sample: 12,
            layout: SampleLayout::U16Le,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            raw_capacity: 10,
            processed_capacity: 10,
            worker_count: 4,
            reorder_slack: 2,
            gap_timeout_ms: 100, // ~3 frame periods at 30fps
            worker_poll_ms: 20,
            pin_workers: false,
            normalization: Normalization::FullScale,
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: PathBuf::from("snapshots"),
            every_n: 30,
        }
    }
}

impl SourceConfig {
    pub fn encoding(&self) -> PixelEncoding {
        PixelEncoding::new(self.pattern, self.bits_per_sample, self.layout)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.width == 0 || self.height == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "source resolution {}x{} is empty",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(PipelineError::InvalidConfig("source fps must be at least 1".into()));
        }
        self.encoding()
            .validate()
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.raw_capacity == 0 || self.processed_capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "channel capacities must be at least 1".into(),
            ));
        }
        if self.worker_count == 0 {
            return Err(PipelineError::InvalidConfig("worker_count must be at least 1".into()));
        }
        if self.worker_poll_ms == 0 {
            return Err(PipelineError::InvalidConfig("worker_poll_ms must be at least 1".into()));
        }
        Ok(())
    }
}

impl Config {
    /// Defaults, then the optional TOML file, then `BAYERFLOW__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: Config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        self.source.validate()?;
        self.pipeline.validate()?;
        if self.snapshot.enabled && self.snapshot.every_n == 0 {
            return Err(PipelineError::InvalidConfig("snapshot.every_n must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.raw_capacity, 10);
        assert_eq!(config.pipeline.worker_count, 4);
        assert_eq!(config.source.encoding(), PixelEncoding::default());
    }

    #[test]
    fn load_from_toml_file() {
        let path = std::env::temp_dir().join(format!("bayerflow-config-{}.toml", std::process::id()));
        fs::write(
            &path,
            r#"
[source]
width = 640
height = 480
layout = "u8"
bits_per_sample = 8

[pipeline]
worker_count = 2
normalization = "min_max"
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(config.source.width, 640);
        assert_eq!(config.source.layout, SampleLayout::U8);
        assert_eq!(config.pipeline.worker_count, 2);
        assert_eq!(config.pipeline.normalization, Normalization::MinMax);
        // untouched keys keep their defaults
        assert_eq!(config.pipeline.raw_capacity, 10);
        assert_eq!(config.source.fps, 30);
    }

    #[test]
    fn invalid_file_values_are_rejected() {
        let path = std::env::temp_dir().join(format!("bayerflow-bad-{}.toml", std::process::id()));
        fs::write(&path, "[pipeline]\nraw_capacity = 0\n").unwrap();
        let result = Config::load(Some(&path));
        fs::remove_file(&path).ok();
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn packed_layout_needs_12_bits() {
        let source = SourceConfig {
            layout: SampleLayout::Packed12,
            bits_per_sample: 10,
            ..SourceConfig::default()
        };
        assert!(source.validate().is_err());
    }

    #[test]
    fn global_config_swaps() {
        let mut config = Config::default();
        config.pipeline.worker_count = 7;
        CONFIG.store(std::sync::Arc::new(config));
        assert_eq!(CONFIG.load().pipeline.worker_count, 7);
        CONFIG.store(std::sync::Arc::new(Config::default()));
    }
}
