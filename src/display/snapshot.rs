//! Headless presentation: periodic PNG snapshots of delivered frames

use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;
use tracing::{debug, info, instrument};

use crate::capture::frame::TransformedFrame;
use crate::display::FrameSink;
use crate::error::PipelineError;
use crate::SnapshotConfig;

/// Writes every n-th presented frame to `<dir>/frame_<sequence>.png`.
pub struct PngSnapshotSink {
    dir: PathBuf,
    every_n: u64,
    presented: u64,
    written: u64,
}

impl PngSnapshotSink {
    pub fn new(dir: impl AsRef<Path>, every_n: u64) -> Result<Self, PipelineError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|e| PipelineError::Snapshot(format!("{}: {}", dir.display(), e)))?;
        info!(dir = %dir.display(), every_n, "Snapshot sink ready");
        Ok(Self {
            dir,
            every_n: every_n.max(1),
            presented: 0,
            written: 0,
        })
    }

    pub fn from_config(config: &SnapshotConfig) -> Result<Self, PipelineError> {
        Self::new(&config.dir, config.every_n)
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn path_for(&self, sequence: u64) -> PathBuf {
        self.dir.join(format!("frame_{sequence:08}.png"))
    }
}

impl FrameSink for PngSnapshotSink {
    #[instrument(skip_all, fields(sequence = frame.sequence()))]
    fn present(&mut self, frame: &TransformedFrame) -> Result<(), PipelineError> {
        let due = self.presented % self.every_n == 0;
        self.presented += 1;
        if !due {
            return Ok(());
        }

        let image = to_rgb8(frame)
            .ok_or_else(|| PipelineError::Snapshot("frame buffer does not match its dimensions".into()))?;
        let path = self.path_for(frame.sequence());
        image
            .save(&path)
            .map_err(|e| PipelineError::Snapshot(format!("{}: {}", path.display(), e)))?;

        self.written += 1;
        debug!(path = %path.display(), "Wrote snapshot");
        Ok(())
    }
}

/// Quantize a normalized frame to 8-bit RGB.
pub fn to_rgb8(frame: &TransformedFrame) -> Option<RgbImage> {
    let bytes = frame
        .rgb
        .iter()
        .map(|&v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect();
    RgbImage::from_raw(frame.width(), frame.height(), bytes)
}
