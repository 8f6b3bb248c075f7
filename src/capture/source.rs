//! Frame source interface and a synthetic Bayer test-pattern source

use std::time::{Duration, Instant};

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{info, instrument};

use crate::capture::frame::{PixelEncoding, SampleLayout};
use crate::error::PipelineError;
use crate::SourceConfig;

/// One buffer as delivered by a frame source, before sequence tagging.
#[derive(Debug, Clone)]
pub struct RawCapture {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub encoding: PixelEncoding,
    /// Time since stream start, as reported by the device
    pub device_timestamp: Duration,
}

/// Hardware-facing producer of raw frames.
pub trait FrameSource: Send {
    fn connect(&mut self) -> Result<(), PipelineError>;
    fn disconnect(&mut self);
    fn start(&mut self) -> Result<(), PipelineError>;
    fn stop(&mut self);
    fn is_connected(&self) -> bool;
    fn is_capturing(&self) -> bool;
    /// Produce the next frame. Only valid while capturing.
    fn next_frame(&mut self) -> Result<RawCapture, PipelineError>;
}

/// Moving colour gradient mosaicked into the configured Bayer encoding.
pub struct SyntheticBayerSource {
    config: SourceConfig,
    connected: bool,
    started_at: Option<Instant>,
    frame_count: u64,
}

impl SyntheticBayerSource {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config,
            connected: false,
            started_at: None,
            frame_count: 0,
        }
    }

    /// Change the output resolution; takes effect on the next frame.
    pub fn set_resolution(&mut self, width: u32, height: u32) {
        self.config.width = width;
        self.config.height = height;
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Nominal interval between frames at the configured rate.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.config.fps.max(1)
    }
}

impl FrameSource for SyntheticBayerSource {
    fn connect(&mut self) -> Result<(), PipelineError> {
        self.config.validate()?;
        self.connected = true;
        info!(
            width = self.config.width,
            height = self.config.height,
            encoding = ?self.config.encoding(),
            "Connected synthetic source"
        );
        Ok(())
    }

    fn disconnect(&mut self) {
        self.stop();
        if self.connected {
            self.connected = false;
            info!("Disconnected synthetic source");
        }
    }

    #[instrument(skip(self))]
    fn start(&mut self) -> Result<(), PipelineError> {
        if !self.connected {
            return Err(PipelineError::Source("source is not connected".into()));
        }
        if self.started_at.is_some() {
            return Err(PipelineError::Source("source is already capturing".into()));
        }
        self.frame_count = 0;
        self.started_at = Some(Instant::now());
        info!("Synthetic capture started");
        Ok(())
    }

    fn stop(&mut self) {
        if self.started_at.take().is_some() {
            info!(frames = self.frame_count, "Synthetic capture stopped");
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn is_capturing(&self) -> bool {
        self.started_at.is_some()
    }

    fn next_frame(&mut self) -> Result<RawCapture, PipelineError> {
        let started_at = self
            .started_at
            .ok_or_else(|| PipelineError::Source("source is not capturing".into()))?;

        let (width, height) = (self.config.width, self.config.height);
        let shift = self.frame_count as u32;
        let scene = move |x: u32, y: u32| {
            [
                (x.wrapping_add(shift) % width) as f32 / width as f32,
                (y.wrapping_add(shift) % height) as f32 / height as f32,
                0.5,
            ]
        };

        let encoding = self.config.encoding();
        let data = encode_mosaic(scene, width, height, encoding);
        self.frame_count += 1;

        Ok(RawCapture {
            data,
            width,
            height,
            encoding,
            device_timestamp: started_at.elapsed(),
        })
    }
}

/// Sample an RGB scene (components in [0, 1]) through a Bayer filter and pack it.
pub fn encode_mosaic<F>(scene: F, width: u32, height: u32, encoding: PixelEncoding) -> Bytes
where
    F: Fn(u32, u32) -> [f32; 3],
{
    let max = encoding.max_value() as f32;
    let mut buf = BytesMut::with_capacity(encoding.expected_len(width, height));
    let mut pending: Option<u16> = None;

    for y in 0..height {
        for x in 0..width {
            let channel = encoding.pattern.channel_at(x as usize, y as usize) as usize;
            let value = (scene(x, y)[channel].clamp(0.0, 1.0) * max).round() as u16;

            match encoding.layout {
                SampleLayout::U8 => buf.put_u8(value as u8),
                SampleLayout::U16Le => buf.put_u16_le(value),
                SampleLayout::Packed12 => match pending.take() {
                    None => pending = Some(value),
                    Some(first) => put_packed12(&mut buf, first, value),
                },
            }
        }
    }

    if let Some(first) = pending {
        buf.put_u8((first & 0xFF) as u8);
        buf.put_u8((first >> 8) as u8 & 0x0F);
    }

    buf.freeze()
}

fn put_packed12(buf: &mut BytesMut, s0: u16, s1: u16) {
    buf.put_u8((s0 & 0xFF) as u8);
    buf.put_u8(((s0 >> 8) & 0x0F) as u8 | ((s1 & 0x0F) << 4) as u8);
    buf.put_u8((s1 >> 4) as u8);
}
