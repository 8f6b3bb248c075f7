use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::error::TransformError;

/// Raw sensor frame as admitted into the pipeline.
///
/// Immutable once built; cloning only bumps reference counts.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Packed Bayer samples, row-major
    pub data: Bytes,

    /// Frame metadata
    pub meta: Arc<FrameMetadata>,

    /// Arrival timestamp for latency tracking
    pub timestamp: Instant,
}

/// Demosaiced frame, interleaved RGB with every component in [0.0, 1.0].
#[derive(Debug, Clone)]
pub struct TransformedFrame {
    pub rgb: Arc<[f32]>,

    /// Copied unchanged from the source [`RawFrame`]
    pub meta: Arc<FrameMetadata>,

    /// Arrival timestamp of the source raw frame
    pub timestamp: Instant,
}

/// Frame metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMetadata {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub encoding: PixelEncoding,
}

impl RawFrame {
    pub fn new(data: Bytes, width: u32, height: u32, encoding: PixelEncoding, sequence: u64) -> Self {
        Self {
            data,
            meta: Arc::new(FrameMetadata {
                sequence,
                width,
                height,
                encoding,
            }),
            timestamp: Instant::now(),
        }
    }

    pub fn sequence(&self) -> u64 {
        self.meta.sequence
    }
}

impl TransformedFrame {
    pub fn sequence(&self) -> u64 {
        self.meta.sequence
    }

    pub fn width(&self) -> u32 {
        self.meta.width
    }

    pub fn height(&self) -> u32 {
        self.meta.height
    }

    /// RGB triple at pixel `(x, y)`, or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[f32; 3]> {
        if x >= self.meta.width || y >= self.meta.height {
            return None;
        }
        let idx = (y as usize * self.meta.width as usize + x as usize) * 3;
        self.rgb
            .get(idx..idx + 3)
            .map(|px| [px[0], px[1], px[2]])
    }

    /// `(sequence, width, height, rgb)` for presentation layers that want plain values.
    pub fn into_parts(self) -> (u64, u32, u32, Arc<[f32]>) {
        (
            self.meta.sequence,
            self.meta.width,
            self.meta.height,
            self.rgb,
        )
    }
}

/// Colour filter arrangement of a 2x2 Bayer tile, named top-left to bottom-right.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BayerPattern {
    #[default]
    Rggb,
    Bggr,
    Grbg,
    Gbrg,
}

/// Colour channel recorded by a single photosite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Red = 0,
    Green = 1,
    Blue = 2,
}

impl BayerPattern {
    /// Channel sampled at `(x, y)`.
    pub fn channel_at(self, x: usize, y: usize) -> Channel {
        let tile = match self {
            BayerPattern::Rggb => [Channel::Red, Channel::Green, Channel::Green, Channel::Blue],
            BayerPattern::Bggr => [Channel::Blue, Channel::Green, Channel::Green, Channel::Red],
            BayerPattern::Grbg => [Channel::Green, Channel::Red, Channel::Blue, Channel::Green],
            BayerPattern::Gbrg => [Channel::Green, Channel::Blue, Channel::Red, Channel::Green],
        };
        tile[(y & 1) * 2 + (x & 1)]
    }
}

/// How samples are laid out in the raw byte buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleLayout {
    /// One byte per sample
    U8,
    /// Two bytes per sample, little-endian
    #[default]
    U16Le,
    /// Two 12-bit samples in three bytes
    Packed12,
}

/// Sensor pixel encoding reported by the frame source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelEncoding {
    pub pattern: BayerPattern,
    pub bits_per_sample: u8,
    pub layout: SampleLayout,
}

impl Default for PixelEncoding {
    /// BayerRG12 in 16-bit containers
    fn default() -> Self {
        Self {
            pattern: BayerPattern::Rggb,
            bits_per_sample: 12,
            layout: SampleLayout::U16Le,
        }
    }
}

impl PixelEncoding {
    pub const fn new(pattern: BayerPattern, bits_per_sample: u8, layout: SampleLayout) -> Self {
        Self {
            pattern,
            bits_per_sample,
            layout,
        }
    }

    /// 8-bit samples, one byte each.
    pub const fn bayer8(pattern: BayerPattern) -> Self {
        Self::new(pattern, 8, SampleLayout::U8)
    }

    /// Largest representable sample value.
    pub fn max_value(&self) -> u32 {
        (1u32 << self.bits_per_sample) - 1
    }

    /// Reject bit depths the layout cannot hold.
    pub fn validate(&self) -> Result<(), TransformError> {
        let ok = match self.layout {
            SampleLayout::U8 => (1..=8).contains(&self.bits_per_sample),
            SampleLayout::U16Le => (1..=16).contains(&self.bits_per_sample),
            SampleLayout::Packed12 => self.bits_per_sample == 12,
        };
        if ok {
            Ok(())
        } else {
            Err(TransformError::UnsupportedEncoding(format!(
                "{} bits per sample in {:?} layout",
                self.bits_per_sample, self.layout
            )))
        }
    }

    /// Bytes needed for a `width` x `height` frame.
    pub fn expected_len(&self, width: u32, height: u32) -> usize {
        let samples = width as usize * height as usize;
        match self.layout {
            SampleLayout::U8 => samples,
            SampleLayout::U16Le => samples * 2,
            SampleLayout::Packed12 => (samples * 3).div_ceil(2),
        }
    }
}
