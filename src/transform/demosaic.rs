//! Bayer mosaic to normalized RGB conversion

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::capture::frame::{BayerPattern, PixelEncoding, RawFrame, SampleLayout, TransformedFrame};
use crate::error::TransformError;

/// How sensor values are mapped into [0.0, 1.0].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// Divide by the largest value the bit depth can hold
    #[default]
    FullScale,
    /// Stretch the frame's own min..max onto 0..1
    MinMax,
}

/// Demosaic a raw frame. Pure function of its inputs.
pub fn demosaic(raw: &RawFrame, normalization: Normalization) -> Result<TransformedFrame, TransformError> {
    let meta = &raw.meta;
    let samples = unpack_samples(&raw.data, meta.width, meta.height, meta.encoding)?;

    let mut rgb = interpolate(&samples, meta.width as usize, meta.height as usize, meta.encoding.pattern);
    normalize(&mut rgb, normalization, meta.encoding.max_value());

    Ok(TransformedFrame {
        rgb: Arc::from(rgb),
        meta: Arc::clone(&raw.meta),
        timestamp: raw.timestamp,
    })
}

/// Decode the packed byte buffer into one `u16` per photosite.
pub fn unpack_samples(
    data: &[u8],
    width: u32,
    height: u32,
    encoding: PixelEncoding,
) -> Result<Vec<u16>, TransformError> {
    if width == 0 || height == 0 {
        return Err(TransformError::ZeroDimension { width, height });
    }
    encoding.validate()?;

    let expected = encoding.expected_len(width, height);
    if data.len() < expected {
        return Err(TransformError::BufferTooShort {
            expected,
            actual: data.len(),
        });
    }

    let count = width as usize * height as usize;
    let mask = encoding.max_value() as u16;

    let samples = match encoding.layout {
        SampleLayout::U8 => data[..count].iter().map(|&b| b as u16 & mask).collect(),
        SampleLayout::U16Le => data[..count * 2]
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]) & mask)
            .collect(),
        SampleLayout::Packed12 => {
            let mut out = Vec::with_capacity(count + 1);
            for chunk in data[..expected].chunks(3) {
                let b0 = chunk[0] as u16;
                let b1 = chunk.get(1).copied().unwrap_or(0) as u16;
                let b2 = chunk.get(2).copied().unwrap_or(0) as u16;
                out.push(b0 | (b1 & 0x0F) << 8);
                out.push(b1 >> 4 | b2 << 4);
            }
            out.truncate(count);
            out
        }
    };

    Ok(samples)
}

/// Bilinear interpolation over the 3x3 neighbourhood with replicated borders.
///
/// Output is interleaved RGB in sensor units (not yet normalized).
fn interpolate(samples: &[u16], width: usize, height: usize, pattern: BayerPattern) -> Vec<f32> {
    let mut rgb = vec![0.0f32; width * height * 3];

    for y in 0..height {
        for x in 0..width {
            let mut sum = [0.0f32; 3];
            let mut hits = [0u32; 3];
            let own = pattern.channel_at(x, y) as usize;

            for dy in -1isize..=1 {
                let ny = (y as isize + dy).clamp(0, height as isize - 1) as usize;
                for dx in -1isize..=1 {
                    let nx = (x as isize + dx).clamp(0, width as isize - 1) as usize;
                    let c = pattern.channel_at(nx, ny) as usize;
                    if c == own {
                        continue;
                    }
                    sum[c] += samples[ny * width + nx] as f32;
                    hits[c] += 1;
                }
            }

            let out = &mut rgb[(y * width + x) * 3..(y * width + x) * 3 + 3];
            for c in 0..3 {
                out[c] = if c == own {
                    samples[y * width + x] as f32
                } else if hits[c] > 0 {
                    sum[c] / hits[c] as f32
                } else {
                    0.0
                };
            }
        }
    }

    rgb
}

fn normalize(rgb: &mut [f32], normalization: Normalization, max_value: u32) {
    match normalization {
        Normalization::FullScale => {
            let scale = 1.0 / max_value.max(1) as f32;
            for v in rgb.iter_mut() {
                *v = (*v * scale).clamp(0.0, 1.0);
            }
        }
        Normalization::MinMax => {
            let (lo, hi) = rgb
                .iter()
                .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
            let range = hi - lo;
            if range <= f32::EPSILON {
                rgb.fill(0.0);
                return;
            }
            for v in rgb.iter_mut() {
                *v = ((*v - lo) / range).clamp(0.0, 1.0);
            }
        }
    }
}
