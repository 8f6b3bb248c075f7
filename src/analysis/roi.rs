//! Line-profile sampling on delivered frames

use crate::capture::frame::TransformedFrame;

/// Line segment of interest in pixel coordinates `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoiLine {
    start: (u32, u32),
    end: (u32, u32),
}

impl RoiLine {
    pub fn new(start: (u32, u32), end: (u32, u32)) -> Self {
        Self { start, end }
    }

    pub fn set_position(&mut self, start: (u32, u32), end: (u32, u32)) {
        self.start = start;
        self.end = end;
    }

    pub fn position(&self) -> ((u32, u32), (u32, u32)) {
        (self.start, self.end)
    }

    /// RGB values along the rasterised segment, start to end inclusive.
    ///
    /// Endpoints outside the frame are clamped to its border.
    pub fn sample(&self, frame: &TransformedFrame) -> Vec<[f32; 3]> {
        let (w, h) = (frame.width(), frame.height());
        if w == 0 || h == 0 {
            return Vec::new();
        }

        let clamp = |(x, y): (u32, u32)| (x.min(w - 1) as i64, y.min(h - 1) as i64);
        let (x0, y0) = clamp(self.start);
        let (x1, y1) = clamp(self.end);

        bresenham(x0, y0, x1, y1)
            .filter_map(|(x, y)| frame.pixel(x as u32, y as u32))
            .collect()
    }
}

fn bresenham(mut x0: i64, mut y0: i64, x1: i64, y1: i64) -> impl Iterator<Item = (i64, i64)> {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let mut done = false;

    std::iter::from_fn(move || {
        if done {
            return None;
        }
        let point = (x0, y0);
        if x0 == x1 && y0 == y1 {
            done = true;
            return Some(point);
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
        Some(point)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::{FrameMetadata, PixelEncoding};
    use std::sync::Arc;
    use std::time::Instant;

    /// Red channel encodes x, green encodes y.
    fn ramp(width: u32, height: u32) -> TransformedFrame {
        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                rgb.extend_from_slice(&[x as f32, y as f32, 0.0]);
            }
        }
        TransformedFrame {
            rgb: Arc::from(rgb),
            meta: Arc::new(FrameMetadata {
                sequence: 0,
                width,
                height,
                encoding: PixelEncoding::default(),
            }),
            timestamp: Instant::now(),
        }
    }

    fn coords(samples: &[[f32; 3]]) -> Vec<(u32, u32)> {
        samples.iter().map(|p| (p[0] as u32, p[1] as u32)).collect()
    }

    #[test]
    fn horizontal_line() {
        let roi = RoiLine::new((1, 2), (4, 2));
        assert_eq!(
            coords(&roi.sample(&ramp(6, 4))),
            vec![(1, 2), (2, 2), (3, 2), (4, 2)]
        );
    }

    #[test]
    fn diagonal_line_reversed() {
        let roi = RoiLine::new((3, 3), (0, 0));
        assert_eq!(
            coords(&roi.sample(&ramp(4, 4))),
            vec![(3, 3), (2, 2), (1, 1), (0, 0)]
        );
    }

    #[test]
    fn steep_line_visits_every_row() {
        let roi = RoiLine::new((0, 0), (1, 5));
        let points = coords(&roi.sample(&ramp(4, 6)));
        assert_eq!(points.len(), 6);
        assert_eq!(points.first(), Some(&(0, 0)));
        assert_eq!(points.last(), Some(&(1, 5)));
    }

    #[test]
    fn endpoints_are_clamped() {
        let mut roi = RoiLine::new((0, 0), (0, 0));
        roi.set_position((2, 1), (100, 1));
        assert_eq!(roi.position(), ((2, 1), (100, 1)));
        assert_eq!(coords(&roi.sample(&ramp(4, 3))), vec![(2, 1), (3, 1)]);
    }

    #[test]
    fn single_point() {
        let roi = RoiLine::new((1, 1), (1, 1));
        assert_eq!(roi.sample(&ramp(2, 2)).len(), 1);
    }
}
