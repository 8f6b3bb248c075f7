use bayerflow::capture::source::encode_mosaic;
use bayerflow::capture::{BayerPattern, PixelEncoding, RawFrame, SampleLayout};
use bayerflow::transform::{demosaic, Normalization};
use bayerflow::TransformError;

const COLOR: [f32; 3] = [0.25, 0.5, 0.75];

fn flat_frame(width: u32, height: u32, encoding: PixelEncoding) -> RawFrame {
    let data = encode_mosaic(|_, _| COLOR, width, height, encoding);
    RawFrame::new(data, width, height, encoding, 11)
}

fn assert_flat(frame: &bayerflow::TransformedFrame, tolerance: f32) {
    for y in 0..frame.height() {
        for x in 0..frame.width() {
            let px = frame.pixel(x, y).unwrap();
            for c in 0..3 {
                assert!(
                    (px[c] - COLOR[c]).abs() <= tolerance,
                    "pixel ({x},{y}) channel {c}: {} vs {}",
                    px[c],
                    COLOR[c]
                );
            }
        }
    }
}

#[test]
fn flat_colour_survives_every_pattern() {
    for pattern in [
        BayerPattern::Rggb,
        BayerPattern::Bggr,
        BayerPattern::Grbg,
        BayerPattern::Gbrg,
    ] {
        let encoding = PixelEncoding::new(pattern, 12, SampleLayout::U16Le);
        let out = demosaic(&flat_frame(8, 6, encoding), Normalization::FullScale).unwrap();
        assert_flat(&out, 1.0 / 4095.0);
    }
}

#[test]
fn flat_colour_in_packed12_and_8bit() {
    let packed = PixelEncoding::new(BayerPattern::Rggb, 12, SampleLayout::Packed12);
    let out = demosaic(&flat_frame(7, 5, packed), Normalization::FullScale).unwrap();
    assert_flat(&out, 1.0 / 4095.0);

    let narrow = PixelEncoding::bayer8(BayerPattern::Bggr);
    let out = demosaic(&flat_frame(6, 4, narrow), Normalization::FullScale).unwrap();
    assert_flat(&out, 1.0 / 255.0);
}

#[test]
fn output_shape_and_identity() {
    let raw = flat_frame(10, 4, PixelEncoding::default());
    let out = demosaic(&raw, Normalization::MinMax).unwrap();
    assert_eq!(out.rgb.len(), 10 * 4 * 3);
    assert_eq!(out.sequence(), raw.sequence());
    assert_eq!((out.width(), out.height()), (10, 4));
    assert_eq!(out.timestamp, raw.timestamp);
    assert!(out.rgb.iter().all(|v| (0.0..=1.0).contains(v)));
}

#[test]
fn trailing_padding_is_ignored() {
    let encoding = PixelEncoding::default();
    let mut data = encode_mosaic(|_, _| COLOR, 4, 4, encoding).to_vec();
    data.extend_from_slice(&[0xFF; 16]);
    let raw = RawFrame::new(data.into(), 4, 4, encoding, 0);
    let out = demosaic(&raw, Normalization::FullScale).unwrap();
    assert_flat(&out, 1.0 / 4095.0);
}

#[test]
fn malformed_inputs_fail() {
    let encoding = PixelEncoding::default();
    let raw = RawFrame::new(vec![0u8; 10].into(), 4, 4, encoding, 0);
    assert_eq!(
        demosaic(&raw, Normalization::FullScale).unwrap_err(),
        TransformError::BufferTooShort {
            expected: 32,
            actual: 10
        }
    );

    let bad = PixelEncoding::new(BayerPattern::Rggb, 9, SampleLayout::U8);
    let raw = RawFrame::new(vec![0u8; 16].into(), 4, 4, bad, 0);
    assert!(matches!(
        demosaic(&raw, Normalization::FullScale),
        Err(TransformError::UnsupportedEncoding(_))
    ));
}
