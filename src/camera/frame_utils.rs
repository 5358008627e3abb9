//! Consumer-side helpers for frames copied out of the shared buffer.
//!
//! These work on BGR bytes as delivered by the capture drivers.

use std::path::Path;

use image::error::{ParameterError, ParameterErrorKind};
use image::{ImageError, ImageFormat, ImageResult, RgbImage};

use super::types::{Frame, BYTES_PER_PIXEL};

/// Per-channel summary of a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub mean_blue: f64,
    pub mean_green: f64,
    pub mean_red: f64,
    /// Fraction of bytes that are not zero
    pub nonzero: f64,
}

impl FrameStats {
    pub fn of(bgr: &[u8]) -> Self {
        let pixels = bgr.len() / BYTES_PER_PIXEL;
        if pixels == 0 {
            return Self {
                mean_blue: 0.0,
                mean_green: 0.0,
                mean_red: 0.0,
                nonzero: 0.0,
            };
        }

        let mut sums = [0u64; 3];
        let mut nonzero = 0usize;
        for px in bgr.chunks_exact(BYTES_PER_PIXEL) {
            for (sum, &value) in sums.iter_mut().zip(px) {
                *sum += value as u64;
                if value != 0 {
                    nonzero += 1;
                }
            }
        }

        let n = pixels as f64;
        Self {
            mean_blue: sums[0] as f64 / n,
            mean_green: sums[1] as f64 / n,
            mean_red: sums[2] as f64 / n,
            nonzero: nonzero as f64 / (pixels * BYTES_PER_PIXEL) as f64,
        }
    }
}

/// Convert BGR to 8-bit luma (BT.601 weights).
pub fn to_gray(bgr: &[u8], dst: &mut Vec<u8>) {
    dst.clear();
    dst.extend(bgr.chunks_exact(BYTES_PER_PIXEL).map(|px| {
        let luma = 0.114 * px[0] as f32 + 0.587 * px[1] as f32 + 0.299 * px[2] as f32;
        luma.round().min(255.0) as u8
    }));
}

/// Halve a grayscale image in both dimensions by averaging 2x2 blocks.
///
/// Odd trailing rows/columns are dropped. Returns the new `(width, height)`.
pub fn downscale_half(
    gray: &[u8],
    width: usize,
    height: usize,
    dst: &mut Vec<u8>,
) -> (usize, usize) {
    let (out_w, out_h) = (width / 2, height / 2);
    dst.clear();
    dst.reserve(out_w * out_h);
    for y in 0..out_h {
        let top = 2 * y * width;
        let bottom = top + width;
        for x in 0..out_w {
            let sum = gray[top + 2 * x] as u32
                + gray[top + 2 * x + 1] as u32
                + gray[bottom + 2 * x] as u32
                + gray[bottom + 2 * x + 1] as u32;
            dst.push(((sum + 2) / 4) as u8);
        }
    }
    (out_w, out_h)
}

/// Mean absolute difference between two equally sized grayscale images.
///
/// Returns `None` if the sizes differ or the images are empty.
pub fn motion_score(prev: &[u8], next: &[u8]) -> Option<f64> {
    if prev.len() != next.len() || prev.is_empty() {
        return None;
    }
    let total: u64 = prev
        .iter()
        .zip(next)
        .map(|(&a, &b)| a.abs_diff(b) as u64)
        .sum();
    Some(total as f64 / prev.len() as f64)
}

/// Convert a BGR frame into an RGB image.
///
/// Returns `None` if the data does not cover `width * height` pixels.
pub fn to_rgb_image(frame: &Frame) -> Option<RgbImage> {
    let rgb = frame
        .data
        .chunks_exact(BYTES_PER_PIXEL)
        .flat_map(|px| [px[2], px[1], px[0]])
        .collect();
    RgbImage::from_raw(frame.width, frame.height, rgb)
}

/// Save a frame to `path`: PNG for a `.png` extension, binary PPM otherwise.
pub fn save_frame(frame: &Frame, path: &Path) -> ImageResult<()> {
    let format = match ImageFormat::from_path(path) {
        Ok(ImageFormat::Png) => ImageFormat::Png,
        _ => ImageFormat::Pnm,
    };
    let image = to_rgb_image(frame).ok_or_else(|| {
        ImageError::Parameter(ParameterError::from_kind(
            ParameterErrorKind::DimensionMismatch,
        ))
    })?;
    image.save_with_format(path, format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn frame(data: Vec<u8>, width: u32, height: u32) -> Frame {
        Frame {
            data,
            width,
            height,
            sequence: 0,
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn test_stats_means_per_channel() {
        let stats = FrameStats::of(&[10, 20, 30, 30, 40, 50]);
        assert_eq!(stats.mean_blue, 20.0);
        assert_eq!(stats.mean_green, 30.0);
        assert_eq!(stats.mean_red, 40.0);
        assert_eq!(stats.nonzero, 1.0);
    }

    #[test]
    fn test_stats_blank_frame() {
        let stats = FrameStats::of(&[0; 12]);
        assert_eq!(stats.mean_blue, 0.0);
        assert_eq!(stats.nonzero, 0.0);
        assert_eq!(FrameStats::of(&[]).nonzero, 0.0);
    }

    #[test]
    fn test_stats_partial_nonzero() {
        let stats = FrameStats::of(&[0, 0, 6, 0, 0, 0]);
        assert!((stats.nonzero - 1.0 / 6.0).abs() < 1e-9);
        assert_eq!(stats.mean_red, 3.0);
    }

    #[test]
    fn test_to_gray_weights() {
        let mut gray = Vec::new();
        // Pure blue, pure green, pure red, white
        to_gray(&[255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255], &mut gray);
        assert_eq!(gray, vec![29, 150, 76, 255]);
    }

    #[test]
    fn test_downscale_half_averages_blocks() {
        #[rustfmt::skip]
        let gray = vec![
            0, 4, 10, 10, 7,
            8, 4, 10, 10, 7,
            1, 1, 1, 1, 1,
        ];
        let mut out = Vec::new();
        let dims = downscale_half(&gray, 5, 3, &mut out);
        assert_eq!(dims, (2, 1));
        assert_eq!(out, vec![4, 10]);
    }

    #[test]
    fn test_motion_score() {
        assert_eq!(motion_score(&[0, 10, 20], &[0, 10, 20]), Some(0.0));
        assert_eq!(motion_score(&[0, 10], &[10, 0]), Some(10.0));
        assert_eq!(motion_score(&[0, 10], &[0]), None);
        assert_eq!(motion_score(&[], &[]), None);
    }

    #[test]
    fn test_to_rgb_image_swaps_channels() {
        let f = frame(vec![1, 2, 3, 4, 5, 6], 2, 1);
        let image = to_rgb_image(&f).unwrap();
        assert_eq!(image.dimensions(), (2, 1));
        assert_eq!(image.get_pixel(0, 0).0, [3, 2, 1]);
        assert_eq!(image.get_pixel(1, 0).0, [6, 5, 4]);
    }

    #[test]
    fn test_to_rgb_image_rejects_short_data() {
        assert!(to_rgb_image(&frame(vec![1, 2, 3], 2, 1)).is_none());
    }

    #[test]
    fn test_save_frame_ppm_and_png() {
        let dir = tempfile::tempdir().unwrap();
        let f = frame(vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 0, 0, 255], 2, 2);

        for name in ["frame.ppm", "frame.png"] {
            let path = dir.path().join(name);
            save_frame(&f, &path).unwrap();
            let loaded = image::open(&path).unwrap().to_rgb8();
            assert_eq!(loaded.dimensions(), (2, 2));
            assert_eq!(loaded.get_pixel(0, 0).0, [30, 20, 10]);
            assert_eq!(loaded.get_pixel(1, 1).0, [255, 0, 0]);
        }

        let ppm = std::fs::read(dir.path().join("frame.ppm")).unwrap();
        assert_eq!(&ppm[..2], b"P6");
    }

    #[test]
    fn test_save_frame_size_mismatch_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.ppm");
        assert!(save_frame(&frame(vec![0; 3], 4, 4), &path).is_err());
        assert!(!path.exists());
    }
}
