//! Image pipeline for entry attachments.
//!
//! Uploaded bytes are decoded, downscaled so neither edge exceeds
//! [`MAX_DIMENSION`] (aspect ratio preserved, already-small images pass
//! through unresized), and re-encoded as JPEG at a fixed quality. The output
//! is what gets persisted; originals are never stored.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use memoir_types::{DiaryError, Result};

pub const MAX_DIMENSION: u32 = 1024;
pub const JPEG_QUALITY: u8 = 75;
pub const OUTPUT_MIME: &str = "image/jpeg";

/// The optimized bytes plus their (fixed) MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizedImage {
    pub data: Vec<u8>,
    pub mime_type: String,
}

/// Decode, bound, and re-encode an uploaded image.
///
/// Fails with `UnsupportedImageFormat` when the input cannot be decoded.
/// Deterministic on identical input.
pub fn optimize(input: &[u8]) -> Result<OptimizedImage> {
    let decoded = image::load_from_memory(input)
        .map_err(|e| DiaryError::UnsupportedImageFormat(e.to_string()))?;

    let (width, height) = (decoded.width(), decoded.height());
    let (target_w, target_h) = bounded_dimensions(width, height);

    let bounded = if (target_w, target_h) == (width, height) {
        decoded
    } else {
        decoded.resize_exact(target_w, target_h, FilterType::Triangle)
    };

    // JPEG has no alpha channel; flatten before encoding.
    let rgb = bounded.to_rgb8();
    let mut data = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut data, JPEG_QUALITY))
        .map_err(|e| DiaryError::Storage(anyhow::anyhow!("jpeg encoding failed: {e}")))?;

    Ok(OptimizedImage {
        data,
        mime_type: OUTPUT_MIME.to_string(),
    })
}

/// Scale `(width, height)` down so both edges fit within [`MAX_DIMENSION`],
/// preserving aspect ratio. Dimensions already within bounds are unchanged.
pub fn bounded_dimensions(width: u32, height: u32) -> (u32, u32) {
    if width <= MAX_DIMENSION && height <= MAX_DIMENSION {
        return (width, height);
    }

    let ratio_x = MAX_DIMENSION as f64 / width as f64;
    let ratio_y = MAX_DIMENSION as f64 / height as f64;
    let ratio = ratio_x.min(ratio_y);

    (
        ((width as f64 * ratio) as u32).max(1),
        ((height as f64 * ratio) as u32).max(1),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn bounded_dimensions_math() {
        assert_eq!(bounded_dimensions(2048, 1536), (1024, 768));
        assert_eq!(bounded_dimensions(1536, 2048), (768, 1024));
        assert_eq!(bounded_dimensions(500, 400), (500, 400));
        assert_eq!(bounded_dimensions(1024, 1024), (1024, 1024));
        assert_eq!(bounded_dimensions(4096, 100), (1024, 25));
    }

    #[test]
    fn oversized_input_is_bounded_with_aspect_preserved() {
        let out = optimize(&png_bytes(2048, 1536)).unwrap();
        assert_eq!(out.mime_type, OUTPUT_MIME);

        let decoded = image::load_from_memory(&out.data).unwrap();
        assert!(decoded.width() <= MAX_DIMENSION);
        assert!(decoded.height() <= MAX_DIMENSION);

        let original_aspect = 2048.0 / 1536.0;
        let result_aspect = decoded.width() as f64 / decoded.height() as f64;
        assert!((original_aspect - result_aspect).abs() < 0.01);
    }

    #[test]
    fn small_input_passes_through_unresized() {
        let out = optimize(&png_bytes(500, 400)).unwrap();
        let decoded = image::load_from_memory(&out.data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (500, 400));
        assert_eq!(image::guess_format(&out.data).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn undecodable_input_is_rejected() {
        let err = optimize(b"definitely not an image").unwrap_err();
        assert!(matches!(err, DiaryError::UnsupportedImageFormat(_)));
    }

    #[test]
    fn deterministic_on_identical_input() {
        let input = png_bytes(800, 600);
        assert_eq!(optimize(&input).unwrap(), optimize(&input).unwrap());
    }
}
