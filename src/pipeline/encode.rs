//! Image encoding: chunk pixels → base64 PNG wrapped in `ImageData`, and
//! overlay pixels → file bytes.
//!
//! Chunks always go to the model as lossless PNG.

use crate::config::OverlayFormat;
use crate::error::TamperError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::{DynamicImage, RgbaImage};
use std::io::Cursor;
use tracing::debug;

/// Encode one chunk as a base64 PNG ready for the VLM API.
///
/// `detail: "high"` keeps GPT-4-class models from downsampling a strip to a
/// single low-resolution tile, which would erase font-level differences.
pub fn encode_chunk(pixels: &RgbaImage) -> Result<ImageData, TamperError> {
    let buf = encode_png(pixels)?;
    let b64 = STANDARD.encode(&buf);
    debug!("Encoded chunk → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Encode the rendered overlay for storage.
pub fn encode_overlay(image: &RgbaImage, format: OverlayFormat) -> Result<Vec<u8>, TamperError> {
    match format {
        OverlayFormat::Png => encode_png(image),
        OverlayFormat::Jpeg => {
            // The JPEG encoder rejects alpha; the overlay is opaque anyway.
            let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut buf = Vec::new();
            rgb.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)
                .map_err(|e| TamperError::ImageEncoding(e.to_string()))?;
            Ok(buf)
        }
    }
}

fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, TamperError> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| TamperError::ImageEncoding(e.to_string()))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn encode_small_chunk() {
        let img = RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255]));
        let data = encode_chunk(&img).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(&decoded[1..4], b"PNG");
    }

    #[test]
    fn overlay_png_round_trips_dimensions() {
        let img = RgbaImage::from_pixel(12, 7, Rgba([0, 255, 0, 255]));
        let bytes = encode_overlay(&img, OverlayFormat::Png).unwrap();
        let back = image::load_from_memory(&bytes).unwrap();
        assert_eq!((back.width(), back.height()), (12, 7));
    }

    #[test]
    fn overlay_jpeg_has_jpeg_magic() {
        let img = RgbaImage::from_pixel(16, 16, Rgba([10, 20, 30, 255]));
        let bytes = encode_overlay(&img, OverlayFormat::Jpeg).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }
}
