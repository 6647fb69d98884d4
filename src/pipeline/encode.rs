//! Image preparation for OCR: bound the page size, normalise the colour
//! mode, and (for remote models) encode as base64 PNG.
//!
//! A 150 DPI letter page is ~1275×1650 px; the 1200×1600 box keeps every
//! page's working set close to that while preserving aspect ratio. Pages are
//! never upscaled.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::imageops::FilterType;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Fit `img` inside `max_width × max_height` and convert it to RGB8.
pub fn prepare_page(img: DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    let img = if img.width() > max_width || img.height() > max_height {
        img.resize(max_width, max_height, FilterType::Lanczos3)
    } else {
        img
    };

    match img {
        DynamicImage::ImageRgb8(_) => img,
        other => DynamicImage::ImageRgb8(other.into_rgb8()),
    }
}

/// Encode a prepared page as a base64 PNG ready for a vision API.
///
/// PNG is lossless; JPEG artefacts around glyph edges measurably hurt
/// transcription accuracy at 150 DPI.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}
