//! Shrinks uploads to something cheap to send to the vision model.

use std::io::Cursor;
use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageOutputFormat};

pub const JPEG_MEDIA_TYPE: &str = "image/jpeg";
const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("failed to read upload: {0}")]
    Read(#[from] std::io::Error),
    #[error("upload is not a decodable image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),
    #[error("image worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSettings {
    /// When off, the upload is forwarded untouched.
    pub resize: bool,
    pub max_width: u32,
    pub jpeg_quality: u8,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            resize: true,
            max_width: 1024,
            jpeg_quality: 80,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    pub bytes: Vec<u8>,
    pub media_type: String,
}

pub async fn normalize(
    path: &Path,
    declared_media_type: Option<&str>,
    settings: &ImageSettings,
) -> Result<NormalizedImage, NormalizeError> {
    let data = tokio::fs::read(path).await?;

    if !settings.resize {
        return Ok(NormalizedImage {
            bytes: data,
            media_type: declared_media_type
                .unwrap_or(FALLBACK_MEDIA_TYPE)
                .to_string(),
        });
    }

    let settings = *settings;
    // Decoding and encoding are CPU-bound.
    let bytes = tokio::task::spawn_blocking(move || reencode(&data, &settings)).await??;

    Ok(NormalizedImage {
        bytes,
        media_type: JPEG_MEDIA_TYPE.to_string(),
    })
}

/// Decode, cap the width and re-encode as JPEG.
pub fn reencode(data: &[u8], settings: &ImageSettings) -> Result<Vec<u8>, NormalizeError> {
    let img = image::load_from_memory(data).map_err(NormalizeError::Decode)?;

    let (width, height) = img.dimensions();
    let img = match target_dimensions(width, height, settings.max_width) {
        Some((w, h)) => img.resize_exact(w, h, FilterType::Triangle),
        None => img,
    };

    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());

    let mut jpeg_bytes = Vec::new();
    rgb.write_to(
        &mut Cursor::new(&mut jpeg_bytes),
        ImageOutputFormat::Jpeg(settings.jpeg_quality),
    )
    .map_err(NormalizeError::Encode)?;

    Ok(jpeg_bytes)
}

/// New size when `width` exceeds `max_width`, keeping the aspect ratio.
fn target_dimensions(width: u32, height: u32, max_width: u32) -> Option<(u32, u32)> {
    if width <= max_width {
        return None;
    }
    let ratio = height as f64 / width as f64;
    let new_height = (max_width as f64 * ratio).round() as u32;
    Some((max_width, new_height.max(1)))
}
