//! Thumbnail rendering.

use crate::covers::sniff::ImageKind;
use crate::error::{AppError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage, RgbaImage};

/// Default JPEG quality for thumbnails.
pub const DEFAULT_QUALITY: u8 = 85;

/// Background that transparent pixels are flattened onto.
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// Fit `(width, height)` into a bounding box, preserving aspect ratio.
///
/// The ratio is not clamped to 1, so images smaller than the box are scaled
/// up. Each axis is floored, with a minimum of one pixel.
pub fn fit_dimensions(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    let ratio = f64::min(
        max_width as f64 / width as f64,
        max_height as f64 / height as f64,
    );
    let new_width = ((width as f64 * ratio).floor() as u32).max(1);
    let new_height = ((height as f64 * ratio).floor() as u32).max(1);
    (new_width, new_height)
}

/// Render a JPEG thumbnail fitted into `max_width` x `max_height`.
///
/// Only JPEG, PNG and GIF sources are decoded. Returns `None` when the source
/// cannot be decoded.
pub fn render(source: &[u8], max_width: u32, max_height: u32, quality: u8) -> Option<Vec<u8>> {
    match try_render(source, max_width, max_height, quality) {
        Ok(data) => Some(data),
        Err(e) => {
            tracing::debug!(error = %e, "Thumbnail rendering failed");
            None
        }
    }
}

fn try_render(source: &[u8], max_width: u32, max_height: u32, quality: u8) -> Result<Vec<u8>> {
    let kind = ImageKind::from_signature(source)
        .ok_or_else(|| AppError::Internal("unrecognized image signature".into()))?;
    if !kind.is_decodable() {
        return Err(AppError::Internal(format!("{:?} images are not decoded", kind)));
    }
    let format = kind
        .image_format()
        .ok_or_else(|| AppError::Internal(format!("no decoder for {:?}", kind)))?;

    let img = image::load_from_memory_with_format(source, format)?;
    if img.width() == 0 || img.height() == 0 {
        return Err(AppError::Internal("image has no pixels".into()));
    }

    let (new_width, new_height) = fit_dimensions(img.width(), img.height(), max_width, max_height);

    let rgb = if kind.has_alpha() {
        flatten(&img.to_rgba8())
    } else {
        img.to_rgb8()
    };

    let resized = image::imageops::resize(&rgb, new_width, new_height, FilterType::Triangle);

    let mut jpeg_data = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg_data, quality);
    encoder.encode_image(&DynamicImage::ImageRgb8(resized))?;

    Ok(jpeg_data)
}

/// Composite an RGBA image over the opaque background.
fn flatten(rgba: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = a as u32;
        let blend = |fg: u8, bg: u8| ((fg as u32 * alpha + bg as u32 * (255 - alpha) + 127) / 255) as u8;
        Rgb([
            blend(r, BACKGROUND.0[0]),
            blend(g, BACKGROUND.0[1]),
            blend(b, BACKGROUND.0[2]),
        ])
    })
}
