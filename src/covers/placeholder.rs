//! "No Cover" placeholder images.

use crate::covers::CoverVariant;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage};

/// Placeholder size for the full variant.
pub const FULL_SIZE: (u32, u32) = (600, 800);

/// Placeholder size for the thumbnail variant.
pub const THUMB_SIZE: (u32, u32) = (200, 300);

/// JPEG quality of placeholders.
pub const QUALITY: u8 = 75;

const LABEL: &str = "No Cover";

const BACKGROUND: Rgb<u8> = Rgb([240, 240, 240]);
const BORDER: Rgb<u8> = Rgb([200, 200, 200]);
const TEXT: Rgb<u8> = Rgb([150, 150, 150]);

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
const GLYPH_ADVANCE: u32 = GLYPH_WIDTH + 1;

/// 5x7 bitmap rows, most significant of the low five bits is the left column.
fn glyph(c: char) -> [u8; 7] {
    match c {
        'N' => [0x11, 0x19, 0x15, 0x13, 0x11, 0x11, 0x11],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'o' => [0x00, 0x00, 0x0E, 0x11, 0x11, 0x11, 0x0E],
        'v' => [0x00, 0x00, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'e' => [0x00, 0x00, 0x0E, 0x11, 0x1F, 0x10, 0x0E],
        'r' => [0x00, 0x00, 0x16, 0x19, 0x10, 0x10, 0x10],
        _ => [0x00; 7],
    }
}

/// Canvas size for a variant.
pub fn dimensions(variant: CoverVariant) -> (u32, u32) {
    match variant {
        CoverVariant::Full => FULL_SIZE,
        CoverVariant::Thumb => THUMB_SIZE,
    }
}

/// Pixel scale of the label font.
fn font_scale(variant: CoverVariant) -> u32 {
    match variant {
        CoverVariant::Full => 3,
        CoverVariant::Thumb => 2,
    }
}

/// Draw the placeholder canvas.
pub fn draw(variant: CoverVariant) -> RgbImage {
    let (width, height) = dimensions(variant);
    let mut img = RgbImage::from_pixel(width, height, BACKGROUND);

    for x in 0..width {
        img.put_pixel(x, 0, BORDER);
        img.put_pixel(x, height - 1, BORDER);
    }
    for y in 0..height {
        img.put_pixel(0, y, BORDER);
        img.put_pixel(width - 1, y, BORDER);
    }

    let scale = font_scale(variant);
    let text_width = GLYPH_ADVANCE * scale * LABEL.chars().count() as u32 - scale;
    let text_height = GLYPH_HEIGHT * scale;
    let origin_x = (width - text_width) / 2;
    let origin_y = (height - text_height) / 2;

    for (i, c) in LABEL.chars().enumerate() {
        let glyph_x = origin_x + i as u32 * GLYPH_ADVANCE * scale;
        for (row, &bits) in glyph(c).iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (0x10u8 >> col) == 0 {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        img.put_pixel(
                            glyph_x + col * scale + dx,
                            origin_y + row as u32 * scale + dy,
                            TEXT,
                        );
                    }
                }
            }
        }
    }

    img
}

/// Render the placeholder as JPEG bytes.
pub fn render(variant: CoverVariant) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(draw(variant));

    let mut jpeg_data = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg_data, QUALITY);
    if let Err(e) = encoder.encode_image(&img) {
        tracing::error!(error = %e, "Failed to encode placeholder");
    }

    jpeg_data
}
