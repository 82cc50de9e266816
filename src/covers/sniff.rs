//! Raster format detection by magic number.

use image::ImageReader;
use serde::Serialize;
use std::io::Cursor;

/// Buffers shorter than this are never treated as real images.
pub const MIN_IMAGE_SIZE: usize = 100;

/// Known raster formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// JPEG (`FF D8 FF`).
    Jpeg,
    /// PNG (`89 50 4E 47`).
    Png,
    /// GIF (`47 49 46 38`).
    Gif,
    /// BMP (`42 4D`).
    Bmp,
    /// WEBP, matched on the generic `RIFF` container header.
    Webp,
}

const SIGNATURES: &[(&[u8], ImageKind)] = &[
    (&[0xFF, 0xD8, 0xFF], ImageKind::Jpeg),
    (&[0x89, 0x50, 0x4E, 0x47], ImageKind::Png),
    (&[0x47, 0x49, 0x46, 0x38], ImageKind::Gif),
    (&[0x42, 0x4D], ImageKind::Bmp),
    // Any RIFF file matches, WAV and AVI included.
    (b"RIFF", ImageKind::Webp),
];

impl ImageKind {
    /// Match the leading bytes against known signatures, regardless of length.
    pub fn from_signature(data: &[u8]) -> Option<Self> {
        SIGNATURES
            .iter()
            .find(|(magic, _)| data.starts_with(magic))
            .map(|&(_, kind)| kind)
    }

    /// Whether the renderer can decode this kind.
    pub fn is_decodable(&self) -> bool {
        matches!(self, Self::Jpeg | Self::Png | Self::Gif)
    }

    /// Whether the format can carry transparency the thumbnail must flatten.
    pub fn has_alpha(&self) -> bool {
        matches!(self, Self::Png | Self::Gif)
    }

    /// MIME type of the format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Bmp => "image/bmp",
            Self::Webp => "image/webp",
        }
    }

    /// Corresponding `image` crate format for decodable kinds.
    pub fn image_format(&self) -> Option<image::ImageFormat> {
        match self {
            Self::Jpeg => Some(image::ImageFormat::Jpeg),
            Self::Png => Some(image::ImageFormat::Png),
            Self::Gif => Some(image::ImageFormat::Gif),
            Self::Bmp | Self::Webp => None,
        }
    }
}

/// Classify a buffer as a known raster image.
///
/// Returns `None` for buffers under [`MIN_IMAGE_SIZE`] bytes or with an
/// unrecognized signature.
pub fn classify(data: &[u8]) -> Option<ImageKind> {
    if data.len() < MIN_IMAGE_SIZE {
        return None;
    }
    ImageKind::from_signature(data)
}

/// What is known about an embedded image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageInfo {
    /// MIME type, if the buffer classifies as an image.
    pub mime: Option<&'static str>,
    /// Pixel width, for decodable formats with a readable header.
    pub width: Option<u32>,
    /// Pixel height.
    pub height: Option<u32>,
    /// Buffer size in bytes.
    pub size: usize,
}

/// Describe an image buffer without decoding its pixels.
pub fn describe(data: &[u8]) -> ImageInfo {
    let kind = classify(data);
    let dimensions = kind
        .filter(ImageKind::is_decodable)
        .and_then(|_| {
            ImageReader::new(Cursor::new(data))
                .with_guessed_format()
                .ok()?
                .into_dimensions()
                .ok()
        });

    ImageInfo {
        mime: kind.map(|k| k.mime_type()),
        width: dimensions.map(|(w, _)| w),
        height: dimensions.map(|(_, h)| h),
        size: data.len(),
    }
}
