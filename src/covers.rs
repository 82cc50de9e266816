//! Embedded cover extraction and caching.
//!
//! A cover request goes through [`CoverStore`], which serves the on-disk cache
//! or runs the pipeline: [`ContentSource`] reads the book bytes,
//! [`Fb2CoverLocator`] finds the embedded image, [`thumbnail`] downscales it and
//! the result is persisted. Any failure falls back to a [`placeholder`].

mod fb2;
pub mod placeholder;
pub mod sniff;
mod source;
mod store;
pub mod thumbnail;

pub use fb2::{CoverLocator, CoverStrategy, Fb2CoverLocator, LocatedCover};
pub use sniff::{ImageInfo, ImageKind};
pub use source::{ArchiveKind, ContentError, ContentSource};
pub use store::{
    CACHED_MAX_AGE, CacheStats, Cover, CoverError, CoverInfo, CoverOptions, CoverStore,
    PLACEHOLDER_MAX_AGE,
};

/// The two served cover sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoverVariant {
    /// Original embedded image, stored as-is.
    Full,
    /// Downscaled JPEG thumbnail.
    Thumb,
}

impl CoverVariant {
    /// Pick the variant from the presence of a thumbnail flag.
    pub fn from_thumb_flag(thumb: bool) -> Self {
        if thumb { Self::Thumb } else { Self::Full }
    }

    /// Suffix appended to the book ID in the cache file name.
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Full => "",
            Self::Thumb => "_thumb",
        }
    }

    /// Cache file name for a book.
    pub fn file_name(&self, book_id: i64) -> String {
        format!("{}{}.jpg", book_id, self.suffix())
    }
}

impl std::fmt::Display for CoverVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => f.write_str("full"),
            Self::Thumb => f.write_str("thumb"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_file_names() {
        assert_eq!(CoverVariant::Full.file_name(42), "42.jpg");
        assert_eq!(CoverVariant::Thumb.file_name(42), "42_thumb.jpg");
    }

    #[test]
    fn thumb_flag_selects_variant() {
        assert_eq!(CoverVariant::from_thumb_flag(true), CoverVariant::Thumb);
        assert_eq!(CoverVariant::from_thumb_flag(false), CoverVariant::Full);
    }
}
