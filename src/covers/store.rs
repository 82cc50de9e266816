//! On-disk cover cache and the extraction pipeline behind it.

use crate::config::CacheConfig;
use crate::covers::fb2::{CoverLocator, CoverStrategy, Fb2CoverLocator};
use crate::covers::sniff::{self, ImageInfo};
use crate::covers::source::{ContentError, ContentSource};
use crate::covers::{CoverVariant, placeholder, thumbnail};
use crate::db::{BookLocation, BookStore};
use crate::error::AppError;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use thiserror::Error;
use walkdir::WalkDir;

/// `Cache-Control` for covers that came from the cache or a fresh extraction.
pub const CACHED_MAX_AGE: u32 = 86400;

/// `Cache-Control` for placeholders.
pub const PLACEHOLDER_MAX_AGE: u32 = 3600;

/// Why a cover could not be produced.
#[derive(Error, Debug)]
pub enum CoverError {
    /// No catalog row with this ID.
    #[error("book {0} not found")]
    BookNotFound(i64),

    /// The catalog lookup itself failed.
    #[error("book lookup failed: {0}")]
    LookupFailed(#[source] AppError),

    /// The book file or archive entry could not be read.
    #[error("content unreadable: {0}")]
    ContentUnreadable(#[from] ContentError),

    /// No embedded cover, or the format has no cover support.
    #[error("no cover present")]
    CoverNotPresent,

    /// Base64 or raster decoding failed.
    #[error("decode failed: {0}")]
    DecodeFailed(String),

    /// The cache directory or file could not be written.
    #[error("cache write failed: {0}")]
    CacheWriteFailed(#[from] std::io::Error),
}

/// Cache and thumbnail settings.
#[derive(Debug, Clone)]
pub struct CoverOptions {
    /// Flat directory holding `{id}.jpg` and `{id}_thumb.jpg`.
    pub cache_dir: PathBuf,
    /// Thumbnail bounding box width.
    pub thumb_width: u32,
    /// Thumbnail bounding box height.
    pub thumb_height: u32,
    /// Thumbnail JPEG quality.
    pub quality: u8,
}

impl CoverOptions {
    /// Build options from the cache configuration.
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            cache_dir: config.covers_dir.clone(),
            thumb_width: config.thumb_width,
            thumb_height: config.thumb_height,
            quality: config.jpeg_quality,
        }
    }
}

/// Result of a cover request.
#[derive(Debug)]
pub enum Cover {
    /// Path of a cached JPEG.
    Cached(PathBuf),
    /// Freshly rendered placeholder, never written to disk.
    Placeholder(Vec<u8>),
}

impl Cover {
    /// Whether this is a placeholder.
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Cover::Placeholder(_))
    }

    /// Value of the `Cache-Control` response header.
    pub fn cache_control(&self) -> String {
        let max_age = match self {
            Cover::Cached(_) => CACHED_MAX_AGE,
            Cover::Placeholder(_) => PLACEHOLDER_MAX_AGE,
        };
        format!("public, max-age={}", max_age)
    }
}

/// Cache directory statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Cache directory.
    pub covers_dir: String,
    /// Whether the directory exists.
    pub exists: bool,
    /// Number of full-size covers.
    pub full_covers: usize,
    /// Number of thumbnails.
    pub thumbnails: usize,
    /// Total size of cached files.
    pub total_bytes: u64,
}

/// Per-book cover diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct CoverInfo {
    /// Book ID.
    pub book_id: i64,
    /// Book title.
    pub title: String,
    /// Lowercase file type.
    pub file_type: String,
    /// Book file path.
    pub file_path: String,
    /// Container archive, for archived books.
    pub archive_path: Option<String>,
    /// Entry inside the archive.
    pub archive_entry: Option<String>,
    /// Whether the book file or its archive exists.
    pub source_exists: bool,
    /// Size of the book content, when it could be read.
    pub content_bytes: Option<usize>,
    /// Lookup that found the cover.
    pub strategy: Option<CoverStrategy>,
    /// The embedded cover image.
    pub image: Option<ImageInfo>,
    /// Whether `{id}.jpg` is cached.
    pub cached_full: bool,
    /// Whether `{id}_thumb.jpg` is cached.
    pub cached_thumb: bool,
    /// Why no cover was found.
    pub error: Option<String>,
}

type KeyLock = Arc<tokio::sync::Mutex<()>>;
type InflightMap = Mutex<HashMap<(i64, CoverVariant), KeyLock>>;

/// Registration of one request in the in-flight map.
///
/// Dropping it, including when the request future is cancelled, removes the
/// key once no other request holds it.
struct InflightEntry<'a> {
    map: &'a InflightMap,
    key: (i64, CoverVariant),
    lock: KeyLock,
}

impl<'a> InflightEntry<'a> {
    fn register(map: &'a InflightMap, key: (i64, CoverVariant)) -> Self {
        let lock = Arc::clone(map.lock().entry(key).or_default());
        Self { map, key, lock }
    }
}

impl Drop for InflightEntry<'_> {
    fn drop(&mut self) {
        let mut map = self.map.lock();
        // Only the map and this entry hold the lock: no one else is waiting.
        if Arc::strong_count(&self.lock) == 2
            && map.get(&self.key).is_some_and(|l| Arc::ptr_eq(l, &self.lock))
        {
            map.remove(&self.key);
        }
    }
}

/// Maps `(book id, variant)` to a cached JPEG, extracting it on a miss.
pub struct CoverStore {
    books: Arc<dyn BookStore>,
    source: ContentSource,
    locator: Arc<dyn CoverLocator>,
    options: CoverOptions,
    inflight: InflightMap,
}

impl CoverStore {
    /// Create a store backed by the given catalog.
    pub fn new(books: Arc<dyn BookStore>, source: ContentSource, options: CoverOptions) -> Self {
        Self {
            books,
            source,
            locator: Arc::new(Fb2CoverLocator),
            options,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the cover locator.
    pub fn with_locator(mut self, locator: Arc<dyn CoverLocator>) -> Self {
        self.locator = locator;
        self
    }

    /// Cache directory.
    pub fn cache_dir(&self) -> &Path {
        &self.options.cache_dir
    }

    /// Cache file path for a book and variant.
    pub fn cache_path(&self, book_id: i64, variant: CoverVariant) -> PathBuf {
        self.options.cache_dir.join(variant.file_name(book_id))
    }

    /// Get a cover, serving the cache or extracting it.
    ///
    /// Never fails: any pipeline error is logged and answered with a
    /// placeholder. Concurrent misses for the same key run one extraction.
    pub async fn get_cover(&self, book_id: i64, variant: CoverVariant) -> Cover {
        let path = self.cache_path(book_id, variant);
        if path.is_file() {
            tracing::debug!(book_id, %variant, "Cover cache hit");
            return Cover::Cached(path);
        }

        let entry = InflightEntry::register(&self.inflight, (book_id, variant));
        let result = {
            let _guard = entry.lock.lock().await;
            if path.is_file() {
                Ok(path)
            } else {
                self.extract(book_id, variant, path).await
            }
        };
        drop(entry);

        match result {
            Ok(path) => Cover::Cached(path),
            Err(e) => {
                match &e {
                    CoverError::BookNotFound(_) | CoverError::CoverNotPresent => {
                        tracing::debug!(book_id, %variant, error = %e, "Serving placeholder");
                    }
                    _ => {
                        tracing::warn!(book_id, %variant, error = %e, "Cover extraction failed");
                    }
                }
                Cover::Placeholder(placeholder::render(variant))
            }
        }
    }

    /// Run the extraction pipeline and persist the result.
    async fn extract(
        &self,
        book_id: i64,
        variant: CoverVariant,
        path: PathBuf,
    ) -> Result<PathBuf, CoverError> {
        let book = self
            .books
            .book(book_id)
            .map_err(CoverError::LookupFailed)?
            .ok_or(CoverError::BookNotFound(book_id))?;

        // Only FB2 carries a locatable cover.
        if !book.is_fb2() {
            return Err(CoverError::CoverNotPresent);
        }

        let content = self.source.read_book_bytes(&book).await?;

        let locator = Arc::clone(&self.locator);
        let cover = tokio::task::spawn_blocking(move || locator.find_cover(&content))
            .await
            .map_err(|e| CoverError::DecodeFailed(e.to_string()))?
            .ok_or(CoverError::CoverNotPresent)?;

        let data = match variant {
            // Full covers are stored exactly as embedded.
            CoverVariant::Full => cover,
            CoverVariant::Thumb => {
                let (width, height, quality) = (
                    self.options.thumb_width,
                    self.options.thumb_height,
                    self.options.quality,
                );
                tokio::task::spawn_blocking(move || {
                    thumbnail::render(&cover, width, height, quality)
                })
                .await
                .map_err(|e| CoverError::DecodeFailed(e.to_string()))?
                .ok_or_else(|| CoverError::DecodeFailed("cover image not decodable".into()))?
            }
        };

        self.persist(&path, &data)?;

        tracing::info!(
            book_id,
            %variant,
            path = %path.display(),
            bytes = data.len(),
            "Cover extracted"
        );

        Ok(path)
    }

    /// Number of keys with a request in flight.
    #[cfg(test)]
    pub(crate) fn inflight_keys(&self) -> usize {
        self.inflight.lock().len()
    }

    /// Diagnose cover extraction for one book without touching the cache.
    ///
    /// Only a missing or unreadable catalog row is an error; pipeline
    /// failures are reported in [`CoverInfo::error`].
    pub async fn inspect(&self, book_id: i64) -> Result<CoverInfo, CoverError> {
        let book = self
            .books
            .book(book_id)
            .map_err(CoverError::LookupFailed)?
            .ok_or(CoverError::BookNotFound(book_id))?;

        let source_exists = match book.location() {
            BookLocation::File(path) => path.is_file(),
            BookLocation::Archived { archive, .. } => archive.is_file(),
        };

        let mut info = CoverInfo {
            book_id,
            title: book.title.clone(),
            file_type: book.file_type.clone(),
            file_path: book.file_path.display().to_string(),
            archive_path: book.archive_path.as_ref().map(|p| p.display().to_string()),
            archive_entry: book.archive_internal_path.clone(),
            source_exists,
            content_bytes: None,
            strategy: None,
            image: None,
            cached_full: self.cache_path(book_id, CoverVariant::Full).is_file(),
            cached_thumb: self.cache_path(book_id, CoverVariant::Thumb).is_file(),
            error: None,
        };

        if !book.is_fb2() {
            info.error = Some(CoverError::CoverNotPresent.to_string());
            return Ok(info);
        }

        let content = match self.source.read_book_bytes(&book).await {
            Ok(content) => content,
            Err(e) => {
                info.error = Some(CoverError::from(e).to_string());
                return Ok(info);
            }
        };
        info.content_bytes = Some(content.len());

        let locator = Arc::clone(&self.locator);
        let located = tokio::task::spawn_blocking(move || locator.locate(&content))
            .await
            .map_err(|e| CoverError::DecodeFailed(e.to_string()))?;

        match located {
            Some(cover) => {
                info.strategy = Some(cover.strategy);
                info.image = Some(sniff::describe(&cover.data));
            }
            None => info.error = Some(CoverError::CoverNotPresent.to_string()),
        }

        Ok(info)
    }

    /// Write a cache file through a temporary file in the cache directory.
    fn persist(&self, path: &Path, data: &[u8]) -> std::io::Result<()> {
        create_cache_dir(&self.options.cache_dir)?;

        let mut tmp = NamedTempFile::new_in(&self.options.cache_dir)?;
        tmp.write_all(data)?;
        tmp.flush()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o644))?;
        }

        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Cached `.jpg` files as `(path, size)`.
    fn cached_files(&self) -> Vec<(PathBuf, u64)> {
        WalkDir::new(&self.options.cache_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "jpg"))
            .map(|e| {
                let size = e.metadata().map(|m| m.len()).unwrap_or(0);
                (e.into_path(), size)
            })
            .collect()
    }

    /// Count cached covers.
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            covers_dir: self.options.cache_dir.display().to_string(),
            exists: self.options.cache_dir.is_dir(),
            ..Default::default()
        };

        for (path, size) in self.cached_files() {
            let is_thumb = path
                .file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|s| s.ends_with(CoverVariant::Thumb.suffix()));
            if is_thumb {
                stats.thumbnails += 1;
            } else {
                stats.full_covers += 1;
            }
            stats.total_bytes += size;
        }

        stats
    }

    /// Delete every cached cover, returning how many files were removed.
    pub fn clear(&self) -> std::io::Result<usize> {
        let mut removed = 0;
        for (path, _) in self.cached_files() {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }

        tracing::info!(removed, dir = %self.options.cache_dir.display(), "Cover cache cleared");
        Ok(removed)
    }
}

/// Create the cache directory with mode 0755 if it is missing.
fn create_cache_dir(dir: &Path) -> std::io::Result<()> {
    if dir.is_dir() {
        return Ok(());
    }

    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder.create(dir)
}
