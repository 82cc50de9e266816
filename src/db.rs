mod schema;

pub use schema::Database;

use crate::error::Result;
use std::path::PathBuf;

/// Where the bytes of a book live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookLocation {
    /// Standalone file on disk.
    File(PathBuf),
    /// Entry inside a ZIP, RAR or 7z archive.
    Archived {
        /// Path to the container archive.
        archive: PathBuf,
        /// Path of the book within the archive.
        entry: String,
    },
}

/// Row of the `books` table.
#[derive(Debug, Clone)]
pub struct BookRecord {
    /// Book ID.
    pub id: i64,
    /// Book title.
    pub title: String,
    /// Author.
    pub author: Option<String>,
    /// FB2 genre code.
    pub genre: Option<String>,
    /// Series name.
    pub series: Option<String>,
    /// Position in series.
    pub series_number: Option<i64>,
    /// Publication year.
    pub year: Option<i64>,
    /// Language code.
    pub language: Option<String>,
    /// Publisher.
    pub publisher: Option<String>,
    /// Annotation.
    pub description: Option<String>,
    /// Absolute path to the book file.
    pub file_path: PathBuf,
    /// Lowercase file extension (fb2, epub, pdf, mobi, txt).
    pub file_type: String,
    /// Container archive path.
    pub archive_path: Option<PathBuf>,
    /// Path of the book inside the archive.
    pub archive_internal_path: Option<String>,
    /// Date the row was added.
    pub added_date: Option<String>,
    /// Date the row was last modified.
    pub last_modified: Option<String>,
}

impl BookRecord {
    /// Create a record for a standalone file with the remaining fields empty.
    pub fn new(id: i64, file_path: impl Into<PathBuf>, file_type: impl Into<String>) -> Self {
        let file_path = file_path.into();
        let title = file_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Unknown")
            .to_string();

        Self {
            id,
            title,
            author: None,
            genre: None,
            series: None,
            series_number: None,
            year: None,
            language: None,
            publisher: None,
            description: None,
            file_path,
            file_type: file_type.into().to_lowercase(),
            archive_path: None,
            archive_internal_path: None,
            added_date: None,
            last_modified: None,
        }
    }

    /// Place the book inside an archive.
    pub fn in_archive(mut self, archive: impl Into<PathBuf>, entry: impl Into<String>) -> Self {
        self.archive_path = Some(archive.into());
        self.archive_internal_path = Some(entry.into());
        self
    }

    /// Resolve where the book bytes are stored.
    ///
    /// Archive path and internal path only count when both are set; a row
    /// with just one of them is read as a plain file.
    pub fn location(&self) -> BookLocation {
        match (&self.archive_path, &self.archive_internal_path) {
            (Some(archive), Some(entry))
                if !archive.as_os_str().is_empty() && !entry.is_empty() =>
            {
                BookLocation::Archived {
                    archive: archive.clone(),
                    entry: entry.clone(),
                }
            }
            _ => BookLocation::File(self.file_path.clone()),
        }
    }

    /// Whether this book is an FB2 document.
    pub fn is_fb2(&self) -> bool {
        self.file_type.eq_ignore_ascii_case("fb2")
    }
}

/// Read access to catalog rows.
pub trait BookStore: Send + Sync {
    /// Look up a book by ID.
    fn book(&self, id: i64) -> Result<Option<BookRecord>>;
}
