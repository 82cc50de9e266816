//! Book byte retrieval from disk or from archives.

use crate::config::ArchiveConfig;
use crate::db::{BookLocation, BookRecord};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use zip::ZipArchive;

/// Failure to obtain the bytes of a book.
#[derive(Error, Debug)]
pub enum ContentError {
    /// The book file or its archive does not exist.
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    /// The book file exists but could not be read.
    #[error("cannot read {path}: {source}")]
    Unreadable {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The archive could not be opened or the extractor could not run.
    #[error("cannot open archive {path}: {reason}")]
    ArchiveOpenFailed {
        /// Archive path.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The archive has no readable entry with that name.
    #[error("entry {entry} not found in {path}: {reason}")]
    EntryNotFound {
        /// Archive path.
        path: PathBuf,
        /// Requested entry.
        entry: String,
        /// What went wrong.
        reason: String,
    },
}

/// Container formats, chosen by the archive's own extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// ZIP, read in-process.
    Zip,
    /// RAR, read through `unrar`.
    Rar,
    /// 7z, read through `7z`.
    SevenZip,
}

impl ArchiveKind {
    /// Detect the archive kind from a path.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        match ext.to_lowercase().as_str() {
            "zip" => Some(Self::Zip),
            "rar" => Some(Self::Rar),
            "7z" => Some(Self::SevenZip),
            _ => None,
        }
    }
}

/// Resolves catalog rows to book bytes.
#[derive(Debug, Clone)]
pub struct ContentSource {
    unrar: PathBuf,
    seven_zip: PathBuf,
    timeout: Duration,
}

impl Default for ContentSource {
    fn default() -> Self {
        Self::new(&ArchiveConfig::default())
    }
}

impl ContentSource {
    /// Create a source using the configured extractor tools.
    pub fn new(config: &ArchiveConfig) -> Self {
        Self {
            unrar: config.unrar.clone(),
            seven_zip: config.seven_zip.clone(),
            timeout: config.timeout(),
        }
    }

    /// Read the full contents of a book. A failed attempt is not retried.
    pub async fn read_book_bytes(&self, book: &BookRecord) -> Result<Vec<u8>, ContentError> {
        match book.location() {
            BookLocation::File(path) => match tokio::fs::read(&path).await {
                Ok(data) => Ok(data),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(ContentError::NotFound(path))
                }
                Err(source) => Err(ContentError::Unreadable { path, source }),
            },
            BookLocation::Archived { archive, entry } => self.read_entry(&archive, &entry).await,
        }
    }

    /// Read one named entry from an archive.
    pub async fn read_entry(&self, archive: &Path, entry: &str) -> Result<Vec<u8>, ContentError> {
        if !archive.exists() {
            return Err(ContentError::NotFound(archive.to_path_buf()));
        }

        let kind = ArchiveKind::from_path(archive).ok_or_else(|| ContentError::ArchiveOpenFailed {
            path: archive.to_path_buf(),
            reason: "unsupported archive type".to_string(),
        })?;

        match kind {
            ArchiveKind::Zip => {
                let archive = archive.to_path_buf();
                let entry = entry.to_string();
                let path = archive.clone();
                tokio::task::spawn_blocking(move || read_zip_entry(&archive, &entry))
                    .await
                    .map_err(|e| ContentError::ArchiveOpenFailed {
                        path,
                        reason: e.to_string(),
                    })?
            }
            ArchiveKind::Rar => {
                self.run_extractor(&self.unrar, &["p", "-inul"], archive, entry)
                    .await
            }
            ArchiveKind::SevenZip => {
                self.run_extractor(&self.seven_zip, &["e", "-so"], archive, entry)
                    .await
            }
        }
    }

    /// Run an external extractor that writes the entry to stdout.
    async fn run_extractor(
        &self,
        tool: &Path,
        args: &[&str],
        archive: &Path,
        entry: &str,
    ) -> Result<Vec<u8>, ContentError> {
        let child = Command::new(tool)
            .args(args)
            .arg(archive)
            .arg(entry)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ContentError::ArchiveOpenFailed {
                path: archive.to_path_buf(),
                reason: format!("failed to run {}: {}", tool.display(), e),
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ContentError::ArchiveOpenFailed {
                path: archive.to_path_buf(),
                reason: format!("{} timed out after {:?}", tool.display(), self.timeout),
            })?
            .map_err(|e| ContentError::ArchiveOpenFailed {
                path: archive.to_path_buf(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(ContentError::EntryNotFound {
                path: archive.to_path_buf(),
                entry: entry.to_string(),
                reason: format!("{} exited with {}", tool.display(), output.status),
            });
        }

        if output.stdout.is_empty() {
            return Err(ContentError::EntryNotFound {
                path: archive.to_path_buf(),
                entry: entry.to_string(),
                reason: "extractor produced no output".to_string(),
            });
        }

        Ok(output.stdout)
    }
}

fn read_zip_entry(archive_path: &Path, entry: &str) -> Result<Vec<u8>, ContentError> {
    let open_failed = |reason: String| ContentError::ArchiveOpenFailed {
        path: archive_path.to_path_buf(),
        reason,
    };

    let file = std::fs::File::open(archive_path).map_err(|e| open_failed(e.to_string()))?;
    let mut archive = ZipArchive::new(file).map_err(|e| open_failed(e.to_string()))?;

    let mut zipped = archive
        .by_name(entry)
        .map_err(|e| ContentError::EntryNotFound {
            path: archive_path.to_path_buf(),
            entry: entry.to_string(),
            reason: e.to_string(),
        })?;

    let mut data = Vec::new();
    zipped
        .read_to_end(&mut data)
        .map_err(|e| ContentError::EntryNotFound {
            path: archive_path.to_path_buf(),
            entry: entry.to_string(),
            reason: e.to_string(),
        })?;

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_kind_from_extension() {
        assert_eq!(
            ArchiveKind::from_path(Path::new("/lib/books.ZIP")),
            Some(ArchiveKind::Zip)
        );
        assert_eq!(
            ArchiveKind::from_path(Path::new("/lib/books.rar")),
            Some(ArchiveKind::Rar)
        );
        assert_eq!(
            ArchiveKind::from_path(Path::new("/lib/books.7z")),
            Some(ArchiveKind::SevenZip)
        );
        assert_eq!(ArchiveKind::from_path(Path::new("/lib/books.tar")), None);
        assert_eq!(ArchiveKind::from_path(Path::new("/lib/books")), None);
    }
}
