use crate::db::{BookRecord, BookStore};
use crate::error::{AppError, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const BOOK_COLUMNS: &str = "id, title, author, genre, series, series_number, year, language,
     publisher, description, file_path, file_type, archive_path, archive_internal_path,
     added_date, last_modified";

/// Database wrapper for thread-safe access.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Open in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Initialize database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS books (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                author TEXT,
                genre TEXT,
                series TEXT,
                series_number INTEGER,
                year INTEGER,
                language TEXT,
                publisher TEXT,
                description TEXT,
                file_path TEXT NOT NULL,
                file_type TEXT NOT NULL,
                archive_path TEXT,
                archive_internal_path TEXT,
                added_date TEXT DEFAULT CURRENT_TIMESTAMP,
                last_modified TEXT DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_books_archive ON books(archive_path);
            "#,
        )
        .map_err(|e| AppError::Internal(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    /// Insert or replace a book row.
    pub fn save_book(&self, book: &BookRecord) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO books
             (id, title, author, genre, series, series_number, year, language, publisher,
              description, file_path, file_type, archive_path, archive_internal_path,
              added_date, last_modified)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                     COALESCE(?15, CURRENT_TIMESTAMP), COALESCE(?16, CURRENT_TIMESTAMP))
             ON CONFLICT (id) DO UPDATE SET
                title = excluded.title,
                author = excluded.author,
                genre = excluded.genre,
                series = excluded.series,
                series_number = excluded.series_number,
                year = excluded.year,
                language = excluded.language,
                publisher = excluded.publisher,
                description = excluded.description,
                file_path = excluded.file_path,
                file_type = excluded.file_type,
                archive_path = excluded.archive_path,
                archive_internal_path = excluded.archive_internal_path,
                last_modified = excluded.last_modified",
            params![
                book.id,
                book.title,
                book.author,
                book.genre,
                book.series,
                book.series_number,
                book.year,
                book.language,
                book.publisher,
                book.description,
                book.file_path.to_string_lossy().to_string(),
                book.file_type,
                book.archive_path
                    .as_ref()
                    .map(|p| p.to_string_lossy().to_string()),
                book.archive_internal_path,
                book.added_date,
                book.last_modified,
            ],
        )
        .map_err(|e| AppError::Internal(format!("Failed to save book: {}", e)))?;
        Ok(())
    }

    /// Get book by ID.
    pub fn get_book(&self, id: i64) -> Result<Option<BookRecord>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = ?1"),
            params![id],
            Self::row_to_book,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get book: {}", e)))
    }

    /// Count all books.
    pub fn book_count(&self) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM books", [], |row| row.get(0))
            .map_err(|e| AppError::Internal(format!("Failed to count books: {}", e)))
    }

    fn row_to_book(row: &Row<'_>) -> rusqlite::Result<BookRecord> {
        Ok(BookRecord {
            id: row.get(0)?,
            title: row.get(1)?,
            author: row.get(2)?,
            genre: row.get(3)?,
            series: row.get(4)?,
            series_number: row.get(5)?,
            year: row.get(6)?,
            language: row.get(7)?,
            publisher: row.get(8)?,
            description: row.get(9)?,
            file_path: PathBuf::from(row.get::<_, String>(10)?),
            file_type: row.get::<_, String>(11)?.to_lowercase(),
            archive_path: row.get::<_, Option<String>>(12)?.map(PathBuf::from),
            archive_internal_path: row.get(13)?,
            added_date: row.get(14)?,
            last_modified: row.get(15)?,
        })
    }
}

impl BookStore for Database {
    fn book(&self, id: i64) -> Result<Option<BookRecord>> {
        self.get_book(id)
    }
}
