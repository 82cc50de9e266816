//! opds-covers: embedded cover extraction and caching for e-book libraries.
//!
//! This crate serves book covers for an OPDS catalog. Covers are pulled out of
//! FB2 documents, which may sit on disk or inside ZIP, RAR or 7z archives,
//! downscaled into thumbnails and cached on disk. Anything that cannot produce
//! a real cover is answered with a generated placeholder.
//!
//! # Features
//!
//! - FB2 coverpage resolution with a first-image fallback
//! - Magic-number image sniffing
//! - Aspect-preserving JPEG thumbnails
//! - Atomic on-disk cover cache
//! - `GET /cover?id=<int>[&thumb]` endpoint

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Configuration and CLI.
pub mod config;
/// Cover extraction, thumbnails and caching.
pub mod covers;
/// Book catalog access.
pub mod db;
/// Error types.
pub mod error;
/// HTTP server.
pub mod server;


pub use config::{Cli, Command, Config};
pub use covers::{Cover, CoverStore, CoverVariant};
pub use db::{BookRecord, BookStore, Database};
pub use error::{AppError, Result};
pub use server::AppState;
