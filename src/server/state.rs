//! Application state shared across handlers.

use crate::config::Config;
use crate::covers::{ContentSource, CoverOptions, CoverStore};
use crate::db::Database;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Database connection.
    pub db: Database,
    /// Cover cache and extraction pipeline.
    pub covers: Arc<CoverStore>,
}

impl AppState {
    /// Create application state over an opened database.
    pub fn new_with_db(config: &Config, db: Database) -> Self {
        let covers = CoverStore::new(
            Arc::new(db.clone()),
            ContentSource::new(&config.archive),
            CoverOptions::from_config(&config.cache),
        );

        Self {
            db,
            covers: Arc::new(covers),
        }
    }
}
