use rusqlite::{Connection, OptionalExtension};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::AppState;

/// Fixed key the document lives under; one document per installation
pub const STATE_KEY: &str = "goaladmin_tracker_web_v1";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
    #[error("Failed to create database directory: {0}")]
    DirectoryError(String),
    #[error("Failed to encode document: {0}")]
    EncodeError(#[from] serde_json::Error),
}

/// Local, synchronous copy of the application state.
///
/// Backed by a single-row key/value table in SQLite.
pub struct LocalCache {
    conn: Connection,
}

impl LocalCache {
    /// Open (or create) the cache database and initialize the schema
    pub fn new(path: &str) -> Result<Self, CacheError> {
        let db_path = PathBuf::from(path);

        // Create parent directory if it doesn't exist
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| CacheError::DirectoryError(e.to_string()))?;
            }
        }

        let conn = Connection::open(&db_path)?;
        let cache = LocalCache { conn };
        cache.initialize_schema()?;
        Ok(cache)
    }

    /// In-memory cache, nothing survives the process
    pub fn in_memory() -> Result<Self, CacheError> {
        let cache = LocalCache {
            conn: Connection::open_in_memory()?,
        };
        cache.initialize_schema()?;
        Ok(cache)
    }

    fn initialize_schema(&self) -> Result<(), CacheError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key             TEXT PRIMARY KEY,
                value           TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Load the stored document.
    ///
    /// Never fails: a missing row, an unreadable row or a document that no
    /// longer parses all yield a freshly seeded default.
    pub fn load(&self) -> AppState {
        match self.try_load() {
            Ok(Some(state)) => state,
            Ok(None) => {
                debug!("no cached state, seeding defaults");
                AppState::seeded()
            }
            Err(e) => {
                warn!(error = %e, "cached state unreadable, seeding defaults");
                AppState::seeded()
            }
        }
    }

    fn try_load(&self) -> Result<Option<AppState>, CacheError> {
        let raw: Option<String> = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [STATE_KEY], |row| row.get(0))
            .optional()?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Replace the stored document
    pub fn save(&self, state: &AppState) -> Result<(), CacheError> {
        let json = serde_json::to_string(state)?;
        let now = chrono::Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            rusqlite::params![STATE_KEY, json, now],
        )?;
        Ok(())
    }

    /// Remove the stored document; the next `load` seeds defaults
    pub fn clear(&self) -> Result<(), CacheError> {
        self.conn.execute("DELETE FROM kv WHERE key = ?1", [STATE_KEY])?;
        Ok(())
    }

    /// Advisory timestamp of the last save, if any
    pub fn last_updated(&self) -> Result<Option<String>, CacheError> {
        let ts = self
            .conn
            .query_row("SELECT updated_at FROM kv WHERE key = ?1", [STATE_KEY], |row| row.get(0))
            .optional()?;
        Ok(ts)
    }

    /// Overwrite the stored value with raw text; used to simulate corruption
    #[doc(hidden)]
    pub fn write_raw(&self, value: &str) -> Result<(), CacheError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![STATE_KEY, value, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}
