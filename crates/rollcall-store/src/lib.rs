//! Persistence layer for rollcall
//!
//! Provides:
//! - A flat key-value record store (instructors, settings, snapshots)
//! - Verified setters that re-read after every write
//! - Startup preparation: first-run seeding and snapshot truncation

mod sqlite;
mod traits;
mod verified;

pub use sqlite::*;
pub use traits::*;
pub use verified::*;

use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
