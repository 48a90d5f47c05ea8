//! Storage error handling
//!
//! Typed errors for store operations. A missing bookmark on a direct get
//! is its own outcome, distinct from any database fault.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to create the data directory
    #[error("Failed to create data directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Direct lookup of an id that has no row
    #[error("Bookmark '{id}' not found")]
    BookmarkNotFound { id: String },

    /// A persisted column holds a value outside its domain
    #[error("Invalid stored value '{value}' in column '{column}'")]
    InvalidValue {
        column: &'static str,
        value: String,
    },

    /// SQLite database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Result type for store operations
pub type StorageResult<T> = Result<T, StorageError>;
