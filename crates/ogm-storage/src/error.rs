//! Storage error types for ogm-storage.
//!
//! [`StorageError`] covers failures of the concrete backends in this crate:
//! SQLite, JSON encoding of documents, migrations, and malformed physical
//! data. It converts into [`OgmError`], which is what the dialect surface
//! returns.

use ogm_core::OgmError;
use thiserror::Error;

/// Errors produced by the storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Applying schema migrations failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// The next sequence value does not fit in an `i64`.
    #[error("sequence '{name}' exhausted")]
    SequenceExhausted { name: String },

    /// Stored data does not have the expected shape.
    #[error("corrupt document: table '{table}': {reason}")]
    CorruptDocument { table: String, reason: String },
}

impl From<StorageError> for OgmError {
    fn from(err: StorageError) -> Self {
        OgmError::backend(err)
    }
}
