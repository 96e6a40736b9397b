//! Storage layer error types.

use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// RocksDB operation failed
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// Column family not found
    #[error("Column family not found: {0}")]
    ColumnFamilyNotFound(String),

    /// Optimistic-concurrency check failed: another writer advanced the
    /// document since the caller observed it
    #[error("Version conflict on document {id}: expected version {expected}, found {found}")]
    VersionConflict {
        /// Document id
        id: String,
        /// Version the caller presented
        expected: u64,
        /// Version currently stored
        found: u64,
    },

    /// Document not found
    #[error("Document not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl StorageError {
    /// Whether this error is a lost optimistic-concurrency race, which the
    /// caller retries on its next tick rather than treating as a failure.
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, StorageError::VersionConflict { .. })
    }
}
