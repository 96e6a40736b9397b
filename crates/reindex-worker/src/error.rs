//! Worker error types.

use thiserror::Error;

/// Errors raised by the worker lifecycle.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkerError {
    /// A worker instance already exists in this process
    #[error("A reindex worker already exists in this process")]
    AlreadyCreated,

    /// The worker is already started
    #[error("The reindex worker is already started")]
    AlreadyStarted,

    /// The worker is not started
    #[error("The reindex worker is not started")]
    NotStarted,
}
