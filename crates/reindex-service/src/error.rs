//! Error taxonomy for the reindex service.
//!
//! Callers discriminate on [`ErrorKind`] rather than message text:
//! preconditions surface to the API caller without touching the record,
//! transient errors leave the record unchanged for the next worker tick,
//! and fatal errors mark the record failed and trigger cleanup.

use thiserror::Error;

use reindex_cluster::ClusterError;
use reindex_storage::StorageError;
use reindex_types::ReindexStatus;

/// Broad classification of a [`ReindexError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller error; no record was mutated.
    Precondition,
    /// Lost race or unacknowledged change; retried on the next tick.
    Transient,
    /// The operation cannot proceed; the record is marked failed.
    Fatal,
}

/// Errors raised by the reindex service.
#[derive(Debug, Error)]
pub enum ReindexError {
    /// The source index does not exist
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// A live operation already exists for the index
    #[error("A reindex operation already exists for index {0}")]
    OperationExists(String),

    /// No operation record exists for the index
    #[error("No reindex operation found for index {0}")]
    OperationNotFound(String),

    /// The per-index uniqueness invariant is broken in the store
    #[error("Multiple live reindex operations found for index {0}")]
    MultipleOperations(String),

    /// The operation is not in the status the call requires
    #[error("Operation for index {index} is {actual:?}; expected {expected:?}")]
    InvalidStatus {
        /// Source index
        index: String,
        /// Status found on the record
        actual: ReindexStatus,
        /// Status the call requires
        expected: ReindexStatus,
    },

    /// Another worker holds a live lease on the record
    #[error("Another worker holds the lease on the operation for index {0}")]
    OperationLocked(String),

    /// The ML counter singleton is leased by another worker
    #[error("The ML counter is leased by another worker")]
    MlCounterLocked,

    /// The cluster returned `acknowledged: false`
    #[error("Cluster did not acknowledge {0}")]
    NotAcknowledged(&'static str),

    /// A node is below the version floor for the ML upgrade-mode endpoint
    #[error("All cluster nodes must be at least version {required} to toggle ML upgrade mode")]
    NodeVersionTooLow {
        /// Minimum `major.minor` version
        required: &'static str,
    },

    /// No free destination name within the attempt ceiling
    #[error("Could not find a free destination index name for {index} after {attempts} attempts")]
    NewIndexNameExhausted {
        /// Source index
        index: String,
        /// Attempts made
        attempts: u32,
    },

    /// The record claims a dispatched reindex but carries no task id
    #[error("Operation for index {0} has no reindex task id")]
    MissingTaskId(String),

    /// The reindex task completed with missing documents
    #[error(
        "Reindex task {task_id} completed {created} of {total} documents; example failure: {example}"
    )]
    ReindexTaskFailed {
        /// Cluster task id
        task_id: String,
        /// Documents written
        created: u64,
        /// Documents expected
        total: u64,
        /// First failure reported by the task
        example: String,
    },

    /// The completed task's document could not be removed from `.tasks`
    #[error("Could not delete task document {0}")]
    TaskDocNotDeleted(String),

    /// The source mapping carries more than one type and cannot be migrated
    #[error("Index {0} has more than one mapping type")]
    MultipleMappingTypes(String),

    /// Store failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Cluster request failure
    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

impl ReindexError {
    /// Classify this error for the retry/failure policy.
    pub fn kind(&self) -> ErrorKind {
        use ReindexError::*;
        match self {
            IndexNotFound(_)
            | OperationExists(_)
            | OperationNotFound(_)
            | MultipleOperations(_)
            | InvalidStatus { .. } => ErrorKind::Precondition,

            OperationLocked(_)
            | NotAcknowledged(_)
            | NodeVersionTooLow { .. }
            | TaskDocNotDeleted(_) => ErrorKind::Transient,
            Storage(e) if e.is_version_conflict() => ErrorKind::Transient,

            MlCounterLocked
            | NewIndexNameExhausted { .. }
            | MissingTaskId(_)
            | ReindexTaskFailed { .. }
            | MultipleMappingTypes(_)
            | Storage(_)
            | Cluster(_) => ErrorKind::Fatal,
        }
    }
}

/// Render an error with its full source chain, for `error_message`.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str("; caused by: ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
