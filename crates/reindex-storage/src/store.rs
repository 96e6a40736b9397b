//! Store adapter contract.
//!
//! Every mutation presents the version the caller observed; the store
//! rejects stale writers with `StorageError::VersionConflict`. Callers hold
//! the returned `Stored` envelope and thread it through subsequent updates.
//! This contract is the only synchronisation primitive in the system: no
//! in-process locks protect records, and cross-coordinator safety follows
//! from losing the version race.

use async_trait::async_trait;

use reindex_types::{MlCounter, ReindexOperation, ReindexStatus, Stored};

use crate::error::StorageError;

/// CRUD + optimistic-concurrency access to operation records and the ML
/// counter singleton.
#[async_trait]
pub trait OperationStore: Send + Sync {
    /// Persist a new operation record, assigning it a fresh id at version 1.
    async fn create_operation(
        &self,
        op: ReindexOperation,
    ) -> Result<Stored<ReindexOperation>, StorageError>;

    /// Fetch a record by id.
    async fn get_operation(
        &self,
        id: &str,
    ) -> Result<Option<Stored<ReindexOperation>>, StorageError>;

    /// Replace a record's attributes, checking the presented version.
    ///
    /// Returns the envelope at its new version on success.
    async fn update_operation(
        &self,
        stored: Stored<ReindexOperation>,
    ) -> Result<Stored<ReindexOperation>, StorageError>;

    /// Delete a record by id. Deleting an absent record is not an error.
    async fn delete_operation(&self, id: &str) -> Result<(), StorageError>;

    /// All records whose source index is `index_name`, any status.
    async fn find_by_index_name(
        &self,
        index_name: &str,
    ) -> Result<Vec<Stored<ReindexOperation>>, StorageError>;

    /// All records currently in the given status.
    async fn find_all_by_status(
        &self,
        status: ReindexStatus,
    ) -> Result<Vec<Stored<ReindexOperation>>, StorageError>;

    /// Fetch the ML counter singleton, creating it at zero on first access.
    async fn get_ml_counter(&self) -> Result<Stored<MlCounter>, StorageError>;

    /// Replace the ML counter, checking the presented version.
    async fn update_ml_counter(
        &self,
        stored: Stored<MlCounter>,
    ) -> Result<Stored<MlCounter>, StorageError>;
}
