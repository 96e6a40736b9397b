//! In-memory operation store.
//!
//! Honors the same version contract as [`RocksStore`](crate::RocksStore);
//! used by unit tests and the e2e harness so the service and worker can be
//! exercised without a disk.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use ulid::Ulid;

use reindex_types::{MlCounter, ReindexOperation, ReindexStatus, Stored, ML_COUNTER_ID};

use crate::error::StorageError;
use crate::store::OperationStore;

#[derive(Default)]
struct Inner {
    operations: HashMap<String, (u64, ReindexOperation)>,
    ml_counter: Option<(u64, MlCounter)>,
}

/// In-memory implementation of [`OperationStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OperationStore for MemoryStore {
    async fn create_operation(
        &self,
        op: ReindexOperation,
    ) -> Result<Stored<ReindexOperation>, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        let id = Ulid::new().to_string();
        inner.operations.insert(id.clone(), (1, op.clone()));
        Ok(Stored::new(id, 1, op))
    }

    async fn get_operation(
        &self,
        id: &str,
    ) -> Result<Option<Stored<ReindexOperation>>, StorageError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .operations
            .get(id)
            .map(|(version, op)| Stored::new(id, *version, op.clone())))
    }

    async fn update_operation(
        &self,
        stored: Stored<ReindexOperation>,
    ) -> Result<Stored<ReindexOperation>, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner
            .operations
            .get_mut(&stored.id)
            .ok_or_else(|| StorageError::NotFound(stored.id.clone()))?;

        if entry.0 != stored.version {
            return Err(StorageError::VersionConflict {
                id: stored.id,
                expected: stored.version,
                found: entry.0,
            });
        }

        let next_version = stored.version + 1;
        *entry = (next_version, stored.attributes.clone());
        Ok(Stored::new(stored.id, next_version, stored.attributes))
    }

    async fn delete_operation(&self, id: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        inner.operations.remove(id);
        Ok(())
    }

    async fn find_by_index_name(
        &self,
        index_name: &str,
    ) -> Result<Vec<Stored<ReindexOperation>>, StorageError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .operations
            .iter()
            .filter(|(_, (_, op))| op.index_name == index_name)
            .map(|(id, (version, op))| Stored::new(id, *version, op.clone()))
            .collect())
    }

    async fn find_all_by_status(
        &self,
        status: ReindexStatus,
    ) -> Result<Vec<Stored<ReindexOperation>>, StorageError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .operations
            .iter()
            .filter(|(_, (_, op))| op.status == status)
            .map(|(id, (version, op))| Stored::new(id, *version, op.clone()))
            .collect())
    }

    async fn get_ml_counter(&self) -> Result<Stored<MlCounter>, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        let (version, counter) = inner
            .ml_counter
            .get_or_insert_with(|| (1, MlCounter::default()));
        Ok(Stored::new(ML_COUNTER_ID, *version, counter.clone()))
    }

    async fn update_ml_counter(
        &self,
        stored: Stored<MlCounter>,
    ) -> Result<Stored<MlCounter>, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner
            .ml_counter
            .as_mut()
            .ok_or_else(|| StorageError::NotFound(ML_COUNTER_ID.to_string()))?;

        if entry.0 != stored.version {
            return Err(StorageError::VersionConflict {
                id: stored.id,
                expected: stored.version,
                found: entry.0,
            });
        }

        let next_version = stored.version + 1;
        *entry = (next_version, stored.attributes.clone());
        Ok(Stored::new(stored.id, next_version, stored.attributes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_version_contract() {
        let store = MemoryStore::new();

        let stored = store
            .create_operation(ReindexOperation::new("a", "a-reindex-0"))
            .await
            .unwrap();
        assert_eq!(stored.version, 1);

        let updated = store.update_operation(stored.clone()).await.unwrap();
        assert_eq!(updated.version, 2);

        let err = store.update_operation(stored).await.unwrap_err();
        assert!(err.is_version_conflict());
    }

    #[tokio::test]
    async fn test_memory_store_finders() {
        let store = MemoryStore::new();

        store
            .create_operation(ReindexOperation::new("a", "a-reindex-0"))
            .await
            .unwrap();
        let mut paused = ReindexOperation::new("b", "b-reindex-0");
        paused.status = ReindexStatus::Paused;
        store.create_operation(paused).await.unwrap();

        assert_eq!(store.find_by_index_name("a").await.unwrap().len(), 1);
        assert_eq!(store.find_by_index_name("missing").await.unwrap().len(), 0);
        assert_eq!(
            store
                .find_all_by_status(ReindexStatus::Paused)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_memory_store_ml_counter() {
        let store = MemoryStore::new();

        let counter = store.get_ml_counter().await.unwrap();
        assert_eq!(counter.attributes.ml_reindex_count, 0);

        let mut next = counter.clone();
        next.attributes.ml_reindex_count = 2;
        let updated = store.update_ml_counter(next).await.unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(
            store
                .get_ml_counter()
                .await
                .unwrap()
                .attributes
                .ml_reindex_count,
            2
        );
    }
}
