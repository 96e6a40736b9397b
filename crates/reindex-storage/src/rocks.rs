//! RocksDB-backed operation store.
//!
//! Documents are JSON envelopes `{version, attributes}` keyed by id, one
//! column family per record type. An internal write lock makes the
//! version check-and-swap atomic within the process; concurrent writers in
//! other processes are expected to lose the version race the same way.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, DB};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info};
use ulid::Ulid;

use reindex_types::{
    MlCounter, ReindexOperation, ReindexStatus, Stored, ML_COUNTER_ID, REINDEX_OP_TYPE,
};

use crate::error::StorageError;
use crate::store::OperationStore;

/// Column family holding `reindex-operation` documents.
const CF_OPERATIONS: &str = REINDEX_OP_TYPE;
/// Column family holding the `upgrade-assistant-ml` singleton.
const CF_ML: &str = ML_COUNTER_ID;

/// On-disk document shape; the id lives in the key.
#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    version: u64,
    attributes: T,
}

/// RocksDB-backed implementation of [`OperationStore`].
pub struct RocksStore {
    db: DB,
    /// Serializes read-check-write cycles so version checks are atomic.
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open the store at the given path, creating it if necessary.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening operation store at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_OPERATIONS, Options::default()),
            ColumnFamilyDescriptor::new(CF_ML, Options::default()),
        ];
        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(name.to_string()))
    }

    fn read<T: DeserializeOwned>(
        &self,
        cf_name: &str,
        id: &str,
    ) -> Result<Option<Stored<T>>, StorageError> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(&cf, id.as_bytes())? {
            Some(bytes) => {
                let envelope: Envelope<T> = serde_json::from_slice(&bytes)?;
                Ok(Some(Stored::new(id, envelope.version, envelope.attributes)))
            }
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(
        &self,
        cf_name: &str,
        id: &str,
        version: u64,
        attributes: &T,
    ) -> Result<(), StorageError> {
        let cf = self.cf(cf_name)?;
        let envelope = serde_json::to_vec(&Envelope {
            version,
            attributes,
        })?;
        self.db.put_cf(&cf, id.as_bytes(), envelope)?;
        Ok(())
    }

    /// Version-checked replace of a document in `cf_name`.
    fn compare_and_swap<T: Serialize + DeserializeOwned>(
        &self,
        cf_name: &str,
        stored: Stored<T>,
    ) -> Result<Stored<T>, StorageError> {
        let _guard = self.write_lock.lock().unwrap();

        let current: Stored<T> = self
            .read(cf_name, &stored.id)?
            .ok_or_else(|| StorageError::NotFound(stored.id.clone()))?;

        if current.version != stored.version {
            return Err(StorageError::VersionConflict {
                id: stored.id,
                expected: stored.version,
                found: current.version,
            });
        }

        let next_version = stored.version + 1;
        self.write(cf_name, &stored.id, next_version, &stored.attributes)?;
        debug!(id = %stored.id, version = next_version, "Updated document");

        Ok(Stored::new(stored.id, next_version, stored.attributes))
    }

    fn scan_operations(&self) -> Result<Vec<Stored<ReindexOperation>>, StorageError> {
        let cf = self.cf(CF_OPERATIONS)?;
        let mut results = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, value) = item?;
            let id = std::str::from_utf8(&key)
                .map_err(|e| StorageError::Serialization(e.to_string()))?
                .to_string();
            let envelope: Envelope<ReindexOperation> = serde_json::from_slice(&value)?;
            results.push(Stored::new(id, envelope.version, envelope.attributes));
        }
        Ok(results)
    }
}

#[async_trait]
impl OperationStore for RocksStore {
    async fn create_operation(
        &self,
        op: ReindexOperation,
    ) -> Result<Stored<ReindexOperation>, StorageError> {
        let _guard = self.write_lock.lock().unwrap();
        let id = Ulid::new().to_string();
        self.write(CF_OPERATIONS, &id, 1, &op)?;
        debug!(id = %id, index = %op.index_name, "Created operation record");
        Ok(Stored::new(id, 1, op))
    }

    async fn get_operation(
        &self,
        id: &str,
    ) -> Result<Option<Stored<ReindexOperation>>, StorageError> {
        self.read(CF_OPERATIONS, id)
    }

    async fn update_operation(
        &self,
        stored: Stored<ReindexOperation>,
    ) -> Result<Stored<ReindexOperation>, StorageError> {
        self.compare_and_swap(CF_OPERATIONS, stored)
    }

    async fn delete_operation(&self, id: &str) -> Result<(), StorageError> {
        let cf = self.cf(CF_OPERATIONS)?;
        self.db.delete_cf(&cf, id.as_bytes())?;
        debug!(id = %id, "Deleted operation record");
        Ok(())
    }

    async fn find_by_index_name(
        &self,
        index_name: &str,
    ) -> Result<Vec<Stored<ReindexOperation>>, StorageError> {
        Ok(self
            .scan_operations()?
            .into_iter()
            .filter(|s| s.attributes.index_name == index_name)
            .collect())
    }

    async fn find_all_by_status(
        &self,
        status: ReindexStatus,
    ) -> Result<Vec<Stored<ReindexOperation>>, StorageError> {
        Ok(self
            .scan_operations()?
            .into_iter()
            .filter(|s| s.attributes.status == status)
            .collect())
    }

    async fn get_ml_counter(&self) -> Result<Stored<MlCounter>, StorageError> {
        if let Some(stored) = self.read(CF_ML, ML_COUNTER_ID)? {
            return Ok(stored);
        }
        let _guard = self.write_lock.lock().unwrap();
        // Re-check under the lock; another task may have created it.
        if let Some(stored) = self.read(CF_ML, ML_COUNTER_ID)? {
            return Ok(stored);
        }
        let counter = MlCounter::default();
        self.write(CF_ML, ML_COUNTER_ID, 1, &counter)?;
        debug!("Created ML counter singleton");
        Ok(Stored::new(ML_COUNTER_ID, 1, counter))
    }

    async fn update_ml_counter(
        &self,
        stored: Stored<MlCounter>,
    ) -> Result<Stored<MlCounter>, StorageError> {
        self.compare_and_swap(CF_ML, stored)
    }
}
