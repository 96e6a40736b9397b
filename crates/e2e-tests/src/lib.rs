//! Test harness for end-to-end reindex scenarios.
//!
//! Wires the in-memory store and the mock cluster into a real
//! `ReindexService`, so scenarios drive the exact production step machine
//! without a disk or a network.

use std::sync::Arc;

use serde_json::{json, Value};

use reindex_cluster::types::TaskInfo;
use reindex_cluster::MockCluster;
use reindex_service::ReindexService;
use reindex_storage::{MemoryStore, OperationStore};
use reindex_types::{ReindexOperation, ReindexStatus, Stored};

/// Shared fixture for e2e tests.
pub struct TestHarness {
    /// In-memory operation store.
    pub store: Arc<MemoryStore>,
    /// Scripted mock cluster.
    pub cluster: Arc<MockCluster>,
    /// Service under test.
    pub service: Arc<ReindexService>,
}

impl TestHarness {
    /// Create a harness with an empty store and cluster.
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let cluster = Arc::new(MockCluster::new());
        let service = Arc::new(ReindexService::new(store.clone(), cluster.clone()));
        Self {
            store,
            cluster,
            service,
        }
    }

    /// A second service sharing this harness's store and cluster, standing
    /// in for a worker in another coordinator process.
    pub fn second_coordinator(&self) -> Arc<ReindexService> {
        Arc::new(ReindexService::new(self.store.clone(), self.cluster.clone()))
    }

    /// Seed an index with default settings and the given mappings.
    pub fn seed_index(&self, name: &str, mappings: Value) {
        self.cluster.seed_index(
            name,
            json!({
                "index.number_of_shards": "1",
                "index.number_of_replicas": "1",
            }),
            mappings,
        );
    }

    /// Advance the operation one step at a time until it leaves
    /// `InProgress` (or the iteration guard trips), returning the final
    /// record.
    pub async fn drive_to_terminal(&self, id: &str) -> Stored<ReindexOperation> {
        for _ in 0..50 {
            let current = self.get(id).await;
            if current.attributes.status != ReindexStatus::InProgress {
                return current;
            }
            let _ = self.service.process_next_step(current).await;
        }
        panic!("operation did not reach a terminal status within 50 steps");
    }

    /// The current record for `id`.
    pub async fn get(&self, id: &str) -> Stored<ReindexOperation> {
        self.store
            .get_operation(id)
            .await
            .expect("store read failed")
            .expect("operation record disappeared")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// An in-flight task status with the given progress counters.
pub fn running_task(created: u64, total: u64) -> TaskInfo {
    TaskInfo {
        completed: false,
        task: reindex_cluster::types::TaskBody {
            status: reindex_cluster::types::TaskCounts { created, total },
        },
        response: None,
    }
}

/// A completed task status; `failures` go into the task response.
pub fn completed_task(created: u64, total: u64, failures: Vec<Value>) -> TaskInfo {
    TaskInfo {
        completed: true,
        task: reindex_cluster::types::TaskBody {
            status: reindex_cluster::types::TaskCounts { created, total },
        },
        response: Some(reindex_cluster::types::TaskResponseBody { failures }),
    }
}
