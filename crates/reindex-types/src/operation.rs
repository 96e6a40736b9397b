//! Persisted record types for reindex operations.
//!
//! An operation record tracks one index migration through the step machine.
//! Records are stored as JSON documents and mutated exclusively through
//! version-checked updates, so every type here carries the exact wire shape
//! of the backing store.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Store type tag for operation records.
pub const REINDEX_OP_TYPE: &str = "reindex-operation";

/// Store type tag and well-known id of the ML counter singleton.
pub const ML_COUNTER_ID: &str = "upgrade-assistant-ml";

/// Default lease window in seconds. A `locked` stamp older than this is
/// considered abandoned and may be stolen by another worker.
pub const DEFAULT_LEASE_WINDOW_SECS: u64 = 90;

/// Ceiling on destination-name generation attempts before creation fails.
pub const MAX_NEW_INDEX_NAME_ATTEMPTS: u32 = 100;

/// Lifecycle status of a reindex operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReindexStatus {
    /// The worker is actively driving this operation.
    InProgress,
    /// Explicitly paused; the worker skips it until resumed.
    Paused,
    /// All steps finished.
    Completed,
    /// A step failed; see `error_message`.
    Failed,
    /// Cancelled by an operator.
    Cancelled,
}

/// Progress marker for the step machine.
///
/// Variant order is the execution order; the derived `Ord` is relied on for
/// "has the reindex been dispatched yet" style checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReindexStep {
    /// Record created, nothing done yet.
    Created,
    /// ML upgrade mode handled (a no-op marker for non-ML indices).
    MlUpgradeModeSet,
    /// Source index write-blocked.
    Readonly,
    /// Destination index created with transformed settings and mappings.
    NewIndexCreated,
    /// Async reindex task dispatched.
    ReindexStarted,
    /// Reindex task finished and its task document deleted.
    ReindexCompleted,
    /// Alias swapped onto the destination, source index removed.
    AliasCreated,
    /// ML upgrade mode released; terminal step.
    MlUpgradeModeUnset,
}

impl ReindexStep {
    /// The step following this one, or `None` at the terminal step.
    pub fn next(self) -> Option<ReindexStep> {
        use ReindexStep::*;
        match self {
            Created => Some(MlUpgradeModeSet),
            MlUpgradeModeSet => Some(Readonly),
            Readonly => Some(NewIndexCreated),
            NewIndexCreated => Some(ReindexStarted),
            ReindexStarted => Some(ReindexCompleted),
            ReindexCompleted => Some(AliasCreated),
            AliasCreated => Some(MlUpgradeModeUnset),
            MlUpgradeModeUnset => None,
        }
    }

    /// Whether this is the terminal step of the machine.
    pub fn is_terminal(self) -> bool {
        self == ReindexStep::MlUpgradeModeUnset
    }
}

/// Persisted reindex operation record.
///
/// `index_name` is immutable for the lifetime of the record. All other
/// fields advance under a held lease via version-checked updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReindexOperation {
    /// Source index being migrated.
    pub index_name: String,

    /// Destination index, generated at creation as `{index_name}-reindex-{n}`.
    pub new_index_name: String,

    /// Lifecycle status.
    pub status: ReindexStatus,

    /// Last step that fully completed.
    pub last_completed_step: ReindexStep,

    /// Lease stamp: the moment a worker acquired this record, or `None`
    /// when unowned. Serialized as epoch milliseconds.
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub locked: Option<DateTime<Utc>>,

    /// Cluster-side task id of the running reindex; set once dispatched.
    pub reindex_task_id: Option<String>,

    /// Reindex progress in [0, 1].
    pub reindex_task_perc_complete: f64,

    /// Failure context; populated iff `status` is `Failed`.
    pub error_message: Option<String>,
}

impl ReindexOperation {
    /// Create a fresh record at the start of the step machine.
    pub fn new(index_name: impl Into<String>, new_index_name: impl Into<String>) -> Self {
        Self {
            index_name: index_name.into(),
            new_index_name: new_index_name.into(),
            status: ReindexStatus::InProgress,
            last_completed_step: ReindexStep::Created,
            locked: None,
            reindex_task_id: None,
            reindex_task_perc_complete: 0.0,
            error_message: None,
        }
    }

    /// Whether the lease stamp is still live at `now` for the given window.
    ///
    /// A missing stamp is not a lease; an expired stamp is stealable.
    pub fn lease_is_live(&self, window: Duration, now: DateTime<Utc>) -> bool {
        match self.locked {
            Some(stamp) => now.signed_duration_since(stamp) < window,
            None => false,
        }
    }
}

/// Singleton record counting in-flight ML-index reindexes.
///
/// Coordinates the single cluster-wide ML upgrade-mode toggle: the mode is
/// enabled on the 0 -> 1 transition and disabled only on the 1 -> 0
/// transition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MlCounter {
    /// Number of ML operations currently between the set and unset steps.
    pub ml_reindex_count: u64,

    /// Lease stamp, same semantics as on operation records.
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub locked: Option<DateTime<Utc>>,
}

/// Envelope for a document held in the store.
///
/// `version` is the optimistic-concurrency token: every update must present
/// the version it observed, and the store rejects stale writers. Callers
/// hold the returned envelope and thread it through subsequent updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stored<T> {
    /// Document id (a ULID for operation records, well-known for singletons).
    pub id: String,
    /// Version observed when this envelope was produced.
    pub version: u64,
    /// The document itself.
    pub attributes: T,
}

impl<T> Stored<T> {
    /// Wrap attributes in an envelope.
    pub fn new(id: impl Into<String>, version: u64, attributes: T) -> Self {
        Self {
            id: id.into(),
            version,
            attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_order_and_next() {
        assert!(ReindexStep::Created < ReindexStep::ReindexStarted);
        assert!(ReindexStep::ReindexStarted < ReindexStep::MlUpgradeModeUnset);

        let mut step = ReindexStep::Created;
        let mut count = 0;
        while let Some(next) = step.next() {
            step = next;
            count += 1;
        }
        assert_eq!(count, 7);
        assert_eq!(step, ReindexStep::MlUpgradeModeUnset);
        assert!(step.is_terminal());
        assert!(!ReindexStep::AliasCreated.is_terminal());
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let json = serde_json::to_string(&ReindexStatus::InProgress).unwrap();
        assert_eq!(json, "\"inProgress\"");
        let json = serde_json::to_string(&ReindexStep::MlUpgradeModeUnset).unwrap();
        assert_eq!(json, "\"mlUpgradeModeUnset\"");
    }

    #[test]
    fn test_operation_new_defaults() {
        let op = ReindexOperation::new("logs-2019", "logs-2019-reindex-0");
        assert_eq!(op.status, ReindexStatus::InProgress);
        assert_eq!(op.last_completed_step, ReindexStep::Created);
        assert!(op.locked.is_none());
        assert!(op.reindex_task_id.is_none());
        assert_eq!(op.reindex_task_perc_complete, 0.0);
        assert!(op.error_message.is_none());
    }

    #[test]
    fn test_operation_wire_format() {
        let op = ReindexOperation::new("logs-2019", "logs-2019-reindex-0");
        let json = serde_json::to_string(&op).unwrap();

        assert!(json.contains("\"indexName\":\"logs-2019\""));
        assert!(json.contains("\"newIndexName\":\"logs-2019-reindex-0\""));
        assert!(json.contains("\"status\":\"inProgress\""));
        assert!(json.contains("\"lastCompletedStep\":\"created\""));
        assert!(json.contains("\"locked\":null"));
    }

    #[test]
    fn test_operation_roundtrip_with_lease() {
        let mut op = ReindexOperation::new("a", "a-reindex-0");
        op.locked = Some(Utc::now());
        op.reindex_task_id = Some("node:123".to_string());
        op.reindex_task_perc_complete = 0.25;

        let json = serde_json::to_string(&op).unwrap();
        let back: ReindexOperation = serde_json::from_str(&json).unwrap();

        // Lease stamps round-trip at millisecond precision.
        assert_eq!(
            back.locked.unwrap().timestamp_millis(),
            op.locked.unwrap().timestamp_millis()
        );
        assert_eq!(back.reindex_task_id.as_deref(), Some("node:123"));
        assert_eq!(back.reindex_task_perc_complete, 0.25);
    }

    #[test]
    fn test_lease_is_live() {
        let window = Duration::seconds(DEFAULT_LEASE_WINDOW_SECS as i64);
        let now = Utc::now();

        let mut op = ReindexOperation::new("a", "a-reindex-0");
        assert!(!op.lease_is_live(window, now));

        op.locked = Some(now - Duration::seconds(10));
        assert!(op.lease_is_live(window, now));

        op.locked = Some(now - Duration::seconds(91));
        assert!(!op.lease_is_live(window, now));
    }

    #[test]
    fn test_ml_counter_wire_format() {
        let counter = MlCounter::default();
        let json = serde_json::to_string(&counter).unwrap();
        assert!(json.contains("\"mlReindexCount\":0"));

        let back: MlCounter = serde_json::from_str("{\"mlReindexCount\":2,\"locked\":null}").unwrap();
        assert_eq!(back.ml_reindex_count, 2);
        assert!(back.locked.is_none());
    }
}
