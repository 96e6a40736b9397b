//! Wire types for the cluster REST surface.
//!
//! Shapes follow the cluster's JSON exactly; settings travel in flat
//! (dot-notation) form throughout so they can be filtered key-by-key.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Flat (dot-notation) index settings.
pub type FlatSettings = serde_json::Map<String, Value>;

/// Generic `{"acknowledged": bool}` response.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Acknowledged {
    /// Whether the cluster accepted and applied the change.
    pub acknowledged: bool,
}

/// Settings, mappings and aliases of one index, fetched with
/// `flat_settings=true`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndexState {
    /// Flat settings, e.g. `"index.number_of_shards": "5"`.
    #[serde(default)]
    pub settings: FlatSettings,
    /// The mappings object as stored by the cluster (may still carry a
    /// per-type wrapper on pre-typeless indices).
    #[serde(default)]
    pub mappings: Value,
    /// Alias name to alias properties (filter, routing, ...).
    #[serde(default)]
    pub aliases: HashMap<String, Value>,
}

/// Source half of a reindex request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReindexSource {
    /// Index to copy from.
    pub index: String,
}

/// Destination half of a reindex request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReindexDest {
    /// Index to copy into.
    pub index: String,
}

/// Server-side script attached to a reindex request.
///
/// The script body is data: an opaque blob the cluster executes per
/// document, parameterised through `params`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReindexScript {
    /// Script language (always `painless` here).
    pub lang: String,
    /// Script source, sent verbatim.
    pub source: String,
    /// Script parameters.
    pub params: Value,
}

/// Body of `POST /_reindex`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReindexRequest {
    /// Where documents come from.
    pub source: ReindexSource,
    /// Where documents go.
    pub dest: ReindexDest,
    /// Optional per-document transform.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<ReindexScript>,
}

impl ReindexRequest {
    /// Plain copy without a transform.
    pub fn new(source: impl Into<String>, dest: impl Into<String>) -> Self {
        Self {
            source: ReindexSource {
                index: source.into(),
            },
            dest: ReindexDest { index: dest.into() },
            script: None,
        }
    }

    /// Attach a transform script.
    pub fn with_script(mut self, script: ReindexScript) -> Self {
        self.script = Some(script);
        self
    }
}

/// Response of `POST /_reindex?wait_for_completion=false`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReindexStarted {
    /// Task id of the asynchronous reindex.
    pub task: String,
}

/// Document counters inside a task status.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct TaskCounts {
    /// Documents written so far.
    #[serde(default)]
    pub created: u64,
    /// Documents the task will process in total.
    #[serde(default)]
    pub total: u64,
}

/// The `task` object of a task-API response.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TaskBody {
    /// Progress counters.
    #[serde(default)]
    pub status: TaskCounts,
}

/// A single failure entry from a completed task's response.
pub type TaskFailure = Value;

/// The `response` object present once a task has completed.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TaskResponseBody {
    /// Per-document failures, if any.
    #[serde(default)]
    pub failures: Vec<TaskFailure>,
}

/// Response of `GET /_tasks/{id}`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TaskInfo {
    /// Whether the task has finished (successfully or not).
    pub completed: bool,
    /// Live progress.
    #[serde(default)]
    pub task: TaskBody,
    /// Final outcome, present when `completed`.
    #[serde(default)]
    pub response: Option<TaskResponseBody>,
}

/// Response of deleting a task document from the `.tasks` index.
#[derive(Debug, Clone, Deserialize)]
pub struct DeleteResult {
    /// `"deleted"` on success.
    pub result: String,
}

/// One action in an `_aliases` update. Externally tagged, so it serializes
/// to `{"add": {...}}` / `{"remove_index": {...}}` as the cluster expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasAction {
    /// Point `alias` at `index`.
    Add(AliasAdd),
    /// Remove an entire index.
    RemoveIndex(AliasRemoveIndex),
}

/// Body of an `add` alias action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasAdd {
    /// Target index.
    pub index: String,
    /// Alias name.
    pub alias: String,
    /// Alias filter, carried over verbatim when re-attaching.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
}

/// Body of a `remove_index` alias action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasRemoveIndex {
    /// Index to remove.
    pub index: String,
}

/// One node from `GET /_nodes`.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeInfo {
    /// Node version string, e.g. `"6.8.2"`.
    pub version: String,
}

/// Response of `GET /_nodes`.
#[derive(Debug, Clone, Deserialize)]
pub struct NodesInfo {
    /// Nodes by id.
    pub nodes: HashMap<String, NodeInfo>,
}

impl NodesInfo {
    /// All node version strings.
    pub fn versions(&self) -> Vec<&str> {
        self.nodes.values().map(|n| n.version.as_str()).collect()
    }
}
