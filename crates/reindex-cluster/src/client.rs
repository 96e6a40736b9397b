//! Cluster client contract.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ClusterError;
use crate::types::{
    Acknowledged, AliasAction, DeleteResult, IndexState, NodesInfo, ReindexRequest,
    ReindexStarted, TaskInfo,
};

/// Typed request interface to the target cluster.
///
/// Every method maps to one REST call; acknowledgement checking and retry
/// policy are the caller's concern. Implementations must be cheap to share
/// behind an `Arc` and safe to call concurrently.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Whether an index (or alias) with this name exists.
    async fn index_exists(&self, index: &str) -> Result<bool, ClusterError>;

    /// Flat settings, mappings and aliases of an index, or `None` when the
    /// index does not exist.
    async fn get_index_state(&self, index: &str) -> Result<Option<IndexState>, ClusterError>;

    /// `PUT /{index}/_settings`.
    async fn put_settings(&self, index: &str, body: Value) -> Result<Acknowledged, ClusterError>;

    /// `PUT /{index}` with settings + mappings body.
    async fn create_index(&self, index: &str, body: Value) -> Result<Acknowledged, ClusterError>;

    /// `POST /_reindex?wait_for_completion=false&refresh=true`.
    async fn start_reindex(&self, req: ReindexRequest) -> Result<ReindexStarted, ClusterError>;

    /// `GET /_tasks/{task_id}?wait_for_completion=false`.
    async fn get_task(&self, task_id: &str) -> Result<TaskInfo, ClusterError>;

    /// Delete the completed task's document from the `.tasks` index.
    async fn delete_task_doc(&self, task_id: &str) -> Result<DeleteResult, ClusterError>;

    /// Aliases currently pointing at `index`, with their properties.
    async fn get_aliases(&self, index: &str) -> Result<HashMap<String, Value>, ClusterError>;

    /// `POST /_aliases` with the given actions, applied atomically.
    async fn update_aliases(&self, actions: Vec<AliasAction>) -> Result<Acknowledged, ClusterError>;

    /// `GET /_nodes`, used to validate minimum node versions.
    async fn nodes_info(&self) -> Result<NodesInfo, ClusterError>;

    /// `POST /_ml/set_upgrade_mode?enabled={enabled}`.
    async fn set_ml_upgrade_mode(&self, enabled: bool) -> Result<Acknowledged, ClusterError>;
}
