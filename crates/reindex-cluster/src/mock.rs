//! Scripted in-memory cluster for testing.
//!
//! `MockCluster` keeps index state, documents and tasks in memory and
//! answers the full [`ClusterClient`](crate::ClusterClient) surface without
//! a network. Reindex dispatches copy documents immediately, honoring the
//! boolean-coercion contract of an attached script, and task progress can
//! be scripted per dispatch so polling paths are testable.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ClusterError;
use crate::types::{
    Acknowledged, AliasAction, DeleteResult, FlatSettings, IndexState, NodeInfo, NodesInfo,
    ReindexRequest, ReindexStarted, TaskInfo,
};
use crate::ClusterClient;

#[derive(Debug, Clone, Default)]
struct MockIndex {
    settings: FlatSettings,
    mappings: Value,
    aliases: HashMap<String, Value>,
    docs: Vec<Value>,
}

#[derive(Default)]
struct MockState {
    indices: HashMap<String, MockIndex>,
    tasks: HashMap<String, VecDeque<TaskInfo>>,
    scripted_statuses: VecDeque<Vec<TaskInfo>>,
    next_task: u64,
    node_versions: Vec<String>,
    unacknowledged: HashSet<String>,
    reindex_requests: Vec<ReindexRequest>,
    alias_updates: Vec<Vec<AliasAction>>,
    ml_calls: Vec<bool>,
    deleted_task_docs: Vec<String>,
}

/// In-memory implementation of [`ClusterClient`] for tests.
pub struct MockCluster {
    state: Mutex<MockState>,
}

impl Default for MockCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCluster {
    /// Create an empty mock cluster with a single 6.8.2 node.
    pub fn new() -> Self {
        let mut state = MockState::default();
        state.node_versions = vec!["6.8.2".to_string()];
        Self {
            state: Mutex::new(state),
        }
    }

    /// Seed an index with flat settings and mappings.
    pub fn seed_index(&self, name: &str, settings: Value, mappings: Value) {
        let mut state = self.state.lock().unwrap();
        let flat = settings
            .as_object()
            .cloned()
            .unwrap_or_default();
        state.indices.insert(
            name.to_string(),
            MockIndex {
                settings: flat,
                mappings,
                aliases: HashMap::new(),
                docs: Vec::new(),
            },
        );
    }

    /// Attach an alias (with optional properties) to a seeded index.
    pub fn seed_alias(&self, index: &str, alias: &str, props: Value) {
        let mut state = self.state.lock().unwrap();
        if let Some(idx) = state.indices.get_mut(index) {
            idx.aliases.insert(alias.to_string(), props);
        }
    }

    /// Seed documents into an index.
    pub fn seed_docs(&self, index: &str, docs: Vec<Value>) {
        let mut state = self.state.lock().unwrap();
        if let Some(idx) = state.indices.get_mut(index) {
            idx.docs = docs;
        }
    }

    /// Script the task statuses reported for the next dispatched reindex.
    ///
    /// The final status sticks: once the queue is down to one entry,
    /// `get_task` keeps returning it.
    pub fn script_task_statuses(&self, statuses: Vec<TaskInfo>) {
        self.state
            .lock()
            .unwrap()
            .scripted_statuses
            .push_back(statuses);
    }

    /// Replace the advertised node versions.
    pub fn set_node_versions(&self, versions: &[&str]) {
        self.state.lock().unwrap().node_versions =
            versions.iter().map(|v| v.to_string()).collect();
    }

    /// Make the named operation answer `acknowledged: false`.
    ///
    /// Operation names: `put_settings`, `create_index`, `update_aliases`,
    /// `set_ml_upgrade_mode`.
    pub fn unacknowledge(&self, operation: &str) {
        self.state
            .lock()
            .unwrap()
            .unacknowledged
            .insert(operation.to_string());
    }

    /// Whether an index with this exact name exists.
    pub fn has_index(&self, name: &str) -> bool {
        self.state.lock().unwrap().indices.contains_key(name)
    }

    /// Documents currently held by an index.
    pub fn docs_of(&self, name: &str) -> Vec<Value> {
        self.state
            .lock()
            .unwrap()
            .indices
            .get(name)
            .map(|i| i.docs.clone())
            .unwrap_or_default()
    }

    /// Flat settings of an index.
    pub fn settings_of(&self, name: &str) -> Option<FlatSettings> {
        self.state
            .lock()
            .unwrap()
            .indices
            .get(name)
            .map(|i| i.settings.clone())
    }

    /// Aliases attached to an index.
    pub fn aliases_of(&self, name: &str) -> HashMap<String, Value> {
        self.state
            .lock()
            .unwrap()
            .indices
            .get(name)
            .map(|i| i.aliases.clone())
            .unwrap_or_default()
    }

    /// Every reindex request dispatched so far.
    pub fn reindex_requests(&self) -> Vec<ReindexRequest> {
        self.state.lock().unwrap().reindex_requests.clone()
    }

    /// Every `set_upgrade_mode` call, in order.
    pub fn ml_calls(&self) -> Vec<bool> {
        self.state.lock().unwrap().ml_calls.clone()
    }

    /// Alias-update batches, in order.
    pub fn alias_updates(&self) -> Vec<Vec<AliasAction>> {
        self.state.lock().unwrap().alias_updates.clone()
    }

    /// Task documents deleted from `.tasks`.
    pub fn deleted_task_docs(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted_task_docs.clone()
    }

    fn acknowledged_for(state: &MockState, operation: &str) -> Acknowledged {
        Acknowledged {
            acknowledged: !state.unacknowledged.contains(operation),
        }
    }
}

/// Coerce loosely-typed boolean representations in `doc` at `path`.
fn coerce_boolean_at(doc: &mut Value, path: &[String]) {
    let Some((leaf, parents)) = path.split_last() else {
        return;
    };
    let mut current = doc;
    for segment in parents {
        match current.get_mut(segment) {
            Some(next) => current = next,
            None => return,
        }
    }
    let Some(value) = current.get_mut(leaf) else {
        return;
    };
    let coerced = match value {
        Value::String(s) => match s.as_str() {
            "yes" | "1" | "on" => Some(true),
            "no" | "0" | "off" => Some(false),
            _ => None,
        },
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        _ => None,
    };
    if let Some(b) = coerced {
        *value = Value::Bool(b);
    }
}

/// Boolean field paths carried in a reindex script's params.
fn boolean_paths(req: &ReindexRequest) -> Vec<Vec<String>> {
    let Some(script) = &req.script else {
        return Vec::new();
    };
    script
        .params
        .get("booleanFieldPaths")
        .and_then(Value::as_array)
        .map(|paths| {
            paths
                .iter()
                .filter_map(Value::as_array)
                .map(|segments| {
                    segments
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl ClusterClient for MockCluster {
    async fn index_exists(&self, index: &str) -> Result<bool, ClusterError> {
        let state = self.state.lock().unwrap();
        Ok(state.indices.contains_key(index)
            || state
                .indices
                .values()
                .any(|i| i.aliases.contains_key(index)))
    }

    async fn get_index_state(&self, index: &str) -> Result<Option<IndexState>, ClusterError> {
        let state = self.state.lock().unwrap();
        Ok(state.indices.get(index).map(|idx| IndexState {
            settings: idx.settings.clone(),
            mappings: idx.mappings.clone(),
            aliases: idx.aliases.clone(),
        }))
    }

    async fn put_settings(&self, index: &str, body: Value) -> Result<Acknowledged, ClusterError> {
        let mut state = self.state.lock().unwrap();
        let ack = Self::acknowledged_for(&state, "put_settings");
        let Some(idx) = state.indices.get_mut(index) else {
            return Err(ClusterError::Api {
                status: 404,
                reason: format!("no such index [{index}]"),
            });
        };
        if let Some(flat) = body.as_object() {
            for (key, value) in flat {
                if value.is_null() {
                    idx.settings.remove(key);
                } else {
                    idx.settings.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(ack)
    }

    async fn create_index(&self, index: &str, body: Value) -> Result<Acknowledged, ClusterError> {
        let mut state = self.state.lock().unwrap();
        if state.indices.contains_key(index) {
            return Err(ClusterError::Api {
                status: 400,
                reason: format!("resource_already_exists_exception: [{index}]"),
            });
        }
        let settings = body
            .get("settings")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let mappings = body.get("mappings").cloned().unwrap_or(Value::Null);
        let ack = Self::acknowledged_for(&state, "create_index");
        state.indices.insert(
            index.to_string(),
            MockIndex {
                settings,
                mappings,
                aliases: HashMap::new(),
                docs: Vec::new(),
            },
        );
        Ok(ack)
    }

    async fn start_reindex(&self, req: ReindexRequest) -> Result<ReindexStarted, ClusterError> {
        let mut state = self.state.lock().unwrap();

        let paths = boolean_paths(&req);
        let source_docs = state
            .indices
            .get(&req.source.index)
            .map(|i| i.docs.clone())
            .unwrap_or_default();
        let copied: Vec<Value> = source_docs
            .into_iter()
            .map(|mut doc| {
                for path in &paths {
                    coerce_boolean_at(&mut doc, path);
                }
                doc
            })
            .collect();
        let doc_count = copied.len() as u64;
        if let Some(dest) = state.indices.get_mut(&req.dest.index) {
            dest.docs = copied;
        }

        state.next_task += 1;
        let task_id = format!("mock:{}", state.next_task);

        let statuses = state.scripted_statuses.pop_front().unwrap_or_else(|| {
            vec![TaskInfo {
                completed: true,
                task: crate::types::TaskBody {
                    status: crate::types::TaskCounts {
                        created: doc_count.max(100),
                        total: doc_count.max(100),
                    },
                },
                response: Some(crate::types::TaskResponseBody::default()),
            }]
        });
        state.tasks.insert(task_id.clone(), statuses.into());
        state.reindex_requests.push(req);

        Ok(ReindexStarted { task: task_id })
    }

    async fn get_task(&self, task_id: &str) -> Result<TaskInfo, ClusterError> {
        let mut state = self.state.lock().unwrap();
        let Some(queue) = state.tasks.get_mut(task_id) else {
            return Err(ClusterError::Api {
                status: 404,
                reason: format!("task [{task_id}] not found"),
            });
        };
        // Drain towards the final status, which then sticks.
        if queue.len() > 1 {
            Ok(queue.pop_front().unwrap())
        } else {
            queue
                .front()
                .cloned()
                .ok_or_else(|| ClusterError::InvalidResponse("empty task script".to_string()))
        }
    }

    async fn delete_task_doc(&self, task_id: &str) -> Result<DeleteResult, ClusterError> {
        let mut state = self.state.lock().unwrap();
        state.tasks.remove(task_id);
        state.deleted_task_docs.push(task_id.to_string());
        Ok(DeleteResult {
            result: "deleted".to_string(),
        })
    }

    async fn get_aliases(&self, index: &str) -> Result<HashMap<String, Value>, ClusterError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .indices
            .get(index)
            .map(|i| i.aliases.clone())
            .unwrap_or_default())
    }

    async fn update_aliases(&self, actions: Vec<AliasAction>) -> Result<Acknowledged, ClusterError> {
        let mut state = self.state.lock().unwrap();
        let ack = Self::acknowledged_for(&state, "update_aliases");
        if ack.acknowledged {
            for action in &actions {
                match action {
                    AliasAction::Add(add) => {
                        let Some(idx) = state.indices.get_mut(&add.index) else {
                            return Err(ClusterError::Api {
                                status: 404,
                                reason: format!("no such index [{}]", add.index),
                            });
                        };
                        let props = match &add.filter {
                            Some(filter) => serde_json::json!({ "filter": filter }),
                            None => serde_json::json!({}),
                        };
                        idx.aliases.insert(add.alias.clone(), props);
                    }
                    AliasAction::RemoveIndex(remove) => {
                        state.indices.remove(&remove.index);
                    }
                }
            }
        }
        state.alias_updates.push(actions);
        Ok(ack)
    }

    async fn nodes_info(&self) -> Result<NodesInfo, ClusterError> {
        let state = self.state.lock().unwrap();
        let nodes = state
            .node_versions
            .iter()
            .enumerate()
            .map(|(i, version)| {
                (
                    format!("node-{i}"),
                    NodeInfo {
                        version: version.clone(),
                    },
                )
            })
            .collect();
        Ok(NodesInfo { nodes })
    }

    async fn set_ml_upgrade_mode(&self, enabled: bool) -> Result<Acknowledged, ClusterError> {
        let mut state = self.state.lock().unwrap();
        state.ml_calls.push(enabled);
        Ok(Self::acknowledged_for(&state, "set_ml_upgrade_mode"))
    }
}
