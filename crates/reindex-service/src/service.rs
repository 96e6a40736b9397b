//! The reindex service: stateless business logic over the store and cluster.
//!
//! Every public method is a one-shot operation. `process_next_step` is the
//! heart: it takes a lease on the record, advances the step machine by one,
//! traps fatal errors into the record, runs cleanup, and always releases
//! the lease. Correctness across concurrent coordinators rests entirely on
//! the store's version checks; the service holds no in-process locks.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use tracing::{debug, info, warn};

use reindex_cluster::types::{AliasAction, AliasAdd, AliasRemoveIndex, ReindexRequest};
use reindex_cluster::ClusterClient;
use reindex_storage::OperationStore;
use reindex_types::{
    MlCounter, ReindexOperation, ReindexStatus, ReindexStep, ReindexWarning, Stored,
    DEFAULT_LEASE_WINDOW_SECS, MAX_NEW_INDEX_NAME_ATTEMPTS,
};

use crate::error::{error_chain, ErrorKind, ReindexError};
use crate::script::{boolean_coercion_script, boolean_field_paths};
use crate::transform::{new_index_body, source_replica_count};
use crate::warnings::detect_warnings;

/// Minimum `major.minor` node version for the ML upgrade-mode endpoint.
const ML_MIN_NODE_VERSION: (u64, u64) = (6, 7);
const ML_MIN_NODE_VERSION_LABEL: &str = "6.7.0";

/// Whether an index belongs to the ML system.
pub fn is_ml_index(index_name: &str) -> bool {
    index_name.starts_with(".ml-")
}

/// Stateless reindex business logic.
///
/// Cheap to clone via the shared `Arc`s; one instance serves every worker
/// and API caller in the process.
pub struct ReindexService {
    store: Arc<dyn OperationStore>,
    cluster: Arc<dyn ClusterClient>,
    lease_window: Duration,
}

impl ReindexService {
    /// Create a service with the default 90 s lease window.
    pub fn new(store: Arc<dyn OperationStore>, cluster: Arc<dyn ClusterClient>) -> Self {
        Self {
            store,
            cluster,
            lease_window: Duration::seconds(DEFAULT_LEASE_WINDOW_SECS as i64),
        }
    }

    /// Override the lease window (operators of large clusters widen it).
    pub fn with_lease_window(mut self, window_secs: u64) -> Self {
        self.lease_window = Duration::seconds(window_secs as i64);
        self
    }

    /// Inspect the source index and report advisory warnings.
    ///
    /// Returns `None` when the index does not exist.
    pub async fn detect_reindex_warnings(
        &self,
        index_name: &str,
    ) -> Result<Option<Vec<ReindexWarning>>, ReindexError> {
        match self.cluster.get_index_state(index_name).await? {
            Some(state) => Ok(Some(detect_warnings(index_name, &state))),
            None => Ok(None),
        }
    }

    /// Create a new operation record for `index_name`.
    ///
    /// Fails with `IndexNotFound` when the index is absent. A prior failed
    /// (or cancelled) record for the same index is deleted and replaced;
    /// any other existing record is a conflict.
    pub async fn create_reindex_operation(
        &self,
        index_name: &str,
    ) -> Result<Stored<ReindexOperation>, ReindexError> {
        if !self.cluster.index_exists(index_name).await? {
            return Err(ReindexError::IndexNotFound(index_name.to_string()));
        }

        for existing in self.store.find_by_index_name(index_name).await? {
            match existing.attributes.status {
                ReindexStatus::Failed | ReindexStatus::Cancelled => {
                    info!(
                        index = %index_name,
                        id = %existing.id,
                        "Deleting previous unsuccessful operation before retry"
                    );
                    self.store.delete_operation(&existing.id).await?;
                }
                _ => return Err(ReindexError::OperationExists(index_name.to_string())),
            }
        }

        let new_index_name = self.generate_new_index_name(index_name).await?;
        let stored = self
            .store
            .create_operation(ReindexOperation::new(index_name, new_index_name))
            .await?;
        info!(
            index = %index_name,
            new_index = %stored.attributes.new_index_name,
            "Created reindex operation"
        );
        Ok(stored)
    }

    /// The current operation record for `index_name`, or `None`.
    ///
    /// Prefers the live (in-progress or paused) record; falls back to the
    /// most recent historical one. More than one live record is a broken
    /// invariant and surfaces as an internal error.
    pub async fn find_reindex_operation(
        &self,
        index_name: &str,
    ) -> Result<Option<Stored<ReindexOperation>>, ReindexError> {
        let mut records = self.store.find_by_index_name(index_name).await?;

        let live_count = records
            .iter()
            .filter(|r| {
                matches!(
                    r.attributes.status,
                    ReindexStatus::InProgress | ReindexStatus::Paused
                )
            })
            .count();
        if live_count > 1 {
            return Err(ReindexError::MultipleOperations(index_name.to_string()));
        }

        if let Some(live) = records.iter().position(|r| {
            matches!(
                r.attributes.status,
                ReindexStatus::InProgress | ReindexStatus::Paused
            )
        }) {
            return Ok(Some(records.swap_remove(live)));
        }

        // Record ids are ULIDs, so the lexicographic max is the newest.
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records.pop())
    }

    /// All records in the given status.
    pub async fn find_all_by_status(
        &self,
        status: ReindexStatus,
    ) -> Result<Vec<Stored<ReindexOperation>>, ReindexError> {
        Ok(self.store.find_all_by_status(status).await?)
    }

    /// Pause an in-progress operation. The worker skips it until resumed.
    pub async fn pause_reindex_operation(
        &self,
        index_name: &str,
    ) -> Result<Stored<ReindexOperation>, ReindexError> {
        let stored = self.require_status(index_name, ReindexStatus::InProgress).await?;
        self.update_op(stored, |op| op.status = ReindexStatus::Paused)
            .await
    }

    /// Resume a paused operation.
    pub async fn resume_reindex_operation(
        &self,
        index_name: &str,
    ) -> Result<Stored<ReindexOperation>, ReindexError> {
        let stored = self.require_status(index_name, ReindexStatus::Paused).await?;
        self.update_op(stored, |op| op.status = ReindexStatus::InProgress)
            .await
    }

    /// Advance the operation one step under an exclusive lease.
    ///
    /// Transient errors (lost version races, unacknowledged cluster calls)
    /// leave the record unchanged for the next tick. Fatal errors are
    /// trapped: the record is marked failed with the error chain and
    /// best-effort cleanup reverses the source write block. The lease is
    /// cleared on every exit path.
    pub async fn process_next_step(
        &self,
        stored: Stored<ReindexOperation>,
    ) -> Result<Stored<ReindexOperation>, ReindexError> {
        if stored.attributes.status != ReindexStatus::InProgress {
            return Ok(stored);
        }

        let leased = self.acquire_lease(stored).await?;
        let index_name = leased.attributes.index_name.clone();

        let after_step = match self.run_step(leased.clone()).await {
            Ok(advanced) => advanced,
            Err(err) if err.kind() == ErrorKind::Transient => {
                debug!(
                    index = %index_name,
                    error = %err,
                    "Step did not advance; will retry on the next tick"
                );
                leased
            }
            Err(err) => {
                warn!(index = %index_name, error = %err, "Step failed");
                let failed = self.mark_failed(leased, &err).await;
                self.cleanup_changes(&failed.attributes).await;
                failed
            }
        };

        self.release_lease(after_step).await
    }

    // ----- step bodies -------------------------------------------------

    async fn run_step(
        &self,
        stored: Stored<ReindexOperation>,
    ) -> Result<Stored<ReindexOperation>, ReindexError> {
        match stored.attributes.last_completed_step {
            ReindexStep::Created => self.step_set_ml_upgrade_mode(stored).await,
            ReindexStep::MlUpgradeModeSet => self.step_set_readonly(stored).await,
            ReindexStep::Readonly => self.step_create_new_index(stored).await,
            ReindexStep::NewIndexCreated => self.step_start_reindex(stored).await,
            ReindexStep::ReindexStarted => self.step_check_reindex(stored).await,
            ReindexStep::ReindexCompleted => self.step_switch_alias(stored).await,
            ReindexStep::AliasCreated => self.step_unset_ml_upgrade_mode(stored).await,
            ReindexStep::MlUpgradeModeUnset => Ok(stored),
        }
    }

    async fn step_set_ml_upgrade_mode(
        &self,
        stored: Stored<ReindexOperation>,
    ) -> Result<Stored<ReindexOperation>, ReindexError> {
        if is_ml_index(&stored.attributes.index_name) {
            self.increment_ml_counter().await?;
        }
        self.update_op(stored, |op| {
            op.last_completed_step = ReindexStep::MlUpgradeModeSet;
        })
        .await
    }

    async fn step_set_readonly(
        &self,
        stored: Stored<ReindexOperation>,
    ) -> Result<Stored<ReindexOperation>, ReindexError> {
        let ack = self
            .cluster
            .put_settings(
                &stored.attributes.index_name,
                json!({ "index.blocks.write": true }),
            )
            .await?;
        if !ack.acknowledged {
            return Err(ReindexError::NotAcknowledged(
                "setting the source index readonly",
            ));
        }
        self.update_op(stored, |op| op.last_completed_step = ReindexStep::Readonly)
            .await
    }

    async fn step_create_new_index(
        &self,
        stored: Stored<ReindexOperation>,
    ) -> Result<Stored<ReindexOperation>, ReindexError> {
        let index_name = &stored.attributes.index_name;
        let state = self
            .cluster
            .get_index_state(index_name)
            .await?
            .ok_or_else(|| ReindexError::IndexNotFound(index_name.clone()))?;

        let body = new_index_body(index_name, &state)?;
        let ack = self
            .cluster
            .create_index(&stored.attributes.new_index_name, body)
            .await?;
        if !ack.acknowledged {
            return Err(ReindexError::NotAcknowledged(
                "creating the destination index",
            ));
        }
        self.update_op(stored, |op| {
            op.last_completed_step = ReindexStep::NewIndexCreated;
        })
        .await
    }

    async fn step_start_reindex(
        &self,
        stored: Stored<ReindexOperation>,
    ) -> Result<Stored<ReindexOperation>, ReindexError> {
        let index_name = &stored.attributes.index_name;
        let state = self
            .cluster
            .get_index_state(index_name)
            .await?
            .ok_or_else(|| ReindexError::IndexNotFound(index_name.clone()))?;

        let mut request =
            ReindexRequest::new(index_name, &stored.attributes.new_index_name);
        let paths = boolean_field_paths(index_name, &state.mappings);
        if !paths.is_empty() {
            request = request.with_script(boolean_coercion_script(&paths));
        }

        let started = self.cluster.start_reindex(request).await?;
        info!(index = %index_name, task = %started.task, "Dispatched reindex task");

        self.update_op(stored, |op| {
            op.last_completed_step = ReindexStep::ReindexStarted;
            op.reindex_task_id = Some(started.task);
            op.reindex_task_perc_complete = 0.0;
        })
        .await
    }

    async fn step_check_reindex(
        &self,
        stored: Stored<ReindexOperation>,
    ) -> Result<Stored<ReindexOperation>, ReindexError> {
        let task_id = stored
            .attributes
            .reindex_task_id
            .clone()
            .ok_or_else(|| ReindexError::MissingTaskId(stored.attributes.index_name.clone()))?;

        let task = self.cluster.get_task(&task_id).await?;
        let counts = task.task.status;

        if !task.completed {
            let progress = if counts.total > 0 {
                counts.created as f64 / counts.total as f64
            } else {
                0.0
            };
            debug!(
                index = %stored.attributes.index_name,
                progress = progress,
                "Reindex task still running"
            );
            // The step marker stays; only the progress moves.
            return self
                .update_op(stored, |op| op.reindex_task_perc_complete = progress)
                .await;
        }

        if counts.created < counts.total {
            let example = task
                .response
                .as_ref()
                .and_then(|r| r.failures.first())
                .map(|f| f.to_string())
                .unwrap_or_else(|| "unknown failure".to_string());
            return Err(ReindexError::ReindexTaskFailed {
                task_id,
                created: counts.created,
                total: counts.total,
                example,
            });
        }

        let deleted = self.cluster.delete_task_doc(&task_id).await?;
        if deleted.result != "deleted" {
            return Err(ReindexError::TaskDocNotDeleted(task_id));
        }

        self.update_op(stored, |op| {
            op.last_completed_step = ReindexStep::ReindexCompleted;
            op.reindex_task_perc_complete = 1.0;
        })
        .await
    }

    async fn step_switch_alias(
        &self,
        stored: Stored<ReindexOperation>,
    ) -> Result<Stored<ReindexOperation>, ReindexError> {
        let index_name = stored.attributes.index_name.clone();
        let new_index_name = stored.attributes.new_index_name.clone();

        // Restore the source's replica count on the destination now that
        // the copy is done; it was zeroed for the duration of the copy.
        if let Some(state) = self.cluster.get_index_state(&index_name).await? {
            let replicas = source_replica_count(&state.settings);
            let ack = self
                .cluster
                .put_settings(
                    &new_index_name,
                    json!({ "index.number_of_replicas": replicas }),
                )
                .await?;
            if !ack.acknowledged {
                return Err(ReindexError::NotAcknowledged(
                    "restoring the destination replica count",
                ));
            }
        }

        let existing_aliases = self.cluster.get_aliases(&index_name).await?;

        let mut actions = vec![AliasAction::Add(AliasAdd {
            index: new_index_name.clone(),
            alias: index_name.clone(),
            filter: None,
        })];
        for (alias, props) in existing_aliases {
            actions.push(AliasAction::Add(AliasAdd {
                index: new_index_name.clone(),
                alias,
                filter: props.get("filter").cloned(),
            }));
        }
        actions.push(AliasAction::RemoveIndex(AliasRemoveIndex {
            index: index_name.clone(),
        }));

        let ack = self.cluster.update_aliases(actions).await?;
        if !ack.acknowledged {
            return Err(ReindexError::NotAcknowledged("switching the alias"));
        }
        info!(index = %index_name, new_index = %new_index_name, "Alias switched");

        // The ML-unset step is a no-op for non-ML indices, so they complete
        // here, jumping the marker to the terminal step in the same write.
        let ml = is_ml_index(&index_name);
        self.update_op(stored, |op| {
            if ml {
                op.last_completed_step = ReindexStep::AliasCreated;
            } else {
                op.last_completed_step = ReindexStep::MlUpgradeModeUnset;
                op.status = ReindexStatus::Completed;
                op.reindex_task_id = None;
            }
        })
        .await
    }

    async fn step_unset_ml_upgrade_mode(
        &self,
        stored: Stored<ReindexOperation>,
    ) -> Result<Stored<ReindexOperation>, ReindexError> {
        if is_ml_index(&stored.attributes.index_name) {
            self.decrement_ml_counter().await?;
        }
        self.update_op(stored, |op| {
            op.last_completed_step = ReindexStep::MlUpgradeModeUnset;
            op.status = ReindexStatus::Completed;
            op.reindex_task_id = None;
        })
        .await
    }

    // ----- lease discipline --------------------------------------------

    async fn acquire_lease(
        &self,
        stored: Stored<ReindexOperation>,
    ) -> Result<Stored<ReindexOperation>, ReindexError> {
        let now = Utc::now();
        if stored.attributes.lease_is_live(self.lease_window, now) {
            return Err(ReindexError::OperationLocked(
                stored.attributes.index_name.clone(),
            ));
        }
        // Losing the version race here means another worker took the lease.
        self.update_op(stored, |op| op.locked = Some(now)).await
    }

    async fn release_lease(
        &self,
        stored: Stored<ReindexOperation>,
    ) -> Result<Stored<ReindexOperation>, ReindexError> {
        let id = stored.id.clone();
        match self.update_op(stored, |op| op.locked = None).await {
            Ok(released) => Ok(released),
            Err(ReindexError::Storage(err)) if err.is_version_conflict() => {
                // The lease expired mid-step and was stolen; the new owner
                // is responsible for the stamp now.
                warn!(id = %id, "Lease was stolen before release");
                let current = self.store.get_operation(&id).await?;
                current.ok_or(ReindexError::Storage(err))
            }
            Err(err) => Err(err),
        }
    }

    async fn mark_failed(
        &self,
        stored: Stored<ReindexOperation>,
        err: &ReindexError,
    ) -> Stored<ReindexOperation> {
        let message = error_chain(err);
        match self
            .update_op(stored.clone(), |op| {
                op.status = ReindexStatus::Failed;
                op.error_message = Some(message.clone());
            })
            .await
        {
            Ok(failed) => failed,
            Err(update_err) => {
                warn!(
                    id = %stored.id,
                    error = %update_err,
                    "Could not record step failure"
                );
                stored
            }
        }
    }

    /// Best-effort reversal of changes made on behalf of a now-failed
    /// operation. Errors are logged, never propagated: the worker must keep
    /// running for other operations.
    ///
    /// A partially created destination index is deliberately left in place
    /// for inspection; retrying generates the next free destination name.
    async fn cleanup_changes(&self, op: &ReindexOperation) {
        if op.last_completed_step >= ReindexStep::Readonly {
            match self
                .cluster
                .put_settings(&op.index_name, json!({ "index.blocks.write": false }))
                .await
            {
                Ok(ack) if ack.acknowledged => {
                    debug!(index = %op.index_name, "Removed write block during cleanup");
                }
                Ok(_) => {
                    warn!(index = %op.index_name, "Cleanup write-block removal not acknowledged");
                }
                Err(err) => {
                    warn!(index = %op.index_name, error = %err, "Cleanup write-block removal failed");
                }
            }
        }

        // Pair the counter increment when an ML operation dies between the
        // set and unset steps, so the global toggle can still come down.
        if is_ml_index(&op.index_name)
            && op.last_completed_step >= ReindexStep::MlUpgradeModeSet
            && op.last_completed_step < ReindexStep::MlUpgradeModeUnset
        {
            if let Err(err) = self.decrement_ml_counter().await {
                warn!(index = %op.index_name, error = %err, "Cleanup ML counter decrement failed");
            }
        }
    }

    // ----- ML counter coordination -------------------------------------

    async fn acquire_ml_lease(&self) -> Result<Stored<MlCounter>, ReindexError> {
        let counter = self.store.get_ml_counter().await?;
        let now = Utc::now();
        if let Some(stamp) = counter.attributes.locked {
            if now.signed_duration_since(stamp) < self.lease_window {
                return Err(ReindexError::MlCounterLocked);
            }
        }
        let mut attributes = counter.attributes;
        attributes.locked = Some(now);
        self.store
            .update_ml_counter(Stored::new(counter.id, counter.version, attributes))
            .await
            .map_err(|err| {
                if err.is_version_conflict() {
                    ReindexError::MlCounterLocked
                } else {
                    ReindexError::Storage(err)
                }
            })
    }

    async fn release_ml_lease(&self, leased: Stored<MlCounter>) {
        let mut attributes = leased.attributes;
        attributes.locked = None;
        if let Err(err) = self
            .store
            .update_ml_counter(Stored::new(leased.id, leased.version, attributes))
            .await
        {
            warn!(error = %err, "Could not release ML counter lease");
        }
    }

    async fn increment_ml_counter(&self) -> Result<(), ReindexError> {
        let leased = self.acquire_ml_lease().await?;
        let new_count = leased.attributes.ml_reindex_count + 1;

        let outcome = async {
            self.validate_nodes_minimum_version().await?;
            // The toggle goes up only on the first in-flight ML reindex.
            if new_count == 1 {
                let ack = self.cluster.set_ml_upgrade_mode(true).await?;
                if !ack.acknowledged {
                    return Err(ReindexError::NotAcknowledged("enabling ML upgrade mode"));
                }
                info!("ML upgrade mode enabled");
            }
            Ok(())
        }
        .await;

        match outcome {
            Ok(()) => {
                let mut attributes = leased.attributes;
                attributes.ml_reindex_count = new_count;
                attributes.locked = None;
                self.store
                    .update_ml_counter(Stored::new(leased.id, leased.version, attributes))
                    .await?;
                Ok(())
            }
            Err(err) => {
                self.release_ml_lease(leased).await;
                Err(err)
            }
        }
    }

    async fn decrement_ml_counter(&self) -> Result<(), ReindexError> {
        let leased = self.acquire_ml_lease().await?;
        let new_count = leased.attributes.ml_reindex_count.saturating_sub(1);

        let outcome = async {
            // The toggle comes down only when the last ML reindex finishes.
            if new_count == 0 {
                let ack = self.cluster.set_ml_upgrade_mode(false).await?;
                if !ack.acknowledged {
                    return Err(ReindexError::NotAcknowledged("disabling ML upgrade mode"));
                }
                info!("ML upgrade mode disabled");
            }
            Ok(())
        }
        .await;

        match outcome {
            Ok(()) => {
                let mut attributes = leased.attributes;
                attributes.ml_reindex_count = new_count;
                attributes.locked = None;
                self.store
                    .update_ml_counter(Stored::new(leased.id, leased.version, attributes))
                    .await?;
                Ok(())
            }
            Err(err) => {
                self.release_ml_lease(leased).await;
                Err(err)
            }
        }
    }

    async fn validate_nodes_minimum_version(&self) -> Result<(), ReindexError> {
        let nodes = self.cluster.nodes_info().await?;
        let all_meet_floor = nodes.versions().iter().all(|version| {
            parse_major_minor(version)
                .map(|v| v >= ML_MIN_NODE_VERSION)
                .unwrap_or(false)
        });
        if !all_meet_floor {
            return Err(ReindexError::NodeVersionTooLow {
                required: ML_MIN_NODE_VERSION_LABEL,
            });
        }
        Ok(())
    }

    // ----- helpers -----------------------------------------------------

    async fn generate_new_index_name(&self, index_name: &str) -> Result<String, ReindexError> {
        for n in 0..MAX_NEW_INDEX_NAME_ATTEMPTS {
            let candidate = format!("{index_name}-reindex-{n}");
            if !self.cluster.index_exists(&candidate).await? {
                return Ok(candidate);
            }
        }
        Err(ReindexError::NewIndexNameExhausted {
            index: index_name.to_string(),
            attempts: MAX_NEW_INDEX_NAME_ATTEMPTS,
        })
    }

    async fn require_status(
        &self,
        index_name: &str,
        expected: ReindexStatus,
    ) -> Result<Stored<ReindexOperation>, ReindexError> {
        let stored = self
            .find_reindex_operation(index_name)
            .await?
            .ok_or_else(|| ReindexError::OperationNotFound(index_name.to_string()))?;
        if stored.attributes.status != expected {
            return Err(ReindexError::InvalidStatus {
                index: index_name.to_string(),
                actual: stored.attributes.status,
                expected,
            });
        }
        Ok(stored)
    }

    async fn update_op(
        &self,
        stored: Stored<ReindexOperation>,
        mutate: impl FnOnce(&mut ReindexOperation) + Send,
    ) -> Result<Stored<ReindexOperation>, ReindexError> {
        let mut attributes = stored.attributes;
        mutate(&mut attributes);
        Ok(self
            .store
            .update_operation(Stored::new(stored.id, stored.version, attributes))
            .await?)
    }
}

fn parse_major_minor(version: &str) -> Option<(u64, u64)> {
    let mut parts = version.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    Some((major, minor))
}
