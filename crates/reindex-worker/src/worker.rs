//! Process-wide reindex worker.
//!
//! The worker runs two cooperating loops. The outer poll loop wakes on a
//! timer (or a forced-refresh nudge) and loads every in-progress record
//! into the in-memory set. The inner drive loop runs while that set is
//! non-empty: each iteration advances every known operation one step
//! concurrently, joins them all, and refreshes the set from the store.
//!
//! There is no coordination between workers in different processes.
//! Correctness comes from lease discipline on the records: a second worker
//! either loses the version race or refuses to steal a fresh lease, and an
//! abandoned lease becomes stealable once the lease window expires.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use rand::Rng;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use reindex_service::{ErrorKind, ReindexService};
use reindex_types::{ReindexOperation, ReindexStatus, Stored};

use crate::config::WorkerConfig;
use crate::error::WorkerError;

/// Guard enforcing at most one worker instance per process.
static WORKER_EXISTS: AtomicBool = AtomicBool::new(false);

/// Singleton worker driving reindex operations through their steps.
///
/// Construct with [`ReindexWorker::create`]; a second construction in the
/// same process fails until the first instance is dropped.
pub struct ReindexWorker {
    service: Arc<ReindexService>,
    config: WorkerConfig,
    in_progress: RwLock<HashMap<String, Stored<ReindexOperation>>>,
    refresh_notify: Notify,
    shutdown_token: CancellationToken,
    is_started: AtomicBool,
    drive_running: AtomicBool,
    poll_handle: Mutex<Option<JoinHandle<()>>>,
    drive_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ReindexWorker {
    /// Create the process worker.
    ///
    /// Fails with `WorkerError::AlreadyCreated` if an instance already
    /// exists; the guard is released when the instance is dropped.
    pub fn create(
        service: Arc<ReindexService>,
        config: WorkerConfig,
    ) -> Result<Arc<Self>, WorkerError> {
        if WORKER_EXISTS.swap(true, Ordering::SeqCst) {
            return Err(WorkerError::AlreadyCreated);
        }
        Ok(Arc::new(Self {
            service,
            config,
            in_progress: RwLock::new(HashMap::new()),
            refresh_notify: Notify::new(),
            shutdown_token: CancellationToken::new(),
            is_started: AtomicBool::new(false),
            drive_running: AtomicBool::new(false),
            poll_handle: Mutex::new(None),
            drive_handle: Mutex::new(None),
        }))
    }

    /// Start the poll loop.
    pub fn start(self: &Arc<Self>) -> Result<(), WorkerError> {
        if self.is_started.swap(true, Ordering::SeqCst) {
            return Err(WorkerError::AlreadyStarted);
        }
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "Reindex worker started"
        );
        let worker = Arc::clone(self);
        let handle = tokio::spawn(async move { worker.poll_loop().await });
        *self.poll_handle.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// Stop the worker: no new cycles are scheduled, in-flight step bodies
    /// finish, and both loops are joined before this returns.
    pub async fn stop(&self) -> Result<(), WorkerError> {
        if !self.is_started.swap(false, Ordering::SeqCst) {
            return Err(WorkerError::NotStarted);
        }
        info!("Stopping reindex worker");
        self.shutdown_token.cancel();

        let poll = self.poll_handle.lock().unwrap().take();
        if let Some(handle) = poll {
            if let Err(err) = handle.await {
                warn!(error = %err, "Poll loop did not shut down cleanly");
            }
        }
        let drive = self.drive_handle.lock().unwrap().take();
        if let Some(handle) = drive {
            if let Err(err) = handle.await {
                warn!(error = %err, "Drive loop did not shut down cleanly");
            }
        }
        info!("Reindex worker stopped");
        Ok(())
    }

    /// Whether the worker is currently started.
    pub fn is_started(&self) -> bool {
        self.is_started.load(Ordering::SeqCst)
    }

    /// Trigger an out-of-band poll, for use right after an operation is
    /// created in this process.
    pub fn force_refresh(&self) {
        self.refresh_notify.notify_one();
    }

    /// Whether the worker currently holds the record in its in-memory set.
    pub fn includes(&self, id: &str) -> bool {
        self.in_progress.read().unwrap().contains_key(id)
    }

    async fn poll_loop(self: Arc<Self>) {
        startup_jitter(self.config.poll_jitter_secs).await;

        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown_token.cancelled() => {
                    debug!("Poll loop shutting down");
                    break;
                }
                _ = interval.tick() => {}
                _ = self.refresh_notify.notified() => {
                    debug!("Forced refresh");
                }
            }

            self.refresh_operations().await;
            if !self.in_progress.read().unwrap().is_empty() {
                self.ensure_drive_loop();
            }
        }
    }

    /// Replace the in-memory set with the store's in-progress records.
    async fn refresh_operations(&self) {
        match self
            .service
            .find_all_by_status(ReindexStatus::InProgress)
            .await
        {
            Ok(operations) => {
                let mut set = self.in_progress.write().unwrap();
                set.clear();
                for op in operations {
                    set.insert(op.id.clone(), op);
                }
            }
            Err(err) => {
                // The loop keeps running; the next tick retries.
                warn!(error = %err, "Could not refresh in-progress operations");
            }
        }
    }

    /// Start the drive loop if it is not already running.
    fn ensure_drive_loop(self: &Arc<Self>) {
        if self.drive_running.swap(true, Ordering::SeqCst) {
            return;
        }
        let worker = Arc::clone(self);
        let handle = tokio::spawn(async move {
            worker.drive_loop().await;
            worker.drive_running.store(false, Ordering::SeqCst);
        });
        *self.drive_handle.lock().unwrap() = Some(handle);
    }

    async fn drive_loop(&self) {
        debug!("Drive loop started");
        loop {
            if self.shutdown_token.is_cancelled() {
                break;
            }

            let operations: Vec<Stored<ReindexOperation>> = {
                self.in_progress.read().unwrap().values().cloned().collect()
            };
            if operations.is_empty() {
                break;
            }

            // One step per operation, all in parallel, joined before the
            // set is refreshed. Step errors never escape the loop.
            let handles: Vec<JoinHandle<()>> = operations
                .into_iter()
                .map(|op| {
                    let service = Arc::clone(&self.service);
                    tokio::spawn(async move {
                        let index = op.attributes.index_name.clone();
                        if let Err(err) = service.process_next_step(op).await {
                            if err.kind() == ErrorKind::Transient {
                                debug!(index = %index, error = %err, "Step deferred");
                            } else {
                                warn!(index = %index, error = %err, "Step error");
                            }
                        }
                    })
                })
                .collect();
            for handle in handles {
                if let Err(err) = handle.await {
                    warn!(error = %err, "Step task panicked");
                }
            }

            self.refresh_operations().await;
            if self.in_progress.read().unwrap().is_empty() {
                break;
            }

            tokio::select! {
                _ = self.shutdown_token.cancelled() => break,
                _ = tokio::time::sleep(self.config.drive_interval) => {}
            }
        }
        debug!("Drive loop idle");
    }
}

impl Drop for ReindexWorker {
    fn drop(&mut self) {
        WORKER_EXISTS.store(false, Ordering::SeqCst);
    }
}

/// Random delay before the first poll, spreading coordinator fleets that
/// start on the same schedule.
async fn startup_jitter(max_jitter_secs: u64) {
    if max_jitter_secs == 0 {
        return;
    }
    let jitter_ms = rand::thread_rng().gen_range(0..max_jitter_secs * 1000);
    if jitter_ms > 0 {
        debug!(jitter_ms = jitter_ms, "Applying startup jitter");
        tokio::time::sleep(Duration::from_millis(jitter_ms)).await;
    }
}
