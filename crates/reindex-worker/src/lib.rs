//! # reindex-worker
//!
//! Background worker for the reindex orchestrator.
//!
//! Provides [`ReindexWorker`], a process-wide singleton that polls the
//! store for in-progress operations and drives each one through its next
//! step, with a forced-refresh nudge and graceful shutdown via
//! `CancellationToken`.

mod config;
mod error;
mod worker;

pub use config::WorkerConfig;
pub use error::WorkerError;
pub use worker::ReindexWorker;
