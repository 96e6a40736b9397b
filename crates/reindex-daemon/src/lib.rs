//! # reindex-daemon
//!
//! CLI surface for the reindex orchestrator: one-shot operation commands
//! (create, status, pause, resume, warnings) and the foreground `run`
//! command hosting the background worker.

mod cli;
mod commands;

pub use cli::{Cli, Commands};
pub use commands::{
    build_service, create_operation, init_tracing, pause_operation, resume_operation, run_worker,
    show_status, show_warnings,
};
