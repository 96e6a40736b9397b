//! Reindex Daemon
//!
//! Drives index migrations to the new cluster major.
//!
//! # Usage
//!
//! ```bash
//! reindex-daemon create <index>
//! reindex-daemon status <index>
//! reindex-daemon pause <index> | resume <index>
//! reindex-daemon warnings <index>
//! reindex-daemon run
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/reindexer/config.toml)
//! 3. Environment variables (REINDEXER_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use reindex_daemon::{
    create_operation, init_tracing, pause_operation, resume_operation, run_worker, show_status,
    show_warnings, Cli, Commands,
};
use reindex_types::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(log_level) = cli.log_level {
        settings.log_level = log_level;
    }
    if let Some(cluster_url) = cli.cluster_url {
        settings.cluster_url = cluster_url;
    }
    if let Some(db_path) = cli.db_path {
        settings.db_path = db_path;
    }

    init_tracing(&settings);

    match cli.command {
        Commands::Create { index } => create_operation(&settings, &index).await?,
        Commands::Status { index } => show_status(&settings, &index).await?,
        Commands::Pause { index } => pause_operation(&settings, &index).await?,
        Commands::Resume { index } => resume_operation(&settings, &index).await?,
        Commands::Warnings { index } => show_warnings(&settings, &index).await?,
        Commands::Run => run_worker(&settings).await?,
    }

    Ok(())
}
