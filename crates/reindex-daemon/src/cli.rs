//! CLI argument parsing for the reindex daemon.

use clap::{Parser, Subcommand};

/// Reindex Daemon
///
/// Drives index migrations to the new cluster major: creates operation
/// records, runs the background worker, and reports progress.
#[derive(Parser, Debug)]
#[command(name = "reindex-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/reindexer/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override the cluster base URL
    #[arg(long, global = true)]
    pub cluster_url: Option<String>,

    /// Override the operation store path
    #[arg(long, global = true)]
    pub db_path: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Daemon commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a reindex operation for an index (retries a failed one)
    Create {
        /// Source index to migrate
        index: String,
    },

    /// Show the current operation record for an index
    Status {
        /// Source index
        index: String,
    },

    /// Pause an in-progress operation
    Pause {
        /// Source index
        index: String,
    },

    /// Resume a paused operation
    Resume {
        /// Source index
        index: String,
    },

    /// List advisory warnings for an index before migrating it
    Warnings {
        /// Source index
        index: String,
    },

    /// Run the worker in the foreground until interrupted
    Run,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
