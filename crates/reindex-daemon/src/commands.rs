//! Command implementations for the reindex daemon.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::info;

use reindex_cluster::{HttpCluster, HttpClusterConfig};
use reindex_service::ReindexService;
use reindex_storage::RocksStore;
use reindex_types::{ReindexOperation, Settings, Stored};
use reindex_worker::{ReindexWorker, WorkerConfig};

/// Initialise the tracing subscriber from settings.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(settings: &Settings) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Wire up the service from settings: RocksDB store + HTTP cluster client.
pub fn build_service(settings: &Settings) -> Result<Arc<ReindexService>> {
    let store = RocksStore::open(&settings.expanded_db_path())
        .context("Failed to open the operation store")?;

    let mut cluster_config = HttpClusterConfig::new(&settings.cluster_url)
        .with_timeout(Duration::from_secs(settings.request_timeout_secs));
    if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
        cluster_config = cluster_config.with_basic_auth(username, password);
    }
    let cluster = HttpCluster::new(cluster_config).context("Failed to build the cluster client")?;

    Ok(Arc::new(
        ReindexService::new(Arc::new(store), Arc::new(cluster))
            .with_lease_window(settings.lease_window_secs),
    ))
}

fn print_record(stored: &Stored<ReindexOperation>) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&stored.attributes)?);
    Ok(())
}

/// `create <index>`: create-or-retry an operation and print the record.
pub async fn create_operation(settings: &Settings, index: &str) -> Result<()> {
    let service = build_service(settings)?;
    let stored = service
        .create_reindex_operation(index)
        .await
        .with_context(|| format!("Could not create a reindex operation for {index}"))?;
    print_record(&stored)
}

/// `status <index>`: print the current record, if any.
pub async fn show_status(settings: &Settings, index: &str) -> Result<()> {
    let service = build_service(settings)?;
    match service.find_reindex_operation(index).await? {
        Some(stored) => print_record(&stored),
        None => {
            println!("No reindex operation found for {index}");
            Ok(())
        }
    }
}

/// `pause <index>`.
pub async fn pause_operation(settings: &Settings, index: &str) -> Result<()> {
    let service = build_service(settings)?;
    let stored = service.pause_reindex_operation(index).await?;
    print_record(&stored)
}

/// `resume <index>`.
pub async fn resume_operation(settings: &Settings, index: &str) -> Result<()> {
    let service = build_service(settings)?;
    let stored = service.resume_reindex_operation(index).await?;
    print_record(&stored)
}

/// `warnings <index>`: list advisory warnings, or report a missing index.
pub async fn show_warnings(settings: &Settings, index: &str) -> Result<()> {
    let service = build_service(settings)?;
    match service.detect_reindex_warnings(index).await? {
        None => println!("Index {index} does not exist"),
        Some(warnings) if warnings.is_empty() => {
            println!("No warnings for {index}");
        }
        Some(warnings) => {
            for warning in warnings {
                println!("{warning}");
            }
        }
    }
    Ok(())
}

/// `run`: start the worker in the foreground until SIGINT.
pub async fn run_worker(settings: &Settings) -> Result<()> {
    let service = build_service(settings)?;
    let worker = ReindexWorker::create(service, WorkerConfig::from_settings(settings))
        .context("Could not create the reindex worker")?;

    worker.start().context("Could not start the reindex worker")?;
    info!("Worker running; press Ctrl-C to stop");

    signal::ctrl_c()
        .await
        .context("Failed to listen for the shutdown signal")?;
    info!("Shutdown signal received");

    worker.stop().await.context("Worker shutdown failed")?;
    Ok(())
}
