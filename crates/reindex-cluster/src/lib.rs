//! # reindex-cluster
//!
//! Typed client for the target cluster's REST surface.
//!
//! Provides:
//! - The [`ClusterClient`] trait consumed by the reindex service
//! - [`HttpCluster`]: `reqwest`-based production implementation
//! - [`MockCluster`]: scripted in-memory cluster for tests
//! - Wire types for settings, reindex, task, alias and node responses

mod client;
mod error;
mod http;
pub mod mock;
pub mod types;

pub use client::ClusterClient;
pub use error::ClusterError;
pub use http::{HttpCluster, HttpClusterConfig};
pub use mock::MockCluster;
