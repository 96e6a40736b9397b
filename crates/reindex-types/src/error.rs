//! Error types shared across the reindexer.

use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration could not be read or deserialized
    #[error("Configuration error: {0}")]
    Load(String),
}
