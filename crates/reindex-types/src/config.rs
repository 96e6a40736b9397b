//! Configuration loading for the reindex orchestrator.
//!
//! Layered precedence: built-in defaults, then the config file at
//! `~/.config/reindexer/config.toml`, then an optional CLI-specified file,
//! then `REINDEXER_*` environment variables. CLI flags are applied by the
//! caller after `Settings::load` returns.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::operation::DEFAULT_LEASE_WINDOW_SECS;

/// Main application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Base URL of the target cluster (e.g. "http://localhost:9200")
    #[serde(default = "default_cluster_url")]
    pub cluster_url: String,

    /// Basic-auth username for the cluster, if any
    #[serde(default)]
    pub username: Option<String>,

    /// Basic-auth password for the cluster (prefer the env var over the file)
    #[serde(default)]
    pub password: Option<String>,

    /// Path to the RocksDB directory holding operation records
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Seconds between worker polls for in-progress operations
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Seconds between drive-loop iterations while operations are active
    #[serde(default = "default_drive_interval_secs")]
    pub drive_interval_secs: u64,

    /// Seconds a lease stamp stays live before it may be stolen
    #[serde(default = "default_lease_window_secs")]
    pub lease_window_secs: u64,

    /// Per-request timeout for cluster calls, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Max startup jitter in seconds before the first poll (0 = none)
    #[serde(default)]
    pub poll_jitter_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_cluster_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_db_path() -> String {
    ProjectDirs::from("", "", "reindexer")
        .map(|p| p.data_local_dir().join("db"))
        .unwrap_or_else(|| PathBuf::from("./data"))
        .to_string_lossy()
        .to_string()
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_drive_interval_secs() -> u64 {
    1
}

fn default_lease_window_secs() -> u64 {
    DEFAULT_LEASE_WINDOW_SECS
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cluster_url: default_cluster_url(),
            username: None,
            password: None,
            db_path: default_db_path(),
            poll_interval_secs: default_poll_interval_secs(),
            drive_interval_secs: default_drive_interval_secs(),
            lease_window_secs: default_lease_window_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            poll_jitter_secs: 0,
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/reindexer/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (REINDEXER_*)
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, ConfigError> {
        let config_dir = ProjectDirs::from("", "", "reindexer")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("cluster_url", default_cluster_url())
            .map_err(|e| ConfigError::Load(e.to_string()))?
            .set_default("db_path", default_db_path())
            .map_err(|e| ConfigError::Load(e.to_string()))?
            .set_default("poll_interval_secs", default_poll_interval_secs() as i64)
            .map_err(|e| ConfigError::Load(e.to_string()))?
            .set_default("drive_interval_secs", default_drive_interval_secs() as i64)
            .map_err(|e| ConfigError::Load(e.to_string()))?
            .set_default("lease_window_secs", default_lease_window_secs() as i64)
            .map_err(|e| ConfigError::Load(e.to_string()))?
            .set_default("request_timeout_secs", default_request_timeout_secs() as i64)
            .map_err(|e| ConfigError::Load(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| ConfigError::Load(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // REINDEXER_CLUSTER_URL, REINDEXER_DB_PATH, REINDEXER_PASSWORD, ...
        builder = builder.add_source(
            Environment::with_prefix("REINDEXER")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| ConfigError::Load(e.to_string()))
    }

    /// Expand a leading `~/` in `db_path` to the home directory.
    pub fn expanded_db_path(&self) -> PathBuf {
        if let Some(rest) = self.db_path.strip_prefix("~/") {
            if let Some(dirs) = directories::BaseDirs::new() {
                return dirs.home_dir().join(rest);
            }
        }
        PathBuf::from(&self.db_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.cluster_url, "http://localhost:9200");
        assert_eq!(settings.poll_interval_secs, 30);
        assert_eq!(settings.drive_interval_secs, 1);
        assert_eq!(settings.lease_window_secs, 90);
        assert_eq!(settings.log_level, "info");
        assert!(settings.username.is_none());
    }

    #[test]
    fn test_settings_deserialize_partial() {
        let settings: Settings =
            serde_json::from_str("{\"cluster_url\":\"http://es:9200\",\"lease_window_secs\":120}")
                .unwrap();
        assert_eq!(settings.cluster_url, "http://es:9200");
        assert_eq!(settings.lease_window_secs, 120);
        // Everything else falls back to defaults.
        assert_eq!(settings.poll_interval_secs, 30);
    }

    #[test]
    fn test_expanded_db_path_passthrough() {
        let settings = Settings {
            db_path: "/var/lib/reindexer/db".to_string(),
            ..Default::default()
        };
        assert_eq!(
            settings.expanded_db_path(),
            PathBuf::from("/var/lib/reindexer/db")
        );
    }
}
