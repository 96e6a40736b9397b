//! Worker configuration.

use std::time::Duration;

use reindex_types::Settings;

/// Timing configuration for the worker loops.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Interval between polls for in-progress operations.
    pub poll_interval: Duration,

    /// Pause between drive-loop iterations while operations are active.
    /// Keeps task polling from hot-looping the cluster.
    pub drive_interval: Duration,

    /// Max random delay before the first poll, spreading coordinator
    /// fleets that start together (0 = none).
    pub poll_jitter_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            drive_interval: Duration::from_secs(1),
            poll_jitter_secs: 0,
        }
    }
}

impl WorkerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            poll_interval: Duration::from_secs(settings.poll_interval_secs),
            drive_interval: Duration::from_secs(settings.drive_interval_secs),
            poll_jitter_secs: settings.poll_jitter_secs,
        }
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the drive interval.
    pub fn with_drive_interval(mut self, interval: Duration) -> Self {
        self.drive_interval = interval;
        self
    }
}
