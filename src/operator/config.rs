//! Operator Configuration
//!
//! Loaded from a JSON file. Every field has a default, so `{}` is a
//! valid configuration for a single-replica operator.

use super::errors::{OperatorError, OperatorResult};
use crate::observability::LogFormat;
use crate::retry::{RetryPolicy, RetrySettings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// Clusters reconciled concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// This replica's shard.
    #[serde(default)]
    pub shard_index: u32,

    /// Number of operator replicas sharing the clusters.
    #[serde(default = "default_shard_count")]
    pub shard_count: u32,

    /// Seconds between two scheduling rounds.
    #[serde(default = "default_resync_interval")]
    pub resync_interval_secs: u64,

    /// Upper bound on one pass; the pass is abandoned after it.
    #[serde(default = "default_pass_timeout")]
    pub pass_timeout_secs: u64,

    /// Budget of instance-level waits.
    #[serde(default = "default_instance_retry")]
    pub instance_retry: RetrySettings,

    /// Budget of status-write conflict retries.
    #[serde(default = "default_status_retry")]
    pub status_retry: RetrySettings,

    /// Poll until each status write is observed back.
    #[serde(default)]
    pub verify_status_writes: bool,

    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_workers() -> usize {
    4
}
fn default_shard_count() -> u32 {
    1
}
fn default_resync_interval() -> u64 {
    30
}
fn default_pass_timeout() -> u64 {
    1800
}
fn default_instance_retry() -> RetrySettings {
    RetryPolicy::instance_default().into()
}
fn default_status_retry() -> RetrySettings {
    RetryPolicy::status_default().into()
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            shard_index: 0,
            shard_count: default_shard_count(),
            resync_interval_secs: default_resync_interval(),
            pass_timeout_secs: default_pass_timeout(),
            instance_retry: default_instance_retry(),
            status_retry: default_status_retry(),
            verify_status_writes: false,
            log_format: LogFormat::default(),
        }
    }
}

impl OperatorConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> OperatorResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| OperatorError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: OperatorConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> OperatorResult<()> {
        if self.workers == 0 {
            return Err(OperatorError::invalid("workers must be > 0"));
        }
        if self.shard_count == 0 {
            return Err(OperatorError::invalid("shard_count must be > 0"));
        }
        if self.shard_index >= self.shard_count {
            return Err(OperatorError::invalid(format!(
                "shard_index {} out of range for {} shards",
                self.shard_index, self.shard_count
            )));
        }
        if self.resync_interval_secs == 0 {
            return Err(OperatorError::invalid("resync_interval_secs must be > 0"));
        }
        if self.pass_timeout_secs == 0 {
            return Err(OperatorError::invalid("pass_timeout_secs must be > 0"));
        }
        if self.instance_retry.max_attempts == 0 || self.status_retry.max_attempts == 0 {
            return Err(OperatorError::invalid("retry max_attempts must be > 0"));
        }
        Ok(())
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    pub fn pass_timeout(&self) -> Duration {
        Duration::from_secs(self.pass_timeout_secs)
    }
}
