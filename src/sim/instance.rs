//! Simulated database instance
//!
//! A small process model: a role, a data directory (present or not), a
//! replication position and the status of long-running tasks. Commands
//! take effect immediately; the status probe reports the result.

use crate::instance::{DBState, TaskStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Process role of a simulated instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimRole {
    #[default]
    Stopped,
    Pending,
    Primary,
    Standby,
}

/// State of one simulated instance, including fault knobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimInstance {
    pub role: SimRole,
    /// The data directory holds a usable copy.
    pub has_data: bool,
    /// Replication position as one 64-bit number.
    pub lsn: u64,
    pub build: TaskStatus,
    pub restore: TaskStatus,
    pub maintenance: bool,
    pub hang: bool,
    /// Streams, but too far behind to count as synchronous.
    pub lagging: bool,
    /// Start commands are accepted but have no effect.
    pub fail_start: bool,
    /// Basebackups into this instance end with a failed build.
    pub fail_backup: bool,
    /// Basebackups into this instance never finish.
    pub stall_backup: bool,
    pub fail_restore: bool,
    /// Parameters written by `set_parameters`.
    pub params: BTreeMap<String, String>,
}

impl SimInstance {
    /// Running primary with data at `lsn`.
    pub fn primary(lsn: u64) -> Self {
        Self {
            role: SimRole::Primary,
            has_data: true,
            lsn,
            ..Self::default()
        }
    }

    /// Running standby with data at `lsn`.
    pub fn standby(lsn: u64) -> Self {
        Self {
            role: SimRole::Standby,
            has_data: true,
            lsn,
            ..Self::default()
        }
    }

    /// Stopped instance with data at `lsn`.
    pub fn stopped(lsn: u64) -> Self {
        Self {
            has_data: true,
            lsn,
            ..Self::default()
        }
    }

    /// Stopped instance with an empty data directory.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.role != SimRole::Stopped
    }

    /// Serving as primary and responsive.
    pub fn is_live_primary(&self) -> bool {
        self.role == SimRole::Primary && !self.hang
    }

    /// Streaming from an upstream that is up.
    pub fn is_streaming(&self, upstream_up: bool) -> bool {
        self.role == SimRole::Standby && self.has_data && upstream_up && !self.hang
    }

    /// Probe result given whether this instance's upstream is up.
    pub fn db_state(&self, upstream_up: bool) -> DBState {
        let running = self.is_running();
        DBState {
            process_exists: running,
            connection_available: running && !self.hang,
            in_maintenance: self.maintenance,
            pending: self.role == SimRole::Pending,
            primary: self.role == SimRole::Primary,
            standby: self.role == SimRole::Standby,
            standalone: false,
            hang: self.hang,
            replication_normal: self.is_streaming(upstream_up),
            build_status: self.build,
            backup_status: TaskStatus::None,
            restore_status: self.restore,
            static_connections: 0,
            detail: String::new(),
        }
    }
}

/// Render a 64-bit position as `SEGMENT/OFFSET` hex.
pub fn format_lsn(lsn: u64) -> String {
    format!("{:X}/{:X}", lsn >> 32, lsn & 0xFFFF_FFFF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standby_needs_data_and_upstream() {
        let standby = SimInstance::standby(10);
        assert!(standby.db_state(true).is_standby_normal());
        assert!(!standby.db_state(false).is_standby_normal());

        let empty = SimInstance {
            role: SimRole::Standby,
            ..SimInstance::empty()
        };
        assert!(!empty.db_state(true).is_standby_normal());
    }

    #[test]
    fn test_stopped_state() {
        let state = SimInstance::stopped(5).db_state(true);
        assert!(state.is_stopped());
        assert_eq!(state.describe(), "Stopped");
    }

    #[test]
    fn test_lsn_text() {
        assert_eq!(format_lsn(0x1_0300_0148), "1/3000148");
        assert_eq!(format_lsn(0), "0/0");
    }
}
