//! Instance State Snapshot
//!
//! A [`DBState`] is produced fresh on every probe and never mutated; the
//! reconciler only compares snapshots. When the process exists exactly one
//! of {primary, standby, standalone, pending} is expected to hold. A
//! snapshot with none of them and no process means the instance is stopped.

use super::errors::{InstanceError, InstanceResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Progress of a long-running instance task (build, backup, restore).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    #[default]
    None,
    Complete,
    Failed,
    InProgress,
}

impl TaskStatus {
    /// Returns the status name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::None => "none",
            TaskStatus::Complete => "complete",
            TaskStatus::Failed => "failed",
            TaskStatus::InProgress => "inProgress",
        }
    }

    /// The task has reached a terminal outcome.
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskStatus::Complete | TaskStatus::Failed)
    }
}

/// Role an instance reports for itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbRole {
    Primary,
    Standby,
    Standalone,
    Pending,
}

impl DbRole {
    /// Returns the role name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DbRole::Primary => "Primary",
            DbRole::Standby => "Standby",
            DbRole::Standalone => "Standalone",
            DbRole::Pending => "Pending",
        }
    }
}

/// Health and role snapshot of one instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DBState {
    pub process_exists: bool,
    pub connection_available: bool,
    pub in_maintenance: bool,
    pub pending: bool,
    pub primary: bool,
    pub standby: bool,
    pub standalone: bool,
    pub hang: bool,
    pub replication_normal: bool,
    pub build_status: TaskStatus,
    pub backup_status: TaskStatus,
    pub restore_status: TaskStatus,
    pub static_connections: u32,
    pub detail: String,
}

impl DBState {
    /// Decode the JSON status document returned by a probe.
    pub fn from_json(ip: &str, document: &str) -> InstanceResult<Self> {
        serde_json::from_str(document)
            .map_err(|e| InstanceError::decode(ip, "status document", e.to_string()))
    }

    /// Snapshot standing in for an instance whose probe failed.
    pub fn unreachable(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
            ..Self::default()
        }
    }

    /// Role currently reported, if the process is up and declares one.
    pub fn role(&self) -> Option<DbRole> {
        if !self.process_exists {
            return None;
        }
        if self.primary {
            Some(DbRole::Primary)
        } else if self.standalone {
            Some(DbRole::Standalone)
        } else if self.standby {
            Some(DbRole::Standby)
        } else if self.pending {
            Some(DbRole::Pending)
        } else {
            None
        }
    }

    /// No process is running.
    pub fn is_stopped(&self) -> bool {
        !self.process_exists
    }

    /// Accepting writes: primary, or a standalone single instance.
    pub fn acts_as_primary(&self) -> bool {
        matches!(self.role(), Some(DbRole::Primary | DbRole::Standalone))
    }

    /// Running as a standby, regardless of replication health.
    pub fn is_standby(&self) -> bool {
        self.role() == Some(DbRole::Standby)
    }

    /// Running in the transient pending role.
    pub fn is_pending(&self) -> bool {
        self.role() == Some(DbRole::Pending)
    }

    /// A basebackup or build is copying data into this instance.
    pub fn is_building(&self) -> bool {
        self.build_status == TaskStatus::InProgress
    }

    /// Primary that accepts connections and is not hung.
    pub fn is_primary_normal(&self) -> bool {
        self.acts_as_primary() && self.connection_available && !self.hang
    }

    /// Standby with healthy streaming replication.
    pub fn is_standby_normal(&self) -> bool {
        self.is_standby() && self.replication_normal && !self.hang
    }

    /// Serving in its role without anomalies.
    pub fn is_ready(&self) -> bool {
        !self.in_maintenance && (self.is_primary_normal() || self.is_standby_normal())
    }

    /// Printable state used in the observed status map.
    pub fn describe(&self) -> String {
        let role = match self.role() {
            Some(role) => role.as_str(),
            None if self.process_exists => "Unknown",
            None => "Stopped",
        };

        let health = if self.hang {
            "Hang"
        } else if self.is_building() {
            "Building"
        } else if self.process_exists && !self.connection_available {
            "Starting"
        } else if self.is_primary_normal() || self.is_standby_normal() {
            "Normal"
        } else if self.is_standby() {
            "NeedRepair"
        } else {
            ""
        };

        let mut text = role.to_string();
        if !health.is_empty() {
            text.push(' ');
            text.push_str(health);
        }
        if self.in_maintenance {
            text.push_str(" (maintenance)");
        }
        text
    }
}

impl fmt::Display for DBState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standby_normal() -> DBState {
        DBState {
            process_exists: true,
            connection_available: true,
            standby: true,
            replication_normal: true,
            ..DBState::default()
        }
    }

    #[test]
    fn test_decode_status_document() {
        let doc = r#"{
            "processExists": true,
            "connectionAvailable": true,
            "primary": true,
            "replicationNormal": true,
            "buildStatus": "none",
            "backupStatus": "inProgress",
            "restoreStatus": "complete",
            "staticConnections": 3,
            "detail": "Normal"
        }"#;

        let state = DBState::from_json("10.0.0.1", doc).unwrap();
        assert!(state.acts_as_primary());
        assert!(state.is_primary_normal());
        assert_eq!(state.backup_status, TaskStatus::InProgress);
        assert_eq!(state.restore_status, TaskStatus::Complete);
        assert_eq!(state.static_connections, 3);
    }

    #[test]
    fn test_missing_fields_default() {
        let state = DBState::from_json("10.0.0.1", "{}").unwrap();
        assert!(state.is_stopped());
        assert_eq!(state.role(), None);
        assert_eq!(state.describe(), "Stopped");
    }

    #[test]
    fn test_malformed_document_is_decode_error() {
        let err = DBState::from_json("10.0.0.1", "not json").unwrap_err();
        assert!(matches!(err, InstanceError::Decode { .. }));
    }

    #[test]
    fn test_role_requires_process() {
        let state = DBState {
            primary: true,
            ..DBState::default()
        };
        assert_eq!(state.role(), None);
        assert!(!state.acts_as_primary());
    }

    #[test]
    fn test_standalone_acts_as_primary() {
        let state = DBState {
            process_exists: true,
            connection_available: true,
            standalone: true,
            ..DBState::default()
        };
        assert!(state.acts_as_primary());
        assert!(state.is_ready());
    }

    #[test]
    fn test_standby_needs_repair() {
        let state = DBState {
            replication_normal: false,
            ..standby_normal()
        };
        assert!(state.is_standby());
        assert!(!state.is_standby_normal());
        assert_eq!(state.describe(), "Standby NeedRepair");
    }

    #[test]
    fn test_maintenance_is_not_ready() {
        let state = DBState {
            in_maintenance: true,
            ..standby_normal()
        };
        assert!(!state.is_ready());
        assert_eq!(state.describe(), "Standby Normal (maintenance)");
    }

    #[test]
    fn test_hang_overrides_health() {
        let state = DBState {
            hang: true,
            ..standby_normal()
        };
        assert!(!state.is_standby_normal());
        assert_eq!(state.describe(), "Standby Hang");
    }
}
