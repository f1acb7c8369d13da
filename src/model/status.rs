//! Observed Cluster Status
//!
//! Persisted record of what the last reconciliation pass saw and decided.
//! Exclusively mutated by the pass that owns the cluster and written back
//! through [`crate::platform::ClusterStatusStore`].

use super::spec::ClusterSpec;
use crate::replication::SyncState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle state of a cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClusterState {
    #[default]
    Create,
    Ready,
    Failed,
    Invalid,
    Update,
    Recover,
    Maintain,
    Restore,
}

impl ClusterState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterState::Create => "Create",
            ClusterState::Ready => "Ready",
            ClusterState::Failed => "Failed",
            ClusterState::Invalid => "Invalid",
            ClusterState::Update => "Update",
            ClusterState::Recover => "Recover",
            ClusterState::Maintain => "Maintain",
            ClusterState::Restore => "Restore",
        }
    }

    /// States in which a pass only inspects, unless drift or anomalies
    /// are found.
    pub fn is_steady(&self) -> bool {
        matches!(self, ClusterState::Ready | ClusterState::Invalid)
    }
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tri-state condition value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        }
    }
}

/// Readiness conditions surfaced to users.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conditions {
    pub resource_ready: ConditionStatus,
    pub instances_ready: ConditionStatus,
    pub service_ready: ConditionStatus,
}

impl Conditions {
    /// All three conditions hold.
    pub fn all_true(&self) -> bool {
        self.resource_ready == ConditionStatus::True
            && self.instances_ready == ConditionStatus::True
            && self.service_ready == ConditionStatus::True
    }

    /// Every condition false, as for a cluster being created.
    pub fn all_false() -> Self {
        Self {
            resource_ready: ConditionStatus::False,
            instances_ready: ConditionStatus::False,
            service_ready: ConditionStatus::False,
        }
    }
}

/// Progress of a restore from backup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestorePhase {
    #[default]
    None,
    Running,
    Succeeded,
    Failed,
}

/// Persisted status record of one cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObservedStatus {
    /// Last valid spec that was reconciled. `None` for a new cluster.
    pub spec: Option<ClusterSpec>,
    pub state: ClusterState,
    /// Primary of record. Survives passes that find no primary, so an
    /// outage does not erase who held the data. Empty when none was ever
    /// recorded or when the site is a standby site.
    pub primary: String,
    /// IP -> printable instance state.
    pub instances: BTreeMap<String, String>,
    /// Standby replication states as last reported by the primary.
    pub sync_states: Vec<SyncState>,
    pub restore_phase: RestorePhase,
    pub conditions: Conditions,
    pub message: String,
    pub last_update: Option<DateTime<Utc>>,
}

impl ObservedStatus {
    /// No spec has ever been reconciled.
    pub fn is_new(&self) -> bool {
        self.spec.is_none()
    }

    /// Last recorded primary, if any.
    pub fn primary(&self) -> Option<&str> {
        if self.primary.is_empty() {
            None
        } else {
            Some(&self.primary)
        }
    }

    /// `ip` was a member of the last recorded sync set.
    pub fn in_sync_set(&self, ip: &str) -> bool {
        self.sync_states.iter().any(|s| s.ip == ip && s.is_sync())
    }

    /// Equal apart from the update timestamp.
    pub fn same_content(&self, other: &ObservedStatus) -> bool {
        let mut a = self.clone();
        let mut b = other.clone();
        a.last_update = None;
        b.last_update = None;
        a == b
    }
}
