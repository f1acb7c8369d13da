//! Cluster lifecycle events
//!
//! Every state transition and every repair action the reconciler takes is
//! reported as a typed event. Events are one-way: nothing in a pass
//! depends on their delivery.

use std::fmt;

/// Observable events of a reconciled cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterEvent {
    // Lifecycle
    /// First pass for a cluster without persisted status
    Create,
    /// Desired spec drifted from the last reconciled one
    Update,
    /// Steady-state inspection found anomalies
    Recover,
    /// All conditions hold
    Ready,
    /// Maintenance mode switched on
    Maintain,
    /// Maintenance mode switched off
    MaintainDone,
    /// Restore from a backup file
    Restore,
    /// Automated recovery stopped, manual intervention needed
    Failed,
    /// Desired spec rejected by validation
    Invalid,

    // Topology repair
    Switchover,
    Promote,
    Demote,
    Basebackup,
    Upgrade,
    Cleanup,

    // Replication
    MostAvailableOn,
    MostAvailableOff,

    // Resources
    /// A missing auxiliary resource was recreated
    ResourceRecreated,
}

impl ClusterEvent {
    /// Returns the event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterEvent::Create => "CREATE",
            ClusterEvent::Update => "UPDATE",
            ClusterEvent::Recover => "RECOVER",
            ClusterEvent::Ready => "READY",
            ClusterEvent::Maintain => "MAINTAIN",
            ClusterEvent::MaintainDone => "MAINTAIN_DONE",
            ClusterEvent::Restore => "RESTORE",
            ClusterEvent::Failed => "FAILED",
            ClusterEvent::Invalid => "INVALID",
            ClusterEvent::Switchover => "SWITCHOVER",
            ClusterEvent::Promote => "PROMOTE",
            ClusterEvent::Demote => "DEMOTE",
            ClusterEvent::Basebackup => "BASEBACKUP",
            ClusterEvent::Upgrade => "UPGRADE",
            ClusterEvent::Cleanup => "CLEANUP",
            ClusterEvent::MostAvailableOn => "MOST_AVAILABLE_ON",
            ClusterEvent::MostAvailableOff => "MOST_AVAILABLE_OFF",
            ClusterEvent::ResourceRecreated => "RESOURCE_RECREATED",
        }
    }

    /// Alert-class events that warrant attention.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            ClusterEvent::Failed
                | ClusterEvent::Invalid
                | ClusterEvent::MostAvailableOn
                | ClusterEvent::ResourceRecreated
        )
    }
}

impl fmt::Display for ClusterEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
