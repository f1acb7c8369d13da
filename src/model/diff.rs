//! Spec Change Detection
//!
//! Field-by-field comparison of the last reconciled spec against the
//! desired one. The result decides which readiness conditions a change
//! invalidates and whether the pass is an update or a restore.

use super::spec::ClusterSpec;
use super::status::{ConditionStatus, Conditions};

/// What changed between two specs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpecDiff {
    pub resources: bool,
    pub storage: bool,
    pub image: bool,
    pub service: bool,
    pub role: bool,
    pub db_config: bool,
    pub local_ips: bool,
    pub remote_ips: bool,
    pub restore_file: bool,
    pub maintenance: bool,
}

impl SpecDiff {
    /// Compare `previous` (last reconciled) with `next` (desired).
    pub fn between(previous: &ClusterSpec, next: &ClusterSpec) -> Self {
        let (old, new) = (&previous.resources, &next.resources);
        Self {
            resources: old.cpu_millis != new.cpu_millis || old.memory_mib != new.memory_mib,
            storage: old.storage_gib != new.storage_gib,
            image: previous.image != next.image,
            service: previous.service != next.service,
            role: previous.topology.local_role != next.topology.local_role,
            db_config: previous.db_config != next.db_config,
            local_ips: previous.topology.local_ips() != next.topology.local_ips(),
            // Order matters: it is the synchronous-target priority.
            remote_ips: previous.topology.remote_ips != next.topology.remote_ips,
            restore_file: previous.restore_file != next.restore_file,
            maintenance: previous.maintenance != next.maintenance,
        }
    }

    /// Any change that has to be reconciled as an update. Maintenance
    /// toggles are handled separately.
    pub fn requires_update(&self) -> bool {
        self.resources
            || self.storage
            || self.image
            || self.service
            || self.role
            || self.db_config
            || self.local_ips
            || self.remote_ips
    }

    /// A new restore was requested.
    pub fn requires_restore(&self, next: &ClusterSpec) -> bool {
        self.restore_file && next.restore_file.is_some()
    }

    /// The compute units themselves have to be rebuilt.
    pub fn touches_units(&self) -> bool {
        self.resources || self.storage || self.image
    }

    /// Auxiliary resources (services, config objects) must be re-applied.
    pub fn touches_auxiliary(&self) -> bool {
        self.service || self.role || self.db_config
    }

    /// Downgrade the conditions this change invalidates.
    pub fn invalidate(&self, conditions: &mut Conditions) {
        if self.touches_units() || self.role {
            conditions.instances_ready = ConditionStatus::False;
            conditions.resource_ready = ConditionStatus::False;
        }
        if self.db_config || self.remote_ips || self.local_ips {
            conditions.instances_ready = ConditionStatus::False;
        }
        if self.role || self.service {
            conditions.service_ready = ConditionStatus::False;
        }
    }

    /// Names of the changed fields, for messages and events.
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let fields = [
            (self.resources, "resources"),
            (self.storage, "storage"),
            (self.image, "image"),
            (self.service, "service"),
            (self.role, "role"),
            (self.db_config, "dbConfig"),
            (self.local_ips, "localIps"),
            (self.remote_ips, "remoteIps"),
            (self.restore_file, "restoreFile"),
            (self.maintenance, "maintenance"),
        ];
        fields
            .iter()
            .filter(|(changed, _)| *changed)
            .map(|(_, name)| *name)
            .collect()
    }
}
