//! Orchestrator Collaborator
//!
//! Compute units are addressed by cluster + instance IP. The role label of
//! a classic deployment is replaced by an explicit [`InstanceMeta`] record
//! kept alongside each unit and written through [`Orchestrator::set_meta`].

use super::errors::{PlatformError, PlatformResult};
use crate::model::{ClusterKey, ClusterSpec, Resources};
use crate::retry::{wait_until, RetryPolicy, Sleeper, WaitError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of a compute unit as reported by the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitPhase {
    Pending,
    Running,
    Failed,
    #[default]
    Unknown,
}

impl UnitPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitPhase::Pending => "Pending",
            UnitPhase::Running => "Running",
            UnitPhase::Failed => "Failed",
            UnitPhase::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for UnitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Role recorded on a unit for service routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitRole {
    Primary,
    Standby,
}

impl UnitRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitRole::Primary => "primary",
            UnitRole::Standby => "standby",
        }
    }
}

/// Explicit per-unit metadata record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstanceMeta {
    pub role: Option<UnitRole>,
    /// Digest of the replication parameters last pushed to the instance.
    pub config_digest: Option<String>,
}

/// What a unit is built from. A mismatch with the desired spec means the
/// unit has to be recreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitTemplate {
    pub image: String,
    pub resources: Resources,
}

impl UnitTemplate {
    pub fn for_spec(spec: &ClusterSpec) -> Self {
        Self {
            image: spec.image.clone(),
            resources: spec.resources,
        }
    }
}

/// One compute unit hosting one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceUnit {
    pub name: String,
    pub ip: String,
    pub phase: UnitPhase,
    /// The unit's network endpoint answers.
    pub reachable: bool,
    pub template: UnitTemplate,
    /// Marker left by an older resource layout; forces a rebuild.
    #[serde(default)]
    pub legacy_layout: bool,
    #[serde(default)]
    pub meta: InstanceMeta,
}

impl InstanceUnit {
    /// Running and reachable: the instance channel can be used.
    pub fn is_running(&self) -> bool {
        self.phase == UnitPhase::Running && self.reachable
    }

    /// The unit no longer matches what `spec` asks for.
    pub fn needs_upgrade(&self, spec: &ClusterSpec) -> bool {
        self.legacy_layout || self.template != UnitTemplate::for_spec(spec)
    }
}

/// The four auxiliary resources every cluster owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AuxiliaryKind {
    ConfigMap,
    Secret,
    WriteService,
    ReadService,
}

impl AuxiliaryKind {
    pub const ALL: [AuxiliaryKind; 4] = [
        AuxiliaryKind::ConfigMap,
        AuxiliaryKind::Secret,
        AuxiliaryKind::WriteService,
        AuxiliaryKind::ReadService,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuxiliaryKind::ConfigMap => "config-map",
            AuxiliaryKind::Secret => "secret",
            AuxiliaryKind::WriteService => "write-service",
            AuxiliaryKind::ReadService => "read-service",
        }
    }
}

impl fmt::Display for AuxiliaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Compute units and auxiliary resources of the orchestration platform.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Every unit labelled for `cluster`, ordered by IP.
    async fn list_units(&self, cluster: &ClusterKey) -> PlatformResult<Vec<InstanceUnit>>;

    async fn get_unit(&self, cluster: &ClusterKey, ip: &str) -> PlatformResult<InstanceUnit>;

    async fn delete_unit(&self, cluster: &ClusterKey, ip: &str) -> PlatformResult<()>;

    /// Delete and recreate the unit from `template`. Storage is kept.
    async fn recreate_unit(&self, cluster: &ClusterKey, ip: &str, template: &UnitTemplate) -> PlatformResult<()>;

    /// Replace the metadata record of a unit.
    async fn set_meta(&self, cluster: &ClusterKey, ip: &str, meta: &InstanceMeta) -> PlatformResult<()>;

    async fn auxiliary_exists(&self, cluster: &ClusterKey, kind: AuxiliaryKind) -> PlatformResult<bool>;

    /// Create or update one auxiliary resource. Idempotent.
    async fn ensure_auxiliary(&self, spec: &ClusterSpec, kind: AuxiliaryKind) -> PlatformResult<()>;
}

/// Source of the cluster objects to reconcile.
#[async_trait]
pub trait SpecSource: Send + Sync {
    async fn list_specs(&self) -> PlatformResult<Vec<ClusterSpec>>;
}

/// Wait until the unit for `ip` is running and reachable.
pub async fn wait_unit_running(
    orchestrator: &dyn Orchestrator,
    sleeper: &dyn Sleeper,
    policy: &RetryPolicy,
    cluster: &ClusterKey,
    ip: &str,
) -> PlatformResult<InstanceUnit> {
    let result = wait_until(
        policy,
        sleeper,
        || orchestrator.get_unit(cluster, ip),
        InstanceUnit::is_running,
    )
    .await;

    match result {
        Ok(unit) => Ok(unit),
        Err(WaitError::Exhausted { last, attempts }) => Err(PlatformError::UnitNotReady {
            ip: ip.to_string(),
            phase: last
                .map(|u| u.phase.as_str().to_string())
                .unwrap_or_else(|| "missing".to_string()),
            attempts,
        }),
        Err(WaitError::Fetch(e)) => Err(e),
    }
}
