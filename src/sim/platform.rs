//! Simulated Platform
//!
//! One in-memory world implementing every collaborator the reconciler
//! talks to: [`Orchestrator`], [`InstanceChannel`], [`ClusterStatusStore`]
//! and [`SpecSource`]. Every mutating call is appended to a journal so
//! tests can assert on exactly what a pass did.
//!
//! Replication is modelled coarsely. A standby streams when it has data
//! and its upstream is up: a live primary of the same cluster on a primary
//! site, the remote site on a standby site. Streaming standbys that are not
//! lagging follow their upstream's position after every command.

use super::instance::{format_lsn, SimInstance, SimRole};
use crate::instance::{
    statements, DBState, InstanceChannel, InstanceCommand, InstanceError, InstanceResult, NotifyRole, StartMode, TaskStatus,
};
use crate::model::{ClusterKey, ClusterSpec, ClusterState, ObservedStatus, SpecValidator};
use crate::observability::EventRecorder;
use crate::platform::{
    AuxiliaryKind, ClusterStatusStore, InstanceMeta, InstanceUnit, Orchestrator, PlatformError, PlatformResult,
    SpecSource, UnitPhase, UnitTemplate, VersionedStatus,
};
use crate::reconcile::ReconcileContext;
use crate::replication::{SyncMode, SyncStandbyNames, SyncState, MOST_AVAILABLE_PARAMETER, SYNC_NAMES_PARAMETER};
use crate::retry::{RetryPolicy, Sleeper};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Replication position reported by a lagging standby.
const LAGGING_PERCENT: u8 = 80;

/// Position jump applied by a successful restore.
const RESTORE_LSN_STEP: u64 = 0x100_0000;

/// The remote primary site a standby site replicates from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSite {
    pub up: bool,
    pub lsn: u64,
}

/// One journalled mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum SimCall {
    Exec { ip: String, command: &'static str },
    DeleteUnit { ip: String },
    RecreateUnit { ip: String },
    SetMeta { ip: String },
    EnsureAuxiliary { kind: AuxiliaryKind },
    PutStatus { state: ClusterState },
}

impl fmt::Display for SimCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimCall::Exec { ip, command } => write!(f, "exec {ip} {command}"),
            SimCall::DeleteUnit { ip } => write!(f, "delete unit {ip}"),
            SimCall::RecreateUnit { ip } => write!(f, "recreate unit {ip}"),
            SimCall::SetMeta { ip } => write!(f, "set meta {ip}"),
            SimCall::EnsureAuxiliary { kind } => write!(f, "ensure {kind}"),
            SimCall::PutStatus { state } => write!(f, "put status {state}"),
        }
    }
}

struct SimUnit {
    cluster: ClusterKey,
    unit: InstanceUnit,
}

#[derive(Default)]
struct SimState {
    units: BTreeMap<String, SimUnit>,
    instances: BTreeMap<String, SimInstance>,
    statuses: BTreeMap<ClusterKey, VersionedStatus>,
    specs: BTreeMap<ClusterKey, ClusterSpec>,
    auxiliary: BTreeSet<(ClusterKey, AuxiliaryKind)>,
    remote: RemoteSite,
    status_conflicts: u32,
    journal: Vec<SimCall>,
}

impl SimState {
    fn cluster_of(&self, ip: &str) -> Option<&ClusterKey> {
        self.units.get(ip).map(|u| &u.cluster)
    }

    fn is_standby_site(&self, cluster: &ClusterKey) -> bool {
        self.specs
            .get(cluster)
            .is_some_and(|s| s.topology.is_standby_site())
    }

    fn unit_running(&self, ip: &str) -> bool {
        self.units.get(ip).is_some_and(|u| u.unit.is_running())
    }

    /// Live primary of `cluster` other than `except`.
    fn primary_of(&self, cluster: &ClusterKey, except: &str) -> Option<String> {
        self.units
            .iter()
            .filter(|(ip, u)| ip.as_str() != except && u.cluster == *cluster && u.unit.is_running())
            .find(|(ip, _)| self.instances.get(*ip).is_some_and(SimInstance::is_live_primary))
            .map(|(ip, _)| ip.clone())
    }

    /// Position of the upstream `ip` would stream from, if it is up.
    fn upstream_lsn(&self, ip: &str) -> Option<u64> {
        let cluster = self.cluster_of(ip)?;
        if self.is_standby_site(cluster) {
            return self.remote.up.then_some(self.remote.lsn);
        }
        let primary = self.primary_of(cluster, ip)?;
        self.instances.get(&primary).map(|i| i.lsn)
    }

    fn streaming(&self, ip: &str) -> bool {
        self.unit_running(ip)
            && self
                .instances
                .get(ip)
                .is_some_and(|i| i.is_streaming(self.upstream_lsn(ip).is_some()))
    }

    /// Let streaming standbys catch up with their upstream.
    fn settle(&mut self) {
        let updates: Vec<(String, u64)> = self
            .instances
            .iter()
            .filter(|(ip, i)| !i.lagging && self.streaming(ip))
            .filter_map(|(ip, _)| self.upstream_lsn(ip).map(|lsn| (ip.clone(), lsn)))
            .collect();
        for (ip, lsn) in updates {
            if let Some(instance) = self.instances.get_mut(&ip) {
                instance.lsn = instance.lsn.max(lsn);
            }
        }
    }

    fn reachable(&self, ip: &str) -> InstanceResult<&SimInstance> {
        if !self.unit_running(ip) {
            return Err(InstanceError::channel(ip, "unit not running"));
        }
        self.instances
            .get(ip)
            .ok_or_else(|| InstanceError::channel(ip, "no instance"))
    }

    fn instance_mut(&mut self, ip: &str) -> InstanceResult<&mut SimInstance> {
        self.instances
            .get_mut(ip)
            .ok_or_else(|| InstanceError::channel(ip, "no instance"))
    }

    fn unit_mut(&mut self, ip: &str) -> PlatformResult<&mut SimUnit> {
        self.units.get_mut(ip).ok_or_else(|| PlatformError::NotFound {
            kind: "unit",
            name: ip.to_string(),
        })
    }

    // =========================================================================
    // INSTANCE BEHAVIOUR
    // =========================================================================

    fn probe(&self, ip: &str) -> InstanceResult<String> {
        let instance = self.reachable(ip)?;
        let state = instance.db_state(self.upstream_lsn(ip).is_some());
        serde_json::to_string(&state).map_err(|e| InstanceError::channel(ip, e.to_string()))
    }

    fn exec(&mut self, ip: &str, command: &InstanceCommand) -> InstanceResult<()> {
        self.reachable(ip)?;
        self.apply(ip, command)?;
        self.journal.push(SimCall::Exec {
            ip: ip.to_string(),
            command: command.name(),
        });
        self.settle();
        Ok(())
    }

    fn apply(&mut self, ip: &str, command: &InstanceCommand) -> InstanceResult<()> {
        match command {
            InstanceCommand::Start { mode } => {
                let instance = self.instance_mut(ip)?;
                if instance.fail_start {
                    return Ok(());
                }
                instance.role = match mode {
                    StartMode::Primary => {
                        instance.has_data = true;
                        SimRole::Primary
                    }
                    StartMode::Standby => SimRole::Standby,
                    StartMode::Pending => SimRole::Pending,
                };
            }
            InstanceCommand::Notify { role } => {
                let instance = self.instance_mut(ip)?;
                if instance.role != SimRole::Pending {
                    return Err(InstanceError::channel(ip, "notify requires a pending instance"));
                }
                instance.role = match role {
                    NotifyRole::Primary => {
                        instance.has_data = true;
                        SimRole::Primary
                    }
                    NotifyRole::Standby => SimRole::Standby,
                };
            }
            InstanceCommand::Restart { .. } => {
                if !self.instance_mut(ip)?.is_running() {
                    return Err(InstanceError::channel(ip, "restart requires a running instance"));
                }
            }
            InstanceCommand::Stop { .. } => self.instance_mut(ip)?.role = SimRole::Stopped,
            InstanceCommand::Basebackup { source_host, .. } => {
                let source_lsn = self.backup_source_lsn(ip, source_host)?;
                let instance = self.instance_mut(ip)?;
                if instance.fail_backup {
                    instance.build = TaskStatus::Failed;
                    instance.role = SimRole::Stopped;
                } else if instance.stall_backup {
                    instance.build = TaskStatus::InProgress;
                    instance.role = SimRole::Stopped;
                } else {
                    instance.has_data = true;
                    instance.lsn = source_lsn;
                    instance.build = TaskStatus::Complete;
                    instance.role = SimRole::Standby;
                }
            }
            InstanceCommand::Switchover => self.switchover(ip)?,
            InstanceCommand::SetParameters { parameters } => {
                let instance = self.instance_mut(ip)?;
                instance
                    .params
                    .extend(parameters.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            InstanceCommand::Reload => {}
            InstanceCommand::Restore { .. } => {
                let instance = self.instance_mut(ip)?;
                if instance.fail_restore {
                    instance.restore = TaskStatus::Failed;
                } else {
                    instance.restore = TaskStatus::Complete;
                    instance.has_data = true;
                    instance.lsn += RESTORE_LSN_STEP;
                }
            }
            InstanceCommand::SetMaintenance { enabled } => self.instance_mut(ip)?.maintenance = *enabled,
            InstanceCommand::CleanData => {
                let instance = self.instance_mut(ip)?;
                instance.has_data = false;
                instance.lsn = 0;
                instance.build = TaskStatus::None;
                instance.role = SimRole::Stopped;
            }
        }
        Ok(())
    }

    fn backup_source_lsn(&self, target: &str, source: &str) -> InstanceResult<u64> {
        if let Some(instance) = self.instances.get(source) {
            if self.unit_running(source) && instance.is_running() && instance.has_data {
                return Ok(instance.lsn);
            }
            return Err(InstanceError::channel(target, format!("source {source} has no usable data")));
        }

        let remote = self
            .cluster_of(target)
            .and_then(|c| self.specs.get(c))
            .is_some_and(|s| s.topology.remote_ips.iter().any(|r| r == source));
        if remote && self.remote.up {
            return Ok(self.remote.lsn);
        }
        Err(InstanceError::channel(target, format!("source {source} unreachable")))
    }

    fn switchover(&mut self, ip: &str) -> InstanceResult<()> {
        if !self.streaming(ip) {
            return Err(InstanceError::channel(ip, "switchover target is not a streaming standby"));
        }
        let cluster = self
            .cluster_of(ip)
            .cloned()
            .ok_or_else(|| InstanceError::channel(ip, "no unit"))?;
        let primary = self
            .primary_of(&cluster, ip)
            .ok_or_else(|| InstanceError::channel(ip, "no primary to switch over from"))?;

        let primary_lsn = self.instance_mut(&primary)?.lsn;
        self.instance_mut(&primary)?.role = SimRole::Standby;
        let target = self.instance_mut(ip)?;
        target.role = SimRole::Primary;
        target.lsn = target.lsn.max(primary_lsn);
        Ok(())
    }

    fn query(&self, ip: &str, statement: &str) -> InstanceResult<String> {
        let instance = self.reachable(ip)?;
        if !instance.is_running() || instance.hang {
            return Err(InstanceError::channel(ip, "connection refused"));
        }

        match statement {
            statements::CURRENT_LSN | statements::REPLAY_LSN => Ok(format_lsn(instance.lsn)),
            statements::SYNC_STATES => Ok(self.sync_rows(ip, instance)),
            statements::SHOW_MOST_AVAILABLE => Ok(instance
                .params
                .get(MOST_AVAILABLE_PARAMETER)
                .cloned()
                .unwrap_or_else(|| "off".to_string())),
            other => Err(InstanceError::channel(ip, format!("unsupported statement {other:?}"))),
        }
    }

    /// Sync state rows as the primary at `ip` would report them: the
    /// first `count` listed standbys that stream without lag are
    /// synchronous, other listed ones potential, unlisted ones async.
    fn sync_rows(&self, ip: &str, primary: &SimInstance) -> String {
        if primary.role != SimRole::Primary {
            return String::new();
        }
        let Some(cluster) = self.cluster_of(ip) else {
            return String::new();
        };
        let selection: SyncStandbyNames = primary
            .params
            .get(SYNC_NAMES_PARAMETER)
            .and_then(|names| names.parse().ok())
            .unwrap_or_default();

        let connected: Vec<&String> = self
            .units
            .iter()
            .filter(|(peer, u)| peer.as_str() != ip && u.cluster == *cluster && self.streaming(peer))
            .map(|(peer, _)| peer)
            .collect();

        let mut rows = Vec::new();
        let mut granted = 0;
        for (position, name) in selection.names.iter().enumerate() {
            if !connected.contains(&name) {
                continue;
            }
            let lagging = self.instances.get(name).is_some_and(|i| i.lagging);
            let state = if !lagging && granted < selection.count {
                granted += 1;
                SyncMode::Sync
            } else {
                SyncMode::Potential
            };
            rows.push(SyncState {
                ip: name.clone(),
                percent_caught: if lagging { LAGGING_PERCENT } else { 100 },
                state,
                priority: u32::try_from(position + 1).unwrap_or(u32::MAX),
            });
        }
        for peer in connected.into_iter().filter(|p| !selection.names.contains(*p)) {
            rows.push(SyncState {
                ip: peer.clone(),
                percent_caught: 100,
                state: SyncMode::Async,
                priority: 0,
            });
        }

        rows.iter().map(SyncState::to_row).collect::<Vec<_>>().join("\n")
    }

    // =========================================================================
    // STATUS STORE
    // =========================================================================

    fn put_status(
        &mut self,
        cluster: &ClusterKey,
        status: &ObservedStatus,
        expected: Option<u64>,
    ) -> PlatformResult<u64> {
        let current = self.statuses.get(cluster).map(|v| v.version);

        if self.status_conflicts > 0 {
            self.status_conflicts -= 1;
            let actual = current.unwrap_or(0) + 1;
            if let Some(stored) = self.statuses.get_mut(cluster) {
                stored.version = actual;
            }
            return Err(PlatformError::Conflict {
                name: cluster.to_string(),
                expected,
                actual,
            });
        }

        if current != expected {
            return Err(PlatformError::Conflict {
                name: cluster.to_string(),
                expected,
                actual: current.unwrap_or(0),
            });
        }

        let version = current.unwrap_or(0) + 1;
        self.statuses.insert(
            cluster.clone(),
            VersionedStatus {
                version,
                status: status.clone(),
            },
        );
        self.journal.push(SimCall::PutStatus { state: status.state });
        Ok(version)
    }
}

/// Shared handle to one simulated world.
#[derive(Clone, Default)]
pub struct SimPlatform {
    state: Arc<Mutex<SimState>>,
}

impl SimPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> R {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    // =========================================================================
    // SEEDING
    // =========================================================================

    /// Register `spec` and create a running unit per listed instance
    /// together with all auxiliary resources.
    pub fn seed_cluster(&self, spec: &ClusterSpec, instances: Vec<(&str, SimInstance)>) {
        let template = UnitTemplate::for_spec(spec);
        for (ip, instance) in instances {
            self.add_unit(&spec.key, ip, template.clone(), instance);
        }
        self.with_state(|s| {
            s.specs.insert(spec.key.clone(), spec.clone());
            for kind in AuxiliaryKind::ALL {
                s.auxiliary.insert((spec.key.clone(), kind));
            }
            s.settle();
        });
    }

    /// Add one running unit built from `template`.
    pub fn add_unit(&self, cluster: &ClusterKey, ip: &str, template: UnitTemplate, instance: SimInstance) {
        self.with_state(|s| {
            s.units.insert(
                ip.to_string(),
                SimUnit {
                    cluster: cluster.clone(),
                    unit: running_unit(ip, template),
                },
            );
            s.instances.insert(ip.to_string(), instance);
            s.settle();
        });
    }

    /// Replace the spec served by [`SpecSource::list_specs`].
    pub fn set_spec(&self, spec: &ClusterSpec) {
        self.with_state(|s| {
            s.specs.insert(spec.key.clone(), spec.clone());
        });
    }

    pub fn seed_status(&self, cluster: &ClusterKey, status: ObservedStatus) {
        self.with_state(|s| {
            let version = s.statuses.get(cluster).map_or(1, |v| v.version + 1);
            s.statuses.insert(cluster.clone(), VersionedStatus { version, status });
        });
    }

    pub fn set_remote(&self, remote: RemoteSite) {
        self.with_state(|s| {
            s.remote = remote;
            s.settle();
        });
    }

    /// Fail the next `count` status writes with a conflict, as if another
    /// writer got in first each time.
    pub fn inject_status_conflicts(&self, count: u32) {
        self.with_state(|s| s.status_conflicts = count);
    }

    pub fn remove_auxiliary(&self, cluster: &ClusterKey, kind: AuxiliaryKind) {
        self.with_state(|s| {
            s.auxiliary.remove(&(cluster.clone(), kind));
        });
    }

    // =========================================================================
    // INSPECTION AND FAULTS
    // =========================================================================

    pub fn instance(&self, ip: &str) -> Option<SimInstance> {
        self.with_state(|s| s.instances.get(ip).cloned())
    }

    /// Mutate one instance in place. Returns false if it does not exist.
    pub fn update_instance(&self, ip: &str, f: impl FnOnce(&mut SimInstance)) -> bool {
        self.with_state(|s| {
            let found = s.instances.get_mut(ip).map(f).is_some();
            s.settle();
            found
        })
    }

    pub fn unit(&self, ip: &str) -> Option<InstanceUnit> {
        self.with_state(|s| s.units.get(ip).map(|u| u.unit.clone()))
    }

    /// Mutate one unit in place. Returns false if it does not exist.
    pub fn update_unit(&self, ip: &str, f: impl FnOnce(&mut InstanceUnit)) -> bool {
        self.with_state(|s| s.units.get_mut(ip).map(|u| f(&mut u.unit)).is_some())
    }

    /// Probe result the reconciler would see for `ip`.
    pub fn db_state(&self, ip: &str) -> Option<DBState> {
        self.with_state(|s| {
            let upstream_up = s.upstream_lsn(ip).is_some();
            s.instances.get(ip).map(|i| i.db_state(upstream_up))
        })
    }

    pub fn status(&self, cluster: &ClusterKey) -> Option<ObservedStatus> {
        self.with_state(|s| s.statuses.get(cluster).map(|v| v.status.clone()))
    }

    pub fn status_version(&self, cluster: &ClusterKey) -> Option<u64> {
        self.with_state(|s| s.statuses.get(cluster).map(|v| v.version))
    }

    pub fn auxiliary(&self, cluster: &ClusterKey) -> Vec<AuxiliaryKind> {
        self.with_state(|s| {
            s.auxiliary
                .iter()
                .filter(|(c, _)| c == cluster)
                .map(|(_, kind)| *kind)
                .collect()
        })
    }

    pub fn journal(&self) -> Vec<SimCall> {
        self.with_state(|s| s.journal.clone())
    }

    pub fn clear_journal(&self) {
        self.with_state(|s| s.journal.clear());
    }

    /// Instance commands in the journal as `(ip, command)` pairs.
    pub fn commands(&self) -> Vec<(String, &'static str)> {
        self.journal()
            .into_iter()
            .filter_map(|call| match call {
                SimCall::Exec { ip, command } => Some((ip, command)),
                _ => None,
            })
            .collect()
    }

    /// Reconciler context wired to this world.
    ///
    /// Instance waits poll every second for at most five attempts; with a
    /// virtual sleeper that costs no real time.
    pub fn context(
        &self,
        validator: SpecValidator,
        events: Arc<dyn EventRecorder>,
        sleeper: Arc<dyn Sleeper>,
    ) -> ReconcileContext {
        let platform = Arc::new(self.clone());
        ReconcileContext {
            orchestrator: platform.clone(),
            channel: platform.clone(),
            store: platform,
            events,
            sleeper,
            validator,
            instance_retry: RetryPolicy::new(Duration::from_secs(1), 5),
            status_retry: RetryPolicy::status_default(),
            verify_status_writes: true,
        }
    }
}

fn running_unit(ip: &str, template: UnitTemplate) -> InstanceUnit {
    InstanceUnit {
        name: format!("unit-{}", ip.replace('.', "-")),
        ip: ip.to_string(),
        phase: UnitPhase::Running,
        reachable: true,
        template,
        legacy_layout: false,
        meta: InstanceMeta::default(),
    }
}

#[async_trait]
impl Orchestrator for SimPlatform {
    async fn list_units(&self, cluster: &ClusterKey) -> PlatformResult<Vec<InstanceUnit>> {
        Ok(self.with_state(|s| {
            s.units
                .values()
                .filter(|u| u.cluster == *cluster)
                .map(|u| u.unit.clone())
                .collect()
        }))
    }

    async fn get_unit(&self, cluster: &ClusterKey, ip: &str) -> PlatformResult<InstanceUnit> {
        self.with_state(|s| {
            s.units
                .get(ip)
                .filter(|u| u.cluster == *cluster)
                .map(|u| u.unit.clone())
                .ok_or_else(|| PlatformError::NotFound {
                    kind: "unit",
                    name: ip.to_string(),
                })
        })
    }

    async fn delete_unit(&self, _cluster: &ClusterKey, ip: &str) -> PlatformResult<()> {
        self.with_state(|s| {
            s.unit_mut(ip)?;
            s.units.remove(ip);
            s.instances.remove(ip);
            s.journal.push(SimCall::DeleteUnit { ip: ip.to_string() });
            s.settle();
            Ok(())
        })
    }

    async fn recreate_unit(&self, cluster: &ClusterKey, ip: &str, template: &UnitTemplate) -> PlatformResult<()> {
        self.with_state(|s| {
            s.units.insert(
                ip.to_string(),
                SimUnit {
                    cluster: cluster.clone(),
                    unit: running_unit(ip, template.clone()),
                },
            );
            // Storage survives the unit; the process does not.
            let instance = s.instances.entry(ip.to_string()).or_default();
            instance.role = SimRole::Stopped;
            instance.maintenance = false;
            instance.hang = false;
            instance.build = TaskStatus::None;
            instance.restore = TaskStatus::None;
            s.journal.push(SimCall::RecreateUnit { ip: ip.to_string() });
            s.settle();
            Ok(())
        })
    }

    async fn set_meta(&self, _cluster: &ClusterKey, ip: &str, meta: &InstanceMeta) -> PlatformResult<()> {
        self.with_state(|s| {
            s.unit_mut(ip)?.unit.meta = meta.clone();
            s.journal.push(SimCall::SetMeta { ip: ip.to_string() });
            Ok(())
        })
    }

    async fn auxiliary_exists(&self, cluster: &ClusterKey, kind: AuxiliaryKind) -> PlatformResult<bool> {
        Ok(self.with_state(|s| s.auxiliary.contains(&(cluster.clone(), kind))))
    }

    async fn ensure_auxiliary(&self, spec: &ClusterSpec, kind: AuxiliaryKind) -> PlatformResult<()> {
        self.with_state(|s| {
            s.auxiliary.insert((spec.key.clone(), kind));
            s.journal.push(SimCall::EnsureAuxiliary { kind });
        });
        Ok(())
    }
}

#[async_trait]
impl InstanceChannel for SimPlatform {
    async fn probe(&self, ip: &str) -> InstanceResult<String> {
        self.with_state(|s| s.probe(ip))
    }

    async fn exec(&self, ip: &str, command: &InstanceCommand) -> InstanceResult<()> {
        self.with_state(|s| s.exec(ip, command))
    }

    async fn query(&self, ip: &str, statement: &str) -> InstanceResult<String> {
        self.with_state(|s| s.query(ip, statement))
    }
}

#[async_trait]
impl ClusterStatusStore for SimPlatform {
    async fn get_status(&self, cluster: &ClusterKey) -> PlatformResult<Option<VersionedStatus>> {
        Ok(self.with_state(|s| s.statuses.get(cluster).cloned()))
    }

    async fn put_status(
        &self,
        cluster: &ClusterKey,
        status: &ObservedStatus,
        expected: Option<u64>,
    ) -> PlatformResult<u64> {
        self.with_state(|s| s.put_status(cluster, status, expected))
    }
}

#[async_trait]
impl SpecSource for SimPlatform {
    async fn list_specs(&self) -> PlatformResult<Vec<ClusterSpec>> {
        Ok(self.with_state(|s| s.specs.values().cloned().collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::ShutdownMode;
    use crate::replication::parse_sync_states;

    fn key() -> ClusterKey {
        ClusterKey::new("db", "sim")
    }

    fn world() -> SimPlatform {
        let spec = ClusterSpec::new(key(), &["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
        let sim = SimPlatform::new();
        sim.seed_cluster(
            &spec,
            vec![
                ("10.0.0.1", SimInstance::primary(100)),
                ("10.0.0.2", SimInstance::standby(50)),
                ("10.0.0.3", SimInstance::standby(50)),
            ],
        );
        sim
    }

    #[tokio::test]
    async fn test_streaming_standbys_follow_primary() {
        let sim = world();
        assert_eq!(sim.instance("10.0.0.2").unwrap().lsn, 100);
        assert!(sim.db_state("10.0.0.2").unwrap().is_standby_normal());

        sim.exec("10.0.0.1", &InstanceCommand::Stop { mode: ShutdownMode::Fast })
            .await
            .unwrap();
        assert!(!sim.db_state("10.0.0.2").unwrap().is_standby_normal());
    }

    #[tokio::test]
    async fn test_switchover_swaps_roles() {
        let sim = world();
        sim.exec("10.0.0.3", &InstanceCommand::Switchover).await.unwrap();

        assert_eq!(sim.instance("10.0.0.3").unwrap().role, SimRole::Primary);
        assert_eq!(sim.instance("10.0.0.1").unwrap().role, SimRole::Standby);
        assert!(sim.db_state("10.0.0.1").unwrap().is_standby_normal());
    }

    #[tokio::test]
    async fn test_sync_rows_follow_selection() {
        let sim = world();
        let parameters = BTreeMap::from([(
            SYNC_NAMES_PARAMETER.to_string(),
            "FIRST 1 (\"10.0.0.2\",\"10.0.0.3\")".to_string(),
        )]);
        sim.exec("10.0.0.1", &InstanceCommand::SetParameters { parameters })
            .await
            .unwrap();

        let output = sim.query("10.0.0.1", statements::SYNC_STATES).await.unwrap();
        let states = parse_sync_states("10.0.0.1", &output).unwrap();
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].ip, "10.0.0.2");
        assert!(states[0].is_sync());
        assert_eq!(states[1].state, SyncMode::Potential);

        sim.update_instance("10.0.0.2", |i| i.lagging = true);
        let output = sim.query("10.0.0.1", statements::SYNC_STATES).await.unwrap();
        let states = parse_sync_states("10.0.0.1", &output).unwrap();
        assert!(states.iter().find(|s| s.ip == "10.0.0.3").unwrap().is_sync());
    }

    #[tokio::test]
    async fn test_failed_basebackup_reports_build_failure() {
        let sim = world();
        sim.update_instance("10.0.0.3", |i| i.fail_backup = true);
        sim.exec(
            "10.0.0.3",
            &InstanceCommand::Basebackup {
                source_host: "10.0.0.1".into(),
                source_port: 5433,
            },
        )
        .await
        .unwrap();
        assert_eq!(sim.db_state("10.0.0.3").unwrap().build_status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn test_status_conflict_injection() {
        let sim = world();
        let status = ObservedStatus::default();
        assert_eq!(sim.put_status(&key(), &status, None).await.unwrap(), 1);

        sim.inject_status_conflicts(1);
        let err = sim.put_status(&key(), &status, Some(1)).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(sim.status_version(&key()), Some(2));
        assert_eq!(sim.put_status(&key(), &status, Some(2)).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_recreate_keeps_data() {
        let sim = world();
        let template = sim.unit("10.0.0.2").unwrap().template;
        sim.recreate_unit(&key(), "10.0.0.2", &template).await.unwrap();

        let instance = sim.instance("10.0.0.2").unwrap();
        assert_eq!(instance.role, SimRole::Stopped);
        assert!(instance.has_data);
        assert_eq!(sim.journal(), vec![SimCall::RecreateUnit { ip: "10.0.0.2".into() }]);
    }
}
