//! One reconciliation pass
//!
//! A [`Pass`] holds what the current pass has observed: the compute units
//! of the cluster and a fresh [`DBState`] per unit. Nothing in here
//! survives the pass; every decision is taken from these snapshots.

use super::context::ReconcileContext;
use super::errors::ReconcileResult;
use crate::instance::{DBState, InstanceController, Lsn};
use crate::model::{ClusterKey, ClusterSpec, ObservedStatus};
use crate::observability::ClusterEvent;
use crate::platform::{AuxiliaryKind, InstanceUnit};
use crate::replication::ReplicationParams;
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use tracing::{debug, warn};

pub(super) struct Pass<'a> {
    pub ctx: &'a ReconcileContext,
    pub spec: &'a ClusterSpec,
    pub previous: &'a ObservedStatus,
    pub controller: InstanceController,
    /// IP -> unit, for every unit labelled for the cluster.
    pub units: BTreeMap<String, InstanceUnit>,
    /// IP -> latest probe of the instance in that unit.
    pub states: BTreeMap<String, DBState>,
    /// Primary of record once resolved.
    pub primary: Option<String>,
}

impl<'a> Pass<'a> {
    pub fn new(ctx: &'a ReconcileContext, spec: &'a ClusterSpec, previous: &'a ObservedStatus) -> Self {
        Self {
            ctx,
            spec,
            previous,
            controller: ctx.controller(spec),
            units: BTreeMap::new(),
            states: BTreeMap::new(),
            primary: None,
        }
    }

    pub fn key(&self) -> &ClusterKey {
        &self.spec.key
    }

    pub fn event(&self, event: ClusterEvent, message: &str) {
        self.ctx.events.record(self.key(), event, message);
    }

    // =========================================================================
    // OBSERVATION
    // =========================================================================

    /// List units and probe every instance.
    pub async fn observe(&mut self) -> ReconcileResult<()> {
        let units = self.ctx.orchestrator.list_units(self.key()).await?;
        self.units = units.into_iter().map(|u| (u.ip.clone(), u)).collect();
        self.states.clear();

        let ips: Vec<String> = self.units.keys().cloned().collect();
        for ip in ips {
            self.refresh(&ip).await;
        }
        debug!(units = self.units.len(), "observed cluster");
        Ok(())
    }

    /// Re-probe one instance. Probe failures are recorded as an
    /// unreachable snapshot, not as an error.
    pub async fn refresh(&mut self, ip: &str) -> DBState {
        let state = match self.units.get(ip) {
            Some(unit) if unit.is_running() => match self.controller.state(ip).await {
                Ok(state) => state,
                Err(e) => {
                    warn!(ip, error = %e, "probe failed");
                    DBState::unreachable(e.to_string())
                }
            },
            Some(unit) => DBState::unreachable(format!("unit {}", unit.phase)),
            None => DBState::unreachable("no unit"),
        };
        self.states.insert(ip.to_string(), state.clone());
        state
    }

    /// Re-read units and re-probe every instance.
    pub async fn refresh_all(&mut self) -> ReconcileResult<()> {
        self.observe().await
    }

    pub fn state(&self, ip: &str) -> DBState {
        self.states.get(ip).cloned().unwrap_or_default()
    }

    // =========================================================================
    // TOPOLOGY VIEWS
    // =========================================================================

    pub fn desired_ips(&self) -> BTreeSet<String> {
        self.spec.topology.local_ips()
    }

    pub fn is_desired(&self, ip: &str) -> bool {
        self.spec.topology.contains_local(ip)
    }

    /// IPs of units whose instance channel is usable.
    pub fn running_ips(&self) -> Vec<String> {
        self.units
            .values()
            .filter(|u| u.is_running())
            .map(|u| u.ip.clone())
            .collect()
    }

    /// Units that are no longer part of the desired set.
    pub fn stale_ips(&self) -> Vec<String> {
        self.units
            .keys()
            .filter(|ip| !self.is_desired(ip))
            .cloned()
            .collect()
    }

    /// Desired IPs that have no unit at all.
    pub fn missing_ips(&self) -> Vec<String> {
        self.desired_ips()
            .into_iter()
            .filter(|ip| !self.units.contains_key(ip))
            .collect()
    }

    /// Instances currently accepting writes.
    pub fn primaries(&self) -> Vec<String> {
        self.states
            .iter()
            .filter(|(_, s)| s.acts_as_primary())
            .map(|(ip, _)| ip.clone())
            .collect()
    }

    /// The instance holds a complete copy of the data: a healthy primary
    /// or a healthy standby.
    pub fn is_built(&self, ip: &str) -> bool {
        let state = self.state(ip);
        state.is_primary_normal() || state.is_standby_normal()
    }

    // =========================================================================
    // REPLICATION POSITIONS
    // =========================================================================

    /// Replication position of `ip`. Stopped or unreadable instances
    /// count as position zero.
    pub async fn lsn(&self, ip: &str) -> Lsn {
        let owner = ip.parse::<Ipv4Addr>().unwrap_or(Ipv4Addr::UNSPECIFIED);
        let state = self.state(ip);
        if state.is_stopped() {
            return Lsn::zero(owner);
        }
        match self.controller.lsn(ip, &state).await {
            Ok(lsn) => lsn,
            Err(e) => {
                warn!(ip, error = %e, "cannot read replication position");
                Lsn::zero(owner)
            }
        }
    }

    /// The instance among `ips` with the largest replication position.
    pub async fn max_lsn(&self, ips: &[String]) -> Option<String> {
        let mut lsns = Vec::with_capacity(ips.len());
        for ip in ips {
            lsns.push(self.lsn(ip).await);
        }
        let best = Lsn::max_of(&lsns)?;
        debug!(candidates = ips.len(), winner = %best, "max replication position");
        Some(best.owner_ip())
    }

    // =========================================================================
    // CONFIGURATION
    // =========================================================================

    pub fn params(&self, ip: &str) -> ReplicationParams {
        ReplicationParams::for_instance(ip, self.spec)
    }

    /// The unit carries the digest of the current desired parameters.
    pub fn is_configured(&self, ip: &str) -> bool {
        let digest = self.params(ip).digest();
        self.units
            .get(ip)
            .and_then(|u| u.meta.config_digest.as_deref())
            == Some(digest.as_str())
    }

    /// Auxiliary resources that do not exist.
    pub async fn missing_auxiliary(&self) -> ReconcileResult<Vec<AuxiliaryKind>> {
        let mut missing = Vec::new();
        for kind in AuxiliaryKind::ALL {
            if !self.ctx.orchestrator.auxiliary_exists(self.key(), kind).await? {
                missing.push(kind);
            }
        }
        Ok(missing)
    }
}
