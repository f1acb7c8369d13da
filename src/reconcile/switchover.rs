//! Switchover and Cleanup
//!
//! A planned role exchange always restarts the outgoing primary first so
//! client sessions are cut before any data moves, then asks the target to
//! take over and waits for both sides. Cleanup uses it to move the
//! primary off an instance that is about to be deleted.

use super::errors::{ReconcileError, ReconcileResult};
use super::pass::Pass;
use crate::instance::{InstanceError, ShutdownMode};
use crate::observability::ClusterEvent;
use crate::replication::{SyncState, SyncStateTracker};
use tracing::{info, warn};

impl Pass<'_> {
    /// Hand the primary role from `from` to `to`.
    pub async fn switchover(&mut self, from: &str, to: &str) -> ReconcileResult<()> {
        info!(from, to, "switchover");
        let failed = |e: InstanceError| ReconcileError::SwitchoverFailed {
            from: from.to_string(),
            to: to.to_string(),
            detail: e.to_string(),
        };

        self.controller.restart(from, ShutdownMode::Fast).await.map_err(failed)?;
        self.controller.switchover(to).await.map_err(failed)?;

        let target = self
            .controller
            .wait_for(to, "primary after switchover", |s| s.is_primary_normal())
            .await
            .map_err(failed)?;
        let outgoing = self
            .controller
            .wait_for(from, "standby after switchover", |s| s.is_standby_normal())
            .await
            .map_err(failed)?;

        self.states.insert(to.to_string(), target);
        self.states.insert(from.to_string(), outgoing);
        self.primary = Some(to.to_string());
        self.event(ClusterEvent::Switchover, &format!("primary moved from {from} to {to}"));
        Ok(())
    }

    /// Data-complete standby that can take over from `outgoing`.
    ///
    /// Eligible: desired, streaming, configured with the current
    /// parameters, and synchronous according to the outgoing primary (or
    /// the last recorded sync set). Without synchronous replication every
    /// eligible standby qualifies. The one furthest ahead wins.
    pub async fn select_replacement(&self, outgoing: &str) -> Option<String> {
        let eligible: Vec<String> = self
            .running_ips()
            .into_iter()
            .filter(|ip| {
                ip != outgoing
                    && self.is_desired(ip)
                    && self.state(ip).is_standby_normal()
                    && self.is_configured(ip)
            })
            .collect();

        let live = self.live_sync_states(outgoing).await;
        let sync_configured = live.iter().any(SyncState::is_sync)
            || self.previous.sync_states.iter().any(SyncState::is_sync);

        let complete: Vec<String> = if sync_configured {
            eligible
                .into_iter()
                .filter(|ip| live.iter().any(|s| s.ip == *ip && s.is_sync()) || self.previous.in_sync_set(ip))
                .collect()
        } else {
            eligible
        };

        self.max_lsn(&complete).await
    }

    /// Sync states reported by `primary`; empty when it cannot be asked.
    pub async fn live_sync_states(&self, primary: &str) -> Vec<SyncState> {
        let tracker = SyncStateTracker::new(self.controller.clone(), self.ctx.sleeper.clone());
        match tracker.sync_states(primary).await {
            Ok(states) => states,
            Err(e) => {
                warn!(primary, error = %e, "cannot read sync states");
                Vec::new()
            }
        }
    }

    /// Delete every unit that left the desired set, moving the primary
    /// away first when it sits on one of them.
    pub async fn cleanup(&mut self) -> ReconcileResult<()> {
        for ip in self.stale_ips() {
            if self.primary.as_deref() == Some(ip.as_str()) {
                let target = self
                    .select_replacement(&ip)
                    .await
                    .ok_or_else(|| ReconcileError::NoSwitchoverCandidate { primary: ip.clone() })?;
                self.switchover(&ip, &target).await?;
            }

            self.ctx.orchestrator.delete_unit(self.key(), &ip).await?;
            self.units.remove(&ip);
            self.states.remove(&ip);
            self.event(ClusterEvent::Cleanup, &format!("{ip} removed from the cluster"));
            info!(ip = %ip, "stale instance removed");
        }
        Ok(())
    }
}
