//! Primary Resolution
//!
//! Runs once per pass against the live instance set:
//!
//! | primaries | site    | action                                   |
//! |-----------|---------|------------------------------------------|
//! | 0         | standby | none, standby sites never self-elect     |
//! | 0         | primary | no-primary repair                        |
//! | 1         | primary | accept                                   |
//! | 1+        | standby | demote every primary to standby          |
//! | 2+        | primary | keep one, demote the others to pending   |
//!
//! A promotion candidate must be data-complete: the last recorded
//! primary, a member of the last recorded sync set, or any instance when
//! no primary was ever recorded. The election picks the standby furthest
//! ahead and checks it afterwards: a lagging sync standby is never
//! preferred over one holding more WAL. A candidate that fails the check
//! fails the cluster instead of risking committed transactions.

use super::errors::{ReconcileError, ReconcileResult};
use super::pass::Pass;
use crate::observability::ClusterEvent;
use tracing::{info, warn};

impl Pass<'_> {
    /// Settle on at most one primary. `failed_before` blocks automated
    /// promotion for clusters that already failed a data-integrity check.
    pub async fn resolve_primary(&mut self, failed_before: bool) -> ReconcileResult<Option<String>> {
        let primaries = self.primaries();
        let standby_site = self.spec.topology.is_standby_site();

        let primary = match (primaries.len(), standby_site) {
            (0, true) => None,
            (0, false) => {
                if failed_before {
                    return Err(ReconcileError::ManualInterventionRequired);
                }
                self.repair_no_primary().await?
            }
            (1, false) => {
                let primary = primaries[0].clone();
                if self.previous.primary() != Some(primary.as_str()) {
                    info!(primary = %primary, previous = ?self.previous.primary(), "accepting primary");
                }
                Some(primary)
            }
            (_, true) => {
                self.demote_all_to_standby(&primaries).await?;
                None
            }
            (_, false) => Some(self.repair_multi_primary(&primaries).await?),
        };

        self.primary = primary.clone();
        Ok(primary)
    }

    /// Candidate may be promoted without losing committed data.
    pub fn is_data_complete(&self, ip: &str) -> bool {
        match self.previous.primary() {
            None => true,
            Some(previous) => previous == ip || self.previous.in_sync_set(ip),
        }
    }

    async fn repair_no_primary(&mut self) -> ReconcileResult<Option<String>> {
        let running = self.running_ips();
        let (standbys, others): (Vec<String>, Vec<String>) =
            running.into_iter().partition(|ip| self.state(ip).is_standby());

        let mut pool = standbys;
        for ip in others {
            let state = self.state(&ip);
            if state.is_building() {
                continue;
            }
            match self.controller.demote_to_standby(&ip, &state).await {
                Ok(state) => {
                    self.states.insert(ip.clone(), state);
                    pool.push(ip);
                }
                Err(e) => warn!(ip = %ip, error = %e, "cannot start as standby, skipped for election"),
            }
        }

        let candidate = if pool.is_empty() {
            // Total primary loss with no standby at all: fall back to the
            // first instance in listing order.
            let fallback = self
                .running_ips()
                .into_iter()
                .find(|ip| !self.state(ip).is_building());
            if let Some(ip) = &fallback {
                warn!(ip = %ip, "no standby available, electing first instance in listing order");
            }
            fallback
        } else {
            pool.sort();
            self.max_lsn(&pool).await
        };

        let Some(candidate) = candidate else {
            warn!("no instance available for election");
            return Ok(None);
        };

        if !self.is_data_complete(&candidate) {
            let previous = self.previous.primary.clone();
            return Err(ReconcileError::DataIntegrity { candidate, previous });
        }

        let current = self.state(&candidate);
        let state = self.controller.promote(&candidate, &current).await?;
        self.states.insert(candidate.clone(), state);
        self.event(ClusterEvent::Promote, &format!("{candidate} promoted to primary"));
        info!(primary = %candidate, "no-primary repair elected new primary");
        Ok(Some(candidate))
    }

    async fn repair_multi_primary(&mut self, primaries: &[String]) -> ReconcileResult<String> {
        let keep = match self.previous.primary() {
            Some(previous) if primaries.iter().any(|p| p == previous) => previous.to_string(),
            _ => match self.max_lsn(primaries).await {
                Some(ip) => ip,
                None => primaries[0].clone(),
            },
        };
        warn!(primaries = ?primaries, keep = %keep, "multiple primaries, demoting the others");

        for ip in primaries.iter().filter(|ip| **ip != keep) {
            let state = self.controller.demote_to_pending(ip).await?;
            self.states.insert(ip.clone(), state);
            self.event(ClusterEvent::Demote, &format!("{ip} demoted to pending, {keep} stays primary"));
        }
        Ok(keep)
    }

    async fn demote_all_to_standby(&mut self, primaries: &[String]) -> ReconcileResult<()> {
        warn!(primaries = ?primaries, "primary found on standby site");
        for ip in primaries {
            let current = self.state(ip);
            let state = self.controller.demote_to_standby(ip, &current).await?;
            self.states.insert(ip.clone(), state);
            self.event(ClusterEvent::Demote, &format!("{ip} demoted to standby on standby site"));
        }
        Ok(())
    }
}
