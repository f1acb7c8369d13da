//! Standby Convergence and Replication Bootstrap
//!
//! Every desired non-primary instance is brought up as a standby. Those
//! that still do not stream afterwards are queued and rebuilt one at a
//! time by basebackup. Each rebuilt instance joins the built pool and may
//! serve as the source for the next one.

use super::errors::{ReconcileError, ReconcileResult};
use super::pass::Pass;
use crate::instance::InstanceError;
use crate::observability::ClusterEvent;
use crate::retry::RetryPolicy;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// Probes granted to a freshly started standby before it is rebuilt.
const CATCH_UP_ATTEMPTS: u32 = 3;

impl Pass<'_> {
    /// Start or notify every desired non-primary instance as a standby and
    /// return the instances that need a data copy.
    pub async fn converge_standbys(&mut self) -> ReconcileResult<VecDeque<String>> {
        let mut queue = VecDeque::new();

        if self.primary.is_none() && !self.spec.topology.is_standby_site() {
            debug!("no primary, standby convergence deferred");
            return Ok(queue);
        }

        let candidates: Vec<String> = self
            .running_ips()
            .into_iter()
            .filter(|ip| self.is_desired(ip) && self.primary.as_deref() != Some(ip.as_str()))
            .collect();

        for ip in candidates {
            let mut state = self.state(&ip);
            if state.is_building() {
                debug!(ip = %ip, "build in progress, left alone");
                continue;
            }
            if state.acts_as_primary() {
                continue;
            }

            if !state.is_standby() {
                match self.controller.demote_to_standby(&ip, &state).await {
                    Ok(started) => {
                        self.states.insert(ip.clone(), started.clone());
                        state = started;
                    }
                    Err(e) => {
                        warn!(ip = %ip, error = %e, "cannot start as standby, queued for rebuild");
                        queue.push_back(ip);
                        continue;
                    }
                }
            }

            // Replication may need a moment after a start.
            if !state.is_standby_normal() {
                let short = RetryPolicy::new(self.controller.policy().interval, CATCH_UP_ATTEMPTS);
                if let Ok(normal) = self
                    .controller
                    .with_policy(short)
                    .wait_for(&ip, "standby normal", |s| s.is_standby_normal())
                    .await
                {
                    self.states.insert(ip.clone(), normal);
                    continue;
                }
                info!(ip = %ip, state = %self.state(&ip), "standby not streaming, queued for rebuild");
                queue.push_back(ip);
            }
        }

        Ok(queue)
    }

    /// Rebuild every queued instance by basebackup.
    ///
    /// A failed build wipes the target's data so a later pass starts
    /// clean. Any other failure ends the pass and leaves the target as is.
    pub async fn bootstrap(&mut self, mut queue: VecDeque<String>) -> ReconcileResult<()> {
        while let Some(target) = queue.pop_front() {
            let source = self.bootstrap_source(&target, &queue).await?;
            info!(target = %target, source = %source, "basebackup");

            match self.controller.basebackup(&target, &source).await {
                Ok(state) => {
                    self.states.insert(target.clone(), state);
                    self.refresh(&target).await;
                    self.event(ClusterEvent::Basebackup, &format!("{target} rebuilt from {source}"));
                }
                Err(e @ InstanceError::BackupFailed { .. }) => {
                    warn!(target = %target, error = %e, "basebackup failed, wiping data");
                    self.controller.clean_data(&target).await?;
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Pick the copy source for `target`: the single built instance, the
    /// built instance furthest ahead, or on a standby site without any
    /// built instance the first remote IP.
    pub async fn bootstrap_source(&self, target: &str, pending: &VecDeque<String>) -> ReconcileResult<String> {
        let built: Vec<String> = self
            .running_ips()
            .into_iter()
            .filter(|ip| ip != target && !pending.contains(ip) && self.is_built(ip))
            .collect();

        let source = match built.len() {
            0 if self.spec.topology.is_standby_site() => self.spec.topology.remote_ips.first().cloned(),
            0 => None,
            1 => built.first().cloned(),
            _ => self.max_lsn(&built).await,
        };

        source.ok_or_else(|| ReconcileError::NoBootstrapSource {
            target: target.to_string(),
        })
    }
}
