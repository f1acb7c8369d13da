//! Rolling Upgrade
//!
//! Units whose template (image, resources) no longer matches the spec, or
//! which still carry an old resource layout, are recreated one by one.
//! Standbys go first. The primary is only rebuilt after it has handed its
//! role to a standby; without a standby it is rebuilt in place and
//! restarted as primary.

use super::errors::ReconcileResult;
use super::pass::Pass;
use crate::observability::ClusterEvent;
use crate::platform::{wait_unit_running, UnitTemplate};
use std::collections::VecDeque;
use tracing::{info, warn};

impl Pass<'_> {
    pub async fn rolling_upgrade(&mut self) -> ReconcileResult<()> {
        let outdated: Vec<String> = self
            .units
            .values()
            .filter(|u| self.is_desired(&u.ip) && u.needs_upgrade(self.spec))
            .map(|u| u.ip.clone())
            .collect();
        if outdated.is_empty() {
            return Ok(());
        }
        info!(units = ?outdated, "rolling upgrade");

        let primary = self.primary.clone();
        for ip in outdated.iter().filter(|ip| primary.as_deref() != Some(ip.as_str())) {
            self.rebuild_as_standby(ip).await?;
        }

        let Some(primary) = primary.filter(|p| outdated.contains(p)) else {
            return Ok(());
        };

        match self.select_replacement(&primary).await {
            Some(target) => {
                self.switchover(&primary, &target).await?;
                self.rebuild_as_standby(&primary).await?;
            }
            None => {
                warn!(primary = %primary, "no standby to take over, upgrading primary in place");
                self.recreate(&primary).await?;
                let state = self.controller.start_primary(&primary).await?;
                self.states.insert(primary.clone(), state);
                self.configure(&primary).await?;
                self.event(ClusterEvent::Upgrade, &format!("{primary} upgraded in place"));
            }
        }
        Ok(())
    }

    async fn rebuild_as_standby(&mut self, ip: &str) -> ReconcileResult<()> {
        self.recreate(ip).await?;

        let started = match self.controller.start_standby(ip).await {
            Ok(state) => state,
            Err(e) => {
                warn!(ip, error = %e, "upgraded unit did not start as standby");
                self.refresh(ip).await
            }
        };
        self.states.insert(ip.to_string(), started.clone());

        if !started.is_standby_normal() {
            let source = self.bootstrap_source(ip, &VecDeque::new()).await?;
            let state = self.controller.basebackup(ip, &source).await?;
            self.states.insert(ip.to_string(), state);
            self.refresh(ip).await;
        }

        self.configure(ip).await?;
        self.event(ClusterEvent::Upgrade, &format!("{ip} upgraded"));
        Ok(())
    }

    /// Recreate the unit from the current template and wait for it.
    async fn recreate(&mut self, ip: &str) -> ReconcileResult<()> {
        let template = UnitTemplate::for_spec(self.spec);
        self.ctx.orchestrator.recreate_unit(self.key(), ip, &template).await?;

        let policy = self.ctx.unit_retry(self.spec);
        let unit = wait_unit_running(
            self.ctx.orchestrator.as_ref(),
            self.ctx.sleeper.as_ref(),
            &policy,
            self.key(),
            ip,
        )
        .await?;
        self.units.insert(ip.to_string(), unit);
        self.refresh(ip).await;
        Ok(())
    }

    /// Create units for desired IPs that have none.
    pub async fn ensure_units(&mut self) -> ReconcileResult<()> {
        for ip in self.missing_ips() {
            info!(ip = %ip, "creating unit");
            self.recreate(&ip).await?;
            if !self.previous.is_new() {
                self.event(ClusterEvent::ResourceRecreated, &format!("unit for {ip} recreated"));
            }
        }
        Ok(())
    }
}
