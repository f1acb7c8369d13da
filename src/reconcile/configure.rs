//! Instance Configuration and Metadata
//!
//! Replication parameters are pushed only when their digest differs from
//! the one recorded in the unit's metadata record, so a converged cluster
//! sees no configuration commands at all.

use super::errors::ReconcileResult;
use super::pass::Pass;
use crate::platform::{InstanceMeta, UnitRole};
use tracing::{debug, info};

impl Pass<'_> {
    /// Push the replication parameters of `ip` if they changed.
    pub async fn configure(&mut self, ip: &str) -> ReconcileResult<()> {
        let params = self.params(ip);
        let digest = params.digest();
        let Some(unit) = self.units.get(ip) else {
            return Ok(());
        };
        if unit.meta.config_digest.as_deref() == Some(digest.as_str()) {
            return Ok(());
        }

        self.controller.configure(ip, params.into_entries()).await?;
        let meta = InstanceMeta {
            config_digest: Some(digest),
            ..unit.meta.clone()
        };
        self.write_meta(ip, meta).await?;
        info!(ip, "replication parameters applied");
        Ok(())
    }

    /// Configure every desired running instance and record its role.
    pub async fn sync_metadata(&mut self) -> ReconcileResult<()> {
        let ips: Vec<String> = self
            .running_ips()
            .into_iter()
            .filter(|ip| self.is_desired(ip))
            .collect();

        for ip in ips {
            let state = self.state(&ip);
            if !(state.process_exists && state.connection_available) {
                continue;
            }
            self.configure(&ip).await?;

            let role = if self.primary.as_deref() == Some(ip.as_str()) {
                Some(UnitRole::Primary)
            } else if state.is_standby() {
                Some(UnitRole::Standby)
            } else {
                None
            };
            let Some(unit) = self.units.get(&ip) else {
                continue;
            };
            if unit.meta.role != role {
                let meta = InstanceMeta {
                    role,
                    ..unit.meta.clone()
                };
                self.write_meta(&ip, meta).await?;
                debug!(ip = %ip, role = ?role, "role recorded");
            }
        }
        Ok(())
    }

    async fn write_meta(&mut self, ip: &str, meta: InstanceMeta) -> ReconcileResult<()> {
        self.ctx.orchestrator.set_meta(self.key(), ip, &meta).await?;
        if let Some(unit) = self.units.get_mut(ip) {
            unit.meta = meta;
        }
        Ok(())
    }
}
