//! Restore from Backup
//!
//! The backup is restored into the stopped primary, which is then started
//! again. Every other desired instance is rebuilt from it afterwards.

use super::errors::{ReconcileError, ReconcileResult};
use super::pass::Pass;
use crate::instance::InstanceError;
use crate::observability::ClusterEvent;
use tracing::{info, warn};

impl Pass<'_> {
    pub async fn restore(&mut self, file: &str) -> ReconcileResult<()> {
        let primary = self
            .primary
            .clone()
            .ok_or(ReconcileError::NoPrimary { action: "restore" })?;
        self.event(ClusterEvent::Restore, &format!("restoring {file} into {primary}"));
        info!(primary = %primary, file, "restore");

        self.controller.stop(&primary).await?;
        self.controller.restore(&primary, file).await?;
        let state = self.controller.start_primary(&primary).await?;
        self.states.insert(primary.clone(), state);

        let standbys: Vec<String> = self
            .running_ips()
            .into_iter()
            .filter(|ip| *ip != primary && self.is_desired(ip))
            .collect();
        for ip in standbys {
            match self.controller.basebackup(&ip, &primary).await {
                Ok(state) => {
                    self.states.insert(ip.clone(), state);
                    self.event(ClusterEvent::Basebackup, &format!("{ip} rebuilt from restored {primary}"));
                }
                Err(e @ InstanceError::BackupFailed { .. }) => {
                    warn!(ip = %ip, error = %e, "rebuild after restore failed, wiping data");
                    self.controller.clean_data(&ip).await?;
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.refresh_all().await
    }
}
