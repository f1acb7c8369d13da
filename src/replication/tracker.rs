//! Sync State Tracker
//!
//! Keeps the actual number of synchronous standbys aligned with the
//! required quorum, trading consistency for availability when standbys
//! lag:
//!
//! - quorum met and most-available on: turn it off immediately
//! - quorum short and most-available off: keep re-polling every interval;
//!   once the accumulated wait reaches the grace timeout, turn it on
//!
//! The asymmetry is intentional and preserved as-is: when the grace
//! timeout fires the flag is turned on without a final re-check, even if
//! the last interval would have shown the quorum restored.

use super::params::MOST_AVAILABLE_PARAMETER;
use super::sync_state::{count_sync, parse_sync_states, SyncState};
use crate::instance::{statements, InstanceController, InstanceResult};
use crate::retry::Sleeper;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What one run of the control loop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MostAvailableAction {
    /// Nothing to do: flag already matches the quorum situation.
    Unchanged,
    /// Quorum was restored while waiting; flag left off.
    Recovered,
    TurnedOn,
    TurnedOff,
}

/// Queries standby replication states and drives the most-available flag.
#[derive(Clone)]
pub struct SyncStateTracker {
    controller: InstanceController,
    sleeper: Arc<dyn Sleeper>,
}

impl SyncStateTracker {
    pub fn new(controller: InstanceController, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { controller, sleeper }
    }

    /// Standby states as reported by the primary, ordered by priority.
    pub async fn sync_states(&self, primary: &str) -> InstanceResult<Vec<SyncState>> {
        let output = self.controller.query(primary, statements::SYNC_STATES).await?;
        parse_sync_states(primary, &output)
    }

    /// Current most-available setting on the primary.
    pub async fn most_available(&self, primary: &str) -> InstanceResult<bool> {
        let output = self
            .controller
            .query(primary, statements::SHOW_MOST_AVAILABLE)
            .await?;
        Ok(matches!(
            output.lines().next().unwrap_or_default().trim(),
            "on" | "true" | "1"
        ))
    }

    /// Toggle most-available. Takes effect on reload, no restart.
    pub async fn set_most_available(&self, primary: &str, enabled: bool) -> InstanceResult<()> {
        let value = if enabled { "on" } else { "off" };
        let parameters = BTreeMap::from([(MOST_AVAILABLE_PARAMETER.to_string(), value.to_string())]);
        self.controller.configure(primary, parameters).await
    }

    /// Run the control loop once against `primary`.
    pub async fn reconcile_most_available(
        &self,
        primary: &str,
        required: usize,
        timeout: Duration,
        interval: Duration,
    ) -> InstanceResult<MostAvailableAction> {
        if required == 0 {
            return Ok(MostAvailableAction::Unchanged);
        }

        let synced = count_sync(&self.sync_states(primary).await?);
        let enabled = self.most_available(primary).await?;
        debug!(primary, synced, required, enabled, "most-available check");

        if synced >= required {
            if enabled {
                self.set_most_available(primary, false).await?;
                info!(primary, synced, required, "sync quorum restored, most-available off");
                return Ok(MostAvailableAction::TurnedOff);
            }
            return Ok(MostAvailableAction::Unchanged);
        }

        if enabled {
            return Ok(MostAvailableAction::Unchanged);
        }

        let interval = if interval.is_zero() { timeout } else { interval };
        let mut elapsed = Duration::ZERO;
        loop {
            self.sleeper.sleep(interval).await;
            elapsed += interval;

            if elapsed >= timeout {
                self.set_most_available(primary, true).await?;
                warn!(
                    primary,
                    required,
                    waited_secs = elapsed.as_secs(),
                    "sync quorum short past grace period, most-available on"
                );
                return Ok(MostAvailableAction::TurnedOn);
            }

            let synced = count_sync(&self.sync_states(primary).await?);
            if synced >= required {
                debug!(primary, synced, required, "sync quorum recovered during grace period");
                return Ok(MostAvailableAction::Recovered);
            }
        }
    }
}
