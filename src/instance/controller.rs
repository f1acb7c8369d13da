//! Instance Controller
//!
//! Imperative operations on one instance. Every operation submits a
//! command and then polls the status probe until the expected
//! [`DBState`] shows up or the retry budget runs out, in which case the
//! last observed state is reported in an [`InstanceError::Timeout`].

use super::channel::{statements, InstanceChannel, InstanceCommand, NotifyRole, ShutdownMode, StartMode};
use super::errors::{InstanceError, InstanceResult};
use super::lsn::Lsn;
use super::state::{DBState, TaskStatus};
use crate::retry::{wait_until, RetryPolicy, Sleeper, WaitError};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Drives single-instance state transitions.
#[derive(Clone)]
pub struct InstanceController {
    channel: Arc<dyn InstanceChannel>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
    replication_port: u16,
}

impl InstanceController {
    /// Create a controller. `replication_port` is the port a basebackup
    /// source listens on.
    pub fn new(
        channel: Arc<dyn InstanceChannel>,
        sleeper: Arc<dyn Sleeper>,
        policy: RetryPolicy,
        replication_port: u16,
    ) -> Self {
        Self {
            channel,
            sleeper,
            policy,
            replication_port,
        }
    }

    /// Retry budget applied to every wait.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Same controller with a different wait budget.
    pub fn with_policy(&self, policy: RetryPolicy) -> Self {
        Self {
            policy,
            ..self.clone()
        }
    }

    // =========================================================================
    // OBSERVATION
    // =========================================================================

    /// Probe the instance once.
    pub async fn state(&self, ip: &str) -> InstanceResult<DBState> {
        let document = self.channel.probe(ip).await?;
        DBState::from_json(ip, &document)
    }

    /// Current replication position. Primaries report their write
    /// position, everything else its replay position.
    pub async fn lsn(&self, ip: &str, state: &DBState) -> InstanceResult<Lsn> {
        let statement = if state.acts_as_primary() {
            statements::CURRENT_LSN
        } else {
            statements::REPLAY_LSN
        };
        let output = self.channel.query(ip, statement).await?;
        Lsn::parse(ip, output.lines().next().unwrap_or_default())
    }

    /// Run a raw single-statement query.
    pub async fn query(&self, ip: &str, statement: &str) -> InstanceResult<String> {
        self.channel.query(ip, statement).await
    }

    /// Poll until `done` holds on the probed state.
    pub async fn wait_for<P>(&self, ip: &str, expected: &'static str, done: P) -> InstanceResult<DBState>
    where
        P: FnMut(&DBState) -> bool,
    {
        let result = wait_until(&self.policy, self.sleeper.as_ref(), || self.state(ip), done).await;

        match result {
            Ok(state) => {
                debug!(ip, expected, state = %state, "instance reached expected state");
                Ok(state)
            }
            Err(WaitError::Exhausted { last, .. }) => Err(InstanceError::Timeout {
                ip: ip.to_string(),
                expected,
                last: last.map(|s| s.describe()).unwrap_or_else(|| "nothing".to_string()),
            }),
            Err(WaitError::Fetch(e)) => Err(e),
        }
    }

    async fn exec(&self, ip: &str, command: InstanceCommand) -> InstanceResult<()> {
        debug!(ip, command = command.name(), "exec");
        self.channel.exec(ip, &command).await
    }

    // =========================================================================
    // PROCESS LIFECYCLE
    // =========================================================================

    /// Start the process as a primary.
    pub async fn start_primary(&self, ip: &str) -> InstanceResult<DBState> {
        self.exec(ip, InstanceCommand::Start { mode: StartMode::Primary }).await?;
        self.wait_for(ip, "primary", |s| s.is_primary_normal()).await
    }

    /// Start the process as a standby. Replication health is not awaited:
    /// a standby that cannot stream needs a basebackup, not more waiting.
    pub async fn start_standby(&self, ip: &str) -> InstanceResult<DBState> {
        self.exec(ip, InstanceCommand::Start { mode: StartMode::Standby }).await?;
        self.wait_for(ip, "standby", |s| s.is_standby()).await
    }

    /// Start the process in the transient pending role.
    pub async fn start_pending(&self, ip: &str) -> InstanceResult<DBState> {
        self.exec(ip, InstanceCommand::Start { mode: StartMode::Pending }).await?;
        self.wait_for(ip, "pending", |s| s.is_pending()).await
    }

    /// Stop the process.
    pub async fn stop(&self, ip: &str) -> InstanceResult<DBState> {
        self.exec(ip, InstanceCommand::Stop { mode: ShutdownMode::Fast }).await?;
        self.wait_for(ip, "stopped", |s| s.is_stopped()).await
    }

    /// Restart the process in its current role.
    pub async fn restart(&self, ip: &str, mode: ShutdownMode) -> InstanceResult<DBState> {
        self.exec(ip, InstanceCommand::Restart { mode }).await?;
        self.wait_for(ip, "running", |s| s.process_exists && s.connection_available)
            .await
    }

    /// Notify a pending instance of its role.
    pub async fn notify(&self, ip: &str, role: NotifyRole) -> InstanceResult<DBState> {
        self.exec(ip, InstanceCommand::Notify { role }).await?;
        match role {
            NotifyRole::Primary => self.wait_for(ip, "primary", |s| s.is_primary_normal()).await,
            NotifyRole::Standby => self.wait_for(ip, "standby", |s| s.is_standby()).await,
        }
    }

    // =========================================================================
    // ROLE CHANGES
    // =========================================================================

    /// Make the instance primary.
    ///
    /// A pending instance is notified directly. Anything else goes through
    /// stop + pending start first so stale replication connections drop.
    pub async fn promote(&self, ip: &str, current: &DBState) -> InstanceResult<DBState> {
        if !current.is_pending() {
            if current.process_exists {
                self.stop(ip).await?;
            }
            self.start_pending(ip).await?;
        }
        let state = self.notify(ip, NotifyRole::Primary).await?;
        info!(ip, "instance promoted to primary");
        Ok(state)
    }

    /// Demote to pending via stop + pending start.
    ///
    /// Never a plain restart: a restart would keep the primary role long
    /// enough for standbys to reconnect.
    pub async fn demote_to_pending(&self, ip: &str) -> InstanceResult<DBState> {
        self.stop(ip).await?;
        let state = self.start_pending(ip).await?;
        info!(ip, "instance demoted to pending");
        Ok(state)
    }

    /// Turn the instance into a standby from whatever it is now.
    pub async fn demote_to_standby(&self, ip: &str, current: &DBState) -> InstanceResult<DBState> {
        if current.is_pending() {
            return self.notify(ip, NotifyRole::Standby).await;
        }
        if current.process_exists {
            self.stop(ip).await?;
        }
        self.start_standby(ip).await
    }

    /// Ask a standby to take over from the current primary. Completion is
    /// awaited by the caller, which has to watch both sides.
    pub async fn switchover(&self, ip: &str) -> InstanceResult<()> {
        self.exec(ip, InstanceCommand::Switchover).await
    }

    // =========================================================================
    // DATA
    // =========================================================================

    /// Copy data from `source_host` into this instance.
    pub async fn basebackup(&self, ip: &str, source_host: &str) -> InstanceResult<DBState> {
        self.exec(
            ip,
            InstanceCommand::Basebackup {
                source_host: source_host.to_string(),
                source_port: self.replication_port,
            },
        )
        .await?;

        let state = self
            .wait_for(ip, "basebackup finished", |s| s.build_status.is_finished())
            .await?;

        if state.build_status == TaskStatus::Failed {
            return Err(InstanceError::BackupFailed {
                ip: ip.to_string(),
                source_host: source_host.to_string(),
                detail: state.detail.clone(),
            });
        }
        Ok(state)
    }

    /// Wipe the data directory so a later basebackup starts clean.
    pub async fn clean_data(&self, ip: &str) -> InstanceResult<()> {
        self.exec(ip, InstanceCommand::CleanData).await
    }

    /// Restore the instance's data from a backup file.
    pub async fn restore(&self, ip: &str, file: &str) -> InstanceResult<DBState> {
        self.exec(ip, InstanceCommand::Restore { file: file.to_string() })
            .await?;

        let state = self
            .wait_for(ip, "restore finished", |s| s.restore_status.is_finished())
            .await?;

        if state.restore_status == TaskStatus::Failed {
            return Err(InstanceError::RestoreFailed {
                ip: ip.to_string(),
                file: file.to_string(),
                detail: state.detail.clone(),
            });
        }
        Ok(state)
    }

    // =========================================================================
    // CONFIGURATION
    // =========================================================================

    /// Write parameters and reload. No restart is needed for any parameter
    /// the reconciler manages.
    pub async fn configure(&self, ip: &str, parameters: BTreeMap<String, String>) -> InstanceResult<()> {
        self.exec(ip, InstanceCommand::SetParameters { parameters }).await?;
        self.exec(ip, InstanceCommand::Reload).await
    }

    /// Set or clear the maintenance flag.
    pub async fn set_maintenance(&self, ip: &str, enabled: bool) -> InstanceResult<DBState> {
        self.exec(ip, InstanceCommand::SetMaintenance { enabled }).await?;
        let expected = if enabled { "maintenance on" } else { "maintenance off" };
        self.wait_for(ip, expected, |s| s.in_maintenance == enabled).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::NoopSleeper;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Channel replaying a fixed sequence of probe documents.
    struct ScriptedChannel {
        probes: Mutex<Vec<DBState>>,
        commands: Mutex<Vec<String>>,
        lsn_output: String,
    }

    impl ScriptedChannel {
        fn new(probes: Vec<DBState>) -> Self {
            Self {
                probes: Mutex::new(probes),
                commands: Mutex::new(Vec::new()),
                lsn_output: "0/3000148\n".to_string(),
            }
        }

        fn commands(&self) -> Vec<String> {
            self.commands.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl InstanceChannel for ScriptedChannel {
        async fn probe(&self, _ip: &str) -> InstanceResult<String> {
            let mut probes = self.probes.lock().unwrap();
            let state = if probes.len() > 1 {
                probes.remove(0)
            } else {
                probes[0].clone()
            };
            Ok(serde_json::to_string(&state).unwrap())
        }

        async fn exec(&self, _ip: &str, command: &InstanceCommand) -> InstanceResult<()> {
            self.commands.lock().unwrap().push(command.name().to_string());
            Ok(())
        }

        async fn query(&self, _ip: &str, _statement: &str) -> InstanceResult<String> {
            Ok(self.lsn_output.clone())
        }
    }

    fn controller(channel: Arc<ScriptedChannel>, attempts: u32) -> InstanceController {
        InstanceController::new(
            channel,
            Arc::new(NoopSleeper),
            RetryPolicy::new(Duration::from_secs(1), attempts),
            5433,
        )
    }

    fn running() -> DBState {
        DBState {
            process_exists: true,
            connection_available: true,
            ..DBState::default()
        }
    }

    fn primary() -> DBState {
        DBState {
            primary: true,
            ..running()
        }
    }

    fn pending() -> DBState {
        DBState {
            pending: true,
            ..running()
        }
    }

    #[tokio::test]
    async fn test_start_primary_waits_for_role() {
        let channel = Arc::new(ScriptedChannel::new(vec![DBState::default(), running(), primary()]));
        let state = controller(channel.clone(), 5).start_primary("10.0.0.1").await.unwrap();

        assert!(state.is_primary_normal());
        assert_eq!(channel.commands(), vec!["start_primary"]);
    }

    #[tokio::test]
    async fn test_timeout_reports_last_state() {
        let channel = Arc::new(ScriptedChannel::new(vec![pending()]));
        let err = controller(channel, 3).start_primary("10.0.0.1").await.unwrap_err();

        match err {
            InstanceError::Timeout { expected, last, .. } => {
                assert_eq!(expected, "primary");
                assert_eq!(last, "Pending");
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_demote_to_pending_is_stop_then_pending_start() {
        let channel = Arc::new(ScriptedChannel::new(vec![DBState::default(), pending()]));
        controller(channel.clone(), 5)
            .demote_to_pending("10.0.0.1")
            .await
            .unwrap();

        assert_eq!(channel.commands(), vec!["stop", "start_pending"]);
    }

    #[tokio::test]
    async fn test_promote_pending_only_notifies() {
        let channel = Arc::new(ScriptedChannel::new(vec![primary()]));
        controller(channel.clone(), 5)
            .promote("10.0.0.1", &pending())
            .await
            .unwrap();

        assert_eq!(channel.commands(), vec!["notify_primary"]);
    }

    #[tokio::test]
    async fn test_basebackup_failure_is_classified() {
        let failed = DBState {
            build_status: TaskStatus::Failed,
            detail: "source unreachable".into(),
            ..DBState::default()
        };
        let channel = Arc::new(ScriptedChannel::new(vec![failed]));
        let err = controller(channel, 3)
            .basebackup("10.0.0.3", "10.0.0.1")
            .await
            .unwrap_err();

        assert!(matches!(err, InstanceError::BackupFailed { .. }));
    }

    #[tokio::test]
    async fn test_lsn_reads_first_line() {
        let channel = Arc::new(ScriptedChannel::new(vec![running()]));
        let lsn = controller(channel, 1)
            .lsn("10.0.0.4", &running())
            .await
            .unwrap();
        assert_eq!(lsn.position(), (0, 0x0300, 0x0148));
    }
}
