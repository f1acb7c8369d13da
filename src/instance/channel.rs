//! Instance Control Channel
//!
//! The in-unit exec/probe mechanism. Implementations live outside this
//! crate (an exec into the compute unit, an agent RPC, ...) apart from the
//! in-memory simulation in [`crate::sim`].

use super::errors::InstanceResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Role requested when starting a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartMode {
    Primary,
    Standby,
    Pending,
}

/// Role a pending instance is notified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyRole {
    Primary,
    Standby,
}

/// How a running process is shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownMode {
    Smart,
    Fast,
    Immediate,
}

/// Imperative command accepted by an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum InstanceCommand {
    Start { mode: StartMode },
    Notify { role: NotifyRole },
    Restart { mode: ShutdownMode },
    Stop { mode: ShutdownMode },
    Basebackup { source_host: String, source_port: u16 },
    Switchover,
    SetParameters { parameters: BTreeMap<String, String> },
    Reload,
    Restore { file: String },
    SetMaintenance { enabled: bool },
    CleanData,
}

impl InstanceCommand {
    /// Short command name for logs and call journals.
    pub fn name(&self) -> &'static str {
        match self {
            InstanceCommand::Start { mode: StartMode::Primary } => "start_primary",
            InstanceCommand::Start { mode: StartMode::Standby } => "start_standby",
            InstanceCommand::Start { mode: StartMode::Pending } => "start_pending",
            InstanceCommand::Notify { role: NotifyRole::Primary } => "notify_primary",
            InstanceCommand::Notify { role: NotifyRole::Standby } => "notify_standby",
            InstanceCommand::Restart { .. } => "restart",
            InstanceCommand::Stop { .. } => "stop",
            InstanceCommand::Basebackup { .. } => "basebackup",
            InstanceCommand::Switchover => "switchover",
            InstanceCommand::SetParameters { .. } => "set_parameters",
            InstanceCommand::Reload => "reload",
            InstanceCommand::Restore { .. } => "restore",
            InstanceCommand::SetMaintenance { .. } => "set_maintenance",
            InstanceCommand::CleanData => "clean_data",
        }
    }
}

/// Single-statement queries issued through [`InstanceChannel::query`].
///
/// Output is expected in unaligned tuples-only form: one row per line,
/// columns separated by `|`.
pub mod statements {
    /// Write position on a primary.
    pub const CURRENT_LSN: &str = "select pg_current_xlog_location()";
    /// Replay position on a standby.
    pub const REPLAY_LSN: &str = "select pg_last_xlog_replay_location()";
    /// Standby replication states as seen by the primary.
    pub const SYNC_STATES: &str = "select client_addr, sync_percent, sync_state, sync_priority \
         from pg_stat_get_wal_senders() order by sync_priority";
    /// Current most-available setting.
    pub const SHOW_MOST_AVAILABLE: &str = "show most_available_sync";
}

/// Exec/probe access to instances.
#[async_trait]
pub trait InstanceChannel: Send + Sync {
    /// Return the JSON status document of the instance at `ip`.
    async fn probe(&self, ip: &str) -> InstanceResult<String>;

    /// Submit a command. `Ok` means accepted, not completed.
    async fn exec(&self, ip: &str, command: &InstanceCommand) -> InstanceResult<()>;

    /// Run a single-statement query and return its raw output.
    async fn query(&self, ip: &str, statement: &str) -> InstanceResult<String>;
}
