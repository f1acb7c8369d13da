//! Instance Error Types

use thiserror::Error;

/// Result type for instance operations
pub type InstanceResult<T> = Result<T, InstanceError>;

/// Failures talking to, or waiting on, a single instance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstanceError {
    /// The exec/probe channel refused or failed the call.
    #[error("instance {ip}: channel failure: {message}")]
    Channel { ip: String, message: String },

    /// The status document or query output could not be decoded.
    #[error("instance {ip}: cannot decode {what}: {message}")]
    Decode {
        ip: String,
        what: &'static str,
        message: String,
    },

    /// The instance did not reach the expected state within the retry budget.
    #[error("instance {ip}: timed out waiting for {expected} (last observed: {last})")]
    Timeout {
        ip: String,
        expected: &'static str,
        last: String,
    },

    /// Basebackup finished with a failed build status.
    ///
    /// Distinct from a timeout: the copied data is known to be unusable.
    #[error("instance {ip}: basebackup from {source_host} failed: {detail}")]
    BackupFailed {
        ip: String,
        source_host: String,
        detail: String,
    },

    /// Restore finished with a failed restore status.
    #[error("instance {ip}: restore of {file} failed: {detail}")]
    RestoreFailed {
        ip: String,
        file: String,
        detail: String,
    },
}

impl InstanceError {
    /// Create a channel error.
    pub fn channel(ip: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Channel {
            ip: ip.into(),
            message: message.into(),
        }
    }

    /// Create a decode error.
    pub fn decode(ip: impl Into<String>, what: &'static str, message: impl Into<String>) -> Self {
        Self::Decode {
            ip: ip.into(),
            what,
            message: message.into(),
        }
    }

    /// IP of the instance the error refers to.
    pub fn ip(&self) -> &str {
        match self {
            Self::Channel { ip, .. }
            | Self::Decode { ip, .. }
            | Self::Timeout { ip, .. }
            | Self::BackupFailed { ip, .. }
            | Self::RestoreFailed { ip, .. } => ip,
        }
    }

    /// Transient errors are expected to clear on a later pass.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Channel { .. } | Self::Timeout { .. })
    }
}
