//! Reconciliation Error Types
//!
//! Every failure ends the current pass. The class decides what happens to
//! the cluster record: data-integrity failures mark the cluster `Failed`
//! and stop automated promotion, everything else is retried wholesale by
//! the next scheduled pass.

use crate::instance::InstanceError;
use crate::model::ValidationError;
use crate::platform::PlatformError;
use std::fmt;
use thiserror::Error;

/// Result type for reconciliation
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Error class, used for status messages and alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    Transient,
    DataIntegrity,
    ResourceLoss,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Validation => "validation",
            ErrorClass::Transient => "transient",
            ErrorClass::DataIntegrity => "data-integrity",
            ErrorClass::ResourceLoss => "resource-loss",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Failures of a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Instance(#[from] InstanceError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("invalid spec: {0}")]
    Invalid(#[from] ValidationError),

    /// The only promotion candidate may be missing committed data.
    #[error("refusing to promote {candidate}: not the last primary ({previous}) and not in the last sync set")]
    DataIntegrity { candidate: String, previous: String },

    /// A failed cluster has no primary; only an administrator may pick one.
    #[error("cluster failed earlier and has no primary; manual promotion required")]
    ManualInterventionRequired,

    #[error("switchover {from} -> {to} did not complete: {detail}")]
    SwitchoverFailed { from: String, to: String, detail: String },

    /// The primary has to move but no data-complete standby exists.
    #[error("no data-complete standby to take over from {primary}")]
    NoSwitchoverCandidate { primary: String },

    #[error("no primary to {action}")]
    NoPrimary { action: &'static str },

    #[error("no basebackup source for {target}")]
    NoBootstrapSource { target: String },

    #[error("pass exceeded {secs}s")]
    PassTimeout { secs: u64 },
}

impl ReconcileError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ReconcileError::Invalid(_) => ErrorClass::Validation,
            ReconcileError::DataIntegrity { .. } | ReconcileError::ManualInterventionRequired => {
                ErrorClass::DataIntegrity
            }
            ReconcileError::Platform(PlatformError::NotFound { .. }) => ErrorClass::ResourceLoss,
            _ => ErrorClass::Transient,
        }
    }

    /// Fatal errors stop automated recovery of the cluster.
    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::DataIntegrity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let integrity = ReconcileError::DataIntegrity {
            candidate: "10.0.0.3".into(),
            previous: "10.0.0.1".into(),
        };
        assert!(integrity.is_fatal());
        assert_eq!(integrity.class(), ErrorClass::DataIntegrity);

        let timeout: ReconcileError = InstanceError::Timeout {
            ip: "10.0.0.1".into(),
            expected: "primary",
            last: "Stopped".into(),
        }
        .into();
        assert!(!timeout.is_fatal());
        assert_eq!(timeout.class(), ErrorClass::Transient);

        let lost: ReconcileError = PlatformError::NotFound {
            kind: "unit",
            name: "10.0.0.1".into(),
        }
        .into();
        assert_eq!(lost.class(), ErrorClass::ResourceLoss);

        let invalid: ReconcileError = ValidationError::EmptyLocalSet.into();
        assert_eq!(invalid.class(), ErrorClass::Validation);
    }

    #[test]
    fn test_messages_name_the_instances() {
        let err = ReconcileError::SwitchoverFailed {
            from: "10.0.0.1".into(),
            to: "10.0.0.2".into(),
            detail: "target still standby".into(),
        };
        let text = err.to_string();
        assert!(text.contains("10.0.0.1 -> 10.0.0.2"));
    }
}
