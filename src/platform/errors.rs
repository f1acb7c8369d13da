//! Platform Error Types

use thiserror::Error;

/// Result type for platform calls
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Failures reported by the orchestration platform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    /// The object does not exist.
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    /// Optimistic concurrency check failed; re-read and retry.
    #[error("conflict writing {name}: expected version {expected:?}, found {actual}")]
    Conflict {
        name: String,
        expected: Option<u64>,
        actual: u64,
    },

    /// The platform API could not be reached or refused the call.
    #[error("platform unavailable: {0}")]
    Unavailable(String),

    /// A unit did not become running and reachable in time.
    #[error("unit {ip} not running after {attempts} attempts (phase {phase})")]
    UnitNotReady {
        ip: String,
        phase: String,
        attempts: u32,
    },
}

impl PlatformError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, PlatformError::Conflict { .. })
    }
}
