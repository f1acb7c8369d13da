//! Validation Error Types
//!
//! Validation errors are never fatal to a running cluster: a new cluster
//! is marked invalid and left alone, an existing one keeps operating on
//! its last valid spec while the error is surfaced.

use thiserror::Error;

/// Result type for spec validation
pub type ValidationResult<T> = Result<T, ValidationError>;

/// A desired spec violates an invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("topology must contain at least one local instance")]
    EmptyLocalSet,

    #[error("invalid IP address {ip:?}")]
    MalformedIp { ip: String },

    #[error("IP {ip} appears more than once")]
    DuplicateIp { ip: String },

    #[error("a standby-site cluster requires at least one remote IP")]
    MissingRemoteIps,

    #[error("{field} {value} is outside {min}..={max}")]
    PortOutOfRange {
        field: &'static str,
        value: u16,
        min: u16,
        max: u16,
    },

    #[error("{field} {value} is below the minimum of {min}")]
    BelowMinimum {
        field: &'static str,
        value: u32,
        min: u32,
    },

    #[error("storage cannot shrink from {from} GiB to {to} GiB")]
    StorageShrink { from: u32, to: u32 },

    #[error("field {field} cannot be changed after creation")]
    ImmutableField { field: &'static str },

    #[error("database parameter {key:?} is managed by the operator")]
    ReservedParameter { key: String },
}
