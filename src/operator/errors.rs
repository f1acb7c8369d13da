//! Operator Error Types

use crate::platform::PlatformError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for operator set-up and scheduling
pub type OperatorResult<T> = Result<T, OperatorError>;

#[derive(Debug, Error)]
pub enum OperatorError {
    #[error("cannot read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("cannot list clusters: {0}")]
    Source(#[from] PlatformError),
}

impl OperatorError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}
