//! CLI-specific error types
//!
//! Every CLI error is fatal: it is printed with its stable code and the
//! process exits non-zero.

use crate::model::ValidationError;
use crate::operator::OperatorError;
use crate::sim::ScenarioError;
use std::fmt;
use std::io;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// Spec or scenario file error
    InputError,
    /// The spec violates an invariant
    InvalidSpec,
    /// I/O error (stdout)
    IoError,
    /// Runtime could not be started
    RuntimeError,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "CK_CLI_CONFIG_ERROR",
            Self::InputError => "CK_CLI_INPUT_ERROR",
            Self::InvalidSpec => "CK_CLI_INVALID_SPEC",
            Self::IoError => "CK_CLI_IO_ERROR",
            Self::RuntimeError => "CK_CLI_RUNTIME_ERROR",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    /// Create a new CLI error
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn input_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::InputError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn runtime_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::RuntimeError, msg)
    }

    /// Get the error code
    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<OperatorError> for CliError {
    fn from(e: OperatorError) -> Self {
        Self::config_error(e.to_string())
    }
}

impl From<ScenarioError> for CliError {
    fn from(e: ScenarioError) -> Self {
        Self::input_error(e.to_string())
    }
}

impl From<ValidationError> for CliError {
    fn from(e: ValidationError) -> Self {
        Self::new(CliErrorCode::InvalidSpec, e.to_string())
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_code() {
        let err = CliError::input_error("scenario missing");
        assert_eq!(err.to_string(), "CK_CLI_INPUT_ERROR: scenario missing");
        assert_eq!(err.code(), &CliErrorCode::InputError);
    }

    #[test]
    fn test_validation_maps_to_invalid_spec() {
        let err: CliError = ValidationError::EmptyLocalSet.into();
        assert_eq!(err.code_str(), "CK_CLI_INVALID_SPEC");
    }
}
