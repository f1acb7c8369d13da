//! CLI module for clusterkeeper
//!
//! Provides command-line interface for:
//! - validate: Check a cluster spec file
//! - quorum: Synchronous standby count for a topology size
//! - simulate: Dry-run reconciliation passes against a described cluster

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{quorum, run, run_command, simulate, validate};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_error, write_response};
