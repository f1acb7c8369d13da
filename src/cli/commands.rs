//! CLI command implementations
//!
//! Commands are offline tools around the reconciler: they never talk to a
//! real platform. `simulate` runs the real reconciler against the
//! in-memory simulation.

use std::fs;
use std::path::Path;

use serde_json::json;

use crate::model::{ClusterSpec, ReservedParameters, SpecValidator};
use crate::observability::init_logging;
use crate::operator::OperatorConfig;
use crate::replication::{most_available_eligible, required_sync_count};
use crate::sim::{self, Scenario};
use std::sync::Arc;

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::{write_error, write_response};

/// Parse arguments, run the command and report failures as JSON.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    run_command(cli.command).inspect_err(|e| {
        let _ = write_error(e.code_str(), e.message());
    })
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Validate { spec } => validate(&spec),
        Command::Quorum { local, remote } => quorum(local, remote),
        Command::Simulate {
            scenario,
            config,
            passes,
        } => simulate(&scenario, config.as_deref(), passes),
    }
}

fn validator() -> CliResult<SpecValidator> {
    let reserved = ReservedParameters::standard()
        .map_err(|e| CliError::runtime_error(format!("reserved parameter patterns: {e}")))?;
    Ok(SpecValidator::new(Arc::new(reserved)))
}

fn load_spec(path: &Path) -> CliResult<ClusterSpec> {
    let content = fs::read_to_string(path)
        .map_err(|e| CliError::input_error(format!("cannot read spec {}: {e}", path.display())))?;
    serde_json::from_str(&content).map_err(|e| CliError::input_error(format!("invalid spec JSON: {e}")))
}

/// Check a spec file against every single-spec invariant.
pub fn validate(path: &Path) -> CliResult<()> {
    let spec = load_spec(path)?;
    validator()?.validate(&spec)?;

    let topology = &spec.topology;
    write_response(json!({
        "cluster": spec.key.to_string(),
        "valid": true,
        "siteRole": topology.local_role.as_str(),
        "localInstances": topology.local.len(),
        "remoteIps": topology.remote_ips.len(),
        "requiredSync": required_sync_count(topology.local.len(), topology.remote_ips.len()),
    }))
}

/// Print the synchronous quorum for a topology size.
pub fn quorum(local: usize, remote: usize) -> CliResult<()> {
    write_response(json!({
        "local": local,
        "remote": remote,
        "requiredSync": required_sync_count(local, remote),
        "mostAvailableEligible": most_available_eligible(local, remote),
    }))
}

/// Run reconciliation passes over a scenario and print the report.
pub fn simulate(scenario_path: &Path, config_path: Option<&Path>, passes: usize) -> CliResult<()> {
    let config = match config_path {
        Some(path) => OperatorConfig::load(path)?,
        None => OperatorConfig::default(),
    };
    init_logging(config.log_format);

    let scenario = Scenario::load(scenario_path)?;
    let validator = validator()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::runtime_error(e.to_string()))?;
    let report = runtime.block_on(sim::simulate(&scenario, validator, &config, passes));

    write_response(serde_json::to_value(&report)?)
}
