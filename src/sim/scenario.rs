//! Simulation Scenarios
//!
//! A scenario file seeds one cluster into a [`SimPlatform`] and the
//! simulation then runs a number of passes against it, reporting what
//! each pass did. Used by the `simulate` command to dry-run reconciler
//! decisions against a described situation.

use super::instance::SimInstance;
use super::platform::{RemoteSite, SimPlatform};
use crate::model::{ClusterSpec, ClusterState, ObservedStatus, SpecValidator};
use crate::observability::MemoryEventRecorder;
use crate::operator::OperatorConfig;
use crate::platform::UnitTemplate;
use crate::reconcile::TopologyReconciler;
use crate::retry::VirtualSleeper;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Failures loading a scenario.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("cannot read scenario {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid scenario: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Described starting situation of one cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub spec: ClusterSpec,
    /// Instances by IP. IPs outside the spec become stale units.
    #[serde(default)]
    pub instances: BTreeMap<String, SimInstance>,
    /// Status left by an earlier pass.
    #[serde(default)]
    pub status: Option<ObservedStatus>,
    #[serde(default)]
    pub remote: RemoteSite,
    /// Specs applied after the first, second, ... pass.
    #[serde(default)]
    pub followups: Vec<ClusterSpec>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let content = fs::read_to_string(path).map_err(|source| ScenarioError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Seed the scenario into `sim`.
    pub fn install(&self, sim: &SimPlatform) {
        let template = UnitTemplate::for_spec(&self.spec);
        for (ip, instance) in &self.instances {
            sim.add_unit(&self.spec.key, ip, template.clone(), instance.clone());
        }
        sim.seed_cluster(&self.spec, Vec::new());
        sim.set_remote(self.remote);
        if let Some(status) = &self.status {
            sim.seed_status(&self.spec.key, status.clone());
        }
    }
}

/// Outcome of one simulated pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    pub pass: usize,
    pub state: Option<ClusterState>,
    pub primary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Mutations issued during the pass, in order.
    pub calls: Vec<String>,
}

/// Outcome of a whole simulation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimReport {
    pub passes: Vec<PassReport>,
    /// `EVENT: message` lines, oldest first.
    pub events: Vec<String>,
    pub final_status: Option<ObservedStatus>,
}

/// Run `passes` reconciliation passes over `scenario`.
pub async fn simulate(
    scenario: &Scenario,
    validator: SpecValidator,
    config: &OperatorConfig,
    passes: usize,
) -> SimReport {
    let sim = SimPlatform::new();
    scenario.install(&sim);

    let events = MemoryEventRecorder::new();
    let mut ctx = sim.context(validator, Arc::new(events.clone()), Arc::new(VirtualSleeper::new()));
    ctx.instance_retry = config.instance_retry.to_policy();
    ctx.status_retry = config.status_retry.to_policy();
    ctx.verify_status_writes = config.verify_status_writes;
    let reconciler = TopologyReconciler::new(ctx);

    let key = scenario.spec.key.clone();
    let mut spec = scenario.spec.clone();
    let mut reports = Vec::with_capacity(passes);

    for pass in 1..=passes {
        sim.clear_journal();
        let result = reconciler.reconcile(&spec).await;
        let stored = sim.status(&key);

        let report = PassReport {
            pass,
            state: stored.as_ref().map(|s| s.state),
            primary: stored.as_ref().map(|s| s.primary.clone()).unwrap_or_default(),
            error: result.err().map(|e| e.to_string()),
            calls: sim.journal().iter().map(ToString::to_string).collect(),
        };
        info!(pass, state = ?report.state, calls = report.calls.len(), "simulated pass finished");
        reports.push(report);

        if let Some(next) = scenario.followups.get(pass - 1) {
            spec = next.clone();
            sim.set_spec(&spec);
        }
    }

    SimReport {
        passes: reports,
        events: events
            .records()
            .iter()
            .map(|r| format!("{}: {}", r.event.as_str(), r.message))
            .collect(),
        final_status: sim.status(&key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReservedParameters;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SCENARIO: &str = r#"{
        "spec": {
            "key": {"namespace": "db", "name": "orders"},
            "topology": {"local": [{"ip": "10.0.0.1"}, {"ip": "10.0.0.2"}]}
        },
        "instances": {
            "10.0.0.1": {"role": "standby", "hasData": true, "lsn": 300},
            "10.0.0.2": {"role": "standby", "hasData": true, "lsn": 200}
        }
    }"#;

    fn validator() -> SpecValidator {
        SpecValidator::new(Arc::new(ReservedParameters::standard().unwrap()))
    }

    #[test]
    fn test_load_scenario_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SCENARIO.as_bytes()).unwrap();

        let scenario = Scenario::load(file.path()).unwrap();
        assert_eq!(scenario.instances.len(), 2);
        assert!(scenario.status.is_none());
        assert!(!scenario.remote.up);
    }

    #[test]
    fn test_missing_scenario_file() {
        let err = Scenario::load(Path::new("/nonexistent/scenario.json")).unwrap_err();
        assert!(matches!(err, ScenarioError::Read { .. }));
    }

    #[tokio::test]
    async fn test_simulation_elects_and_settles() {
        let scenario: Scenario = serde_json::from_str(SCENARIO).unwrap();
        let report = simulate(&scenario, validator(), &OperatorConfig::default(), 2).await;

        assert_eq!(report.passes.len(), 2);
        assert_eq!(report.passes[0].primary, "10.0.0.1");
        assert!(report.passes[0].calls.iter().any(|c| c == "exec 10.0.0.1 notify_primary"));
        assert_eq!(report.passes[1].state, Some(ClusterState::Ready));
        assert!(report.events.iter().any(|e| e.starts_with("PROMOTE")));
    }
}
