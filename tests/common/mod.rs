//! Shared harness for reconciler integration tests
//!
//! Wires a [`TopologyReconciler`] to a fresh simulated world with a
//! virtual sleeper and an in-memory event recorder.

#![allow(dead_code)]

use clusterkeeper::model::{ClusterKey, ClusterSpec, ObservedStatus, ReservedParameters, SpecValidator};
use clusterkeeper::observability::{ClusterEvent, MemoryEventRecorder};
use clusterkeeper::reconcile::{ReconcileResult, TopologyReconciler};
use clusterkeeper::retry::VirtualSleeper;
use clusterkeeper::sim::{SimCall, SimInstance, SimPlatform};
use std::sync::Arc;

pub const A: &str = "10.0.0.1";
pub const B: &str = "10.0.0.2";
pub const C: &str = "10.0.0.3";
pub const D: &str = "10.0.0.4";

pub struct Harness {
    pub sim: SimPlatform,
    pub events: MemoryEventRecorder,
    pub sleeper: Arc<VirtualSleeper>,
    pub reconciler: TopologyReconciler,
}

impl Harness {
    pub fn new() -> Self {
        let sim = SimPlatform::new();
        let events = MemoryEventRecorder::new();
        let sleeper = Arc::new(VirtualSleeper::new());
        let ctx = sim.context(validator(), Arc::new(events.clone()), sleeper.clone());
        Self {
            sim,
            events,
            sleeper,
            reconciler: TopologyReconciler::new(ctx),
        }
    }

    /// Harness with `spec` seeded and the given instances running.
    pub fn seeded(spec: &ClusterSpec, instances: Vec<(&str, SimInstance)>) -> Self {
        let harness = Self::new();
        harness.sim.seed_cluster(spec, instances);
        harness
    }

    /// A cluster with primary `A` and standbys on the remaining IPs,
    /// already taken through its first pass.
    pub async fn converged(ips: &[&str]) -> (Self, ClusterSpec) {
        let spec = spec(ips);
        let instances = ips
            .iter()
            .map(|ip| {
                let instance = if *ip == A {
                    SimInstance::primary(100)
                } else {
                    SimInstance::standby(100)
                };
                (*ip, instance)
            })
            .collect();
        let harness = Self::seeded(&spec, instances);
        let status = harness.pass(&spec).await.expect("first pass converges");
        assert_eq!(status.primary, A);
        harness.sim.clear_journal();
        (harness, spec)
    }

    pub async fn pass(&self, spec: &ClusterSpec) -> ReconcileResult<ObservedStatus> {
        self.reconciler.reconcile(spec).await
    }

    pub fn status(&self) -> ObservedStatus {
        self.sim.status(&key()).unwrap_or_default()
    }

    pub fn count(&self, event: ClusterEvent) -> usize {
        self.events.count(event)
    }

    /// Commands sent to `ip`, in order.
    pub fn commands_to(&self, ip: &str) -> Vec<&'static str> {
        self.sim
            .commands()
            .into_iter()
            .filter(|(target, _)| target == ip)
            .map(|(_, command)| command)
            .collect()
    }

    /// Position of the first journal entry matching `pred`.
    pub fn position(&self, pred: impl Fn(&SimCall) -> bool) -> Option<usize> {
        self.sim.journal().iter().position(pred)
    }
}

pub fn key() -> ClusterKey {
    ClusterKey::new("db", "orders")
}

pub fn spec(ips: &[&str]) -> ClusterSpec {
    ClusterSpec::new(key(), ips)
}

pub fn validator() -> SpecValidator {
    SpecValidator::new(Arc::new(ReservedParameters::standard().unwrap()))
}
