//! Collaborators shared by every pass

use crate::instance::{InstanceChannel, InstanceController};
use crate::model::{ClusterSpec, SpecValidator};
use crate::observability::EventRecorder;
use crate::platform::{ClusterStatusStore, Orchestrator};
use crate::retry::{RetryPolicy, Sleeper};
use std::sync::Arc;

/// Everything a [`super::TopologyReconciler`] talks to.
#[derive(Clone)]
pub struct ReconcileContext {
    pub orchestrator: Arc<dyn Orchestrator>,
    pub channel: Arc<dyn InstanceChannel>,
    pub store: Arc<dyn ClusterStatusStore>,
    pub events: Arc<dyn EventRecorder>,
    pub sleeper: Arc<dyn Sleeper>,
    pub validator: SpecValidator,
    /// Budget of instance-level waits (start, stop, notify, build).
    pub instance_retry: RetryPolicy,
    /// Budget of status-write conflict retries and write verification.
    pub status_retry: RetryPolicy,
    /// Block until a status write is observed back.
    pub verify_status_writes: bool,
}

impl ReconcileContext {
    /// Instance controller for one cluster.
    pub fn controller(&self, spec: &ClusterSpec) -> InstanceController {
        InstanceController::new(
            self.channel.clone(),
            self.sleeper.clone(),
            self.instance_retry,
            spec.replication_port(),
        )
    }

    /// Budget of unit-level waits, derived from the cluster schedule.
    pub fn unit_retry(&self, spec: &ClusterSpec) -> RetryPolicy {
        let schedule = &spec.topology.schedule;
        RetryPolicy::from_timeout(schedule.process_timeout(), schedule.poll_interval())
    }
}
