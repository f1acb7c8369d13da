//! Operator Scheduling
//!
//! Each round lists the cluster objects, keeps those owned by this
//! replica, and hands every one that is not already being reconciled to
//! a bounded worker pool. A pass that exceeds the pass timeout is dropped
//! and picked up again by a later round.

use super::config::OperatorConfig;
use super::errors::OperatorResult;
use super::shard::owns;
use crate::model::{ClusterKey, ClusterState};
use crate::platform::SpecSource;
use crate::reconcile::{ReconcileError, ReconcileResult, TopologyReconciler};
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

/// Result of one pass run by the pool.
#[derive(Debug)]
pub struct PassOutcome {
    pub key: ClusterKey,
    pub result: ReconcileResult<ClusterState>,
}

/// Counters of one scheduling round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundSummary {
    /// Clusters owned by this replica.
    pub owned: usize,
    /// Passes started.
    pub dispatched: usize,
    /// Owned clusters skipped because a pass was still running.
    pub skipped_in_flight: usize,
    pub succeeded: usize,
    pub failed: usize,
}

type InFlight = Arc<Mutex<HashSet<ClusterKey>>>;

/// Marks a cluster as being reconciled for as long as it lives.
struct InFlightGuard {
    set: InFlight,
    key: ClusterKey,
}

impl InFlightGuard {
    fn acquire(set: &InFlight, key: &ClusterKey) -> Option<Self> {
        let inserted = match set.lock() {
            Ok(mut guard) => guard.insert(key.clone()),
            Err(poisoned) => poisoned.into_inner().insert(key.clone()),
        };
        inserted.then(|| Self {
            set: set.clone(),
            key: key.clone(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        match self.set.lock() {
            Ok(mut guard) => guard.remove(&self.key),
            Err(poisoned) => poisoned.into_inner().remove(&self.key),
        };
    }
}

/// Schedules reconciliation passes over every owned cluster.
pub struct Operator {
    config: OperatorConfig,
    reconciler: Arc<TopologyReconciler>,
    source: Arc<dyn SpecSource>,
    permits: Arc<Semaphore>,
    in_flight: InFlight,
}

impl Operator {
    pub fn new(config: OperatorConfig, reconciler: Arc<TopologyReconciler>, source: Arc<dyn SpecSource>) -> Self {
        let permits = Arc::new(Semaphore::new(config.workers.max(1)));
        Self {
            config,
            reconciler,
            source,
            permits,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    /// Clusters with a pass currently running.
    pub fn in_flight(&self) -> usize {
        match self.in_flight.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// One scheduling round, waiting for every pass it started.
    pub async fn run_once(&self) -> OperatorResult<RoundSummary> {
        let mut tasks = JoinSet::new();
        let mut summary = self.dispatch(&mut tasks).await?;
        while let Some(joined) = tasks.join_next().await {
            record(&mut summary, joined);
        }
        info!(
            owned = summary.owned,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "round finished"
        );
        Ok(summary)
    }

    /// Schedule a round every resync interval until `shutdown` resolves,
    /// then wait for the passes still running.
    pub async fn run<F>(&self, shutdown: F) -> OperatorResult<()>
    where
        F: Future<Output = ()>,
    {
        let mut tasks = JoinSet::new();
        let mut ticker = tokio::time::interval(self.config.resync_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            shard = self.config.shard_index,
            shards = self.config.shard_count,
            workers = self.config.workers,
            "operator started"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    match self.dispatch(&mut tasks).await {
                        Ok(round) => debug!(dispatched = round.dispatched, skipped = round.skipped_in_flight, "round dispatched"),
                        Err(e) => warn!(error = %e, "round skipped"),
                    }
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    record(&mut RoundSummary::default(), joined);
                }
            }
        }

        info!(in_flight = tasks.len(), "shutting down");
        while let Some(joined) = tasks.join_next().await {
            record(&mut RoundSummary::default(), joined);
        }
        Ok(())
    }

    /// Start a pass for every owned cluster that is not in flight.
    async fn dispatch(&self, tasks: &mut JoinSet<PassOutcome>) -> OperatorResult<RoundSummary> {
        let specs = self.source.list_specs().await?;
        let mut summary = RoundSummary::default();
        let timeout = self.config.pass_timeout();

        for spec in specs {
            if !owns(&spec.key, self.config.shard_index, self.config.shard_count) {
                continue;
            }
            summary.owned += 1;

            let Some(guard) = InFlightGuard::acquire(&self.in_flight, &spec.key) else {
                debug!(cluster = %spec.key, "pass still running, skipped");
                summary.skipped_in_flight += 1;
                continue;
            };

            let reconciler = self.reconciler.clone();
            let permits = self.permits.clone();
            tasks.spawn(async move {
                let _guard = guard;
                let _permit = permits.acquire_owned().await.ok();

                let result = match tokio::time::timeout(timeout, reconciler.reconcile(&spec)).await {
                    Ok(result) => result.map(|status| status.state),
                    Err(_) => Err(ReconcileError::PassTimeout {
                        secs: timeout.as_secs(),
                    }),
                };
                PassOutcome { key: spec.key, result }
            });
            summary.dispatched += 1;
        }
        Ok(summary)
    }
}

fn record(summary: &mut RoundSummary, joined: Result<PassOutcome, JoinError>) {
    match joined {
        Ok(PassOutcome { key, result: Ok(state) }) => {
            summary.succeeded += 1;
            debug!(cluster = %key, state = %state, "pass succeeded");
        }
        Ok(PassOutcome { key, result: Err(e) }) => {
            summary.failed += 1;
            if e.is_fatal() {
                error!(cluster = %key, error = %e, "pass failed");
            } else {
                warn!(cluster = %key, error = %e, class = %e.class(), "pass failed");
            }
        }
        Err(e) => {
            summary.failed += 1;
            error!(error = %e, "pass panicked or was cancelled");
        }
    }
}
