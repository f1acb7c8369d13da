//! Most-Available Tests
//!
//! The primary stops waiting for synchronous standbys only after the sync
//! quorum has been short for the whole grace period, and waits again as
//! soon as the quorum is back.

mod common;

use clusterkeeper::model::ClusterState;
use clusterkeeper::observability::ClusterEvent;
use clusterkeeper::replication::MOST_AVAILABLE_PARAMETER;
use common::{Harness, A, B, C, D};
use std::time::Duration;

fn most_available(h: &Harness) -> Option<String> {
    h.sim.instance(A).unwrap().params.get(MOST_AVAILABLE_PARAMETER).cloned()
}

#[tokio::test]
async fn test_turns_on_after_grace_period_and_off_on_recovery() {
    let (h, spec) = Harness::converged(&[A, B, C, D]).await;
    assert!(h.status().in_sync_set(B));
    assert!(h.status().in_sync_set(C));

    h.sim.update_instance(C, |i| i.lagging = true);
    h.sim.update_instance(D, |i| i.lagging = true);
    let start = h.sleeper.elapsed();

    let status = h.pass(&spec).await.unwrap();
    assert_eq!(status.state, ClusterState::Ready);
    assert_eq!(h.count(ClusterEvent::MostAvailableOn), 1);
    assert!(h.sleeper.elapsed() - start >= Duration::from_secs(60));
    assert_eq!(most_available(&h).as_deref(), Some("on"));

    // Already on: nothing more to do.
    h.pass(&spec).await.unwrap();
    assert_eq!(h.count(ClusterEvent::MostAvailableOn), 1);

    h.sim.update_instance(C, |i| i.lagging = false);
    h.pass(&spec).await.unwrap();
    assert_eq!(h.count(ClusterEvent::MostAvailableOff), 1);
    assert_eq!(most_available(&h).as_deref(), Some("off"));
}

#[tokio::test]
async fn test_met_quorum_never_waits() {
    let (h, spec) = Harness::converged(&[A, B, C, D]).await;
    h.sim.update_instance(D, |i| i.lagging = true);
    let start = h.sleeper.elapsed();

    h.pass(&spec).await.unwrap();

    assert_eq!(h.sleeper.elapsed(), start);
    assert_eq!(h.count(ClusterEvent::MostAvailableOn), 0);
    assert_eq!(most_available(&h), None);
}

/// Most-available is only tuned on a settled cluster, not while an update
/// is being rolled out.
#[tokio::test]
async fn test_not_tuned_during_update() {
    let (h, mut spec) = Harness::converged(&[A, B, C, D]).await;
    h.sim.update_instance(C, |i| i.lagging = true);
    h.sim.update_instance(D, |i| i.lagging = true);
    spec.db_config.insert("work_mem".into(), "64MB".into());

    let status = h.pass(&spec).await.unwrap();

    assert_eq!(status.state, ClusterState::Ready);
    assert_eq!(h.count(ClusterEvent::Update), 1);
    assert_eq!(h.count(ClusterEvent::MostAvailableOn), 0);
    assert_eq!(h.sim.instance(B).unwrap().params["work_mem"], "64MB");
}

#[tokio::test]
async fn test_single_instance_has_nothing_to_relax() {
    let (h, spec) = Harness::converged(&[A]).await;

    h.pass(&spec).await.unwrap();

    assert_eq!(h.count(ClusterEvent::MostAvailableOn), 0);
    assert!(h.sim.commands().is_empty());
}
