//! Restore Tests

mod common;

use clusterkeeper::instance::InstanceError;
use clusterkeeper::model::{ClusterState, RestorePhase};
use clusterkeeper::observability::ClusterEvent;
use clusterkeeper::reconcile::ReconcileError;
use common::{Harness, A, B, C};

const BACKUP: &str = "backup-2024-01-01.tar";

#[tokio::test]
async fn test_restore_into_primary_then_rebuild_standbys() {
    let (h, mut spec) = Harness::converged(&[A, B, C]).await;
    spec.restore_file = Some(BACKUP.to_string());

    let status = h.pass(&spec).await.unwrap();

    assert_eq!(status.restore_phase, RestorePhase::Succeeded);
    assert_eq!(status.state, ClusterState::Ready);
    assert_eq!(status.primary, A);

    let restored = h.sim.instance(A).unwrap().lsn;
    assert!(restored > 100);
    assert_eq!(h.sim.instance(B).unwrap().lsn, restored);
    assert_eq!(h.sim.instance(C).unwrap().lsn, restored);

    assert_eq!(h.commands_to(A)[..3], ["stop", "restore", "start_primary"]);
    assert_eq!(h.count(ClusterEvent::Restore), 1);
    assert_eq!(h.count(ClusterEvent::Basebackup), 2);
}

/// The same backup is not restored twice.
#[tokio::test]
async fn test_restore_happens_once() {
    let (h, mut spec) = Harness::converged(&[A, B]).await;
    spec.restore_file = Some(BACKUP.to_string());
    h.pass(&spec).await.unwrap();
    h.sim.clear_journal();

    let status = h.pass(&spec).await.unwrap();

    assert!(h.sim.commands().is_empty());
    assert_eq!(status.restore_phase, RestorePhase::Succeeded);
    assert_eq!(h.count(ClusterEvent::Restore), 1);
}

/// An unusable backup fails the restore and is not retried.
#[tokio::test]
async fn test_failed_restore_consumes_request() {
    let (h, mut spec) = Harness::converged(&[A, B]).await;
    h.sim.update_instance(A, |i| i.fail_restore = true);
    spec.restore_file = Some(BACKUP.to_string());

    let err = h.pass(&spec).await.unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::Instance(InstanceError::RestoreFailed { ref ip, .. }) if ip == A
    ));
    assert!(!err.is_fatal());

    let status = h.status();
    assert_eq!(status.restore_phase, RestorePhase::Failed);
    assert_eq!(status.state, ClusterState::Restore);
    assert_eq!(status.spec.unwrap().restore_file.as_deref(), Some(BACKUP));

    h.sim.clear_journal();
    let status = h.pass(&spec).await.unwrap();
    assert!(!h.sim.commands().iter().any(|(_, command)| *command == "restore"));
    assert_eq!(status.state, ClusterState::Ready);
    assert_eq!(h.count(ClusterEvent::Restore), 1);
}
