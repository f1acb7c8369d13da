//! Spec Validation Tests
//!
//! A new cluster with an invalid spec is never created. An existing one
//! keeps being reconciled against its last valid spec.

mod common;

use clusterkeeper::model::{ClusterState, ValidationError};
use clusterkeeper::observability::ClusterEvent;
use clusterkeeper::reconcile::{ErrorClass, ReconcileError};
use clusterkeeper::sim::{SimCall, SimInstance, SimRole};
use common::{spec, Harness, A, B};

#[tokio::test]
async fn test_invalid_new_cluster_is_not_created() {
    let mut spec = spec(&[A, B]);
    spec.db_config.insert("synchronous_standby_names".into(), "*".into());
    let h = Harness::seeded(&spec, vec![(A, SimInstance::standby(10)), (B, SimInstance::standby(20))]);

    let err = h.pass(&spec).await.unwrap_err();
    assert_eq!(
        err,
        ReconcileError::Invalid(ValidationError::ReservedParameter {
            key: "synchronous_standby_names".into()
        })
    );
    assert_eq!(err.class(), ErrorClass::Validation);

    let status = h.status();
    assert_eq!(status.state, ClusterState::Invalid);
    assert!(status.spec.is_none());
    assert!(h.sim.commands().is_empty());
    assert_eq!(h.count(ClusterEvent::Invalid), 1);
    assert_eq!(h.count(ClusterEvent::Create), 0);

    // The same rejection is not announced twice.
    assert!(h.pass(&spec).await.is_err());
    assert_eq!(h.count(ClusterEvent::Invalid), 1);

    spec.db_config.clear();
    let status = h.pass(&spec).await.unwrap();
    assert_eq!(status.state, ClusterState::Ready);
    assert_eq!(status.primary, B);
    assert_eq!(h.count(ClusterEvent::Create), 1);
}

#[tokio::test]
async fn test_invalid_change_keeps_last_valid_spec() {
    let (h, mut spec) = Harness::converged(&[A, B]).await;
    spec.port = 6432;
    h.sim.update_instance(B, |i| i.role = SimRole::Stopped);

    let status = h.pass(&spec).await.unwrap();

    assert_eq!(status.state, ClusterState::Invalid);
    assert!(status.message.contains("port"));
    assert_eq!(status.spec.as_ref().unwrap().port, 5432);
    assert!(h.sim.db_state(B).unwrap().is_standby_normal());
    assert_eq!(h.count(ClusterEvent::Invalid), 1);

    h.pass(&spec).await.unwrap();
    assert_eq!(h.status().state, ClusterState::Invalid);
    assert_eq!(h.count(ClusterEvent::Invalid), 1);

    spec.port = 5432;
    let status = h.pass(&spec).await.unwrap();
    assert_eq!(status.state, ClusterState::Ready);
    assert!(status.message.is_empty());
    assert_eq!(h.count(ClusterEvent::Ready), 2);
}

#[tokio::test]
async fn test_storage_shrink_rejected() {
    let (h, mut spec) = Harness::converged(&[A, B]).await;
    spec.resources.storage_gib -= 1;

    let status = h.pass(&spec).await.unwrap();

    assert_eq!(status.state, ClusterState::Invalid);
    assert!(h.sim.commands().is_empty());
    assert!(!h.sim.journal().iter().any(|c| matches!(c, SimCall::RecreateUnit { .. })));
}
