//! Topology Convergence Tests
//!
//! Steady-state idempotence, cleanup of stale instances, rolling upgrade,
//! standby sites, basebackup failures and recreation of lost resources.

mod common;

use clusterkeeper::instance::InstanceError;
use clusterkeeper::model::{ClusterSpec, ClusterState, SiteRole};
use clusterkeeper::observability::ClusterEvent;
use clusterkeeper::platform::{AuxiliaryKind, Orchestrator, UnitTemplate};
use clusterkeeper::reconcile::ReconcileError;
use clusterkeeper::sim::{RemoteSite, SimCall, SimInstance, SimRole};
use common::{key, spec, Harness, A, B, C};

const REMOTE: &str = "10.9.0.1";

// =============================================================================
// Steady State
// =============================================================================

/// A converged cluster sees no commands, only the status write.
#[tokio::test]
async fn test_converged_pass_is_idempotent() {
    let (h, spec) = Harness::converged(&[A, B, C]).await;
    let before = h.status();

    let after = h.pass(&spec).await.unwrap();

    assert!(h.sim.commands().is_empty());
    assert_eq!(h.sim.journal(), vec![SimCall::PutStatus { state: ClusterState::Ready }]);
    assert!(before.same_content(&after));
    assert_eq!(h.count(ClusterEvent::Ready), 1);
}

/// Conflicting status writes are retried against a fresh copy.
#[tokio::test]
async fn test_status_conflicts_are_retried() {
    let (h, spec) = Harness::converged(&[A, B]).await;
    let slept = h.sleeper.elapsed();
    h.sim.inject_status_conflicts(2);

    let status = h.pass(&spec).await.unwrap();

    assert_eq!(status.state, ClusterState::Ready);
    assert_eq!(h.status().state, ClusterState::Ready);
    assert!(h.sleeper.elapsed() > slept);
}

// =============================================================================
// Cleanup
// =============================================================================

/// Removing the primary's IP moves the primary away before its unit is
/// deleted.
#[tokio::test]
async fn test_cleanup_switches_over_before_deleting_primary() {
    let (h, _) = Harness::converged(&[A, B, C]).await;
    assert!(h.status().in_sync_set(B));
    let shrunk = spec(&[B, C]);

    let status = h.pass(&shrunk).await.unwrap();

    let switchover = h
        .position(|c| matches!(c, SimCall::Exec { ip, command: "switchover" } if ip == B))
        .unwrap();
    let deleted = h
        .position(|c| matches!(c, SimCall::DeleteUnit { ip } if ip == A))
        .unwrap();
    assert!(switchover < deleted);
    assert_eq!(h.commands_to(A).first(), Some(&"restart"));

    assert_eq!(status.primary, B);
    assert_eq!(status.state, ClusterState::Ready);
    assert!(h.sim.unit(A).is_none());
    assert!(h.sim.db_state(C).unwrap().is_standby_normal());
    assert_eq!(h.count(ClusterEvent::Update), 1);
    assert_eq!(h.count(ClusterEvent::Switchover), 1);
    assert_eq!(h.count(ClusterEvent::Cleanup), 1);
    assert_eq!(h.count(ClusterEvent::Ready), 2);
}

/// A stale standby is simply deleted.
#[tokio::test]
async fn test_cleanup_deletes_stale_standby() {
    let (h, _) = Harness::converged(&[A, B, C]).await;

    let status = h.pass(&spec(&[A, B])).await.unwrap();

    assert_eq!(status.primary, A);
    assert!(h.sim.unit(C).is_none());
    assert!(h.commands_to(C).is_empty());
    assert_eq!(h.count(ClusterEvent::Switchover), 0);
    assert_eq!(h.count(ClusterEvent::Cleanup), 1);
}

// =============================================================================
// Rolling Upgrade
// =============================================================================

/// Standbys are rebuilt first; the primary only after handing over.
#[tokio::test]
async fn test_rolling_upgrade_rebuilds_primary_last() {
    let (h, mut spec) = Harness::converged(&[A, B, C]).await;
    spec.image = "database:2".to_string();

    let status = h.pass(&spec).await.unwrap();

    let recreated: Vec<String> = h
        .sim
        .journal()
        .into_iter()
        .filter_map(|c| match c {
            SimCall::RecreateUnit { ip } => Some(ip),
            _ => None,
        })
        .collect();
    assert_eq!(recreated, vec![B, C, A]);

    let switchover = h
        .position(|c| matches!(c, SimCall::Exec { command: "switchover", .. }))
        .unwrap();
    let primary_rebuilt = h
        .position(|c| matches!(c, SimCall::RecreateUnit { ip } if ip == A))
        .unwrap();
    assert!(switchover < primary_rebuilt);

    assert_eq!(status.primary, B);
    assert_eq!(status.state, ClusterState::Ready);
    for ip in [A, B, C] {
        assert_eq!(h.sim.unit(ip).unwrap().template, UnitTemplate::for_spec(&spec));
    }
    assert_eq!(h.count(ClusterEvent::Upgrade), 3);
    assert_eq!(h.count(ClusterEvent::Switchover), 1);
}

/// A single instance has nobody to hand over to and is upgraded in place.
#[tokio::test]
async fn test_single_instance_upgraded_in_place() {
    let (h, mut spec) = Harness::converged(&[A]).await;
    spec.resources.memory_mib = 4096;

    let status = h.pass(&spec).await.unwrap();

    assert_eq!(status.primary, A);
    assert_eq!(status.state, ClusterState::Ready);
    assert!(h.commands_to(A).contains(&"start_primary"));
    assert_eq!(h.sim.instance(A).unwrap().role, SimRole::Primary);
    assert_eq!(h.count(ClusterEvent::Upgrade), 1);
    assert_eq!(h.count(ClusterEvent::Switchover), 0);
}

// =============================================================================
// Standby Site
// =============================================================================

fn standby_site(ips: &[&str]) -> ClusterSpec {
    let mut spec = spec(ips);
    spec.topology.local_role = SiteRole::StandbySite;
    spec.topology.remote_ips = vec![REMOTE.to_string()];
    spec
}

/// Empty instances on a standby site are built from the remote site, then
/// from each other. No primary is ever elected.
#[tokio::test]
async fn test_standby_site_bootstraps_from_remote() {
    let spec = standby_site(&[A, B]);
    let h = Harness::seeded(&spec, vec![(A, SimInstance::empty()), (B, SimInstance::empty())]);
    h.sim.set_remote(RemoteSite { up: true, lsn: 700 });

    let status = h.pass(&spec).await.unwrap();

    let messages: Vec<String> = h
        .events
        .records()
        .into_iter()
        .filter(|r| r.event == ClusterEvent::Basebackup)
        .map(|r| r.message)
        .collect();
    assert_eq!(
        messages,
        vec![format!("{A} rebuilt from {REMOTE}"), format!("{B} rebuilt from {A}")]
    );

    assert!(status.primary.is_empty());
    assert_eq!(status.state, ClusterState::Ready);
    for ip in [A, B] {
        assert_eq!(h.sim.instance(ip).unwrap().lsn, 700);
        assert!(h.sim.db_state(ip).unwrap().is_standby_normal());
    }
    assert_eq!(h.count(ClusterEvent::Promote), 0);
}

/// A primary on a standby site is demoted back to standby.
#[tokio::test]
async fn test_standby_site_demotes_rogue_primary() {
    let spec = standby_site(&[A, B]);
    let h = Harness::seeded(&spec, vec![(A, SimInstance::standby(10)), (B, SimInstance::standby(10))]);
    h.sim.set_remote(RemoteSite { up: true, lsn: 700 });
    h.pass(&spec).await.unwrap();

    h.sim.update_instance(B, |i| i.role = SimRole::Primary);
    let status = h.pass(&spec).await.unwrap();

    assert!(status.primary.is_empty());
    assert_eq!(status.state, ClusterState::Ready);
    assert_eq!(h.sim.instance(B).unwrap().role, SimRole::Standby);
    assert_eq!(h.count(ClusterEvent::Demote), 1);
    assert_eq!(h.count(ClusterEvent::Recover), 1);
}

// =============================================================================
// Replication Bootstrap
// =============================================================================

/// A standby that cannot start is rebuilt; a failed build wipes its data
/// and the next pass rebuilds it from scratch.
#[tokio::test]
async fn test_failed_basebackup_wipes_target() {
    let (h, spec) = Harness::converged(&[A, B, C]).await;
    h.sim.update_instance(C, |i| {
        i.role = SimRole::Stopped;
        i.fail_start = true;
        i.fail_backup = true;
    });

    let err = h.pass(&spec).await.unwrap_err();

    assert!(matches!(
        err,
        ReconcileError::Instance(InstanceError::BackupFailed { ref ip, .. }) if ip == C
    ));
    assert!(!err.is_fatal());
    assert_eq!(h.commands_to(C), vec!["start_standby", "basebackup", "clean_data"]);
    assert!(!h.sim.instance(C).unwrap().has_data);
    assert_eq!(h.status().state, ClusterState::Recover);
    assert_eq!(h.status().primary, A);
    assert_eq!(h.count(ClusterEvent::Basebackup), 0);

    h.sim.update_instance(C, |i| {
        i.fail_start = false;
        i.fail_backup = false;
    });
    let status = h.pass(&spec).await.unwrap();

    assert_eq!(status.state, ClusterState::Ready);
    assert_eq!(h.sim.instance(C).unwrap().lsn, 100);
    assert!(h.sim.db_state(C).unwrap().is_standby_normal());
    assert_eq!(h.count(ClusterEvent::Basebackup), 1);
}

/// A basebackup that never finishes fails the pass but keeps the target's
/// data. The build still running is left alone afterwards.
#[tokio::test]
async fn test_stalled_basebackup_keeps_target_data() {
    let (h, spec) = Harness::converged(&[A, B, C]).await;
    h.sim.update_instance(C, |i| {
        i.role = SimRole::Stopped;
        i.fail_start = true;
        i.stall_backup = true;
    });

    let err = h.pass(&spec).await.unwrap_err();

    assert!(matches!(
        err,
        ReconcileError::Instance(InstanceError::Timeout { ref ip, .. }) if ip == C
    ));
    assert!(!err.is_fatal());
    assert_eq!(h.commands_to(C), vec!["start_standby", "basebackup"]);
    assert!(h.sim.instance(C).unwrap().has_data);
    assert_eq!(h.status().state, ClusterState::Recover);

    h.sim.clear_journal();
    let status = h.pass(&spec).await.unwrap();

    assert!(h.commands_to(C).is_empty());
    assert_eq!(status.state, ClusterState::Recover);
    assert_eq!(status.primary, A);
}

// =============================================================================
// Lost Resources
// =============================================================================

/// A deleted auxiliary resource is recreated and announced.
#[tokio::test]
async fn test_missing_auxiliary_recreated() {
    let (h, spec) = Harness::converged(&[A, B]).await;
    h.sim.remove_auxiliary(&key(), AuxiliaryKind::WriteService);

    let status = h.pass(&spec).await.unwrap();

    assert_eq!(status.state, ClusterState::Ready);
    assert!(h.sim.auxiliary(&key()).contains(&AuxiliaryKind::WriteService));
    let ensured: Vec<SimCall> = h
        .sim
        .journal()
        .into_iter()
        .filter(|c| matches!(c, SimCall::EnsureAuxiliary { .. }))
        .collect();
    assert_eq!(ensured, vec![SimCall::EnsureAuxiliary { kind: AuxiliaryKind::WriteService }]);
    assert_eq!(h.count(ClusterEvent::ResourceRecreated), 1);
    assert_eq!(h.count(ClusterEvent::Recover), 1);
}

/// A lost unit comes back empty and is rebuilt by basebackup.
#[tokio::test]
async fn test_lost_unit_recreated_and_rebuilt() {
    let (h, spec) = Harness::converged(&[A, B, C]).await;
    h.sim.delete_unit(&key(), C).await.unwrap();
    h.sim.clear_journal();

    let status = h.pass(&spec).await.unwrap();

    let recreated = h
        .position(|c| matches!(c, SimCall::RecreateUnit { ip } if ip == C))
        .unwrap();
    let rebuilt = h
        .position(|c| matches!(c, SimCall::Exec { ip, command: "basebackup" } if ip == C))
        .unwrap();
    assert!(recreated < rebuilt);
    assert_eq!(h.sim.instance(C).unwrap().lsn, 100);
    assert_eq!(status.primary, A);
    assert_eq!(status.state, ClusterState::Ready);
    assert_eq!(h.count(ClusterEvent::ResourceRecreated), 1);
    assert_eq!(h.count(ClusterEvent::Basebackup), 1);
}
