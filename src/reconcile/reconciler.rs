//! Topology Reconciler
//!
//! One call to [`TopologyReconciler::reconcile`] is one pass over one
//! cluster:
//!
//! 1. load the persisted status and validate the desired spec
//! 2. honour maintenance mode
//! 3. classify the pass (`Create`, `Update`, `Restore`, `Recover`, steady)
//! 4. converge: units, auxiliary resources, primary, standbys, bootstrap,
//!    configuration, cleanup, upgrade, most-available
//! 5. derive conditions and persist the status
//!
//! Partial progress is never rolled back. A failed pass records its error
//! and the next pass starts again from observation.

use super::context::ReconcileContext;
use super::errors::{ReconcileError, ReconcileResult};
use super::pass::Pass;
use crate::instance::InstanceError;
use crate::model::{ClusterSpec, ClusterState, Conditions, ObservedStatus, RestorePhase, SpecDiff};
use crate::observability::ClusterEvent;
use crate::platform::{update_status, AuxiliaryKind};
use crate::replication::{required_sync_count, MostAvailableAction, SyncStateTracker};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// What the current pass is about, decided before converging.
#[derive(Debug, Clone)]
struct PassPlan {
    state: ClusterState,
    diff: SpecDiff,
    restore_file: Option<String>,
    /// The cluster was `Failed` before this pass.
    failed_before: bool,
    /// Validation message when running on the last valid spec.
    invalid: Option<String>,
}

/// Drives one cluster towards its desired topology.
#[derive(Clone)]
pub struct TopologyReconciler {
    ctx: ReconcileContext,
}

impl TopologyReconciler {
    pub fn new(ctx: ReconcileContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &ReconcileContext {
        &self.ctx
    }

    /// Run one pass for `desired` and return the status as persisted.
    pub async fn reconcile(&self, desired: &ClusterSpec) -> ReconcileResult<ObservedStatus> {
        let span = info_span!("reconcile", cluster = %desired.key, pass_id = %Uuid::new_v4());
        self.run_pass(desired).instrument(span).await
    }

    async fn run_pass(&self, desired: &ClusterSpec) -> ReconcileResult<ObservedStatus> {
        let previous = self
            .ctx
            .store
            .get_status(&desired.key)
            .await?
            .map(|v| v.status)
            .unwrap_or_default();

        // =====================================================================
        // VALIDATION
        // =====================================================================

        let validation = self.ctx.validator.validate(desired).and_then(|()| match &previous.spec {
            Some(last) => self.ctx.validator.validate_change(last, desired),
            None => Ok(()),
        });

        let (spec, invalid) = match (validation, &previous.spec) {
            (Ok(()), _) => (desired.clone(), None),
            (Err(e), None) => return self.reject_new(desired, &previous, e.into()).await,
            (Err(e), Some(last)) => {
                let message = e.to_string();
                warn!(error = %message, "spec rejected, continuing with last valid spec");
                if previous.message != message {
                    self.ctx.events.record(&desired.key, ClusterEvent::Invalid, &message);
                }
                (last.clone(), Some(message))
            }
        };

        // =====================================================================
        // MAINTENANCE
        // =====================================================================

        if spec.maintenance {
            return self.hold_maintenance(&spec, &previous).await;
        }

        // =====================================================================
        // CLASSIFY AND CONVERGE
        // =====================================================================

        let mut pass = Pass::new(&self.ctx, &spec, &previous);
        pass.observe().await?;
        let plan = self.plan(&pass, invalid).await?;

        let mut status = previous.clone();
        if plan.state != previous.state {
            status.state = plan.state;
            match plan.state {
                ClusterState::Create => status.conditions = Conditions::all_false(),
                ClusterState::Update => plan.diff.invalidate(&mut status.conditions),
                _ => {}
            }
            status = self.persist(&spec, &status).await?;
        }

        match self.converge(&mut pass, &plan, &mut status).await {
            Ok(()) => self.finish(&mut pass, &plan, status).await,
            Err(e) => self.fail(&spec, &plan, status, e).await,
        }
    }

    /// Decide what this pass is and announce it.
    async fn plan(&self, pass: &Pass<'_>, invalid: Option<String>) -> ReconcileResult<PassPlan> {
        let previous = pass.previous;
        let spec = pass.spec;
        let diff = previous
            .spec
            .as_ref()
            .map(|last| SpecDiff::between(last, spec))
            .unwrap_or_default();
        let restore_file = spec.restore_file.clone().filter(|_| diff.requires_restore(spec));
        let failed_before = previous.state == ClusterState::Failed;
        let leaving_maintenance = previous.state == ClusterState::Maintain;
        if leaving_maintenance {
            pass.event(ClusterEvent::MaintainDone, "maintenance finished");
        }

        let state = if previous.is_new() {
            pass.event(ClusterEvent::Create, "creating cluster");
            ClusterState::Create
        } else if restore_file.is_some() {
            ClusterState::Restore
        } else if diff.requires_update() {
            let fields = diff.changed_fields().join(", ");
            pass.event(ClusterEvent::Update, &format!("spec changed: {fields}"));
            ClusterState::Update
        } else if leaving_maintenance {
            ClusterState::Recover
        } else if previous.state.is_steady() || failed_before {
            let anomalies = self.anomalies(pass).await?;
            if anomalies.is_empty() {
                previous.state
            } else {
                let message = anomalies.join("; ");
                info!(anomalies = %message, "recovering");
                pass.event(ClusterEvent::Recover, &message);
                ClusterState::Recover
            }
        } else {
            // An earlier pass of the same kind did not finish.
            previous.state
        };

        debug!(state = %state, diff = ?diff.changed_fields(), "pass planned");
        Ok(PassPlan {
            state,
            diff,
            restore_file,
            failed_before,
            invalid,
        })
    }

    /// Steady-state inspection: everything that warrants a `Recover`.
    async fn anomalies(&self, pass: &Pass<'_>) -> ReconcileResult<Vec<String>> {
        let mut found = Vec::new();
        let desired = pass.desired_ips();
        let observed: std::collections::BTreeSet<String> = pass.units.keys().cloned().collect();
        if desired != observed {
            found.push("instance set differs from desired".to_string());
        }

        let primaries = pass.primaries();
        let expected = usize::from(!pass.spec.topology.is_standby_site());
        if primaries.len() != expected {
            found.push(format!("{} primaries, expected {expected}", primaries.len()));
        }

        for ip in &desired {
            let state = pass.state(ip);
            if state.in_maintenance {
                found.push(format!("{ip} in maintenance"));
            } else if !state.is_ready() {
                found.push(format!("{ip} not ready ({state})"));
            }
            if pass.units.get(ip).is_some_and(|u| u.needs_upgrade(pass.spec)) {
                found.push(format!("{ip} needs upgrade"));
            }
        }

        for kind in pass.missing_auxiliary().await? {
            found.push(format!("{kind} missing"));
        }
        Ok(found)
    }

    async fn converge(&self, pass: &mut Pass<'_>, plan: &PassPlan, status: &mut ObservedStatus) -> ReconcileResult<()> {
        pass.ensure_units().await?;
        self.ensure_auxiliary(pass, plan).await?;
        self.clear_maintenance(pass).await?;

        pass.resolve_primary(plan.failed_before).await?;

        if let Some(file) = &plan.restore_file {
            status.restore_phase = RestorePhase::Running;
            *status = self.persist(pass.spec, status).await?;
            match pass.restore(file).await {
                Ok(()) => status.restore_phase = RestorePhase::Succeeded,
                Err(e) => {
                    status.restore_phase = RestorePhase::Failed;
                    if matches!(e, ReconcileError::Instance(InstanceError::RestoreFailed { .. })) {
                        // The backup is unusable; retrying it would loop.
                        status.spec = Some(pass.spec.clone());
                    }
                    return Err(e);
                }
            }
        }

        let queue = pass.converge_standbys().await?;
        pass.bootstrap(queue).await?;
        pass.sync_metadata().await?;
        pass.cleanup().await?;
        pass.rolling_upgrade().await?;
        pass.sync_metadata().await?;

        if self.most_available_applies(pass, plan) {
            self.most_available(pass).await?;
        }

        pass.refresh_all().await
    }

    async fn ensure_auxiliary(&self, pass: &Pass<'_>, plan: &PassPlan) -> ReconcileResult<()> {
        let reapply = pass.previous.is_new() || plan.diff.touches_auxiliary();
        for kind in AuxiliaryKind::ALL {
            let exists = self.ctx.orchestrator.auxiliary_exists(pass.key(), kind).await?;
            if exists && !reapply {
                continue;
            }
            self.ctx.orchestrator.ensure_auxiliary(pass.spec, kind).await?;
            if !exists && !pass.previous.is_new() {
                pass.event(ClusterEvent::ResourceRecreated, &format!("{kind} recreated"));
            }
        }
        Ok(())
    }

    async fn clear_maintenance(&self, pass: &mut Pass<'_>) -> ReconcileResult<()> {
        let flagged: Vec<String> = pass
            .running_ips()
            .into_iter()
            .filter(|ip| pass.state(ip).in_maintenance)
            .collect();
        for ip in flagged {
            let state = pass.controller.set_maintenance(&ip, false).await?;
            pass.states.insert(ip, state);
        }
        Ok(())
    }

    /// Most-available is only tuned on a settled primary site.
    fn most_available_applies(&self, pass: &Pass<'_>, plan: &PassPlan) -> bool {
        !pass.previous.is_new()
            && !matches!(
                plan.state,
                ClusterState::Create | ClusterState::Update | ClusterState::Restore
            )
            && !pass.spec.topology.is_standby_site()
            && pass.primary.is_some()
    }

    async fn most_available(&self, pass: &Pass<'_>) -> ReconcileResult<()> {
        let Some(primary) = pass.primary.as_deref() else {
            return Ok(());
        };
        let topology = &pass.spec.topology;
        let required = required_sync_count(topology.local.len(), topology.remote_ips.len());
        let tracker = SyncStateTracker::new(pass.controller.clone(), self.ctx.sleeper.clone());

        let action = tracker
            .reconcile_most_available(
                primary,
                required,
                topology.schedule.most_available_timeout(),
                topology.schedule.poll_interval(),
            )
            .await?;

        match action {
            MostAvailableAction::TurnedOn => pass.event(
                ClusterEvent::MostAvailableOn,
                &format!("fewer than {required} sync standbys, {primary} no longer waits for them"),
            ),
            MostAvailableAction::TurnedOff => pass.event(
                ClusterEvent::MostAvailableOff,
                &format!("{required} sync standbys back, {primary} waits for them again"),
            ),
            MostAvailableAction::Unchanged | MostAvailableAction::Recovered => {}
        }
        Ok(())
    }

    // =========================================================================
    // OUTCOMES
    // =========================================================================

    /// Derive conditions and persist the result of a completed pass.
    async fn finish(&self, pass: &mut Pass<'_>, plan: &PassPlan, mut status: ObservedStatus) -> ReconcileResult<ObservedStatus> {
        let spec = pass.spec;
        let missing_aux = pass.missing_auxiliary().await?;
        let desired = pass.desired_ips();

        let resources = desired
            .iter()
            .all(|ip| pass.units.get(ip).is_some_and(|u| u.is_running() && !u.needs_upgrade(spec)))
            && pass.stale_ips().is_empty();
        let primary_ok = if spec.topology.is_standby_site() {
            pass.primaries().is_empty()
        } else {
            pass.primary.as_deref().is_some_and(|p| pass.state(p).is_primary_normal())
        };
        let instances = primary_ok && desired.iter().all(|ip| pass.state(ip).is_ready());

        status.conditions = Conditions {
            resource_ready: resources.into(),
            instances_ready: instances.into(),
            service_ready: missing_aux.is_empty().into(),
        };
        status.spec = Some(spec.clone());
        status.instances = pass
            .states
            .iter()
            .map(|(ip, state)| (ip.clone(), state.describe()))
            .collect();
        match pass.primary.as_deref() {
            Some(primary) => {
                status.primary = primary.to_string();
                status.sync_states = pass.live_sync_states(primary).await;
            }
            None if spec.topology.is_standby_site() => {
                status.primary.clear();
                status.sync_states.clear();
            }
            None => {
                // Only a promotion replaces the record of who held the data.
                warn!(last = ?pass.previous.primary(), "no primary reachable, keeping last recorded primary");
            }
        }

        let ready = status.conditions.all_true();
        status.state = match (&plan.invalid, ready) {
            (Some(_), true) => ClusterState::Invalid,
            (None, true) => ClusterState::Ready,
            (_, false) => plan.state,
        };
        status.message = match &plan.invalid {
            Some(message) => message.clone(),
            None if ready => String::new(),
            None => "waiting for instances to become ready".to_string(),
        };

        if status.state == ClusterState::Ready && plan.state != ClusterState::Ready {
            pass.event(ClusterEvent::Ready, "all conditions met");
        }
        info!(state = %status.state, primary = %status.primary, "pass finished");
        self.persist(spec, &status).await
    }

    /// Record a failed pass. Fatal errors mark the cluster `Failed`.
    async fn fail(
        &self,
        spec: &ClusterSpec,
        plan: &PassPlan,
        mut status: ObservedStatus,
        err: ReconcileError,
    ) -> ReconcileResult<ObservedStatus> {
        if err.is_fatal() {
            error!(error = %err, class = %err.class(), "pass failed, automated recovery stopped");
            if !plan.failed_before {
                self.ctx.events.record(&spec.key, ClusterEvent::Failed, &err.to_string());
            }
            status.state = ClusterState::Failed;
            status.primary.clear();
        } else {
            warn!(error = %err, class = %err.class(), "pass failed, retrying next pass");
            status.state = plan.state;
        }
        status.message = err.to_string();

        if let Err(write_err) = self.persist(spec, &status).await {
            warn!(error = %write_err, "cannot record failed pass");
        }
        Err(err)
    }

    /// Persist the status of a new cluster whose spec is invalid.
    async fn reject_new(
        &self,
        desired: &ClusterSpec,
        previous: &ObservedStatus,
        err: ReconcileError,
    ) -> ReconcileResult<ObservedStatus> {
        let message = err.to_string();
        warn!(error = %message, "new cluster rejected");
        if previous.state != ClusterState::Invalid || previous.message != message {
            self.ctx.events.record(&desired.key, ClusterEvent::Invalid, &message);
        }
        let status = ObservedStatus {
            state: ClusterState::Invalid,
            message,
            ..previous.clone()
        };
        self.persist(desired, &status).await?;
        Err(err)
    }

    /// Enter maintenance, or stay in it without touching anything.
    async fn hold_maintenance(&self, spec: &ClusterSpec, previous: &ObservedStatus) -> ReconcileResult<ObservedStatus> {
        if previous.state == ClusterState::Maintain {
            debug!("in maintenance, nothing to do");
            return Ok(previous.clone());
        }

        let mut pass = Pass::new(&self.ctx, spec, previous);
        pass.observe().await?;
        let ips: Vec<String> = pass
            .running_ips()
            .into_iter()
            .filter(|ip| !pass.state(ip).in_maintenance)
            .collect();
        for ip in ips {
            pass.controller.set_maintenance(&ip, true).await?;
        }
        pass.event(ClusterEvent::Maintain, "maintenance started, reconciliation suspended");

        // Only the flag is recorded; other pending changes stay pending.
        let recorded = previous.spec.clone().map(|mut last| {
            last.maintenance = true;
            last
        });
        let status = ObservedStatus {
            spec: recorded,
            state: ClusterState::Maintain,
            message: "maintenance".to_string(),
            ..previous.clone()
        };
        self.persist(spec, &status).await
    }

    async fn persist(&self, spec: &ClusterSpec, status: &ObservedStatus) -> ReconcileResult<ObservedStatus> {
        let written = update_status(
            self.ctx.store.as_ref(),
            self.ctx.sleeper.as_ref(),
            &self.ctx.status_retry,
            &spec.key,
            self.ctx.verify_status_writes,
            |current| *current = status.clone(),
        )
        .await?;
        Ok(written)
    }
}
