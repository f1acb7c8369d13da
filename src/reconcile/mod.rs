//! Topology Reconciliation
//!
//! [`TopologyReconciler`] compares the desired spec of a cluster with the
//! live instances and repairs the difference: primary election,
//! multi-primary repair, standby bootstrap, switchover, cleanup of removed
//! instances, rolling upgrades, restore and the most-available loop.
//!
//! Every repair decision is derived from state observed in the current
//! pass. Nothing remembered from an interrupted pass is trusted.

mod bootstrap;
mod configure;
mod context;
mod election;
mod errors;
mod pass;
mod reconciler;
mod restore;
mod switchover;
mod upgrade;

pub use context::ReconcileContext;
pub use errors::{ErrorClass, ReconcileError, ReconcileResult};
pub use reconciler::TopologyReconciler;
