//! Orchestration Platform Seams
//!
//! The reconciler depends on the container platform only through:
//!
//! - [`Orchestrator`]: find/get/delete/recreate compute units, write the
//!   per-unit [`InstanceMeta`] record, manage auxiliary resources
//! - [`ClusterStatusStore`]: status persistence with server-side
//!   optimistic concurrency
//! - [`SpecSource`]: the declarative cluster objects to reconcile
//!
//! Provisioning from a declarative template, schema defaulting and
//! manifest rendering stay on the platform side.

mod errors;
mod orchestrator;
mod store;

pub use errors::{PlatformError, PlatformResult};
pub use orchestrator::{
    wait_unit_running, AuxiliaryKind, InstanceMeta, InstanceUnit, Orchestrator, SpecSource, UnitPhase,
    UnitRole, UnitTemplate,
};
pub use store::{update_status, ClusterStatusStore, VersionedStatus};
