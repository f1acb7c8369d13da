//! Cluster Data Model
//!
//! - [`ClusterSpec`] / [`DesiredTopology`]: what the user asked for
//! - [`ObservedStatus`]: what the last pass saw and decided
//! - [`SpecValidator`]: invariant checks on a spec and on spec changes
//! - [`SpecDiff`]: typed "what changed" between two specs

mod diff;
mod errors;
mod spec;
mod status;
mod validation;

pub use diff::SpecDiff;
pub use errors::{ValidationError, ValidationResult};
pub use spec::{
    ClusterKey, ClusterSpec, DesiredTopology, InstanceSpec, Resources, ScheduleConfig, ServiceSpec,
    SiteRole,
};
pub use status::{ClusterState, ConditionStatus, Conditions, ObservedStatus, RestorePhase};
pub use validation::{ReservedParameters, SpecValidator, MIN_CPU_MILLIS, MIN_MEMORY_MIB, MIN_STORAGE_GIB};
