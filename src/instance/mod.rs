//! Instance Subsystem
//!
//! One database instance runs inside one compute unit and is addressed by
//! its IP. This module owns everything the reconciler knows about a single
//! instance:
//!
//! - [`DBState`]: immutable health/role snapshot decoded from a status probe
//! - [`Lsn`]: comparable replication position with deterministic tie-break
//! - [`InstanceChannel`]: the in-unit exec/probe collaborator
//! - [`InstanceController`]: imperative operations, each followed by a
//!   bounded wait for the expected state transition
//!
//! Commands are fire-and-observe. A successful `exec` only means the
//! command was accepted; the controller confirms the outcome by
//! re-probing.

mod channel;
mod controller;
mod errors;
mod lsn;
mod state;

pub use channel::{statements, InstanceChannel, InstanceCommand, NotifyRole, ShutdownMode, StartMode};
pub use controller::InstanceController;
pub use errors::{InstanceError, InstanceResult};
pub use lsn::Lsn;
pub use state::{DBState, DbRole, TaskStatus};
