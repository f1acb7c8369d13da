//! In-Memory Simulation
//!
//! A deterministic stand-in for the orchestration platform, the instance
//! channel, the status store and the spec source. Integration tests and
//! the `simulate` command run the real reconciler against it.

mod instance;
mod platform;
mod scenario;

pub use instance::{format_lsn, SimInstance, SimRole};
pub use platform::{RemoteSite, SimCall, SimPlatform};
pub use scenario::{simulate, PassReport, Scenario, ScenarioError, SimReport};
