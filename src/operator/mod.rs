//! Operator
//!
//! Runs the reconciler over many clusters: configuration, shard
//! ownership across operator replicas, and a bounded worker pool that
//! never runs two passes for the same cluster at once.

mod config;
mod errors;
mod scheduler;
mod shard;

pub use config::OperatorConfig;
pub use errors::{OperatorError, OperatorResult};
pub use scheduler::{Operator, PassOutcome, RoundSummary};
pub use shard::{owns, shard_of};
