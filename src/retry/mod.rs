//! Bounded waiting
//!
//! Every imperative step against an instance or a compute unit is
//! fire-and-observe: the command is accepted, then the real outcome is
//! confirmed by re-fetching state until a predicate holds or the retry
//! budget is exhausted.
//!
//! Waiting never calls `tokio::time::sleep` directly. A [`Sleeper`] is
//! injected so tests can run the same loops on virtual time.

mod policy;
mod sleeper;
mod wait;

pub use policy::{RetryPolicy, RetrySettings};
pub use sleeper::{NoopSleeper, Sleeper, TokioSleeper, VirtualSleeper};
pub use wait::{wait_until, WaitError};
