//! Replication Subsystem
//!
//! - [`required_sync_count`]: synchronous quorum size from topology size
//! - [`SyncState`]: standby replication states reported by the primary
//! - [`ReplicationParams`]: per-instance connection parameters and the
//!   `FIRST n (...)` synchronous standby list
//! - [`SyncStateTracker`]: the most-available hysteresis loop

mod params;
mod quorum;
mod sync_state;
mod tracker;

pub use params::{ReplicationParams, SyncStandbyNames, MOST_AVAILABLE_PARAMETER, SYNC_NAMES_PARAMETER};
pub use quorum::{most_available_eligible, required_sync_count};
pub use sync_state::{count_sync, parse_sync_states, SyncMode, SyncState};
pub use tracker::{MostAvailableAction, SyncStateTracker};
