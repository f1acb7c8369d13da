//! Cluster Status Store
//!
//! Status is written with server-side optimistic concurrency. Writers
//! go through [`update_status`], which re-reads and re-applies its
//! mutation on every conflict, so a write is never based on a stale copy.

use super::errors::{PlatformError, PlatformResult};
use crate::model::{ClusterKey, ObservedStatus};
use crate::retry::{wait_until, RetryPolicy, Sleeper, WaitError};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

/// A status record together with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedStatus {
    pub version: u64,
    pub status: ObservedStatus,
}

/// Persistence for [`ObservedStatus`].
#[async_trait]
pub trait ClusterStatusStore: Send + Sync {
    /// Current record, `None` if the cluster never had a status.
    async fn get_status(&self, cluster: &ClusterKey) -> PlatformResult<Option<VersionedStatus>>;

    /// Write `status` if the stored version still equals `expected`
    /// (`None`: no record may exist yet). Returns the new version.
    async fn put_status(
        &self,
        cluster: &ClusterKey,
        status: &ObservedStatus,
        expected: Option<u64>,
    ) -> PlatformResult<u64>;
}

/// Read-modify-write `mutate` into the stored status.
///
/// Conflicts are retried against a freshly read copy within `policy`.
/// With `verify`, the call additionally polls until the written version
/// is observed back. Returns the status as written.
pub async fn update_status<F>(
    store: &dyn ClusterStatusStore,
    sleeper: &dyn Sleeper,
    policy: &RetryPolicy,
    cluster: &ClusterKey,
    verify: bool,
    mut mutate: F,
) -> PlatformResult<ObservedStatus>
where
    F: FnMut(&mut ObservedStatus) + Send,
{
    let mut attempt = 0;
    let (version, written) = loop {
        attempt += 1;
        let current = store.get_status(cluster).await?;
        let (expected, mut status) = match current {
            Some(v) => (Some(v.version), v.status),
            None => (None, ObservedStatus::default()),
        };

        mutate(&mut status);
        status.last_update = Some(Utc::now());

        match store.put_status(cluster, &status, expected).await {
            Ok(version) => break (version, status),
            Err(e) if e.is_conflict() && attempt < policy.max_attempts => {
                debug!(cluster = %cluster, attempt, "status write conflict, retrying");
                sleeper.sleep(policy.interval).await;
            }
            Err(e) => {
                warn!(cluster = %cluster, attempt, error = %e, "status write failed");
                return Err(e);
            }
        }
    };

    if verify {
        verify_written(store, sleeper, policy, cluster, version).await?;
    }
    Ok(written)
}

async fn verify_written(
    store: &dyn ClusterStatusStore,
    sleeper: &dyn Sleeper,
    policy: &RetryPolicy,
    cluster: &ClusterKey,
    version: u64,
) -> PlatformResult<()> {
    let observed = wait_until(
        policy,
        sleeper,
        || store.get_status(cluster),
        |current| current.as_ref().is_some_and(|v| v.version >= version),
    )
    .await;

    match observed {
        Ok(_) => Ok(()),
        Err(WaitError::Exhausted { last, .. }) => Err(PlatformError::Unavailable(format!(
            "status version {version} of {cluster} not observed (last seen {:?})",
            last.flatten().map(|v| v.version)
        ))),
        Err(WaitError::Fetch(e)) => Err(e),
    }
}
