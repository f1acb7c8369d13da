//! Sleep abstraction for polling loops

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Something that can wait for a duration.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Suspend the caller for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Real wall-clock sleeping on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Returns immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSleeper;

#[async_trait]
impl Sleeper for NoopSleeper {
    async fn sleep(&self, _duration: Duration) {}
}

/// Accumulates requested sleep time without waiting.
///
/// Lets grace-period logic (most-available timeout, pod waits) be tested
/// deterministically: callers observe the virtual time they would have
/// spent.
#[derive(Debug, Default)]
pub struct VirtualSleeper {
    elapsed: Mutex<Duration>,
    sleeps: AtomicU64,
}

impl VirtualSleeper {
    /// Create a sleeper at virtual time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total virtual time slept so far.
    pub fn elapsed(&self) -> Duration {
        match self.elapsed.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Number of sleep calls so far.
    pub fn sleep_count(&self) -> u64 {
        self.sleeps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sleeper for VirtualSleeper {
    async fn sleep(&self, duration: Duration) {
        {
            let mut guard = match self.elapsed.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *guard += duration;
        }
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_virtual_sleeper_accumulates() {
        let sleeper = VirtualSleeper::new();
        sleeper.sleep(Duration::from_secs(10)).await;
        sleeper.sleep(Duration::from_secs(5)).await;

        assert_eq!(sleeper.elapsed(), Duration::from_secs(15));
        assert_eq!(sleeper.sleep_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_sleeper_uses_timer() {
        let start = tokio::time::Instant::now();
        TokioSleeper.sleep(Duration::from_secs(3)).await;
        assert!(start.elapsed() >= Duration::from_secs(3));
    }
}
