//! Retry policy
//!
//! A policy is an attempt budget plus a fixed interval between attempts.
//! There is no exponential backoff: state transitions of a database
//! instance take seconds to minutes and the polling cadence is part of the
//! operational contract.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fixed-interval retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay between two consecutive attempts.
    pub interval: Duration,
    /// Total number of attempts, including the first one. Never zero.
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Create a policy. A zero attempt budget is raised to one.
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Default budget for instance-level waits: 30 attempts, 10s apart.
    pub fn instance_default() -> Self {
        Self::new(Duration::from_secs(10), 30)
    }

    /// Default budget for optimistic status writes.
    pub fn status_default() -> Self {
        Self::new(Duration::from_millis(500), 5)
    }

    /// Derive a policy that polls every `interval` until `timeout` elapses.
    ///
    /// Used for the per-cluster pod-level waits, which are configured as a
    /// timeout in seconds rather than an attempt count.
    pub fn from_timeout(timeout: Duration, interval: Duration) -> Self {
        if interval.is_zero() {
            return Self::new(interval, 1);
        }
        let attempts = timeout.as_millis().div_ceil(interval.as_millis()) + 1;
        Self::new(interval, u32::try_from(attempts).unwrap_or(u32::MAX))
    }

    /// Upper bound on the time spent sleeping under this policy.
    pub fn budget(&self) -> Duration {
        self.interval
            .saturating_mul(self.max_attempts.saturating_sub(1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::instance_default()
    }
}

/// Serialized form of a [`RetryPolicy`] used in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Interval between attempts in milliseconds.
    pub interval_ms: u64,
    /// Total number of attempts.
    pub max_attempts: u32,
}

impl RetrySettings {
    /// Convert into a runtime policy.
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(self.interval_ms), self.max_attempts)
    }
}

impl From<RetryPolicy> for RetrySettings {
    fn from(policy: RetryPolicy) -> Self {
        Self {
            interval_ms: u64::try_from(policy.interval.as_millis()).unwrap_or(u64::MAX),
            max_attempts: policy.max_attempts,
        }
    }
}
