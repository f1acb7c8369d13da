//! Generic "wait until predicate holds on re-fetched state"

use super::policy::RetryPolicy;
use super::sleeper::Sleeper;
use std::future::Future;

/// Why a wait did not reach the expected state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitError<T, E> {
    /// Budget exhausted. `last` is the most recent successfully fetched
    /// value, if any attempt succeeded.
    Exhausted { last: Option<T>, attempts: u32 },
    /// The final attempt failed to fetch and no value ever satisfied the
    /// predicate.
    Fetch(E),
}

/// Poll `fetch` until `done` holds, sleeping `policy.interval` between
/// attempts.
///
/// Fetch failures are treated as transient and retried within the same
/// budget. No sleep happens after the last attempt.
pub async fn wait_until<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    mut fetch: F,
    mut done: P,
) -> Result<T, WaitError<T, E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&T) -> bool,
{
    let mut last = None;
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts {
        match fetch().await {
            Ok(value) => {
                if done(&value) {
                    return Ok(value);
                }
                last = Some(value);
                last_error = None;
            }
            Err(e) => last_error = Some(e),
        }

        if attempt < policy.max_attempts {
            sleeper.sleep(policy.interval).await;
        }
    }

    match last_error {
        Some(e) => Err(WaitError::Fetch(e)),
        None => Err(WaitError::Exhausted {
            last,
            attempts: policy.max_attempts,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::VirtualSleeper;
    use std::cell::Cell;
    use std::time::Duration;

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(Duration::from_secs(10), attempts)
    }

    #[tokio::test]
    async fn test_returns_first_matching_value() {
        let sleeper = VirtualSleeper::new();
        let counter = Cell::new(0u32);

        let result: Result<u32, WaitError<u32, ()>> = wait_until(
            &policy(5),
            &sleeper,
            || {
                counter.set(counter.get() + 1);
                let v = counter.get();
                async move { Ok(v) }
            },
            |v| *v == 3,
        )
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(sleeper.sleep_count(), 2);
        assert_eq!(sleeper.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_exhausted_reports_last_value() {
        let sleeper = VirtualSleeper::new();

        let result: Result<&str, WaitError<&str, ()>> =
            wait_until(&policy(3), &sleeper, || async { Ok("standby") }, |s| *s == "primary")
                .await;

        assert_eq!(
            result,
            Err(WaitError::Exhausted {
                last: Some("standby"),
                attempts: 3
            })
        );
        // No sleep after the final attempt.
        assert_eq!(sleeper.sleep_count(), 2);
    }

    #[tokio::test]
    async fn test_fetch_errors_are_retried() {
        let sleeper = VirtualSleeper::new();
        let counter = Cell::new(0u32);

        let result: Result<u32, WaitError<u32, String>> = wait_until(
            &policy(4),
            &sleeper,
            || {
                counter.set(counter.get() + 1);
                let v = counter.get();
                async move {
                    if v < 3 {
                        Err(format!("probe failed {v}"))
                    } else {
                        Ok(v)
                    }
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result, Ok(3));
    }

    #[tokio::test]
    async fn test_final_fetch_error_surfaces() {
        let sleeper = VirtualSleeper::new();

        let result: Result<u32, WaitError<u32, &str>> =
            wait_until(&policy(2), &sleeper, || async { Err("unreachable") }, |_| true).await;

        assert_eq!(result, Err(WaitError::Fetch("unreachable")));
    }
}
