//! Predicate polling engine
//!
//! Generic blocking wait for a boolean condition evaluated against
//! repeatedly-refetched state. Decouples the business condition (a pure
//! function over a snapshot) from the polling mechanics (cadence,
//! backoff, timeout). Used for "wait until running", "wait until the
//! disk's users list clears", and operation polling cadence.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::{Duration, Instant};

/// Floor on the poll interval. Whatever the backoff configuration says,
/// the loop never spins faster than this.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Transient fetch failures tolerated in a row before surfacing.
const MAX_TRANSIENT_FAILURES: u32 = 3;

/// Delay policy between polls.
#[derive(Debug, Clone, Copy)]
pub enum Backoff {
    /// Same delay every attempt.
    Fixed(Duration),
    /// Delay grows by `multiplier` each attempt, capped at `cap`.
    Exponential {
        initial: Duration,
        cap: Duration,
        multiplier: u32,
    },
}

impl Backoff {
    /// Delay before the poll following `attempt` (0-based), clamped to
    /// [`MIN_POLL_INTERVAL`].
    pub fn delay(&self, attempt: u32) -> Duration {
        let raw = match *self {
            Backoff::Fixed(d) => d,
            Backoff::Exponential {
                initial,
                cap,
                multiplier,
            } => {
                let factor = multiplier.saturating_pow(attempt.min(16));
                initial.saturating_mul(factor).min(cap)
            }
        };
        raw.max(MIN_POLL_INTERVAL)
    }
}

/// Timeout and cadence for one wait.
#[derive(Debug, Clone, Copy)]
pub struct WaitOptions {
    pub timeout: Duration,
    pub backoff: Backoff,
}

impl WaitOptions {
    pub fn new(timeout: Duration, backoff: Backoff) -> Self {
        Self { timeout, backoff }
    }

    /// Fixed-interval wait.
    pub fn fixed(timeout: Duration, interval: Duration) -> Self {
        Self::new(timeout, Backoff::Fixed(interval))
    }
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            backoff: Backoff::Exponential {
                initial: Duration::from_secs(1),
                cap: Duration::from_secs(10),
                multiplier: 2,
            },
        }
    }
}

/// Poll `fetch` until `predicate` holds for the fetched snapshot, and
/// return that snapshot.
///
/// The predicate is evaluated against a fresh fetch before any sleep, so
/// an already-true condition returns immediately. Transient fetch errors
/// are retried in place up to a bounded count; other errors surface
/// unmodified. Exceeding the timeout fails with [`Error::WaitTimeout`]
/// (remote state is untouched, only the wait stops).
pub async fn wait_for<T, F, Fut, P>(mut fetch: F, predicate: P, opts: &WaitOptions) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&T) -> bool,
{
    let started = Instant::now();
    let mut attempt: u32 = 0;
    let mut failures: u32 = 0;

    loop {
        match fetch().await {
            Ok(snapshot) => {
                failures = 0;
                if predicate(&snapshot) {
                    return Ok(snapshot);
                }
            }
            Err(e) if e.is_transient() && failures + 1 < MAX_TRANSIENT_FAILURES => {
                failures += 1;
                tracing::warn!("transient fetch failure ({failures}), retrying: {e}");
            }
            Err(e) => return Err(e),
        }

        let waited = started.elapsed();
        if waited >= opts.timeout {
            return Err(Error::WaitTimeout { waited });
        }

        tokio::time::sleep(opts.backoff.delay(attempt)).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiErrorPayload;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn true_on_first_check_returns_without_sleeping() {
        let opts = WaitOptions::fixed(Duration::from_secs(10), Duration::from_secs(5));
        let started = Instant::now();

        let value = wait_for(|| async { Ok(42u32) }, |v| *v == 42, &opts)
            .await
            .unwrap();

        assert_eq!(value, 42);
        // With a 5s interval, any sleep at all would blow way past this.
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn polls_until_predicate_holds() {
        let calls = Arc::new(AtomicU32::new(0));
        let opts = WaitOptions::fixed(Duration::from_secs(10), Duration::from_millis(100));

        let fetch_calls = calls.clone();
        let value = wait_for(
            move || {
                let calls = fetch_calls.clone();
                async move { Ok(calls.fetch_add(1, Ordering::SeqCst) + 1) }
            },
            |v| *v >= 3,
            &opts,
        )
        .await
        .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn never_true_times_out() {
        let opts = WaitOptions::fixed(Duration::from_millis(300), Duration::from_millis(100));
        let result = wait_for(|| async { Ok(1u32) }, |_| false, &opts).await;
        assert!(matches!(result, Err(Error::WaitTimeout { .. })));
    }

    #[tokio::test]
    async fn transient_errors_are_retried_then_surface() {
        let calls = Arc::new(AtomicU32::new(0));
        let opts = WaitOptions::fixed(Duration::from_secs(5), Duration::from_millis(100));

        let fetch_calls = calls.clone();
        let result: Result<u32> = wait_for(
            move || {
                let calls = fetch_calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Api {
                        status: 503,
                        payload: ApiErrorPayload::default(),
                    })
                }
            },
            |_| true,
            &opts,
        )
        .await;

        assert!(matches!(result, Err(Error::Api { status: 503, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), MAX_TRANSIENT_FAILURES);
    }

    #[tokio::test]
    async fn non_transient_errors_surface_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let opts = WaitOptions::fixed(Duration::from_secs(5), Duration::from_millis(100));

        let fetch_calls = calls.clone();
        let result: Result<u32> = wait_for(
            move || {
                let calls = fetch_calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Error::NotFound {
                        resource: "vm-1".to_string(),
                    })
                }
            },
            |_| true,
            &opts,
        )
        .await;

        assert!(matches!(result, Err(Error::NotFound { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let backoff = Backoff::Exponential {
            initial: Duration::from_millis(500),
            cap: Duration::from_secs(4),
            multiplier: 2,
        };
        assert_eq!(backoff.delay(0), Duration::from_millis(500));
        assert_eq!(backoff.delay(1), Duration::from_secs(1));
        assert_eq!(backoff.delay(3), Duration::from_secs(4));
        assert_eq!(backoff.delay(30), Duration::from_secs(4));
    }

    #[test]
    fn backoff_never_drops_below_floor() {
        let backoff = Backoff::Fixed(Duration::from_millis(1));
        assert_eq!(backoff.delay(0), MIN_POLL_INTERVAL);
    }
}
