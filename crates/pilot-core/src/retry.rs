use std::future::Future;
use std::time::Duration;

use rand::RngExt;
use tracing::{debug, warn};

use pilot_model::{BackoffStrategy, JitterStrategy};

use crate::{CoreError, CoreResult};

/// Bounded retry with backoff around fallible async calls.
///
/// Each attempt runs under `call_timeout`; an elapsed timeout counts as a transient
/// failure. Non-transient errors are returned immediately.
#[derive(Debug, Clone, Copy)]
pub struct Retry {
    strategy: BackoffStrategy,
    call_timeout: Duration,
}

impl Default for Retry {
    fn default() -> Self {
        Self::new(BackoffStrategy::default(), Duration::from_secs(30))
    }
}

impl Retry {
    pub fn new(strategy: BackoffStrategy, call_timeout: Duration) -> Self {
        Self {
            strategy,
            call_timeout,
        }
    }

    pub fn strategy(&self) -> &BackoffStrategy {
        &self.strategy
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    pub async fn run<T, E, F, Fut>(&self, what: &str, call: F) -> CoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<CoreError>,
    {
        self.run_inner(what, Some(self.call_timeout), call).await
    }

    /// Same retry loop without the per-call timeout.
    ///
    /// For calls whose side effects must not be repeated just because they were slow,
    /// such as a remote job submission.
    pub async fn run_untimed<T, E, F, Fut>(&self, what: &str, call: F) -> CoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<CoreError>,
    {
        self.run_inner(what, None, call).await
    }

    async fn run_inner<T, E, F, Fut>(
        &self,
        what: &str,
        timeout: Option<Duration>,
        mut call: F,
    ) -> CoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<CoreError>,
    {
        let attempts = self.strategy.max_attempts.max(1);
        let mut prev_ms = self.strategy.first_ms;

        for attempt in 0..attempts {
            let outcome = match timeout {
                Some(limit) => tokio::time::timeout(limit, call()).await.ok(),
                None => Some(call().await),
            };
            let err = match outcome {
                Some(Ok(v)) => return Ok(v),
                Some(Err(e)) => e.into(),
                None => CoreError::Timeout(what.to_string()),
            };
            if !err.is_transient() {
                return Err(err);
            }
            if attempt + 1 == attempts {
                warn!(call = what, attempts, error = %err, "retries exhausted");
                return Err(CoreError::Exhausted {
                    what: what.to_string(),
                    attempts,
                    last: Box::new(err),
                });
            }

            let delay_ms = next_delay_ms(&self.strategy, attempt, prev_ms);
            prev_ms = delay_ms.max(1);
            debug!(call = what, attempt, delay_ms, error = %err, "transient failure, backing off");
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        Err(CoreError::Timeout(what.to_string()))
    }
}

/// Delay before the retry following `attempt`.
pub(crate) fn next_delay_ms(s: &BackoffStrategy, attempt: u32, prev_ms: u64) -> u64 {
    let base = s.base_delay_ms(attempt);
    let mut rng = rand::rng();
    match s.jitter {
        JitterStrategy::None => base,
        JitterStrategy::Full => rng.random_range(0..=base),
        JitterStrategy::Equal => {
            let half = base / 2;
            half + rng.random_range(0..=base - half)
        }
        JitterStrategy::Decorrelated => {
            let lo = s.first_ms.min(s.max_ms);
            let hi = prev_ms.saturating_mul(3).clamp(lo, s.max_ms.max(lo));
            rng.random_range(lo..=hi)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use pilot_store::StoreError;

    fn fast(max_attempts: u32) -> Retry {
        Retry::new(
            BackoffStrategy {
                jitter: JitterStrategy::None,
                first_ms: 1,
                max_ms: 2,
                factor: 2.0,
                max_attempts,
            },
            Duration::from_millis(200),
        )
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let out = fast(5)
            .run("get", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(StoreError::Transient("503".into()))
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();
        assert_eq!(out, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn auth_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let err = fast(5)
            .run("get", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(StoreError::Auth("401".into()))
            })
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let err = fast(3)
            .run("query", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(StoreError::Transient("reset".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Exhausted { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_calls_time_out_as_transient() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let err = fast(2)
            .run("get", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, StoreError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Exhausted { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn jittered_delays_stay_in_bounds() {
        for jitter in [
            JitterStrategy::Full,
            JitterStrategy::Equal,
            JitterStrategy::Decorrelated,
        ] {
            let s = BackoffStrategy {
                jitter,
                first_ms: 100,
                max_ms: 1_000,
                factor: 2.0,
                max_attempts: 5,
            };
            for attempt in 0..6 {
                let d = next_delay_ms(&s, attempt, 400);
                assert!(d <= 1_000, "{jitter:?} gave {d}");
            }
        }
    }
}
