//! Bounded retry with exponential backoff.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error, warn};

use super::{RetryOverrides, RetryPolicy, Sleeper, TokioSleeper};
use crate::error::{ClassifiedError, TelemetryResult};

/// Runs operations against the tracing service with retries.
///
/// Cloning is cheap; clones share the sleeper.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    defaults: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl RetryExecutor {
    /// Creates an executor that sleeps on the tokio timer.
    pub fn new(defaults: RetryPolicy) -> Self {
        Self {
            defaults,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Replaces the sleeper used between attempts.
    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// The process-wide default policy.
    pub fn defaults(&self) -> &RetryPolicy {
        &self.defaults
    }

    /// Runs `operation` until it succeeds or the merged policy gives up.
    ///
    /// Authentication failures stop the sequence immediately. Every other
    /// failure is followed by a `retry_delay * 2^(attempt-1)` pause while
    /// attempts remain. Returns `None` once the sequence is abandoned; the
    /// last error is logged, never returned.
    pub async fn with_retry<T, F, Fut>(
        &self,
        context: &str,
        overrides: RetryOverrides,
        mut operation: F,
    ) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = TelemetryResult<T>>,
    {
        let policy = self.defaults.merge(&overrides);
        let mut last_error: Option<ClassifiedError> = None;
        let mut attempts = 0;

        for attempt in 1..=policy.max_retries {
            attempts = attempt;
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(context, attempt, "Observability operation recovered");
                    }
                    return Some(value);
                }
                Err(err) => {
                    let classified = ClassifiedError::new(&err, attempt);

                    if policy.detailed_logging {
                        warn!(
                            context,
                            attempt,
                            max_retries = policy.max_retries,
                            kind = %classified.kind,
                            timestamp = %classified.timestamp.to_rfc3339(),
                            "Observability operation failed: {}",
                            classified.message
                        );
                    }

                    let fatal = classified.is_fatal();
                    last_error = Some(classified);
                    if fatal {
                        break;
                    }

                    if attempt < policy.max_retries {
                        self.sleeper.sleep(policy.backoff_delay(attempt)).await;
                    }
                }
            }
        }

        match &last_error {
            Some(err) => error!(
                context,
                attempts,
                kind = %err.kind,
                "Observability operation failed after {} attempt(s): {}",
                attempts,
                err.message
            ),
            None => error!(context, attempts, "Observability operation failed"),
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TelemetryError;
    use crate::retry::RecordingSleeper;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn executor() -> (RetryExecutor, RecordingSleeper) {
        let sleeper = RecordingSleeper::new();
        let executor = RetryExecutor::new(RetryPolicy::default()).with_sleeper(sleeper.clone());
        (executor, sleeper)
    }

    #[tokio::test]
    async fn test_first_attempt_success_does_not_sleep() {
        let (executor, sleeper) = executor();
        let calls = &AtomicU32::new(0);

        let result = executor
            .with_retry("ok", RetryOverrides::none(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TelemetryError>(42)
            })
            .await;

        assert_eq!(result, Some(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_always_failing_runs_max_retries_times() {
        for max_retries in 1..=5u32 {
            let (executor, sleeper) = executor();
            let calls = &AtomicU32::new(0);

            let result: Option<()> = executor
                .with_retry(
                    "always-fails",
                    RetryOverrides::none().max_retries(max_retries),
                    move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err(TelemetryError::other("connection refused"))
                    },
                )
                .await;

            assert!(result.is_none());
            assert_eq!(calls.load(Ordering::SeqCst), max_retries);
            assert_eq!(sleeper.delays().len() as u32, max_retries - 1);
        }
    }

    #[tokio::test]
    async fn test_authentication_error_fails_fast() {
        let (executor, sleeper) = executor();
        let calls = &AtomicU32::new(0);

        let result: Option<()> = executor
            .with_retry("auth", RetryOverrides::none().max_retries(10), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TelemetryError::other("401 UNAUTHORIZED"))
            })
            .await;

        assert!(result.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_fail_once_then_succeed() {
        let (executor, sleeper) = executor();
        let calls = &AtomicU32::new(0);

        let result = executor
            .with_retry("flaky", RetryOverrides::none().max_retries(2), move || async move {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if call == 1 {
                    Err(TelemetryError::other("network blip"))
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result, Some("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(sleeper.delays(), vec![Duration::from_millis(1000)]);
    }

    #[tokio::test]
    async fn test_backoff_delays_double() {
        let (executor, sleeper) = executor();

        let _: Option<()> = executor
            .with_retry("backoff", RetryOverrides::none().max_retries(4), move || async move {
                Err(TelemetryError::other("rate limit"))
            })
            .await;

        assert_eq!(
            sleeper.delays(),
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(4000),
            ]
        );
    }

    #[tokio::test]
    async fn test_overridden_delay_is_used() {
        let (executor, sleeper) = executor();

        let _: Option<()> = executor
            .with_retry(
                "custom-delay",
                RetryOverrides::none()
                    .max_retries(3)
                    .retry_delay(Duration::from_millis(500)),
                move || async move { Err(TelemetryError::other("validation failed")) },
            )
            .await;

        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_millis(500), Duration::from_millis(1000)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_sleeper_uses_tokio_timer() {
        let executor = RetryExecutor::default();
        let start = tokio::time::Instant::now();

        let _: Option<()> = executor
            .with_retry("timer", RetryOverrides::none().max_retries(3), move || async move {
                Err(TelemetryError::other("connection reset"))
            })
            .await;

        assert!(start.elapsed() >= Duration::from_millis(3000));
    }
}
