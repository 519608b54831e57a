//! Cached, coalesced connectivity probes for the tracing service.
//!
//! A probe creates a minimal `health-check` trace and flushes it. Results
//! stay fresh for the configured interval. While a probe is running, every
//! caller awaits the same shared future, so at most one probe is in flight.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::client::{Metadata, TraceRecord, TracingBackend};
use crate::config::ConfigurationSummary;
use crate::error::TelemetryResult;
use crate::retry::{RetryExecutor, RetryOverrides};

/// Name of the trace created by each probe
pub const HEALTH_CHECK_TRACE: &str = "health-check";

/// Snapshot of the last probe outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub enabled: bool,
    pub healthy: bool,
    pub last_checked: Option<DateTime<Utc>>,
}

/// Health status plus credential presence, for diagnostics endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub enabled: bool,
    pub healthy: bool,
    pub last_checked: Option<DateTime<Utc>>,
    pub configuration: ConfigurationSummary,
}

type ProbeFuture = Shared<BoxFuture<'static, bool>>;

#[derive(Default)]
struct HealthState {
    healthy: bool,
    last_checked: Option<DateTime<Utc>>,
    checked_at: Option<Instant>,
    in_flight: Option<ProbeFuture>,
}

fn lock(state: &Mutex<HealthState>) -> MutexGuard<'_, HealthState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Health cache owned by one observability instance.
pub struct HealthCache {
    backend: Option<Arc<dyn TracingBackend>>,
    executor: RetryExecutor,
    interval: Duration,
    state: Arc<Mutex<HealthState>>,
}

impl HealthCache {
    /// Create a cache. `backend` is `None` when observability is not configured.
    pub fn new(
        backend: Option<Arc<dyn TracingBackend>>,
        executor: RetryExecutor,
        interval: Duration,
    ) -> Self {
        Self {
            backend,
            executor,
            interval,
            state: Arc::new(Mutex::new(HealthState {
                healthy: true,
                ..HealthState::default()
            })),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Returns whether the tracing service is reachable.
    ///
    /// Disabled caches answer `false` without probing. Fresh results are
    /// served from the cache; otherwise the caller joins the running probe
    /// or starts a new one.
    pub async fn check_health(&self) -> bool {
        let Some(backend) = &self.backend else {
            return false;
        };

        let probe = {
            let mut state = lock(&self.state);

            if let Some(checked_at) = state.checked_at {
                if checked_at.elapsed() < self.interval {
                    return state.healthy;
                }
            }

            match &state.in_flight {
                Some(probe) => {
                    debug!("Joining in-flight health probe");
                    probe.clone()
                }
                None => {
                    let probe = self.start_probe(Arc::clone(backend)).shared();
                    state.in_flight = Some(probe.clone());
                    probe
                }
            }
        };

        probe.await
    }

    /// Current status without probing.
    pub fn status(&self) -> HealthStatus {
        let state = lock(&self.state);
        HealthStatus {
            enabled: self.is_enabled(),
            healthy: self.is_enabled() && state.healthy,
            last_checked: state.last_checked,
        }
    }

    fn start_probe(&self, backend: Arc<dyn TracingBackend>) -> BoxFuture<'static, bool> {
        let executor = self.executor.clone();
        let state = Arc::clone(&self.state);

        async move {
            let overrides = RetryOverrides::none()
                .max_retries(1)
                .retry_delay(Duration::from_millis(500));
            let healthy = executor
                .with_retry(HEALTH_CHECK_TRACE, overrides, || probe(backend.as_ref()))
                .await
                .is_some();

            let mut state = lock(&state);
            state.healthy = healthy;
            state.last_checked = Some(Utc::now());
            state.checked_at = Some(Instant::now());
            state.in_flight = None;

            info!(healthy, backend = backend.name(), "Observability health probe finished");
            healthy
        }
        .boxed()
    }
}

async fn probe(backend: &dyn TracingBackend) -> TelemetryResult<()> {
    let mut metadata = Metadata::new();
    metadata.insert("type".to_string(), json!("health_check"));
    metadata.insert("timestamp".to_string(), Value::String(Utc::now().to_rfc3339()));

    backend
        .create_trace(TraceRecord::new(HEALTH_CHECK_TRACE).with_metadata(metadata))
        .await?;
    backend.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemoryBackend;
    use crate::error::TelemetryError;
    use crate::retry::RecordingSleeper;

    fn cache(backend: &Arc<MemoryBackend>, interval: Duration) -> HealthCache {
        let backend: Arc<dyn TracingBackend> = backend.clone();
        let executor = RetryExecutor::default().with_sleeper(RecordingSleeper::new());
        HealthCache::new(Some(backend), executor, interval)
    }

    #[tokio::test]
    async fn test_disabled_returns_false_without_probe() {
        let cache = HealthCache::new(None, RetryExecutor::default(), Duration::from_secs(30));
        assert!(!cache.check_health().await);

        let status = cache.status();
        assert!(!status.enabled);
        assert!(!status.healthy);
        assert!(status.last_checked.is_none());
    }

    #[tokio::test]
    async fn test_initial_status_is_unchecked() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = cache(&backend, Duration::from_secs(30));

        let status = cache.status();
        assert!(status.enabled);
        assert!(status.healthy);
        assert!(status.last_checked.is_none());
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_probe_creates_trace_and_flushes() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = cache(&backend, Duration::from_secs(30));

        assert!(cache.check_health().await);

        let traces = backend.traces();
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].name, "health-check");
        assert_eq!(traces[0].metadata["type"], "health_check");
        assert_eq!(backend.flush_count(), 1);
        assert!(cache.status().last_checked.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_within_interval() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = cache(&backend, Duration::from_secs(30));

        assert!(cache.check_health().await);
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(cache.check_health().await);

        assert_eq!(backend.traces().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reprobes_after_interval() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = cache(&backend, Duration::from_secs(30));

        assert!(cache.check_health().await);
        tokio::time::advance(Duration::from_secs(31)).await;

        backend.fail_always(TelemetryError::Connection("down".to_string()));
        assert!(!cache.check_health().await);
        assert!(!cache.status().healthy);
    }

    #[tokio::test]
    async fn test_failed_probe_is_cached_too() {
        let backend = Arc::new(MemoryBackend::new());
        backend.fail_next(TelemetryError::other("network unreachable"));
        let cache = cache(&backend, Duration::from_secs(30));

        assert!(!cache.check_health().await);
        // Still within the interval: no new probe even though the backend recovered.
        assert!(!cache.check_health().await);
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_probe_is_not_retried() {
        let backend = Arc::new(MemoryBackend::new());
        backend.fail_next(TelemetryError::other("connection reset"));
        let cache = cache(&backend, Duration::ZERO);

        assert!(!cache.check_health().await);
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_checks_share_one_probe() {
        let backend = Arc::new(MemoryBackend::new().with_latency(Duration::from_millis(100)));
        let cache = cache(&backend, Duration::from_secs(30));

        let (a, b, c) = tokio::join!(
            cache.check_health(),
            cache.check_health(),
            cache.check_health()
        );

        assert!(a && b && c);
        assert_eq!(backend.traces().len(), 1);
        assert_eq!(backend.flush_count(), 1);
    }
}
