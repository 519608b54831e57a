//! Trace, event and score emission.
//!
//! [`Observability`] is the entry point application code uses. Every call
//! absorbs backend failures: callers get `None`/`false` and primary request
//! handling carries on unaffected.

pub mod metadata;
pub mod requests;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::client::{
    EventHandle, EventRecord, IngestionClient, IngestionConfig, Metadata, ScoreRecord,
    TraceHandle, TraceRecord, TracingBackend,
};
use crate::config::ObservabilityConfig;
use crate::health::{HealthCache, HealthReport, HealthStatus};
use crate::retry::{RetryExecutor, RetryOverrides};

use metadata::MetadataStamp;
pub use requests::{
    EventRequest, ScoreRequest, TraceRequest, PERFORMANCE_METRIC_EVENT, PRD_CRITIQUE_TRACE,
    PRD_GENERATION_TRACE, USER_FEEDBACK_SCORE,
};

/// Resilient observability client.
pub struct Observability {
    config: ObservabilityConfig,
    backend: Option<Arc<dyn TracingBackend>>,
    executor: RetryExecutor,
    health: HealthCache,
    stamp: MetadataStamp,
    warned_disabled: AtomicBool,
}

impl Observability {
    /// Create a client talking to `backend`.
    ///
    /// The backend is only used when `config` carries both keys; otherwise
    /// every operation is a no-op.
    pub fn new(
        config: ObservabilityConfig,
        backend: Option<Arc<dyn TracingBackend>>,
        executor: RetryExecutor,
    ) -> Self {
        let backend = backend.filter(|_| config.is_enabled());
        let health = HealthCache::new(
            backend.clone(),
            executor.clone(),
            config.health_check_interval(),
        );
        let stamp = MetadataStamp::new(&config.application, &config.release);

        Self {
            config,
            backend,
            executor,
            health,
            stamp,
            warned_disabled: AtomicBool::new(false),
        }
    }

    /// Create a client backed by the HTTP ingestion API.
    pub fn from_config(config: ObservabilityConfig) -> Self {
        let executor = RetryExecutor::new(config.retry_policy());

        let backend: Option<Arc<dyn TracingBackend>> =
            match IngestionConfig::from_observability(&config) {
                Some(ingestion) => match IngestionClient::new(ingestion) {
                    Ok(client) => {
                        info!(base_url = %config.base_url, "Observability client initialized");
                        Some(Arc::new(client))
                    }
                    Err(err) => {
                        error!("Failed to initialize observability client: {}", err);
                        None
                    }
                },
                None => None,
            };

        Self::new(config, backend, executor)
    }

    /// A client with observability switched off.
    pub fn disabled() -> Self {
        Self::new(ObservabilityConfig::default(), None, RetryExecutor::default())
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub fn config(&self) -> &ObservabilityConfig {
        &self.config
    }

    fn backend(&self) -> Option<&Arc<dyn TracingBackend>> {
        if self.backend.is_none() {
            if !self.warned_disabled.swap(true, Ordering::Relaxed) {
                warn!(
                    "Observability is not configured. Set OBSERVABILITY_PUBLIC_KEY and \
                     OBSERVABILITY_SECRET_KEY to enable it."
                );
            } else {
                debug!("Observability disabled, skipping");
            }
        }
        self.backend.as_ref()
    }

    fn detailed(&self) -> bool {
        self.executor.defaults().detailed_logging
    }

    /// Create a trace. Returns `None` when disabled or when the backend fails.
    pub async fn create_trace(&self, request: TraceRequest) -> Option<TraceHandle> {
        let backend = self.backend()?;

        let TraceRequest {
            name,
            kind,
            subject_id,
            user_id,
            session_id,
            metadata,
        } = request;

        let record = TraceRecord {
            name: name.clone(),
            user_id,
            session_id,
            metadata: self.stamp.trace(&kind, &subject_id, metadata),
            timestamp: Utc::now(),
        };

        match backend.create_trace(record).await {
            Ok(handle) => {
                if self.detailed() {
                    info!(trace_id = %handle, subject_id = %subject_id, "Created {} trace", name);
                }
                Some(handle)
            }
            Err(err) => {
                error!(
                    subject_id = %subject_id,
                    kind = %err.kind(),
                    "Failed to create {} trace for {}: {}",
                    name,
                    subject_id,
                    err
                );
                None
            }
        }
    }

    /// Create a `prd-generation` trace.
    pub async fn create_prd_trace(
        &self,
        prd_id: &str,
        user_id: Option<&str>,
        session_id: Option<&str>,
        metadata: Metadata,
    ) -> Option<TraceHandle> {
        self.create_trace(
            TraceRequest::prd_generation(prd_id)
                .with_user(user_id)
                .with_session(session_id)
                .with_metadata(metadata),
        )
        .await
    }

    /// Create a `prd-critique` trace.
    pub async fn create_critique_trace(
        &self,
        prd_id: &str,
        user_id: Option<&str>,
        session_id: Option<&str>,
        metadata: Metadata,
    ) -> Option<TraceHandle> {
        self.create_trace(
            TraceRequest::prd_critique(prd_id)
                .with_user(user_id)
                .with_session(session_id)
                .with_metadata(metadata),
        )
        .await
    }

    /// Track a custom event, retrying transient failures.
    pub async fn create_event(&self, request: EventRequest) -> Option<EventHandle> {
        let backend = self.backend()?;

        let record = EventRecord {
            name: request.name.clone(),
            trace_id: request.trace_id,
            metadata: self.stamp.event(
                request.properties,
                request.user_id.as_deref(),
                request.session_id.as_deref(),
            ),
            start_time: Utc::now(),
        };

        let context = format!("track-event-{}", request.name);
        let handle = self
            .executor
            .with_retry(&context, RetryOverrides::none(), || {
                backend.create_event(record.clone())
            })
            .await?;

        if self.detailed() {
            info!(event_id = %handle, "Tracked custom event: {}", request.name);
        }
        Some(handle)
    }

    /// Track a `performance_metric` event.
    pub async fn track_performance_metric(
        &self,
        metric_name: &str,
        value: f64,
        unit: &str,
        metadata: Metadata,
    ) -> Option<EventHandle> {
        let mut properties = Metadata::new();
        properties.insert("metric_name".to_string(), Value::from(metric_name));
        properties.insert("value".to_string(), Value::from(value));
        properties.insert("unit".to_string(), Value::from(unit));
        properties.extend(metadata);

        self.create_event(EventRequest::new(PERFORMANCE_METRIC_EVENT).with_properties(properties))
            .await
    }

    /// Record user feedback as a `user-feedback` score.
    ///
    /// Returns whether the score was accepted by the backend; disabled
    /// clients return `false` without effect.
    pub async fn submit_score(&self, request: ScoreRequest) -> bool {
        let Some(backend) = self.backend() else {
            return false;
        };

        let record = ScoreRecord {
            trace_id: request.trace_id.clone(),
            observation_id: request.generation_id.clone(),
            name: USER_FEEDBACK_SCORE.to_string(),
            value: request.value,
            comment: request.comment.clone(),
        };

        let context = format!("submit-feedback-{}", request.trace_id);
        let accepted = self
            .executor
            .with_retry(&context, RetryOverrides::none(), || {
                backend.record_score(record.clone())
            })
            .await
            .is_some();

        if accepted && self.detailed() {
            info!(
                trace_id = %request.trace_id,
                score = request.value,
                user_id = ?request.user_id,
                "Feedback submitted"
            );
        }
        accepted
    }

    /// Send buffered records. Returns `false` when disabled or on failure.
    pub async fn flush(&self) -> bool {
        let Some(backend) = self.backend() else {
            return false;
        };

        let overrides = RetryOverrides::none()
            .max_retries(2)
            .retry_delay(Duration::from_millis(500));
        let flushed = self
            .executor
            .with_retry("flush", overrides, || backend.flush())
            .await
            .is_some();

        if flushed {
            debug!("Observability buffer flushed");
        } else {
            error!("Failed to flush observability buffer after retries");
        }
        flushed
    }

    /// Whether the tracing service is reachable; see [`HealthCache`].
    pub async fn check_health(&self) -> bool {
        self.health.check_health().await
    }

    /// Last known health without probing.
    pub fn health_status(&self) -> HealthStatus {
        self.health.status()
    }

    /// Health report for diagnostics endpoints. Probes when enabled and stale.
    pub async fn health_report(&self) -> HealthReport {
        let healthy = self.check_health().await;
        let status = self.health.status();

        HealthReport {
            enabled: status.enabled,
            healthy,
            last_checked: status.last_checked,
            configuration: self.config.summary(),
        }
    }
}
