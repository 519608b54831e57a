//! HTTP ingestion backend
//!
//! This module implements the TracingBackend trait against a Langfuse-style
//! batch ingestion API. Records are buffered in memory and sent as a single
//! batch on `flush`.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use super::traits::{
    EventHandle, EventRecord, ScoreRecord, TraceHandle, TraceRecord, TracingBackend,
};
use crate::config::ObservabilityConfig;
use crate::error::{TelemetryError, TelemetryResult};

/// Path of the batch ingestion endpoint, relative to the base URL
const INGESTION_PATH: &str = "/api/public/ingestion";

/// Connection settings for the ingestion client
#[derive(Debug, Clone)]
pub struct IngestionConfig {
    /// Service base URL, without trailing slash
    pub base_url: String,
    /// Public key, sent as the basic-auth user
    pub public_key: String,
    /// Secret key, sent as the basic-auth password
    pub secret_key: String,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Maximum records held before the oldest are dropped
    pub max_buffered: usize,
}

impl IngestionConfig {
    /// Create a new IngestionConfig with explicit keys and default limits
    pub fn new(
        base_url: impl Into<String>,
        public_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            public_key: public_key.into(),
            secret_key: secret_key.into(),
            request_timeout: Duration::from_secs(10),
            max_buffered: 1000,
        }
    }

    /// Build from the observability configuration.
    ///
    /// Returns `None` when either key is missing.
    pub fn from_observability(config: &ObservabilityConfig) -> Option<Self> {
        let (public_key, secret_key) = config.credentials()?;
        let mut ingestion = Self::new(&config.base_url, public_key, secret_key);
        ingestion.request_timeout = config.request_timeout();
        ingestion.max_buffered = config.max_buffered.max(1);
        Some(ingestion)
    }

    /// Full URL of the ingestion endpoint
    pub fn ingestion_url(&self) -> String {
        format!("{}{}", self.base_url, INGESTION_PATH)
    }
}

/// One entry of an ingestion batch
#[derive(Debug, Clone, Serialize)]
struct IngestionEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: &'static str,
    timestamp: String,
    body: Value,
}

impl IngestionEvent {
    fn new(event_type: &'static str, body: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type,
            timestamp: Utc::now().to_rfc3339(),
            body,
        }
    }
}

#[derive(Debug, Serialize)]
struct IngestionBatch<'a> {
    batch: &'a [IngestionEvent],
}

/// Body of a 207 Multi-Status ingestion response
#[derive(Debug, Default, Deserialize)]
struct IngestionResponse {
    #[serde(default)]
    successes: Vec<Value>,
    #[serde(default)]
    errors: Vec<IngestionItemError>,
}

#[derive(Debug, Deserialize)]
struct IngestionItemError {
    #[serde(default)]
    id: String,
    #[serde(default)]
    status: u16,
    #[serde(default)]
    message: Option<String>,
}

/// Buffering HTTP client for the ingestion API
pub struct IngestionClient {
    /// HTTP client for API requests
    client: Client,
    /// Connection settings
    config: IngestionConfig,
    /// Records waiting for the next flush
    buffer: Mutex<VecDeque<IngestionEvent>>,
}

impl IngestionClient {
    /// Create a new ingestion client
    pub fn new(config: IngestionConfig) -> TelemetryResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TelemetryError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            buffer: Mutex::new(VecDeque::new()),
        })
    }

    /// Number of records waiting to be flushed
    pub fn pending(&self) -> usize {
        self.lock_buffer().len()
    }

    fn lock_buffer(&self) -> std::sync::MutexGuard<'_, VecDeque<IngestionEvent>> {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enqueue(&self, event: IngestionEvent) {
        let mut buffer = self.lock_buffer();
        buffer.push_back(event);
        self.enforce_capacity(&mut buffer);
    }

    fn enforce_capacity(&self, buffer: &mut VecDeque<IngestionEvent>) {
        let mut dropped = 0;
        while buffer.len() > self.config.max_buffered {
            buffer.pop_front();
            dropped += 1;
        }
        if dropped > 0 {
            warn!(
                dropped,
                max_buffered = self.config.max_buffered,
                "Observability buffer full, dropped oldest records"
            );
        }
    }

    /// Put a failed batch back at the front so the next flush resends it
    fn requeue(&self, batch: Vec<IngestionEvent>) {
        let mut buffer = self.lock_buffer();
        for event in batch.into_iter().rev() {
            buffer.push_front(event);
        }
        self.enforce_capacity(&mut buffer);
    }

    async fn send_batch(&self, batch: &[IngestionEvent]) -> TelemetryResult<()> {
        let response = self
            .client
            .post(self.config.ingestion_url())
            .basic_auth(&self.config.public_key, Some(&self.config.secret_key))
            .json(&IngestionBatch { batch })
            .send()
            .await
            .map_err(|e| TelemetryError::Connection(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(status_error(status, error_text));
        }

        if status == StatusCode::MULTI_STATUS {
            let body: IngestionResponse = response.json().await.unwrap_or_default();
            for item in &body.errors {
                warn!(
                    id = %item.id,
                    status = item.status,
                    "Ingestion rejected record: {}",
                    item.message.as_deref().unwrap_or("no message")
                );
            }
            debug!(
                accepted = body.successes.len(),
                rejected = body.errors.len(),
                "Ingestion batch processed"
            );
        }

        Ok(())
    }
}

/// Map a non-success HTTP status to a typed error
fn status_error(status: StatusCode, body: String) -> TelemetryError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            TelemetryError::Authentication(format!("Invalid credentials (HTTP {})", status.as_u16()))
        }
        StatusCode::TOO_MANY_REQUESTS => TelemetryError::RateLimited(body),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            TelemetryError::Validation(body)
        }
        _ => TelemetryError::Http {
            status: status.as_u16(),
            body,
        },
    }
}

fn to_body<T: Serialize>(value: &T) -> TelemetryResult<Value> {
    serde_json::to_value(value)
        .map_err(|e| TelemetryError::Validation(format!("Failed to serialize record: {}", e)))
}

fn with_id(mut body: Value, id: &str) -> Value {
    if let Value::Object(map) = &mut body {
        map.insert("id".to_string(), Value::String(id.to_string()));
    }
    body
}

#[async_trait]
impl TracingBackend for IngestionClient {
    fn name(&self) -> &str {
        "langfuse"
    }

    async fn create_trace(&self, trace: TraceRecord) -> TelemetryResult<TraceHandle> {
        if trace.name.trim().is_empty() {
            return Err(TelemetryError::Validation(
                "Trace name must not be empty".to_string(),
            ));
        }

        let id = Uuid::new_v4().to_string();
        let body = with_id(to_body(&trace)?, &id);
        self.enqueue(IngestionEvent::new("trace-create", body));
        Ok(TraceHandle::new(id))
    }

    async fn create_event(&self, event: EventRecord) -> TelemetryResult<EventHandle> {
        if event.name.trim().is_empty() {
            return Err(TelemetryError::Validation(
                "Event name must not be empty".to_string(),
            ));
        }

        let id = Uuid::new_v4().to_string();
        let body = with_id(to_body(&event)?, &id);
        self.enqueue(IngestionEvent::new("event-create", body));
        Ok(EventHandle::new(id))
    }

    async fn record_score(&self, score: ScoreRecord) -> TelemetryResult<()> {
        if score.trace_id.trim().is_empty() {
            return Err(TelemetryError::Validation(
                "Score requires a trace id".to_string(),
            ));
        }

        let id = Uuid::new_v4().to_string();
        let body = with_id(to_body(&score)?, &id);
        self.enqueue(IngestionEvent::new("score-create", body));
        Ok(())
    }

    async fn flush(&self) -> TelemetryResult<()> {
        let batch: Vec<IngestionEvent> = self.lock_buffer().drain(..).collect();
        if batch.is_empty() {
            return Ok(());
        }

        debug!(records = batch.len(), "Flushing observability buffer");
        if let Err(err) = self.send_batch(&batch).await {
            self.requeue(batch);
            return Err(err);
        }
        Ok(())
    }
}
