//! Tracing backend trait and record types
//!
//! This module defines the seam between the observability layer and the
//! external tracing service. Implementations may buffer records and only
//! talk to the network on `flush`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::TelemetryResult;

/// Free-form metadata attached to traces and events.
pub type Metadata = Map<String, Value>;

/// Opaque trace identifier issued by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceHandle(String);

impl TraceHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TraceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque event identifier issued by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventHandle(String);

impl EventHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A trace as sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceRecord {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub metadata: Metadata,
    pub timestamp: DateTime<Utc>,
}

impl TraceRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            user_id: None,
            session_id: None,
            metadata: Metadata::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A point-in-time event as sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    pub metadata: Metadata,
    pub start_time: DateTime<Utc>,
}

/// A score attached to an existing trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    pub trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation_id: Option<String>,
    pub name: String,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Client for an external tracing/analytics service.
///
/// Every call may fail; the observability layer decides whether to retry
/// and never lets a failure reach application code.
#[async_trait]
pub trait TracingBackend: Send + Sync {
    /// Returns the name of this backend (e.g., "langfuse", "memory")
    fn name(&self) -> &str;

    /// Create a trace and return its identifier
    async fn create_trace(&self, trace: TraceRecord) -> TelemetryResult<TraceHandle>;

    /// Create an event and return its identifier
    async fn create_event(&self, event: EventRecord) -> TelemetryResult<EventHandle>;

    /// Record a score against a trace
    async fn record_score(&self, score: ScoreRecord) -> TelemetryResult<()>;

    /// Send any buffered records
    async fn flush(&self) -> TelemetryResult<()>;
}
