//! Diagnostics HTTP server
//!
//! Exposes the observability health status for monitoring and a feedback
//! endpoint that records user ratings as scores.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::client::Metadata;
use crate::emitter::{EventRequest, Observability, ScoreRequest};
use crate::health::HealthReport;

/// Diagnostics server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            bind_address: "127.0.0.1".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    pub fn with_bind_address(mut self, address: impl Into<String>) -> Self {
        self.bind_address = address.into();
        self
    }

    /// Get the full bind address (ip:port)
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub observability: Arc<Observability>,
}

impl AppState {
    pub fn new(observability: Arc<Observability>) -> Self {
        Self { observability }
    }
}

/// Errors returned by handlers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    /// Request is missing required fields
    Validation(String),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::Validation(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ServerError {}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ServerError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        };

        let body = Json(ErrorResponse {
            message: self.to_string(),
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
    pub code: String,
}

/// Liveness response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Observability health response
#[derive(Debug, Serialize, Deserialize)]
pub struct ObservabilityHealthResponse {
    pub status: String,
    #[serde(flatten)]
    pub report: HealthReport,
    pub timestamp: String,
}

/// Feedback submitted by the frontend
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub trace_id: Option<String>,
    pub generation_id: Option<String>,
    pub rating: Option<f64>,
    pub comment: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeedbackResponse {
    pub success: bool,
    pub message: String,
    /// Whether the score reached the tracing service
    pub recorded: bool,
}

/// Feedback with an optional 1-5 rating and free-form categories
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedFeedbackRequest {
    pub trace_id: Option<String>,
    pub generation_id: Option<String>,
    pub rating: Option<f64>,
    pub comment: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackAnalytics {
    pub trace_id: String,
    pub generation_id: String,
    pub rating: Option<f64>,
    pub categories_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EnhancedFeedbackResponse {
    pub success: bool,
    pub message: String,
    pub recorded: bool,
    pub analytics: FeedbackAnalytics,
}

const SCORE_NOT_RECORDED: &str = "Score was not recorded by the tracing service";

/// Create the router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/health/observability", get(observability_health_handler))
        .route("/feedback", post(feedback_handler))
        .route("/feedback/enhanced", post(enhanced_feedback_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "pmtrace".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /health/observability
///
/// Probes the tracing service unless a fresh result is cached.
pub async fn observability_health_handler(
    State(state): State<AppState>,
) -> Json<ObservabilityHealthResponse> {
    let report = state.observability.health_report().await;
    let status = if report.healthy {
        "healthy"
    } else {
        "unhealthy"
    };

    Json(ObservabilityHealthResponse {
        status: status.to_string(),
        report,
        timestamp: Utc::now().to_rfc3339(),
    })
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

fn caller(headers: &HeaderMap) -> (String, Option<String>) {
    let user_id = header(headers, "x-user-id").unwrap_or_else(|| "anonymous".to_string());
    (user_id, header(headers, "x-session-id"))
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// POST /feedback
///
/// Records the rating as a `user-feedback` score. Observability failures do
/// not fail the request; `recorded` reports whether the score was accepted.
pub async fn feedback_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<FeedbackRequest>,
) -> Result<Json<FeedbackResponse>, ServerError> {
    let (user_id, session_id) = caller(&headers);

    let (Some(trace_id), Some(generation_id), Some(rating)) =
        (payload.trace_id, payload.generation_id, payload.rating)
    else {
        return Err(ServerError::Validation(
            "Missing required fields: traceId, generationId, and rating are required"
                .to_string(),
        ));
    };

    tracing::info!(
        trace_id = %trace_id,
        generation_id = %generation_id,
        rating,
        user_id = %user_id,
        "Received feedback"
    );

    let observability = &state.observability;
    observability
        .create_event(
            EventRequest::new("feedback_submitted")
                .with_trace(trace_id.clone())
                .with_property("generationId", generation_id.clone())
                .with_property("rating", rating)
                .with_property("hasComment", payload.comment.is_some())
                .with_user(Some(user_id.clone()))
                .with_session(session_id.clone()),
        )
        .await;

    let started = Instant::now();
    let recorded = observability
        .submit_score(
            ScoreRequest::new(trace_id.clone(), rating)
                .with_generation(generation_id)
                .with_comment(payload.comment)
                .with_user(Some(user_id.clone())),
        )
        .await;

    if recorded {
        let mut metric = Metadata::new();
        metric.insert("traceId".to_string(), Value::from(trace_id));
        metric.insert("userId".to_string(), Value::from(user_id));
        observability
            .track_performance_metric("feedback_submission_time", elapsed_ms(started), "ms", metric)
            .await;
    } else {
        tracing::warn!(trace_id = %trace_id, "Feedback score was not recorded");
        observability
            .create_event(
                EventRequest::new("feedback_submission_error")
                    .with_trace(trace_id.clone())
                    .with_property("traceId", trace_id)
                    .with_property("error", SCORE_NOT_RECORDED)
                    .with_property("userId", user_id.clone())
                    .with_user(Some(user_id))
                    .with_session(session_id),
            )
            .await;
    }

    Ok(Json(FeedbackResponse {
        success: true,
        message: "Feedback submitted successfully".to_string(),
        recorded,
    }))
}

/// POST /feedback/enhanced
///
/// Like `/feedback`, but the rating is an optional 1-5 value and the caller
/// may tag the feedback with categories. Without a rating no score is sent.
pub async fn enhanced_feedback_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<EnhancedFeedbackRequest>,
) -> Result<Json<EnhancedFeedbackResponse>, ServerError> {
    let (user_id, session_id) = caller(&headers);

    let (Some(trace_id), Some(generation_id)) = (payload.trace_id, payload.generation_id) else {
        return Err(ServerError::Validation(
            "Missing required fields: traceId and generationId are required".to_string(),
        ));
    };

    if let Some(rating) = payload.rating {
        if !(1.0..=5.0).contains(&rating) {
            return Err(ServerError::Validation(
                "Rating must be between 1 and 5".to_string(),
            ));
        }
    }

    let comment_state = if payload.comment.is_some() {
        "provided"
    } else {
        "none"
    };

    let observability = &state.observability;
    observability
        .create_event(
            EventRequest::new("feedback_submitted")
                .with_trace(trace_id.clone())
                .with_property("generationId", generation_id.clone())
                .with_property("rating", payload.rating)
                .with_property("comment", comment_state)
                .with_property("categories", payload.categories.clone())
                .with_user(Some(user_id.clone()))
                .with_session(session_id.clone()),
        )
        .await;

    let started = Instant::now();
    let recorded = match payload.rating {
        Some(rating) => {
            observability
                .submit_score(
                    ScoreRequest::new(trace_id.clone(), rating)
                        .with_generation(generation_id.clone())
                        .with_comment(payload.comment)
                        .with_user(Some(user_id.clone())),
                )
                .await
        }
        None => false,
    };

    if recorded {
        let mut metric = Metadata::new();
        metric.insert("traceId".to_string(), Value::from(trace_id.as_str()));
        metric.insert("generationId".to_string(), Value::from(generation_id.as_str()));
        observability
            .track_performance_metric("feedback_response_time", elapsed_ms(started), "ms", metric)
            .await;
    } else if payload.rating.is_some() {
        tracing::warn!(trace_id = %trace_id, "Enhanced feedback score was not recorded");
        observability
            .create_event(
                EventRequest::new("feedback_error")
                    .with_trace(trace_id.clone())
                    .with_property("traceId", trace_id.as_str())
                    .with_property("generationId", generation_id.as_str())
                    .with_property("error", SCORE_NOT_RECORDED)
                    .with_user(Some(user_id))
                    .with_session(session_id),
            )
            .await;
    }

    Ok(Json(EnhancedFeedbackResponse {
        success: true,
        message: "Feedback submitted successfully".to_string(),
        recorded,
        analytics: FeedbackAnalytics {
            trace_id,
            generation_id,
            rating: payload.rating,
            categories_count: payload.categories.len(),
        },
    }))
}

/// Start flushing buffered records on the configured interval.
///
/// Returns `None` when observability is disabled or the interval is zero.
pub fn spawn_periodic_flush(observability: Arc<Observability>) -> Option<JoinHandle<()>> {
    let period = observability.config().flush_interval();
    if !observability.is_enabled() || period.is_zero() {
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = time::interval_at(time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            tracing::debug!("Periodic observability flush");
            observability.flush().await;
        }
    }))
}

/// Run the server until SIGINT or SIGTERM, then flush buffered records.
pub async fn serve(config: ServerConfig, observability: Arc<Observability>) -> std::io::Result<()> {
    let listener = TcpListener::bind(config.socket_addr()).await?;
    tracing::info!(address = %config.socket_addr(), "Diagnostics server listening");

    let flusher = spawn_periodic_flush(Arc::clone(&observability));
    let router = create_router(AppState::new(Arc::clone(&observability)));
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down gracefully...");
    if let Some(flusher) = flusher {
        flusher.abort();
    }
    observability.flush().await;
    Ok(())
}

/// Resolves on Ctrl-C, or on SIGTERM on unix. Handlers are installed when
/// this is called, not when the future is first polled.
fn shutdown_signal() -> impl Future<Output = ()> {
    #[cfg(unix)]
    let terminate = signal::unix::signal(signal::unix::SignalKind::terminate());

    async move {
        let ctrl_c = async {
            if let Err(err) = signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", err);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async move {
            match terminate {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(err) => {
                    tracing::error!("Failed to install SIGTERM handler: {}", err);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown..."),
            _ = terminate => tracing::info!("Received SIGTERM, initiating shutdown..."),
        }
    }
}
