//! Error classification for retry routing
//!
//! Errors are sorted into five kinds. Only `Authentication` stops a retry
//! sequence early; every other kind is retried with backoff.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use super::TelemetryError;

/// The kind of a failed observability operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network connectivity issues.
    Connection,
    /// Invalid or rejected credentials. Never retried.
    Authentication,
    /// The service is throttling requests.
    RateLimit,
    /// The payload was rejected.
    Validation,
    /// Anything the heuristics do not recognise.
    Unknown,
}

impl ErrorKind {
    /// Returns true if an operation failing with this kind may be retried.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorKind::Authentication)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Connection => write!(f, "connection_error"),
            ErrorKind::Authentication => write!(f, "authentication_error"),
            ErrorKind::RateLimit => write!(f, "rate_limit_error"),
            ErrorKind::Validation => write!(f, "validation_error"),
            ErrorKind::Unknown => write!(f, "unknown_error"),
        }
    }
}

impl From<&TelemetryError> for ErrorKind {
    fn from(error: &TelemetryError) -> Self {
        match error {
            TelemetryError::Authentication(_) => ErrorKind::Authentication,
            TelemetryError::RateLimited(_) => ErrorKind::RateLimit,
            TelemetryError::Validation(_) => ErrorKind::Validation,
            TelemetryError::Connection(_) => ErrorKind::Connection,
            TelemetryError::Http { status: 429, .. } => ErrorKind::RateLimit,
            TelemetryError::Http { status, body } => {
                let kind = classify_message(body);
                if kind == ErrorKind::Unknown && *status >= 500 {
                    ErrorKind::Connection
                } else {
                    kind
                }
            }
            TelemetryError::Config(message)
            | TelemetryError::Sdk(message)
            | TelemetryError::Other(message) => classify_message(message),
        }
    }
}

/// Classifies an unstructured error message.
///
/// Case-insensitive substring matching, first match wins:
/// 1. "unauthorized" / "invalid key" => authentication
/// 2. "rate limit" / "too many requests" => rate limit
/// 3. "connection" / "network" => connection
/// 4. "validation" / "invalid" => validation
///
/// An empty message is `Unknown`.
pub fn classify_message(message: &str) -> ErrorKind {
    let message = message.to_lowercase();
    let has = |needle: &str| message.contains(needle);

    if has("unauthorized") || has("invalid key") {
        ErrorKind::Authentication
    } else if has("rate limit") || has("too many requests") {
        ErrorKind::RateLimit
    } else if has("connection") || has("network") {
        ErrorKind::Connection
    } else if has("validation") || has("invalid") {
        ErrorKind::Validation
    } else {
        ErrorKind::Unknown
    }
}

/// A failed attempt, as recorded by the retry executor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClassifiedError {
    /// The kind of failure.
    pub kind: ErrorKind,
    /// Human-readable error message.
    pub message: String,
    /// When the failure was observed.
    pub timestamp: DateTime<Utc>,
    /// 1-based attempt number that produced the failure.
    pub attempt: u32,
}

impl ClassifiedError {
    /// Classifies `error` as the failure of attempt `attempt`.
    pub fn new(error: &TelemetryError, attempt: u32) -> Self {
        Self {
            kind: ErrorKind::from(error),
            message: error.to_string(),
            timestamp: Utc::now(),
            attempt,
        }
    }

    /// Returns true if this failure should stop the retry sequence.
    pub fn is_fatal(&self) -> bool {
        !self.kind.is_retryable()
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::error::Error for ClassifiedError {}
