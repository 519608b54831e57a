//! Error types and classification for the observability client
//!
//! This module defines the error returned by tracing backends and the
//! heuristics used to sort failures into kinds that drive retry decisions.
//! Classification is best-effort routing only; it is never surfaced as a
//! user-facing error code.

pub mod classification;

use thiserror::Error;

// Re-export main types for convenient access
pub use classification::{classify_message, ClassifiedError, ErrorKind};

/// Error returned by tracing backend operations.
///
/// Variants produced from HTTP status codes carry their kind structurally;
/// `Sdk` and `Other` hold unstructured messages that are classified by
/// message text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TelemetryError {
    /// Credentials were rejected by the tracing service.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// The tracing service is throttling requests.
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    /// The service rejected the payload.
    #[error("validation error: {0}")]
    Validation(String),

    /// Transport-level failure (DNS, TCP, TLS, timeout).
    #[error("connection error: {0}")]
    Connection(String),

    /// Non-success HTTP status without a more specific mapping.
    #[error("HTTP {status} error: {body}")]
    Http { status: u16, body: String },

    /// Client could not be constructed from the configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Unstructured error raised by a backend implementation.
    #[error("{0}")]
    Sdk(String),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

impl TelemetryError {
    /// Creates an unstructured error whose kind is inferred from `message`.
    pub fn other(message: impl Into<String>) -> Self {
        TelemetryError::Other(message.into())
    }

    /// Returns the kind used for retry routing.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::from(self)
    }
}

/// Result type for tracing backend operations
pub type TelemetryResult<T> = Result<T, TelemetryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_error_display() {
        let err = TelemetryError::Authentication("bad key".to_string());
        assert_eq!(err.to_string(), "authentication error: bad key");

        let err = TelemetryError::Http {
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 502 error: bad gateway");

        let err = TelemetryError::other("socket hang up");
        assert_eq!(err.to_string(), "socket hang up");
    }

    #[test]
    fn test_kind_uses_variant_first() {
        // A structured variant wins over misleading message text.
        let err = TelemetryError::Connection("upstream said: invalid".to_string());
        assert_eq!(err.kind(), ErrorKind::Connection);

        let err = TelemetryError::RateLimited("slow down".to_string());
        assert_eq!(err.kind(), ErrorKind::RateLimit);
    }

    #[test]
    fn test_kind_falls_back_to_message() {
        let err = TelemetryError::Sdk("Request failed: Unauthorized".to_string());
        assert_eq!(err.kind(), ErrorKind::Authentication);

        let err = TelemetryError::other("something odd");
        assert_eq!(err.kind(), ErrorKind::Unknown);
    }
}
