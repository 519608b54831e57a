//! pmtrace - resilient observability client for PM Copilot
//!
//! Wraps an LLM tracing service so that trace, event and score emission
//! never disrupts request handling: transient failures are retried with
//! exponential backoff, fatal ones fail fast, and connectivity is probed
//! through a cached, coalesced health check.

pub mod client;
pub mod config;
pub mod emitter;
pub mod error;
pub mod health;
pub mod logging;
pub mod retry;
pub mod server;
pub mod session;

pub use config::ObservabilityConfig;
pub use emitter::{EventRequest, Observability, ScoreRequest, TraceRequest};
pub use error::{ErrorKind, TelemetryError, TelemetryResult};
pub use health::{HealthCache, HealthReport, HealthStatus};
pub use retry::{RetryExecutor, RetryOverrides, RetryPolicy};
