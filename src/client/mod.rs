//! Tracing service clients
//!
//! This module contains the backend trait the observability layer talks to,
//! the HTTP ingestion implementation, and an in-memory implementation.

pub mod ingestion;
pub mod memory;
pub mod traits;

pub use ingestion::{IngestionClient, IngestionConfig};
pub use memory::MemoryBackend;
pub use traits::{
    EventHandle, EventRecord, Metadata, ScoreRecord, TraceHandle, TraceRecord, TracingBackend,
};
