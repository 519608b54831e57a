//! In-memory tracing backend
//!
//! Records every call and can be scripted to fail, so the resilience layer
//! can be exercised without a network.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::traits::{
    EventHandle, EventRecord, ScoreRecord, TraceHandle, TraceRecord, TracingBackend,
};
use crate::error::{TelemetryError, TelemetryResult};

#[derive(Debug, Default)]
struct MemoryState {
    traces: Vec<TraceRecord>,
    events: Vec<EventRecord>,
    scores: Vec<ScoreRecord>,
    flushes: u32,
    calls: u32,
    scripted_failures: VecDeque<TelemetryError>,
    persistent_failure: Option<TelemetryError>,
    score_failure: Option<TelemetryError>,
}

/// Backend that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    latency: Duration,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` on the tokio timer.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail the next call with `error`. Queued failures are consumed in order.
    pub fn fail_next(&self, error: TelemetryError) {
        self.lock().scripted_failures.push_back(error);
    }

    /// Fail every call with `error` until [`MemoryBackend::recover`].
    pub fn fail_always(&self, error: TelemetryError) {
        self.lock().persistent_failure = Some(error);
    }

    /// Reject every score with `error` while other calls keep succeeding.
    pub fn fail_scores(&self, error: TelemetryError) {
        self.lock().score_failure = Some(error);
    }

    /// Clear all scripted failures.
    pub fn recover(&self) {
        let mut state = self.lock();
        state.scripted_failures.clear();
        state.persistent_failure = None;
        state.score_failure = None;
    }

    pub fn traces(&self) -> Vec<TraceRecord> {
        self.lock().traces.clone()
    }

    pub fn events(&self) -> Vec<EventRecord> {
        self.lock().events.clone()
    }

    pub fn scores(&self) -> Vec<ScoreRecord> {
        self.lock().scores.clone()
    }

    /// Number of successful flushes.
    pub fn flush_count(&self) -> u32 {
        self.lock().flushes
    }

    /// Number of calls of any kind, failed or not.
    pub fn call_count(&self) -> u32 {
        self.lock().calls
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count the call, wait out the latency, then apply any scripted failure.
    async fn begin_call(&self) -> TelemetryResult<()> {
        self.lock().calls += 1;
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut state = self.lock();
        if let Some(err) = state.scripted_failures.pop_front() {
            return Err(err);
        }
        match &state.persistent_failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TracingBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create_trace(&self, trace: TraceRecord) -> TelemetryResult<TraceHandle> {
        self.begin_call().await?;
        let mut state = self.lock();
        state.traces.push(trace);
        Ok(TraceHandle::new(format!("trace-{}", state.traces.len())))
    }

    async fn create_event(&self, event: EventRecord) -> TelemetryResult<EventHandle> {
        self.begin_call().await?;
        let mut state = self.lock();
        state.events.push(event);
        Ok(EventHandle::new(format!("event-{}", state.events.len())))
    }

    async fn record_score(&self, score: ScoreRecord) -> TelemetryResult<()> {
        self.begin_call().await?;
        let mut state = self.lock();
        if let Some(err) = &state.score_failure {
            return Err(err.clone());
        }
        state.scores.push(score);
        Ok(())
    }

    async fn flush(&self) -> TelemetryResult<()> {
        self.begin_call().await?;
        self.lock().flushes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_traces_and_issues_handles() {
        let backend = MemoryBackend::new();
        let first = backend.create_trace(TraceRecord::new("a")).await.unwrap();
        let second = backend.create_trace(TraceRecord::new("b")).await.unwrap();

        assert_eq!(first.id(), "trace-1");
        assert_eq!(second.id(), "trace-2");
        assert_eq!(backend.traces().len(), 2);
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_scripted_failures_are_consumed_in_order() {
        let backend = MemoryBackend::new();
        backend.fail_next(TelemetryError::other("first"));
        backend.fail_next(TelemetryError::other("second"));

        assert_eq!(
            backend.flush().await.unwrap_err(),
            TelemetryError::other("first")
        );
        assert_eq!(
            backend.flush().await.unwrap_err(),
            TelemetryError::other("second")
        );
        assert!(backend.flush().await.is_ok());
        assert_eq!(backend.flush_count(), 1);
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn test_fail_always_until_recover() {
        let backend = MemoryBackend::new();
        backend.fail_always(TelemetryError::Connection("down".to_string()));

        assert!(backend.create_trace(TraceRecord::new("x")).await.is_err());
        assert!(backend.create_trace(TraceRecord::new("x")).await.is_err());

        backend.recover();
        assert!(backend.create_trace(TraceRecord::new("x")).await.is_ok());
        assert_eq!(backend.traces().len(), 1);
    }

    #[tokio::test]
    async fn test_fail_scores_leaves_other_calls_working() {
        let backend = MemoryBackend::new();
        backend.fail_scores(TelemetryError::Validation("unknown trace".to_string()));

        let score = ScoreRecord {
            trace_id: "tr-1".to_string(),
            observation_id: None,
            name: "user-feedback".to_string(),
            value: 1.0,
            comment: None,
        };
        assert!(backend.record_score(score).await.is_err());
        let event = EventRecord {
            name: "feedback_submitted".to_string(),
            trace_id: Some("tr-1".to_string()),
            metadata: Default::default(),
            start_time: chrono::Utc::now(),
        };
        assert!(backend.create_event(event).await.is_ok());
        assert!(backend.scores().is_empty());
        assert_eq!(backend.events().len(), 1);
    }
}
