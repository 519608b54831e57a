//! Requests accepted by the emitter.

use serde_json::Value;

use crate::client::Metadata;

/// Trace for PRD content generation
pub const PRD_GENERATION_TRACE: &str = "prd-generation";
/// Trace for PRD critique
pub const PRD_CRITIQUE_TRACE: &str = "prd-critique";
/// Score name used for user feedback
pub const USER_FEEDBACK_SCORE: &str = "user-feedback";
/// Event name used for performance metrics
pub const PERFORMANCE_METRIC_EVENT: &str = "performance_metric";

/// A trace about one unit of application work on a subject (usually a PRD).
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRequest {
    /// Trace name, e.g. `prd-generation`
    pub name: String,
    /// Type discriminator stamped into metadata, e.g. `prd_generation`
    pub kind: String,
    /// Identifier of the subject the trace is about
    pub subject_id: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    /// Caller metadata; fixed fields win on key collisions
    pub metadata: Metadata,
}

impl TraceRequest {
    pub fn new(
        name: impl Into<String>,
        kind: impl Into<String>,
        subject_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            subject_id: subject_id.into(),
            user_id: None,
            session_id: None,
            metadata: Metadata::new(),
        }
    }

    /// A `prd-generation` trace for `prd_id`.
    pub fn prd_generation(prd_id: impl Into<String>) -> Self {
        Self::new(PRD_GENERATION_TRACE, "prd_generation", prd_id)
    }

    /// A `prd-critique` trace for `prd_id`.
    pub fn prd_critique(prd_id: impl Into<String>) -> Self {
        Self::new(PRD_CRITIQUE_TRACE, "prd_critique", prd_id)
    }

    pub fn with_user(mut self, user_id: Option<impl Into<String>>) -> Self {
        self.user_id = user_id.map(Into::into);
        self
    }

    pub fn with_session(mut self, session_id: Option<impl Into<String>>) -> Self {
        self.session_id = session_id.map(Into::into);
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A custom analytics event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRequest {
    pub name: String,
    pub properties: Metadata,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    /// Attach the event to an existing trace
    pub trace_id: Option<String>,
}

impl EventRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Metadata::new(),
            user_id: None,
            session_id: None,
            trace_id: None,
        }
    }

    pub fn with_properties(mut self, properties: Metadata) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_user(mut self, user_id: Option<impl Into<String>>) -> Self {
        self.user_id = user_id.map(Into::into);
        self
    }

    pub fn with_session(mut self, session_id: Option<impl Into<String>>) -> Self {
        self.session_id = session_id.map(Into::into);
        self
    }

    pub fn with_trace(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}

/// User feedback on a generation, recorded as a score on its trace.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRequest {
    pub trace_id: String,
    pub generation_id: Option<String>,
    /// 1 for thumbs up, -1 for thumbs down, or a 1-5 rating
    pub value: f64,
    pub comment: Option<String>,
    pub user_id: Option<String>,
}

impl ScoreRequest {
    pub fn new(trace_id: impl Into<String>, value: f64) -> Self {
        Self {
            trace_id: trace_id.into(),
            generation_id: None,
            value,
            comment: None,
            user_id: None,
        }
    }

    pub fn with_generation(mut self, generation_id: impl Into<String>) -> Self {
        self.generation_id = Some(generation_id.into());
        self
    }

    pub fn with_comment(mut self, comment: Option<impl Into<String>>) -> Self {
        self.comment = comment.map(Into::into);
        self
    }

    pub fn with_user(mut self, user_id: Option<impl Into<String>>) -> Self {
        self.user_id = user_id.map(Into::into);
        self
    }
}
