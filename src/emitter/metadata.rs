//! Fixed metadata stamped onto every trace and event.
//!
//! Caller metadata is copied first and the fixed fields are written last,
//! so callers can add fields but never override the discriminators.

use chrono::Utc;
use serde_json::Value;

use crate::client::Metadata;

#[derive(Debug, Clone)]
pub(crate) struct MetadataStamp {
    application: String,
    version: String,
}

impl MetadataStamp {
    pub(crate) fn new(application: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            application: application.into(),
            version: version.into(),
        }
    }

    pub(crate) fn trace(&self, kind: &str, subject_id: &str, caller: Metadata) -> Metadata {
        let mut metadata = caller;
        metadata.insert("subject_id".to_string(), Value::from(subject_id));
        metadata.insert("application".to_string(), Value::from(self.application.as_str()));
        metadata.insert("version".to_string(), Value::from(self.version.as_str()));
        metadata.insert("timestamp".to_string(), Value::from(Utc::now().to_rfc3339()));
        metadata.insert("type".to_string(), Value::from(kind));
        metadata
    }

    pub(crate) fn event(
        &self,
        caller: Metadata,
        user_id: Option<&str>,
        session_id: Option<&str>,
    ) -> Metadata {
        let mut metadata = caller;
        metadata.insert("application".to_string(), Value::from(self.application.as_str()));
        metadata.insert("version".to_string(), Value::from(self.version.as_str()));
        metadata.insert("timestamp".to_string(), Value::from(Utc::now().to_rfc3339()));
        metadata.insert("type".to_string(), Value::from("custom_event"));
        if let Some(user_id) = user_id {
            metadata.insert("user_id".to_string(), Value::from(user_id));
        }
        if let Some(session_id) = session_id {
            metadata.insert("session_id".to_string(), Value::from(session_id));
        }
        metadata
    }
}
