//! Canonical event record and fluent builder.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A dotted event-type tag, e.g. `workflow.started` or `job.failed`.
///
/// Validated against `^[A-Za-z][A-Za-z0-9_]*(\.[A-Za-z][A-Za-z0-9_]*)?$` by
/// [`EventBuilder::build`] and [`crate::events::registry::EventRegistry`].
pub type EventType = String;

pub(crate) static EVENT_TYPE_PATTERN: once_cell::sync::Lazy<regex::Regex> =
    once_cell::sync::Lazy::new(|| {
        regex::Regex::new(r"^[A-Za-z][A-Za-z0-9_]*(\.[A-Za-z][A-Za-z0-9_]*)?$").unwrap()
    });

/// Returns true if `event_type` matches the event-type grammar.
pub fn is_valid_event_type(event_type: &str) -> bool {
    EVENT_TYPE_PATTERN.is_match(event_type)
}

/// An immutable record of something that happened, with a typed tag,
/// timestamp, and payload. Once published, every field must be preserved
/// bit-for-bit across any transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub data: HashMap<String, Value>,
    pub metadata: HashMap<String, String>,
}

impl Event {
    /// Start building an event of the given type.
    pub fn builder(event_type: impl Into<String>) -> EventBuilder {
        EventBuilder::new(event_type)
    }

    /// Canonical JSON encoding used for webhook payloads and persistence:
    /// exactly the six fields, preserved bit-for-bit.
    pub fn to_canonical_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Fluent constructor for [`Event`]. Defaults to a fresh UUID, the current
/// UTC time, and empty `data`/`metadata` maps.
#[derive(Debug, Clone)]
pub struct EventBuilder {
    id: Option<Uuid>,
    event_type: String,
    source: String,
    timestamp: Option<DateTime<Utc>>,
    data: HashMap<String, Value>,
    metadata: HashMap<String, String>,
}

impl EventBuilder {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            id: None,
            event_type: event_type.into(),
            source: String::new(),
            timestamp: None,
            data: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn data(mut self, data: HashMap<String, Value>) -> Self {
        self.data = data;
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Finalize the event. Does not validate the event-type grammar: the
    /// bus and registry validate at the boundaries that require it.
    pub fn build(self) -> Event {
        Event {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            event_type: self.event_type,
            source: self.source,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            data: self.data,
            metadata: self.metadata,
        }
    }
}

impl Event {
    /// `workflow.started` convenience constructor.
    pub fn workflow_started(workflow_id: impl Into<String>, source: impl Into<String>) -> Event {
        EventBuilder::new("workflow.started")
            .source(source)
            .with_data("workflowId", Value::String(workflow_id.into()))
            .build()
    }

    /// `job.failed` convenience constructor.
    pub fn job_failed(
        job_id: impl Into<String>,
        reason: impl Into<String>,
        source: impl Into<String>,
    ) -> Event {
        EventBuilder::new("job.failed")
            .source(source)
            .with_data("jobId", Value::String(job_id.into()))
            .with_data("reason", Value::String(reason.into()))
            .build()
    }

    /// `agent.executed` convenience constructor.
    pub fn agent_executed(
        agent_id: impl Into<String>,
        duration_secs: f64,
        source: impl Into<String>,
    ) -> Event {
        EventBuilder::new("agent.executed")
            .source(source)
            .with_data("agentId", Value::String(agent_id.into()))
            .with_data(
                "durationSeconds",
                Value::from(serde_json::Number::from_f64(duration_secs).unwrap_or(0.into())),
            )
            .build()
    }

    /// `test.suite.completed` convenience constructor.
    pub fn test_suite_completed(
        suite_name: impl Into<String>,
        passed: bool,
        source: impl Into<String>,
    ) -> Event {
        EventBuilder::new("test.suite.completed")
            .source(source)
            .with_data("suiteName", Value::String(suite_name.into()))
            .with_data("passed", Value::Bool(passed))
            .build()
    }

    /// `webhook.triggered` convenience constructor.
    pub fn webhook_triggered(webhook_id: impl Into<String>, source: impl Into<String>) -> Event {
        EventBuilder::new("webhook.triggered")
            .source(source)
            .with_data("webhookId", Value::String(webhook_id.into()))
            .build()
    }

    /// `email.sent` convenience constructor.
    pub fn email_sent(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        source: impl Into<String>,
    ) -> Event {
        EventBuilder::new("email.sent")
            .source(source)
            .with_data("recipient", Value::String(recipient.into()))
            .with_data("subject", Value::String(subject.into()))
            .build()
    }

    /// `webhook.test` constructor used by `SendTestWebhook`.
    pub fn webhook_test(webhook_id: impl Into<String>) -> Event {
        EventBuilder::new("webhook.test")
            .source("hookline")
            .with_data("webhookId", Value::String(webhook_id.into()))
            .with_data("test", Value::Bool(true))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let event = EventBuilder::new("workflow.started").build();
        assert_eq!(event.event_type, "workflow.started");
        assert!(event.data.is_empty());
        assert!(event.metadata.is_empty());
    }

    #[test]
    fn test_builder_chained_fields_preserved() {
        let id = Uuid::new_v4();
        let ts = Utc::now();
        let event = EventBuilder::new("job.failed")
            .id(id)
            .source("job-runner")
            .timestamp(ts)
            .with_data("jobId", Value::String("j1".into()))
            .with_metadata("trace", "abc")
            .build();
        assert_eq!(event.id, id);
        assert_eq!(event.source, "job-runner");
        assert_eq!(event.timestamp, ts);
        assert_eq!(event.data["jobId"], Value::String("j1".into()));
        assert_eq!(event.metadata["trace"], "abc");
    }

    #[test]
    fn test_event_type_grammar() {
        assert!(is_valid_event_type("workflow.started"));
        assert!(is_valid_event_type("job_failed"));
        assert!(!is_valid_event_type("1invalid"));
        assert!(!is_valid_event_type("bad type"));
        assert!(!is_valid_event_type(""));
    }

    #[test]
    fn test_typed_constructors() {
        let event = Event::workflow_started("wf1", "workflow-engine");
        assert_eq!(event.event_type, "workflow.started");
        assert_eq!(event.data["workflowId"], Value::String("wf1".into()));

        let event = Event::webhook_test("wh1");
        assert_eq!(event.data["test"], Value::Bool(true));
    }

    #[test]
    fn test_canonical_json_roundtrip() {
        let event = Event::job_failed("j1", "timeout", "job-runner");
        let bytes = event.to_canonical_json().unwrap();
        let decoded: Event = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, event);
    }
}
