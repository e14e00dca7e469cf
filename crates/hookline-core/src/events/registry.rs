//! Optional DSL-declared event schemas and handler routing.
//!
//! Schemas describe the expected shape of an event's `data` map; validation
//! is lenient (missing optional fields are fine, type mismatches fail).
//! `emit_event` re-publishes through the dispatcher and guards against
//! runaway re-emission with a depth limit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::error::{HooklineError, HooklineResult};
use crate::events::dispatcher::EventDispatcher;
use crate::events::event::{is_valid_event_type, EventBuilder};

/// Where a registered handler routes: the spec names four kinds of
/// downstream action for an emitted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventHandlerKind {
    Workflow,
    Integration,
    Emit,
    Webhook,
}

/// A field's declared JSON type, used for lenient schema validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Bool,
    Object,
    Array,
}

impl FieldType {
    fn matches(self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Bool => value.is_boolean(),
            FieldType::Object => value.is_object(),
            FieldType::Array => value.is_array(),
        }
    }
}

/// A registered event schema: field name -> declared type, plus which
/// handler kind is bound to it.
#[derive(Debug, Clone)]
pub struct EventSchema {
    pub name: String,
    pub fields: HashMap<String, FieldType>,
    pub handler: EventHandlerKind,
}

const DEFAULT_MAX_EMIT_DEPTH: u32 = 16;

/// Default: `EmitEvent` re-entrancy beyond this depth is refused, guarding
/// against a handler that emits the event type that triggered it.
pub struct EventRegistry {
    schemas: RwLock<HashMap<String, EventSchema>>,
    dispatcher: Arc<EventDispatcher>,
    max_emit_depth: u32,
    emit_depth: AtomicU32,
}

impl EventRegistry {
    pub fn new(dispatcher: Arc<EventDispatcher>) -> Self {
        Self::with_max_emit_depth(dispatcher, DEFAULT_MAX_EMIT_DEPTH)
    }

    pub fn with_max_emit_depth(dispatcher: Arc<EventDispatcher>, max_emit_depth: u32) -> Self {
        Self {
            schemas: RwLock::new(HashMap::new()),
            dispatcher,
            max_emit_depth,
            emit_depth: AtomicU32::new(0),
        }
    }

    /// Register a schema under `schema.name`. Overwrites any prior schema
    /// of the same name.
    pub fn register_schema(&self, schema: EventSchema) -> HooklineResult<()> {
        if !is_valid_event_type(&schema.name) {
            return Err(HooklineError::invalid_event_type(format!(
                "schema name {} does not match the event-type grammar",
                schema.name
            )));
        }
        self.schemas
            .write()
            .expect("schema lock poisoned")
            .insert(schema.name.clone(), schema);
        Ok(())
    }

    /// Validate `payload` against the registered schema for `name` (if any)
    /// then dispatch it as an event. Missing optional fields are tolerated;
    /// a declared field present with the wrong JSON type is a validation
    /// error. Guards against runaway re-emission via `MaxEmitDepth`.
    pub async fn emit_event(
        &self,
        name: &str,
        payload: HashMap<String, Value>,
        source: impl Into<String>,
    ) -> HooklineResult<()> {
        let depth = self.emit_depth.fetch_add(1, Ordering::SeqCst) + 1;
        let result = self.emit_event_inner(name, payload, source, depth).await;
        self.emit_depth.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn emit_event_inner(
        &self,
        name: &str,
        payload: HashMap<String, Value>,
        source: impl Into<String>,
        depth: u32,
    ) -> HooklineResult<()> {
        if depth > self.max_emit_depth {
            return Err(HooklineError::validation(format!(
                "emit depth exceeded max of {} for event {}",
                self.max_emit_depth, name
            )));
        }

        if let Some(schema) = self
            .schemas
            .read()
            .expect("schema lock poisoned")
            .get(name)
            .cloned()
        {
            self.validate_payload(&schema, &payload)?;
        }

        let event = EventBuilder::new(name.to_string())
            .source(source)
            .data(payload)
            .build();
        self.dispatcher.dispatch(&event).await
    }

    fn validate_payload(
        &self,
        schema: &EventSchema,
        payload: &HashMap<String, Value>,
    ) -> HooklineResult<()> {
        for (field, expected_type) in &schema.fields {
            if let Some(value) = payload.get(field) {
                if !expected_type.matches(value) {
                    return Err(HooklineError::SchemaValidation(format!(
                        "field {} of schema {} has the wrong type",
                        field, schema.name
                    )));
                }
            }
        }
        Ok(())
    }
}
