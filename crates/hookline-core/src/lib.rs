//! hookline-core - event bus and webhook delivery engine.
//!
//! Accepts domain events produced by other subsystems, fans them out to
//! in-process subscribers with strong isolation, and asynchronously
//! delivers matching events to external HTTP webhook endpoints with
//! signed payloads, bounded retries, and failure-aware subscription
//! lifecycle management.
//!
//! # Example
//!
//! ```ignore
//! use hookline_core::{EventBus, EventBuilder};
//!
//! let bus = EventBus::new(Default::default());
//! let event = EventBuilder::new("workflow.completed").source("workflow-engine").build();
//! bus.publish(&event).await;
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod runtime;
pub mod webhook;

pub use config::{DeliveryQueueConfig, EventBusConfig, RetryPolicy, WebhookServiceConfig};
pub use error::{ErrorCode, HooklineError, HooklineResult};
pub use events::{
    is_valid_event_type, Event, EventBuilder, EventBus, EventDispatcher, EventRegistry,
    EventSubscriber, EventType,
};
pub use logging::{Logger, TracingLogger};
pub use runtime::{BackgroundRuntime, RuntimeConfig};
pub use webhook::{
    extract_signature, verify_signature, DeliveryFilter, DeliveryQueue, EventToWebhookSubscriber,
    InMemoryWebhookRepository, RegisterWebhookRequest, Signer, SqliteWebhookRepository,
    UpdateWebhookRequest, WebhookConfig, WebhookDelivery, WebhookFilter, WebhookHttpClient,
    WebhookRepository, WebhookService,
};
