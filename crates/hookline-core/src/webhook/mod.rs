//! HMAC-signed, retried HTTP delivery of events to registered webhook
//! subscriptions: signing, the HTTP client, persistence, the bounded
//! delivery queue, and the service tying them together.

mod cancellation;
mod client;
mod models;
mod queue;
mod repository;
mod service;
mod signer;
mod subscriber;

pub use cancellation::CancellationToken;
pub use client::WebhookHttpClient;
pub use models::{
    DeliveryResult, RegisterWebhookRequest, UpdateWebhookRequest, WebhookConfig, WebhookDelivery,
    WebhookRequest,
};
pub use queue::{DeliveryItem, DeliveryQueue};
pub use repository::{
    DeliveryFilter, InMemoryWebhookRepository, SqliteWebhookRepository, WebhookFilter,
    WebhookRepository,
};
pub use service::WebhookService;
pub use signer::{extract_signature, verify_signature, Signer, SIGNATURE_HEADERS};
pub use subscriber::EventToWebhookSubscriber;
