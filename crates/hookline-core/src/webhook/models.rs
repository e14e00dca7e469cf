//! Data model for webhook subscriptions and delivery history.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::RetryPolicy;
use crate::error::{HooklineError, HooklineResult};

/// Syntactic validation of a webhook URL: must parse as an absolute URL
/// with an `http`/`https` scheme and a host. Does not probe reachability —
/// see [`crate::webhook::service::WebhookService::validate_webhook_url`]
/// for that.
pub fn validate_url(url: &str) -> HooklineResult<()> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|_| HooklineError::invalid_url(format!("malformed URL: {}", url)))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(HooklineError::invalid_url(format!(
            "URL must use http or https: {}",
            url
        )));
    }
    if parsed.host_str().is_none() {
        return Err(HooklineError::invalid_url(format!(
            "URL is missing a host: {}",
            url
        )));
    }
    Ok(())
}

/// A webhook subscription: an external HTTP endpoint subscribed to a set
/// of event types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub id: Uuid,
    pub url: String,
    /// Event-type tags this webhook receives. An empty set means "all
    /// events".
    pub events: HashSet<String>,
    /// Shared signing key. Never serialized outbound in listing APIs —
    /// callers building a server response DTO must drop this field.
    pub secret: Option<String>,
    /// Extra headers merged onto every outbound request.
    pub headers: HashMap<String, String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_delivery: Option<DateTime<Utc>>,
    /// Monotonic counter of *consecutive* failures; resets to 0 on success.
    pub failure_count: u32,
    pub metadata: HashMap<String, Value>,
    #[serde(default)]
    pub retry_policy: RetryPolicy,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl WebhookConfig {
    /// Returns true iff this webhook should receive `event_type`: an empty
    /// `events` set matches everything.
    pub fn should_receive(&self, event_type: &str) -> bool {
        self.events.is_empty() || self.events.contains(event_type)
    }
}

/// Request payload for `RegisterWebhook`.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterWebhookRequest {
    pub url: String,
    #[serde(default)]
    pub events: HashSet<String>,
    pub secret: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub retry_policy: Option<RetryPolicy>,
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

/// Patch payload for `UpdateWebhook`: only `Some` fields are applied.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateWebhookRequest {
    pub url: Option<String>,
    pub events: Option<HashSet<String>>,
    pub secret: Option<String>,
    pub headers: Option<HashMap<String, String>>,
    pub active: Option<bool>,
    pub retry_policy: Option<RetryPolicy>,
    pub timeout_secs: Option<u64>,
    pub metadata: Option<HashMap<String, Value>>,
    /// Server-managed: set by the delivery path on success, not exposed on
    /// the administrative `UpdateWebhook` API's request DTO.
    pub last_delivery: Option<DateTime<Utc>>,
}

/// The history record of one delivery attempt chain: one logical send of
/// one event to one webhook, possibly comprising multiple HTTP attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub webhook_id: Uuid,
    pub event_id: Uuid,
    pub event_type: String,
    pub url: String,
    pub request_body: String,
    pub status_code: Option<u16>,
    pub response_body: Option<String>,
    pub duration_ms: u64,
    /// 1-based count of HTTP calls made within this delivery.
    pub attempts: u32,
    pub success: bool,
    /// Non-empty iff `success == false`.
    pub error: Option<String>,
    pub delivered_at: DateTime<Utc>,
    /// Present iff `success == false` and `attempts < MaxAttempts`.
    pub next_retry_at: Option<DateTime<Utc>>,
}

/// A single outbound webhook send, independent of retry bookkeeping. This
/// is what [`crate::webhook::client::WebhookHttpClient`] consumes.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub url: String,
    pub payload: Vec<u8>,
    pub headers: HashMap<String, String>,
    pub secret: Option<String>,
    pub timeout: std::time::Duration,
    pub event_type: String,
    pub event_id: Uuid,
}

/// Outcome of a (possibly multi-attempt) delivery.
#[derive(Debug, Clone)]
pub struct DeliveryResult {
    pub success: bool,
    pub status_code: Option<u16>,
    pub response_body: Option<String>,
    pub duration: std::time::Duration,
    pub attempts: u32,
    pub error: Option<String>,
}
