//! Webhook subscription CRUD and delivery endpoints.

use std::collections::{HashMap, HashSet};

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use hookline_core::{
    DeliveryFilter, RegisterWebhookRequest, RetryPolicy, UpdateWebhookRequest, WebhookConfig,
    WebhookDelivery, WebhookFilter,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::state::AppState;

/// `WebhookConfig` with `secret` dropped: administrative responses never
/// echo the signing key back.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub id: Uuid,
    pub url: String,
    pub events: HashSet<String>,
    pub headers: HashMap<String, String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_delivery: Option<DateTime<Utc>>,
    pub failure_count: u32,
    pub metadata: HashMap<String, Value>,
    pub retry_policy: RetryPolicy,
    pub timeout_secs: u64,
}

impl From<WebhookConfig> for WebhookResponse {
    fn from(w: WebhookConfig) -> Self {
        Self {
            id: w.id,
            url: w.url,
            events: w.events,
            headers: w.headers,
            active: w.active,
            created_at: w.created_at,
            updated_at: w.updated_at,
            last_delivery: w.last_delivery,
            failure_count: w.failure_count,
            metadata: w.metadata,
            retry_policy: w.retry_policy,
            timeout_secs: w.timeout_secs,
        }
    }
}

/// POST /webhooks
pub async fn register_webhook(
    State(state): State<AppState>,
    Json(request): Json<RegisterWebhookRequest>,
) -> ApiResult<Json<WebhookResponse>> {
    let id = state.webhook_service.register_webhook(request)?;
    let webhook = state.webhook_service.get_webhook(id)?;
    Ok(Json(webhook.into()))
}

/// GET /webhooks/:id
pub async fn get_webhook(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WebhookResponse>> {
    let webhook = state.webhook_service.get_webhook(id)?;
    Ok(Json(webhook.into()))
}

/// Query parameters for `GET /webhooks`.
#[derive(Debug, Deserialize)]
pub struct ListWebhooksQuery {
    pub active: Option<bool>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

/// GET /webhooks
pub async fn list_webhooks(
    State(state): State<AppState>,
    Query(query): Query<ListWebhooksQuery>,
) -> ApiResult<Json<Vec<WebhookResponse>>> {
    let filter = WebhookFilter {
        active: query.active,
        limit: query.limit,
        offset: query.offset,
    };
    let webhooks = state.webhook_service.list_webhooks(filter)?;
    Ok(Json(webhooks.into_iter().map(Into::into).collect()))
}

/// PATCH /webhooks/:id
pub async fn update_webhook(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<UpdateWebhookRequest>,
) -> ApiResult<Json<WebhookResponse>> {
    let updated = state.webhook_service.update_webhook(id, patch)?;
    Ok(Json(updated.into()))
}

/// DELETE /webhooks/:id
pub async fn delete_webhook(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    state.webhook_service.delete_webhook(id)?;
    Ok(Json(serde_json::json!({ "message": "webhook deleted" })))
}

/// POST /webhooks/:id/test
pub async fn send_test_webhook(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WebhookDelivery>> {
    let delivery = state.webhook_service.send_test_webhook(id).await?;
    Ok(Json(delivery))
}

/// Query parameters for `GET /webhooks/:id/deliveries`.
#[derive(Debug, Deserialize)]
pub struct ListDeliveriesQuery {
    pub success: Option<bool>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

/// GET /webhooks/:id/deliveries
pub async fn get_deliveries(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListDeliveriesQuery>,
) -> ApiResult<Json<Vec<WebhookDelivery>>> {
    let filter = DeliveryFilter {
        success: query.success,
        limit: query.limit,
        offset: query.offset,
    };
    let deliveries = state.webhook_service.get_deliveries(id, filter)?;
    Ok(Json(deliveries))
}

/// POST /deliveries/:id/retry
pub async fn retry_failed_webhook(
    State(state): State<AppState>,
    Path(delivery_id): Path<Uuid>,
) -> ApiResult<Json<WebhookDelivery>> {
    let delivery = state
        .webhook_service
        .retry_failed_webhook(delivery_id)
        .await?;
    Ok(Json(delivery))
}
