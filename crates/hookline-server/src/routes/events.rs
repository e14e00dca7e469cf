//! Event ingestion endpoint: the producer-facing entry point into the bus.

use std::collections::HashMap;

use axum::{extract::State, Json};
use hookline_core::{is_valid_event_type, Event, EventBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Request payload for `POST /events`.
#[derive(Debug, Deserialize)]
pub struct PublishEventRequest {
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    #[serde(default)]
    pub data: HashMap<String, Value>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// When true, persist synchronously but fan out to subscribers on a
    /// background task instead of blocking the response on delivery.
    #[serde(default)]
    pub r#async: bool,
}

#[derive(Debug, Serialize)]
pub struct PublishEventResponse {
    pub id: Uuid,
}

/// POST /events
pub async fn publish_event(
    State(state): State<AppState>,
    Json(request): Json<PublishEventRequest>,
) -> ApiResult<Json<PublishEventResponse>> {
    if !is_valid_event_type(&request.event_type) {
        return Err(ApiError::validation(format!(
            "invalid event type: {}",
            request.event_type
        )));
    }

    let event: Event = EventBuilder::new(request.event_type)
        .source(request.source)
        .data(request.data)
        .metadata(request.metadata)
        .build();
    let id = event.id;

    if request.r#async {
        state.dispatcher.dispatch_async(event).await?;
    } else {
        state.dispatcher.dispatch(&event).await?;
    }

    Ok(Json(PublishEventResponse { id }))
}
