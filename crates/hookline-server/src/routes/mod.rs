//! Route definitions for the REST API.

mod events;
mod health;
mod webhooks;

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::state::AppState;

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Event ingestion
        .route("/events", post(events::publish_event))
        // Webhook subscriptions
        .route("/webhooks", post(webhooks::register_webhook))
        .route("/webhooks", get(webhooks::list_webhooks))
        .route("/webhooks/:id", get(webhooks::get_webhook))
        .route("/webhooks/:id", patch(webhooks::update_webhook))
        .route("/webhooks/:id", axum::routing::delete(webhooks::delete_webhook))
        .route("/webhooks/:id/test", post(webhooks::send_test_webhook))
        .route("/webhooks/:id/deliveries", get(webhooks::get_deliveries))
        .route(
            "/deliveries/:id/retry",
            post(webhooks::retry_failed_webhook),
        )
        // Attach state
        .with_state(state)
}

pub use events::*;
pub use health::*;
pub use webhooks::*;
