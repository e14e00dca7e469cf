//! Factory for wiring `hookline-core` components into an `AppState`.

use std::sync::Arc;

use hookline_core::{
    BackgroundRuntime, EventDispatcher, EventToWebhookSubscriber, WebhookService,
    WebhookServiceConfig,
};

use crate::state::AppState;

/// Event types the `/events` producer endpoint and the typed `Event`
/// convenience constructors know about. `EventToWebhookSubscriber` is
/// registered for exactly this list, so a webhook subscribed to a custom
/// event type outside it will not receive deliveries through the bus —
/// only through a direct `WebhookService::deliver_webhooks_for_event` call.
pub fn known_event_types() -> Vec<String> {
    vec![
        "workflow.started".to_string(),
        "job.failed".to_string(),
        "agent.executed".to_string(),
        "test.suite.completed".to_string(),
        "webhook.triggered".to_string(),
        "email.sent".to_string(),
        "webhook.test".to_string(),
    ]
}

/// Build an `AppState` around an already-constructed `BackgroundRuntime`:
/// creates a `WebhookService` over the runtime's repository and HTTP
/// client, registers an `EventToWebhookSubscriber` for `known_event_types`,
/// and wraps the bus in a persist-then-publish `EventDispatcher`.
pub fn build_app_state(runtime: BackgroundRuntime, config: WebhookServiceConfig) -> AppState {
    let bus = runtime.bus();
    let repository = runtime.repository();
    let client = runtime.client();

    let webhook_service = Arc::new(WebhookService::with_config(
        repository.clone(),
        client,
        config,
    ));

    let subscriber = EventToWebhookSubscriber::new(webhook_service.clone(), known_event_types());
    subscriber.register_with_bus(&bus);

    let dispatcher = Arc::new(EventDispatcher::new(bus.clone()));

    AppState::new(bus, dispatcher, webhook_service, repository, runtime)
}
