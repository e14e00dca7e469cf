//! Adapter: bus subscriber that forwards matching events to the webhook
//! service. The bus isolates any error this returns, so delivery failures
//! here never interrupt sibling subscribers.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HooklineResult;
use crate::events::{Event, EventBus, EventSubscriber};
use crate::webhook::service::WebhookService;

/// Registers for a fixed list of event types and, on `handle`, delegates
/// to [`WebhookService::deliver_webhooks_for_event`].
pub struct EventToWebhookSubscriber {
    service: Arc<WebhookService>,
    event_types: Vec<String>,
}

impl EventToWebhookSubscriber {
    pub fn new(service: Arc<WebhookService>, event_types: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            service,
            event_types,
        })
    }

    /// Subscribe this adapter to every event type it was constructed with.
    pub fn register_with_bus(self: &Arc<Self>, bus: &EventBus) {
        for event_type in &self.event_types {
            bus.subscribe(event_type.clone(), self.clone() as Arc<dyn EventSubscriber>);
        }
    }

    /// Unsubscribe this adapter from every event type it registered for.
    pub fn unregister_from_bus(self: &Arc<Self>, bus: &EventBus) {
        let handle = self.clone() as Arc<dyn EventSubscriber>;
        for event_type in &self.event_types {
            bus.unsubscribe(event_type, &handle);
        }
    }
}

#[async_trait]
impl EventSubscriber for EventToWebhookSubscriber {
    async fn handle(&self, event: &Event) -> HooklineResult<()> {
        self.service.deliver_webhooks_for_event(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EventBusConfig;
    use crate::webhook::client::WebhookHttpClient;
    use crate::webhook::models::RegisterWebhookRequest;
    use crate::webhook::repository::InMemoryWebhookRepository;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_subscriber_delivers_matching_event() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let repo = Arc::new(InMemoryWebhookRepository::new());
        let svc = Arc::new(WebhookService::new(
            repo.clone(),
            Arc::new(WebhookHttpClient::new()),
        ));
        svc.register_webhook(RegisterWebhookRequest {
            url: server.uri(),
            events: Default::default(),
            secret: None,
            headers: Default::default(),
            retry_policy: None,
            timeout_secs: None,
            metadata: Default::default(),
        })
        .unwrap();

        let bus = EventBus::new(EventBusConfig::default());
        let subscriber = EventToWebhookSubscriber::new(svc, vec!["workflow.started".to_string()]);
        subscriber.register_with_bus(&bus);

        bus.publish(&Event::workflow_started("wf1", "workflow-engine"))
            .await;

        let deliveries = repo
            .list_deliveries(
                repo.list_webhooks(Default::default()).unwrap()[0].id,
                Default::default(),
            )
            .unwrap();
        assert_eq!(deliveries.len(), 1);
    }
}
