//! CRUD for webhook subscriptions, event-matched delivery, and the
//! failure-count state machine that auto-disables misbehaving endpoints.

use std::sync::Arc;

use backon::{ExponentialBuilder, Retryable};
use chrono::Utc;
use uuid::Uuid;

use crate::config::WebhookServiceConfig;
use crate::error::{HooklineError, HooklineResult};
use crate::events::Event;
use crate::logging::{Logger, TracingLogger};
use crate::webhook::cancellation::CancellationToken;
use crate::webhook::client::WebhookHttpClient;
use crate::webhook::models::{
    validate_url, RegisterWebhookRequest, UpdateWebhookRequest, WebhookConfig, WebhookDelivery,
    WebhookRequest,
};
use crate::webhook::repository::{DeliveryFilter, WebhookFilter, WebhookRepository};

/// CRUD + delivery orchestration for webhook subscriptions. Delivers
/// directly against the HTTP client (the simpler, spec-baseline variant);
/// an implementation may instead hand off to [`crate::webhook::queue::DeliveryQueue`]
/// as long as persistence still happens after the HTTP call.
pub struct WebhookService {
    repository: Arc<dyn WebhookRepository>,
    client: Arc<WebhookHttpClient>,
    config: WebhookServiceConfig,
    logger: Arc<dyn Logger>,
}

impl WebhookService {
    pub fn new(repository: Arc<dyn WebhookRepository>, client: Arc<WebhookHttpClient>) -> Self {
        Self::with_config(repository, client, WebhookServiceConfig::default())
    }

    pub fn with_config(
        repository: Arc<dyn WebhookRepository>,
        client: Arc<WebhookHttpClient>,
        config: WebhookServiceConfig,
    ) -> Self {
        Self {
            repository,
            client,
            config,
            logger: Arc::new(TracingLogger),
        }
    }

    pub fn register_webhook(&self, req: RegisterWebhookRequest) -> HooklineResult<Uuid> {
        validate_url(&req.url)?;
        let now = Utc::now();
        let webhook = WebhookConfig {
            id: Uuid::new_v4(),
            url: req.url,
            events: req.events,
            secret: req.secret,
            headers: req.headers,
            active: true,
            created_at: now,
            updated_at: now,
            last_delivery: None,
            failure_count: 0,
            metadata: req.metadata,
            retry_policy: req.retry_policy.unwrap_or_default(),
            timeout_secs: req
                .timeout_secs
                .unwrap_or(self.config.default_timeout_secs),
        };
        let id = webhook.id;
        self.repository.create_webhook(webhook)?;
        self.logger.info(&format!("registered webhook {}", id));
        Ok(id)
    }

    pub fn get_webhook(&self, id: Uuid) -> HooklineResult<WebhookConfig> {
        self.repository.get_webhook(id)
    }

    pub fn list_webhooks(&self, filter: WebhookFilter) -> HooklineResult<Vec<WebhookConfig>> {
        self.repository.list_webhooks(filter)
    }

    pub fn update_webhook(
        &self,
        id: Uuid,
        patch: UpdateWebhookRequest,
    ) -> HooklineResult<WebhookConfig> {
        let updated = self.repository.update_webhook(id, patch)?;
        self.logger.info(&format!("updated webhook {}", id));
        Ok(updated)
    }

    pub fn delete_webhook(&self, id: Uuid) -> HooklineResult<()> {
        self.repository.delete_webhook(id)?;
        self.logger.info(&format!("deleted webhook {}", id));
        Ok(())
    }

    pub fn get_deliveries(
        &self,
        webhook_id: Uuid,
        filter: DeliveryFilter,
    ) -> HooklineResult<Vec<WebhookDelivery>> {
        self.repository.list_deliveries(webhook_id, filter)
    }

    /// Reachability probe: GET with a short timeout, retried with
    /// exponential backoff via `backon` — this call has no per-attempt
    /// bookkeeping requirement, unlike the main delivery path.
    pub async fn validate_webhook_url(&self, url: &str) -> HooklineResult<bool> {
        validate_url(url)?;

        let client = reqwest::Client::new();
        let url = url.to_string();
        let probe = || {
            let client = client.clone();
            let url = url.clone();
            async move {
                client
                    .get(&url)
                    .timeout(std::time::Duration::from_secs(5))
                    .send()
                    .await
            }
        };

        match probe
            .retry(&ExponentialBuilder::default().with_max_times(3))
            .await
        {
            Ok(response) => Ok(response.status().as_u16() < 500),
            Err(_) => Ok(false),
        }
    }

    /// Deliver `event` to every active, matching webhook. A failure
    /// delivering to one webhook is logged and never short-circuits the
    /// remaining webhooks.
    pub async fn deliver_webhooks_for_event(&self, event: &Event) -> HooklineResult<()> {
        let webhooks = self.repository.get_webhooks_by_event(&event.event_type)?;
        if webhooks.is_empty() {
            return Ok(());
        }

        let payload = event.to_canonical_json()?;

        for webhook in webhooks {
            if let Err(err) = self.deliver_to_webhook(&webhook, event, &payload).await {
                self.logger.warn(&format!(
                    "delivery to webhook {} failed: {}",
                    webhook.id, err
                ));
            }
        }
        Ok(())
    }

    async fn deliver_to_webhook(
        &self,
        webhook: &WebhookConfig,
        event: &Event,
        payload: &[u8],
    ) -> HooklineResult<WebhookDelivery> {
        let request = WebhookRequest {
            url: webhook.url.clone(),
            payload: payload.to_vec(),
            headers: webhook.headers.clone(),
            secret: webhook.secret.clone(),
            timeout: std::time::Duration::from_secs(webhook.timeout_secs),
            event_type: event.event_type.clone(),
            event_id: event.id,
        };

        let result = self
            .client
            .send(&request, &webhook.retry_policy, &CancellationToken::new())
            .await;
        let delivered_at = Utc::now();
        let next_retry_at = if !result.success && result.attempts < webhook.retry_policy.max_attempts
        {
            Some(delivered_at + webhook.retry_policy.calculate_backoff(result.attempts))
        } else {
            None
        };

        let delivery = WebhookDelivery {
            id: Uuid::new_v4(),
            webhook_id: webhook.id,
            event_id: event.id,
            event_type: event.event_type.clone(),
            url: webhook.url.clone(),
            request_body: String::from_utf8_lossy(payload).to_string(),
            status_code: result.status_code,
            response_body: result.response_body,
            duration_ms: result.duration.as_millis() as u64,
            attempts: result.attempts,
            success: result.success,
            error: result.error,
            delivered_at,
            next_retry_at,
        };

        self.repository.save_delivery(delivery.clone())?;

        if delivery.success {
            self.repository.reset_failure_count(webhook.id)?;
            self.repository.update_webhook(
                webhook.id,
                UpdateWebhookRequest {
                    last_delivery: Some(delivered_at),
                    ..Default::default()
                },
            )?;
        } else {
            let failure_count = self.repository.increment_failure_count(webhook.id)?;
            if failure_count >= self.config.max_failure_count {
                self.repository.update_webhook(
                    webhook.id,
                    UpdateWebhookRequest {
                        active: Some(false),
                        ..Default::default()
                    },
                )?;
                self.logger.warn(&format!(
                    "webhook {} disabled after {} consecutive failures",
                    webhook.id, failure_count
                ));
            }
        }

        Ok(delivery)
    }

    /// Re-send a previously failed delivery, updating its record in place.
    /// Refuses if the webhook has since been disabled.
    pub async fn retry_failed_webhook(&self, delivery_id: Uuid) -> HooklineResult<WebhookDelivery> {
        let delivery = self.repository.get_delivery(delivery_id)?;
        let webhook = self.repository.get_webhook(delivery.webhook_id)?;
        if !webhook.active {
            return Err(HooklineError::validation(format!(
                "webhook {} is inactive",
                webhook.id
            )));
        }

        let request = WebhookRequest {
            url: webhook.url.clone(),
            payload: delivery.request_body.clone().into_bytes(),
            headers: webhook.headers.clone(),
            secret: webhook.secret.clone(),
            timeout: std::time::Duration::from_secs(webhook.timeout_secs),
            event_type: delivery.event_type.clone(),
            event_id: delivery.event_id,
        };
        let result = self
            .client
            .send(&request, &webhook.retry_policy, &CancellationToken::new())
            .await;

        let delivered_at = Utc::now();
        let attempts = delivery.attempts + result.attempts;
        let next_retry_at = if !result.success && attempts < webhook.retry_policy.max_attempts {
            Some(delivered_at + webhook.retry_policy.calculate_backoff(attempts))
        } else {
            None
        };

        let updated = WebhookDelivery {
            status_code: result.status_code,
            response_body: result.response_body,
            duration_ms: result.duration.as_millis() as u64,
            attempts,
            success: result.success,
            error: result.error,
            delivered_at,
            next_retry_at,
            ..delivery
        };
        self.repository.save_delivery(updated.clone())?;

        if updated.success {
            self.repository.reset_failure_count(webhook.id)?;
        } else {
            self.repository.increment_failure_count(webhook.id)?;
        }

        Ok(updated)
    }

    /// Synthesize and deliver a `webhook.test` event once; no retry
    /// scheduling semantics on this path.
    pub async fn send_test_webhook(&self, webhook_id: Uuid) -> HooklineResult<WebhookDelivery> {
        let webhook = self.repository.get_webhook(webhook_id)?;
        let event = Event::webhook_test(webhook_id.to_string());
        let payload = event.to_canonical_json()?;
        self.deliver_to_webhook(&webhook, &event, &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::repository::InMemoryWebhookRepository;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(repo: Arc<dyn WebhookRepository>) -> WebhookService {
        WebhookService::new(repo, Arc::new(WebhookHttpClient::new()))
    }

    #[tokio::test]
    async fn test_register_then_get_webhook() {
        let repo = Arc::new(InMemoryWebhookRepository::new());
        let svc = service(repo);
        let id = svc
            .register_webhook(RegisterWebhookRequest {
                url: "https://example.com/hook".to_string(),
                events: Default::default(),
                secret: None,
                headers: Default::default(),
                retry_policy: None,
                timeout_secs: None,
                metadata: Default::default(),
            })
            .unwrap();
        let webhook = svc.get_webhook(id).unwrap();
        assert!(webhook.active);
        assert_eq!(webhook.failure_count, 0);
    }

    #[tokio::test]
    async fn test_register_webhook_rejects_malformed_url() {
        let repo = Arc::new(InMemoryWebhookRepository::new());
        let svc = service(repo);
        let result = svc.register_webhook(RegisterWebhookRequest {
            url: "not a url".to_string(),
            events: Default::default(),
            secret: None,
            headers: Default::default(),
            retry_policy: None,
            timeout_secs: None,
            metadata: Default::default(),
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_auto_disable_after_max_failure_count() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let repo = Arc::new(InMemoryWebhookRepository::new());
        let svc = WebhookService::with_config(
            repo.clone(),
            Arc::new(WebhookHttpClient::new()),
            WebhookServiceConfig {
                max_failure_count: 3,
                default_timeout_secs: 5,
            },
        );
        let id = svc
            .register_webhook(RegisterWebhookRequest {
                url: server.uri(),
                events: Default::default(),
                secret: None,
                headers: Default::default(),
                retry_policy: Some(crate::config::RetryPolicy {
                    max_attempts: 1,
                    initial_interval_ms: 10,
                    backoff_multiplier: 2.0,
                }),
                timeout_secs: None,
                metadata: Default::default(),
            })
            .unwrap();

        let event = Event::job_failed("j1", "timeout", "job-runner");
        for _ in 0..3 {
            svc.deliver_webhooks_for_event(&event).await.unwrap();
        }

        let webhook = svc.get_webhook(id).unwrap();
        assert!(!webhook.active);

        let matches = repo.get_webhooks_by_event("job.failed").unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn test_send_test_webhook() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let repo = Arc::new(InMemoryWebhookRepository::new());
        let svc = service(repo);
        let id = svc
            .register_webhook(RegisterWebhookRequest {
                url: server.uri(),
                events: Default::default(),
                secret: None,
                headers: Default::default(),
                retry_policy: None,
                timeout_secs: None,
                metadata: Default::default(),
            })
            .unwrap();

        let delivery = svc.send_test_webhook(id).await.unwrap();
        assert!(delivery.success);
    }
}
