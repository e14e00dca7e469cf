//! Bounded delivery queue: `WorkerCount` workers draining a single channel,
//! each calling the HTTP client then persisting the result and updating
//! the webhook's failure-count / retry-schedule state.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex as AsyncMutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::DeliveryQueueConfig;
use crate::logging::{Logger, TracingLogger};
use crate::webhook::cancellation::CancellationToken;
use crate::webhook::client::WebhookHttpClient;
use crate::webhook::models::{WebhookConfig, WebhookDelivery, WebhookRequest};
use crate::webhook::repository::WebhookRepository;
use crate::events::Event;

/// One unit of delivery work: a matched webhook plus the event to send it.
#[derive(Debug, Clone)]
pub struct DeliveryItem {
    pub webhook: WebhookConfig,
    pub event: Event,
}

struct Shared {
    sender: RwLock<Option<mpsc::Sender<DeliveryItem>>>,
    receiver: Arc<AsyncMutex<mpsc::Receiver<DeliveryItem>>>,
    stopped: RwLock<bool>,
    client: Arc<WebhookHttpClient>,
    repository: Arc<dyn WebhookRepository>,
    logger: Arc<dyn Logger>,
}

/// Bounded async queue with N workers calling the HTTP client, grounded on
/// the same background-worker shape as [`crate::events::EventBus`].
pub struct DeliveryQueue {
    shared: Arc<Shared>,
    workers: AsyncMutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

impl DeliveryQueue {
    pub fn new(
        config: DeliveryQueueConfig,
        client: Arc<WebhookHttpClient>,
        repository: Arc<dyn WebhookRepository>,
    ) -> Self {
        Self::with_logger(config, client, repository, Arc::new(TracingLogger))
    }

    pub fn with_logger(
        config: DeliveryQueueConfig,
        client: Arc<WebhookHttpClient>,
        repository: Arc<dyn WebhookRepository>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_size.max(1));
        Self {
            shared: Arc::new(Shared {
                sender: RwLock::new(Some(sender)),
                receiver: Arc::new(AsyncMutex::new(receiver)),
                stopped: RwLock::new(false),
                client,
                repository,
                logger,
            }),
            workers: AsyncMutex::new(Vec::new()),
            worker_count: config.worker_count.max(1),
        }
    }

    /// Idempotent: spawns `WorkerCount` workers that loop reading the
    /// channel until it closes.
    pub async fn start(&self) {
        let mut workers = self.workers.lock().await;
        if !workers.is_empty() {
            return;
        }
        for _ in 0..self.worker_count {
            let shared = self.shared.clone();
            workers.push(tokio::spawn(async move {
                Self::worker_loop(shared).await;
            }));
        }
    }

    async fn worker_loop(shared: Arc<Shared>) {
        loop {
            let item = {
                let mut receiver = shared.receiver.lock().await;
                receiver.recv().await
            };
            match item {
                Some(item) => Self::process_item(&shared, item).await,
                None => break,
            }
        }
    }

    async fn process_item(shared: &Shared, item: DeliveryItem) {
        let DeliveryItem { webhook, event } = item;
        let payload = event.to_canonical_json().unwrap_or_default();

        let request = WebhookRequest {
            url: webhook.url.clone(),
            payload: payload.clone(),
            headers: webhook.headers.clone(),
            secret: webhook.secret.clone(),
            timeout: std::time::Duration::from_secs(webhook.timeout_secs),
            event_type: event.event_type.clone(),
            event_id: event.id,
        };

        let result = shared
            .client
            .send(&request, &webhook.retry_policy, &CancellationToken::new())
            .await;

        let delivered_at = Utc::now();
        let next_retry_at = if !result.success && result.attempts < webhook.retry_policy.max_attempts {
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
            request_body: String::from_utf8_lossy(&payload).to_string(),
            status_code: result.status_code,
            response_body: result.response_body.clone(),
            duration_ms: result.duration.as_millis() as u64,
            attempts: result.attempts,
            success: result.success,
            error: result.error.clone(),
            delivered_at,
            next_retry_at,
        };

        if let Err(err) = shared.repository.save_delivery(delivery.clone()) {
            shared
                .logger
                .error(&format!("failed to save delivery record: {}", err));
        }

        if result.success {
            if let Err(err) = shared.repository.reset_failure_count(webhook.id) {
                shared
                    .logger
                    .error(&format!("failed to reset failure count: {}", err));
            }
            shared.logger.info(&format!(
                "delivered {} to webhook {} in {} attempt(s)",
                event.event_type, webhook.id, delivery.attempts
            ));
        } else {
            if let Err(err) = shared.repository.increment_failure_count(webhook.id) {
                shared
                    .logger
                    .error(&format!("failed to increment failure count: {}", err));
            }
            shared.logger.warn(&format!(
                "delivery of {} to webhook {} failed after {} attempt(s): {}",
                event.event_type,
                webhook.id,
                delivery.attempts,
                delivery.error.as_deref().unwrap_or("unknown error")
            ));
        }
    }

    /// Returns false immediately if stopped or the channel is full.
    pub async fn enqueue(&self, item: DeliveryItem) -> bool {
        if *self.shared.stopped.read().await {
            return false;
        }
        let sender = self.shared.sender.read().await.clone();
        match sender {
            Some(sender) => sender.try_send(item).is_ok(),
            None => false,
        }
    }

    /// Idempotent shutdown: stop accepting new items, close the channel,
    /// and wait for every worker to drain the backlog.
    pub async fn stop(&self) {
        {
            let mut stopped = self.shared.stopped.write().await;
            if *stopped {
                return;
            }
            *stopped = true;
        }
        self.shared.sender.write().await.take();
        let handles = {
            let mut workers = self.workers.lock().await;
            std::mem::take(&mut *workers)
        };
        for handle in handles {
            let _ = handle.await;
        }
    }
}
