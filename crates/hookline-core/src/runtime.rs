//! Background runtime owning the async worker pools behind the event bus
//! and the webhook delivery queue.
//!
//! Bundles their lifecycles behind one `start`/`shutdown` pair so a host
//! binary doesn't have to duplicate channel/worker bookkeeping at its own
//! call site.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{DeliveryQueueConfig, EventBusConfig};
use crate::error::HooklineResult;
use crate::events::EventBus;
use crate::webhook::{
    DeliveryQueue, InMemoryWebhookRepository, SqliteWebhookRepository, WebhookHttpClient,
    WebhookRepository,
};

/// Configuration for the BackgroundRuntime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Size of the event bus's async publish buffer (default: 1000).
    pub async_buffer_size: usize,
    /// Number of workers draining the event bus's async buffer (default: 10).
    pub worker_pool_size: usize,
    /// Whether to run a delivery queue alongside the event bus (default:
    /// false). `WebhookService` delivers synchronously on its own; enabling
    /// the queue adds a second, buffered delivery path fed by `enqueue`.
    pub enable_delivery_queue: bool,
    /// Size of the delivery queue's channel (default: 1000).
    pub queue_size: usize,
    /// Number of workers draining the delivery queue (default: 10).
    pub queue_worker_count: usize,
    /// Path to the webhook repository's SQLite database (default: None =
    /// in-memory).
    pub database_path: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            async_buffer_size: 1000,
            worker_pool_size: 10,
            enable_delivery_queue: false,
            queue_size: 1000,
            queue_worker_count: 10,
            database_path: None,
        }
    }
}

impl RuntimeConfig {
    /// Set the event bus's worker pool size.
    pub fn with_worker_pool_size(mut self, size: usize) -> Self {
        self.worker_pool_size = size.max(1);
        self
    }

    /// Enable the buffered delivery queue alongside direct-send delivery.
    pub fn with_delivery_queue_enabled(mut self) -> Self {
        self.enable_delivery_queue = true;
        self
    }

    /// Set the path for the webhook repository's database.
    pub fn with_database_path(mut self, path: impl Into<String>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Create config from environment variables.
    ///
    /// Reads:
    /// - `HOOKLINE_ASYNC_BUFFER_SIZE` (default: 1000)
    /// - `HOOKLINE_WORKER_POOL_SIZE` (default: 10)
    /// - `HOOKLINE_ENABLE_DELIVERY_QUEUE` (default: false)
    /// - `HOOKLINE_QUEUE_SIZE` (default: 1000)
    /// - `HOOKLINE_QUEUE_WORKERS` (default: 10)
    /// - `HOOKLINE_DATABASE_PATH` (default: None = in-memory)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(size) = std::env::var("HOOKLINE_ASYNC_BUFFER_SIZE") {
            if let Ok(size) = size.parse() {
                config.async_buffer_size = size;
            }
        }

        if let Ok(size) = std::env::var("HOOKLINE_WORKER_POOL_SIZE") {
            if let Ok(size) = size.parse() {
                config.worker_pool_size = size;
            }
        }

        if std::env::var("HOOKLINE_ENABLE_DELIVERY_QUEUE").is_ok() {
            config.enable_delivery_queue = true;
        }

        if let Ok(size) = std::env::var("HOOKLINE_QUEUE_SIZE") {
            if let Ok(size) = size.parse() {
                config.queue_size = size;
            }
        }

        if let Ok(count) = std::env::var("HOOKLINE_QUEUE_WORKERS") {
            if let Ok(count) = count.parse() {
                config.queue_worker_count = count;
            }
        }

        if let Ok(path) = std::env::var("HOOKLINE_DATABASE_PATH") {
            config.database_path = Some(path);
        }

        config
    }
}

/// Owns the background worker pools behind the event bus and (optionally)
/// the buffered delivery queue, plus the webhook repository and HTTP client
/// they share.
///
/// # Example
///
/// ```ignore
/// use hookline_core::{BackgroundRuntime, RuntimeConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = RuntimeConfig::default();
///     let mut runtime = BackgroundRuntime::new(config)?;
///
///     runtime.start().await?;
///
///     // ... application runs ...
///
///     runtime.shutdown().await?;
///     Ok(())
/// }
/// ```
pub struct BackgroundRuntime {
    bus: Arc<EventBus>,
    delivery_queue: Option<Arc<DeliveryQueue>>,
    repository: Arc<dyn WebhookRepository>,
    client: Arc<WebhookHttpClient>,
    config: RuntimeConfig,
}

impl BackgroundRuntime {
    /// Create a new BackgroundRuntime with the given configuration.
    ///
    /// The event bus's worker pool starts immediately on construction
    /// (it's `Arc`-shared and self-starting); the delivery queue, if
    /// enabled, does not spawn workers until `start()`.
    pub fn new(config: RuntimeConfig) -> HooklineResult<Self> {
        debug!(
            worker_pool_size = config.worker_pool_size,
            enable_delivery_queue = config.enable_delivery_queue,
            "Creating BackgroundRuntime"
        );

        let repository: Arc<dyn WebhookRepository> = match &config.database_path {
            Some(path) => {
                debug!(path = %path, "Creating file-backed webhook repository");
                Arc::new(SqliteWebhookRepository::new(path)?)
            }
            None => {
                debug!("Creating in-memory webhook repository");
                Arc::new(InMemoryWebhookRepository::new())
            }
        };

        let client = Arc::new(WebhookHttpClient::new());

        let bus = EventBus::new(EventBusConfig {
            async_buffer_size: config.async_buffer_size,
            worker_pool_size: config.worker_pool_size,
        });

        let delivery_queue = if config.enable_delivery_queue {
            Some(Arc::new(DeliveryQueue::new(
                DeliveryQueueConfig {
                    queue_size: config.queue_size,
                    worker_count: config.queue_worker_count,
                    batch_size: 1,
                    drain_timeout_secs: 30,
                },
                client.clone(),
                repository.clone(),
            )))
        } else {
            None
        };

        Ok(Self {
            bus,
            delivery_queue,
            repository,
            client,
            config,
        })
    }

    /// Start the delivery queue's worker pool, if enabled. The event bus's
    /// workers are already running from `new`.
    pub async fn start(&self) -> HooklineResult<()> {
        debug!("Starting background workers");

        if let Some(ref queue) = self.delivery_queue {
            queue.start().await;
            info!(
                worker_count = self.config.queue_worker_count,
                "Delivery queue started"
            );
        }

        info!("Background workers started");
        Ok(())
    }

    /// Shut down gracefully: close the event bus, draining its buffer, and
    /// stop the delivery queue, draining its backlog, if enabled.
    pub async fn shutdown(&mut self) -> HooklineResult<()> {
        debug!("Shutting down background workers");

        self.bus.close().await;
        debug!("Event bus stopped");

        if let Some(ref queue) = self.delivery_queue {
            queue.stop().await;
            debug!("Delivery queue stopped");
        }

        info!("Background workers stopped");
        Ok(())
    }

    /// Get a reference to the event bus.
    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    /// Get a reference to the delivery queue, if enabled.
    pub fn delivery_queue(&self) -> Option<Arc<DeliveryQueue>> {
        self.delivery_queue.clone()
    }

    /// Get a reference to the webhook repository.
    pub fn repository(&self) -> Arc<dyn WebhookRepository> {
        self.repository.clone()
    }

    /// Get a reference to the webhook HTTP client.
    pub fn client(&self) -> Arc<WebhookHttpClient> {
        self.client.clone()
    }

    /// Get the runtime configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_config_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.async_buffer_size, 1000);
        assert_eq!(config.worker_pool_size, 10);
        assert!(!config.enable_delivery_queue);
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_runtime_config_builder() {
        let config = RuntimeConfig::default()
            .with_worker_pool_size(4)
            .with_delivery_queue_enabled()
            .with_database_path("/tmp/hookline.db");

        assert_eq!(config.worker_pool_size, 4);
        assert!(config.enable_delivery_queue);
        assert_eq!(config.database_path, Some("/tmp/hookline.db".to_string()));
    }

    #[test]
    fn test_runtime_config_worker_pool_minimum() {
        let config = RuntimeConfig::default().with_worker_pool_size(0);
        assert_eq!(config.worker_pool_size, 1);
    }

    #[tokio::test]
    async fn test_runtime_creation_default() {
        let config = RuntimeConfig::default();
        let runtime = BackgroundRuntime::new(config).unwrap();

        assert!(runtime.delivery_queue().is_none());
    }

    #[tokio::test]
    async fn test_runtime_creation_with_delivery_queue() {
        let config = RuntimeConfig::default().with_delivery_queue_enabled();
        let runtime = BackgroundRuntime::new(config).unwrap();

        assert!(runtime.delivery_queue().is_some());
    }

    #[tokio::test]
    async fn test_runtime_start_and_shutdown() {
        let config = RuntimeConfig::default().with_delivery_queue_enabled();
        let mut runtime = BackgroundRuntime::new(config).unwrap();

        runtime.start().await.unwrap();
        runtime.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_runtime_bus_and_repository_access() {
        let config = RuntimeConfig::default();
        let runtime = BackgroundRuntime::new(config).unwrap();

        let bus = runtime.bus();
        assert_eq!(bus.subscriber_count("workflow.started"), 0);

        let repo = runtime.repository();
        assert!(repo.list_webhooks(Default::default()).unwrap().is_empty());
    }
}
