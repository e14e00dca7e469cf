//! Server state management.

use std::sync::Arc;

use hookline_core::{
    BackgroundRuntime, EventBus, EventDispatcher, HooklineResult, WebhookRepository,
    WebhookService,
};
use tokio::sync::RwLock;

/// Shared application state: the event bus, the dispatcher that sits in
/// front of it, and the webhook service that the `/webhooks` routes act on.
#[derive(Clone)]
pub struct AppState {
    pub bus: Arc<EventBus>,
    pub dispatcher: Arc<EventDispatcher>,
    pub webhook_service: Arc<WebhookService>,
    pub repository: Arc<dyn WebhookRepository>,
    runtime: Arc<RwLock<Option<BackgroundRuntime>>>,
}

impl AppState {
    /// Wrap the already-wired components plus the runtime that owns their
    /// background workers. See [`crate::factory::build_app_state`] for how
    /// these are assembled.
    pub fn new(
        bus: Arc<EventBus>,
        dispatcher: Arc<EventDispatcher>,
        webhook_service: Arc<WebhookService>,
        repository: Arc<dyn WebhookRepository>,
        runtime: BackgroundRuntime,
    ) -> Self {
        Self {
            bus,
            dispatcher,
            webhook_service,
            repository,
            runtime: Arc::new(RwLock::new(Some(runtime))),
        }
    }

    /// Take the wrapped runtime for an orderly shutdown. Returns `None` if
    /// already taken.
    pub async fn take_runtime(&self) -> Option<BackgroundRuntime> {
        self.runtime.write().await.take()
    }

    /// Close the bus and, if the runtime has not already been taken, shut it
    /// down in place.
    pub async fn shutdown(&self) -> HooklineResult<()> {
        self.bus.close().await;
        if let Some(mut runtime) = self.take_runtime().await {
            runtime.shutdown().await?;
        }
        Ok(())
    }
}
