//! Persist-then-publish facade composing an [`EventBus`] with an optional
//! event repository: persistence happens before publication so that, on
//! crash, a dispatched event is reconstructable from the store even if no
//! handler ran.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HooklineResult;
use crate::events::bus::EventBus;
use crate::events::event::Event;

/// Durable storage for dispatched events. Optional: a dispatcher with no
/// repository configured simply publishes without persisting.
#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn save_event(&self, event: &Event) -> HooklineResult<()>;
}

/// Thin composition: `Dispatch` persists (if configured) then publishes
/// synchronously; `DispatchAsync` persists synchronously then publishes
/// via the bus's async worker pool.
pub struct EventDispatcher {
    bus: Arc<EventBus>,
    repository: Option<Arc<dyn EventRepository>>,
}

impl EventDispatcher {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            repository: None,
        }
    }

    pub fn with_repository(bus: Arc<EventBus>, repository: Arc<dyn EventRepository>) -> Self {
        Self {
            bus,
            repository: Some(repository),
        }
    }

    /// Persist (if a repository is configured) then publish synchronously.
    /// On a persistence error, propagate it and do NOT publish.
    pub async fn dispatch(&self, event: &Event) -> HooklineResult<()> {
        if let Some(repository) = &self.repository {
            repository.save_event(event).await?;
        }
        self.bus.publish(event).await;
        Ok(())
    }

    /// Persist synchronously (durability before fire-and-forget), then
    /// enqueue for async publication. A persistence failure is logged by
    /// the caller and the event is silently skipped (not published).
    pub async fn dispatch_async(&self, event: Event) -> HooklineResult<()> {
        if let Some(repository) = &self.repository {
            repository.save_event(&event).await?;
        }
        self.bus.publish_async(event).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EventBusConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct RecordingRepository {
        saved: Mutex<Vec<Event>>,
        fail: bool,
    }

    #[async_trait]
    impl EventRepository for RecordingRepository {
        async fn save_event(&self, event: &Event) -> HooklineResult<()> {
            if self.fail {
                return Err(crate::error::HooklineError::storage("disk full"));
            }
            self.saved.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct CountingSubscriber(Arc<AtomicUsize>);

    #[async_trait]
    impl crate::events::bus::EventSubscriber for CountingSubscriber {
        async fn handle(&self, _event: &Event) -> HooklineResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_dispatch_persists_then_publishes() {
        let bus = EventBus::new(EventBusConfig::default());
        let counter = Arc::new(AtomicUsize::new(0));
        bus.subscribe(
            "workflow.started",
            Arc::new(CountingSubscriber(counter.clone())),
        );
        let repository = Arc::new(RecordingRepository {
            saved: Mutex::new(Vec::new()),
            fail: false,
        });
        let dispatcher = EventDispatcher::with_repository(bus, repository.clone());

        let event = Event::workflow_started("wf1", "workflow-engine");
        dispatcher.dispatch(&event).await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(repository.saved.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_persistence_error_does_not_publish() {
        let bus = EventBus::new(EventBusConfig::default());
        let counter = Arc::new(AtomicUsize::new(0));
        bus.subscribe(
            "workflow.started",
            Arc::new(CountingSubscriber(counter.clone())),
        );
        let repository = Arc::new(RecordingRepository {
            saved: Mutex::new(Vec::new()),
            fail: true,
        });
        let dispatcher = EventDispatcher::with_repository(bus, repository);

        let event = Event::workflow_started("wf1", "workflow-engine");
        let result = dispatcher.dispatch(&event).await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
