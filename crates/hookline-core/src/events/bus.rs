//! In-process publish/subscribe event bus.
//!
//! Subscribers are grouped by event type in subscription order. `publish`
//! fans out synchronously to every subscriber inline, isolating both
//! returned errors and panics so that one misbehaving subscriber can never
//! block or corrupt delivery to its siblings. `publish_async` enqueues into
//! a bounded buffer drained by a fixed worker pool; `close` drains whatever
//! is already buffered before returning.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::config::EventBusConfig;
use crate::events::event::Event;
use crate::logging::{Logger, TracingLogger};

/// A capability registered against one or more event types: `{Handle(event)
/// -> Result}`. Implementations must be `Send + Sync` since they may be
/// invoked from the calling thread or from a bus worker.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    async fn handle(&self, event: &Event) -> crate::error::HooklineResult<()>;
}

type SubscriberMap = HashMap<String, Vec<Arc<dyn EventSubscriber>>>;

/// In-process pub/sub multiplexer with a synchronous fan-out path and an
/// async worker-pool path.
pub struct EventBus {
    subscribers: RwLock<SubscriberMap>,
    closed: RwLock<bool>,
    sender: RwLock<Option<mpsc::Sender<Event>>>,
    receiver: Arc<AsyncMutex<mpsc::Receiver<Event>>>,
    workers: AsyncMutex<Vec<JoinHandle<()>>>,
    logger: Arc<dyn Logger>,
}

impl EventBus {
    /// Construct a bus and immediately start its async worker pool.
    pub fn new(config: EventBusConfig) -> Arc<Self> {
        Self::with_logger(config, Arc::new(TracingLogger))
    }

    pub fn with_logger(config: EventBusConfig, logger: Arc<dyn Logger>) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel(config.async_buffer_size.max(1));
        let bus = Arc::new(Self {
            subscribers: RwLock::new(HashMap::new()),
            closed: RwLock::new(false),
            sender: RwLock::new(Some(sender)),
            receiver: Arc::new(AsyncMutex::new(receiver)),
            workers: AsyncMutex::new(Vec::new()),
            logger,
        });
        bus.clone().spawn_workers(config.worker_pool_size.max(1));
        bus
    }

    fn spawn_workers(self: Arc<Self>, count: usize) {
        let mut handles = Vec::with_capacity(count);
        for _ in 0..count {
            let bus = self.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let event = {
                        let mut receiver = bus.receiver.lock().await;
                        receiver.recv().await
                    };
                    match event {
                        Some(event) => bus.publish(&event).await,
                        None => break,
                    }
                }
            }));
        }
        // `workers` is only populated here, at construction time, before the
        // Arc is handed out, so a blocking try_lock is always uncontended.
        if let Ok(mut workers) = self.workers.try_lock() {
            *workers = handles;
        }
    }

    /// Append `subscriber` to `event_type`'s subscription list. Safe to call
    /// concurrently with `publish`.
    pub fn subscribe(&self, event_type: impl Into<String>, subscriber: Arc<dyn EventSubscriber>) {
        let mut subscribers = self.subscribers.write().expect("subscriber lock poisoned");
        subscribers
            .entry(event_type.into())
            .or_default()
            .push(subscriber);
    }

    /// Remove the first subscription matching `subscriber` by identity
    /// (pointer equality with the handle used at `subscribe`). No-op if
    /// absent.
    pub fn unsubscribe(&self, event_type: &str, subscriber: &Arc<dyn EventSubscriber>) {
        let mut subscribers = self.subscribers.write().expect("subscriber lock poisoned");
        if let Some(list) = subscribers.get_mut(event_type) {
            if let Some(pos) = list
                .iter()
                .position(|candidate| Arc::ptr_eq(candidate, subscriber))
            {
                list.remove(pos);
            }
        }
    }

    /// Number of subscribers currently registered for `event_type`.
    pub fn subscriber_count(&self, event_type: &str) -> usize {
        let subscribers = self.subscribers.read().expect("subscriber lock poisoned");
        subscribers.get(event_type).map(Vec::len).unwrap_or(0)
    }

    /// Synchronous fan-out: invoke every subscriber for `event.event_type`
    /// inline, in subscription order, isolating errors and panics so a
    /// single misbehaving subscriber never prevents its siblings from
    /// running.
    pub async fn publish(&self, event: &Event) {
        let snapshot = {
            let subscribers = self.subscribers.read().expect("subscriber lock poisoned");
            subscribers.get(&event.event_type).cloned()
        };

        let Some(snapshot) = snapshot else {
            self.logger
                .debug(&format!("no subscribers for event type {}", event.event_type));
            return;
        };

        for subscriber in snapshot {
            let outcome = AssertUnwindSafe(subscriber.handle(event))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    self.logger
                        .warn(&format!("subscriber failed for {}: {}", event.event_type, err));
                }
                Err(panic) => {
                    let message = panic_message(&panic);
                    self.logger.error(&format!(
                        "subscriber panicked for {}: {}",
                        event.event_type, message
                    ));
                }
            }
        }
    }

    /// Non-blocking enqueue into the async buffer. Drops the event and logs
    /// a warning if the bus is closed or the buffer is full.
    pub async fn publish_async(&self, event: Event) {
        if *self.closed.read().expect("closed lock poisoned") {
            self.logger.warn("bus is closed, dropping async publish");
            return;
        }
        let sender = self.sender.read().expect("sender lock poisoned").clone();
        let Some(sender) = sender else {
            self.logger.warn("bus is closed, dropping async publish");
            return;
        };
        if let Err(err) = sender.try_send(event) {
            match err {
                mpsc::error::TrySendError::Full(_) => {
                    self.logger.warn("async buffer full, dropping event");
                }
                mpsc::error::TrySendError::Closed(_) => {
                    self.logger.warn("bus channel closed, dropping event");
                }
            }
        }
    }

    /// Idempotent shutdown: stop accepting new async publishes, close the
    /// channel, and wait for every worker to drain remaining buffered
    /// events before returning.
    pub async fn close(&self) {
        {
            let mut closed = self.closed.write().expect("closed lock poisoned");
            if *closed {
                return;
            }
            *closed = true;
        }
        // Dropping the last sender closes the channel; workers observe
        // `recv() == None` only after draining whatever was buffered.
        self.sender.write().expect("sender lock poisoned").take();
        let handles = {
            let mut workers = self.workers.lock().await;
            std::mem::take(&mut *workers)
        };
        for handle in handles {
            let _ = handle.await;
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSubscriber(Arc<AtomicUsize>);

    #[async_trait]
    impl EventSubscriber for CountingSubscriber {
        async fn handle(&self, _event: &Event) -> crate::error::HooklineResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct PanickingSubscriber;

    #[async_trait]
    impl EventSubscriber for PanickingSubscriber {
        async fn handle(&self, _event: &Event) -> crate::error::HooklineResult<()> {
            panic!("boom");
        }
    }

    #[tokio::test]
    async fn test_publish_invokes_all_subscribers_in_order() {
        let bus = EventBus::new(EventBusConfig::default());
        let counter_a = Arc::new(AtomicUsize::new(0));
        let counter_c = Arc::new(AtomicUsize::new(0));
        bus.subscribe(
            "job.failed",
            Arc::new(CountingSubscriber(counter_a.clone())),
        );
        bus.subscribe("job.failed", Arc::new(PanickingSubscriber));
        bus.subscribe(
            "job.failed",
            Arc::new(CountingSubscriber(counter_c.clone())),
        );

        let event = Event::job_failed("j1", "timeout", "job-runner");
        bus.publish(&event).await;

        assert_eq!(counter_a.load(Ordering::SeqCst), 1);
        assert_eq!(counter_c.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_subscriber_count_and_unsubscribe() {
        let bus = EventBus::new(EventBusConfig::default());
        let sub: Arc<dyn EventSubscriber> =
            Arc::new(CountingSubscriber(Arc::new(AtomicUsize::new(0))));
        bus.subscribe("workflow.started", sub.clone());
        assert_eq!(bus.subscriber_count("workflow.started"), 1);
        bus.unsubscribe("workflow.started", &sub);
        assert_eq!(bus.subscriber_count("workflow.started"), 0);
    }

    #[tokio::test]
    async fn test_publish_async_drains_on_close() {
        let config = EventBusConfig {
            async_buffer_size: 100,
            worker_pool_size: 2,
        };
        let bus = EventBus::new(config);
        let counter = Arc::new(AtomicUsize::new(0));
        bus.subscribe(
            "job.failed",
            Arc::new(CountingSubscriber(counter.clone())),
        );

        for _ in 0..50 {
            bus.publish_async(Event::job_failed("j", "x", "job-runner"))
                .await;
        }
        bus.close().await;

        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }

    #[tokio::test]
    async fn test_no_subscribers_does_not_panic() {
        let bus = EventBus::new(EventBusConfig::default());
        bus.publish(&Event::job_failed("j", "x", "job-runner")).await;
    }
}
