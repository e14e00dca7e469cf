//! End-to-end scenarios exercising the bus and delivery path together.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use hookline_core::{
    config::RetryPolicy, Event, EventBuilder, EventBus, EventBusConfig, EventSubscriber,
    HooklineResult, InMemoryWebhookRepository, RegisterWebhookRequest, WebhookHttpClient,
    WebhookService,
};
use serde_json::Value;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn json_event() -> Event {
    let mut data = HashMap::new();
    data.insert("workflowID".to_string(), Value::String("wf1".to_string()));
    data.insert("duration".to_string(), serde_json::json!(1.5));
    EventBuilder::new("workflow.completed")
        .source("workflow-engine")
        .timestamp(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        .data(data)
        .build()
}

/// S1 — signed delivery round-trip.
#[tokio::test]
async fn s1_signed_delivery_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let repo = Arc::new(InMemoryWebhookRepository::new());
    let svc = WebhookService::new(repo.clone(), Arc::new(WebhookHttpClient::new()));

    let webhook_id = svc
        .register_webhook(RegisterWebhookRequest {
            url: format!("{}/hook", server.uri()),
            events: ["workflow.completed".to_string()].into_iter().collect(),
            secret: Some("s3cr3t".to_string()),
            headers: Default::default(),
            retry_policy: None,
            timeout_secs: None,
            metadata: Default::default(),
        })
        .unwrap();

    let event = json_event();
    let payload = event.to_canonical_json().unwrap();
    svc.deliver_webhooks_for_event(&event).await.unwrap();

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    let expected_signature = hookline_core::Signer::new("s3cr3t").sign(&payload);
    let actual_signature = received[0]
        .headers
        .get("x-webhook-signature")
        .expect("signature header present")
        .to_str()
        .unwrap();
    assert_eq!(actual_signature, expected_signature);

    let deliveries = svc
        .get_deliveries(webhook_id, Default::default())
        .unwrap();
    assert_eq!(deliveries.len(), 1);
    assert!(deliveries[0].success);
    assert_eq!(deliveries[0].attempts, 1);
}

/// S2 — retry with backoff: 5 attempts at 1s/2s/4s/8s ≈ 15s total.
#[tokio::test]
async fn s2_retry_with_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let repo = Arc::new(InMemoryWebhookRepository::new());
    let svc = WebhookService::new(repo.clone(), Arc::new(WebhookHttpClient::new()));

    let webhook_id = svc
        .register_webhook(RegisterWebhookRequest {
            url: server.uri(),
            events: Default::default(),
            secret: None,
            headers: Default::default(),
            retry_policy: Some(RetryPolicy {
                max_attempts: 5,
                initial_interval_ms: 1_000,
                backoff_multiplier: 2.0,
            }),
            timeout_secs: None,
            metadata: Default::default(),
        })
        .unwrap();

    let event = Event::workflow_started("wf1", "workflow-engine");
    let started = Instant::now();
    svc.deliver_webhooks_for_event(&event).await.unwrap();
    let elapsed = started.elapsed();

    assert!(
        elapsed.as_millis() >= 14_800 && elapsed.as_millis() <= 15_500,
        "elapsed {:?} outside expected ~15s window",
        elapsed
    );

    let deliveries = svc
        .get_deliveries(webhook_id, Default::default())
        .unwrap();
    assert_eq!(deliveries.len(), 1);
    assert!(!deliveries[0].success);
    assert_eq!(deliveries[0].attempts, 5);
    assert!(deliveries[0].next_retry_at.is_none());
}

/// S3 — auto-disable after MaxFailureCount consecutive failures.
#[tokio::test]
async fn s3_auto_disable_after_max_failure_count() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let repo = Arc::new(InMemoryWebhookRepository::new());
    let svc = hookline_core::WebhookService::with_config(
        repo.clone(),
        Arc::new(WebhookHttpClient::new()),
        hookline_core::WebhookServiceConfig {
            max_failure_count: 3,
            default_timeout_secs: 5,
        },
    );

    let webhook_id = svc
        .register_webhook(RegisterWebhookRequest {
            url: server.uri(),
            events: Default::default(),
            secret: None,
            headers: Default::default(),
            retry_policy: Some(RetryPolicy {
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

    let webhook = svc.get_webhook(webhook_id).unwrap();
    assert!(!webhook.active);

    let matches = repo.get_webhooks_by_event("job.failed").unwrap();
    assert!(matches.is_empty());
}

struct CountingSubscriber {
    counter: Arc<AtomicUsize>,
}

#[async_trait]
impl EventSubscriber for CountingSubscriber {
    async fn handle(&self, _event: &Event) -> HooklineResult<()> {
        self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct PanickingSubscriber;

#[async_trait]
impl EventSubscriber for PanickingSubscriber {
    async fn handle(&self, _event: &Event) -> HooklineResult<()> {
        panic!("boom");
    }
}

/// S4 — subscriber isolation: a panicking subscriber never blocks its
/// siblings.
#[tokio::test]
async fn s4_subscriber_isolation() {
    let bus = EventBus::new(EventBusConfig::default());
    let counter_a = Arc::new(AtomicUsize::new(0));
    let counter_c = Arc::new(AtomicUsize::new(0));

    bus.subscribe(
        "job.failed",
        Arc::new(CountingSubscriber {
            counter: counter_a.clone(),
        }),
    );
    bus.subscribe("job.failed", Arc::new(PanickingSubscriber));
    bus.subscribe(
        "job.failed",
        Arc::new(CountingSubscriber {
            counter: counter_c.clone(),
        }),
    );

    let event = Event::job_failed("j1", "boom", "job-runner");
    bus.publish(&event).await;

    assert_eq!(counter_a.load(Ordering::SeqCst), 1);
    assert_eq!(counter_c.load(Ordering::SeqCst), 1);
}

/// S5 — async drain on close: `close()` only returns after every buffered
/// event has reached its subscriber.
#[tokio::test]
async fn s5_async_drain_on_close() {
    let bus = EventBus::new(EventBusConfig {
        async_buffer_size: 100,
        worker_pool_size: 2,
    });
    let counter = Arc::new(AtomicUsize::new(0));
    bus.subscribe(
        "workflow.started",
        Arc::new(CountingSubscriber {
            counter: counter.clone(),
        }),
    );

    for _ in 0..50 {
        bus.publish_async(Event::workflow_started("wf1", "workflow-engine"))
            .await;
    }
    bus.close().await;

    assert_eq!(counter.load(Ordering::SeqCst), 50);
}

/// S6 — event matching: an empty `events` set receives every event type.
#[tokio::test]
async fn s6_empty_events_set_matches_everything() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let repo = Arc::new(InMemoryWebhookRepository::new());
    let svc = WebhookService::new(repo, Arc::new(WebhookHttpClient::new()));

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

    for event in [
        Event::workflow_started("wf1", "workflow-engine"),
        Event::job_failed("j1", "timeout", "job-runner"),
        Event::email_sent("a@example.com", "hi", "mailer"),
    ] {
        svc.deliver_webhooks_for_event(&event).await.unwrap();
    }

    let received: Vec<Request> = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 3);
}
