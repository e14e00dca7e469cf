//! Single-delivery HTTP client: signs, sends, and retries one webhook
//! request under a [`RetryPolicy`], honoring cooperative cancellation
//! during backoff.

use std::time::Instant;

use reqwest::Client;

use crate::config::RetryPolicy;
use crate::webhook::cancellation::CancellationToken;
use crate::webhook::models::{DeliveryResult, WebhookRequest};
use crate::webhook::signer::Signer;

/// Sends one [`WebhookRequest`], retrying on failure up to
/// `RetryPolicy::max_attempts` with exponential backoff between attempts.
///
/// Retries are hand-rolled rather than built on a generic retry combinator
/// because the attempt count must be externally observable and a
/// cancellation signal must be able to abort mid-backoff — neither fits a
/// fire-and-forget `.retry()` wrapper cleanly.
pub struct WebhookHttpClient {
    client: Client,
}

impl Default for WebhookHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookHttpClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Deliver `request` under `policy`, retrying on failure. Returns the
    /// last attempt's result once `max_attempts` is reached, or sooner if
    /// `cancellation` fires during a backoff sleep.
    pub async fn send(
        &self,
        request: &WebhookRequest,
        policy: &RetryPolicy,
        cancellation: &CancellationToken,
    ) -> DeliveryResult {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = self.send_once(request).await;

            let should_retry = !result.success && attempt < policy.max_attempts;
            if !should_retry {
                return DeliveryResult {
                    attempts: attempt,
                    ..result
                };
            }

            let backoff = policy.calculate_backoff(attempt);
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = cancellation.cancelled() => {
                    return DeliveryResult {
                        attempts: attempt,
                        error: Some("cancelled".to_string()),
                        ..result
                    };
                }
            }
        }
    }

    /// Issue exactly one HTTP attempt; does not consult the retry policy.
    async fn send_once(&self, request: &WebhookRequest) -> DeliveryResult {
        let started = Instant::now();

        let mut builder = self
            .client
            .post(&request.url)
            .timeout(request.timeout)
            .body(request.payload.clone());

        let mut headers = request.headers.clone();
        if !headers
            .keys()
            .any(|k| k.eq_ignore_ascii_case("content-type"))
        {
            headers.insert("Content-Type".to_string(), "application/json".to_string());
        }
        if let Some(secret) = &request.secret {
            Signer::new(secret).add_headers(&mut headers, &request.payload);
        }
        for (key, value) in &headers {
            builder = builder.header(key, value);
        }

        match builder.send().await {
            Ok(response) => {
                let status = response.status();
                let status_code = status.as_u16();
                let body = response.text().await.unwrap_or_default();
                let success = (200..300).contains(&status_code);
                DeliveryResult {
                    success,
                    status_code: Some(status_code),
                    response_body: Some(body.clone()),
                    duration: started.elapsed(),
                    attempts: 1,
                    error: if success {
                        None
                    } else {
                        Some(format!("unexpected status {}", status_code))
                    },
                }
            }
            Err(err) => DeliveryResult {
                success: false,
                status_code: None,
                response_body: None,
                duration: started.elapsed(),
                attempts: 1,
                error: Some(err.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(url: String) -> WebhookRequest {
        WebhookRequest {
            url,
            payload: b"{\"id\":\"e1\"}".to_vec(),
            headers: HashMap::new(),
            secret: Some("s3cr3t".to_string()),
            timeout: std::time::Duration::from_secs(5),
            event_type: "workflow.completed".to_string(),
            event_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn test_successful_delivery_signs_and_succeeds_first_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = WebhookHttpClient::new();
        let request = request(format!("{}/hook", server.uri()));
        let policy = RetryPolicy::default();
        let cancellation = CancellationToken::new();

        let result = client.send(&request, &policy, &cancellation).await;
        assert!(result.success);
        assert_eq!(result.attempts, 1);
    }

    #[tokio::test]
    async fn test_failure_retries_up_to_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = WebhookHttpClient::new();
        let request = request(format!("{}/hook", server.uri()));
        let policy = RetryPolicy {
            max_attempts: 2,
            initial_interval_ms: 10,
            backoff_multiplier: 2.0,
        };
        let cancellation = CancellationToken::new();

        let result = client.send(&request, &policy, &cancellation).await;
        assert!(!result.success);
        assert_eq!(result.attempts, 2);
    }

    #[tokio::test]
    async fn test_cancellation_during_backoff_returns_partial_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = WebhookHttpClient::new();
        let request = request(format!("{}/hook", server.uri()));
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_interval_ms: 60_000,
            backoff_multiplier: 2.0,
        };
        let cancellation = CancellationToken::new();
        cancellation.cancel();

        let result = client.send(&request, &policy, &cancellation).await;
        assert_eq!(result.error.as_deref(), Some("cancelled"));
        assert_eq!(result.attempts, 1);
    }
}
