//! Configuration system for hookline.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{HooklineError, HooklineResult};

/// `~/.hookline/webhooks.db`, falling back to a relative `.hookline` if the
/// home directory can't be determined.
fn default_database_path() -> Option<String> {
    let hookline_dir = dirs::home_dir()
        .map(|h| h.join(".hookline"))
        .unwrap_or_else(|| PathBuf::from(".hookline"));
    Some(hookline_dir.join("webhooks.db").to_string_lossy().into_owned())
}

/// Exponential backoff retry policy shared by the webhook HTTP client and
/// the delivery queue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total number of HTTP attempts made within one delivery (>= 1).
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_interval_ms: u64,
    /// Multiplier applied to the interval after each attempt.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_interval_ms: 1000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// `InitialInterval * Multiplier^(attempt - 1)`, attempt is 1-based.
    pub fn calculate_backoff(&self, attempt: u32) -> std::time::Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let millis = self.initial_interval_ms as f64 * self.backoff_multiplier.powi(exponent);
        std::time::Duration::from_millis(millis.round() as u64)
    }
}

/// Event bus tuning: async buffer depth and worker pool size.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    pub async_buffer_size: usize,
    pub worker_pool_size: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            async_buffer_size: 1000,
            worker_pool_size: 10,
        }
    }
}

/// Delivery queue tuning: channel depth, worker count, and shutdown budget.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryQueueConfig {
    pub queue_size: usize,
    pub worker_count: usize,
    pub batch_size: usize,
    pub drain_timeout_secs: u64,
}

impl Default for DeliveryQueueConfig {
    fn default() -> Self {
        Self {
            queue_size: 1000,
            worker_count: 10,
            batch_size: 1,
            drain_timeout_secs: 30,
        }
    }
}

/// Webhook service tuning: failure thresholds and per-attempt timeout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookServiceConfig {
    /// Consecutive failures before a webhook is auto-disabled.
    pub max_failure_count: u32,
    /// Default per-attempt HTTP timeout.
    pub default_timeout_secs: u64,
}

impl Default for WebhookServiceConfig {
    fn default() -> Self {
        Self {
            max_failure_count: 10,
            default_timeout_secs: 30,
        }
    }
}

/// Top-level configuration bundle for a running hookline instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HooklineConfig {
    pub event_bus: EventBusConfig,
    pub delivery_queue: DeliveryQueueConfig,
    pub retry_policy: RetryPolicy,
    pub webhook_service: WebhookServiceConfig,
    /// Path to the SQLite database backing the webhook repository, if any.
    pub database_path: Option<String>,
}

impl Default for HooklineConfig {
    fn default() -> Self {
        Self {
            event_bus: EventBusConfig::default(),
            delivery_queue: DeliveryQueueConfig::default(),
            retry_policy: RetryPolicy::default(),
            webhook_service: WebhookServiceConfig::default(),
            database_path: default_database_path(),
        }
    }
}

impl HooklineConfig {
    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<std::path::Path>) -> HooklineResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| HooklineError::Configuration(e.to_string()))
            }
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| HooklineError::Configuration(e.to_string())),
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| HooklineError::Configuration(e.to_string())),
            _ => Err(HooklineError::Configuration(
                "unsupported config file format, use .toml, .json, or .yaml".to_string(),
            )),
        }
    }

    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(size) = std::env::var("HOOKLINE_ASYNC_BUFFER_SIZE") {
            if let Ok(size) = size.parse() {
                config.event_bus.async_buffer_size = size;
            }
        }
        if let Ok(size) = std::env::var("HOOKLINE_WORKER_POOL_SIZE") {
            if let Ok(size) = size.parse() {
                config.event_bus.worker_pool_size = size;
            }
        }
        if let Ok(size) = std::env::var("HOOKLINE_QUEUE_SIZE") {
            if let Ok(size) = size.parse() {
                config.delivery_queue.queue_size = size;
            }
        }
        if let Ok(count) = std::env::var("HOOKLINE_QUEUE_WORKERS") {
            if let Ok(count) = count.parse() {
                config.delivery_queue.worker_count = count;
            }
        }
        if let Ok(max_attempts) = std::env::var("HOOKLINE_RETRY_MAX_ATTEMPTS") {
            if let Ok(max_attempts) = max_attempts.parse() {
                config.retry_policy.max_attempts = max_attempts;
            }
        }
        if let Ok(max_failures) = std::env::var("HOOKLINE_MAX_FAILURE_COUNT") {
            if let Ok(max_failures) = max_failures.parse() {
                config.webhook_service.max_failure_count = max_failures;
            }
        }
        if let Ok(path) = std::env::var("HOOKLINE_DATABASE_PATH") {
            config.database_path = Some(path);
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_retry_policy_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.calculate_backoff(1).as_millis(), 1000);
        assert_eq!(policy.calculate_backoff(2).as_millis(), 2000);
        assert_eq!(policy.calculate_backoff(3).as_millis(), 4000);
        assert_eq!(policy.calculate_backoff(4).as_millis(), 8000);
    }

    #[test]
    fn test_config_from_env_defaults_when_unset() {
        let config = HooklineConfig::default();
        assert_eq!(config.event_bus.worker_pool_size, 10);
        assert_eq!(config.webhook_service.max_failure_count, 10);
    }
}
