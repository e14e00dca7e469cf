//! Persistence of webhook subscriptions and delivery history.
//!
//! The repository is shared-mutable and must be safe under concurrent
//! calls from the delivery queue workers, the webhook service, and
//! administrative APIs. `IncrementFailureCount`/`ResetFailureCount` are the
//! linearization points for the failure counter: callers must never
//! read-then-write it themselves.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{HooklineError, HooklineResult};
use crate::webhook::models::{validate_url, UpdateWebhookRequest, WebhookConfig, WebhookDelivery};

/// Filter for `ListWebhooks`.
#[derive(Debug, Clone, Default)]
pub struct WebhookFilter {
    pub active: Option<bool>,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// Filter for `ListDeliveries`.
#[derive(Debug, Clone, Default)]
pub struct DeliveryFilter {
    pub success: Option<bool>,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// Storage contract for webhook subscriptions and delivery history. Object
/// safe so it can be held as `Arc<dyn WebhookRepository>`.
pub trait WebhookRepository: Send + Sync {
    fn create_webhook(&self, webhook: WebhookConfig) -> HooklineResult<()>;
    fn get_webhook(&self, id: Uuid) -> HooklineResult<WebhookConfig>;
    fn list_webhooks(&self, filter: WebhookFilter) -> HooklineResult<Vec<WebhookConfig>>;
    fn get_webhooks_by_event(&self, event_type: &str) -> HooklineResult<Vec<WebhookConfig>>;
    fn update_webhook(
        &self,
        id: Uuid,
        patch: UpdateWebhookRequest,
    ) -> HooklineResult<WebhookConfig>;
    fn delete_webhook(&self, id: Uuid) -> HooklineResult<()>;
    fn increment_failure_count(&self, id: Uuid) -> HooklineResult<u32>;
    fn reset_failure_count(&self, id: Uuid) -> HooklineResult<()>;

    fn save_delivery(&self, delivery: WebhookDelivery) -> HooklineResult<()>;
    fn get_delivery(&self, id: Uuid) -> HooklineResult<WebhookDelivery>;
    fn list_deliveries(
        &self,
        webhook_id: Uuid,
        filter: DeliveryFilter,
    ) -> HooklineResult<Vec<WebhookDelivery>>;
    fn get_failed_deliveries(&self, limit: usize) -> HooklineResult<Vec<WebhookDelivery>>;
    fn update_delivery_retry(
        &self,
        id: Uuid,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> HooklineResult<()>;
    fn delete_old_deliveries(&self, before: DateTime<Utc>) -> HooklineResult<usize>;
}

fn apply_patch(webhook: &mut WebhookConfig, patch: UpdateWebhookRequest) -> HooklineResult<()> {
    if let Some(url) = patch.url {
        validate_url(&url)?;
        webhook.url = url;
    }
    if let Some(events) = patch.events {
        webhook.events = events;
    }
    if let Some(secret) = patch.secret {
        webhook.secret = Some(secret);
    }
    if let Some(headers) = patch.headers {
        webhook.headers = headers;
    }
    if let Some(active) = patch.active {
        webhook.active = active;
    }
    if let Some(retry_policy) = patch.retry_policy {
        webhook.retry_policy = retry_policy;
    }
    if let Some(timeout_secs) = patch.timeout_secs {
        webhook.timeout_secs = timeout_secs;
    }
    if let Some(metadata) = patch.metadata {
        webhook.metadata = metadata;
    }
    if let Some(last_delivery) = patch.last_delivery {
        webhook.last_delivery = Some(last_delivery);
    }
    webhook.updated_at = Utc::now();
    Ok(())
}

/// In-memory [`WebhookRepository`], guarded by a read/write lock per the
/// repository's concurrency contract.
#[derive(Default)]
pub struct InMemoryWebhookRepository {
    webhooks: RwLock<HashMap<Uuid, WebhookConfig>>,
    deliveries: RwLock<HashMap<Uuid, WebhookDelivery>>,
}

impl InMemoryWebhookRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WebhookRepository for InMemoryWebhookRepository {
    fn create_webhook(&self, webhook: WebhookConfig) -> HooklineResult<()> {
        let mut webhooks = self.webhooks.write().expect("webhook lock poisoned");
        if webhooks.contains_key(&webhook.id) {
            return Err(HooklineError::conflict(format!(
                "webhook {} already exists",
                webhook.id
            )));
        }
        webhooks.insert(webhook.id, webhook);
        Ok(())
    }

    fn get_webhook(&self, id: Uuid) -> HooklineResult<WebhookConfig> {
        let webhooks = self.webhooks.read().expect("webhook lock poisoned");
        webhooks
            .get(&id)
            .cloned()
            .ok_or_else(|| HooklineError::not_found(format!("webhook {} not found", id)))
    }

    fn list_webhooks(&self, filter: WebhookFilter) -> HooklineResult<Vec<WebhookConfig>> {
        let webhooks = self.webhooks.read().expect("webhook lock poisoned");
        let mut matches: Vec<WebhookConfig> = webhooks
            .values()
            .filter(|w| filter.active.map(|active| w.active == active).unwrap_or(true))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(matches, filter.offset, filter.limit))
    }

    fn get_webhooks_by_event(&self, event_type: &str) -> HooklineResult<Vec<WebhookConfig>> {
        let webhooks = self.webhooks.read().expect("webhook lock poisoned");
        Ok(webhooks
            .values()
            .filter(|w| w.active && w.should_receive(event_type))
            .cloned()
            .collect())
    }

    fn update_webhook(
        &self,
        id: Uuid,
        patch: UpdateWebhookRequest,
    ) -> HooklineResult<WebhookConfig> {
        let mut webhooks = self.webhooks.write().expect("webhook lock poisoned");
        let webhook = webhooks
            .get_mut(&id)
            .ok_or_else(|| HooklineError::not_found(format!("webhook {} not found", id)))?;
        apply_patch(webhook, patch)?;
        Ok(webhook.clone())
    }

    fn delete_webhook(&self, id: Uuid) -> HooklineResult<()> {
        let mut webhooks = self.webhooks.write().expect("webhook lock poisoned");
        webhooks
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| HooklineError::not_found(format!("webhook {} not found", id)))
    }

    fn increment_failure_count(&self, id: Uuid) -> HooklineResult<u32> {
        let mut webhooks = self.webhooks.write().expect("webhook lock poisoned");
        let webhook = webhooks
            .get_mut(&id)
            .ok_or_else(|| HooklineError::not_found(format!("webhook {} not found", id)))?;
        webhook.failure_count += 1;
        webhook.updated_at = Utc::now();
        Ok(webhook.failure_count)
    }

    fn reset_failure_count(&self, id: Uuid) -> HooklineResult<()> {
        let mut webhooks = self.webhooks.write().expect("webhook lock poisoned");
        let webhook = webhooks
            .get_mut(&id)
            .ok_or_else(|| HooklineError::not_found(format!("webhook {} not found", id)))?;
        webhook.failure_count = 0;
        webhook.updated_at = Utc::now();
        Ok(())
    }

    fn save_delivery(&self, delivery: WebhookDelivery) -> HooklineResult<()> {
        let mut deliveries = self.deliveries.write().expect("delivery lock poisoned");
        deliveries.insert(delivery.id, delivery);
        Ok(())
    }

    fn get_delivery(&self, id: Uuid) -> HooklineResult<WebhookDelivery> {
        let deliveries = self.deliveries.read().expect("delivery lock poisoned");
        deliveries
            .get(&id)
            .cloned()
            .ok_or_else(|| HooklineError::delivery_not_found(format!("delivery {} not found", id)))
    }

    fn list_deliveries(
        &self,
        webhook_id: Uuid,
        filter: DeliveryFilter,
    ) -> HooklineResult<Vec<WebhookDelivery>> {
        let deliveries = self.deliveries.read().expect("delivery lock poisoned");
        let mut matches: Vec<WebhookDelivery> = deliveries
            .values()
            .filter(|d| d.webhook_id == webhook_id)
            .filter(|d| {
                filter
                    .success
                    .map(|success| d.success == success)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.delivered_at.cmp(&a.delivered_at));
        Ok(paginate(matches, filter.offset, filter.limit))
    }

    fn get_failed_deliveries(&self, limit: usize) -> HooklineResult<Vec<WebhookDelivery>> {
        let deliveries = self.deliveries.read().expect("delivery lock poisoned");
        let now = Utc::now();
        let mut matches: Vec<WebhookDelivery> = deliveries
            .values()
            .filter(|d| {
                !d.success && d.next_retry_at.map(|at| at <= now).unwrap_or(false)
            })
            .cloned()
            .collect();
        matches.truncate(limit);
        Ok(matches)
    }

    fn update_delivery_retry(
        &self,
        id: Uuid,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> HooklineResult<()> {
        let mut deliveries = self.deliveries.write().expect("delivery lock poisoned");
        let delivery = deliveries
            .get_mut(&id)
            .ok_or_else(|| HooklineError::delivery_not_found(format!("delivery {} not found", id)))?;
        delivery.next_retry_at = next_retry_at;
        Ok(())
    }

    fn delete_old_deliveries(&self, before: DateTime<Utc>) -> HooklineResult<usize> {
        let mut deliveries = self.deliveries.write().expect("delivery lock poisoned");
        let before_count = deliveries.len();
        deliveries.retain(|_, d| d.delivered_at >= before);
        Ok(before_count - deliveries.len())
    }
}

fn paginate<T: Clone>(items: Vec<T>, offset: usize, limit: Option<usize>) -> Vec<T> {
    if offset >= items.len() {
        return Vec::new();
    }
    let tail = &items[offset..];
    match limit {
        Some(limit) => tail.iter().take(limit).cloned().collect(),
        None => tail.to_vec(),
    }
}

/// SQLite-backed [`WebhookRepository`], guarded by a `Mutex<Connection>`
/// like the rest of this crate's relational stores.
pub struct SqliteWebhookRepository {
    conn: Mutex<Connection>,
}

impl SqliteWebhookRepository {
    pub fn new(path: impl AsRef<std::path::Path>) -> HooklineResult<Self> {
        let conn = Connection::open(path)?;
        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.init_schema()?;
        Ok(repo)
    }

    pub fn in_memory() -> HooklineResult<Self> {
        let conn = Connection::open_in_memory()?;
        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.init_schema()?;
        Ok(repo)
    }

    fn init_schema(&self) -> HooklineResult<()> {
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS webhooks (
                id TEXT PRIMARY KEY,
                url TEXT NOT NULL,
                events TEXT NOT NULL,
                secret TEXT,
                headers TEXT NOT NULL,
                active INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                last_delivery TEXT,
                failure_count INTEGER NOT NULL,
                metadata TEXT NOT NULL,
                retry_policy TEXT NOT NULL,
                timeout_secs INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_webhooks_active ON webhooks(active);

            CREATE TABLE IF NOT EXISTS deliveries (
                id TEXT PRIMARY KEY,
                webhook_id TEXT NOT NULL,
                event_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                url TEXT NOT NULL,
                request_body TEXT NOT NULL,
                status_code INTEGER,
                response_body TEXT,
                duration_ms INTEGER NOT NULL,
                attempts INTEGER NOT NULL,
                success INTEGER NOT NULL,
                error TEXT,
                delivered_at TEXT NOT NULL,
                next_retry_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_deliveries_event_type ON deliveries(event_type);
            CREATE INDEX IF NOT EXISTS idx_deliveries_webhook_delivered
                ON deliveries(webhook_id, delivered_at DESC);
            CREATE INDEX IF NOT EXISTS idx_deliveries_retry
                ON deliveries(success, next_retry_at);",
        )?;
        Ok(())
    }

    fn row_to_webhook(row: &rusqlite::Row) -> rusqlite::Result<WebhookConfig> {
        let id: String = row.get(0)?;
        let events: String = row.get(2)?;
        let headers: String = row.get(4)?;
        let created_at: String = row.get(6)?;
        let updated_at: String = row.get(7)?;
        let last_delivery: Option<String> = row.get(8)?;
        let metadata: String = row.get(10)?;
        let retry_policy: String = row.get(11)?;

        Ok(WebhookConfig {
            id: Uuid::parse_str(&id).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
            })?,
            url: row.get(1)?,
            events: serde_json::from_str(&events).unwrap_or_default(),
            secret: row.get(3)?,
            headers: serde_json::from_str(&headers).unwrap_or_default(),
            active: row.get::<_, i64>(5)? != 0,
            created_at: parse_rfc3339(&created_at)?,
            updated_at: parse_rfc3339(&updated_at)?,
            last_delivery: last_delivery.as_deref().map(parse_rfc3339).transpose()?,
            failure_count: row.get::<_, i64>(9)? as u32,
            metadata: serde_json::from_str(&metadata).unwrap_or_default(),
            retry_policy: serde_json::from_str(&retry_policy).unwrap_or_default(),
            timeout_secs: row.get::<_, i64>(12)? as u64,
        })
    }

    fn row_to_delivery(row: &rusqlite::Row) -> rusqlite::Result<WebhookDelivery> {
        let id: String = row.get(0)?;
        let webhook_id: String = row.get(1)?;
        let event_id: String = row.get(2)?;
        let delivered_at: String = row.get(11)?;
        let next_retry_at: Option<String> = row.get(12)?;

        Ok(WebhookDelivery {
            id: parse_uuid(&id)?,
            webhook_id: parse_uuid(&webhook_id)?,
            event_id: parse_uuid(&event_id)?,
            event_type: row.get(3)?,
            url: row.get(4)?,
            request_body: row.get(5)?,
            status_code: row.get::<_, Option<i64>>(6)?.map(|v| v as u16),
            response_body: row.get(7)?,
            duration_ms: row.get::<_, i64>(8)? as u64,
            attempts: row.get::<_, i64>(9)? as u32,
            success: row.get::<_, i64>(10)? != 0,
            error: row.get(13)?,
            delivered_at: parse_rfc3339(&delivered_at)?,
            next_retry_at: next_retry_at.as_deref().map(parse_rfc3339).transpose()?,
        })
    }
}

fn parse_uuid(s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

fn parse_rfc3339(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

impl WebhookRepository for SqliteWebhookRepository {
    fn create_webhook(&self, webhook: WebhookConfig) -> HooklineResult<()> {
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM webhooks WHERE id = ?1",
                params![webhook.id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(HooklineError::conflict(format!(
                "webhook {} already exists",
                webhook.id
            )));
        }
        conn.execute(
            "INSERT INTO webhooks (id, url, events, secret, headers, active, created_at,
                updated_at, last_delivery, failure_count, metadata, retry_policy, timeout_secs)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                webhook.id.to_string(),
                webhook.url,
                serde_json::to_string(&webhook.events).unwrap_or_default(),
                webhook.secret,
                serde_json::to_string(&webhook.headers).unwrap_or_default(),
                webhook.active as i64,
                webhook.created_at.to_rfc3339(),
                webhook.updated_at.to_rfc3339(),
                webhook.last_delivery.map(|t| t.to_rfc3339()),
                webhook.failure_count as i64,
                serde_json::to_string(&webhook.metadata).unwrap_or_default(),
                serde_json::to_string(&webhook.retry_policy).unwrap_or_default(),
                webhook.timeout_secs as i64,
            ],
        )?;
        Ok(())
    }

    fn get_webhook(&self, id: Uuid) -> HooklineResult<WebhookConfig> {
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        conn.query_row(
            "SELECT id, url, events, secret, headers, active, created_at, updated_at,
                last_delivery, failure_count, metadata, retry_policy, timeout_secs
             FROM webhooks WHERE id = ?1",
            params![id.to_string()],
            Self::row_to_webhook,
        )
        .optional()?
        .ok_or_else(|| HooklineError::not_found(format!("webhook {} not found", id)))
    }

    fn list_webhooks(&self, filter: WebhookFilter) -> HooklineResult<Vec<WebhookConfig>> {
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, url, events, secret, headers, active, created_at, updated_at,
                last_delivery, failure_count, metadata, retry_policy, timeout_secs
             FROM webhooks
             WHERE (?1 IS NULL OR active = ?1)
             ORDER BY created_at DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(
            params![
                filter.active.map(|a| a as i64),
                filter.limit.unwrap_or(i64::MAX as usize) as i64,
                filter.offset as i64,
            ],
            Self::row_to_webhook,
        )?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(HooklineError::from)
    }

    fn get_webhooks_by_event(&self, event_type: &str) -> HooklineResult<Vec<WebhookConfig>> {
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, url, events, secret, headers, active, created_at, updated_at,
                last_delivery, failure_count, metadata, retry_policy, timeout_secs
             FROM webhooks WHERE active = 1",
        )?;
        let rows = stmt.query_map([], Self::row_to_webhook)?;
        let webhooks = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(webhooks
            .into_iter()
            .filter(|w| w.should_receive(event_type))
            .collect())
    }

    fn update_webhook(
        &self,
        id: Uuid,
        patch: UpdateWebhookRequest,
    ) -> HooklineResult<WebhookConfig> {
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        let mut webhook = conn
            .query_row(
                "SELECT id, url, events, secret, headers, active, created_at, updated_at,
                    last_delivery, failure_count, metadata, retry_policy, timeout_secs
                 FROM webhooks WHERE id = ?1",
                params![id.to_string()],
                Self::row_to_webhook,
            )
            .optional()?
            .ok_or_else(|| HooklineError::not_found(format!("webhook {} not found", id)))?;
        apply_patch(&mut webhook, patch)?;
        conn.execute(
            "UPDATE webhooks SET url = ?1, events = ?2, secret = ?3, headers = ?4, active = ?5,
                updated_at = ?6, metadata = ?7, retry_policy = ?8, timeout_secs = ?9
             WHERE id = ?10",
            params![
                webhook.url,
                serde_json::to_string(&webhook.events).unwrap_or_default(),
                webhook.secret,
                serde_json::to_string(&webhook.headers).unwrap_or_default(),
                webhook.active as i64,
                webhook.updated_at.to_rfc3339(),
                serde_json::to_string(&webhook.metadata).unwrap_or_default(),
                serde_json::to_string(&webhook.retry_policy).unwrap_or_default(),
                webhook.timeout_secs as i64,
                id.to_string(),
            ],
        )?;
        Ok(webhook)
    }

    fn delete_webhook(&self, id: Uuid) -> HooklineResult<()> {
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        let affected = conn.execute(
            "DELETE FROM webhooks WHERE id = ?1",
            params![id.to_string()],
        )?;
        if affected == 0 {
            return Err(HooklineError::not_found(format!("webhook {} not found", id)));
        }
        Ok(())
    }

    fn increment_failure_count(&self, id: Uuid) -> HooklineResult<u32> {
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        conn.execute(
            "UPDATE webhooks SET failure_count = failure_count + 1, updated_at = ?2 WHERE id = ?1",
            params![id.to_string(), Utc::now().to_rfc3339()],
        )?;
        conn.query_row(
            "SELECT failure_count FROM webhooks WHERE id = ?1",
            params![id.to_string()],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .map(|count| count as u32)
        .ok_or_else(|| HooklineError::not_found(format!("webhook {} not found", id)))
    }

    fn reset_failure_count(&self, id: Uuid) -> HooklineResult<()> {
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        let affected = conn.execute(
            "UPDATE webhooks SET failure_count = 0, updated_at = ?2 WHERE id = ?1",
            params![id.to_string(), Utc::now().to_rfc3339()],
        )?;
        if affected == 0 {
            return Err(HooklineError::not_found(format!("webhook {} not found", id)));
        }
        Ok(())
    }

    fn save_delivery(&self, delivery: WebhookDelivery) -> HooklineResult<()> {
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        conn.execute(
            "INSERT INTO deliveries (id, webhook_id, event_id, event_type, url, request_body,
                status_code, response_body, duration_ms, attempts, success, error,
                delivered_at, next_retry_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(id) DO UPDATE SET
                status_code = excluded.status_code,
                response_body = excluded.response_body,
                duration_ms = excluded.duration_ms,
                attempts = excluded.attempts,
                success = excluded.success,
                error = excluded.error,
                delivered_at = excluded.delivered_at,
                next_retry_at = excluded.next_retry_at",
            params![
                delivery.id.to_string(),
                delivery.webhook_id.to_string(),
                delivery.event_id.to_string(),
                delivery.event_type,
                delivery.url,
                delivery.request_body,
                delivery.status_code.map(|v| v as i64),
                delivery.response_body,
                delivery.duration_ms as i64,
                delivery.attempts as i64,
                delivery.success as i64,
                delivery.error,
                delivery.delivered_at.to_rfc3339(),
                delivery.next_retry_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    fn get_delivery(&self, id: Uuid) -> HooklineResult<WebhookDelivery> {
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        conn.query_row(
            "SELECT id, webhook_id, event_id, event_type, url, request_body, status_code,
                response_body, duration_ms, attempts, success, delivered_at, next_retry_at, error
             FROM deliveries WHERE id = ?1",
            params![id.to_string()],
            Self::row_to_delivery,
        )
        .optional()?
        .ok_or_else(|| HooklineError::delivery_not_found(format!("delivery {} not found", id)))
    }

    fn list_deliveries(
        &self,
        webhook_id: Uuid,
        filter: DeliveryFilter,
    ) -> HooklineResult<Vec<WebhookDelivery>> {
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, webhook_id, event_id, event_type, url, request_body, status_code,
                response_body, duration_ms, attempts, success, delivered_at, next_retry_at, error
             FROM deliveries
             WHERE webhook_id = ?1 AND (?2 IS NULL OR success = ?2)
             ORDER BY delivered_at DESC
             LIMIT ?3 OFFSET ?4",
        )?;
        let rows = stmt.query_map(
            params![
                webhook_id.to_string(),
                filter.success.map(|s| s as i64),
                filter.limit.unwrap_or(i64::MAX as usize) as i64,
                filter.offset as i64,
            ],
            Self::row_to_delivery,
        )?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(HooklineError::from)
    }

    fn get_failed_deliveries(&self, limit: usize) -> HooklineResult<Vec<WebhookDelivery>> {
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, webhook_id, event_id, event_type, url, request_body, status_code,
                response_body, duration_ms, attempts, success, delivered_at, next_retry_at, error
             FROM deliveries
             WHERE success = 0 AND next_retry_at IS NOT NULL AND next_retry_at <= ?1
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(
            params![Utc::now().to_rfc3339(), limit as i64],
            Self::row_to_delivery,
        )?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(HooklineError::from)
    }

    fn update_delivery_retry(
        &self,
        id: Uuid,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> HooklineResult<()> {
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        let affected = conn.execute(
            "UPDATE deliveries SET next_retry_at = ?2 WHERE id = ?1",
            params![id.to_string(), next_retry_at.map(|t| t.to_rfc3339())],
        )?;
        if affected == 0 {
            return Err(HooklineError::delivery_not_found(format!(
                "delivery {} not found",
                id
            )));
        }
        Ok(())
    }

    fn delete_old_deliveries(&self, before: DateTime<Utc>) -> HooklineResult<usize> {
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        let affected = conn.execute(
            "DELETE FROM deliveries WHERE delivered_at < ?1",
            params![before.to_rfc3339()],
        )?;
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    fn webhook(events: HashSet<String>) -> WebhookConfig {
        WebhookConfig {
            id: Uuid::new_v4(),
            url: "https://example.com/hook".to_string(),
            events,
            secret: None,
            headers: HashMap::new(),
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_delivery: None,
            failure_count: 0,
            metadata: HashMap::new(),
            retry_policy: crate::config::RetryPolicy::default(),
            timeout_secs: 30,
        }
    }

    #[test]
    fn test_in_memory_create_get_roundtrip() {
        let repo = InMemoryWebhookRepository::new();
        let w = webhook(HashSet::new());
        repo.create_webhook(w.clone()).unwrap();
        let fetched = repo.get_webhook(w.id).unwrap();
        assert_eq!(fetched.id, w.id);
    }

    #[test]
    fn test_in_memory_duplicate_create_fails() {
        let repo = InMemoryWebhookRepository::new();
        let w = webhook(HashSet::new());
        repo.create_webhook(w.clone()).unwrap();
        assert!(repo.create_webhook(w).is_err());
    }

    #[test]
    fn test_in_memory_update_rejects_malformed_url() {
        let repo = InMemoryWebhookRepository::new();
        let w = webhook(HashSet::new());
        repo.create_webhook(w.clone()).unwrap();
        let patch = UpdateWebhookRequest {
            url: Some("not a url".to_string()),
            ..Default::default()
        };
        assert!(repo.update_webhook(w.id, patch).is_err());
        assert_eq!(repo.get_webhook(w.id).unwrap().url, w.url);
    }

    #[test]
    fn test_in_memory_failure_count_is_monotonic_and_resets() {
        let repo = InMemoryWebhookRepository::new();
        let w = webhook(HashSet::new());
        repo.create_webhook(w.clone()).unwrap();
        assert_eq!(repo.increment_failure_count(w.id).unwrap(), 1);
        assert_eq!(repo.increment_failure_count(w.id).unwrap(), 2);
        repo.reset_failure_count(w.id).unwrap();
        assert_eq!(repo.get_webhook(w.id).unwrap().failure_count, 0);
    }

    #[test]
    fn test_in_memory_get_webhooks_by_event_matches_empty_set() {
        let repo = InMemoryWebhookRepository::new();
        let w = webhook(HashSet::new());
        repo.create_webhook(w).unwrap();
        let matches = repo.get_webhooks_by_event("anything.at.all").unwrap();
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn test_sqlite_create_get_roundtrip() {
        let repo = SqliteWebhookRepository::in_memory().unwrap();
        let mut events = HashSet::new();
        events.insert("workflow.completed".to_string());
        let w = webhook(events);
        repo.create_webhook(w.clone()).unwrap();
        let fetched = repo.get_webhook(w.id).unwrap();
        assert_eq!(fetched.url, w.url);
        assert_eq!(fetched.events, w.events);
    }

    #[test]
    fn test_sqlite_update_applies_only_present_fields() {
        let repo = SqliteWebhookRepository::in_memory().unwrap();
        let w = webhook(HashSet::new());
        repo.create_webhook(w.clone()).unwrap();

        let patch = UpdateWebhookRequest {
            active: Some(false),
            ..Default::default()
        };
        let updated = repo.update_webhook(w.id, patch).unwrap();
        assert!(!updated.active);
        assert_eq!(updated.url, w.url);
    }

    #[test]
    fn test_sqlite_delete_missing_fails() {
        let repo = SqliteWebhookRepository::in_memory().unwrap();
        assert!(repo.delete_webhook(Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_sqlite_save_and_list_deliveries() {
        let repo = SqliteWebhookRepository::in_memory().unwrap();
        let w = webhook(HashSet::new());
        repo.create_webhook(w.clone()).unwrap();

        let delivery = WebhookDelivery {
            id: Uuid::new_v4(),
            webhook_id: w.id,
            event_id: Uuid::new_v4(),
            event_type: "workflow.completed".to_string(),
            url: w.url.clone(),
            request_body: "{}".to_string(),
            status_code: Some(200),
            response_body: Some("ok".to_string()),
            duration_ms: 42,
            attempts: 1,
            success: true,
            error: None,
            delivered_at: Utc::now(),
            next_retry_at: None,
        };
        repo.save_delivery(delivery.clone()).unwrap();
        let deliveries = repo
            .list_deliveries(w.id, DeliveryFilter::default())
            .unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].id, delivery.id);
    }
}
