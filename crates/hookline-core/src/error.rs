//! Error types for hookline operations.
//!
//! Mirrors the structured error hierarchy used across the crate: every
//! variant carries a message plus a stable [`ErrorCode`] for programmatic
//! handling, and `Validation` carries an optional suggestion for callers.

use thiserror::Error;

/// Result type alias for hookline operations.
pub type HooklineResult<T> = Result<T, HooklineError>;

/// Main error type for the event bus and webhook pipeline.
#[derive(Error, Debug)]
pub enum HooklineError {
    /// Requested entity (webhook, delivery, event) does not exist.
    #[error("not found: {message}")]
    NotFound { message: String, code: ErrorCode },

    /// Caller-supplied input failed validation (bad URL, bad event-type tag, ...).
    #[error("validation error: {message}")]
    Validation {
        message: String,
        code: ErrorCode,
        suggestion: Option<String>,
    },

    /// Attempted to create an entity whose ID is already in use.
    #[error("conflict: {message}")]
    Conflict { message: String, code: ErrorCode },

    /// Repository/storage backend failure.
    #[error("storage error: {message}")]
    Storage {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Outbound HTTP delivery failure (network or non-2xx after retries exhausted).
    #[error("delivery error: {message}")]
    Delivery { message: String, code: ErrorCode },

    /// Configuration could not be parsed or was internally inconsistent.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Schema validation failed for `EventRegistry::emit_event`.
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),

    /// IO error (config file loading, etc).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ValInvalidInput,
    ValInvalidUrl,
    ValInvalidEventType,
    WebhookNotFound,
    DeliveryNotFound,
    EventNotFound,
    Conflict,
    StorageFailed,
    DeliveryFailed,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValInvalidInput => "VAL_001",
            ErrorCode::ValInvalidUrl => "VAL_002",
            ErrorCode::ValInvalidEventType => "VAL_003",
            ErrorCode::WebhookNotFound => "WH_001",
            ErrorCode::DeliveryNotFound => "WH_002",
            ErrorCode::EventNotFound => "WH_003",
            ErrorCode::Conflict => "WH_004",
            ErrorCode::StorageFailed => "DB_001",
            ErrorCode::DeliveryFailed => "NET_001",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl HooklineError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            code: ErrorCode::WebhookNotFound,
        }
    }

    pub fn delivery_not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            code: ErrorCode::DeliveryNotFound,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
            suggestion: None,
        }
    }

    pub fn validation_with_suggestion(
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
            suggestion: Some(suggestion.into()),
        }
    }

    pub fn invalid_url(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidUrl,
            suggestion: Some("provide an absolute http(s) URL".to_string()),
        }
    }

    pub fn invalid_event_type(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidEventType,
            suggestion: Some(
                "event types must match ^[A-Za-z][A-Za-z0-9_]*(\\.[A-Za-z][A-Za-z0-9_]*)?$"
                    .to_string(),
            ),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            code: ErrorCode::Conflict,
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            code: ErrorCode::StorageFailed,
            source: None,
        }
    }

    pub fn delivery(message: impl Into<String>) -> Self {
        Self::Delivery {
            message: message.into(),
            code: ErrorCode::DeliveryFailed,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { code, .. } => *code,
            Self::Validation { code, .. } => *code,
            Self::Conflict { code, .. } => *code,
            Self::Storage { code, .. } => *code,
            Self::Delivery { code, .. } => *code,
            _ => ErrorCode::Internal,
        }
    }

    /// A short suggestion for resolving this error, if one is known.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Validation { suggestion, .. } => suggestion.as_deref(),
            Self::NotFound { .. } => Some("check the ID and retry"),
            Self::Conflict { .. } => Some("use a different ID or update the existing entity"),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for HooklineError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage {
            message: err.to_string(),
            code: ErrorCode::StorageFailed,
            source: Some(Box::new(err)),
        }
    }
}
