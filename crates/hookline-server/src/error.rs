//! Error handling for the REST API server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;

/// API error type.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    // Common error constructors
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "CONFLICT", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.status, self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code,
                message: self.message,
                details: self.details,
            },
        };

        (self.status, Json(body)).into_response()
    }
}

// Convert from hookline-core errors, mirroring each variant's stable code.
impl From<hookline_core::HooklineError> for ApiError {
    fn from(err: hookline_core::HooklineError) -> Self {
        use hookline_core::HooklineError;

        let code = err.code().as_str().to_string();
        match err {
            HooklineError::NotFound { message, .. } => {
                ApiError::new(StatusCode::NOT_FOUND, code, message)
            }
            HooklineError::Validation {
                message,
                suggestion,
                ..
            } => {
                let api_err = ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, code, message);
                match suggestion {
                    Some(suggestion) => {
                        api_err.with_details(serde_json::json!({ "suggestion": suggestion }))
                    }
                    None => api_err,
                }
            }
            HooklineError::Conflict { message, .. } => {
                ApiError::new(StatusCode::CONFLICT, code, message)
            }
            HooklineError::Storage { message, .. } => {
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, code, message)
            }
            HooklineError::Delivery { message, .. } => {
                ApiError::new(StatusCode::BAD_GATEWAY, code, message)
            }
            HooklineError::Configuration(message) => {
                ApiError::new(StatusCode::BAD_REQUEST, code, message)
            }
            HooklineError::SchemaValidation(message) => {
                ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, code, message)
            }
            HooklineError::Io(err) => {
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, code, err.to_string())
            }
            HooklineError::Serialization(err) => {
                ApiError::new(StatusCode::BAD_REQUEST, code, err.to_string())
            }
            HooklineError::Internal(message) => {
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, code, message)
            }
        }
    }
}

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
