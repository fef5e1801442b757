//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use tovector_core::TovectorError;
use tovector_store::StoreError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden - valid credentials but not the owner.
    #[error("forbidden")]
    Forbidden,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Insufficient credits.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current balance.
        balance: i64,
        /// Required amount.
        required: i64,
    },

    /// Too many requests in the current window.
    #[error("too many requests")]
    RateLimited {
        /// Seconds until the window resets.
        retry_after_seconds: u64,
    },

    /// Internal server error. The message is logged, not returned.
    #[error("internal error: {0}")]
    Internal(String),

    /// A server-side step failed; the message is safe to return.
    #[error("operation failed: {0}")]
    Failed(String),

    /// External service error, returned with a fixed public message.
    #[error("external service error: {0}")]
    ExternalService(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Unauthorized".to_string(),
                None,
            ),
            Self::Forbidden => (
                StatusCode::FORBIDDEN,
                "forbidden",
                "Forbidden".to_string(),
                None,
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::InsufficientCredits { balance, required } => (
                StatusCode::PAYMENT_REQUIRED,
                "insufficient_credits",
                "Insufficient credits".to_string(),
                Some(serde_json::json!({
                    "balance": balance,
                    "required": required
                })),
            ),
            Self::RateLimited {
                retry_after_seconds,
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "Too many uploads. Please try again later.".to_string(),
                Some(serde_json::json!({ "retry_after_seconds": retry_after_seconds })),
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            Self::Failed(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "operation_failed",
                msg.clone(),
                None,
            ),
            Self::ExternalService(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "external_service_error",
                msg.clone(),
                None,
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<TovectorError> for ApiError {
    fn from(err: TovectorError) -> Self {
        match err {
            TovectorError::InsufficientCredits { balance, required } => {
                Self::InsufficientCredits { balance, required }
            }
            TovectorError::UnsupportedMediaType(_) => {
                Self::BadRequest("Invalid file type. Only PNG and JPG files are allowed.".into())
            }
            TovectorError::FileTooLarge { max, .. } => Self::BadRequest(format!(
                "File too large. Maximum size is {}MB.",
                max / (1024 * 1024)
            )),
            TovectorError::InvalidAmount(msg) => Self::BadRequest(msg),
            TovectorError::UnknownAction(action) => {
                Self::BadRequest(format!("Unknown action type: {action}"))
            }
            TovectorError::InvalidId(e) => Self::BadRequest(e.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound(format!("{entity} not found: {id}")),
            StoreError::Rejected(e) => e.into(),
            StoreError::DuplicateEvent { reference } => {
                Self::BadRequest(format!("Event {reference} already processed"))
            }
            StoreError::Database(msg) => Self::Internal(msg),
        }
    }
}
