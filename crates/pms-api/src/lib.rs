//! HTTP error mapping for the project management API.
//!
//! Every failure leaves the server as a problem-details body:
//!
//! ```json
//! { "status": 404, "title": "Not Found", "detail": "Project with id: 42 doesn't exist" }
//! ```

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use pms_auth::JwtError;
use pms_cache::DispatchError;
use pms_core::{CoreError, ValidationErrors};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Detail shown for every 5xx response. The underlying cause is logged only.
pub const INTERNAL_ERROR_DETAIL: &str = "Something went wrong";

pub const PROBLEM_JSON: &str = "application/problem+json";

/// Problem-details response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemDetails {
    pub status: u16,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Per-field messages for validation failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Value>,
}

impl ProblemDetails {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status: status.as_u16(),
            title: status.canonical_reason().unwrap_or("Error").to_string(),
            detail: Some(detail.into()),
            errors: None,
        }
    }
}

/// High-level API errors to be mapped to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    /// A business rule with a status code other than 403 or 409.
    #[error("{message}")]
    BusinessRule { status: StatusCode, message: String },
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BusinessRule { status, .. } => *status,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_problem_details(&self) -> ProblemDetails {
        let status = self.status_code();
        match self {
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::ServiceUnavailable(msg) => ProblemDetails::new(status, msg),
            ApiError::BusinessRule { message, .. } => ProblemDetails::new(status, message),
            ApiError::Validation(errors) => ProblemDetails {
                errors: serde_json::to_value(errors).ok(),
                ..ProblemDetails::new(status, "One or more validation errors occurred.")
            },
            ApiError::Internal(_) => ProblemDetails::new(status, INTERNAL_ERROR_DETAIL),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            CoreError::BusinessRule { message, status } => match status {
                403 => ApiError::Forbidden(message),
                409 => ApiError::Conflict(message),
                other => match StatusCode::from_u16(other) {
                    Ok(status) => ApiError::BusinessRule { status, message },
                    Err(_) => ApiError::Internal(message),
                },
            },
            CoreError::Validation(errors) => ApiError::Validation(errors),
            CoreError::OperationFailed { .. } | CoreError::Storage(_) | CoreError::JsonError(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        if err.is_validation_error() {
            ApiError::Unauthorized(err.to_string())
        } else {
            ApiError::Internal(err.to_string())
        }
    }
}

impl<E> From<DispatchError<E>> for ApiError
where
    E: Into<ApiError>,
{
    fn from(err: DispatchError<E>) -> Self {
        match err {
            DispatchError::Cancelled => ApiError::service_unavailable("Request cancelled"),
            DispatchError::Handler(inner) => inner.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %self, "request rejected");
        }

        let body = serde_json::to_vec(&self.to_problem_details()).unwrap_or_else(|_| b"{}".to_vec());
        (
            status,
            [(header::CONTENT_TYPE, HeaderValue::from_static(PROBLEM_JSON))],
            body,
        )
            .into_response()
    }
}

/// Convenience result type for HTTP handlers
pub type ApiResult<T> = Result<T, ApiError>;
