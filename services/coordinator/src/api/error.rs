//! API error types and helpers.
//!
//! # Purpose and responsibility
//! Centralizes HTTP error construction so every endpoint returns the same
//! error shape, and maps the authorization taxonomy onto status codes.
//!
//! # Key invariants and assumptions
//! - Error responses carry a stable `code` and a human-readable `message`.
//! - `Unauthenticated` → 401, `InsufficientRole` → 403, `NotFound` → 404,
//!   `Conflict` → 409, `InvalidInput` → 400, `Internal` → 500.
//!
//! # Security considerations
//! - Internal errors are logged server-side; clients get a generic message.
use crate::api::types::ErrorResponse;
use crate::store::StoreError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use loop_authz::AuthzError;

/// Structured API error returned by handlers.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn api_error(status: StatusCode, code: &str, message: &str) -> ApiError {
    ApiError {
        status,
        body: ErrorResponse {
            code: code.to_string(),
            message: message.to_string(),
        },
    }
}

pub fn api_not_found(message: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, "not_found", message)
}

/// Build a 409 Conflict error with a caller-chosen code.
pub fn api_conflict(code: &str, message: &str) -> ApiError {
    api_error(StatusCode::CONFLICT, code, message)
}

/// Logs the store error and returns a generic 500.
pub fn api_internal(message: &str, err: &StoreError) -> ApiError {
    tracing::error!(error = ?err, "coordinator storage error");
    api_internal_message(message)
}

pub fn api_internal_message(message: &str) -> ApiError {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

pub fn api_unauthorized(message: &str) -> ApiError {
    api_error(StatusCode::UNAUTHORIZED, "unauthorized", message)
}

pub fn api_forbidden(message: &str) -> ApiError {
    api_error(StatusCode::FORBIDDEN, "forbidden", message)
}

pub fn api_validation_error(message: &str) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, "validation_error", message)
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::Unauthenticated(message) => api_unauthorized(&message),
            AuthzError::InsufficientRole(message) => api_forbidden(&message),
            AuthzError::NotFound(message) => api_not_found(&message),
            AuthzError::Conflict(message) => api_conflict("conflict", &message),
            AuthzError::InvalidInput(message) => api_validation_error(&message),
            AuthzError::Internal(err) => {
                tracing::error!(error = ?err, "authorization contract violated");
                api_internal_message("internal error")
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unexpected(_) => api_internal("internal error", &err),
            other => ApiError::from(AuthzError::from(other)),
        }
    }
}
