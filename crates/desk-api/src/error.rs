//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps domain errors from desk-core, desk-state and desk-engine to HTTP
//! status codes. Every error body carries the request's correlation id and
//! the time the error was produced so that a client report can be matched to
//! server logs. Internal error details are never returned to clients.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

tokio::task_local! {
    /// Correlation id of the request being served, set by
    /// [`crate::middleware::correlation::correlation_middleware`].
    pub static CORRELATION_ID: String;
}

/// The current request's correlation id, or a fresh one outside a request.
pub fn correlation_id() -> String {
    CORRELATION_ID
        .try_with(Clone::clone)
        .unwrap_or_else(|_| Uuid::new_v4().to_string())
}

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "VALIDATION_ERROR").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details, present only for some client errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Matches the `X-Request-ID` response header.
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed request: bad headers, unparsable body or query (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not permitted (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Resource not found, or owned by another organization (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Conflict with current resource state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Well-formed request that violates a business rule (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Per-organization request budget exhausted (429).
    #[error("rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),

    /// Dependency not configured or unreachable (503).
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Self::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::RateLimited { retry_after_secs } => {
                Some(serde_json::json!({ "retry_after_secs": retry_after_secs }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let correlation_id = correlation_id();

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        match &self {
            Self::Internal(_) => {
                tracing::error!(error = %self, correlation_id = %correlation_id, "internal server error")
            }
            Self::ServiceUnavailable(_) => {
                tracing::warn!(error = %self, correlation_id = %correlation_id, "service unavailable")
            }
            _ => {}
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: self.details(),
                correlation_id,
                timestamp: Utc::now(),
            },
        };

        let mut response = (status, Json(body)).into_response();
        if let Self::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

impl From<desk_core::ValidationError> for AppError {
    fn from(err: desk_core::ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Rejected status changes conflict with the record's current state.
impl From<desk_state::LifecycleError> for AppError {
    fn from(err: desk_state::LifecycleError) -> Self {
        Self::Conflict(err.to_string())
    }
}

impl From<desk_state::WorkflowError> for AppError {
    fn from(err: desk_state::WorkflowError) -> Self {
        use desk_state::WorkflowError as W;
        match err {
            W::InstanceCompleted | W::NoSuchTransition { .. } => Self::Conflict(err.to_string()),
            W::InsufficientRole { .. } => Self::Forbidden(err.to_string()),
            _ => Self::Validation(err.to_string()),
        }
    }
}

impl From<desk_engine::PlanningError> for AppError {
    fn from(err: desk_engine::PlanningError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<desk_engine::BoardError> for AppError {
    fn from(err: desk_engine::BoardError) -> Self {
        match err {
            desk_engine::BoardError::CardNotFound(_) => Self::NotFound(err.to_string()),
            desk_engine::BoardError::WipLimitExceeded { .. } => Self::Conflict(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn status_codes_follow_taxonomy() {
        let cases = [
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            (AppError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            (AppError::Forbidden("x".into()), StatusCode::FORBIDDEN, "FORBIDDEN"),
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND, "NOT_FOUND"),
            (AppError::Conflict("x".into()), StatusCode::CONFLICT, "CONFLICT"),
            (AppError::Validation("x".into()), StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            (AppError::RateLimited { retry_after_secs: 3 }, StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            (AppError::ServiceUnavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status_and_code(), (status, code), "{err}");
        }
    }

    #[test]
    fn lifecycle_error_converts_to_conflict() {
        let err = AppError::from(desk_state::LifecycleError::Terminal {
            state: "CLOSED".into(),
        });
        assert_eq!(err.status_and_code().0, StatusCode::CONFLICT);
    }

    #[test]
    fn workflow_errors_split_by_kind() {
        use desk_state::WorkflowError as W;
        assert!(matches!(AppError::from(W::NoStates), AppError::Validation(_)));
        assert!(matches!(AppError::from(W::InstanceCompleted), AppError::Conflict(_)));
        assert!(matches!(
            AppError::from(W::InsufficientRole {
                transition: "approve".into(),
                required: desk_core::Role::Manager
            }),
            AppError::Forbidden(_)
        ));
    }

    #[test]
    fn board_wip_limit_is_conflict() {
        let err = AppError::from(desk_engine::BoardError::WipLimitExceeded {
            status: desk_state::TaskStatus::InProgress,
            limit: 3,
        });
        assert_eq!(err.status_and_code().0, StatusCode::CONFLICT);
    }

    // ── into_response ───────────────────────────────────────────────

    async fn response_parts(err: AppError) -> (StatusCode, axum::http::HeaderMap, ErrorBody) {
        let response = err.into_response();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn internal_error_hides_details() {
        let (status, _, body) = response_parts(AppError::Internal("db connection failed".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error.message, "An internal error occurred");
        assert!(!body.error.correlation_id.is_empty());
    }

    #[tokio::test]
    async fn correlation_id_comes_from_task_scope() {
        let (_, _, body) = CORRELATION_ID
            .scope("req-42".to_string(), response_parts(AppError::NotFound("task 1".into())))
            .await;
        assert_eq!(body.error.correlation_id, "req-42");
        assert!(body.error.message.contains("task 1"));
    }

    #[tokio::test]
    async fn rate_limited_sets_retry_after() {
        let (status, headers, body) = response_parts(AppError::RateLimited { retry_after_secs: 17 }).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(headers.get(header::RETRY_AFTER).unwrap(), "17");
        assert_eq!(body.error.details.unwrap()["retry_after_secs"], 17);
    }
}
