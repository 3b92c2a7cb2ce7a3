//! # Custom Extractors & Validation
//!
//! Provides the [`Validate`] trait for request DTOs, helpers that map body
//! and query rejections into [`AppError::BadRequest`], and the
//! [`OrgContext`] tenancy extractor.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::Query;
use axum::http::request::Parts;
use axum::Json;
use desk_core::PageRequest;
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::error::AppError;

/// Tenancy header carried by every `/v1` request.
pub const ORG_HEADER: &str = "x-organization-id";

/// Trait for request types that can validate their business rules
/// beyond what serde deserialization checks.
pub trait Validate {
    /// Validate business rules. Returns an error message on failure.
    fn validate(&self) -> Result<(), String>;
}

/// Extract a JSON body, mapping deserialization errors to [`AppError::BadRequest`].
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Extract a JSON body and validate it using the [`Validate`] trait.
pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    let value = extract_json(result)?;
    value.validate().map_err(AppError::Validation)?;
    Ok(value)
}

/// Extract query parameters, mapping parse errors to [`AppError::BadRequest`].
pub fn extract_query<T>(result: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    result
        .map(|Query(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Reject blank strings after trimming.
pub fn require_non_empty(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{field} must not be empty"))
    } else {
        Ok(())
    }
}

// ── Tenancy ─────────────────────────────────────────────────────────────────

/// The organization a request acts on, from the `X-Organization-ID` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrgContext(pub Uuid);

impl OrgContext {
    pub fn id(&self) -> Uuid {
        self.0
    }
}

impl<S: Send + Sync> axum::extract::FromRequestParts<S> for OrgContext {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(ORG_HEADER)
            .ok_or_else(|| AppError::BadRequest("missing X-Organization-ID header".into()))?;
        let text = raw
            .to_str()
            .map_err(|_| AppError::BadRequest("X-Organization-ID must be ASCII".into()))?;
        text.trim()
            .parse::<Uuid>()
            .map(OrgContext)
            .map_err(|e| AppError::BadRequest(format!("X-Organization-ID is not a UUID: {e}")))
    }
}

// ── Pagination ──────────────────────────────────────────────────────────────

/// `limit` / `offset` query parameters accepted by list endpoints.
#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageParams {
    /// Page size, 1 to 200 (default 50).
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl PageParams {
    pub fn page(&self) -> PageRequest {
        PageRequest::new(self.limit, self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::FromRequestParts;
    use axum::http::Request;

    #[derive(Debug)]
    struct Named(String);

    impl Validate for Named {
        fn validate(&self) -> Result<(), String> {
            require_non_empty("name", &self.0)
        }
    }

    #[test]
    fn validated_json_maps_rule_failures_to_validation() {
        let err = extract_validated_json(Ok(Json(Named("  ".into())))).unwrap_err();
        assert!(matches!(err, AppError::Validation(msg) if msg == "name must not be empty"));
        assert!(extract_validated_json(Ok(Json(Named("ok".into())))).is_ok());
    }

    async fn org_from(header: Option<&str>) -> Result<OrgContext, AppError> {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header(ORG_HEADER, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        OrgContext::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn org_context_parses_uuid_header() {
        let org = Uuid::new_v4();
        assert_eq!(org_from(Some(&org.to_string())).await.unwrap().id(), org);
    }

    #[tokio::test]
    async fn org_context_missing_or_invalid_is_bad_request() {
        assert!(matches!(org_from(None).await, Err(AppError::BadRequest(_))));
        assert!(matches!(org_from(Some("acme")).await, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn page_params_clamp_limit() {
        let p = PageParams { limit: Some(10_000), offset: Some(5) }.page();
        assert_eq!(p.limit, desk_core::pagination::MAX_LIMIT);
        assert_eq!(p.offset, 5);
    }
}
