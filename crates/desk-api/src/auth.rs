//! # Authentication & Authorization Middleware
//!
//! Bearer token middleware with role-based access control.
//!
//! ## Token Format
//!
//! ```text
//! Bearer {role}:{user_id}:{secret}    scoped caller (user_id may be empty)
//! Bearer {secret}                     service token, treated as admin
//! ```
//!
//! The secret is the deployment's shared `AUTH_TOKEN`. Identity proper is
//! owned by an upstream identity provider; this layer only checks the
//! shared secret and carries the caller's role and user id to handlers.

use axum::extract::Request;
use axum::http::header;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use desk_core::Role;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::config::SecretToken;
use crate::error::AppError;

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// Identity of the authenticated caller, injected into request extensions
/// by [`auth_middleware`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub role: Role,
    /// The user the caller acts as. `None` for service tokens.
    pub user_id: Option<Uuid>,
}

impl CallerIdentity {
    /// Full-access identity used when authentication is disabled.
    pub fn service() -> Self {
        Self {
            role: Role::Admin,
            user_id: None,
        }
    }

    pub fn has_role(&self, minimum: Role) -> bool {
        self.role >= minimum
    }

    /// The caller's user id, required by endpoints that act on "my" records.
    pub fn require_user(&self) -> Result<Uuid, AppError> {
        self.user_id.ok_or_else(|| {
            AppError::BadRequest("this operation requires a token bound to a user id".into())
        })
    }
}

impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

/// Check that the caller has at least the required role.
/// Returns 403 Forbidden if the caller's role is insufficient.
pub fn require_role(caller: &CallerIdentity, minimum: Role) -> Result<(), AppError> {
    if caller.has_role(minimum) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role '{}' required, caller has '{}'",
            minimum.as_str(),
            caller.role.as_str()
        )))
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub token: Option<SecretToken>,
}

// ── Token Validation ────────────────────────────────────────────────────────

/// Constant-time comparison of bearer secrets.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Parse a bearer token in format `{role}:{user_id}:{secret}` or `{secret}`.
pub fn parse_bearer_token(provided: &str, expected_secret: &str) -> Result<CallerIdentity, String> {
    let parts: Vec<&str> = provided.splitn(3, ':').collect();

    match parts.as_slice() {
        [secret] => {
            if constant_time_token_eq(secret, expected_secret) {
                Ok(CallerIdentity::service())
            } else {
                Err("invalid bearer token".into())
            }
        }
        [role_str, user_str, secret] => {
            if !constant_time_token_eq(secret, expected_secret) {
                return Err("invalid bearer token".into());
            }
            let role = Role::parse(role_str).ok_or_else(|| format!("unknown role: {role_str}"))?;
            let user_id = if user_str.is_empty() {
                None
            } else {
                Some(
                    user_str
                        .parse::<Uuid>()
                        .map_err(|e| format!("invalid user_id: {e}"))?,
                )
            };
            Ok(CallerIdentity { role, user_id })
        }
        _ => Err("invalid token format, expected {role}:{user_id}:{secret} or {secret}".into()),
    }
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Validate the `Authorization: Bearer` header and inject [`CallerIdentity`].
///
/// When `AuthConfig.token` is `None`, every request runs as an admin service
/// caller (development mode).
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let expected = request
        .extensions()
        .get::<AuthConfig>()
        .and_then(|c| c.token.clone());

    let Some(expected) = expected else {
        request.extensions_mut().insert(CallerIdentity::service());
        return next.run(request).await;
    };

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let identity = match auth_header {
        Some(value) => match value.strip_prefix("Bearer ") {
            Some(provided) => parse_bearer_token(provided.trim(), expected.expose()),
            None => Err("authorization header must use Bearer scheme".to_string()),
        },
        None => Err("missing authorization header".to_string()),
    };

    match identity {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(msg) => {
            tracing::warn!(reason = %msg, "authentication failed");
            AppError::Unauthorized(msg).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_app(token: Option<&str>) -> Router {
        let auth_config = AuthConfig {
            token: token.map(SecretToken::new),
        };
        Router::new()
            .route(
                "/whoami",
                get(|caller: CallerIdentity| async move {
                    format!(
                        "{}:{}",
                        caller.role,
                        caller.user_id.map(|u| u.to_string()).unwrap_or_default()
                    )
                }),
            )
            .layer(from_fn(auth_middleware))
            .layer(axum::Extension(auth_config))
    }

    async fn call(app: Router, auth: Option<&str>) -> (StatusCode, String) {
        let mut builder = Request::builder().uri("/whoami");
        if let Some(value) = auth {
            builder = builder.header("authorization", value);
        }
        let resp = app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    // ── parse_bearer_token ───────────────────────────────────────────

    #[test]
    fn bare_secret_is_admin() {
        let id = parse_bearer_token("s3cret", "s3cret").unwrap();
        assert_eq!(id, CallerIdentity::service());
    }

    #[test]
    fn scoped_token_carries_role_and_user() {
        let user = Uuid::new_v4();
        let id = parse_bearer_token(&format!("agent:{user}:s3cret"), "s3cret").unwrap();
        assert_eq!(id.role, Role::Agent);
        assert_eq!(id.user_id, Some(user));
    }

    #[test]
    fn scoped_token_with_empty_user() {
        let id = parse_bearer_token("manager::s3cret", "s3cret").unwrap();
        assert_eq!(id.role, Role::Manager);
        assert!(id.user_id.is_none());
    }

    #[test]
    fn wrong_secret_rejected() {
        assert!(parse_bearer_token("nope", "s3cret").is_err());
        assert!(parse_bearer_token("admin::nope", "s3cret").is_err());
    }

    #[test]
    fn unknown_role_and_bad_user_rejected() {
        assert!(parse_bearer_token("root::s3cret", "s3cret").unwrap_err().contains("unknown role"));
        assert!(parse_bearer_token("agent:xyz:s3cret", "s3cret")
            .unwrap_err()
            .contains("invalid user_id"));
    }

    #[test]
    fn two_part_token_is_malformed() {
        assert!(parse_bearer_token("agent:s3cret", "s3cret").is_err());
    }

    #[test]
    fn require_role_checks_ordering() {
        let agent = CallerIdentity { role: Role::Agent, user_id: None };
        assert!(require_role(&agent, Role::Viewer).is_ok());
        assert!(require_role(&agent, Role::Agent).is_ok());
        assert!(matches!(require_role(&agent, Role::Manager), Err(AppError::Forbidden(_))));
    }

    // ── middleware ───────────────────────────────────────────────────

    #[tokio::test]
    async fn disabled_auth_injects_admin() {
        let (status, body) = call(test_app(None), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "admin:");
    }

    #[tokio::test]
    async fn missing_header_rejected() {
        let (status, body) = call(test_app(Some("s3cret")), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("missing authorization header"));
    }

    #[tokio::test]
    async fn basic_scheme_rejected() {
        let (status, _) = call(test_app(Some("s3cret")), Some("Basic dXNlcjpwYXNz")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_scoped_token_reaches_handler() {
        let user = Uuid::new_v4();
        let header = format!("Bearer viewer:{user}:s3cret");
        let (status, body) = call(test_app(Some("s3cret")), Some(header.as_str())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, format!("viewer:{user}"));
    }
}
