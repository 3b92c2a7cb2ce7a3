//! # CSRF Protection
//!
//! Double-submit cookie scheme. `GET /v1/csrf-token` issues a random token
//! both as the `csrf_token` cookie and in the response body; every
//! POST/PUT/PATCH/DELETE must then echo the cookie value in the
//! `X-CSRF-Token` header. Cross-site pages can make the browser send the
//! cookie but cannot read it to fill the header.

use axum::extract::Request;
use axum::http::Method;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use utoipa::ToSchema;

use crate::error::AppError;
use crate::state::AppState;

pub const CSRF_COOKIE: &str = "csrf_token";
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Whether CSRF checks are enforced, injected as a request extension.
#[derive(Debug, Clone, Copy)]
pub struct CsrfConfig {
    pub enabled: bool,
}

/// Response body of the token endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CsrfToken {
    pub token: String,
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

fn tokens_match(cookie: &str, header: &str) -> bool {
    cookie.len() == header.len() && bool::from(cookie.as_bytes().ct_eq(header.as_bytes()))
}

/// Reject mutating requests whose `X-CSRF-Token` header does not match the
/// `csrf_token` cookie.
pub async fn csrf_middleware(request: Request, next: Next) -> Response {
    let enabled = request
        .extensions()
        .get::<CsrfConfig>()
        .is_some_and(|c| c.enabled);

    if enabled && is_mutating(request.method()) {
        let jar = CookieJar::from_headers(request.headers());
        let cookie = jar.get(CSRF_COOKIE).map(|c| c.value().to_string());
        let header = request
            .headers()
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok());

        let failure = match (cookie.as_deref(), header) {
            (None, _) => Some("missing CSRF cookie, fetch /v1/csrf-token first"),
            (_, None) => Some("missing X-CSRF-Token header"),
            (Some(c), Some(h)) if !tokens_match(c, h) => Some("CSRF token mismatch"),
            _ => None,
        };
        if let Some(reason) = failure {
            tracing::warn!(method = %request.method(), path = %request.uri().path(), reason, "CSRF check failed");
            return AppError::Forbidden(reason.to_string()).into_response();
        }
    }

    next.run(request).await
}

/// Issue a CSRF token.
#[utoipa::path(
    get,
    path = "/v1/csrf-token",
    responses(
        (status = 200, description = "Token issued and set as the csrf_token cookie", body = CsrfToken),
    ),
    tag = "security"
)]
pub async fn issue_token(jar: CookieJar) -> (CookieJar, Json<CsrfToken>) {
    let token = generate_token();
    let cookie = Cookie::build((CSRF_COOKIE, token.clone()))
        .path("/")
        .same_site(SameSite::Strict)
        .build();
    (jar.add(cookie), Json(CsrfToken { token }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/csrf-token", get(issue_token))
}
