//! # Request Correlation
//!
//! Every request gets a correlation id: the caller's `X-Request-ID` when it
//! is a short printable token, otherwise a fresh UUID. The id is echoed in
//! the response header, attached to the request's tracing span and made
//! available to [`crate::error::AppError`] through a task-local.

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::CORRELATION_ID;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_REQUEST_ID_LEN: usize = 128;

fn accept_request_id(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_REQUEST_ID_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b':'))
}

pub async fn correlation_middleware(request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| accept_request_id(v))
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let span = tracing::info_span!("request", correlation_id = %id);
    let mut response = CORRELATION_ID
        .scope(id.clone(), next.run(request).instrument(span))
        .await;

    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_uuid_and_simple_tokens() {
        assert!(accept_request_id(&Uuid::new_v4().to_string()));
        assert!(accept_request_id("req_42.retry:1"));
    }

    #[test]
    fn rejects_empty_oversized_and_unprintable() {
        assert!(!accept_request_id(""));
        assert!(!accept_request_id(&"a".repeat(MAX_REQUEST_ID_LEN + 1)));
        assert!(!accept_request_id("has space"));
        assert!(!accept_request_id("new\nline"));
    }
}
