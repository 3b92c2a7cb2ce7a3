//! # Per-Organization Rate Limiting
//!
//! Fixed-window request counter keyed by the `X-Organization-ID` header.
//! State is in-process; each replica enforces its own budget. Buckets whose
//! window has lapsed are swept once the table grows past
//! [`SWEEP_THRESHOLD`] entries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::Request;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::AppError;
use crate::extractors::ORG_HEADER;

/// Bucket count above which lapsed buckets are dropped.
pub const SWEEP_THRESHOLD: usize = 1024;

const ANONYMOUS: &str = "anonymous";

/// Rate limiter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub max_requests: u64,
    /// Window duration in seconds.
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 1000,
            window_secs: 60,
        }
    }
}

#[derive(Debug, Clone)]
struct BucketState {
    count: u64,
    window_start: Instant,
}

/// Shared rate limiter state.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Arc<Mutex<HashMap<String, BucketState>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Count a request against `key`.
    ///
    /// Returns `Err(seconds)` with the time left in the current window when
    /// the budget is spent.
    pub fn check(&self, key: &str) -> Result<(), u64> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Result<(), u64> {
        let window = Duration::from_secs(self.config.window_secs);
        let mut buckets = self.buckets.lock();
        if buckets.len() >= SWEEP_THRESHOLD {
            buckets.retain(|_, b| now.saturating_duration_since(b.window_start) < window);
        }
        let bucket = buckets.entry(key.to_string()).or_insert(BucketState {
            count: 0,
            window_start: now,
        });

        let elapsed = now.saturating_duration_since(bucket.window_start);
        if elapsed >= window {
            bucket.count = 0;
            bucket.window_start = now;
        }

        if bucket.count >= self.config.max_requests {
            let remaining = window.saturating_sub(elapsed).as_secs().max(1);
            Err(remaining)
        } else {
            bucket.count += 1;
            Ok(())
        }
    }

    #[cfg(test)]
    fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }
}

/// Bucket key for a request: the canonical form of a valid organization
/// id, otherwise the shared anonymous bucket.
fn bucket_key(headers: &HeaderMap) -> String {
    headers
        .get(ORG_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .map_or_else(|| ANONYMOUS.to_string(), |org| org.to_string())
}

/// Middleware that enforces per-organization rate limits.
///
/// Requests without a valid organization header share the `"anonymous"`
/// bucket.
pub async fn rate_limit_middleware(request: Request, next: Next) -> Response {
    let limiter = request.extensions().get::<RateLimiter>().cloned();

    if let Some(limiter) = limiter {
        let key = bucket_key(request.headers());

        if let Err(retry_after_secs) = limiter.check(&key) {
            tracing::warn!(org = %key, retry_after_secs, "rate limit exceeded");
            return AppError::RateLimited { retry_after_secs }.into_response();
        }
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            max_requests,
            window_secs: 60,
        })
    }

    #[test]
    fn allows_up_to_budget_then_rejects() {
        let l = limiter(2);
        let now = Instant::now();
        assert!(l.check_at("org-a", now).is_ok());
        assert!(l.check_at("org-a", now).is_ok());
        let retry = l.check_at("org-a", now).unwrap_err();
        assert_eq!(retry, 60);
    }

    #[test]
    fn keys_are_independent() {
        let l = limiter(1);
        let now = Instant::now();
        assert!(l.check_at("org-a", now).is_ok());
        assert!(l.check_at("org-b", now).is_ok());
        assert!(l.check_at("org-a", now).is_err());
    }

    #[test]
    fn window_rollover_resets_count() {
        let l = limiter(1);
        let start = Instant::now();
        assert!(l.check_at("org-a", start).is_ok());
        assert_eq!(l.check_at("org-a", start + Duration::from_secs(45)), Err(15));
        assert!(l.check_at("org-a", start + Duration::from_secs(61)).is_ok());
    }

    #[test]
    fn lapsed_buckets_are_swept() {
        let l = limiter(1);
        let start = Instant::now();
        for i in 0..SWEEP_THRESHOLD {
            assert!(l.check_at(&format!("org-{i}"), start).is_ok());
        }
        assert_eq!(l.bucket_count(), SWEEP_THRESHOLD);

        let later = start + Duration::from_secs(61);
        assert!(l.check_at("org-fresh", later).is_ok());
        assert_eq!(l.bucket_count(), 1);
    }

    #[test]
    fn live_buckets_survive_a_sweep() {
        let l = limiter(1);
        let start = Instant::now();
        for i in 0..SWEEP_THRESHOLD {
            assert!(l.check_at(&format!("org-{i}"), start).is_ok());
        }
        assert!(l.check_at("org-0", start + Duration::from_secs(30)).is_err());
        assert_eq!(l.bucket_count(), SWEEP_THRESHOLD);
    }

    #[test]
    fn keys_use_canonical_org_ids() {
        let org = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(ORG_HEADER, org.to_string().to_uppercase().parse().unwrap());
        assert_eq!(bucket_key(&headers), org.to_string());

        headers.insert(ORG_HEADER, "not-a-uuid".parse().unwrap());
        assert_eq!(bucket_key(&headers), ANONYMOUS);
        assert_eq!(bucket_key(&HeaderMap::new()), ANONYMOUS);
    }

    #[test]
    fn invalid_org_headers_share_one_budget() {
        let l = limiter(1);
        let now = Instant::now();
        let mut headers = HeaderMap::new();
        headers.insert(ORG_HEADER, "junk-1".parse().unwrap());
        assert!(l.check_at(&bucket_key(&headers), now).is_ok());
        headers.insert(ORG_HEADER, "junk-2".parse().unwrap());
        assert!(l.check_at(&bucket_key(&headers), now).is_err());
    }
}
