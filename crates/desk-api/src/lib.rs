//! # desk-api: Axum API Service
//!
//! Multi-tenant REST surface of the service desk: ITSM tickets, project
//! planning, configurable workflows, leave requests, notifications and
//! reports. Every `/v1` call is scoped to the organization named by the
//! `X-Organization-ID` header.
//!
//! ## API Surface
//!
//! | Prefix                    | Module                       |
//! |---------------------------|------------------------------|
//! | `/v1/csrf-token`          | [`csrf`]                     |
//! | `/v1/users/*`             | [`routes::users`]            |
//! | `/v1/teams/*`             | [`routes::teams`]            |
//! | `/v1/pm/projects/*`       | [`routes::projects`]         |
//! | `/v1/pm/sprints/*`        | [`routes::sprints`]          |
//! | `/v1/pm/tasks/*`          | [`routes::tasks`]            |
//! | `/v1/itsm/incidents/*`    | [`routes::incidents`]        |
//! | `/v1/itsm/problems/*`     | [`routes::problems`]         |
//! | `/v1/itsm/changes/*`      | [`routes::changes`]          |
//! | `/v1/itsm/releases/*`     | [`routes::releases`]         |
//! | `/v1/itsm/slas/*`         | [`routes::slas`]             |
//! | `/v1/itsm/catalog/*`      | [`routes::catalog`]          |
//! | `/v1/workflows/*`, `/v1/workflow-instances/*` | [`routes::workflows`] |
//! | `/v1/leave-requests/*`    | [`routes::leave`]            |
//! | `/v1/notifications/*`     | [`routes::notifications`]    |
//! | `/v1/reports/*`           | [`routes::reports`]          |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → Correlation → Metrics → Auth → RateLimit → Csrf → Handler
//! ```
//!
//! Health probes, `/metrics` and `/openapi.json` sit outside the stack.

pub mod auth;
pub mod config;
pub mod csrf;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod records;
pub mod routes;
pub mod state;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use axum::{Extension, Router};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::csrf::CsrfConfig;
use crate::middleware::rate_limit::RateLimiter;

pub use error::AppError;
pub use state::AppState;

/// Gauges set on each scrape.
pub const OPEN_INCIDENTS: &str = "desk_open_incidents";
pub const ACTIVE_SPRINTS: &str = "desk_active_sprints";
pub const PENDING_LEAVE: &str = "desk_pending_leave_requests";

/// Assemble the application router.
///
/// Health probes and `/metrics` are mounted outside the auth middleware so
/// they stay reachable without credentials.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };
    let csrf_config = CsrfConfig {
        enabled: state.config.csrf_enabled,
    };
    let limiter = RateLimiter::new(state.config.rate_limit.clone());

    let api = Router::new()
        .merge(csrf::router())
        .merge(routes::users::router())
        .merge(routes::teams::router())
        .merge(routes::projects::router())
        .merge(routes::sprints::router())
        .merge(routes::tasks::router())
        .merge(routes::incidents::router())
        .merge(routes::problems::router())
        .merge(routes::changes::router())
        .merge(routes::releases::router())
        .merge(routes::slas::router())
        .merge(routes::catalog::router())
        .merge(routes::workflows::router())
        .merge(routes::leave::router())
        .merge(routes::notifications::router())
        .merge(routes::reports::router());

    let mut api = api
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(from_fn(csrf::csrf_middleware))
        .layer(from_fn(middleware::rate_limit::rate_limit_middleware))
        .layer(from_fn(auth::auth_middleware));
    if state.config.metrics_enabled {
        api = api.layer(from_fn(middleware::metrics::metrics_middleware));
    }
    let mut api = api
        .layer(from_fn(middleware::correlation::correlation_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(auth_config))
        .layer(Extension(csrf_config))
        .layer(Extension(limiter));
    if let Some(cors) = cors_layer(&state.config.allowed_origins) {
        api = api.layer(cors);
    }
    let api = api.with_state(state.clone());

    let mut unauthenticated = Router::new()
        .route("/health/liveness", axum::routing::get(liveness))
        .route("/health/readiness", axum::routing::get(readiness))
        .merge(openapi::router());
    if state.config.metrics_enabled {
        unauthenticated = unauthenticated.route("/metrics", axum::routing::get(render_metrics));
    }
    let unauthenticated = unauthenticated.with_state(state);

    Router::new().merge(unauthenticated).merge(api)
}

/// CORS for the configured dashboard origins; `None` when none are set or
/// none parse as header values.
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring unparsable CORS origin");
                None
            }
        })
        .collect();
    if origins.is_empty() {
        return None;
    }
    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
            ])
            .allow_headers([
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                HeaderName::from_static(extractors::ORG_HEADER),
                HeaderName::from_static(csrf::CSRF_HEADER),
                HeaderName::from_static(middleware::correlation::REQUEST_ID_HEADER),
            ])
            .allow_credentials(true),
    )
}

/// GET /metrics: Prometheus scrape endpoint.
///
/// Domain gauges are refreshed from the stores on each scrape, across all
/// organizations.
async fn render_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let Some(handle) = &state.metrics else {
        return (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response();
    };

    let open_incidents = state
        .incidents
        .list()
        .iter()
        .filter(|i| i.status.is_open())
        .count();
    let active_sprints = state
        .sprints
        .list()
        .iter()
        .filter(|s| s.status == desk_state::SprintStatus::Active)
        .count();
    let pending_leave = state
        .leave_requests
        .list()
        .iter()
        .filter(|l| l.status == desk_state::LeaveStatus::Pending)
        .count();
    metrics::gauge!(OPEN_INCIDENTS).set(open_incidents as f64);
    metrics::gauge!(ACTIVE_SPRINTS).set(active_sprints as f64);
    metrics::gauge!(PENDING_LEAVE).set(pending_leave as f64);

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
        .into_response()
}

/// Liveness probe, 200 while the process runs.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: 503 when a configured database is unreachable.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    match state.ready().await {
        Ok(()) => (StatusCode::OK, "ready").into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "database unreachable").into_response()
        }
    }
}
