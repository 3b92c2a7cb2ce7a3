//! servicedesk API server.
//!
//! Configuration comes from the environment (see [`desk_api::config`]).
//! Set `LOG_FORMAT=json` for structured log lines and `RUST_LOG` to tune
//! verbosity.

use std::net::SocketAddr;
use std::process::ExitCode;

use desk_api::config::AppConfig;
use desk_api::middleware::metrics::install_recorder;
use desk_api::{app, db, AppState};
use tracing_subscriber::EnvFilter;

/// Events checked at startup.
const AUDIT_VERIFY_LIMIT: i64 = 100_000;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    if config.auth_token.is_none() {
        tracing::warn!("AUTH_TOKEN not set; every request runs as an administrator");
    }

    let pool = match db::init_pool().await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "database initialization failed");
            return ExitCode::FAILURE;
        }
    };

    let port = config.port;
    let metrics_enabled = config.metrics_enabled;
    let mut state = AppState::with_config(config, pool);
    if metrics_enabled {
        match install_recorder() {
            Ok(handle) => state = state.with_metrics(handle),
            Err(e) => tracing::warn!(error = %e, "Prometheus recorder not installed"),
        }
    }
    if let Err(e) = state.hydrate_from_db().await {
        tracing::error!(error = %e, "failed to hydrate stores");
        return ExitCode::FAILURE;
    }
    if let Some(pool) = &state.db_pool {
        match db::audit::verify_chain_integrity(pool, AUDIT_VERIFY_LIMIT).await {
            Ok(r) if r.chain_valid => {
                tracing::info!(events = r.total_events, "audit chain verified");
            }
            Ok(r) => tracing::warn!(
                events = r.total_events,
                broken_links = r.broken_links,
                "audit chain has broken links"
            ),
            Err(e) => tracing::warn!(error = %e, "audit chain verification failed"),
        }
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "failed to bind listener");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(%addr, "desk-api listening");

    if let Err(e) = axum::serve(listener, app(state).into_make_service()).await {
        tracing::error!(error = %e, "server error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
