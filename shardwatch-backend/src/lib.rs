pub mod config;
mod error;
pub mod helpers;
pub mod monitor;
pub mod notifier;
pub mod reconcile;
mod routes;
pub mod scheduler;
pub mod source;
pub mod validation;

use axum::{Router, http::StatusCode, routing::get};
use chrono::TimeDelta;
use std::sync::Arc;
use std::time::Duration;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::monitor::SharedStore;

pub struct AppState {
    pub store: SharedStore,
    /// Servers unseen for longer than this are flagged stale
    pub stale_after: TimeDelta,
}

/// Rate limiting configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests per second per client
    pub per_sec: u64,
    /// Burst size per client
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_sec: 10,
            burst: 20,
        }
    }
}

/// Create the read-only query router over the shared state store
pub fn create_app(
    store: SharedStore,
    request_body_limit: usize,
    request_timeout: Duration,
    rate_limit: RateLimitConfig,
    stale_after: TimeDelta,
) -> Router {
    let state = Arc::new(AppState { store, stale_after });

    let governor = GovernorConfigBuilder::default()
        .per_second(rate_limit.per_sec.max(1))
        .burst_size(rate_limit.burst.max(1))
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .expect("rate limit values are clamped to at least 1");

    let server_routes = Router::new()
        .route("/servers", get(routes::list_servers))
        .route("/servers/{name}", get(routes::get_server))
        .layer(GovernorLayer::new(governor));

    Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .merge(server_routes)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(RequestBodyLimitLayer::new(request_body_limit))
        .with_state(state)
}
