//! Router configuration.
//!
//! Sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{health, limits, subscriptions, usage, webhooks};
use crate::state::AppState;

/// Maximum concurrent requests for usage-tracking endpoints. Tracking calls
/// arrive from every upload and playback worker, so they get their own,
/// higher cap.
const USAGE_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Maximum concurrent requests for the rest of the API.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Per-organization (service API key auth)
/// - `GET  /v1/orgs/{org}/usage` - Current-period usage
/// - `GET  /v1/orgs/{org}/usage/history` - Past periods
/// - `POST /v1/orgs/{org}/usage/{storage|videos|bandwidth|ai}` - Track
/// - `DELETE /v1/orgs/{org}/usage/{storage|videos}` - Release
/// - `POST /v1/orgs/{org}/limits/{check|enforce}` - Pre-flight gate
/// - `GET  /v1/orgs/{org}/access` - Access classification
/// - `GET  /v1/orgs/{org}/subscription`, `GET /v1/orgs/{org}/invoices`
/// - `POST /v1/orgs/{org}/overage/{calculate|report}`
///
/// ## Lifecycle
/// - `GET  /v1/plans` - Active plan catalog
/// - `POST /v1/subscriptions/trial` - Trial provisioning
/// - `POST /webhooks/billing` - Processor event feed (signature verified,
///   no concurrency cap: delivery pacing belongs to the sender)
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let state = Arc::new(state);

    let usage_routes = Router::new()
        .route("/", get(usage::current_usage))
        .route("/history", get(usage::usage_history))
        .route(
            "/storage",
            post(usage::track_storage).delete(usage::release_storage),
        )
        .route(
            "/videos",
            post(usage::track_videos).delete(usage::release_videos),
        )
        .route("/bandwidth", post(usage::track_bandwidth))
        .route("/ai", post(usage::track_ai))
        .layer(ConcurrencyLimitLayer::new(USAGE_MAX_CONCURRENT_REQUESTS));

    let org_routes = Router::new()
        .nest("/usage", usage_routes)
        .route("/limits/check", post(limits::check))
        .route("/limits/enforce", post(limits::enforce))
        .route("/access", get(limits::access))
        .route("/access/write", get(limits::require_write))
        .route("/subscription", get(subscriptions::current))
        .route("/invoices", get(subscriptions::invoices))
        .route("/overage/calculate", post(subscriptions::calculate_overage))
        .route("/overage/report", post(subscriptions::report_overage));

    let api_routes = Router::new()
        .nest("/orgs/:org_id", org_routes)
        .route("/plans", get(subscriptions::list_plans))
        .route("/subscriptions/trial", post(subscriptions::provision_trial))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        .route("/health", get(health::health))
        .nest("/v1", api_routes)
        .route("/webhooks/billing", post(webhooks::billing_webhook))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
