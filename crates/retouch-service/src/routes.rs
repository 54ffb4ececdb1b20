//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{credits, devices, generate, health, webhooks};
use crate::state::AppState;

/// Maximum concurrent requests for the client-facing API.
const API_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Maximum concurrent generation requests. Each one holds a provider call open.
const GENERATE_MAX_CONCURRENT_REQUESTS: usize = 20;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Client API (device id in body or query)
/// - `POST /api/device_info` - Onboard a device or refresh its metadata
/// - `GET /api/get_credits` - Read the balance
/// - `POST /api/generate` - Paid image generation
///
/// ## Webhooks
/// - `POST /api/revenuecat` - `RevenueCat` subscription events
pub fn create_router(state: AppState) -> Router {
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let generate_routes = Router::new()
        .route("/generate", post(generate::generate))
        .layer(ConcurrencyLimitLayer::new(GENERATE_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        .route("/device_info", post(devices::device_info))
        .route("/get_credits", get(credits::get_credits))
        .merge(generate_routes)
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS))
        // Webhooks (no rate limit - controlled by RevenueCat)
        .route("/revenuecat", post(webhooks::revenuecat_webhook));

    Router::new()
        .route("/health", get(health::health))
        .nest("/api", api_routes)
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
