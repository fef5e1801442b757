//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{checkout, credits, health, images, upload, vectorize, webhooks};
use crate::state::AppState;
use crate::telemetry::track_metrics;

// ============================================================================
// Concurrency Limiting Constants
// ============================================================================

/// Maximum concurrent uploads and vectorizations. Each holds an image in
/// memory and may wait on a slow third party.
const IMAGE_MAX_CONCURRENT_REQUESTS: usize = 16;

/// Maximum concurrent requests for general API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /api/health` - Health check
///
/// ## Images (Supabase JWT auth)
/// - `POST /api/upload` - Upload a PNG or JPEG
/// - `POST /api/preview` - Preview vectorization
/// - `POST /api/vectorize` - Full vectorization
/// - `GET /api/images` - List the caller's images
/// - `DELETE /api/images/:id` - Delete one of the caller's images
///
/// ## Credits and payments (Supabase JWT auth)
/// - `GET /api/credits` - Balance and free previews
/// - `GET /api/credits/logs` - Credit log history
/// - `POST /api/stripe` - Start a Checkout session
/// - `POST /api/confirmation` - Confirm a completed session
///
/// ## Webhooks (Signature verification)
/// - `POST /api/webhook` - Stripe webhooks
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;
    let metrics = state.metrics.clone();

    // Build CORS layer
    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let image_routes = Router::new()
        .route("/upload", post(upload::upload_image))
        .route("/preview", post(vectorize::preview))
        .route("/vectorize", post(vectorize::vectorize))
        .layer(ConcurrencyLimitLayer::new(IMAGE_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        .route("/images", get(images::list_images))
        .route("/images/:id", delete(images::delete_image))
        .route("/credits", get(credits::get_credits))
        .route("/credits/logs", get(credits::list_credit_logs))
        .route("/stripe", post(checkout::create_checkout))
        .route("/confirmation", post(checkout::confirm_checkout))
        .merge(image_routes)
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    let api = Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        // Webhooks (no rate limit - controlled by Stripe)
        .route("/webhook", post(webhooks::stripe_webhook))
        .merge(api_routes);

    Router::new()
        .nest("/api", api)
        // Global middleware
        .layer(middleware::from_fn_with_state(metrics, track_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Extractors report an oversized body as 413 so handlers can map it
        .layer(DefaultBodyLimit::max(max_body_bytes))
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
