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

use crate::handlers::{health, migrations, reservations, sync};
use crate::state::AppState;

/// Maximum concurrent requests for admin API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check with backend and sync state
///
/// ## Reservations (admin API key)
/// - `POST /v1/reservations` - Create a reservation
/// - `GET /v1/reservations` - Filtered, paginated list
/// - `GET /v1/reservations/stats` - Counts and revenue
/// - `GET /v1/reservations/:id` - Reservation with options and customer
/// - `PATCH /v1/reservations/:id` - Partial update
/// - `POST /v1/reservations/:id/cancel` - Cancel with a reason
/// - `GET /v1/reservations/:id/history` - Audit trail
/// - `GET /v1/stores/:store_id/slots` - Hourly availability
///
/// ## Sync (admin API key)
/// - `GET /v1/sync/status` - Subscription states
/// - `POST /v1/sync/:table/manual` - Re-dispatch the latest row
///
/// ## Migrations (admin API key)
/// - `GET /v1/migrations` - Completion flags
/// - `POST /v1/migrations/run` - Copy the local cache into the backend
/// - `POST /v1/migrations/reset` - Clear completion flags
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let api_routes = Router::new()
        // Reservations
        .route(
            "/reservations",
            post(reservations::create_reservation).get(reservations::list_reservations),
        )
        .route("/reservations/stats", get(reservations::reservation_stats))
        .route(
            "/reservations/:id",
            get(reservations::get_reservation).patch(reservations::update_reservation),
        )
        .route(
            "/reservations/:id/cancel",
            post(reservations::cancel_reservation),
        )
        .route(
            "/reservations/:id/history",
            get(reservations::reservation_history),
        )
        .route(
            "/stores/:store_id/slots",
            get(reservations::available_slots),
        )
        // Sync
        .route("/sync/status", get(sync::sync_status))
        .route("/sync/:table/manual", post(sync::manual_sync))
        // Migrations
        .route("/migrations", get(migrations::migration_status))
        .route("/migrations/run", post(migrations::run_migrations))
        .route("/migrations/reset", post(migrations::reset_migrations))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        .nest("/v1", api_routes)
        // Global middleware
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
