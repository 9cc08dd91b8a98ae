//! Router configuration for the booking service.
//!
//! Builds the complete Axum router with all endpoints.

use super::health::{health_check, metrics};
use super::state::AppState;
use crate::api::{reservations, tables};
use axum::{
    Router,
    http::HeaderName,
    routing::{get, post, put},
};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Build the complete Axum router.
///
/// Every request gets an `x-request-id` (kept if the caller sent one) and a
/// tracing span.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Availability and catalogs
        .route("/tables", get(tables::get_tables))
        .route("/slots", get(tables::get_slots))
        .route("/calendar", get(tables::get_calendar))
        // Reservations
        .route("/reservation", post(reservations::create_reservation))
        .route(
            "/reservation/:id",
            get(reservations::get_reservation).put(reservations::update_reservation),
        )
        .route("/reservation/:id/logs", get(reservations::reservation_logs))
        .route("/unreserve", put(reservations::unreserve))
        .route("/reservations", get(reservations::list_day))
        .route("/audit", get(reservations::recent_audit));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .nest("/api", api_routes)
        .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid))
        .with_state(state)
}
