use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer};
use crate::handlers::check_in::{
    manual_check_in, scan_check_in, scan_image_check_in, undo_check_in,
};
use crate::handlers::health_check;
use crate::handlers::rsvp::{cancel_rsvp, create_rsvp, get_ticket};
use crate::handlers::search::search_tickets;
use crate::handlers::stats::{check_in_stats, check_in_stats_stream};
use crate::state::AppState;

/// Badge photos from phone cameras.
const SCAN_IMAGE_BODY_LIMIT: usize = 10 * 1024 * 1024;

pub fn create_routes(state: AppState) -> Router {
    let cors = create_cors_layer(&state.config.cors_allowed_origins);
    let rsvp_routes = Router::new()
        .route("/events/:event_id/rsvps", post(create_rsvp))
        .route("/rsvps/:rsvp_id", delete(cancel_rsvp))
        .route("/rsvps/:rsvp_id/ticket", get(get_ticket));

    let door_routes = Router::new()
        .route("/events/:event_id/check-ins/scan", post(scan_check_in))
        .route(
            "/events/:event_id/check-ins/scan-image",
            post(scan_image_check_in).layer(DefaultBodyLimit::max(SCAN_IMAGE_BODY_LIMIT)),
        )
        .route("/events/:event_id/check-ins/manual", post(manual_check_in))
        .route("/events/:event_id/check-ins/stats", get(check_in_stats))
        .route(
            "/events/:event_id/check-ins/stats/stream",
            get(check_in_stats_stream),
        )
        .route("/events/:event_id/check-ins/:rsvp_id", delete(undo_check_in))
        .route("/events/:event_id/tickets/search", get(search_tickets));

    Router::new()
        .route("/health", get(health_check))
        .merge(rsvp_routes)
        .merge(door_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(create_security_headers_layer())
        .layer(cors)
}
