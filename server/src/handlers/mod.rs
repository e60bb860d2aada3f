use axum::extract::State;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use uuid::Uuid;

use crate::models::Event;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

pub mod check_in;
pub mod rsvp;
pub mod search;
pub mod stats;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
    store: &'static str,
}

pub async fn health_check(State(state): State<AppState>) -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "ikou-api",
        store: state.store.backend_tag(),
    };

    success(payload, "Health check successful").into_response()
}

/// Door operations are limited to the event's organizer.
pub(crate) async fn require_organizer(
    state: &AppState,
    event_id: Uuid,
    user_id: Uuid,
) -> Result<Event, AppError> {
    let event = state
        .store
        .find_event(event_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event with id '{}' was not found", event_id)))?;
    if !event.is_organized_by(user_id) {
        return Err(AppError::Forbidden(
            "Only the event organizer can manage check-ins".to_string(),
        ));
    }
    Ok(event)
}
