use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::state::AppState;
use crate::ticketing::TicketPayload;
use crate::utils::actor::Actor;
use crate::utils::error::AppError;
use crate::utils::response::{created, empty_success, success};
use crate::utils::retry::retry_transient;

#[derive(Debug, Default, Deserialize)]
pub struct CreateRsvpRequest {
    #[serde(default)]
    pub tier_id: Option<Uuid>,
}

pub async fn create_rsvp(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Actor(user_id): Actor,
    Json(body): Json<CreateRsvpRequest>,
) -> Result<Response, AppError> {
    let issued = state
        .rsvps
        .create_rsvp(event_id, user_id, body.tier_id)
        .await?;
    Ok(created(issued, "RSVP confirmed").into_response())
}

pub async fn cancel_rsvp(
    State(state): State<AppState>,
    Path(rsvp_id): Path<Uuid>,
    Actor(user_id): Actor,
) -> Result<Response, AppError> {
    let rsvps = &state.rsvps;
    retry_transient(&state.retry, move || rsvps.cancel_rsvp(rsvp_id, user_id)).await?;
    Ok(empty_success("RSVP cancelled").into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketFormat {
    #[default]
    Png,
    Svg,
}

#[derive(Debug, Deserialize)]
pub struct TicketQuery {
    #[serde(default)]
    pub format: TicketFormat,
}

pub async fn get_ticket(
    State(state): State<AppState>,
    Path(rsvp_id): Path<Uuid>,
    Actor(user_id): Actor,
    Query(query): Query<TicketQuery>,
) -> Result<Response, AppError> {
    let rsvps = &state.rsvps;
    let issued =
        retry_transient(&state.retry, move || rsvps.ticket_for_display(rsvp_id, user_id)).await?;

    match query.format {
        TicketFormat::Png => Ok(success(issued, "Ticket").into_response()),
        TicketFormat::Svg => {
            let svg = state
                .rsvps
                .encoder()
                .to_svg(&TicketPayload::for_ticket(&issued.ticket))
                .map_err(|e| AppError::InternalServerError(e.to_string()))?;
            Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response())
        }
    }
}
