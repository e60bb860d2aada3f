use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use super::require_organizer;
use crate::scanner::{decode_frame, Frame, MAX_FRAME_SIDE};
use crate::state::AppState;
use crate::utils::actor::Actor;
use crate::utils::error::AppError;
use crate::utils::response::success;
use crate::utils::retry::retry_transient;

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    /// Raw text read from the ticket's QR code.
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ManualCheckInRequest {
    pub rsvp_id: Uuid,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UndoRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn scan_check_in(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Actor(staff_id): Actor,
    Json(body): Json<ScanRequest>,
) -> Result<Response, AppError> {
    require_organizer(&state, event_id, staff_id).await?;
    check_in_code(&state, &body.code, event_id, staff_id).await
}

/// Accepts a photo of a badge (PNG or JPEG) when the door device cannot
/// decode QR codes itself.
pub async fn scan_image_check_in(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Actor(staff_id): Actor,
    image: Bytes,
) -> Result<Response, AppError> {
    require_organizer(&state, event_id, staff_id).await?;

    let decoded = tokio::task::spawn_blocking(move || {
        Frame::from_image_bytes(&image).map(|frame| decode_frame(&frame))
    })
    .await
    .map_err(|e| AppError::InternalServerError(e.to_string()))?
    .map_err(|e| match e {
        image::ImageError::Limits(_) => AppError::ValidationError(format!(
            "Image exceeds {MAX_FRAME_SIDE}x{MAX_FRAME_SIDE} pixels"
        )),
        e => AppError::ValidationError(format!("Unreadable image: {e}")),
    })?;

    let code = decoded
        .ok_or_else(|| AppError::ValidationError("No QR code found in image".to_string()))?;
    debug!(event_id = %event_id, "decoded QR code from uploaded image");
    check_in_code(&state, &code, event_id, staff_id).await
}

async fn check_in_code(
    state: &AppState,
    code: &str,
    event_id: Uuid,
    staff_id: Uuid,
) -> Result<Response, AppError> {
    let validator = &state.validator;
    let outcome = retry_transient(&state.retry, move || {
        validator.check_in_by_code(code, event_id, staff_id)
    })
    .await?;
    Ok(success(outcome, "Checked in").into_response())
}

pub async fn manual_check_in(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Actor(staff_id): Actor,
    Json(body): Json<ManualCheckInRequest>,
) -> Result<Response, AppError> {
    require_organizer(&state, event_id, staff_id).await?;

    let validator = &state.validator;
    let ManualCheckInRequest { rsvp_id, notes } = body;
    let outcome = retry_transient(&state.retry, move || {
        validator.check_in_manually(rsvp_id, event_id, staff_id, notes.clone())
    })
    .await?;
    Ok(success(outcome, "Checked in").into_response())
}

pub async fn undo_check_in(
    State(state): State<AppState>,
    Path((event_id, rsvp_id)): Path<(Uuid, Uuid)>,
    Actor(actor_id): Actor,
    body: Option<Json<UndoRequest>>,
) -> Result<Response, AppError> {
    require_organizer(&state, event_id, actor_id).await?;

    let reason = body.and_then(|Json(body)| body.reason);
    let validator = &state.validator;
    let audit = retry_transient(&state.retry, move || {
        validator.undo_check_in(rsvp_id, event_id, actor_id, reason.clone())
    })
    .await?;
    Ok(success(audit, "Check-in undone").into_response())
}
