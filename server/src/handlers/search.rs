use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use uuid::Uuid;

use super::require_organizer;
use crate::state::AppState;
use crate::utils::actor::Actor;
use crate::utils::error::AppError;
use crate::utils::response::success;
use crate::utils::retry::retry_transient;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

pub async fn search_tickets(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Actor(staff_id): Actor,
    Query(query): Query<SearchQuery>,
) -> Result<Response, AppError> {
    require_organizer(&state, event_id, staff_id).await?;

    let search = &state.search;
    let q = query.q.as_str();
    let results = retry_transient(&state.retry, move || search.search(event_id, q)).await?;
    let message = format!("{} matching ticket(s)", results.len());
    Ok(success(results, message).into_response())
}
