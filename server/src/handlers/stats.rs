use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::stream::{self, Stream};
use uuid::Uuid;

use super::require_organizer;
use crate::state::AppState;
use crate::stats::StatsPoller;
use crate::utils::actor::Actor;
use crate::utils::error::AppError;
use crate::utils::response::success;
use crate::utils::retry::retry_transient;

pub async fn check_in_stats(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Actor(staff_id): Actor,
) -> Result<Response, AppError> {
    require_organizer(&state, event_id, staff_id).await?;

    let store = &state.store;
    let stats = retry_transient(&state.retry, move || store.check_in_stats(event_id)).await?;
    Ok(success(stats, "Check-in statistics").into_response())
}

/// Server-Sent Events feed of polled statistics. The poller lives inside the
/// stream, so it stops when the client disconnects.
pub async fn check_in_stats_stream(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Actor(staff_id): Actor,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, AppError> {
    require_organizer(&state, event_id, staff_id).await?;

    let poller = StatsPoller::spawn(
        state.store.clone(),
        event_id,
        state.config.stats_interval,
    );
    let updates = stream::unfold(poller, |mut poller| async move {
        let stats = poller.next().await?;
        let event = SseEvent::default()
            .event("stats")
            .json_data(&stats)
            .unwrap_or_else(|_| SseEvent::default().event("error"));
        Some((Ok::<_, Infallible>(event), poller))
    });

    Ok(Sse::new(updates).keep_alive(KeepAlive::default()))
}
