//! Handlers for the `/songs` resource.
//!
//! Creation submits to the generation provider; status is served from
//! the job store; the events endpoint streams snapshots over SSE until
//! the job reaches a terminal state or the client disconnects.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::Stream;
use serenade_core::SongRequest;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// SSE keep-alive interval.
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// POST /api/v1/songs
///
/// Create a new song generation job. Returns 201 with the initial
/// (pending) snapshot. If the provider refuses the submission the job
/// still exists in a terminal `failed` state and a 502 is returned.
pub async fn create_song(
    State(state): State<AppState>,
    Json(request): Json<SongRequest>,
) -> AppResult<impl IntoResponse> {
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let snapshot = state.orchestrator.create_job(request).await?;

    tracing::info!(job_id = %snapshot.id, "Song job accepted");

    Ok((StatusCode::CREATED, Json(DataResponse { data: snapshot })))
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /api/v1/songs/{id}
///
/// Current snapshot of a job: state, artifacts, timestamps.
pub async fn get_song(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state.orchestrator.get_status(&id).await?;
    Ok(Json(DataResponse { data: snapshot }))
}

// ---------------------------------------------------------------------------
// Status stream
// ---------------------------------------------------------------------------

/// GET /api/v1/songs/{id}/events
///
/// SSE stream of job snapshots. The current snapshot is sent
/// immediately so a reconnecting client catches up without waiting;
/// the stream ends after the terminal snapshot. Closing the connection
/// cancels only this subscriber, never the underlying polling.
pub async fn song_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let mut subscription = state.orchestrator.subscribe(&id).await?;

    let stream = async_stream::stream! {
        while let Some(snapshot) = subscription.next().await {
            match Event::default().event("status").json_data(&snapshot) {
                Ok(event) => yield Ok(event),
                Err(e) => {
                    tracing::error!(job_id = %snapshot.id, error = %e, "Failed to encode snapshot");
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("heartbeat"),
    ))
}
