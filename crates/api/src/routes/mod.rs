//! Route definitions, grouped by mount point.

pub mod health;

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{callbacks, songs};
use crate::state::AppState;

/// Routes mounted under `/api/v1`.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/songs", post(songs::create_song))
        .route("/songs/{id}", get(songs::get_song))
        .route("/songs/{id}/events", get(songs::song_events))
        .route("/callbacks/generation", post(callbacks::generation_callback))
}
