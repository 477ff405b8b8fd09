//! Provider callback ingestion.
//!
//! The provider retransmits callbacks until it sees a 2xx, so this
//! endpoint acknowledges everything it can read. Unparseable or
//! uncorrelatable payloads are logged and dropped; the polling fallback
//! remains the safety net. Only a store failure produces a non-2xx
//! (the retransmission will then retry against a healthy store).

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use serenade_orchestrator::CallbackOutcome;

use crate::error::AppResult;
use crate::state::AppState;

/// POST /api/v1/callbacks/generation
///
/// Accepts a provider-shaped payload (schema may drift across provider
/// versions). Idempotent under retransmission: replays of an already
/// applied update reconcile to a no-op.
pub async fn generation_callback(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> AppResult<impl IntoResponse> {
    let outcome = state.orchestrator.ingest_callback(&payload).await?;

    let disposition = match &outcome {
        CallbackOutcome::Applied { job_id, outcome } => {
            tracing::debug!(
                job_id = %job_id,
                state = %outcome.state,
                changed = outcome.changed,
                "Callback applied",
            );
            "applied"
        }
        CallbackOutcome::UnknownJob { .. } => "unknown_job",
        CallbackOutcome::Dropped => "dropped",
    };

    Ok(Json(json!({ "status": disposition })))
}
