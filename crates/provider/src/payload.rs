//! Tolerant parser for provider status payloads.
//!
//! The provider has shipped several payload shapes over time: a flat
//! object, an envelope under `data`, and a clip-array form where the
//! two audio takes arrive as `clips[0]` / `clips[1]`. Rather than pin a
//! single schema struct, each field is probed at a prioritized list of
//! known locations; unknown extra fields are ignored.

use serde_json::Value;
use serenade_core::{Artifacts, JobState, Observation};

use crate::ProviderError;

/// Known locations of the correlation ID, in priority order.
const ID_PATHS: &[&[&str]] = &[
    &["id"],
    &["task_id"],
    &["job_id"],
    &["data", "id"],
    &["data", "task_id"],
    &["clips", "0", "id"],
];

/// Known locations of the status label, in priority order.
const STATUS_PATHS: &[&[&str]] = &[
    &["status"],
    &["state"],
    &["data", "status"],
    &["data", "state"],
    &["clips", "0", "status"],
];

const LYRICS_PATHS: &[&[&str]] = &[
    &["lyrics"],
    &["lyric"],
    &["data", "lyrics"],
    &["data", "lyric"],
    &["clips", "0", "lyric"],
];

const AUDIO_PATHS: &[&[&str]] = &[
    &["audio_url"],
    &["music_url"],
    &["data", "audio_url"],
    &["audio_urls", "0"],
    &["clips", "0", "audio_url"],
];

const AUDIO_ALT_PATHS: &[&[&str]] = &[
    &["audio_url_alt"],
    &["second_audio_url"],
    &["music_url_2"],
    &["audio_urls", "1"],
    &["clips", "1", "audio_url"],
];

const COVER_PATHS: &[&[&str]] = &[
    &["cover_url"],
    &["image_url"],
    &["image_large_url"],
    &["data", "image_url"],
    &["clips", "0", "image_url"],
];

/// Interpret a raw provider payload (poll response or webhook body).
///
/// Fails with [`ProviderError::UnrecognizedPayload`] only when no
/// correlation ID is found at any known location; a missing or unknown
/// status label fails with [`ProviderError::InvalidState`] so the
/// caller can log and drop the update.
pub fn parse_observation(raw: &Value) -> Result<Observation, ProviderError> {
    let provider_job_id =
        first_string(raw, ID_PATHS).ok_or(ProviderError::UnrecognizedPayload)?;

    let label = first_string(raw, STATUS_PATHS)
        .ok_or_else(|| ProviderError::InvalidState("<missing>".to_string()))?;
    let state = map_status(&label).ok_or(ProviderError::InvalidState(label))?;

    Ok(Observation {
        provider_job_id,
        state,
        artifacts: extract_artifacts(raw),
    })
}

/// Probe the known correlation-ID locations only.
///
/// Used for submit acknowledgements, which in some provider versions
/// carry an id and nothing else.
pub fn extract_correlation_id(raw: &Value) -> Option<String> {
    first_string(raw, ID_PATHS)
}

/// Map the provider's status vocabulary onto the internal state set.
///
/// Case-insensitive; returns `None` for labels outside the vocabulary.
pub fn map_status(label: &str) -> Option<JobState> {
    match label.to_ascii_lowercase().as_str() {
        "pending" | "submitted" | "queued" | "queueing" | "processing" | "running"
        | "generating" => Some(JobState::Pending),
        "text_ready" | "text_success" | "lyrics_complete" | "text" => Some(JobState::TextReady),
        "draft_ready" | "first_success" | "streaming" | "draft" => Some(JobState::DraftReady),
        "succeeded" | "success" | "complete" | "completed" | "all_success" => {
            Some(JobState::Succeeded)
        }
        "failed" | "failure" | "error" | "rejected" => Some(JobState::Failed),
        "audio_failed" | "audio_error" | "render_failed" => Some(JobState::AudioFailed),
        _ => None,
    }
}

/// Pull whatever artifact fields the payload carries, from any known
/// location. Empty strings are treated as absent.
pub fn extract_artifacts(raw: &Value) -> Artifacts {
    Artifacts {
        lyrics: first_string(raw, LYRICS_PATHS),
        audio_url: first_string(raw, AUDIO_PATHS),
        audio_url_alt: first_string(raw, AUDIO_ALT_PATHS),
        cover_url: first_string(raw, COVER_PATHS),
    }
}

/// Probe each path in order; return the first non-empty string hit.
///
/// Numbers are accepted for ID-like fields and rendered as strings.
fn first_string(raw: &Value, paths: &[&[&str]]) -> Option<String> {
    paths.iter().find_map(|path| {
        let value = lookup(raw, path)?;
        match value {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    })
}

/// Walk a dotted path; numeric segments index into arrays.
fn lookup<'a>(mut value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    for segment in path {
        value = match value {
            Value::Object(map) => map.get(*segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(value)
}
