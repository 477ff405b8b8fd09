//! The job record and its merge rules.
//!
//! A [`Job`] is created once from a [`SongRequest`] and then mutated only
//! through the reconciler. [`Artifacts`] fields are append-only per
//! field: a non-empty value is never overwritten by an empty one, but a
//! provider may revise a field with a different non-empty value.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::state::JobState;
use crate::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// Request payload
// ---------------------------------------------------------------------------

/// The immutable input supplied at job creation.
///
/// Opaque to the orchestration core beyond its stable shape; validated
/// once at the HTTP boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SongRequest {
    /// Who the song is for.
    #[validate(length(min = 1, max = 120))]
    pub recipient: String,

    /// Occasion being celebrated (birthday, anniversary, ...).
    #[validate(length(max = 120))]
    #[serde(default)]
    pub occasion: Option<String>,

    /// Musical style or genre.
    #[validate(length(min = 1, max = 80))]
    pub style: String,

    /// Overall mood of the song.
    #[validate(length(max = 80))]
    #[serde(default)]
    pub mood: Option<String>,

    /// Free-form personal details woven into the lyrics.
    #[validate(length(max = 2000))]
    #[serde(default)]
    pub details: Option<String>,
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// The optional outputs a job accumulates as the pipeline progresses.
///
/// Each field is independently settable; once non-empty it is never
/// cleared, only revised with another non-empty value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artifacts {
    /// Generated song lyrics.
    #[serde(default)]
    pub lyrics: Option<String>,

    /// Primary audio URL.
    #[serde(default)]
    pub audio_url: Option<String>,

    /// Secondary / alternate take audio URL.
    #[serde(default)]
    pub audio_url_alt: Option<String>,

    /// Cover-art image URL.
    #[serde(default)]
    pub cover_url: Option<String>,
}

impl Artifacts {
    /// Merge non-empty fields from `delta` into `self`.
    ///
    /// Empty or absent incoming fields never clear an existing value.
    /// Returns `true` if any field actually changed.
    pub fn merge(&mut self, delta: &Artifacts) -> bool {
        let mut changed = false;
        changed |= Self::merge_field(&mut self.lyrics, &delta.lyrics);
        changed |= Self::merge_field(&mut self.audio_url, &delta.audio_url);
        changed |= Self::merge_field(&mut self.audio_url_alt, &delta.audio_url_alt);
        changed |= Self::merge_field(&mut self.cover_url, &delta.cover_url);
        changed
    }

    /// Whether no artifact has been produced yet.
    pub fn is_empty(&self) -> bool {
        self.lyrics.is_none()
            && self.audio_url.is_none()
            && self.audio_url_alt.is_none()
            && self.cover_url.is_none()
    }

    fn merge_field(slot: &mut Option<String>, incoming: &Option<String>) -> bool {
        match incoming {
            Some(value) if !value.is_empty() && slot.as_deref() != Some(value.as_str()) => {
                *slot = Some(value.clone());
                true
            }
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Observations
// ---------------------------------------------------------------------------

/// Which channel produced an accepted status update.
///
/// Recorded on the job for diagnostics; never consulted for
/// correctness decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationSource {
    /// Result of a provider poll (or a synchronous provider response).
    Poll,
    /// Out-of-band webhook callback from the provider.
    Callback,
    /// Internally computed (wall-clock budget exhaustion).
    Timeout,
}

impl ObservationSource {
    /// The canonical wire label for this source.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Poll => "poll",
            Self::Callback => "callback",
            Self::Timeout => "timeout",
        }
    }
}

impl std::str::FromStr for ObservationSource {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "poll" => Ok(Self::Poll),
            "callback" => Ok(Self::Callback),
            "timeout" => Ok(Self::Timeout),
            other => Err(crate::error::CoreError::InvalidState(other.to_string())),
        }
    }
}

/// A single reported status update from any channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Provider-side identifier the update correlates to.
    pub provider_job_id: String,
    /// The state the channel claims the job is in.
    pub state: JobState,
    /// Artifact fields carried by the update.
    pub artifacts: Artifacts,
}

// ---------------------------------------------------------------------------
// Failure detail
// ---------------------------------------------------------------------------

/// Distinguishes a provider-reported failure from an internally
/// computed timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The provider reported the failure.
    Provider,
    /// The wall-clock budget elapsed without a terminal report.
    Timeout,
}

/// Why a job ended in `Failed` / `AudioFailed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn provider(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Provider,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Timeout,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One end-to-end generation request tracked through its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Opaque identifier, assigned once and never reused.
    pub id: JobId,

    /// Current lifecycle state.
    pub state: JobState,

    /// The immutable creation payload.
    pub request: SongRequest,

    /// Accumulated outputs.
    pub artifacts: Artifacts,

    /// Provider-side identifier, set after successful submission.
    /// Correlates webhook callbacks back to this job.
    pub provider_job_id: Option<String>,

    /// Failure detail, set when the job ends in a failure state.
    pub failure: Option<Failure>,

    pub created_at: Timestamp,

    /// Advances on every accepted transition.
    pub updated_at: Timestamp,

    /// Channel that produced the most recent accepted transition.
    pub last_observed_source: Option<ObservationSource>,
}

impl Job {
    /// Allocate a new job in `Pending` state.
    pub fn new(request: SongRequest) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            state: JobState::Pending,
            request,
            artifacts: Artifacts::default(),
            provider_job_id: None,
            failure: None,
            created_at: now,
            updated_at: now,
            last_observed_source: None,
        }
    }

    /// An immutable point-in-time view for queries and fan-out.
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id.clone(),
            state: self.state,
            artifacts: self.artifacts.clone(),
            failure: self.failure.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Immutable read of a job's state and artifacts at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub state: JobState,
    pub artifacts: Artifacts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
