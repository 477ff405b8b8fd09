//! Job lifecycle state machine.
//!
//! States advance monotonically along `Pending -> TextReady ->
//! DraftReady -> {Succeeded | AudioFailed}`, with `Failed` reachable
//! from the two earliest states. Re-delivering the current state is
//! always allowed (idempotent no-op); nothing else moves backward, and
//! terminal states have no outgoing transitions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Lifecycle state of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Accepted, nothing produced yet.
    Pending,
    /// Lyrics have been generated.
    TextReady,
    /// First-pass audio has been generated.
    DraftReady,
    /// Final audio and remaining artifacts are complete.
    Succeeded,
    /// The provider rejected the job before any partial success.
    Failed,
    /// The final audio generation step failed.
    AudioFailed,
}

impl JobState {
    /// Whether this state has no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::AudioFailed)
    }

    /// Position in the forward ordering
    /// `Pending < TextReady < DraftReady < terminal`.
    pub fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::TextReady => 1,
            Self::DraftReady => 2,
            Self::Succeeded | Self::Failed | Self::AudioFailed => 3,
        }
    }

    /// Whether `next` is reachable from this state in one transition.
    ///
    /// Re-delivering the current state is always allowed; terminal
    /// states allow nothing, not even themselves (post-terminal updates
    /// are dropped before this check by the reconciler).
    pub fn can_transition_to(self, next: JobState) -> bool {
        if self == next {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Self::Pending, Self::TextReady)
                | (Self::Pending, Self::Failed)
                | (Self::TextReady, Self::DraftReady)
                | (Self::TextReady, Self::Failed)
                | (Self::DraftReady, Self::Succeeded)
                | (Self::DraftReady, Self::AudioFailed)
        )
    }

    /// The terminal failure state reachable from this state.
    ///
    /// `Failed` from `Pending`/`TextReady`, `AudioFailed` once a draft
    /// exists. Terminal states return themselves.
    pub fn failure_state(self) -> JobState {
        match self {
            Self::Pending | Self::TextReady => Self::Failed,
            Self::DraftReady => Self::AudioFailed,
            terminal => terminal,
        }
    }

    /// The canonical wire label for this state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::TextReady => "text_ready",
            Self::DraftReady => "draft_ready",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::AudioFailed => "audio_failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "text_ready" => Ok(Self::TextReady),
            "draft_ready" => Ok(Self::DraftReady),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "audio_failed" => Ok(Self::AudioFailed),
            other => Err(CoreError::InvalidState(other.to_string())),
        }
    }
}
