//! Provider Adapter: the only component that talks to the external
//! generation service.
//!
//! [`GenerationProvider`] abstracts provider-specific request/response
//! shapes into the internal status vocabulary. The adapter never touches
//! the job store; its outputs are [`Observation`]s fed to the
//! reconciler, which is the single writer of job state.

pub mod http;
pub mod payload;
pub mod throttle;

use async_trait::async_trait;
use serenade_core::{Observation, SongRequest};

pub use http::HttpProvider;
pub use throttle::PollThrottle;

/// Errors from the provider adapter.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Network/transport failure reaching the provider. Transient.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// The provider rejected the request as invalid. Permanent.
    #[error("Provider rejected the request: {0}")]
    Rejected(String),

    /// A poll arrived before the per-job minimum spacing elapsed, or
    /// the provider itself asked us to back off. Transient.
    #[error("Poll rate limited for provider job {0}")]
    RateLimited(String),

    /// No correlation ID could be found anywhere in the payload.
    #[error("Unrecognized provider payload: no correlation id")]
    UnrecognizedPayload,

    /// The payload carried a status label outside the known vocabulary.
    #[error("Invalid provider state label: {0}")]
    InvalidState(String),
}

impl ProviderError {
    /// Whether the polling loop should retry rather than fail the job.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::RateLimited(_))
    }
}

/// Contract with the external generation service.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Submit a new generation job. Returns the provider-side job ID.
    async fn submit(&self, request: &SongRequest) -> Result<String, ProviderError>;

    /// Fetch the current status of a provider job.
    ///
    /// Safe to call at any rate: the adapter enforces its own minimum
    /// inter-call spacing per provider job and returns
    /// [`ProviderError::RateLimited`] instead of hammering the provider.
    async fn poll_once(&self, provider_job_id: &str) -> Result<Observation, ProviderError>;

    /// Interpret a raw webhook callback payload.
    ///
    /// Tolerates unknown/extra fields and historical payload shapes;
    /// fails with [`ProviderError::UnrecognizedPayload`] only when no
    /// correlation ID can be found anywhere.
    fn parse_callback(&self, raw: &serde_json::Value) -> Result<Observation, ProviderError> {
        payload::parse_observation(raw)
    }
}
