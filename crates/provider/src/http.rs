//! HTTP implementation of [`GenerationProvider`] over [`reqwest`].
//!
//! Endpoint shapes follow the provider's REST surface: `POST
//! /v1/generations` to submit, `GET /v1/generations/{id}` to poll. Both
//! responses go through the tolerant payload parser, so schema drift on
//! the provider side degrades to dropped fields instead of hard errors.

use std::time::Duration;

use async_trait::async_trait;
use serenade_core::{Observation, SongRequest};

use crate::payload;
use crate::throttle::PollThrottle;
use crate::{GenerationProvider, ProviderError};

/// HTTP request timeout for a single provider call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// [`GenerationProvider`] backed by the provider's REST API.
pub struct HttpProvider {
    client: reqwest::Client,
    base_url: String,
    throttle: PollThrottle,
}

impl HttpProvider {
    /// Create a provider client for the given base URL.
    ///
    /// * `base_url` - e.g. `https://api.songprovider.example`.
    /// * `min_poll_spacing` - floor on the interval between two polls of
    ///   the same provider job.
    pub fn new(base_url: String, min_poll_spacing: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            throttle: PollThrottle::new(min_poll_spacing),
        }
    }

    /// Create a provider client reusing an existing [`reqwest::Client`]
    /// (useful for connection pooling).
    pub fn with_client(
        client: reqwest::Client,
        base_url: String,
        min_poll_spacing: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            throttle: PollThrottle::new(min_poll_spacing),
        }
    }

    /// Read a response body and classify non-2xx statuses.
    async fn read_body(response: reqwest::Response) -> Result<serde_json::Value, ProviderError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        if let Some(err) = classify_status(status.as_u16(), &body) {
            return Err(err);
        }

        serde_json::from_str(&body)
            .map_err(|_| ProviderError::Unavailable(format!("non-JSON response body: {body}")))
    }
}

/// Map an HTTP status to a provider error, or `None` for success.
///
/// 429 is rate limiting, other 4xx are permanent rejections with the
/// provider's message propagated, 5xx are transient unavailability.
fn classify_status(status: u16, body: &str) -> Option<ProviderError> {
    match status {
        200..=299 => None,
        429 => Some(ProviderError::RateLimited(body.to_string())),
        400..=499 => Some(ProviderError::Rejected(body.to_string())),
        _ => Some(ProviderError::Unavailable(format!("HTTP {status}: {body}"))),
    }
}

#[async_trait]
impl GenerationProvider for HttpProvider {
    async fn submit(&self, request: &SongRequest) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(format!("{}/v1/generations", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        let body = Self::read_body(response).await?;

        // The acknowledgement carries the provider job id in the same
        // drifting locations as status payloads; reuse the probes.
        payload::extract_correlation_id(&body).ok_or(ProviderError::UnrecognizedPayload)
    }

    async fn poll_once(&self, provider_job_id: &str) -> Result<Observation, ProviderError> {
        if !self.throttle.try_acquire(provider_job_id).await {
            return Err(ProviderError::RateLimited(provider_job_id.to_string()));
        }

        let response = self
            .client
            .get(format!("{}/v1/generations/{provider_job_id}", self.base_url))
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        let body = Self::read_body(response).await?;
        payload::parse_observation(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn success_statuses_pass() {
        assert!(classify_status(200, "ok").is_none());
        assert!(classify_status(204, "").is_none());
    }

    #[test]
    fn too_many_requests_maps_to_rate_limited() {
        assert_matches!(
            classify_status(429, "slow down"),
            Some(ProviderError::RateLimited(_))
        );
    }

    #[test]
    fn client_errors_map_to_rejected_with_message() {
        assert_matches!(
            classify_status(422, "style not supported"),
            Some(ProviderError::Rejected(msg)) if msg == "style not supported"
        );
    }

    #[test]
    fn server_errors_map_to_unavailable() {
        assert_matches!(
            classify_status(503, "maintenance"),
            Some(ProviderError::Unavailable(_))
        );
    }

    #[test]
    fn rejected_is_permanent_and_unavailable_is_transient() {
        assert!(!ProviderError::Rejected("bad".into()).is_transient());
        assert!(ProviderError::Unavailable("down".into()).is_transient());
        assert!(ProviderError::RateLimited("p-1".into()).is_transient());
    }
}
