//! Per-job poll spacing enforcement.
//!
//! The orchestrator may schedule polls aggressively (fast initial
//! cadence, multiple subscribers prodding the same job); the throttle
//! guarantees the provider never sees two polls for the same job closer
//! together than the configured floor.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Default minimum spacing between two polls of the same provider job.
pub const DEFAULT_MIN_SPACING: Duration = Duration::from_secs(1);

/// Tracks the last poll time per provider job ID.
pub struct PollThrottle {
    min_spacing: Duration,
    last_poll: Mutex<HashMap<String, Instant>>,
}

impl PollThrottle {
    pub fn new(min_spacing: Duration) -> Self {
        Self {
            min_spacing,
            last_poll: Mutex::new(HashMap::new()),
        }
    }

    /// Record a poll attempt for `provider_job_id`.
    ///
    /// Returns `true` and stamps the attempt if at least the minimum
    /// spacing has elapsed since the previous one; returns `false`
    /// without stamping otherwise.
    pub async fn try_acquire(&self, provider_job_id: &str) -> bool {
        let now = Instant::now();
        let mut last_poll = self.last_poll.lock().await;
        if let Some(last) = last_poll.get(provider_job_id) {
            if now.duration_since(*last) < self.min_spacing {
                return false;
            }
        }
        last_poll.insert(provider_job_id.to_string(), now);
        true
    }

    /// Drop bookkeeping for a job that reached a terminal state.
    pub async fn forget(&self, provider_job_id: &str) {
        self.last_poll.lock().await.remove(provider_job_id);
    }
}

impl Default for PollThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_SPACING)
    }
}
