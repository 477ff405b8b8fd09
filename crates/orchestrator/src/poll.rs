//! Polling cadence: geometric backoff under a wall-clock budget.
//!
//! The first polls come quickly so early transitions (lyrics, first
//! audio) surface with low latency; the interval then grows by a fixed
//! multiplier up to a ceiling to bound provider load on long-running
//! jobs. All of it is operational tuning, not contract -- see
//! [`PollConfig`].

use std::time::Duration;

/// Tunable parameters for the polling-fallback loop.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Interval before the first poll and between the earliest polls.
    pub initial_interval: Duration,
    /// Upper bound on the interval between polls.
    pub max_interval: Duration,
    /// Factor by which the interval grows after each poll.
    pub multiplier: f64,
    /// Wall-clock budget per job, measured from its creation time.
    /// On exhaustion the job is force-failed with a timeout marker.
    pub budget: Duration,
    /// Ceiling on concurrent outstanding provider polls across all jobs.
    pub max_concurrent_polls: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
            budget: Duration::from_secs(600),
            max_concurrent_polls: 8,
        }
    }
}

/// Calculate the next poll interval from the current one.
///
/// The result is clamped to [`PollConfig::max_interval`].
pub fn next_poll_interval(current: Duration, config: &PollConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_interval)
}
