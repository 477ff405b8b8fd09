use std::time::Duration;

use serenade_orchestrator::PollConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Base URL of the generation provider's REST API.
    pub provider_base_url: String,
    /// Floor on the interval between two polls of the same provider job.
    pub min_poll_spacing: Duration,
    /// Polling-fallback cadence and budget.
    pub poll: PollConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                  |
    /// |--------------------------|--------------------------|
    /// | `HOST`                   | `0.0.0.0`                |
    /// | `PORT`                   | `3000`                   |
    /// | `CORS_ORIGINS`           | `http://localhost:5173`  |
    /// | `REQUEST_TIMEOUT_SECS`   | `30`                     |
    /// | `PROVIDER_BASE_URL`      | `http://localhost:9400`  |
    /// | `PROVIDER_MIN_POLL_MS`   | `1000`                   |
    /// | `POLL_INITIAL_MS`        | `2000`                   |
    /// | `POLL_MAX_MS`            | `30000`                  |
    /// | `POLL_MULTIPLIER`        | `2.0`                    |
    /// | `JOB_BUDGET_SECS`        | `600`                    |
    /// | `MAX_CONCURRENT_POLLS`   | `8`                      |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = env_or("PORT", "3000");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = env_or("REQUEST_TIMEOUT_SECS", "30");

        let provider_base_url = std::env::var("PROVIDER_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:9400".into());

        let min_poll_spacing = Duration::from_millis(env_or("PROVIDER_MIN_POLL_MS", "1000"));

        let poll = PollConfig {
            initial_interval: Duration::from_millis(env_or("POLL_INITIAL_MS", "2000")),
            max_interval: Duration::from_millis(env_or("POLL_MAX_MS", "30000")),
            multiplier: env_or("POLL_MULTIPLIER", "2.0"),
            budget: Duration::from_secs(env_or("JOB_BUDGET_SECS", "600")),
            max_concurrent_polls: env_or("MAX_CONCURRENT_POLLS", "8"),
        };

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            provider_base_url,
            min_poll_spacing,
            poll,
        }
    }
}

/// Read an env var with a default, parsing to the target type.
///
/// Panics on an unparseable value, which is the desired behaviour -- we
/// want misconfiguration to fail fast at startup.
fn env_or<T: std::str::FromStr>(name: &str, default: &str) -> T
where
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(name).unwrap_or_else(|_| default.into());
    raw.parse()
        .unwrap_or_else(|e| panic!("{name} must be a valid value: {e}"))
}
