use std::sync::Arc;

use serenade_orchestrator::Orchestrator;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable (everything is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// The job orchestrator: creation, queries, streams, callbacks.
    pub orchestrator: Arc<Orchestrator>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
}
