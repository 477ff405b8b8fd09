use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use serenade_api::config::ServerConfig;
use serenade_api::router::build_app_router;
use serenade_api::state::AppState;
use serenade_orchestrator::Orchestrator;
use serenade_provider::{GenerationProvider, HttpProvider};
use serenade_store::{JobStore, MemoryJobStore, PgJobStore};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "serenade=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Job store ---
    // Postgres when DATABASE_URL is set; in-memory otherwise (local
    // development only -- records do not survive a restart).
    let store: Arc<dyn JobStore> = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            let pool = serenade_store::create_pool(&database_url)
                .await
                .expect("Failed to connect to database");
            serenade_store::health_check(&pool)
                .await
                .expect("Database health check failed");
            serenade_store::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Using Postgres job store");
            Arc::new(PgJobStore::new(pool))
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set, using in-memory job store");
            Arc::new(MemoryJobStore::new())
        }
    };

    // --- Provider ---
    let provider: Arc<dyn GenerationProvider> = Arc::new(HttpProvider::new(
        config.provider_base_url.clone(),
        config.min_poll_spacing,
    ));
    tracing::info!(provider_base_url = %config.provider_base_url, "Provider adapter ready");

    // --- Orchestrator ---
    let orchestrator = Orchestrator::new(store, provider, config.poll.clone());
    let resumed = orchestrator
        .resume_active()
        .await
        .expect("Failed to resume active jobs");
    tracing::info!(resumed, "Orchestrator started");

    // --- App state ---
    let state = AppState {
        orchestrator: Arc::clone(&orchestrator),
        config: Arc::new(config.clone()),
    };

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    orchestrator.shutdown().await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
