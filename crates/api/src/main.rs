use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use prospect_core::store::{MemoryStatusStore, StatusStore};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use prospect_api::auth::{JwtSessionAccess, OpenAccess, SessionAccess};
use prospect_api::config::ServerConfig;
use prospect_api::router::build_app_router;
use prospect_api::state::AppState;
use prospect_api::ws;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "prospect_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Status store ---
    let (store, pool) = match &config.database_url {
        Some(database_url) => {
            let pool = prospect_db::create_pool(database_url)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Database connection pool created");

            prospect_db::health_check(&pool)
                .await
                .expect("Database health check failed");

            prospect_db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database migrations applied");

            (
                Arc::new(prospect_db::PgStatusStore::new(pool.clone())) as Arc<dyn StatusStore>,
                Some(pool),
            )
        }
        None => {
            tracing::warn!(
                "DATABASE_URL not set, workflow status is kept in memory only"
            );
            (Arc::new(MemoryStatusStore::new()) as Arc<dyn StatusStore>, None)
        }
    };

    // --- Session access ---
    let session_access: Arc<dyn SessionAccess> = match &config.jwt {
        Some(jwt) => Arc::new(JwtSessionAccess::new(jwt.clone())),
        None => {
            tracing::warn!("JWT_SECRET not set, session access is not enforced");
            Arc::new(OpenAccess)
        }
    };

    // --- App state ---
    let liveness = config.liveness;
    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );

    let mut state = AppState::new(config, store, session_access);
    if let Some(pool) = pool {
        state = state.with_pool(pool);
    }
    let registry = Arc::clone(&state.registry);

    // --- Heartbeat ---
    let heartbeat_cancel = CancellationToken::new();
    let heartbeat_handle =
        ws::start_heartbeat(Arc::clone(&registry), liveness, heartbeat_cancel.clone());
    tracing::info!(
        heartbeat_secs = liveness.heartbeat_interval.as_secs(),
        sweep_secs = liveness.sweep_interval.as_secs(),
        inactivity_secs = liveness.inactivity_timeout.as_secs(),
        "Heartbeat supervisor started"
    );

    // --- Start server ---
    let app = build_app_router(state);
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

    heartbeat_cancel.cancel();
    let _ = tokio::time::timeout(shutdown_timeout, heartbeat_handle).await;
    tracing::info!("Heartbeat task stopped");

    let ws_count = registry.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    registry.shutdown_all().await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
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
