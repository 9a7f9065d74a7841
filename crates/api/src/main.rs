use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cam2_api::background;
use cam2_api::config::ServerConfig;
use cam2_api::router::build_app_router;
use cam2_api::state::AppState;
use cam2_jobs::Supervisor;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cam2_api=debug,cam2_jobs=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Durable store ---
    let pool = cam2_db::create_pool(&config.database_url)
        .await
        .expect("Failed to open database");
    tracing::info!(database_url = %config.database_url, "Database pool created");

    cam2_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    cam2_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Result store ---
    let result_store = config
        .result_store
        .build()
        .expect("Failed to configure result store");
    tracing::info!(result_store = ?config.result_store, "Result store configured");

    // --- Supervisor ---
    let supervisor = Supervisor::new(
        pool.clone(),
        Arc::clone(&result_store),
        config.supervisor.clone(),
    );

    // Records left RUNNING by a previous process show up immediately.
    let stuck = background::consistency::audit_once(&supervisor).await;
    if stuck > 0 {
        tracing::warn!(stuck, "Found submissions left RUNNING by a previous run");
    }

    let audit_cancel = tokio_util::sync::CancellationToken::new();
    let audit_handle = tokio::spawn(background::consistency::run(
        supervisor.clone(),
        Duration::from_secs(config.consistency_check_secs),
        audit_cancel.clone(),
    ));

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        supervisor: supervisor.clone(),
        result_store,
    };

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

    audit_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), audit_handle).await;
    tracing::info!("Consistency audit stopped");

    let live = supervisor.registry().len();
    if live > 0 {
        tracing::warn!(live, "Exiting with backend jobs still running; their records stay RUNNING");
    }

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
