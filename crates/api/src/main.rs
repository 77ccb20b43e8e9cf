use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rawbatch_api::archives::ArchiveStore;
use rawbatch_api::config::ServerConfig;
use rawbatch_api::notifications::EventForwarder;
use rawbatch_api::router::build_app_router;
use rawbatch_api::state::AppState;
use rawbatch_api::ws;
use rawbatch_events::EventBus;
use rawbatch_pipeline::{Converter, Coordinator, DevelopingDecoder, StagingArea};
use tokio_util::task::TaskTracker;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "rawbatch_api=debug,rawbatch_pipeline=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        concurrency = config.conversion_concurrency,
        job_timeout_secs = config.job_timeout_secs,
        "Loaded server configuration"
    );

    // --- Storage ---
    let staging = StagingArea::new(&config.staging_dir);
    let archive_store = Arc::new(
        ArchiveStore::open(&config.archive_dir, config.archive_retention)
            .expect("Failed to open archive directory"),
    );

    // --- Conversion pipeline ---
    let converter = Converter::new(Arc::new(DevelopingDecoder::new()), staging);
    let coordinator = Arc::new(Coordinator::new(
        Arc::new(converter),
        config.coordinator_config(),
    ));
    tracing::info!("Conversion pipeline ready");

    // --- WebSocket manager ---
    let ws_manager = Arc::new(ws::WsManager::new());

    // --- Heartbeat ---
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&ws_manager));

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());

    // Spawn the forwarder (pushes batch events to WebSocket clients).
    let forwarder = EventForwarder::new(Arc::clone(&ws_manager));
    let forwarder_handle = tokio::spawn(forwarder.run(event_bus.subscribe()));
    tracing::info!("Event forwarder started");

    // --- App state ---
    let batch_tasks = TaskTracker::new();
    let state = AppState {
        config: Arc::new(config.clone()),
        ws_manager: Arc::clone(&ws_manager),
        event_bus: Arc::clone(&event_bus),
        coordinator,
        archive_store,
        batch_tasks: batch_tasks.clone(),
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

    // Let running batches finish so their archives land on disk.
    batch_tasks.close();
    let running = batch_tasks.len();
    if running > 0 {
        tracing::info!(running, "Waiting for running batches");
    }
    let drain = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(drain, batch_tasks.wait()).await.is_err() {
        tracing::warn!(
            running = batch_tasks.len(),
            "Batches still running after shutdown timeout"
        );
    }

    // Drop the event bus sender to close the broadcast channel.
    // This signals the forwarder to shut down.
    drop(event_bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), forwarder_handle).await;
    tracing::info!("Event forwarder shut down");

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    heartbeat_handle.abort();
    tracing::info!("Heartbeat task stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
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
