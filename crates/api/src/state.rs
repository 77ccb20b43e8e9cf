use std::sync::Arc;

use rawbatch_events::EventBus;
use rawbatch_pipeline::Coordinator;
use tokio_util::task::TaskTracker;

use crate::archives::ArchiveStore;
use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// WebSocket connection manager (browser clients).
    pub ws_manager: Arc<WsManager>,
    /// Batch progress events, forwarded to WebSocket clients.
    pub event_bus: Arc<EventBus>,
    /// Runs accepted batches through the conversion pool.
    pub coordinator: Arc<Coordinator>,
    /// Finished archives, keyed by batch.
    pub archive_store: Arc<ArchiveStore>,
    /// Batches currently running in the background.
    pub batch_tasks: TaskTracker,
}
