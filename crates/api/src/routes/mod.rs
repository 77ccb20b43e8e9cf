pub mod archives;
pub mod batches;
pub mod health;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws                          WebSocket push (optional ?batch_id=)
///
/// /batches                     submit a batch (POST, multipart)
/// /batches/{id}/archive        download a batch archive
///
/// /archives/latest             most recently built archive
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_handler))
        // Batch submission and downloads
        .nest("/batches", batches::router())
        .nest("/archives", archives::router())
}
