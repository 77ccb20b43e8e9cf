//! Route definitions for the `/batches` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::batches;
use crate::state::AppState;

/// Routes mounted at `/batches`.
///
/// ```text
/// POST   /                -> submit_batch
/// GET    /{id}/archive    -> download_archive
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(batches::submit_batch))
        .route("/{id}/archive", get(batches::download_archive))
}
