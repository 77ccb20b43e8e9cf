//! Route definitions for the `/archives` resource.

use axum::routing::get;
use axum::Router;

use crate::handlers::batches;
use crate::state::AppState;

/// Routes mounted at `/archives`.
///
/// ```text
/// GET    /latest          -> latest_archive
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/latest", get(batches::latest_archive))
}
