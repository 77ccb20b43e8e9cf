//! WebSocket infrastructure for pushing batch progress.
//!
//! Provides connection management, heartbeat monitoring, and the HTTP
//! upgrade handler used by Axum routes.

mod handler;
mod heartbeat;
pub mod manager;

pub use handler::{ws_handler, WsParams};
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
