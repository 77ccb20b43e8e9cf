//! RAW batch conversion API server library.
//!
//! Exposes the building blocks (config, state, error handling, routes,
//! WebSocket push, archive storage) so integration tests and the binary
//! entrypoint share them.

pub mod archives;
pub mod background;
pub mod config;
pub mod error;
pub mod handlers;
pub mod notifications;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
pub mod ws;
