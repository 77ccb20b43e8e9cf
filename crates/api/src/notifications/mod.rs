//! Delivery of batch events to connected clients.

pub mod forwarder;

pub use forwarder::EventForwarder;
