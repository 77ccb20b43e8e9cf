//! Batch progress event bus.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`. Publishing never blocks the publisher.
//! - [`BatchEvent`]: the envelope carried on the bus for every batch
//!   lifecycle notification.

pub mod bus;

pub use bus::{BatchEvent, BatchEventKind, EventBus};
