//! Shared domain types for the RAW batch conversion service.
//!
//! Everything here is free of I/O so the pipeline, the event bus and the
//! HTTP layer can agree on names, extensions and message shapes.

pub mod batch_events;
pub mod error;
pub mod progress;
pub mod raw_formats;
pub mod types;
