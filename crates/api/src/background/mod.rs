//! Background tasks spawned by request handlers.
//!
//! Each submodule provides a long-running async function intended to be
//! spawned on the shared [`TaskTracker`](tokio_util::task::TaskTracker) so
//! shutdown can wait for it.

pub mod batch_runner;
