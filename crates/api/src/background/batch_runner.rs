//! Drives one accepted batch from conversion to a downloadable archive.
//!
//! Event sequence published on the bus for a batch:
//!
//! 1. One `Progress` per file, in completion order.
//! 2. `Done` once every file finished.
//! 3. Exactly one of `DownloadReady`, `NothingToPackage` or
//!    `PackagingFailed`.

use std::path::PathBuf;
use std::sync::Arc;

use rawbatch_core::batch_events::archive_url;
use rawbatch_core::types::BatchId;
use rawbatch_events::{BatchEvent, BatchEventKind, EventBus};
use rawbatch_pipeline::{build_archive, AcceptedJobs, Coordinator};

use crate::archives::ArchiveStore;

/// How a batch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// The archive was stored at `path`.
    Packaged { path: PathBuf, entries: usize },
    /// No file converted.
    NothingToPackage,
    /// Building or storing the archive failed.
    PackagingFailed { message: String },
}

/// Everything a batch run needs, detached from the request.
#[derive(Clone)]
pub struct BatchRunner {
    pub coordinator: Arc<Coordinator>,
    pub archive_store: Arc<ArchiveStore>,
    pub event_bus: Arc<EventBus>,
}

impl BatchRunner {
    /// Convert every accepted job, then package and store the outputs.
    pub async fn run(self, batch_id: BatchId, accepted: AcceptedJobs) -> BatchOutcome {
        let state = self
            .coordinator
            .run_accepted(batch_id, accepted, &self.event_bus)
            .await;
        self.event_bus
            .publish(BatchEvent::new(batch_id, BatchEventKind::Done));

        if state.results.is_empty() {
            tracing::warn!(%batch_id, failed = state.failure_count(), "No file converted, nothing to package");
            self.event_bus
                .publish(BatchEvent::new(batch_id, BatchEventKind::NothingToPackage));
            return BatchOutcome::NothingToPackage;
        }

        let entries = state.results.len();
        let results = state.results;
        let packaged = tokio::task::spawn_blocking(move || build_archive(&results))
            .await
            .map_err(|e| format!("archive task failed: {e}"))
            .and_then(|built| built.map_err(|e| e.to_string()));

        let stored = match packaged {
            Ok(bytes) => self
                .archive_store
                .store(batch_id, bytes)
                .await
                .map_err(|e| format!("could not store archive: {e}")),
            Err(message) => Err(message),
        };

        match stored {
            Ok(path) => {
                tracing::info!(%batch_id, entries, "Batch archive ready");
                self.event_bus.publish(BatchEvent::new(
                    batch_id,
                    BatchEventKind::DownloadReady {
                        url: archive_url(batch_id),
                    },
                ));
                BatchOutcome::Packaged { path, entries }
            }
            Err(message) => {
                tracing::error!(%batch_id, error = %message, "Packaging failed");
                self.event_bus.publish(BatchEvent::new(
                    batch_id,
                    BatchEventKind::PackagingFailed {
                        message: message.clone(),
                    },
                ));
                BatchOutcome::PackagingFailed { message }
            }
        }
    }
}
