//! WebSocket message type constants for batch lifecycle events.
//!
//! Used by the notification forwarder in `api/src/notifications` when
//! pushing batch updates to connected clients.

use crate::types::BatchId;

/// One file of the batch finished (successfully or not).
pub const MSG_TYPE_PROGRESS: &str = "progress";

/// Every file of the batch finished.
pub const MSG_TYPE_DONE: &str = "done";

/// The archive for the batch is ready to fetch.
pub const MSG_TYPE_DOWNLOAD: &str = "download";

/// No file converted, so no archive was built.
pub const MSG_TYPE_NOTHING_TO_PACKAGE: &str = "nothing_to_package";

/// Building or storing the archive failed.
pub const MSG_TYPE_PACKAGING_FAILED: &str = "packaging_failed";

/// Message shown to clients when a batch finishes.
pub const DONE_MESSAGE: &str = "Conversion complete!";

/// Message shown when no file in the batch could be converted.
pub const NOTHING_TO_PACKAGE_MESSAGE: &str = "No file could be converted; nothing to package";

/// File name offered to browsers when downloading an archive.
pub const ARCHIVE_DOWNLOAD_NAME: &str = "imagens_convertidas.zip";

/// Retrieval path for the archive of a batch.
pub fn archive_url(batch_id: BatchId) -> String {
    format!("/api/v1/batches/{batch_id}/archive")
}
