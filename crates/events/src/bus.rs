//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`BatchEvent`]s. It is
//! designed to be shared via `Arc<EventBus>` between the batch runner and
//! the WebSocket forwarder.

use chrono::Utc;
use rawbatch_core::batch_events::{
    MSG_TYPE_DONE, MSG_TYPE_DOWNLOAD, MSG_TYPE_NOTHING_TO_PACKAGE, MSG_TYPE_PACKAGING_FAILED,
    MSG_TYPE_PROGRESS,
};
use rawbatch_core::progress::ProgressEvent;
use rawbatch_core::types::{BatchId, Timestamp};
use serde::Serialize;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// BatchEvent
// ---------------------------------------------------------------------------

/// What happened to a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEventKind {
    /// One file finished.
    Progress(ProgressEvent),
    /// Every file finished.
    Done,
    /// The archive is stored and can be fetched from `url`.
    DownloadReady { url: String },
    /// No file converted; no archive was built.
    NothingToPackage,
    /// Building or storing the archive failed.
    PackagingFailed { message: String },
}

/// A notification about one batch.
#[derive(Debug, Clone)]
pub struct BatchEvent {
    pub batch_id: BatchId,
    pub kind: BatchEventKind,
    /// When the event was created (UTC).
    pub timestamp: Timestamp,
}

impl BatchEvent {
    pub fn new(batch_id: BatchId, kind: BatchEventKind) -> Self {
        Self {
            batch_id,
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn progress(batch_id: BatchId, event: ProgressEvent) -> Self {
        Self::new(batch_id, BatchEventKind::Progress(event))
    }

    /// Whether this is a per-file progress event.
    pub fn is_progress(&self) -> bool {
        matches!(self.kind, BatchEventKind::Progress(_))
    }

    /// The WebSocket message type for this event.
    pub fn message_type(&self) -> &'static str {
        match self.kind {
            BatchEventKind::Progress(_) => MSG_TYPE_PROGRESS,
            BatchEventKind::Done => MSG_TYPE_DONE,
            BatchEventKind::DownloadReady { .. } => MSG_TYPE_DOWNLOAD,
            BatchEventKind::NothingToPackage => MSG_TYPE_NOTHING_TO_PACKAGE,
            BatchEventKind::PackagingFailed { .. } => MSG_TYPE_PACKAGING_FAILED,
        }
    }

    /// Render the client-facing JSON payload.
    pub fn to_message(&self) -> serde_json::Value {
        #[derive(Serialize)]
        struct Envelope<'a, T: Serialize> {
            #[serde(rename = "type")]
            message_type: &'static str,
            batch_id: BatchId,
            timestamp: &'a Timestamp,
            #[serde(flatten)]
            body: T,
        }

        let body = match &self.kind {
            BatchEventKind::Progress(event) => serde_json::to_value(event),
            BatchEventKind::Done => Ok(serde_json::json!({
                "message": rawbatch_core::batch_events::DONE_MESSAGE,
                "progresso": 100,
            })),
            BatchEventKind::DownloadReady { url } => Ok(serde_json::json!({ "url": url })),
            BatchEventKind::NothingToPackage => Ok(serde_json::json!({
                "message": rawbatch_core::batch_events::NOTHING_TO_PACKAGE_MESSAGE,
            })),
            BatchEventKind::PackagingFailed { message } => Ok(serde_json::json!({
                "message": message,
                "erro": true,
            })),
        }
        .unwrap_or_default();

        serde_json::to_value(Envelope {
            message_type: self.message_type(),
            batch_id: self.batch_id,
            timestamp: &self.timestamp,
            body,
        })
        .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`BatchEvent`].
///
/// # Usage
///
/// ```rust
/// use rawbatch_events::bus::{BatchEvent, BatchEventKind, EventBus};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(BatchEvent::new(uuid::Uuid::nil(), BatchEventKind::Done));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<BatchEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`. The publisher
    /// is never held up by a slow receiver.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: BatchEvent) {
        // Ignore the SendError; it only means there are zero receivers.
        if self.sender.send(event).is_err() {
            tracing::trace!("Batch event published with no subscribers");
        }
    }

    /// Subscribe to all events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
