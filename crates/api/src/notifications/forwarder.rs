//! Event-to-WebSocket forwarding.
//!
//! [`EventForwarder`] subscribes to the batch event bus and pushes each
//! event as a JSON text frame to the WebSocket clients watching that batch.

use std::sync::Arc;

use axum::extract::ws::Message;
use rawbatch_events::BatchEvent;
use tokio::sync::broadcast;

use crate::ws::WsManager;

pub struct EventForwarder {
    ws_manager: Arc<WsManager>,
}

impl EventForwarder {
    pub fn new(ws_manager: Arc<WsManager>) -> Self {
        Self { ws_manager }
    }

    /// Run the forwarding loop.
    ///
    /// The loop exits when the channel is closed (i.e. every
    /// [`EventBus`](rawbatch_events::EventBus) handle is dropped). A lagging
    /// forwarder loses the oldest events but keeps going; the conversion
    /// side is never slowed down by it.
    pub async fn run(self, mut receiver: broadcast::Receiver<BatchEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => self.forward(&event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event forwarder lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, event forwarder shutting down");
                    break;
                }
            }
        }
    }

    async fn forward(&self, event: &BatchEvent) {
        let text = event.to_message().to_string();
        let delivered = self
            .ws_manager
            .send_to_batch(event.batch_id, Message::Text(text.into()))
            .await;
        tracing::trace!(
            batch_id = %event.batch_id,
            message_type = event.message_type(),
            delivered,
            "Forwarded batch event"
        );
    }
}
