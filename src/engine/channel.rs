//! # Document Channel
//!
//! Broadcast channel carrying saved documents between engine instances in
//! the same process. Every endpoint tags what it publishes with its own id,
//! and receivers skip their own publications, so an engine only ever sees
//! peer updates.
//!
//! ## Features
//!
//! - **Fan-out**: every subscriber gets every peer document
//! - **Self-filtering**: an endpoint never receives what it published
//! - **Lag-tolerant**: slow receivers skip missed documents and keep going

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::shared::progress::ProgressDocument;

/// A document published by one engine endpoint
#[derive(Debug, Clone)]
pub struct PeerDocument {
    /// Id of the endpoint that published the document
    pub origin: Uuid,
    /// The full document as of the publish
    pub document: ProgressDocument,
}

/// Shared channel that engine endpoints attach to
#[derive(Debug, Clone)]
pub struct DocumentChannel {
    sender: broadcast::Sender<PeerDocument>,
}

impl DocumentChannel {
    /// Create a channel with room for `capacity` in-flight documents
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Attach a new endpoint with its own origin id
    pub fn endpoint(&self) -> DocumentEndpoint {
        DocumentEndpoint {
            id: Uuid::new_v4(),
            sender: self.sender.clone(),
        }
    }
}

impl Default for DocumentChannel {
    fn default() -> Self {
        Self::new(100)
    }
}

/// One engine's attachment to a [`DocumentChannel`]
#[derive(Debug, Clone)]
pub struct DocumentEndpoint {
    id: Uuid,
    sender: broadcast::Sender<PeerDocument>,
}

impl DocumentEndpoint {
    /// Publish a document to every other endpoint on the channel
    pub fn publish(&self, document: ProgressDocument) {
        let receivers = self.sender.receiver_count();
        if receivers == 0 {
            return;
        }
        tracing::debug!(
            "[Engine] Publishing document to {} channel subscriber(s)",
            receivers
        );
        let _ = self.sender.send(PeerDocument {
            origin: self.id,
            document,
        });
    }

    /// Subscribe to documents published by other endpoints
    pub fn subscribe(&self) -> PeerReceiver {
        PeerReceiver {
            origin: self.id,
            receiver: self.sender.subscribe(),
        }
    }
}

/// Receiving side of one endpoint's subscription
pub struct PeerReceiver {
    origin: Uuid,
    receiver: broadcast::Receiver<PeerDocument>,
}

impl PeerReceiver {
    /// Next peer document, or `None` once the channel is gone
    pub async fn recv(&mut self) -> Option<PeerDocument> {
        loop {
            match self.receiver.recv().await {
                Ok(peer) if peer.origin == self.origin => continue,
                Ok(peer) => return Some(peer),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("[Engine] Channel receiver lagged, skipped {}", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
