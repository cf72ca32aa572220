// feed.rs
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::models::chatmodels::{ChatMessage, ChatSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row-level change on one of the two backing collections. Delivery is
/// at-least-once; consumers dedupe by entity id.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Session {
        kind: ChangeKind,
        session: ChatSession,
    },
    Message {
        kind: ChangeKind,
        message: ChatMessage,
    },
}

/// Fan-out of backend change events. The feed owns no business state; the
/// directory, the stream and the dispatcher each subscribe independently
/// and reduce the same events into their own caches.
pub struct ChangeFeed {
    tx: broadcast::Sender<FeedEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: FeedEvent) {
        // No receivers is fine, the consumers may not be running yet
        let _ = self.tx.send(event);
    }

    /// Normalize and publish a raw session row. Rows that fail typing or
    /// break an invariant are dropped here; the consumers' polling fallback
    /// re-converges their caches.
    pub fn publish_session_row(&self, kind: ChangeKind, row: Value) {
        match ChatSession::from_row(row) {
            Ok(session) => self.publish(FeedEvent::Session { kind, session }),
            Err(e) => tracing::warn!("Dropping session change event: {}", e),
        }
    }

    /// Normalize and publish a raw message row.
    pub fn publish_message_row(&self, kind: ChangeKind, row: Value) {
        match ChatMessage::from_row(row) {
            Ok(message) => self.publish(FeedEvent::Message { kind, message }),
            Err(e) => tracing::warn!("Dropping message change event: {}", e),
        }
    }
}

/// Next event from an optional receiver. Returns None after a lag gap so
/// the caller can resynchronize; pends forever once the feed is closed so
/// select loops fall back to their polling arm alone.
pub(crate) async fn next_event(rx: &mut Option<broadcast::Receiver<FeedEvent>>) -> Option<FeedEvent> {
    loop {
        match rx {
            Some(receiver) => match receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Feed receiver lagged, skipped {} events", skipped);
                    return None;
                }
                Err(RecvError::Closed) => {
                    tracing::debug!("Feed closed, continuing on polling alone");
                    *rx = None;
                }
            },
            None => std::future::pending::<()>().await,
        }
    }
}
