//! In-process broadcast transport
//!
//! Used when the engine is embedded without an external broker, and by tests.
//! Every subscriber sees every notification published after it subscribed.

use crate::{publisher::Transport, Result};
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

/// Delivered frame: subject plus encoded notification
pub type Frame = (String, bytes::Bytes);

/// Broadcast-backed transport
#[derive(Debug, Clone)]
pub struct InMemoryBus {
    sender: broadcast::Sender<Frame>,
}

impl InMemoryBus {
    /// Create bus retaining at most `capacity` undelivered frames per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to every subsequent frame
    pub fn subscribe(&self) -> broadcast::Receiver<Frame> {
        self.sender.subscribe()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl Transport for InMemoryBus {
    async fn send(&self, subject: &str, payload: bytes::Bytes) -> Result<()> {
        // No subscribers means nobody to deliver to; not a failure.
        if self.sender.send((subject.to_string(), payload)).is_err() {
            debug!(subject, "No subscribers for notification");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventKind, Notification};

    #[tokio::test]
    async fn test_subscriber_receives_frame() {
        let bus = InMemoryBus::new(16);
        let mut rx = bus.subscribe();

        let notification = Notification::new(EventKind::LedgerCreated, "ledger-1");
        bus.send(notification.subject(), notification.to_bytes().unwrap())
            .await
            .unwrap();

        let (subject, payload) = rx.recv().await.unwrap();
        assert_eq!(subject, "accounting.ledger.created");
        let decoded = Notification::from_bytes(&payload).unwrap();
        assert_eq!(decoded.identifier, "ledger-1");
    }

    #[tokio::test]
    async fn test_send_without_subscribers_succeeds() {
        let bus = InMemoryBus::default();
        let result = bus.send("accounting.ledger.created", bytes::Bytes::new()).await;
        assert!(result.is_ok());
    }
}
