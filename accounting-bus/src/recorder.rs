//! Deduplicating consumer of lifecycle notifications
//!
//! Delivery is at-least-once, so the recorder keys what it has seen by
//! (kind, identifier) and keeps only the first copy.

use crate::{
    memory::Frame,
    message::Notification,
    metrics::NOTIFICATION_RECEIVE_TOTAL,
    types::EventKind,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tracing::{error, warn};

#[derive(Default)]
struct Inner {
    seen: Mutex<HashMap<(EventKind, String), Notification>>,
    duplicates: Mutex<u64>,
    notify: Notify,
}

/// Records notifications and lets callers wait for a specific one
#[derive(Clone, Default)]
pub struct EventRecorder {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for EventRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRecorder")
            .field("seen", &self.inner.seen.lock().len())
            .finish()
    }
}

impl EventRecorder {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a task feeding the recorder from a broadcast subscription
    pub fn spawn(mut receiver: broadcast::Receiver<Frame>) -> Self {
        let recorder = Self::new();
        let feed = recorder.clone();

        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok((_, payload)) => match Notification::from_bytes(&payload) {
                        Ok(notification) => {
                            feed.record(notification);
                        }
                        Err(e) => {
                            error!("Failed to parse notification: {}", e);
                            NOTIFICATION_RECEIVE_TOTAL
                                .with_label_values(&["unknown", "parse_error"])
                                .inc();
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Recorder lagged behind the bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        recorder
    }

    /// Record a notification; returns false for a redelivered copy
    pub fn record(&self, notification: Notification) -> bool {
        let kind = notification.kind.label();
        let fresh = {
            let mut seen = self.inner.seen.lock();
            let key = notification.dedup_key();
            if seen.contains_key(&key) {
                false
            } else {
                seen.insert(key, notification);
                true
            }
        };

        if fresh {
            NOTIFICATION_RECEIVE_TOTAL
                .with_label_values(&[kind, "success"])
                .inc();
            self.inner.notify.notify_waiters();
        } else {
            *self.inner.duplicates.lock() += 1;
            NOTIFICATION_RECEIVE_TOTAL
                .with_label_values(&[kind, "duplicate"])
                .inc();
        }

        fresh
    }

    /// Whether (kind, identifier) has been seen
    pub fn contains(&self, kind: EventKind, identifier: &str) -> bool {
        self.inner
            .seen
            .lock()
            .contains_key(&(kind, identifier.to_string()))
    }

    /// First recorded copy of (kind, identifier)
    pub fn get(&self, kind: EventKind, identifier: &str) -> Option<Notification> {
        self.inner
            .seen
            .lock()
            .get(&(kind, identifier.to_string()))
            .cloned()
    }

    /// Number of redelivered copies that were dropped
    pub fn duplicates(&self) -> u64 {
        *self.inner.duplicates.lock()
    }

    /// Wait until (kind, identifier) is recorded or `timeout` elapses
    pub async fn wait(&self, kind: EventKind, identifier: &str, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.contains(kind, identifier) {
                return true;
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.contains(kind, identifier);
            }
        }
    }
}
