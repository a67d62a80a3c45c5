//! Notification publisher with retry logic

use crate::{
    message::Notification,
    metrics::{NOTIFICATION_PUBLISH_DURATION, NOTIFICATION_PUBLISH_TOTAL},
    Result,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Delivery seam to whatever broker carries notifications
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one encoded notification on `subject`
    async fn send(&self, subject: &str, payload: bytes::Bytes) -> Result<()>;
}

/// Publisher configuration
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Max retry attempts
    pub max_retry_attempts: u32,

    /// Initial retry delay
    pub initial_retry_delay: Duration,

    /// Max retry delay
    pub max_retry_delay: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: 5,
            initial_retry_delay: Duration::from_millis(50),
            max_retry_delay: Duration::from_secs(2),
        }
    }
}

/// Notification publisher
#[derive(Clone)]
pub struct Publisher {
    transport: Arc<dyn Transport>,
    config: PublisherConfig,
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Publisher {
    /// Create new publisher
    pub fn new(transport: Arc<dyn Transport>, config: PublisherConfig) -> Self {
        Self { transport, config }
    }

    /// Publish notification, retrying transient transport failures
    pub async fn publish(&self, notification: &Notification) -> Result<()> {
        let start = Instant::now();
        let kind = notification.kind.label();

        debug!(
            id = %notification.id,
            kind,
            identifier = %notification.identifier,
            "Publishing notification"
        );

        let payload = notification.to_bytes()?;
        let result = self
            .publish_with_retry(notification.subject(), payload)
            .await;

        NOTIFICATION_PUBLISH_DURATION
            .with_label_values(&[kind])
            .observe(start.elapsed().as_secs_f64());

        let status = if result.is_ok() { "success" } else { "error" };
        NOTIFICATION_PUBLISH_TOTAL
            .with_label_values(&[kind, status])
            .inc();

        result
    }

    /// Publish on a background task; failures are logged, never returned
    pub fn publish_detached(&self, notification: Notification) {
        let publisher = self.clone();
        tokio::spawn(async move {
            if let Err(e) = publisher.publish(&notification).await {
                error!(
                    kind = %notification.kind,
                    identifier = %notification.identifier,
                    "Dropping notification: {}",
                    e
                );
            }
        });
    }

    /// Publish with exponential backoff retry
    async fn publish_with_retry(&self, subject: &str, payload: bytes::Bytes) -> Result<()> {
        let mut attempts = 0;
        let mut delay = self.config.initial_retry_delay;

        loop {
            attempts += 1;

            match self.transport.send(subject, payload.clone()).await {
                Ok(()) => {
                    if attempts > 1 {
                        info!("Notification published after {} attempts", attempts);
                    }
                    return Ok(());
                }
                Err(e) => {
                    if attempts >= self.config.max_retry_attempts {
                        error!("Failed to publish after {} attempts: {}", attempts, e);
                        return Err(e);
                    }

                    warn!(
                        "Publish failed (attempt {}), retrying in {:?}: {}",
                        attempts, delay, e
                    );
                    tokio::time::sleep(delay).await;

                    delay = (delay * 2).min(self.config.max_retry_delay);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, EventKind};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` sends, then records subjects
    struct FlakyTransport {
        failures: AtomicU32,
        delivered: Mutex<Vec<String>>,
    }

    impl FlakyTransport {
        fn new(failures: u32) -> Self {
            Self {
                failures: AtomicU32::new(failures),
                delivered: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn send(&self, subject: &str, _payload: bytes::Bytes) -> Result<()> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(Error::Publish("broker unavailable".to_string()));
            }
            self.delivered.lock().push(subject.to_string());
            Ok(())
        }
    }

    fn fast_config(max_retry_attempts: u32) -> PublisherConfig {
        PublisherConfig {
            max_retry_attempts,
            initial_retry_delay: Duration::from_millis(1),
            max_retry_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_publish_config_default() {
        let config = PublisherConfig::default();
        assert_eq!(config.max_retry_attempts, 5);
        assert!(config.initial_retry_delay < config.max_retry_delay);
    }

    #[tokio::test]
    async fn test_publish_retries_until_delivered() {
        let transport = Arc::new(FlakyTransport::new(2));
        let publisher = Publisher::new(transport.clone(), fast_config(3));

        let notification = Notification::new(EventKind::LedgerCreated, "ledger-1");
        publisher.publish(&notification).await.unwrap();

        let delivered = transport.delivered.lock();
        assert_eq!(delivered.as_slice(), ["accounting.ledger.created"]);
    }

    #[tokio::test]
    async fn test_publish_gives_up_after_max_attempts() {
        let transport = Arc::new(FlakyTransport::new(10));
        let publisher = Publisher::new(transport.clone(), fast_config(3));

        let notification = Notification::new(EventKind::AccountCreated, "acc-1");
        let result = publisher.publish(&notification).await;

        assert!(matches!(result, Err(Error::Publish(_))));
        assert!(transport.delivered.lock().is_empty());
        assert_eq!(transport.failures.load(Ordering::SeqCst), 7);
    }
}
