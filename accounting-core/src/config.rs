//! Configuration for the accounting engine

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Commit pipeline configuration
    pub pipeline: PipelineConfig,

    /// Query configuration
    pub query: QueryConfig,

    /// Notification configuration
    pub notifications: NotificationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "accounting-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            pipeline: PipelineConfig::default(),
            query: QueryConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

/// Commit pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Settlement worker tasks
    pub workers: usize,

    /// Work queue capacity (submissions wait when full)
    pub queue_capacity: usize,

    /// Attempts per dequeue before an entry is re-queued
    pub max_settle_attempts: u32,

    /// Max wait for the account locks of one entry (milliseconds)
    pub lock_timeout_ms: u64,

    /// Initial backoff between settle attempts (milliseconds)
    pub retry_backoff_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1000,
            max_settle_attempts: 5,
            lock_timeout_ms: 500,
            retry_backoff_ms: 10,
        }
    }
}

impl PipelineConfig {
    /// Lock timeout as a Duration
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Initial retry backoff as a Duration
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Query configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Page size when the caller gives none
    pub default_page_size: usize,

    /// Upper bound on requested page size
    pub max_page_size: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 1000,
        }
    }
}

/// Notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// In-process bus capacity
    pub bus_capacity: usize,

    /// Max publish attempts
    pub max_retry_attempts: u32,

    /// Initial retry delay (milliseconds)
    pub initial_retry_delay_ms: u64,

    /// Max retry delay (milliseconds)
    pub max_retry_delay_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            bus_capacity: 1024,
            max_retry_attempts: 5,
            initial_retry_delay_ms: 50,
            max_retry_delay_ms: 2000,
        }
    }
}

impl NotificationConfig {
    /// Publisher settings derived from this section
    pub fn publisher_config(&self) -> accounting_bus::PublisherConfig {
        accounting_bus::PublisherConfig {
            max_retry_attempts: self.max_retry_attempts.max(1),
            initial_retry_delay: Duration::from_millis(self.initial_retry_delay_ms),
            max_retry_delay: Duration::from_millis(self.max_retry_delay_ms),
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(workers) = std::env::var("ACCOUNTING_WORKERS") {
            config.pipeline.workers = parse_env("ACCOUNTING_WORKERS", &workers)?;
        }

        if let Ok(capacity) = std::env::var("ACCOUNTING_QUEUE_CAPACITY") {
            config.pipeline.queue_capacity = parse_env("ACCOUNTING_QUEUE_CAPACITY", &capacity)?;
        }

        if let Ok(size) = std::env::var("ACCOUNTING_PAGE_SIZE") {
            config.query.default_page_size = parse_env("ACCOUNTING_PAGE_SIZE", &size)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.pipeline.workers == 0 {
            return Err(crate::Error::Config("pipeline.workers must be at least 1".to_string()));
        }
        if self.pipeline.queue_capacity == 0 {
            return Err(crate::Error::Config(
                "pipeline.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.query.default_page_size == 0
            || self.query.default_page_size > self.query.max_page_size
        {
            return Err(crate::Error::Config(
                "query.default_page_size must be within 1..=max_page_size".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> crate::Result<T> {
    value
        .parse()
        .map_err(|_| crate::Error::Config(format!("Invalid value for {}: {}", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "accounting-core");
        assert_eq!(config.pipeline.workers, 4);
        assert_eq!(config.query.default_page_size, 20);
        assert!(config.validate().is_ok());

        let rendered = toml::to_string(&config).unwrap();
        assert!(rendered.contains("[pipeline]"));
        assert!(!rendered.contains("listen"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pipeline]\nworkers = 8\n\n[query]\ndefault_page_size = 50").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.pipeline.workers, 8);
        assert_eq!(config.pipeline.queue_capacity, 1000);
        assert_eq!(config.query.default_page_size, 50);
        assert_eq!(config.notifications.max_retry_attempts, 5);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pipeline]\nworkers = 0").unwrap();

        let result = Config::from_file(file.path());
        assert!(matches!(result, Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_publisher_config_mapping() {
        let notifications = NotificationConfig::default();
        let publisher = notifications.publisher_config();
        assert_eq!(publisher.max_retry_attempts, 5);
        assert_eq!(publisher.initial_retry_delay, Duration::from_millis(50));
    }
}
