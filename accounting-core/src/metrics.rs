//! Metrics collection for observability
//!
//! Prometheus metrics for the commit pipeline, kept in a per-engine registry
//! so several engines can live in one process.
//!
//! # Metrics
//!
//! - `accounting_entries_submitted_total` - Journal entries accepted as PENDING
//! - `accounting_entries_processed_total` - Journal entries settled
//! - `accounting_entries_rejected_total` - Journal entries rejected
//! - `accounting_settle_retries_total` - Settle attempts lost to lock contention
//! - `accounting_settle_duration_seconds` - Histogram of settlement latencies
//! - `accounting_entries_pending` - Entries waiting for settlement

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone, Debug)]
pub struct Metrics {
    /// Entries accepted
    pub entries_submitted: IntCounter,

    /// Entries settled
    pub entries_processed: IntCounter,

    /// Entries rejected (at submission or settlement)
    pub entries_rejected: IntCounter,

    /// Settle retries
    pub settle_retries: IntCounter,

    /// Settle duration histogram
    pub settle_duration: Histogram,

    /// Entries waiting for settlement
    pub entries_pending: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let entries_submitted = IntCounter::new(
            "accounting_entries_submitted_total",
            "Journal entries accepted as PENDING",
        )?;
        registry.register(Box::new(entries_submitted.clone()))?;

        let entries_processed = IntCounter::new(
            "accounting_entries_processed_total",
            "Journal entries settled",
        )?;
        registry.register(Box::new(entries_processed.clone()))?;

        let entries_rejected = IntCounter::new(
            "accounting_entries_rejected_total",
            "Journal entries rejected",
        )?;
        registry.register(Box::new(entries_rejected.clone()))?;

        let settle_retries = IntCounter::new(
            "accounting_settle_retries_total",
            "Settle attempts lost to lock contention",
        )?;
        registry.register(Box::new(settle_retries.clone()))?;

        let settle_duration = Histogram::with_opts(
            HistogramOpts::new(
                "accounting_settle_duration_seconds",
                "Histogram of settlement latencies",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.500, 1.0]),
        )?;
        registry.register(Box::new(settle_duration.clone()))?;

        let entries_pending = IntGauge::new(
            "accounting_entries_pending",
            "Entries waiting for settlement",
        )?;
        registry.register(Box::new(entries_pending.clone()))?;

        Ok(Self {
            entries_submitted,
            entries_processed,
            entries_rejected,
            settle_retries,
            settle_duration,
            entries_pending,
            registry,
        })
    }

    /// Record an accepted submission
    pub fn record_submitted(&self) {
        self.entries_submitted.inc();
        self.entries_pending.inc();
    }

    /// Record a submission refused by validation
    pub fn record_refused(&self) {
        self.entries_rejected.inc();
    }

    /// Record a settled entry
    pub fn record_processed(&self, duration_seconds: f64) {
        self.entries_processed.inc();
        self.entries_pending.dec();
        self.settle_duration.observe(duration_seconds);
    }

    /// Record an entry rejected during settlement
    pub fn record_rejected(&self, duration_seconds: f64) {
        self.entries_rejected.inc();
        self.entries_pending.dec();
        self.settle_duration.observe(duration_seconds);
    }

    /// Record a retried settle attempt
    pub fn record_retry(&self) {
        self.settle_retries.inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.entries_submitted.get(), 0);
        assert_eq!(metrics.entries_pending.get(), 0);
    }

    #[test]
    fn test_independent_instances() {
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();
        first.record_submitted();
        assert_eq!(first.entries_submitted.get(), 1);
        assert_eq!(second.entries_submitted.get(), 0);
    }

    #[test]
    fn test_pending_gauge_follows_outcomes() {
        let metrics = Metrics::new().unwrap();
        metrics.record_submitted();
        metrics.record_submitted();
        metrics.record_processed(0.002);
        metrics.record_rejected(0.001);
        assert_eq!(metrics.entries_pending.get(), 0);
        assert_eq!(metrics.entries_processed.get(), 1);
        assert_eq!(metrics.entries_rejected.get(), 1);
    }

    #[test]
    fn test_registry_gathers_families() {
        let metrics = Metrics::new().unwrap();
        metrics.record_retry();
        let families = metrics.registry().gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "accounting_settle_retries_total"));
    }
}
