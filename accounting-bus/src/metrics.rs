//! Prometheus metrics for the notification bus

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec,
};

lazy_static! {
    /// Total notifications published
    pub static ref NOTIFICATION_PUBLISH_TOTAL: IntCounterVec = register_int_counter_vec!(
        "accounting_bus_publish_total",
        "Total notifications published",
        &["kind", "status"]
    )
    .unwrap();

    /// Publish duration including retries
    pub static ref NOTIFICATION_PUBLISH_DURATION: HistogramVec = register_histogram_vec!(
        "accounting_bus_publish_duration_seconds",
        "Notification publish duration in seconds",
        &["kind"]
    )
    .unwrap();

    /// Total notifications received by recorders
    pub static ref NOTIFICATION_RECEIVE_TOTAL: IntCounterVec = register_int_counter_vec!(
        "accounting_bus_receive_total",
        "Total notifications received",
        &["kind", "status"]
    )
    .unwrap();
}
