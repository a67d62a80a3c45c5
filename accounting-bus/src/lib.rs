//! Lifecycle notifications for the accounting engine
//!
//! Provides at-least-once delivery of lifecycle events with:
//! - A transport seam so the broker stays an external collaborator
//! - Retry logic with exponential backoff on publish
//! - An in-process broadcast transport for embedding and tests
//! - A recorder that deduplicates by (kind, identifier)
//! - Observability via Prometheus metrics

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod error;
pub mod memory;
pub mod message;
pub mod metrics;
pub mod publisher;
pub mod recorder;
pub mod types;

pub use error::{Error, Result};
pub use memory::InMemoryBus;
pub use message::Notification;
pub use publisher::{Publisher, PublisherConfig, Transport};
pub use recorder::EventRecorder;
pub use types::EventKind;
