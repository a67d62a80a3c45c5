//! Error types for the notification bus

use thiserror::Error;

/// Notification bus error
#[derive(Debug, Error)]
pub enum Error {
    /// Transport refused or dropped the notification
    #[error("Publish error: {0}")]
    Publish(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
