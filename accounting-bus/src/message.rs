//! Notification envelope

use crate::types::EventKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Notification ID (UUIDv7 for ordering)
    pub id: Uuid,

    /// Event kind
    pub kind: EventKind,

    /// Identifier of the affected ledger, account or journal entry
    pub identifier: String,

    /// Payload (JSON)
    pub payload: serde_json::Value,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// Create new notification with an empty payload
    pub fn new(kind: EventKind, identifier: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind,
            identifier: identifier.into(),
            payload: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    /// Attach payload
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Key consumers deduplicate on
    pub fn dedup_key(&self) -> (EventKind, String) {
        (self.kind, self.identifier.clone())
    }

    /// Subject for this notification
    pub fn subject(&self) -> &'static str {
        self.kind.subject()
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> crate::Result<bytes::Bytes> {
        serde_json::to_vec(self)
            .map(bytes::Bytes::from)
            .map_err(|e| crate::Error::Serialization(e.to_string()))
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| crate::Error::Deserialization(e.to_string()))
    }
}
