//! Type definitions for the notification bus

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// Ledger registered
    LedgerCreated,
    /// Sub-ledger registered under a parent
    SubLedgerCreated,
    /// Ledger name/description/metadata changed
    LedgerUpdated,
    /// Ledger removed (only possible while empty)
    LedgerDeleted,
    /// Account registered
    AccountCreated,
    /// Account locked
    AccountLocked,
    /// Account unlocked
    AccountUnlocked,
    /// Account closed
    AccountClosed,
    /// Account reopened
    AccountReopened,
    /// Journal entry accepted for processing
    EntrySubmitted,
    /// Journal entry resolved to PROCESSED or REJECTED
    EntryReleased,
}

impl EventKind {
    /// Subject this kind is published on
    pub fn subject(&self) -> &'static str {
        match self {
            EventKind::LedgerCreated => "accounting.ledger.created",
            EventKind::SubLedgerCreated => "accounting.ledger.sub_ledger_created",
            EventKind::LedgerUpdated => "accounting.ledger.updated",
            EventKind::LedgerDeleted => "accounting.ledger.deleted",
            EventKind::AccountCreated => "accounting.account.created",
            EventKind::AccountLocked => "accounting.account.locked",
            EventKind::AccountUnlocked => "accounting.account.unlocked",
            EventKind::AccountClosed => "accounting.account.closed",
            EventKind::AccountReopened => "accounting.account.reopened",
            EventKind::EntrySubmitted => "accounting.journal_entry.submitted",
            EventKind::EntryReleased => "accounting.journal_entry.released",
        }
    }

    /// Short label used for metrics
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::LedgerCreated => "ledger_created",
            EventKind::SubLedgerCreated => "sub_ledger_created",
            EventKind::LedgerUpdated => "ledger_updated",
            EventKind::LedgerDeleted => "ledger_deleted",
            EventKind::AccountCreated => "account_created",
            EventKind::AccountLocked => "account_locked",
            EventKind::AccountUnlocked => "account_unlocked",
            EventKind::AccountClosed => "account_closed",
            EventKind::AccountReopened => "account_reopened",
            EventKind::EntrySubmitted => "entry_submitted",
            EventKind::EntryReleased => "entry_released",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subjects_share_prefix() {
        let kinds = [
            EventKind::LedgerCreated,
            EventKind::AccountCreated,
            EventKind::EntrySubmitted,
            EventKind::EntryReleased,
        ];
        for kind in kinds {
            assert!(kind.subject().starts_with("accounting."));
        }
    }

    #[test]
    fn test_kind_serializes_screaming_case() {
        let json = serde_json::to_string(&EventKind::EntryReleased).unwrap();
        assert_eq!(json, "\"ENTRY_RELEASED\"");
    }
}
