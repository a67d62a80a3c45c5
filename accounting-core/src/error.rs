//! Error types for the accounting engine

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for accounting operations
pub type Result<T> = std::result::Result<T, Error>;

/// Accounting errors
#[derive(Error, Debug)]
pub enum Error {
    /// Identifier or transaction already in use
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Ledger, account or journal entry not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request rejected by validation
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Operation not allowed in the current state
    #[error("Invalid state: {0}")]
    State(String),

    /// Concurrency error (lock contention, worker mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Notification bus error
    #[error("Notification error: {0}")]
    Notification(#[from] accounting_bus::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Transient errors may succeed when retried
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Concurrency(_))
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

/// Reasons a request is refused before anything is applied
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Entry needs at least one debtor and one creditor
    #[error("Journal entry needs at least one debtor and one creditor")]
    MissingPostings,

    /// Posting amount is zero or negative
    #[error("Amount {amount} for account {account} must be positive")]
    NonPositiveAmount {
        /// Account of the offending posting
        account: String,
        /// Offending amount
        amount: Decimal,
    },

    /// Same account referenced by more than one posting
    #[error("Account {0} referenced more than once")]
    DuplicateAccount(String),

    /// Debtor and creditor totals differ
    #[error("Debtor total {debtors} does not match creditor total {creditors}")]
    ImbalancedEntry {
        /// Sum of debtor amounts
        debtors: Decimal,
        /// Sum of creditor amounts
        creditors: Decimal,
    },

    /// Posting references an unknown account
    #[error("Unknown account {0}")]
    UnknownAccount(String),

    /// Posting references a closed account
    #[error("Account {0} is closed")]
    ClosedAccount(String),

    /// Posting references a locked account
    #[error("Account {0} is locked")]
    LockedAccount(String),

    /// Transaction identifier already used
    #[error("Transaction {0} already exists")]
    DuplicateTransaction(String),

    /// Amount total or resulting balance exceeds the decimal range
    #[error("Amount overflow: {0}")]
    AmountOverflow(String),

    /// Transaction date is not an ISO-8601 timestamp
    #[error("Malformed transaction date: {0}")]
    MalformedDate(String),

    /// Date range is not `YYYY-MM-DD..YYYY-MM-DD` with start <= end
    #[error("Malformed date range: {0}")]
    MalformedDateRange(String),

    /// Unknown account type, or sub-ledger type differs from its parent
    #[error("Invalid type: {0}")]
    InvalidType(String),

    /// Account type differs from its ledger's type
    #[error("Account type {actual} does not match ledger type {expected}")]
    TypeMismatch {
        /// Ledger type
        expected: String,
        /// Requested account type
        actual: String,
    },

    /// Unsupported sort column
    #[error("Unknown sort field: {0}")]
    UnknownSortField(String),

    /// Sort direction other than ASC/DESC
    #[error("Unknown sort direction: {0}")]
    UnknownSortDirection(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_converts() {
        let err: Error = ValidationError::UnknownAccount("acc-1".to_string()).into();
        assert!(matches!(err, Error::Validation(ValidationError::UnknownAccount(_))));
        assert!(err.to_string().contains("acc-1"));
    }

    #[test]
    fn test_only_concurrency_is_transient() {
        assert!(Error::Concurrency("lock timeout".to_string()).is_transient());
        assert!(!Error::State("closed".to_string()).is_transient());
        assert!(!Error::NotFound("acc".to_string()).is_transient());
    }

    #[test]
    fn test_imbalance_message_carries_totals() {
        let err = ValidationError::ImbalancedEntry {
            debtors: Decimal::new(5000, 2),
            creditors: Decimal::new(4000, 2),
        };
        let msg = err.to_string();
        assert!(msg.contains("50.00"));
        assert!(msg.contains("40.00"));
    }
}
