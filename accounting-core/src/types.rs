//! Core types for the accounting engine
//!
//! All types are designed for:
//! - Exact arithmetic (Decimal for money, never binary floating point)
//! - Plain identifiers between entities (no owning back-references)
//! - Serde round-tripping at the API boundary

use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Ledger identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LedgerId(String);

impl LedgerId {
    /// Create new ledger ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LedgerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Account identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create new account ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Side of a posting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    /// Debit (debtor posting)
    Debit,
    /// Credit (creditor posting)
    Credit,
}

/// Ledger and account type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    /// Asset (debit-normal)
    Asset,
    /// Liability (credit-normal)
    Liability,
    /// Equity (credit-normal)
    Equity,
    /// Revenue (credit-normal)
    Revenue,
    /// Expense (debit-normal)
    Expense,
}

impl AccountType {
    /// Canonical upper-case name
    pub fn name(&self) -> &'static str {
        match self {
            AccountType::Asset => "ASSET",
            AccountType::Liability => "LIABILITY",
            AccountType::Equity => "EQUITY",
            AccountType::Revenue => "REVENUE",
            AccountType::Expense => "EXPENSE",
        }
    }

    /// Side on which a posting increases the balance
    pub fn normal_side(&self) -> Side {
        match self {
            AccountType::Asset | AccountType::Expense => Side::Debit,
            AccountType::Liability | AccountType::Equity | AccountType::Revenue => Side::Credit,
        }
    }

    /// Balance delta of a posting of `amount` on `side`
    pub fn balance_effect(&self, side: Side, amount: Decimal) -> Decimal {
        if side == self.normal_side() {
            amount
        } else {
            -amount
        }
    }

    /// Express a balance delta as debits minus credits
    pub fn debit_equivalent(&self, delta: Decimal) -> Decimal {
        match self.normal_side() {
            Side::Debit => delta,
            Side::Credit => -delta,
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for AccountType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ASSET" => Ok(AccountType::Asset),
            "LIABILITY" => Ok(AccountType::Liability),
            "EQUITY" => Ok(AccountType::Equity),
            "REVENUE" => Ok(AccountType::Revenue),
            "EXPENSE" => Ok(AccountType::Expense),
            _ => Err(ValidationError::InvalidType(s.to_string())),
        }
    }
}

/// Registered ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    /// Ledger ID
    pub identifier: LedgerId,

    /// Ledger type, shared by all sub-ledgers and accounts
    pub account_type: AccountType,

    /// Parent ledger (None for a root ledger)
    pub parent_ledger: Option<LedgerId>,

    /// Display name
    pub name: String,

    /// Free-form description
    pub description: Option<String>,

    /// Additional metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Created timestamp
    pub created_on: DateTime<Utc>,

    /// Last administrative change
    pub last_modified_on: Option<DateTime<Utc>>,
}

/// Ledger registration request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLedger {
    /// Ledger ID
    pub identifier: LedgerId,
    /// Ledger type
    pub account_type: AccountType,
    /// Parent ledger, making this a sub-ledger
    pub parent_ledger: Option<LedgerId>,
    /// Display name
    pub name: String,
    /// Free-form description
    pub description: Option<String>,
    /// Additional metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl NewLedger {
    /// Root ledger with the identifier doubling as name
    pub fn new(identifier: impl Into<String>, account_type: AccountType) -> Self {
        let identifier = identifier.into();
        Self {
            name: identifier.clone(),
            identifier: LedgerId::new(identifier),
            account_type,
            parent_ledger: None,
            description: None,
            metadata: HashMap::new(),
        }
    }

    /// Make this a sub-ledger of `parent`
    pub fn with_parent(mut self, parent: LedgerId) -> Self {
        self.parent_ledger = Some(parent);
        self
    }
}

/// Administrative ledger change; `None` leaves a field untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerUpdate {
    /// New display name
    pub name: Option<String>,
    /// New description
    pub description: Option<String>,
    /// Replacement metadata
    pub metadata: Option<HashMap<String, String>>,
}

/// Account lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountState {
    /// Accepts postings
    Open,
    /// Temporarily refuses postings
    Locked,
    /// Refuses postings until reopened
    Closed,
}

/// Administrative account state command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountCommand {
    /// OPEN -> LOCKED
    Lock,
    /// LOCKED -> OPEN
    Unlock,
    /// OPEN | LOCKED -> CLOSED
    Close,
    /// CLOSED -> OPEN
    Reopen,
}

impl AccountCommand {
    /// State reached from `from`, if the transition is allowed
    pub fn apply(&self, from: AccountState) -> Option<AccountState> {
        match (self, from) {
            (AccountCommand::Lock, AccountState::Open) => Some(AccountState::Locked),
            (AccountCommand::Unlock, AccountState::Locked) => Some(AccountState::Open),
            (AccountCommand::Close, AccountState::Open | AccountState::Locked) => {
                Some(AccountState::Closed)
            }
            (AccountCommand::Reopen, AccountState::Closed) => Some(AccountState::Open),
            _ => None,
        }
    }
}

/// Registered account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Account ID
    pub identifier: AccountId,

    /// Owning ledger
    pub ledger: LedgerId,

    /// Account type (equals the ledger's type)
    pub account_type: AccountType,

    /// Display name
    pub name: String,

    /// Account holders
    #[serde(default)]
    pub holders: Vec<String>,

    /// Current balance
    pub balance: Decimal,

    /// Lifecycle state
    pub state: AccountState,

    /// Created timestamp
    pub created_on: DateTime<Utc>,
}

/// Account registration request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccount {
    /// Account ID
    pub identifier: AccountId,
    /// Owning ledger
    pub ledger: LedgerId,
    /// Account type
    pub account_type: AccountType,
    /// Display name
    pub name: String,
    /// Account holders
    #[serde(default)]
    pub holders: Vec<String>,
    /// Opening balance
    pub balance: Decimal,
}

impl NewAccount {
    /// Account named after its identifier
    pub fn new(
        identifier: impl Into<String>,
        ledger: LedgerId,
        account_type: AccountType,
        balance: Decimal,
    ) -> Self {
        let identifier = identifier.into();
        Self {
            name: identifier.clone(),
            identifier: AccountId::new(identifier),
            ledger,
            account_type,
            holders: Vec::new(),
            balance,
        }
    }
}

/// One side of a journal entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    /// Account posted to
    pub account: AccountId,
    /// Amount (positive; the side carries the sign)
    pub amount: Decimal,
}

impl Posting {
    /// Create posting
    pub fn new(account: AccountId, amount: Decimal) -> Self {
        Self { account, amount }
    }
}

/// Journal entry lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JournalEntryState {
    /// Accepted, waiting for settlement
    Pending,
    /// Settled (terminal)
    Processed,
    /// Refused (terminal)
    Rejected,
}

impl JournalEntryState {
    /// Check if state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, JournalEntryState::Processed | JournalEntryState::Rejected)
    }
}

impl fmt::Display for JournalEntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JournalEntryState::Pending => "PENDING",
            JournalEntryState::Processed => "PROCESSED",
            JournalEntryState::Rejected => "REJECTED",
        };
        write!(f, "{}", name)
    }
}

/// Journal entry submission
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewJournalEntry {
    /// Transaction ID (system-assigned UUIDv7 when absent)
    pub transaction_identifier: Option<String>,
    /// Free-form classification
    pub transaction_type: String,
    /// RFC 3339 timestamp (submission time when absent)
    pub transaction_date: Option<String>,
    /// Clerk who booked the entry
    pub clerk: Option<String>,
    /// Internal note
    pub note: Option<String>,
    /// Message copied onto every account entry
    pub message: String,
    /// Debtor postings
    pub debtors: Vec<Posting>,
    /// Creditor postings
    pub creditors: Vec<Posting>,
}

impl NewJournalEntry {
    /// Iterate postings with their side, debtors first
    pub fn postings(&self) -> impl Iterator<Item = (Side, &Posting)> {
        self.debtors
            .iter()
            .map(|p| (Side::Debit, p))
            .chain(self.creditors.iter().map(|p| (Side::Credit, p)))
    }
}

/// Recorded journal entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Transaction ID
    pub transaction_identifier: String,
    /// Free-form classification
    pub transaction_type: String,
    /// Transaction date
    pub transaction_date: DateTime<Utc>,
    /// Clerk who booked the entry
    pub clerk: Option<String>,
    /// Internal note
    pub note: Option<String>,
    /// Message copied onto every account entry
    pub message: String,
    /// Lifecycle state
    pub state: JournalEntryState,
    /// Debtor postings
    pub debtors: Vec<Posting>,
    /// Creditor postings
    pub creditors: Vec<Posting>,
    /// Why the entry was rejected
    pub rejection_reason: Option<String>,
    /// Submission timestamp
    pub created_on: DateTime<Utc>,
}

impl JournalEntry {
    /// Iterate postings with their side, debtors first
    pub fn postings(&self) -> impl Iterator<Item = (Side, &Posting)> {
        self.debtors
            .iter()
            .map(|p| (Side::Debit, p))
            .chain(self.creditors.iter().map(|p| (Side::Credit, p)))
    }
}

/// Materialized posting in an account's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountEntry {
    /// Account posted to
    pub account: AccountId,
    /// Originating journal entry
    pub transaction_identifier: String,
    /// Debit or credit
    pub entry_type: Side,
    /// Journal entry message
    pub message: String,
    /// Posted amount
    pub amount: Decimal,
    /// Balance right after this posting
    pub balance: Decimal,
    /// Journal entry transaction date
    pub transaction_date: DateTime<Utc>,
}
