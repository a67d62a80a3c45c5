//! Accounting Core
//!
//! Double-entry bookkeeping engine: ledgers and accounts, balanced journal
//! entries settled asynchronously, and queryable account history.
//!
//! # Architecture
//!
//! - **Registry**: ledger tree and accounts; the only place balances live
//! - **Validator**: synchronous checks before anything is applied
//! - **Commit Pipeline**: worker pool settling PENDING entries under per-account locks
//! - **Account Entry Ledger**: append-only posting history per account
//! - **Query Engine**: date ranges, paging and sorting over that history
//!
//! # Invariants
//!
//! - Balanced entries: Σ(debtors) == Σ(creditors) for every entry
//! - All or nothing: a settled entry changed every touched account, a rejected one none
//! - One account entry per touched account per journal entry
//! - Terminal states are final

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod accounting;
pub mod config;
pub mod date_range;
pub mod error;
pub mod history;
pub mod journal;
pub mod locks;
pub mod metrics;
pub mod pipeline;
pub mod query;
pub mod registry;
pub mod types;
pub mod validator;

// Re-exports
pub use accounting::Accounting;
pub use config::Config;
pub use date_range::DateRange;
pub use error::{Error, Result, ValidationError};
pub use query::{AccountEntryPage, AccountEntryQuery, SortDirection, SortField};
pub use types::{
    Account, AccountCommand, AccountEntry, AccountId, AccountState, AccountType, JournalEntry,
    JournalEntryState, Ledger, LedgerId, LedgerUpdate, NewAccount, NewJournalEntry, NewLedger,
    Posting, Side,
};
