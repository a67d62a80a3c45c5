//! Accounting engine facade
//!
//! Ties the registry, validator, commit pipeline and query engine together
//! behind one API, and announces every lifecycle change on the notification
//! bus.
//!
//! # Example
//!
//! ```no_run
//! use accounting_core::{Accounting, Config};
//!
//! #[tokio::main]
//! async fn main() -> accounting_core::Result<()> {
//!     let accounting = Accounting::open(Config::default()).await?;
//!
//!     // let ledger = accounting.create_ledger(...)?;
//!     // let entry = accounting.create_journal_entry(...).await?;
//!
//!     accounting.shutdown().await
//! }
//! ```

use crate::{
    date_range::DateRange,
    error::ValidationError,
    history::AccountEntryLedger,
    journal::JournalStore,
    locks::AccountLocks,
    metrics::Metrics,
    pipeline::{spawn_commit_pipeline, PipelineHandle, Settlement},
    query::{AccountEntryPage, AccountEntryQuery, QueryEngine},
    registry::Registry,
    types::{
        Account, AccountCommand, AccountId, JournalEntry, JournalEntryState, Ledger, LedgerId,
        LedgerUpdate, NewAccount, NewJournalEntry, NewLedger,
    },
    validator::{transaction_date, Validator},
    Config, Error, Result,
};
use accounting_bus::{memory::Frame, EventKind, InMemoryBus, Notification, Publisher, Transport};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Main accounting interface
#[derive(Debug)]
pub struct Accounting {
    registry: Arc<Registry>,
    journal: Arc<JournalStore>,
    locks: Arc<AccountLocks>,
    validator: Validator,
    query: QueryEngine,
    pipeline: PipelineHandle,
    publisher: Publisher,
    metrics: Metrics,
    // Present when notifications stay in-process
    bus: Option<Arc<InMemoryBus>>,
    config: Config,
}

impl Accounting {
    /// Open an engine that publishes on an in-process bus
    pub async fn open(config: Config) -> Result<Self> {
        let bus = Arc::new(InMemoryBus::new(config.notifications.bus_capacity));
        let mut accounting = Self::open_with_transport(config, bus.clone()).await?;
        accounting.bus = Some(bus);
        Ok(accounting)
    }

    /// Open an engine that publishes through `transport`
    pub async fn open_with_transport(config: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;

        let metrics = Metrics::new()
            .map_err(|e| Error::Other(format!("Failed to create metrics: {}", e)))?;
        let publisher = Publisher::new(transport, config.notifications.publisher_config());

        let registry = Arc::new(Registry::new());
        let journal = Arc::new(JournalStore::new());
        let history = Arc::new(AccountEntryLedger::new());
        let locks = Arc::new(AccountLocks::new());

        let settlement = Arc::new(Settlement::new(
            registry.clone(),
            journal.clone(),
            history.clone(),
            locks.clone(),
            publisher.clone(),
            metrics.clone(),
            config.pipeline.clone(),
        ));
        let pipeline = spawn_commit_pipeline(settlement, &config.pipeline);

        let validator = Validator::new(registry.clone(), journal.clone());
        let query = QueryEngine::new(
            registry.clone(),
            journal.clone(),
            history,
            config.query.clone(),
        );

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            "Accounting engine opened"
        );

        let accounting = Self {
            registry,
            journal,
            locks,
            validator,
            query,
            pipeline,
            publisher,
            metrics,
            bus: None,
            config,
        };
        accounting.recover_pending().await?;

        Ok(accounting)
    }

    /// Subscribe to the in-process bus, if the engine owns one
    pub fn subscribe(&self) -> Option<broadcast::Receiver<Frame>> {
        self.bus.as_ref().map(|bus| bus.subscribe())
    }

    /// Get metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Get configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn notify<T: Serialize>(&self, kind: EventKind, identifier: impl Into<String>, body: &T) {
        let mut notification = Notification::new(kind, identifier);
        match serde_json::to_value(body) {
            Ok(payload) => notification = notification.with_payload(payload),
            Err(e) => tracing::warn!(%kind, "Notification sent without payload: {}", e),
        }
        self.publisher.publish_detached(notification);
    }

    // Ledgers

    /// Register a ledger or sub-ledger
    pub fn create_ledger(&self, request: NewLedger) -> Result<Ledger> {
        let ledger = self.registry.create_ledger(request)?;
        let kind = match ledger.parent_ledger {
            Some(_) => EventKind::SubLedgerCreated,
            None => EventKind::LedgerCreated,
        };
        self.notify(kind, ledger.identifier.as_str(), &ledger);
        Ok(ledger)
    }

    /// Change a ledger's name, description or metadata
    pub fn update_ledger(&self, id: &LedgerId, update: LedgerUpdate) -> Result<Ledger> {
        let ledger = self.registry.update_ledger(id, update)?;
        self.notify(EventKind::LedgerUpdated, id.as_str(), &ledger);
        Ok(ledger)
    }

    /// Remove an empty ledger
    pub fn delete_ledger(&self, id: &LedgerId) -> Result<()> {
        let ledger = self.registry.delete_ledger(id)?;
        self.notify(EventKind::LedgerDeleted, id.as_str(), &ledger);
        Ok(())
    }

    /// Get ledger by ID
    pub fn find_ledger(&self, id: &LedgerId) -> Result<Ledger> {
        self.registry.find_ledger(id)
    }

    /// Root ledgers
    pub fn fetch_ledgers(&self) -> Vec<Ledger> {
        self.registry.fetch_ledgers()
    }

    /// Direct sub-ledgers of a ledger
    pub fn fetch_sub_ledgers(&self, id: &LedgerId) -> Result<Vec<Ledger>> {
        self.registry.fetch_sub_ledgers(id)
    }

    /// Sum of balances over a ledger and its sub-ledgers
    pub fn ledger_total(&self, id: &LedgerId) -> Result<Decimal> {
        self.registry.ledger_total(id)
    }

    // Accounts

    /// Register an account
    pub fn create_account(&self, request: NewAccount) -> Result<Account> {
        let account = self.registry.create_account(request)?;
        self.notify(EventKind::AccountCreated, account.identifier.as_str(), &account);
        Ok(account)
    }

    /// Get account by ID
    pub fn find_account(&self, id: &AccountId) -> Result<Account> {
        self.registry.find_account(id)
    }

    /// Accounts of a ledger
    pub fn fetch_accounts_of_ledger(&self, id: &LedgerId) -> Result<Vec<Account>> {
        self.registry.fetch_accounts_of_ledger(id)
    }

    /// Lock, unlock, close or reopen an account
    ///
    /// Waits for any settlement touching the account to finish first.
    pub async fn change_account_state(
        &self,
        id: &AccountId,
        command: AccountCommand,
    ) -> Result<Account> {
        let _guards = self
            .locks
            .acquire(std::slice::from_ref(id), self.config.pipeline.lock_timeout())
            .await?;
        let account = self.registry.change_account_state(id, command)?;

        let kind = match command {
            AccountCommand::Lock => EventKind::AccountLocked,
            AccountCommand::Unlock => EventKind::AccountUnlocked,
            AccountCommand::Close => EventKind::AccountClosed,
            AccountCommand::Reopen => EventKind::AccountReopened,
        };
        self.notify(kind, id.as_str(), &account);
        Ok(account)
    }

    // Journal entries

    /// Submit a journal entry for asynchronous settlement
    ///
    /// Returns the PENDING entry once it is queued. A refused entry is
    /// recorded as REJECTED and the validation error is returned.
    pub async fn create_journal_entry(&self, request: NewJournalEntry) -> Result<JournalEntry> {
        let transaction_identifier = request
            .transaction_identifier
            .clone()
            .unwrap_or_else(|| Uuid::now_v7().to_string());

        if let Err(e) = self.validator.validate(&request) {
            self.metrics.record_refused();
            tracing::info!(
                transaction = %transaction_identifier,
                "Journal entry refused: {}",
                e
            );
            // The existing entry owns that identifier
            if !matches!(e, ValidationError::DuplicateTransaction(_)) {
                let rejected = journal_entry(
                    &request,
                    transaction_identifier,
                    JournalEntryState::Rejected,
                    Some(e.to_string()),
                );
                if let Err(insert) = self.journal.insert(rejected) {
                    tracing::warn!("Refused entry not recorded: {}", insert);
                }
            }
            return Err(e.into());
        }

        let entry = journal_entry(
            &request,
            transaction_identifier.clone(),
            JournalEntryState::Pending,
            None,
        );
        self.journal.insert(entry.clone()).map_err(|e| match e {
            Error::Conflict(_) => {
                Error::Validation(ValidationError::DuplicateTransaction(transaction_identifier.clone()))
            }
            other => other,
        })?;
        self.metrics.record_submitted();

        tracing::info!(
            transaction = %transaction_identifier,
            debtors = entry.debtors.len(),
            creditors = entry.creditors.len(),
            "Journal entry submitted"
        );
        self.notify(EventKind::EntrySubmitted, transaction_identifier.as_str(), &entry);
        self.pipeline.enqueue(transaction_identifier).await?;

        Ok(entry)
    }

    /// Get journal entry by transaction identifier
    pub fn find_journal_entry(&self, transaction_identifier: &str) -> Result<JournalEntry> {
        self.journal.get(transaction_identifier)
    }

    /// Journal entries within a `YYYY-MM-DD..YYYY-MM-DD` range
    pub fn fetch_journal_entries(&self, date_range: &str) -> Result<Vec<JournalEntry>> {
        let range: DateRange = date_range.parse()?;
        Ok(self.query.fetch_journal_entries(&range))
    }

    /// One page of an account's history
    pub fn fetch_account_entries(
        &self,
        account: &AccountId,
        query: &AccountEntryQuery,
    ) -> Result<AccountEntryPage> {
        self.query.fetch_account_entries(account, query)
    }

    // Operations

    /// Queue every PENDING entry again; returns how many were queued
    pub async fn recover_pending(&self) -> Result<usize> {
        let pending = self.journal.pending();
        let count = pending.len();
        for transaction_identifier in pending {
            self.pipeline.enqueue(transaction_identifier).await?;
        }
        if count > 0 {
            tracing::info!(count, "Re-queued pending journal entries");
        }
        Ok(count)
    }

    /// Drain the queue and stop the settlement workers
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutting down accounting engine");
        self.pipeline.shutdown().await
    }
}

fn journal_entry(
    request: &NewJournalEntry,
    transaction_identifier: String,
    state: JournalEntryState,
    rejection_reason: Option<String>,
) -> JournalEntry {
    let now = Utc::now();
    JournalEntry {
        transaction_identifier,
        transaction_type: request.transaction_type.clone(),
        transaction_date: transaction_date(request.transaction_date.as_deref()).unwrap_or(now),
        clerk: request.clerk.clone(),
        note: request.note.clone(),
        message: request.message.clone(),
        state,
        debtors: request.debtors.clone(),
        creditors: request.creditors.clone(),
        rejection_reason,
        created_on: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountType, Posting};
    use accounting_bus::EventRecorder;
    use std::time::Duration;

    async fn open() -> (Accounting, EventRecorder) {
        let accounting = Accounting::open(Config::default()).await.unwrap();
        let recorder = EventRecorder::spawn(accounting.subscribe().unwrap());
        accounting
            .create_ledger(NewLedger::new("assets", AccountType::Asset))
            .unwrap();
        accounting
            .create_account(NewAccount::new(
                "cash",
                LedgerId::new("assets"),
                AccountType::Asset,
                Decimal::new(10000, 2),
            ))
            .unwrap();
        accounting
            .create_account(NewAccount::new(
                "petty",
                LedgerId::new("assets"),
                AccountType::Asset,
                Decimal::new(10000, 2),
            ))
            .unwrap();
        (accounting, recorder)
    }

    fn transfer(id: Option<&str>, amount: i64) -> NewJournalEntry {
        NewJournalEntry {
            transaction_identifier: id.map(str::to_string),
            transaction_type: "TRANSFER".to_string(),
            message: "move cash".to_string(),
            debtors: vec![Posting::new(AccountId::new("petty"), Decimal::new(amount, 2))],
            creditors: vec![Posting::new(AccountId::new("cash"), Decimal::new(amount, 2))],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_generated_identifier_is_uuid_v7() {
        let (accounting, recorder) = open().await;
        let entry = accounting.create_journal_entry(transfer(None, 100)).await.unwrap();

        let id = Uuid::parse_str(&entry.transaction_identifier).unwrap();
        assert_eq!(id.get_version_num(), 7);
        assert_eq!(entry.state, JournalEntryState::Pending);

        assert!(
            recorder
                .wait(EventKind::EntryReleased, &entry.transaction_identifier, Duration::from_secs(2))
                .await
        );
        let settled = accounting
            .find_journal_entry(&entry.transaction_identifier)
            .unwrap();
        assert_eq!(settled.state, JournalEntryState::Processed);
        assert_eq!(
            accounting.find_account(&AccountId::new("petty")).unwrap().balance,
            Decimal::new(10100, 2)
        );
        assert_eq!(
            accounting.find_account(&AccountId::new("cash")).unwrap().balance,
            Decimal::new(9900, 2)
        );
    }

    #[tokio::test]
    async fn test_duplicate_transaction_keeps_original() {
        let (accounting, recorder) = open().await;
        accounting
            .create_journal_entry(transfer(Some("tx-1"), 100))
            .await
            .unwrap();
        assert!(
            recorder
                .wait(EventKind::EntryReleased, "tx-1", Duration::from_secs(2))
                .await
        );

        let result = accounting.create_journal_entry(transfer(Some("tx-1"), 100)).await;
        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::DuplicateTransaction(_)))
        ));
        assert_eq!(
            accounting.find_journal_entry("tx-1").unwrap().state,
            JournalEntryState::Processed
        );
    }

    #[tokio::test]
    async fn test_refused_entry_is_recorded_rejected() {
        let (accounting, _recorder) = open().await;
        let mut request = transfer(Some("tx-bad"), 100);
        request.transaction_date = Some("yesterday".to_string());

        let result = accounting.create_journal_entry(request).await;
        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::MalformedDate(_)))
        ));

        let recorded = accounting.find_journal_entry("tx-bad").unwrap();
        assert_eq!(recorded.state, JournalEntryState::Rejected);
        assert!(recorded.rejection_reason.is_some());
        assert_eq!(accounting.metrics().entries_rejected.get(), 1);
    }

    #[tokio::test]
    async fn test_overflowing_totals_are_recorded_rejected() {
        let (accounting, _recorder) = open().await;
        accounting
            .create_account(NewAccount::new(
                "vault",
                LedgerId::new("assets"),
                AccountType::Asset,
                Decimal::ZERO,
            ))
            .unwrap();

        let mut request = transfer(Some("tx-huge"), 100);
        request.debtors = vec![
            Posting::new(AccountId::new("petty"), Decimal::MAX),
            Posting::new(AccountId::new("vault"), Decimal::MAX),
        ];
        request.creditors = vec![Posting::new(AccountId::new("cash"), Decimal::MAX)];

        let result = accounting.create_journal_entry(request).await;
        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::AmountOverflow(_)))
        ));
        assert_eq!(
            accounting.find_journal_entry("tx-huge").unwrap().state,
            JournalEntryState::Rejected
        );
        assert_eq!(
            accounting.find_account(&AccountId::new("cash")).unwrap().balance,
            Decimal::new(10000, 2)
        );
    }

    #[tokio::test]
    async fn test_state_change_is_announced() {
        let (accounting, recorder) = open().await;
        let account = accounting
            .change_account_state(&AccountId::new("cash"), AccountCommand::Lock)
            .await
            .unwrap();
        assert_eq!(account.state, crate::types::AccountState::Locked);
        assert!(
            recorder
                .wait(EventKind::AccountLocked, "cash", Duration::from_secs(2))
                .await
        );

        let result = accounting.create_journal_entry(transfer(None, 100)).await;
        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::LockedAccount(_)))
        ));
    }

    #[tokio::test]
    async fn test_malformed_range() {
        let (accounting, _recorder) = open().await;
        let result = accounting.fetch_journal_entries("1982-06-26..1982-06-24");
        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::MalformedDateRange(_)))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let (accounting, _recorder) = open().await;
        for i in 0..5 {
            accounting
                .create_journal_entry(transfer(Some(&format!("tx-{}", i)), 100))
                .await
                .unwrap();
        }
        accounting.shutdown().await.unwrap();

        for i in 0..5 {
            let entry = accounting.find_journal_entry(&format!("tx-{}", i)).unwrap();
            assert_eq!(entry.state, JournalEntryState::Processed);
        }
        assert_eq!(accounting.recover_pending().await.unwrap(), 0);
    }
}
