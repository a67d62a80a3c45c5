//! Journal entry store
//!
//! Holds every submitted journal entry and serves as the durable side of the
//! work queue: an entry stays PENDING here until a settlement worker resolves
//! it, so the queue can always be rebuilt from [`JournalStore::pending`].

use crate::{
    date_range::DateRange,
    types::{JournalEntry, JournalEntryState},
    Error, Result,
};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Journal entries keyed by transaction identifier
#[derive(Debug, Default)]
pub struct JournalStore {
    entries: DashMap<String, JournalEntry>,
    by_date: RwLock<BTreeMap<(DateTime<Utc>, u64), String>>,
    sequence: AtomicU64,
}

impl JournalStore {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new entry; `Conflict` if the transaction identifier is taken
    pub fn insert(&self, entry: JournalEntry) -> Result<()> {
        match self.entries.entry(entry.transaction_identifier.clone()) {
            Entry::Occupied(_) => Err(Error::Conflict(format!(
                "Transaction {} already exists",
                entry.transaction_identifier
            ))),
            Entry::Vacant(vacant) => {
                let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
                self.by_date.write().insert(
                    (entry.transaction_date, seq),
                    entry.transaction_identifier.clone(),
                );
                vacant.insert(entry);
                Ok(())
            }
        }
    }

    /// Whether the transaction identifier is taken
    pub fn contains(&self, transaction_identifier: &str) -> bool {
        self.entries.contains_key(transaction_identifier)
    }

    /// Get entry by transaction identifier
    pub fn get(&self, transaction_identifier: &str) -> Result<JournalEntry> {
        self.entries
            .get(transaction_identifier)
            .map(|entry| entry.clone())
            .ok_or_else(|| Error::NotFound(format!("Journal entry {}", transaction_identifier)))
    }

    /// Resolve a PENDING entry to a terminal state
    ///
    /// Terminal entries are immutable: resolving one again is a `State` error.
    pub fn resolve(
        &self,
        transaction_identifier: &str,
        state: JournalEntryState,
        rejection_reason: Option<String>,
    ) -> Result<JournalEntry> {
        let mut entry = self
            .entries
            .get_mut(transaction_identifier)
            .ok_or_else(|| Error::NotFound(format!("Journal entry {}", transaction_identifier)))?;

        if entry.state.is_terminal() {
            return Err(Error::State(format!(
                "Journal entry {} is already {}",
                transaction_identifier, entry.state
            )));
        }
        if !state.is_terminal() {
            return Err(Error::State(format!(
                "Journal entry {} cannot return to PENDING",
                transaction_identifier
            )));
        }

        entry.state = state;
        entry.rejection_reason = rejection_reason;
        Ok(entry.clone())
    }

    /// Entries dated within `range`, ordered by transaction date
    pub fn in_range(&self, range: &DateRange) -> Vec<JournalEntry> {
        let ids: Vec<String> = self
            .by_date
            .read()
            .range((range.start(), 0)..=(range.end(), u64::MAX))
            .map(|(_, id)| id.clone())
            .collect();

        ids.iter()
            .filter_map(|id| self.entries.get(id).map(|entry| entry.clone()))
            .collect()
    }

    /// Transaction identifiers of every PENDING entry, oldest submission first
    pub fn pending(&self) -> Vec<String> {
        let mut pending: Vec<(DateTime<Utc>, String)> = self
            .entries
            .iter()
            .filter(|entry| entry.state == JournalEntryState::Pending)
            .map(|entry| (entry.created_on, entry.transaction_identifier.clone()))
            .collect();
        pending.sort();
        pending.into_iter().map(|(_, id)| id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn journal_entry(id: &str, day: u32) -> JournalEntry {
        JournalEntry {
            transaction_identifier: id.to_string(),
            transaction_type: "TRANSFER".to_string(),
            transaction_date: Utc.with_ymd_and_hms(1982, 6, day, 1, 0, 0).unwrap(),
            clerk: None,
            note: None,
            message: format!("message {}", id),
            state: JournalEntryState::Pending,
            debtors: vec![],
            creditors: vec![],
            rejection_reason: None,
            created_on: Utc::now(),
        }
    }

    #[test]
    fn test_duplicate_transaction_conflicts() {
        let store = JournalStore::new();
        store.insert(journal_entry("tx-1", 24)).unwrap();
        let result = store.insert(journal_entry("tx-1", 25));
        assert!(matches!(result, Err(Error::Conflict(_))));
        assert_eq!(store.in_range(&"1982-06-01..1982-06-30".parse().unwrap()).len(), 1);
    }

    #[test]
    fn test_terminal_entries_are_immutable() {
        let store = JournalStore::new();
        store.insert(journal_entry("tx-1", 24)).unwrap();

        let processed = store
            .resolve("tx-1", JournalEntryState::Processed, None)
            .unwrap();
        assert_eq!(processed.state, JournalEntryState::Processed);

        let again = store.resolve("tx-1", JournalEntryState::Rejected, Some("late".into()));
        assert!(matches!(again, Err(Error::State(_))));
        assert_eq!(store.get("tx-1").unwrap().state, JournalEntryState::Processed);
    }

    #[test]
    fn test_in_range_orders_by_transaction_date() {
        let store = JournalStore::new();
        store.insert(journal_entry("late", 26)).unwrap();
        store.insert(journal_entry("early", 24)).unwrap();
        store.insert(journal_entry("outside", 28)).unwrap();

        let ids: Vec<String> = store
            .in_range(&"1982-06-24..1982-06-26".parse().unwrap())
            .into_iter()
            .map(|e| e.transaction_identifier)
            .collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[test]
    fn test_pending_excludes_resolved() {
        let store = JournalStore::new();
        store.insert(journal_entry("tx-1", 24)).unwrap();
        store.insert(journal_entry("tx-2", 25)).unwrap();
        store
            .resolve("tx-1", JournalEntryState::Rejected, Some("closed".into()))
            .unwrap();

        assert_eq!(store.pending(), vec!["tx-2".to_string()]);
    }
}
