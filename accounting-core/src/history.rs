//! Account entry ledger
//!
//! Append-only history of postings per account, ordered by entry date and
//! then by insertion sequence so pagination over equal dates is stable.
//! Only the commit pipeline appends; queries read snapshots.

use crate::{
    date_range::DateRange,
    types::{AccountEntry, AccountId},
    Error, Result,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

type EntryKey = (DateTime<Utc>, u64);

/// Per-account append-only posting history
#[derive(Debug, Default)]
pub struct AccountEntryLedger {
    entries: DashMap<AccountId, RwLock<BTreeMap<EntryKey, AccountEntry>>>,
    posted: Mutex<HashSet<(AccountId, String)>>,
    sequence: AtomicU64,
}

impl AccountEntryLedger {
    /// Create empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the account entries of one journal entry, all or nothing
    ///
    /// Fails with `Conflict` if any (account, transaction) pair is already
    /// recorded, in which case nothing is appended.
    pub(crate) fn append(&self, batch: Vec<AccountEntry>) -> Result<()> {
        let mut posted = self.posted.lock();

        let mut keys = HashSet::with_capacity(batch.len());
        for entry in &batch {
            let key = (entry.account.clone(), entry.transaction_identifier.clone());
            if posted.contains(&key) || !keys.insert(key) {
                return Err(Error::Conflict(format!(
                    "Account {} already has an entry for transaction {}",
                    entry.account, entry.transaction_identifier
                )));
            }
        }

        for entry in batch {
            let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
            let log = self
                .entries
                .entry(entry.account.clone())
                .or_insert_with(|| RwLock::new(BTreeMap::new()));
            log.write().insert((entry.transaction_date, seq), entry);
        }
        posted.extend(keys);

        Ok(())
    }

    /// Whether the account already has an entry for the transaction
    pub fn contains(&self, account: &AccountId, transaction_identifier: &str) -> bool {
        self.posted
            .lock()
            .contains(&(account.clone(), transaction_identifier.to_string()))
    }

    /// Entries of `account` dated within `range`, oldest first
    pub fn range(
        &self,
        account: &AccountId,
        range: &DateRange,
    ) -> impl Iterator<Item = AccountEntry> {
        let snapshot: Vec<AccountEntry> = match self.entries.get(account) {
            Some(log) => {
                let start = (range.start(), 0);
                let end = (range.end(), u64::MAX);
                log.read()
                    .range(start..=end)
                    .map(|(_, entry)| entry.clone())
                    .collect()
            }
            None => Vec::new(),
        };
        snapshot.into_iter()
    }

    /// Number of entries recorded for `account`
    pub fn len(&self, account: &AccountId) -> usize {
        self.entries
            .get(account)
            .map_or(0, |log| log.read().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    fn entry(account: &str, tx: &str, day: u32, message: &str) -> AccountEntry {
        AccountEntry {
            account: AccountId::new(account),
            transaction_identifier: tx.to_string(),
            entry_type: Side::Debit,
            message: message.to_string(),
            amount: Decimal::new(5000, 2),
            balance: Decimal::new(15000, 2),
            transaction_date: Utc.with_ymd_and_hms(1982, 6, day, 1, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_range_is_date_ordered_and_inclusive() {
        let history = AccountEntryLedger::new();
        history.append(vec![entry("acc-1", "tx-2", 26, "second")]).unwrap();
        history.append(vec![entry("acc-1", "tx-1", 24, "first")]).unwrap();
        history.append(vec![entry("acc-1", "tx-3", 27, "outside")]).unwrap();

        let range: DateRange = "1982-06-24..1982-06-26".parse().unwrap();
        let messages: Vec<String> = history
            .range(&AccountId::new("acc-1"), &range)
            .map(|e| e.message)
            .collect();

        assert_eq!(messages, vec!["first", "second"]);
    }

    #[test]
    fn test_equal_dates_keep_insertion_order() {
        let history = AccountEntryLedger::new();
        history.append(vec![entry("acc-1", "tx-a", 24, "a")]).unwrap();
        history.append(vec![entry("acc-1", "tx-b", 24, "b")]).unwrap();

        let range: DateRange = "1982-06-24..1982-06-24".parse().unwrap();
        let messages: Vec<String> = history
            .range(&AccountId::new("acc-1"), &range)
            .map(|e| e.message)
            .collect();
        assert_eq!(messages, vec!["a", "b"]);
    }

    #[test]
    fn test_duplicate_pair_appends_nothing() {
        let history = AccountEntryLedger::new();
        history.append(vec![entry("acc-1", "tx-1", 24, "m")]).unwrap();

        let result = history.append(vec![
            entry("acc-2", "tx-1", 24, "m"),
            entry("acc-1", "tx-1", 24, "m"),
        ]);

        assert!(matches!(result, Err(Error::Conflict(_))));
        assert_eq!(history.len(&AccountId::new("acc-1")), 1);
        assert_eq!(history.len(&AccountId::new("acc-2")), 0);
        assert!(!history.contains(&AccountId::new("acc-2"), "tx-1"));
    }

    #[test]
    fn test_unknown_account_yields_nothing() {
        let history = AccountEntryLedger::new();
        let range: DateRange = "1982-06-24..1982-06-26".parse().unwrap();
        assert_eq!(history.range(&AccountId::new("ghost"), &range).count(), 0);
    }
}
