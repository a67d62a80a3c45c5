//! Query engine
//!
//! Read-only views over journal entries and account history. Queries never
//! take account locks; each account's history is read from a snapshot that
//! only ever contains fully settled entries.

use crate::{
    config::QueryConfig,
    date_range::DateRange,
    error::ValidationError,
    history::AccountEntryLedger,
    journal::JournalStore,
    registry::Registry,
    types::{AccountEntry, AccountId, JournalEntry},
    Result,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Column account entries can be sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    /// Entry date, then insertion order
    #[default]
    TransactionDate,
    /// Posted amount
    Amount,
    /// Balance after the posting
    Balance,
    /// Journal entry message
    Message,
    /// Originating transaction
    TransactionIdentifier,
}

impl SortField {
    fn compare(&self, a: &AccountEntry, b: &AccountEntry) -> Ordering {
        match self {
            SortField::TransactionDate => a.transaction_date.cmp(&b.transaction_date),
            SortField::Amount => a.amount.cmp(&b.amount),
            SortField::Balance => a.balance.cmp(&b.balance),
            SortField::Message => a.message.cmp(&b.message),
            SortField::TransactionIdentifier => {
                a.transaction_identifier.cmp(&b.transaction_identifier)
            }
        }
    }
}

impl FromStr for SortField {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "transactiondate" | "transaction_date" => Ok(SortField::TransactionDate),
            "amount" => Ok(SortField::Amount),
            "balance" => Ok(SortField::Balance),
            "message" => Ok(SortField::Message),
            "transactionidentifier" | "transaction_identifier" => {
                Ok(SortField::TransactionIdentifier)
            }
            _ => Err(ValidationError::UnknownSortField(s.to_string())),
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SortField::TransactionDate => "transactionDate",
            SortField::Amount => "amount",
            SortField::Balance => "balance",
            SortField::Message => "message",
            SortField::TransactionIdentifier => "transactionIdentifier",
        };
        write!(f, "{}", name)
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    /// Ascending
    #[default]
    Asc,
    /// Descending
    Desc,
}

impl FromStr for SortDirection {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ASC" => Ok(SortDirection::Asc),
            "DESC" => Ok(SortDirection::Desc),
            _ => Err(ValidationError::UnknownSortDirection(s.to_string())),
        }
    }
}

/// Account history request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountEntryQuery {
    /// Inclusive date range
    pub date_range: DateRange,
    /// Exact message filter
    pub message: Option<String>,
    /// Zero-based page index
    pub page_index: Option<usize>,
    /// Page size
    pub size: Option<usize>,
    /// Sort column
    pub sort_column: Option<SortField>,
    /// Sort direction
    pub sort_direction: Option<SortDirection>,
}

impl AccountEntryQuery {
    /// First page of the range in date order
    pub fn new(date_range: DateRange) -> Self {
        Self {
            date_range,
            message: None,
            page_index: None,
            size: None,
            sort_column: None,
            sort_direction: None,
        }
    }

    /// Parse a `YYYY-MM-DD..YYYY-MM-DD` range
    pub fn parse(date_range: &str) -> std::result::Result<Self, ValidationError> {
        Ok(Self::new(date_range.parse()?))
    }

    /// Keep only entries with exactly this message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Select a page
    pub fn with_page(mut self, page_index: usize, size: usize) -> Self {
        self.page_index = Some(page_index);
        self.size = Some(size);
        self
    }

    /// Order the entries
    pub fn sorted_by(mut self, column: SortField, direction: SortDirection) -> Self {
        self.sort_column = Some(column);
        self.sort_direction = Some(direction);
        self
    }
}

/// One page of account entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountEntryPage {
    /// Entries on this page
    pub account_entries: Vec<AccountEntry>,
    /// Entries matching the filter across all pages
    pub total_elements: usize,
    /// Number of pages at the requested size
    pub total_pages: usize,
}

/// Read side of the engine
#[derive(Debug, Clone)]
pub struct QueryEngine {
    registry: Arc<Registry>,
    journal: Arc<JournalStore>,
    history: Arc<AccountEntryLedger>,
    config: QueryConfig,
}

impl QueryEngine {
    /// Create query engine over the shared stores
    pub fn new(
        registry: Arc<Registry>,
        journal: Arc<JournalStore>,
        history: Arc<AccountEntryLedger>,
        config: QueryConfig,
    ) -> Self {
        Self {
            registry,
            journal,
            history,
            config,
        }
    }

    /// Journal entries dated within the range, in date order
    pub fn fetch_journal_entries(&self, range: &DateRange) -> Vec<JournalEntry> {
        self.journal.in_range(range)
    }

    /// One page of an account's history
    pub fn fetch_account_entries(
        &self,
        account: &AccountId,
        query: &AccountEntryQuery,
    ) -> Result<AccountEntryPage> {
        self.registry.find_account(account)?;

        let mut entries: Vec<AccountEntry> = self
            .history
            .range(account, &query.date_range)
            .filter(|entry| {
                query
                    .message
                    .as_ref()
                    .map_or(true, |message| &entry.message == message)
            })
            .collect();

        let column = query.sort_column.unwrap_or_default();
        match query.sort_direction.unwrap_or_default() {
            SortDirection::Asc => entries.sort_by(|a, b| column.compare(a, b)),
            SortDirection::Desc => {
                // Exact mirror of ascending order, ties included
                entries.reverse();
                entries.sort_by(|a, b| column.compare(b, a));
            }
        }

        let size = query
            .size
            .unwrap_or(self.config.default_page_size)
            .min(self.config.max_page_size)
            .max(1);
        let page_index = query.page_index.unwrap_or(0);
        let total_elements = entries.len();
        let total_pages = (total_elements + size - 1) / size;

        let account_entries = entries
            .into_iter()
            .skip(page_index.saturating_mul(size))
            .take(size)
            .collect();

        Ok(AccountEntryPage {
            account_entries,
            total_elements,
            total_pages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountType, LedgerId, NewAccount, NewLedger, Side};
    use crate::Error;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    fn engine_with_history(rows: &[(&str, u32, &str, i64)]) -> QueryEngine {
        let registry = Arc::new(Registry::new());
        registry
            .create_ledger(NewLedger::new("assets", AccountType::Asset))
            .unwrap();
        registry
            .create_account(NewAccount::new(
                "cash",
                LedgerId::new("assets"),
                AccountType::Asset,
                Decimal::ZERO,
            ))
            .unwrap();

        let history = Arc::new(AccountEntryLedger::new());
        for (tx, day, message, amount) in rows {
            history
                .append(vec![AccountEntry {
                    account: AccountId::new("cash"),
                    transaction_identifier: tx.to_string(),
                    entry_type: Side::Debit,
                    message: message.to_string(),
                    amount: Decimal::new(*amount, 2),
                    balance: Decimal::new(*amount, 2),
                    transaction_date: Utc.with_ymd_and_hms(1982, 6, *day, 1, 0, 0).unwrap(),
                }])
                .unwrap();
        }

        QueryEngine::new(
            registry,
            Arc::new(JournalStore::new()),
            history,
            QueryConfig {
                default_page_size: 2,
                max_page_size: 3,
            },
        )
    }

    fn ids(page: &AccountEntryPage) -> Vec<&str> {
        page.account_entries
            .iter()
            .map(|e| e.transaction_identifier.as_str())
            .collect()
    }

    #[test]
    fn test_sort_field_and_direction_parse() {
        assert_eq!("transactionDate".parse::<SortField>(), Ok(SortField::TransactionDate));
        assert_eq!("balance".parse::<SortField>(), Ok(SortField::Balance));
        assert_eq!("desc".parse::<SortDirection>(), Ok(SortDirection::Desc));
        assert!(matches!(
            "colour".parse::<SortField>(),
            Err(ValidationError::UnknownSortField(_))
        ));
        assert!(matches!(
            "UP".parse::<SortDirection>(),
            Err(ValidationError::UnknownSortDirection(_))
        ));
    }

    #[test]
    fn test_default_page_and_totals() {
        let engine = engine_with_history(&[
            ("tx-1", 24, "a", 100),
            ("tx-2", 25, "b", 200),
            ("tx-3", 26, "c", 300),
        ]);
        let query = AccountEntryQuery::parse("1982-06-24..1982-06-26").unwrap();
        let page = engine
            .fetch_account_entries(&AccountId::new("cash"), &query)
            .unwrap();

        assert_eq!(ids(&page), vec!["tx-1", "tx-2"]);
        assert_eq!(page.total_elements, 3);
        assert_eq!(page.total_pages, 2);

        let second = engine
            .fetch_account_entries(&AccountId::new("cash"), &query.clone().with_page(1, 2))
            .unwrap();
        assert_eq!(ids(&second), vec!["tx-3"]);
    }

    #[test]
    fn test_size_is_capped() {
        let engine = engine_with_history(&[
            ("tx-1", 24, "a", 100),
            ("tx-2", 24, "a", 100),
            ("tx-3", 24, "a", 100),
            ("tx-4", 24, "a", 100),
        ]);
        let query = AccountEntryQuery::parse("1982-06-24..1982-06-24")
            .unwrap()
            .with_page(0, 500);
        let page = engine
            .fetch_account_entries(&AccountId::new("cash"), &query)
            .unwrap();
        assert_eq!(page.account_entries.len(), 3);
        assert_eq!(page.total_pages, 2);
    }

    #[test]
    fn test_desc_mirrors_asc() {
        let engine = engine_with_history(&[
            ("tx-1", 24, "a", 100),
            ("tx-2", 24, "b", 100),
            ("tx-3", 25, "c", 100),
        ]);
        let query = AccountEntryQuery::parse("1982-06-24..1982-06-25")
            .unwrap()
            .with_page(0, 3)
            .sorted_by(SortField::TransactionDate, SortDirection::Desc);
        let page = engine
            .fetch_account_entries(&AccountId::new("cash"), &query)
            .unwrap();
        assert_eq!(ids(&page), vec!["tx-3", "tx-2", "tx-1"]);
    }

    #[test]
    fn test_sort_by_amount() {
        let engine = engine_with_history(&[
            ("tx-1", 24, "a", 300),
            ("tx-2", 25, "b", 100),
            ("tx-3", 26, "c", 200),
        ]);
        let query = AccountEntryQuery::parse("1982-06-24..1982-06-26")
            .unwrap()
            .with_page(0, 3)
            .sorted_by(SortField::Amount, SortDirection::Asc);
        let page = engine
            .fetch_account_entries(&AccountId::new("cash"), &query)
            .unwrap();
        assert_eq!(ids(&page), vec!["tx-2", "tx-3", "tx-1"]);
    }

    #[test]
    fn test_message_filter() {
        let engine = engine_with_history(&[
            ("tx-1", 24, "rent", 100),
            ("tx-2", 25, "salary", 100),
        ]);
        let query = AccountEntryQuery::parse("1982-06-24..1982-06-25")
            .unwrap()
            .with_message("salary");
        let page = engine
            .fetch_account_entries(&AccountId::new("cash"), &query)
            .unwrap();
        assert_eq!(ids(&page), vec!["tx-2"]);
        assert_eq!(page.total_elements, 1);
    }

    #[test]
    fn test_empty_and_unknown() {
        let engine = engine_with_history(&[]);
        let query = AccountEntryQuery::parse("1982-06-24..1982-06-25").unwrap();

        let page = engine
            .fetch_account_entries(&AccountId::new("cash"), &query)
            .unwrap();
        assert_eq!(page.total_elements, 0);
        assert_eq!(page.total_pages, 0);
        assert!(page.account_entries.is_empty());

        let missing = engine.fetch_account_entries(&AccountId::new("ghost"), &query);
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }
}
