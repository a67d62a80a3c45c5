//! Journal entry validation
//!
//! Runs synchronously on submission. Nothing is applied here; a failed check
//! leaves balances and history untouched.

use crate::{
    error::ValidationError,
    journal::JournalStore,
    registry::Registry,
    types::{AccountState, NewJournalEntry, Posting},
};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;

/// Validator for journal entry submissions
#[derive(Debug, Clone)]
pub struct Validator {
    registry: Arc<Registry>,
    journal: Arc<JournalStore>,
}

impl Validator {
    /// Create validator over the registry and journal store
    pub fn new(registry: Arc<Registry>, journal: Arc<JournalStore>) -> Self {
        Self { registry, journal }
    }

    /// Check every rule, reporting the first that fails
    pub fn validate(&self, entry: &NewJournalEntry) -> Result<(), ValidationError> {
        validate_shape(entry)?;

        for (_, posting) in entry.postings() {
            let account = self
                .registry
                .find_account(&posting.account)
                .map_err(|_| ValidationError::UnknownAccount(posting.account.to_string()))?;

            match account.state {
                AccountState::Open => {}
                AccountState::Closed => {
                    return Err(ValidationError::ClosedAccount(posting.account.to_string()))
                }
                AccountState::Locked => {
                    return Err(ValidationError::LockedAccount(posting.account.to_string()))
                }
            }
        }

        if let Some(id) = &entry.transaction_identifier {
            if self.journal.contains(id) {
                return Err(ValidationError::DuplicateTransaction(id.clone()));
            }
        }

        transaction_date(entry.transaction_date.as_deref())?;

        Ok(())
    }
}

/// Checks that need nothing but the entry itself
pub fn validate_shape(entry: &NewJournalEntry) -> Result<(), ValidationError> {
    if entry.debtors.is_empty() || entry.creditors.is_empty() {
        return Err(ValidationError::MissingPostings);
    }

    let mut seen = HashSet::new();
    for (_, posting) in entry.postings() {
        if posting.amount <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount {
                account: posting.account.to_string(),
                amount: posting.amount,
            });
        }
        if !seen.insert(&posting.account) {
            return Err(ValidationError::DuplicateAccount(posting.account.to_string()));
        }
    }

    let debtors = side_total(&entry.debtors)?;
    let creditors = side_total(&entry.creditors)?;
    if debtors != creditors {
        return Err(ValidationError::ImbalancedEntry { debtors, creditors });
    }

    Ok(())
}

fn side_total(postings: &[Posting]) -> Result<Decimal, ValidationError> {
    postings.iter().try_fold(Decimal::ZERO, |total, posting| {
        total.checked_add(posting.amount).ok_or_else(|| {
            ValidationError::AmountOverflow(format!("posting to {}", posting.account))
        })
    })
}

/// Parse a supplied transaction date, defaulting to now
///
/// Accepts RFC 3339 and ISO-8601 timestamps that leave out the seconds,
/// such as `1982-06-24T01:00Z`.
pub fn transaction_date(raw: Option<&str>) -> Result<DateTime<Utc>, ValidationError> {
    match raw {
        Some(raw) => {
            parse_timestamp(raw).ok_or_else(|| ValidationError::MalformedDate(raw.to_string()))
        }
        None => Ok(Utc::now()),
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date.with_timezone(&Utc));
    }
    match raw.strip_suffix('Z') {
        Some(local) => NaiveDateTime::parse_from_str(local, "%Y-%m-%dT%H:%M")
            .ok()
            .map(|date| Utc.from_utc_datetime(&date)),
        None => DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M%:z")
            .ok()
            .map(|date| date.with_timezone(&Utc)),
    }
}
