//! Per-account settlement locks
//!
//! Entries touching the same account are serialized here; entries over
//! disjoint accounts never contend. Locks are always taken in account
//! identifier order so two entries cannot deadlock each other.

use crate::{types::AccountId, Error, Result};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::{timeout_at, Duration, Instant};

/// Guards held for the duration of one settlement
pub type AccountGuards = Vec<OwnedMutexGuard<()>>;

/// Lock table keyed by account
#[derive(Debug, Default)]
pub struct AccountLocks {
    locks: DashMap<AccountId, Arc<Mutex<()>>>,
}

impl AccountLocks {
    /// Create empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, account: &AccountId) -> Arc<Mutex<()>> {
        self.locks
            .entry(account.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire the locks of every listed account within `wait`
    ///
    /// Duplicates are collapsed. On timeout every lock taken so far is
    /// released and a transient `Concurrency` error is returned.
    pub async fn acquire(&self, accounts: &[AccountId], wait: Duration) -> Result<AccountGuards> {
        let mut ordered: Vec<&AccountId> = accounts.iter().collect();
        ordered.sort();
        ordered.dedup();

        let deadline = Instant::now() + wait;
        let mut guards = Vec::with_capacity(ordered.len());
        for account in ordered {
            let lock = self.lock_for(account);
            match timeout_at(deadline, lock.lock_owned()).await {
                Ok(guard) => guards.push(guard),
                Err(_) => {
                    return Err(Error::Concurrency(format!(
                        "Timed out waiting for lock on account {}",
                        account
                    )))
                }
            }
        }

        Ok(guards)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disjoint_accounts_do_not_contend() {
        let locks = AccountLocks::new();
        let _a = locks
            .acquire(&[AccountId::new("a")], Duration::from_millis(50))
            .await
            .unwrap();
        let b = locks
            .acquire(&[AccountId::new("b")], Duration::from_millis(50))
            .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_held_account_times_out() {
        let locks = AccountLocks::new();
        let held = locks
            .acquire(&[AccountId::new("a")], Duration::from_millis(50))
            .await
            .unwrap();

        let result = locks
            .acquire(
                &[AccountId::new("b"), AccountId::new("a")],
                Duration::from_millis(20),
            )
            .await;
        assert!(matches!(result, Err(Error::Concurrency(_))));

        // b was released along with the failed attempt
        drop(held);
        let both = locks
            .acquire(
                &[AccountId::new("a"), AccountId::new("b"), AccountId::new("a")],
                Duration::from_millis(50),
            )
            .await
            .unwrap();
        assert_eq!(both.len(), 2);
    }
}
