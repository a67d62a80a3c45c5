//! Ledger and account registry
//!
//! Owns the ledger tree, the accounts and their balances. Accounts point at
//! their ledger by identifier; the registry keeps the reverse indices
//! (ledger → accounts, ledger → sub-ledgers) so nothing holds a live handle
//! to anything else.
//!
//! Balances change only through [`Registry::apply_postings`], which the commit
//! pipeline calls while holding the settlement locks of every account in the
//! batch. A batch lands under the balance gate, so readers see all of its
//! postings or none.

use crate::{
    error::ValidationError,
    types::{
        Account, AccountCommand, AccountId, AccountState, Ledger, LedgerId, LedgerUpdate,
        NewAccount, NewLedger,
    },
    Error, Result,
};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;

/// Ledger/account registry
#[derive(Debug, Default)]
pub struct Registry {
    ledgers: DashMap<LedgerId, Ledger>,
    accounts: DashMap<AccountId, Account>,
    ledger_accounts: DashMap<LedgerId, Vec<AccountId>>,
    sub_ledgers: DashMap<LedgerId, Vec<LedgerId>>,
    // Serializes changes to the ledger tree and its indices
    structure: Mutex<()>,
    // Balance readers share it; posting batches hold it exclusively
    balances: RwLock<()>,
}

impl Registry {
    /// Create empty registry
    pub fn new() -> Self {
        Self::default()
    }

    // Ledger operations

    /// Register a ledger (a sub-ledger when `parent_ledger` is set)
    pub fn create_ledger(&self, request: NewLedger) -> Result<Ledger> {
        let _guard = self.structure.lock();

        if self.ledgers.contains_key(&request.identifier) {
            return Err(Error::Conflict(format!(
                "Ledger {} already exists",
                request.identifier
            )));
        }

        if let Some(parent_id) = &request.parent_ledger {
            let parent_type = self
                .ledgers
                .get(parent_id)
                .map(|parent| parent.account_type)
                .ok_or_else(|| Error::NotFound(format!("Ledger {}", parent_id)))?;

            if parent_type != request.account_type {
                return Err(ValidationError::InvalidType(format!(
                    "sub-ledger {} is {} but parent {} is {}",
                    request.identifier, request.account_type, parent_id, parent_type
                ))
                .into());
            }
        }

        let ledger = Ledger {
            identifier: request.identifier,
            account_type: request.account_type,
            parent_ledger: request.parent_ledger,
            name: request.name,
            description: request.description,
            metadata: request.metadata,
            created_on: Utc::now(),
            last_modified_on: None,
        };

        if let Some(parent_id) = &ledger.parent_ledger {
            self.sub_ledgers
                .entry(parent_id.clone())
                .or_default()
                .push(ledger.identifier.clone());
        }
        self.ledgers.insert(ledger.identifier.clone(), ledger.clone());

        tracing::info!(
            ledger = %ledger.identifier,
            account_type = %ledger.account_type,
            parent = ?ledger.parent_ledger,
            "Ledger created"
        );

        Ok(ledger)
    }

    /// Change name, description or metadata of a ledger
    pub fn update_ledger(&self, id: &LedgerId, update: LedgerUpdate) -> Result<Ledger> {
        let mut ledger = self
            .ledgers
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("Ledger {}", id)))?;

        if let Some(name) = update.name {
            ledger.name = name;
        }
        if let Some(description) = update.description {
            ledger.description = Some(description);
        }
        if let Some(metadata) = update.metadata {
            ledger.metadata = metadata;
        }
        ledger.last_modified_on = Some(Utc::now());

        Ok(ledger.clone())
    }

    /// Remove a ledger that has neither accounts nor sub-ledgers
    pub fn delete_ledger(&self, id: &LedgerId) -> Result<Ledger> {
        let _guard = self.structure.lock();

        if !self.ledgers.contains_key(id) {
            return Err(Error::NotFound(format!("Ledger {}", id)));
        }
        if self.ledger_accounts.get(id).map_or(false, |ids| !ids.is_empty()) {
            return Err(Error::State(format!("Ledger {} still has accounts", id)));
        }
        if self.sub_ledgers.get(id).map_or(false, |ids| !ids.is_empty()) {
            return Err(Error::State(format!("Ledger {} still has sub-ledgers", id)));
        }

        let (_, ledger) = self
            .ledgers
            .remove(id)
            .ok_or_else(|| Error::NotFound(format!("Ledger {}", id)))?;

        if let Some(parent_id) = &ledger.parent_ledger {
            if let Some(mut siblings) = self.sub_ledgers.get_mut(parent_id) {
                siblings.retain(|sibling| sibling != id);
            }
        }
        self.ledger_accounts.remove(id);
        self.sub_ledgers.remove(id);

        tracing::info!(ledger = %id, "Ledger deleted");

        Ok(ledger)
    }

    /// Get ledger by ID
    pub fn find_ledger(&self, id: &LedgerId) -> Result<Ledger> {
        self.ledgers
            .get(id)
            .map(|ledger| ledger.clone())
            .ok_or_else(|| Error::NotFound(format!("Ledger {}", id)))
    }

    /// Root ledgers ordered by identifier
    pub fn fetch_ledgers(&self) -> Vec<Ledger> {
        let mut roots: Vec<Ledger> = self
            .ledgers
            .iter()
            .filter(|ledger| ledger.parent_ledger.is_none())
            .map(|ledger| ledger.clone())
            .collect();
        roots.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        roots
    }

    /// Direct sub-ledgers in creation order
    pub fn fetch_sub_ledgers(&self, id: &LedgerId) -> Result<Vec<Ledger>> {
        if !self.ledgers.contains_key(id) {
            return Err(Error::NotFound(format!("Ledger {}", id)));
        }
        let children = self
            .sub_ledgers
            .get(id)
            .map(|ids| ids.clone())
            .unwrap_or_default();

        Ok(children
            .iter()
            .filter_map(|child| self.ledgers.get(child).map(|ledger| ledger.clone()))
            .collect())
    }

    /// Sum of balances over the ledger's accounts and all descendant ledgers
    pub fn ledger_total(&self, id: &LedgerId) -> Result<Decimal> {
        if !self.ledgers.contains_key(id) {
            return Err(Error::NotFound(format!("Ledger {}", id)));
        }

        let _gate = self.balances.read();
        let mut total = Decimal::ZERO;
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            let account_ids = self
                .ledger_accounts
                .get(&current)
                .map(|ids| ids.clone())
                .unwrap_or_default();
            for account_id in account_ids {
                if let Some(account) = self.accounts.get(&account_id) {
                    total = total.checked_add(account.balance).ok_or_else(|| {
                        ValidationError::AmountOverflow(format!("total of ledger {}", id))
                    })?;
                }
            }
            if let Some(children) = self.sub_ledgers.get(&current) {
                stack.extend(children.iter().cloned());
            }
        }

        Ok(total)
    }

    // Account operations

    /// Register an account under an existing ledger of the same type
    pub fn create_account(&self, request: NewAccount) -> Result<Account> {
        let _guard = self.structure.lock();

        let ledger_type = self
            .ledgers
            .get(&request.ledger)
            .map(|ledger| ledger.account_type)
            .ok_or_else(|| Error::NotFound(format!("Ledger {}", request.ledger)))?;

        if ledger_type != request.account_type {
            return Err(ValidationError::TypeMismatch {
                expected: ledger_type.to_string(),
                actual: request.account_type.to_string(),
            }
            .into());
        }

        let account = match self.accounts.entry(request.identifier.clone()) {
            Entry::Occupied(_) => {
                return Err(Error::Conflict(format!(
                    "Account {} already exists",
                    request.identifier
                )));
            }
            Entry::Vacant(vacant) => {
                let account = Account {
                    identifier: request.identifier,
                    ledger: request.ledger,
                    account_type: request.account_type,
                    name: request.name,
                    holders: request.holders,
                    balance: request.balance,
                    state: AccountState::Open,
                    created_on: Utc::now(),
                };
                vacant.insert(account.clone());
                account
            }
        };

        self.ledger_accounts
            .entry(account.ledger.clone())
            .or_default()
            .push(account.identifier.clone());

        tracing::info!(
            account = %account.identifier,
            ledger = %account.ledger,
            balance = %account.balance,
            "Account created"
        );

        Ok(account)
    }

    /// Get account by ID
    pub fn find_account(&self, id: &AccountId) -> Result<Account> {
        let _gate = self.balances.read();
        self.accounts
            .get(id)
            .map(|account| account.clone())
            .ok_or_else(|| Error::NotFound(format!("Account {}", id)))
    }

    /// Accounts of a ledger in creation order
    pub fn fetch_accounts_of_ledger(&self, id: &LedgerId) -> Result<Vec<Account>> {
        if !self.ledgers.contains_key(id) {
            return Err(Error::NotFound(format!("Ledger {}", id)));
        }
        let account_ids = self
            .ledger_accounts
            .get(id)
            .map(|ids| ids.clone())
            .unwrap_or_default();

        let _gate = self.balances.read();
        Ok(account_ids
            .iter()
            .filter_map(|account_id| self.accounts.get(account_id).map(|a| a.clone()))
            .collect())
    }

    /// Apply a lock/unlock/close/reopen command
    pub fn change_account_state(&self, id: &AccountId, command: AccountCommand) -> Result<Account> {
        let mut account = self
            .accounts
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("Account {}", id)))?;

        let next = command.apply(account.state).ok_or_else(|| {
            Error::State(format!(
                "Cannot {:?} account {} in state {:?}",
                command, id, account.state
            ))
        })?;
        account.state = next;

        tracing::info!(account = %id, ?command, state = ?next, "Account state changed");

        Ok(account.clone())
    }

    /// Add each signed amount to its account's balance, all or nothing
    ///
    /// Every account must be OPEN and appear at most once. Returns the new
    /// balances in batch order. Nothing is written when any account is
    /// missing, not OPEN, or would overflow.
    pub fn apply_postings(&self, postings: &[(AccountId, Decimal)]) -> Result<Vec<Decimal>> {
        let _gate = self.balances.write();

        let mut balances = Vec::with_capacity(postings.len());
        for (id, signed_amount) in postings {
            let account = self
                .accounts
                .get(id)
                .ok_or_else(|| Error::NotFound(format!("Account {}", id)))?;

            if account.state != AccountState::Open {
                return Err(Error::State(format!(
                    "Account {} is {:?}",
                    id, account.state
                )));
            }

            let balance = account.balance.checked_add(*signed_amount).ok_or_else(|| {
                ValidationError::AmountOverflow(format!("balance of account {}", id))
            })?;
            balances.push(balance);
        }

        self.write_balances(postings, &balances);
        Ok(balances)
    }

    /// Undo an applied batch regardless of the accounts' states
    pub(crate) fn revert_postings(&self, postings: &[(AccountId, Decimal)]) -> Result<()> {
        let _gate = self.balances.write();

        let mut balances = Vec::with_capacity(postings.len());
        for (id, signed_amount) in postings {
            let account = self
                .accounts
                .get(id)
                .ok_or_else(|| Error::NotFound(format!("Account {}", id)))?;
            let balance = account.balance.checked_sub(*signed_amount).ok_or_else(|| {
                ValidationError::AmountOverflow(format!("balance of account {}", id))
            })?;
            balances.push(balance);
        }

        self.write_balances(postings, &balances);
        Ok(())
    }

    // Caller holds the balance gate exclusively
    fn write_balances(&self, postings: &[(AccountId, Decimal)], balances: &[Decimal]) {
        for ((id, _), balance) in postings.iter().zip(balances) {
            if let Some(mut account) = self.accounts.get_mut(id) {
                account.balance = *balance;
            }
        }
    }
}
