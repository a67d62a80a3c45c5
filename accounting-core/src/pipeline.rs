//! Commit pipeline
//!
//! Settles PENDING journal entries on a pool of worker tasks:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │              PipelineHandle (Clone)                   │
//! │        enqueue(transaction id) after validation       │
//! └─────────────────────┬────────────────────────────────┘
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │     Worker 1   │   Worker 2   │  ...  │   Worker N    │
//! │  lock accounts (sorted) → apply postings →            │
//! │  append account entries → PROCESSED | REJECTED        │
//! └─────────────────────┬────────────────────────────────┘
//!                       │ entry-released
//!                       ▼
//!                   Publisher
//! ```
//!
//! Entries sharing an account are serialized by the account locks; disjoint
//! entries settle in parallel. Lock contention is retried with backoff and,
//! once the attempts run out, the entry is re-queued and stays PENDING.

use crate::{
    config::PipelineConfig,
    history::AccountEntryLedger,
    journal::JournalStore,
    locks::AccountLocks,
    metrics::Metrics,
    registry::Registry,
    types::{AccountEntry, AccountId, JournalEntry, JournalEntryState},
    Error, Result,
};
use accounting_bus::{EventKind, Notification, Publisher};
use parking_lot::Mutex as SyncMutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

/// Message sent to the settlement workers
#[derive(Debug)]
pub enum SettlementMessage {
    /// Settle a PENDING journal entry
    Settle {
        /// Entry to settle
        transaction_identifier: String,
    },

    /// Stop one worker
    Shutdown,
}

/// Result of one settle call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// Entry reached a terminal state
    Resolved(JournalEntryState),

    /// Entry was no longer PENDING
    Skipped,

    /// Account locks stayed contended; entry is still PENDING
    Deferred,
}

/// Settlement logic shared by every worker
#[derive(Debug)]
pub struct Settlement {
    registry: Arc<Registry>,
    journal: Arc<JournalStore>,
    history: Arc<AccountEntryLedger>,
    locks: Arc<AccountLocks>,
    publisher: Publisher,
    metrics: Metrics,
    config: PipelineConfig,
}

impl Settlement {
    /// Create settlement over the shared stores
    pub fn new(
        registry: Arc<Registry>,
        journal: Arc<JournalStore>,
        history: Arc<AccountEntryLedger>,
        locks: Arc<AccountLocks>,
        publisher: Publisher,
        metrics: Metrics,
        config: PipelineConfig,
    ) -> Self {
        Self {
            registry,
            journal,
            history,
            locks,
            publisher,
            metrics,
            config,
        }
    }

    /// Settle one journal entry
    ///
    /// Safe to call more than once for the same entry: anything no longer
    /// PENDING is skipped.
    pub async fn settle(&self, transaction_identifier: &str) -> Result<SettleOutcome> {
        let entry = self.journal.get(transaction_identifier)?;
        if entry.state != JournalEntryState::Pending {
            return Ok(SettleOutcome::Skipped);
        }

        let accounts: Vec<AccountId> = entry
            .postings()
            .map(|(_, posting)| posting.account.clone())
            .collect();

        let mut backoff = self.config.retry_backoff();
        let mut attempt = 1;
        let _guards = loop {
            match self.locks.acquire(&accounts, self.config.lock_timeout()).await {
                Ok(guards) => break guards,
                Err(e) if e.is_transient() && attempt < self.config.max_settle_attempts => {
                    tracing::warn!(
                        transaction = %transaction_identifier,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "Settle attempt failed: {}",
                        e
                    );
                    self.metrics.record_retry();
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.config.lock_timeout());
                    attempt += 1;
                }
                Err(e) if e.is_transient() => {
                    self.metrics.record_retry();
                    tracing::warn!(
                        transaction = %transaction_identifier,
                        attempts = attempt,
                        "Account locks still contended, deferring entry"
                    );
                    return Ok(SettleOutcome::Deferred);
                }
                Err(e) => return Err(e),
            }
        };

        // Another worker may have resolved it while we waited
        let entry = self.journal.get(transaction_identifier)?;
        if entry.state != JournalEntryState::Pending {
            return Ok(SettleOutcome::Skipped);
        }

        let started = Instant::now();
        let (state, reason) = match self.apply(&entry) {
            Ok(()) => (JournalEntryState::Processed, None),
            Err(e) => {
                tracing::warn!(
                    transaction = %transaction_identifier,
                    "Journal entry rejected during settlement: {}",
                    e
                );
                (JournalEntryState::Rejected, Some(e.to_string()))
            }
        };
        let resolved = self.journal.resolve(transaction_identifier, state, reason)?;

        let elapsed = started.elapsed().as_secs_f64();
        match resolved.state {
            JournalEntryState::Processed => self.metrics.record_processed(elapsed),
            _ => self.metrics.record_rejected(elapsed),
        }

        tracing::info!(
            transaction = %transaction_identifier,
            state = %resolved.state,
            postings = accounts.len(),
            "Journal entry released"
        );
        self.publisher.publish_detached(released_notification(&resolved));

        Ok(SettleOutcome::Resolved(resolved.state))
    }

    /// Apply every posting and record the account entries, or nothing
    fn apply(&self, entry: &JournalEntry) -> Result<()> {
        let mut batch: Vec<(AccountId, Decimal)> =
            Vec::with_capacity(entry.debtors.len() + entry.creditors.len());
        for (side, posting) in entry.postings() {
            let account = self.registry.find_account(&posting.account)?;
            batch.push((
                posting.account.clone(),
                account.account_type.balance_effect(side, posting.amount),
            ));
        }

        let balances = self.registry.apply_postings(&batch)?;
        let rows = entry
            .postings()
            .zip(balances)
            .map(|((side, posting), balance)| AccountEntry {
                account: posting.account.clone(),
                transaction_identifier: entry.transaction_identifier.clone(),
                entry_type: side,
                message: entry.message.clone(),
                amount: posting.amount,
                balance,
                transaction_date: entry.transaction_date,
            })
            .collect();

        if let Err(e) = self.history.append(rows) {
            if let Err(revert) = self.registry.revert_postings(&batch) {
                tracing::error!(
                    transaction = %entry.transaction_identifier,
                    "Failed to roll back postings: {}",
                    revert
                );
            }
            return Err(e);
        }

        Ok(())
    }
}

fn released_notification(entry: &JournalEntry) -> Notification {
    Notification::new(EventKind::EntryReleased, entry.transaction_identifier.clone()).with_payload(
        serde_json::json!({
            "transactionIdentifier": entry.transaction_identifier,
            "state": entry.state.to_string(),
            "reason": entry.rejection_reason,
        }),
    )
}

/// Worker loop: pull from the shared queue until told to stop
async fn run_worker(
    id: usize,
    settlement: Arc<Settlement>,
    mailbox: Arc<Mutex<mpsc::Receiver<SettlementMessage>>>,
    requeue: mpsc::Sender<SettlementMessage>,
    retry_delay: Duration,
) {
    tracing::debug!(worker = id, "Settlement worker started");

    loop {
        let message = {
            let mut mailbox = mailbox.lock().await;
            mailbox.recv().await
        };

        match message {
            Some(SettlementMessage::Settle {
                transaction_identifier,
            }) => match settlement.settle(&transaction_identifier).await {
                Ok(SettleOutcome::Deferred) => {
                    let requeue = requeue.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(retry_delay).await;
                        let message = SettlementMessage::Settle {
                            transaction_identifier: transaction_identifier.clone(),
                        };
                        if requeue.send(message).await.is_err() {
                            tracing::warn!(
                                transaction = %transaction_identifier,
                                "Pipeline stopped, entry stays PENDING"
                            );
                        }
                    });
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(
                        worker = id,
                        transaction = %transaction_identifier,
                        "Error settling journal entry: {}",
                        e
                    );
                }
            },
            Some(SettlementMessage::Shutdown) | None => break,
        }
    }

    tracing::debug!(worker = id, "Settlement worker stopped");
}

/// Handle for feeding the settlement workers
#[derive(Clone, Debug)]
pub struct PipelineHandle {
    sender: mpsc::Sender<SettlementMessage>,
    workers: Arc<SyncMutex<Vec<JoinHandle<()>>>>,
}

impl PipelineHandle {
    /// Queue a PENDING entry for settlement; waits while the queue is full
    pub async fn enqueue(&self, transaction_identifier: impl Into<String>) -> Result<()> {
        self.sender
            .send(SettlementMessage::Settle {
                transaction_identifier: transaction_identifier.into(),
            })
            .await
            .map_err(|_| Error::Concurrency("Pipeline mailbox closed".to_string()))
    }

    /// Stop the workers after they drain what is already queued
    pub async fn shutdown(&self) -> Result<()> {
        let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        for _ in 0..workers.len() {
            self.sender
                .send(SettlementMessage::Shutdown)
                .await
                .map_err(|_| Error::Concurrency("Pipeline mailbox closed".to_string()))?;
        }
        for worker in workers {
            worker
                .await
                .map_err(|e| Error::Concurrency(format!("Settlement worker failed: {}", e)))?;
        }
        Ok(())
    }
}

/// Spawn the settlement workers
pub fn spawn_commit_pipeline(settlement: Arc<Settlement>, config: &PipelineConfig) -> PipelineHandle {
    let (tx, rx) = mpsc::channel(config.queue_capacity); // Bounded channel for backpressure
    let mailbox = Arc::new(Mutex::new(rx));

    let workers = (0..config.workers)
        .map(|id| {
            tokio::spawn(run_worker(
                id,
                settlement.clone(),
                mailbox.clone(),
                tx.clone(),
                config.lock_timeout(),
            ))
        })
        .collect();

    tracing::info!(workers = config.workers, "Commit pipeline started");

    PipelineHandle {
        sender: tx,
        workers: Arc::new(SyncMutex::new(workers)),
    }
}
