//! In-memory Ledger Store
//!
//! Per-account row locks (`tokio::sync::Mutex`, held as owned guards by the
//! open transaction) plus staged writes applied to shared state on commit.
//! Behaves like the Postgres store from the engine's point of view:
//! concurrent transfers on disjoint account pairs run in parallel, transfers
//! touching the same row serialize on the row lock, and nothing staged is
//! visible before commit.
//!
//! Postgres breaks lock-order deadlocks with deadlock detection; here a
//! bounded lock wait fails the transaction with [`StoreError::LockTimeout`]
//! instead.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::models::{Account, AccountStatus, TransactionRecord};

use super::{AccountReader, LedgerStore, LedgerTx, StoreError};

const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(5);

struct MemoryInner {
    accounts: DashMap<String, Account>,
    row_locks: DashMap<String, Arc<Mutex<()>>>,
    transactions: StdMutex<Vec<TransactionRecord>>,
    lock_wait: Duration,
}

/// In-process ledger store.
#[derive(Clone)]
pub struct MemoryLedger {
    inner: Arc<MemoryInner>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::with_lock_wait(DEFAULT_LOCK_WAIT)
    }

    /// Override the row-lock wait bound (tests use short waits).
    pub fn with_lock_wait(lock_wait: Duration) -> Self {
        MemoryLedger {
            inner: Arc::new(MemoryInner {
                accounts: DashMap::new(),
                row_locks: DashMap::new(),
                transactions: StdMutex::new(Vec::new()),
                lock_wait,
            }),
        }
    }

    /// Seed an account row. Replaces any existing row with the same id.
    pub fn create_account(&self, id: &str, user_id: &str, balance: Decimal, status: AccountStatus) {
        self.inner.accounts.insert(
            id.to_string(),
            Account {
                id: id.to_string(),
                user_id: user_id.to_string(),
                balance,
                status,
                created_at: Utc::now(),
            },
        );
    }

    /// Committed balance of an account, if it exists.
    pub fn balance(&self, account_id: &str) -> Option<Decimal> {
        self.inner.accounts.get(account_id).map(|a| a.balance)
    }

    /// Snapshot of the committed transaction log, in commit order.
    pub fn transactions(&self) -> Vec<TransactionRecord> {
        self.inner.transactions.lock().unwrap().clone()
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

struct MemoryTx {
    inner: Arc<MemoryInner>,
    guards: HashMap<String, OwnedMutexGuard<()>>,
    staged_deltas: Vec<(String, Decimal)>,
    staged_records: Vec<TransactionRecord>,
}

impl MemoryTx {
    /// Acquire the row lock for an account, bounded by the configured wait.
    /// Re-locking a row already held by this transaction is a no-op.
    async fn lock_row(&mut self, account_id: &str) -> Result<(), StoreError> {
        if self.guards.contains_key(account_id) {
            return Ok(());
        }

        let lock = self
            .inner
            .row_locks
            .entry(account_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();

        let guard = tokio::time::timeout(self.inner.lock_wait, lock.lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout(account_id.to_string()))?;

        self.guards.insert(account_id.to_string(), guard);
        Ok(())
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn lock_active_balance(
        &mut self,
        account_id: &str,
    ) -> Result<Option<Decimal>, StoreError> {
        self.lock_row(account_id).await?;

        // Active-only filter: a closed row reads the same as a missing one.
        Ok(self.inner.accounts.get(account_id).and_then(|a| {
            if a.status == AccountStatus::Active {
                Some(a.balance)
            } else {
                None
            }
        }))
    }

    async fn lock_account_status(
        &mut self,
        account_id: &str,
    ) -> Result<Option<AccountStatus>, StoreError> {
        self.lock_row(account_id).await?;
        Ok(self.inner.accounts.get(account_id).map(|a| a.status))
    }

    async fn apply_balance_delta(
        &mut self,
        account_id: &str,
        delta: Decimal,
    ) -> Result<(), StoreError> {
        if !self.inner.accounts.contains_key(account_id) {
            return Err(StoreError::Backend(format!(
                "account {} does not exist",
                account_id
            )));
        }
        self.staged_deltas.push((account_id.to_string(), delta));
        Ok(())
    }

    async fn insert_transaction(&mut self, record: &TransactionRecord) -> Result<(), StoreError> {
        self.staged_records.push(record.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        for (account_id, delta) in &self.staged_deltas {
            let mut account = self.inner.accounts.get_mut(account_id).ok_or_else(|| {
                StoreError::Commit(format!("account {} vanished before commit", account_id))
            })?;
            account.balance += *delta;
        }

        if !self.staged_records.is_empty() {
            let mut log = self.inner.transactions.lock().unwrap();
            log.extend(self.staged_records.iter().cloned());
        }

        // Guards drop here, releasing the row locks.
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        // Staged work is discarded and guards drop with self.
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError> {
        Ok(Box::new(MemoryTx {
            inner: self.inner.clone(),
            guards: HashMap::new(),
            staged_deltas: Vec::new(),
            staged_records: Vec::new(),
        }))
    }
}

#[async_trait]
impl AccountReader for MemoryLedger {
    async fn account(&self, account_id: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.inner.accounts.get(account_id).map(|a| a.value().clone()))
    }
}
