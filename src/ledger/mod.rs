//! Ledger Store seam
//!
//! The transactional store holding account rows and the append-only
//! transaction log. Exposed as narrow trait contracts so the transfer engine
//! stays independent of the backing store: [`postgres::PgLedger`] for
//! production, [`memory::MemoryLedger`] for tests and single-node use.
//!
//! Row locks are scoped to the enclosing transaction: they release
//! automatically on commit or rollback, there is no manual unlock path.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{Account, AccountStatus, TransactionRecord};

/// Ledger I/O failure. Always terminal for the enclosing transfer.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("ledger backend error: {0}")]
    Backend(String),

    /// The row-lock wait was abandoned. Stands in for the backend's
    /// deadlock detection in the in-memory implementation.
    #[error("row lock wait timed out for account {0}")]
    LockTimeout(String),

    #[error("commit failed: {0}")]
    Commit(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// One open, exclusively owned unit of atomic work against the ledger.
///
/// All reads and writes made through a `LedgerTx` become visible atomically
/// on [`commit`](LedgerTx::commit) and vanish on
/// [`rollback`](LedgerTx::rollback).
#[async_trait]
pub trait LedgerTx: Send {
    /// Lock the row for an *active* account and return its balance.
    ///
    /// Returns `None` for a missing row. The active-status filter is part of
    /// the query, so a closed account is also reported as `None`: the
    /// source-side lock deliberately collapses "closed" into "not found",
    /// while the destination check goes through
    /// [`lock_account_status`](LedgerTx::lock_account_status) and can
    /// distinguish the two.
    async fn lock_active_balance(&mut self, account_id: &str) -> Result<Option<Decimal>, StoreError>;

    /// Lock the row for an account regardless of status and return the status.
    async fn lock_account_status(
        &mut self,
        account_id: &str,
    ) -> Result<Option<AccountStatus>, StoreError>;

    /// Apply a signed balance delta to an account row.
    async fn apply_balance_delta(
        &mut self,
        account_id: &str,
        delta: Decimal,
    ) -> Result<(), StoreError>;

    /// Append one immutable transaction record.
    async fn insert_transaction(&mut self, record: &TransactionRecord) -> Result<(), StoreError>;

    /// Make all staged work visible atomically and release row locks.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discard all staged work and release row locks.
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Factory for ledger transactions.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError>;
}

/// Plain committed-state account lookup, used by request validation.
/// Validation reads are advisory: the transfer engine re-verifies under
/// row locks.
#[async_trait]
pub trait AccountReader: Send + Sync {
    async fn account(&self, account_id: &str) -> Result<Option<Account>, StoreError>;
}
