//! corebank - Banking backend core
//!
//! Atomic fee-bearing ledger transfers plus an asynchronous job engine for
//! off-request side work.
//!
//! # Modules
//!
//! - [`models`] - Accounts, transaction records, request shapes
//! - [`money`] - Fixed-precision currency math and fee computation
//! - [`ledger`] - Transactional store seam (Postgres and in-memory)
//! - [`transfer`] - Transfer engine and transaction service
//! - [`worker`] - Bounded worker pool with retry and backpressure
//! - [`cache`] - Best-effort balance cache seam
//! - [`config`] - YAML application configuration
//! - [`logging`] - tracing subscriber setup

pub mod cache;
pub mod config;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod money;
pub mod transfer;
pub mod worker;

// Convenient re-exports at crate root
pub use cache::{Cache, MemoryCache};
pub use config::AppConfig;
pub use ledger::memory::MemoryLedger;
pub use ledger::postgres::PgLedger;
pub use ledger::{AccountReader, LedgerStore, LedgerTx, StoreError};
pub use models::{
    Account, AccountStatus, TransactionKind, TransactionRecord, TransactionStatus,
    SYSTEM_FEE_ACCOUNT_ID,
};
pub use transfer::{TransactionService, TransferEngine, TransferError};
pub use worker::{Job, JobOutcome, PoolError, PoolStats, WorkerPool};
