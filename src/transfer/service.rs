//! Transaction Service
//!
//! Orchestrates one money movement: validates the request against committed
//! account state, computes the fee for the requested kind, delegates to the
//! transfer engine, and schedules non-critical follow-up work (balance cache
//! invalidation) onto the worker pool with a synchronous fallback.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::cache::{account_balance_key, Cache};
use crate::ledger::AccountReader;
use crate::models::{
    PaymentRequest, TransactionKind, TransactionRecord, TransactionRequest, TransferRequest,
};
use crate::money;
use crate::worker::{Job, PoolError, WorkerPool};

use super::engine::TransferEngine;
use super::error::TransferError;

/// Orchestrator for transfers and payments.
pub struct TransactionService {
    engine: Arc<TransferEngine>,
    accounts: Arc<dyn AccountReader>,
    cache: Option<Arc<dyn Cache>>,
    pool: Option<Arc<WorkerPool>>,
}

impl TransactionService {
    pub fn new(engine: Arc<TransferEngine>, accounts: Arc<dyn AccountReader>) -> Self {
        TransactionService {
            engine,
            accounts,
            cache: None,
            pool: None,
        }
    }

    /// Attach a balance cache. Without one, no invalidation work is done.
    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Attach the shared worker pool. Cache invalidation then runs as a
    /// fire-and-forget job, and deferred transaction creation becomes
    /// available. Without a pool, invalidation is always synchronous.
    pub fn with_worker_pool(mut self, pool: Arc<WorkerPool>) -> Self {
        info!("Worker pool attached to transaction service");
        self.pool = Some(pool);
        self
    }

    /// Transfer between two accounts at the 1% fee rate.
    pub async fn transfer(
        &self,
        user_id: &str,
        req: TransferRequest,
    ) -> Result<TransactionRecord, TransferError> {
        self.execute(
            user_id,
            &req.from_account_id,
            &req.to_account_id,
            req.amount,
            TransactionKind::Transfer,
        )
        .await
    }

    /// Pay a counterparty at the 3% fee rate.
    pub async fn payment(
        &self,
        user_id: &str,
        req: PaymentRequest,
    ) -> Result<TransactionRecord, TransferError> {
        self.execute(
            user_id,
            &req.from_account_id,
            &req.to_account_id,
            req.amount,
            TransactionKind::Payment,
        )
        .await
    }

    /// Kind-dispatched entry point used by the deferred creation path.
    pub async fn create_transaction(
        &self,
        user_id: &str,
        req: TransactionRequest,
    ) -> Result<TransactionRecord, TransferError> {
        self.execute(
            user_id,
            &req.from_account_id,
            &req.to_account_id,
            req.amount,
            req.kind,
        )
        .await
    }

    /// Submit a transaction for asynchronous creation through the worker
    /// pool and return the job id. Submission is non-blocking; a full queue
    /// or a missing/stopped pool is surfaced to the caller.
    pub fn submit_deferred(
        self: &Arc<Self>,
        user_id: &str,
        req: TransactionRequest,
    ) -> Result<String, PoolError> {
        let Some(pool) = &self.pool else {
            warn!("Deferred transaction rejected: no worker pool attached");
            return Err(PoolError::Cancelled);
        };

        let job_id = format!("tx-{}-{}", user_id, Utc::now().timestamp_millis());
        let service = Arc::clone(self);
        let user = user_id.to_string();

        let job = Job::new(job_id.clone(), move || {
            let service = Arc::clone(&service);
            let user = user.clone();
            let req = req.clone();
            async move {
                service
                    .create_transaction(&user, req)
                    .await
                    .map(|_| ())
                    .map_err(anyhow::Error::from)
            }
        });

        pool.submit(job)?;
        info!(job_id = %job_id, user_id, "Deferred transaction enqueued");
        Ok(job_id)
    }

    async fn execute(
        &self,
        user_id: &str,
        from_account_id: &str,
        to_account_id: &str,
        amount: Decimal,
        kind: TransactionKind,
    ) -> Result<TransactionRecord, TransferError> {
        info!(
            user_id,
            from = from_account_id,
            to = to_account_id,
            amount = %amount,
            kind = kind.as_str(),
            "Processing money movement"
        );

        self.validate(user_id, from_account_id, to_account_id, amount)
            .await?;

        let fee_percent = kind.fee_percent();
        let fee_amount = money::compute_fee(amount, fee_percent);
        debug!(
            amount = %amount,
            fee_percent,
            fee = %fee_amount,
            total_debit = %(amount + fee_amount),
            "Fee computed"
        );

        let record = self
            .engine
            .execute_transfer(
                from_account_id,
                to_account_id,
                amount,
                fee_amount,
                fee_percent,
                kind,
            )
            .await?;

        self.invalidate_balance_cache(&record).await;

        Ok(record)
    }

    /// Validation against committed state, before the ledger is touched.
    /// The engine re-verifies existence and activity under row locks.
    async fn validate(
        &self,
        user_id: &str,
        from_account_id: &str,
        to_account_id: &str,
        amount: Decimal,
    ) -> Result<(), TransferError> {
        if !money::is_positive(amount) {
            return Err(TransferError::InvalidAmount);
        }

        if from_account_id == to_account_id {
            return Err(TransferError::SelfTransfer);
        }

        let from_account = self
            .accounts
            .account(from_account_id)
            .await?
            .ok_or(TransferError::AccountNotFound)?;

        if from_account.user_id != user_id {
            warn!(
                user_id,
                account = from_account_id,
                "Attempt to debit an account owned by another user"
            );
            return Err(TransferError::Unauthorized);
        }

        if !from_account.is_active() {
            return Err(TransferError::AccountClosed);
        }

        let to_account = self
            .accounts
            .account(to_account_id)
            .await?
            .ok_or(TransferError::AccountNotFound)?;

        if !to_account.is_active() {
            return Err(TransferError::AccountClosed);
        }

        Ok(())
    }

    /// Invalidate the three denormalized balances a transfer touches.
    ///
    /// With a pool attached this is fire-and-forget; if submission fails
    /// (queue full or pool stopped) the deletion runs synchronously in-line
    /// so cache staleness stays bounded even under backpressure. Cache
    /// errors are logged and swallowed, never surfaced to the caller.
    async fn invalidate_balance_cache(&self, record: &TransactionRecord) {
        let Some(cache) = &self.cache else {
            return;
        };

        let keys = vec![
            account_balance_key(&record.from_account_id),
            account_balance_key(&record.to_account_id),
            account_balance_key(&record.fee_account_id),
        ];

        if let Some(pool) = &self.pool {
            let job_cache = Arc::clone(cache);
            let job_keys = keys.clone();
            let job = Job::new(format!("cache-invalidate-{}", record.id), move || {
                let cache = Arc::clone(&job_cache);
                let keys = job_keys.clone();
                async move { cache.delete(&keys).await }
            });

            match pool.submit(job) {
                Ok(()) => {
                    debug!(transaction_id = %record.id, "Cache invalidation enqueued");
                    return;
                }
                Err(e) => {
                    warn!(
                        transaction_id = %record.id,
                        error = %e,
                        "Worker pool rejected cache invalidation, running synchronously"
                    );
                }
            }
        }

        if let Err(e) = cache.delete(&keys).await {
            warn!(error = %e, "Cache invalidation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::ledger::memory::MemoryLedger;
    use crate::models::{AccountStatus, SYSTEM_FEE_ACCOUNT_ID};

    fn d(cents: i64) -> Decimal {
        Decimal::new(cents, 2)
    }

    fn seeded_ledger() -> MemoryLedger {
        let ledger = MemoryLedger::new();
        ledger.create_account(SYSTEM_FEE_ACCOUNT_ID, "system", d(0), AccountStatus::Active);
        ledger.create_account("alice", "u-alice", d(10000), AccountStatus::Active);
        ledger.create_account("bob", "u-bob", d(5000), AccountStatus::Active);
        ledger.create_account("frozen", "u-frozen", d(100), AccountStatus::Closed);
        ledger
    }

    fn service(ledger: &MemoryLedger) -> TransactionService {
        let engine = Arc::new(TransferEngine::new(
            Arc::new(ledger.clone()),
            SYSTEM_FEE_ACCOUNT_ID,
        ));
        TransactionService::new(engine, Arc::new(ledger.clone()))
    }

    fn transfer_req(from: &str, to: &str, amount: Decimal) -> TransferRequest {
        TransferRequest {
            from_account_id: from.to_string(),
            to_account_id: to.to_string(),
            amount,
        }
    }

    #[tokio::test]
    async fn test_transfer_applies_one_percent_fee() {
        let ledger = seeded_ledger();
        let svc = service(&ledger);

        let record = svc
            .transfer("u-alice", transfer_req("alice", "bob", d(5000)))
            .await
            .unwrap();

        assert_eq!(record.fee_percent, 1);
        assert_eq!(record.fee_amount, d(50));
        assert_eq!(record.total_debit, d(5050));
        assert_eq!(ledger.balance("alice"), Some(d(4950)));
    }

    #[tokio::test]
    async fn test_payment_applies_three_percent_fee() {
        let ledger = seeded_ledger();
        let svc = service(&ledger);

        let record = svc
            .payment(
                "u-alice",
                PaymentRequest {
                    from_account_id: "alice".into(),
                    to_account_id: "bob".into(),
                    amount: d(5000),
                },
            )
            .await
            .unwrap();

        assert_eq!(record.fee_percent, 3);
        assert_eq!(record.fee_amount, d(150));
        assert_eq!(ledger.balance("alice"), Some(d(4850)));
    }

    #[tokio::test]
    async fn test_rejects_non_positive_amount_without_touching_ledger() {
        let ledger = seeded_ledger();
        let svc = service(&ledger);

        for amount in [d(0), d(-100)] {
            let err = svc
                .transfer("u-alice", transfer_req("alice", "bob", amount))
                .await
                .unwrap_err();
            assert!(matches!(err, TransferError::InvalidAmount));
        }
        assert!(ledger.transactions().is_empty());
        assert_eq!(ledger.balance("alice"), Some(d(10000)));
    }

    #[tokio::test]
    async fn test_rejects_self_transfer() {
        let ledger = seeded_ledger();
        let svc = service(&ledger);

        let err = svc
            .transfer("u-alice", transfer_req("alice", "alice", d(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::SelfTransfer));
    }

    #[tokio::test]
    async fn test_rejects_foreign_account() {
        let ledger = seeded_ledger();
        let svc = service(&ledger);

        let err = svc
            .transfer("u-bob", transfer_req("alice", "bob", d(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Unauthorized));
    }

    #[tokio::test]
    async fn test_rejects_closed_source_as_closed_in_validation() {
        // Validation still sees the closed row and reports AccountClosed;
        // only the engine's locking query collapses it into not-found.
        let ledger = seeded_ledger();
        let svc = service(&ledger);

        let err = svc
            .transfer("u-frozen", transfer_req("frozen", "bob", d(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::AccountClosed));
    }

    #[tokio::test]
    async fn test_synchronous_cache_invalidation_without_pool() {
        let ledger = seeded_ledger();
        let cache = Arc::new(MemoryCache::new());
        cache.set(&account_balance_key("alice"), "100.00");
        cache.set(&account_balance_key("bob"), "50.00");

        let svc = service(&ledger).with_cache(cache.clone());
        svc.transfer("u-alice", transfer_req("alice", "bob", d(1000)))
            .await
            .unwrap();

        assert!(!cache.contains(&account_balance_key("alice")));
        assert!(!cache.contains(&account_balance_key("bob")));
    }

    #[tokio::test]
    async fn test_create_transaction_dispatches_by_kind() {
        let ledger = seeded_ledger();
        let svc = service(&ledger);

        let record = svc
            .create_transaction(
                "u-alice",
                TransactionRequest {
                    kind: TransactionKind::Payment,
                    from_account_id: "alice".into(),
                    to_account_id: "bob".into(),
                    amount: d(1000),
                },
            )
            .await
            .unwrap();
        assert_eq!(record.kind, TransactionKind::Payment);
        assert_eq!(record.fee_percent, 3);
    }

    #[tokio::test]
    async fn test_submit_deferred_without_pool_is_rejected() {
        let ledger = seeded_ledger();
        let svc = Arc::new(service(&ledger));

        let err = svc
            .submit_deferred(
                "u-alice",
                TransactionRequest {
                    kind: TransactionKind::Transfer,
                    from_account_id: "alice".into(),
                    to_account_id: "bob".into(),
                    amount: d(100),
                },
            )
            .unwrap_err();
        assert_eq!(err, PoolError::Cancelled);
    }
}
