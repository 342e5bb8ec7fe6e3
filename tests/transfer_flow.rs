//! End-to-end money movement: service validation, engine atomicity, cache
//! invalidation through the worker pool, deferred creation.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;

use corebank::cache::{account_balance_key, MemoryCache};
use corebank::ledger::memory::MemoryLedger;
use corebank::models::{
    AccountStatus, PaymentRequest, TransactionKind, TransactionRequest, TransferRequest,
    SYSTEM_FEE_ACCOUNT_ID,
};
use corebank::transfer::{TransactionService, TransferEngine, TransferError};
use corebank::worker::WorkerPool;

fn d(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

fn seeded_ledger() -> MemoryLedger {
    let ledger = MemoryLedger::new();
    ledger.create_account(SYSTEM_FEE_ACCOUNT_ID, "system", d(0), AccountStatus::Active);
    ledger.create_account("alice", "u-alice", d(10000), AccountStatus::Active);
    ledger.create_account("bob", "u-bob", d(5000), AccountStatus::Active);
    ledger
}

fn engine(ledger: &MemoryLedger) -> Arc<TransferEngine> {
    Arc::new(TransferEngine::new(
        Arc::new(ledger.clone()),
        SYSTEM_FEE_ACCOUNT_ID,
    ))
}

fn transfer_req(from: &str, to: &str, amount: Decimal) -> TransferRequest {
    TransferRequest {
        from_account_id: from.to_string(),
        to_account_id: to.to_string(),
        amount,
    }
}

async fn wait_for<F: Fn() -> bool>(check: F, deadline: Duration) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

#[tokio::test]
async fn insufficient_balance_boundary_at_one_percent_fee() {
    let ledger = seeded_ledger();
    let svc = TransactionService::new(engine(&ledger), Arc::new(ledger.clone()));

    // 100.00 + 1.00 fee exceeds the 100.00 balance.
    let err = svc
        .transfer("u-alice", transfer_req("alice", "bob", d(10000)))
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::InsufficientBalance));
    assert_eq!(ledger.balance("alice"), Some(d(10000)));

    // 99.00 + 0.99 fee = 99.99 fits, leaving exactly 0.01.
    let record = svc
        .transfer("u-alice", transfer_req("alice", "bob", d(9900)))
        .await
        .unwrap();
    assert_eq!(record.fee_amount, d(99));
    assert_eq!(record.total_debit, d(9999));
    assert_eq!(ledger.balance("alice"), Some(d(1)));
    assert_eq!(ledger.balance("bob"), Some(d(14900)));
    assert_eq!(ledger.balance(SYSTEM_FEE_ACCOUNT_ID), Some(d(99)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cache_invalidation_runs_through_the_pool() {
    let ledger = seeded_ledger();
    let cache = Arc::new(MemoryCache::new());
    cache.set(&account_balance_key("alice"), "100.00");
    cache.set(&account_balance_key("bob"), "50.00");
    cache.set(&account_balance_key(SYSTEM_FEE_ACCOUNT_ID), "0.00");

    let pool = Arc::new(WorkerPool::new(2, 16, 1));
    pool.start();

    let svc = TransactionService::new(engine(&ledger), Arc::new(ledger.clone()))
        .with_cache(cache.clone())
        .with_worker_pool(pool.clone());

    svc.transfer("u-alice", transfer_req("alice", "bob", d(1000)))
        .await
        .unwrap();

    // The invalidation job is fire-and-forget; wait for the pool to run it.
    let cleared = wait_for(
        || {
            !cache.contains(&account_balance_key("alice"))
                && !cache.contains(&account_balance_key("bob"))
                && !cache.contains(&account_balance_key(SYSTEM_FEE_ACCOUNT_ID))
        },
        Duration::from_secs(2),
    )
    .await;
    assert!(cleared, "balance keys were not invalidated");

    pool.shutdown(Duration::from_secs(1)).await.unwrap();
    assert_eq!(pool.stats().completed_jobs, 1);
}

#[tokio::test]
async fn cache_invalidation_falls_back_to_synchronous_on_rejected_submission() {
    let ledger = seeded_ledger();
    let cache = Arc::new(MemoryCache::new());
    cache.set(&account_balance_key("alice"), "100.00");
    cache.set(&account_balance_key("bob"), "50.00");

    // A pool that was never started rejects every submission, which must
    // push the service onto the synchronous path.
    let pool = Arc::new(WorkerPool::new(1, 1, 0));

    let svc = TransactionService::new(engine(&ledger), Arc::new(ledger.clone()))
        .with_cache(cache.clone())
        .with_worker_pool(pool);

    svc.transfer("u-alice", transfer_req("alice", "bob", d(1000)))
        .await
        .unwrap();

    // Fallback ran in-line, so the keys are gone already.
    assert!(!cache.contains(&account_balance_key("alice")));
    assert!(!cache.contains(&account_balance_key("bob")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn deferred_transaction_is_created_by_the_pool() {
    let ledger = seeded_ledger();
    let pool = Arc::new(WorkerPool::new(2, 16, 1));
    pool.start();

    let svc = Arc::new(
        TransactionService::new(engine(&ledger), Arc::new(ledger.clone()))
            .with_worker_pool(pool.clone()),
    );

    let job_id = svc
        .submit_deferred(
            "u-bob",
            TransactionRequest {
                kind: TransactionKind::Payment,
                from_account_id: "bob".to_string(),
                to_account_id: "alice".to_string(),
                amount: d(2000),
            },
        )
        .unwrap();
    assert!(job_id.starts_with("tx-u-bob-"));

    let created = wait_for(|| ledger.transactions().len() == 1, Duration::from_secs(2)).await;
    assert!(created, "deferred transaction never committed");

    // 20.00 at 3% fee: 20.60 debited from bob.
    assert_eq!(ledger.balance("bob"), Some(d(2940)));
    assert_eq!(ledger.balance("alice"), Some(d(12000)));
    assert_eq!(ledger.balance(SYSTEM_FEE_ACCOUNT_ID), Some(d(60)));

    pool.shutdown(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn conservation_holds_under_concurrent_mixed_load() {
    let ledger = seeded_ledger();
    ledger.create_account("carol", "u-carol", d(20000), AccountStatus::Active);

    let svc = Arc::new(TransactionService::new(
        engine(&ledger),
        Arc::new(ledger.clone()),
    ));

    let total_before = ledger.balance("alice").unwrap()
        + ledger.balance("bob").unwrap()
        + ledger.balance("carol").unwrap()
        + ledger.balance(SYSTEM_FEE_ACCOUNT_ID).unwrap();

    let mut handles = Vec::new();
    for i in 0..4 {
        let svc_transfer = svc.clone();
        handles.push(tokio::spawn(async move {
            svc_transfer
                .transfer("u-alice", transfer_req("alice", "bob", d(500 + i)))
                .await
        }));
        let svc = svc.clone();
        handles.push(tokio::spawn(async move {
            svc.payment(
                "u-carol",
                PaymentRequest {
                    from_account_id: "carol".to_string(),
                    to_account_id: "alice".to_string(),
                    amount: d(700 + i),
                },
            )
            .await
        }));
    }

    let mut committed = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            committed += 1;
        }
    }
    assert_eq!(committed, 8, "all transfers had sufficient balance");

    let total_after = ledger.balance("alice").unwrap()
        + ledger.balance("bob").unwrap()
        + ledger.balance("carol").unwrap()
        + ledger.balance(SYSTEM_FEE_ACCOUNT_ID).unwrap();
    assert_eq!(total_before, total_after);
    assert_eq!(ledger.transactions().len(), 8);
}
