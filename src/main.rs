//! Standalone demo run of the banking core: wires the ledger store, cache
//! and worker pool from configuration the way the HTTP layer would, and
//! exercises a few money movements.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{error, info};

use corebank::cache::{account_balance_key, MemoryCache};
use corebank::config::AppConfig;
use corebank::ledger::memory::MemoryLedger;
use corebank::ledger::postgres::PgLedger;
use corebank::ledger::{AccountReader, LedgerStore};
use corebank::models::{
    AccountStatus, TransactionKind, TransactionRequest, TransferRequest, SYSTEM_FEE_ACCOUNT_ID,
};
use corebank::transfer::{TransactionService, TransferEngine};
use corebank::worker::WorkerPool;

fn d(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Balance cache per the `cache` config section: `None` when disabled,
/// otherwise an in-process cache carrying the configured TTL.
fn build_cache(config: &AppConfig) -> Option<Arc<MemoryCache>> {
    if !config.cache.enabled {
        return None;
    }
    Some(Arc::new(MemoryCache::with_ttl(Duration::from_secs(
        config.cache.balance_ttl_secs,
    ))))
}

#[tokio::main]
async fn main() {
    // An explicitly requested environment must have a config file; without
    // APP_ENV the dev config is used if present, defaults otherwise.
    let (env, config) = match std::env::var("APP_ENV") {
        Ok(env) => {
            let config = AppConfig::load(&env);
            (env, config)
        }
        Err(_) => ("dev".to_string(), AppConfig::load_or_default("dev")),
    };
    let _guard = corebank::logging::init_logging(&config);

    info!(env = %env, "corebank starting");

    let memory = MemoryLedger::new();
    let (store, accounts): (Arc<dyn LedgerStore>, Arc<dyn AccountReader>) =
        match &config.postgres_url {
            Some(url) => match PgLedger::connect(url).await {
                Ok(pg) => {
                    info!("Ledger store: PostgreSQL");
                    (Arc::new(pg.clone()), Arc::new(pg))
                }
                Err(e) => {
                    error!(error = %e, "Failed to connect to PostgreSQL");
                    return;
                }
            },
            None => {
                info!("Ledger store: in-memory");
                memory.create_account(SYSTEM_FEE_ACCOUNT_ID, "system", d(0), AccountStatus::Active);
                memory.create_account("10000000000001", "alice", d(100_000), AccountStatus::Active);
                memory.create_account("10000000000002", "bob", d(50_000), AccountStatus::Active);
                (Arc::new(memory.clone()), Arc::new(memory.clone()))
            }
        };

    let cache = build_cache(&config);
    if let Some(cache) = &cache {
        cache.set(&account_balance_key("10000000000001"), "1000.00");
        cache.set(&account_balance_key("10000000000002"), "500.00");
    } else {
        info!("Balance cache disabled by config");
    }

    let pool = Arc::new(WorkerPool::new(
        config.worker_pool.workers,
        config.worker_pool.queue_capacity,
        config.worker_pool.max_retries,
    ));
    pool.start();

    let engine = Arc::new(TransferEngine::new(store, SYSTEM_FEE_ACCOUNT_ID));
    let mut service = TransactionService::new(engine, accounts).with_worker_pool(pool.clone());
    if let Some(cache) = cache.clone() {
        service = service.with_cache(cache);
    }
    let service = Arc::new(service);

    // A synchronous transfer: 100.00 at 1% fee.
    match service
        .transfer(
            "alice",
            TransferRequest {
                from_account_id: "10000000000001".to_string(),
                to_account_id: "10000000000002".to_string(),
                amount: d(10_000),
            },
        )
        .await
    {
        Ok(record) => info!(
            transaction_id = %record.id,
            total_debit = %record.total_debit,
            "Transfer completed"
        ),
        Err(e) => error!(error = %e, code = e.code(), "Transfer failed"),
    }

    // A deferred payment created through the worker pool.
    match service.submit_deferred(
        "bob",
        TransactionRequest {
            kind: TransactionKind::Payment,
            from_account_id: "10000000000002".to_string(),
            to_account_id: "10000000000001".to_string(),
            amount: d(2_500),
        },
    ) {
        Ok(job_id) => info!(job_id = %job_id, "Deferred payment enqueued"),
        Err(e) => error!(error = %e, "Deferred payment rejected"),
    }

    // Give the pool a moment to run the side work before draining.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let stats = pool.stats();
    info!(
        submitted = stats.submitted_jobs,
        completed = stats.completed_jobs,
        failed = stats.failed_jobs,
        queued = stats.queued_jobs,
        "Worker pool stats"
    );

    let timeout = Duration::from_secs(config.worker_pool.shutdown_timeout_secs);
    if let Err(e) = pool.shutdown(timeout).await {
        error!(error = %e, "Worker pool shutdown failed");
    }

    if config.postgres_url.is_none() {
        info!(
            alice = %memory.balance("10000000000001").unwrap(),
            bob = %memory.balance("10000000000002").unwrap(),
            fees = %memory.balance(SYSTEM_FEE_ACCOUNT_ID).unwrap(),
            transactions = memory.transactions().len(),
            "Final ledger state"
        );
    }
}
