//! PostgreSQL Ledger Store
//!
//! Row locks come from `SELECT ... FOR UPDATE` inside one database
//! transaction; balance updates are relative (`balance = balance + $1`) so
//! the database is the single arbiter of the final amounts. The source-side
//! lock query filters on `status = 'active'`, which reports a closed source
//! account as not found; see [`LedgerTx::lock_active_balance`].

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::models::{Account, AccountStatus, TransactionRecord};

use super::{AccountReader, LedgerStore, LedgerTx, StoreError};

/// Postgres-backed ledger store.
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        PgLedger { pool }
    }

    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(PgLedger { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgTx {
    async fn lock_active_balance(
        &mut self,
        account_id: &str,
    ) -> Result<Option<Decimal>, StoreError> {
        let balance = sqlx::query_scalar::<_, Decimal>(
            "SELECT balance FROM accounts WHERE id = $1 AND status = 'active' FOR UPDATE",
        )
        .bind(account_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(balance)
    }

    async fn lock_account_status(
        &mut self,
        account_id: &str,
    ) -> Result<Option<AccountStatus>, StoreError> {
        let status = sqlx::query_scalar::<_, String>(
            "SELECT status FROM accounts WHERE id = $1 FOR UPDATE",
        )
        .bind(account_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        match status {
            None => Ok(None),
            Some(s) => AccountStatus::parse(&s)
                .map(Some)
                .ok_or_else(|| StoreError::Backend(format!("unknown account status: {}", s))),
        }
    }

    async fn apply_balance_delta(
        &mut self,
        account_id: &str,
        delta: Decimal,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE accounts SET balance = balance + $1 WHERE id = $2")
            .bind(delta)
            .bind(account_id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Backend(format!(
                "account {} does not exist",
                account_id
            )));
        }

        Ok(())
    }

    async fn insert_transaction(&mut self, record: &TransactionRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, type, from_account_id, to_account_id,
                amount, fee_percent, fee_amount, total_debit,
                fee_account_id, status, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&record.id)
        .bind(record.kind.as_str())
        .bind(&record.from_account_id)
        .bind(&record.to_account_id)
        .bind(record.amount)
        .bind(record.fee_percent as i32)
        .bind(record.fee_amount)
        .bind(record.total_debit)
        .bind(&record.fee_account_id)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| StoreError::Commit(e.to_string()))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgLedger {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }
}

#[async_trait]
impl AccountReader for PgLedger {
    async fn account(&self, account_id: &str) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(
            "SELECT id, user_id, balance, status, created_at FROM accounts WHERE id = $1",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            None => Ok(None),
            Some(row) => {
                let status_str: String = row.get("status");
                let status = AccountStatus::parse(&status_str).ok_or_else(|| {
                    StoreError::Backend(format!("unknown account status: {}", status_str))
                })?;

                Ok(Some(Account {
                    id: row.get("id"),
                    user_id: row.get("user_id"),
                    balance: row.get("balance"),
                    status,
                    created_at: row.get("created_at"),
                }))
            }
        }
    }
}
