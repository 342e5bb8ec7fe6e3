//! Transfer Engine
//!
//! Executes the double-entry, fee-bearing movement of funds between two
//! accounts plus the system fee account, inside one atomic ledger
//! transaction. Every failure path rolls back before returning: no caller
//! ever observes a half-applied transfer.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::ledger::{LedgerStore, LedgerTx};
use crate::models::{AccountStatus, TransactionKind, TransactionRecord, TransactionStatus};

use super::error::TransferError;

/// Atomic fee-bearing transfer executor.
///
/// Preconditions (amount > 0, distinct accounts, caller authorization) are
/// validated by the orchestrator; the engine still re-verifies account
/// existence and activity under row locks, defending against races with the
/// orchestrator's earlier reads.
pub struct TransferEngine {
    store: Arc<dyn LedgerStore>,
    fee_account_id: String,
}

impl TransferEngine {
    pub fn new(store: Arc<dyn LedgerStore>, fee_account_id: impl Into<String>) -> Self {
        TransferEngine {
            store,
            fee_account_id: fee_account_id.into(),
        }
    }

    pub fn fee_account_id(&self) -> &str {
        &self.fee_account_id
    }

    /// Execute one transfer: debit `amount + fee_amount` from the source,
    /// credit `amount` to the destination and `fee_amount` to the fee
    /// account, and append the completed transaction record.
    ///
    /// Fee math is the caller's concern; `fee_amount` and `fee_percent`
    /// arrive precomputed per transaction kind.
    pub async fn execute_transfer(
        &self,
        from_account_id: &str,
        to_account_id: &str,
        amount: Decimal,
        fee_amount: Decimal,
        fee_percent: u32,
        kind: TransactionKind,
    ) -> Result<TransactionRecord, TransferError> {
        let mut tx = self.store.begin().await.map_err(TransferError::Store)?;

        match self
            .transfer_in_tx(
                tx.as_mut(),
                from_account_id,
                to_account_id,
                amount,
                fee_amount,
                fee_percent,
                kind,
            )
            .await
        {
            Ok(record) => {
                tx.commit().await.map_err(TransferError::Store)?;
                info!(
                    transaction_id = %record.id,
                    kind = kind.as_str(),
                    from = from_account_id,
                    to = to_account_id,
                    amount = %amount,
                    fee = %fee_amount,
                    "Transfer committed"
                );
                Ok(record)
            }
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    warn!(error = %rb, "Rollback after failed transfer also failed");
                }
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn transfer_in_tx(
        &self,
        tx: &mut dyn LedgerTx,
        from_account_id: &str,
        to_account_id: &str,
        amount: Decimal,
        fee_amount: Decimal,
        fee_percent: u32,
        kind: TransactionKind,
    ) -> Result<TransactionRecord, TransferError> {
        let total_debit = amount + fee_amount;

        // Lock the source row first, destination second. The fixed order
        // keeps opposing transfers on the same ordered pair serialized.
        // A closed source account reads as not found here; the asymmetry
        // with the destination check is deliberate (see LedgerTx docs).
        let from_balance = tx
            .lock_active_balance(from_account_id)
            .await?
            .ok_or(TransferError::AccountNotFound)?;

        if from_balance < total_debit {
            return Err(TransferError::InsufficientBalance);
        }

        let to_status = tx
            .lock_account_status(to_account_id)
            .await?
            .ok_or(TransferError::AccountNotFound)?;

        if to_status != AccountStatus::Active {
            return Err(TransferError::AccountClosed);
        }

        // Fixed mutation order: debit source, credit destination, credit fee.
        tx.apply_balance_delta(from_account_id, -total_debit).await?;
        tx.apply_balance_delta(to_account_id, amount).await?;
        tx.apply_balance_delta(&self.fee_account_id, fee_amount)
            .await?;

        let record = TransactionRecord {
            id: Uuid::new_v4().to_string(),
            kind,
            from_account_id: from_account_id.to_string(),
            to_account_id: to_account_id.to_string(),
            amount,
            fee_percent,
            fee_amount,
            total_debit,
            fee_account_id: self.fee_account_id.clone(),
            status: TransactionStatus::Completed,
            created_at: Utc::now(),
        };

        tx.insert_transaction(&record).await?;

        Ok(record)
    }
}
