//! Core domain types: accounts, ledger transactions, API request shapes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fixed system account that accumulates all fee revenue.
pub const SYSTEM_FEE_ACCOUNT_ID: &str = "00000000000001";

/// Account lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Closed,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(AccountStatus::Active),
            "closed" => Some(AccountStatus::Closed),
            _ => None,
        }
    }
}

/// A ledger account row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub user_id: String,
    /// Currency amount with 2-digit scale. Only mutated under a row lock.
    pub balance: Decimal,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// Kind of money movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Transfer,
    Payment,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Transfer => "transfer",
            TransactionKind::Payment => "payment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "transfer" => Some(TransactionKind::Transfer),
            "payment" => Some(TransactionKind::Payment),
            _ => None,
        }
    }

    /// Fee schedule: transfers carry 1%, payments 3%.
    pub fn fee_percent(&self) -> u32 {
        match self {
            TransactionKind::Transfer => 1,
            TransactionKind::Payment => 3,
        }
    }
}

/// Transaction status. The engine never persists a transaction that did not
/// fully commit, so there is no partial or pending state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Completed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Completed => "completed",
        }
    }
}

/// Immutable ledger entry for one executed transfer or payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub kind: TransactionKind,
    pub from_account_id: String,
    pub to_account_id: String,
    /// Principal amount, excluding fee.
    pub amount: Decimal,
    pub fee_percent: u32,
    pub fee_amount: Decimal,
    /// Principal + fee, the amount removed from the source account.
    pub total_debit: Decimal,
    pub fee_account_id: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

/// Request to move funds between two accounts at the transfer fee rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from_account_id: String,
    pub to_account_id: String,
    pub amount: Decimal,
}

/// Request to pay a counterparty at the payment fee rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub from_account_id: String,
    pub to_account_id: String,
    pub amount: Decimal,
}

/// Kind-dispatched request used by the deferred creation path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub kind: TransactionKind,
    pub from_account_id: String,
    pub to_account_id: String,
    pub amount: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        assert_eq!(AccountStatus::parse("active"), Some(AccountStatus::Active));
        assert_eq!(AccountStatus::parse("closed"), Some(AccountStatus::Closed));
        assert_eq!(AccountStatus::parse("frozen"), None);
        assert_eq!(AccountStatus::Active.as_str(), "active");
    }

    #[test]
    fn test_kind_fee_schedule() {
        assert_eq!(TransactionKind::Transfer.fee_percent(), 1);
        assert_eq!(TransactionKind::Payment.fee_percent(), 3);
        assert_eq!(
            TransactionKind::parse("payment"),
            Some(TransactionKind::Payment)
        );
        assert_eq!(TransactionKind::parse("refund"), None);
    }
}
