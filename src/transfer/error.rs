//! Transfer Error Types
//!
//! The full failure taxonomy of the money-movement path. Every variant maps
//! to a stable code and an HTTP status suggestion for the handler layer.

use thiserror::Error;

use crate::ledger::StoreError;

/// Transfer failure taxonomy
#[derive(Error, Debug)]
pub enum TransferError {
    // === Validation Errors ===
    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("source and destination account cannot be the same")]
    SelfTransfer,

    #[error("caller does not own the source account")]
    Unauthorized,

    // === Account Errors ===
    #[error("account not found")]
    AccountNotFound,

    #[error("account is closed")]
    AccountClosed,

    #[error("insufficient balance")]
    InsufficientBalance,

    // === System Errors ===
    #[error("ledger store error: {0}")]
    Store(#[from] StoreError),
}

impl TransferError {
    /// Stable error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::InvalidAmount => "INVALID_AMOUNT",
            TransferError::SelfTransfer => "SELF_TRANSFER",
            TransferError::Unauthorized => "UNAUTHORIZED",
            TransferError::AccountNotFound => "ACCOUNT_NOT_FOUND",
            TransferError::AccountClosed => "ACCOUNT_CLOSED",
            TransferError::InsufficientBalance => "INSUFFICIENT_BALANCE",
            TransferError::Store(_) => "STORE_ERROR",
        }
    }

    /// HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            TransferError::InvalidAmount | TransferError::SelfTransfer => 400,
            TransferError::Unauthorized => 403,
            TransferError::AccountNotFound => 404,
            TransferError::AccountClosed | TransferError::InsufficientBalance => 422,
            TransferError::Store(_) => 500,
        }
    }
}
