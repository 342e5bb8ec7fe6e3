//! Money-movement protocol
//!
//! [`engine::TransferEngine`] executes the atomic, fee-bearing double entry;
//! [`service::TransactionService`] validates requests, computes fees and
//! schedules follow-up work.

pub mod engine;
pub mod error;
pub mod service;

pub use engine::TransferEngine;
pub use error::TransferError;
pub use service::TransactionService;
