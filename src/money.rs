//! Money math helpers
//!
//! All amounts are `rust_decimal::Decimal` quantities carried at 2-digit
//! currency precision. Fees are computed and rounded here, at the boundary,
//! so the ledger only ever sees exact 2-decimal values.

use rust_decimal::{Decimal, RoundingStrategy};

/// Number of decimal digits in a currency amount.
pub const CURRENCY_SCALE: u32 = 2;

/// Round an amount to currency precision (half-away-from-zero).
#[inline]
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Compute the fee for a principal amount at an integer percentage rate,
/// rounded to currency precision.
///
/// # Example
/// ```
/// use corebank::money::compute_fee;
/// use rust_decimal::Decimal;
/// // 99.00 at 1% -> 0.99
/// let fee = compute_fee(Decimal::new(9900, 2), 1);
/// assert_eq!(fee, Decimal::new(99, 2));
/// ```
#[inline]
pub fn compute_fee(amount: Decimal, percent: u32) -> Decimal {
    round_money(amount * Decimal::from(percent) / Decimal::from(100u32))
}

/// True if the amount is a valid positive money value.
#[inline]
pub fn is_positive(amount: Decimal) -> bool {
    amount > Decimal::ZERO
}
