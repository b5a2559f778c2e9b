//! # Financial Calculator
//!
//! Fixed-point payout and refund arithmetic on drop amounts. Percentages are
//! held as integers scaled by 100 (decimal exponent −2); every product is
//! formed in 128 bits and truncated toward zero, never rounded.

use crate::errors::{HookError, Result};

/// Denominator of the −2 decimal exponent.
const PERCENT_SCALE: u128 = 100;

/// A whole percentage in `1..=100`, read as `value × 10⁻²`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Percent(u8);

impl Percent {
    pub fn new(value: u8) -> Result<Self> {
        if value == 0 || value as u128 > PERCENT_SCALE {
            return Err(HookError::malformed(format!(
                "payout percent must be between 1 and 100, got {value}"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// `floor(amount × self / 100)`.
    pub fn of(self, amount: u64) -> u64 {
        // value ≤ 100, so the quotient never exceeds `amount`
        (amount as u128 * self.0 as u128 / PERCENT_SCALE) as u64
    }
}

/// `floor(total_raised × payout_percent / 100)`.
pub fn milestone_payout(total_raised: u64, payout_percent: u8) -> Result<u64> {
    Ok(Percent::new(payout_percent)?.of(total_raised))
}

/// Pro-rata share of the undisbursed principal:
/// `floor((total_raised − total_non_refundable) × pledge_amount / total_raised)`.
pub fn refund_amount(total_raised: u64, total_non_refundable: u64, pledge_amount: u64) -> Result<u64> {
    if total_raised == 0 {
        return Err(HookError::corrupt("refund requested against zero total raised"));
    }
    if pledge_amount > total_raised {
        return Err(HookError::corrupt("pledge amount exceeds total raised"));
    }
    let remaining = total_raised
        .checked_sub(total_non_refundable)
        .ok_or_else(|| HookError::corrupt("total non-refundable exceeds total raised"))?;

    let share = remaining as u128 * pledge_amount as u128 / total_raised as u128;
    Ok(share as u64)
}
