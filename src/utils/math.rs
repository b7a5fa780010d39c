//! Fixed-point arithmetic and mathematical utilities.
//!
//! Amounts are `u128` values with 18 decimals. Products that can exceed
//! `u128` (debt times rate, P times collateral) are computed in `U256` and
//! narrowed back with an explicit overflow check. Rounding direction is
//! always chosen by the caller: `*_up` variants round toward +infinity.

use num_traits::{CheckedAdd, CheckedSub};
use primitive_types::U256;
use std::fmt::Display;

use crate::error::{Error, Result};
use crate::utils::constants::{DECIMAL_PRECISION, ONE_YEAR_SECS, SCALE_FACTOR};

// ═══════════════════════════════════════════════════════════════════════════════
// CONVERSIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Express a whole number of units in fixed-point (`n * 1e18`)
pub const fn units(n: u128) -> u128 {
    n * DECIMAL_PRECISION
}

/// Express a percentage in fixed-point (`pct * 1e16`)
pub const fn percent(pct: u128) -> u128 {
    pct * DECIMAL_PRECISION / 100
}

/// Widen a `u128` into `U256`
pub fn wide(value: u128) -> U256 {
    U256::from(value)
}

/// Narrow a `U256` back into `u128`
pub fn narrow(value: U256, operation: &str) -> Result<u128> {
    if value > U256::from(u128::MAX) {
        return Err(Error::Overflow {
            operation: operation.to_string(),
        });
    }
    Ok(value.low_u128())
}

/// Full-width product of two `u128` values
pub fn wide_mul(a: u128, b: u128) -> U256 {
    // Both operands fit in 128 bits, so the product fits in 256
    U256::from(a) * U256::from(b)
}

// ═══════════════════════════════════════════════════════════════════════════════
// SAFE ARITHMETIC OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Checked addition with a typed overflow error
pub fn safe_add<T: CheckedAdd + Display>(a: T, b: T) -> Result<T> {
    a.checked_add(&b).ok_or_else(|| Error::Overflow {
        operation: format!("{} + {}", a, b),
    })
}

/// Checked subtraction with a typed underflow error
pub fn safe_sub<T: CheckedSub + Display>(a: T, b: T) -> Result<T> {
    a.checked_sub(&b).ok_or_else(|| Error::Underflow {
        operation: format!("{} - {}", a, b),
    })
}

/// Checked `U256` addition
pub fn wide_add(a: U256, b: U256) -> Result<U256> {
    a.checked_add(b).ok_or_else(|| Error::Overflow {
        operation: format!("{} + {}", a, b),
    })
}

/// Checked `U256` subtraction
pub fn wide_sub(a: U256, b: U256) -> Result<U256> {
    a.checked_sub(b).ok_or_else(|| Error::Underflow {
        operation: format!("{} - {}", a, b),
    })
}

/// Apply the incremental "subtract old, add new" update to a weighted sum
pub fn replace_weighted(sum: U256, old: U256, new: U256) -> Result<U256> {
    wide_sub(wide_add(sum, new)?, old)
}

fn require_divisor(divisor: u128, operation: &str) -> Result<()> {
    if divisor == 0 {
        return Err(Error::DivisionByZero {
            operation: operation.to_string(),
        });
    }
    Ok(())
}

/// `a * b / c`, rounded down
pub fn mul_div(a: u128, b: u128, c: u128) -> Result<u128> {
    require_divisor(c, "mul_div")?;
    narrow(wide_mul(a, b) / wide(c), "mul_div")
}

/// `a * b / c`, rounded up
pub fn mul_div_up(a: u128, b: u128, c: u128) -> Result<u128> {
    require_divisor(c, "mul_div_up")?;
    let numerator = wide_mul(a, b);
    let divisor = wide(c);
    let mut quotient = numerator / divisor;
    if !(numerator % divisor).is_zero() {
        quotient += U256::one();
    }
    narrow(quotient, "mul_div_up")
}

/// `SCALE_FACTOR^exp` as a 256-bit value
pub fn scale_factor_pow(exp: u64) -> U256 {
    let mut result = U256::one();
    for _ in 0..exp {
        result = result.saturating_mul(wide(SCALE_FACTOR));
    }
    result
}

// ═══════════════════════════════════════════════════════════════════════════════
// INTEREST
// ═══════════════════════════════════════════════════════════════════════════════

fn interest_denominator() -> U256 {
    wide(u128::from(ONE_YEAR_SECS)) * wide(DECIMAL_PRECISION)
}

/// Interest accrued on `weighted_debt` (debt * rate) over `period` seconds, rounded down
pub fn calc_interest(weighted_debt: U256, period: u64) -> Result<u128> {
    if period == 0 || weighted_debt.is_zero() {
        return Ok(0);
    }
    let numerator = weighted_debt
        .checked_mul(U256::from(period))
        .ok_or_else(|| Error::Overflow {
            operation: "calc_interest".into(),
        })?;
    narrow(numerator / interest_denominator(), "calc_interest")
}

/// Interest accrued on `weighted_debt` over `period` seconds, rounded up
pub fn calc_interest_up(weighted_debt: U256, period: u64) -> Result<u128> {
    if period == 0 || weighted_debt.is_zero() {
        return Ok(0);
    }
    let numerator = weighted_debt
        .checked_mul(U256::from(period))
        .ok_or_else(|| Error::Overflow {
            operation: "calc_interest_up".into(),
        })?;
    let denominator = interest_denominator();
    let mut interest = numerator / denominator;
    if !(numerator % denominator).is_zero() {
        interest += U256::one();
    }
    narrow(interest, "calc_interest_up")
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERALIZATION CALCULATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Collateralization ratio `coll * price / debt` (1e18 = 100%)
///
/// A position without debt has an infinite ratio, represented as `u128::MAX`.
pub fn compute_cr(coll: u128, debt: u128, price: u128) -> Result<u128> {
    if debt == 0 {
        return Ok(u128::MAX);
    }
    let ratio = wide_mul(coll, price) / wide(debt);
    Ok(narrow(ratio, "compute_cr").unwrap_or(u128::MAX))
}

/// Collateral equivalent of `debt` at `price`, rounded down
pub fn debt_to_coll(debt: u128, price: u128) -> Result<u128> {
    mul_div(debt, DECIMAL_PRECISION, price)
}

/// Apply a fixed-point fraction to an amount, rounded down
pub fn apply_fraction(amount: u128, fraction: u128) -> Result<u128> {
    mul_div(amount, fraction, DECIMAL_PRECISION)
}
