//! Protocol constants and magic numbers.
//!
//! All amounts, prices, rates and ratios are 18-decimal fixed-point values:
//! `DECIMAL_PRECISION` represents 1.0 (one token, 100%, or a price of 1).

// ═══════════════════════════════════════════════════════════════════════════════
// PRECISION
// ═══════════════════════════════════════════════════════════════════════════════

/// Fixed-point unit (1e18)
pub const DECIMAL_PRECISION: u128 = 1_000_000_000_000_000_000;

/// One percent in fixed-point
pub const ONE_PERCENT: u128 = DECIMAL_PRECISION / 100;

/// 100% collateralization, the floor below which troves are skipped by redemptions
pub const ONE_HUNDRED_PCT: u128 = DECIMAL_PRECISION;

/// Seconds per year used for interest accrual
pub const ONE_YEAR_SECS: u64 = 365 * 24 * 60 * 60;

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERALIZATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Minimum collateral ratio (MCR) - 110%
/// Below this ratio, a trove can be liquidated
pub const MCR: u128 = 110 * ONE_PERCENT;

/// Critical collateral ratio (CCR) - 150%
pub const CCR: u128 = 150 * ONE_PERCENT;

/// Shutdown collateral ratio (SCR) - 105%
pub const SCR: u128 = 105 * ONE_PERCENT;

/// Additional buffer above MCR required to join a batch - 10%
pub const BCR: u128 = 10 * ONE_PERCENT;

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Penalty on debt offset by the stability pool - 5%
pub const LIQUIDATION_PENALTY_SP: u128 = 5 * ONE_PERCENT;

/// Penalty on debt redistributed to active troves - 10%
pub const LIQUIDATION_PENALTY_REDISTRIBUTION: u128 = 10 * ONE_PERCENT;

/// Collateral gas compensation is `coll / COLL_GAS_COMPENSATION_DIVISOR`
pub const COLL_GAS_COMPENSATION_DIVISOR: u128 = 200;

/// Upper bound on collateral gas compensation (2 units)
pub const COLL_GAS_COMPENSATION_CAP: u128 = 2 * DECIMAL_PRECISION;

// ═══════════════════════════════════════════════════════════════════════════════
// DEBT LIMITS & RATES
// ═══════════════════════════════════════════════════════════════════════════════

/// Minimum debt per trove - 2000 units
pub const MIN_DEBT: u128 = 2_000 * DECIMAL_PRECISION;

/// Lowest annual interest rate - 0.5%
pub const MIN_ANNUAL_INTEREST_RATE: u128 = ONE_PERCENT / 2;

/// Highest annual interest rate - 250%
pub const MAX_ANNUAL_INTEREST_RATE: u128 = 250 * ONE_PERCENT;

/// Highest annual batch management fee - 10%
pub const MAX_ANNUAL_BATCH_MANAGEMENT_FEE: u128 = 10 * ONE_PERCENT;

/// Maximum drift between a trove's share ratio and debt ratio inside a batch - 1%
pub const BATCH_SHARES_RATIO_TOLERANCE: u128 = ONE_PERCENT;

/// Upfront interest period charged on debt increases (disabled by default)
pub const UPFRONT_INTEREST_PERIOD_SECS: u64 = 0;

// ═══════════════════════════════════════════════════════════════════════════════
// REDEMPTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Fixed redemption fee - 0.5%
pub const REDEMPTION_FEE_RATE: u128 = ONE_PERCENT / 2;

/// Collateral bonus for urgent redemptions after shutdown - 1%
pub const URGENT_REDEMPTION_BONUS: u128 = ONE_PERCENT;

// ═══════════════════════════════════════════════════════════════════════════════
// STABILITY POOL
// ═══════════════════════════════════════════════════════════════════════════════

/// Initial value of the running product P (1e36)
pub const P_PRECISION: u128 = DECIMAL_PRECISION * DECIMAL_PRECISION;

/// Factor applied to P on each rescale (1e9)
pub const SCALE_FACTOR: u128 = 1_000_000_000;

/// Number of scale steps after which a stale deposit compounds to zero
pub const MAX_SCALE_FACTOR_EXPONENT: u64 = 8;

/// Number of later scales whose rewards still reach a depositor
pub const SCALE_SPAN: u64 = 2;

/// Minimum total deposits kept in the pool (1 unit)
pub const MIN_BOLD_IN_SP: u128 = DECIMAL_PRECISION;

/// Share of minted interest routed to stability pool depositors - 50%
pub const SP_YIELD_SPLIT: u128 = 50 * ONE_PERCENT;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collateral_ratios() {
        assert!(SCR < MCR);
        assert!(MCR < CCR);
        assert!(MCR + BCR < CCR);
    }

    #[test]
    fn test_penalties_ordered() {
        assert!(LIQUIDATION_PENALTY_SP < LIQUIDATION_PENALTY_REDISTRIBUTION);
        assert!(LIQUIDATION_PENALTY_REDISTRIBUTION <= MCR - ONE_HUNDRED_PCT);
    }

    #[test]
    fn test_rate_bounds() {
        assert_eq!(MIN_ANNUAL_INTEREST_RATE, 5_000_000_000_000_000);
        assert!(MIN_ANNUAL_INTEREST_RATE < MAX_ANNUAL_INTEREST_RATE);
        assert!(MAX_ANNUAL_BATCH_MANAGEMENT_FEE < MAX_ANNUAL_INTEREST_RATE);
    }

    #[test]
    fn test_scale_constants() {
        assert_eq!(P_PRECISION, 10u128.pow(36));
        assert_eq!(SCALE_FACTOR, 10u128.pow(9));
        assert!(SCALE_SPAN < MAX_SCALE_FACTOR_EXPONENT);
        assert!(P_PRECISION / SCALE_FACTOR > 0);
    }
}
