//! Interest-rate batches.
//!
//! A batch is a cohort of troves sharing one interest rate and one manager.
//! Members hold debt shares; a member's debt is its pro-rata slice of the
//! batch's recorded debt, accrued interest and management fee.

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::utils::constants::{BATCH_SHARES_RATIO_TOLERANCE, DECIMAL_PRECISION};
use crate::utils::crypto::Address;
use crate::utils::math::*;

// ═══════════════════════════════════════════════════════════════════════════════
// BATCH
// ═══════════════════════════════════════════════════════════════════════════════

/// Aggregate state of one batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// Manager account (also the registry key)
    pub manager: Address,
    /// Recorded debt of all members
    pub debt: u128,
    /// Collateral of all members
    pub coll: u128,
    /// Total outstanding debt shares
    pub total_debt_shares: u128,
    /// Annual interest rate applied to every member
    pub annual_interest_rate: u128,
    /// Annual management fee charged on recorded debt
    pub annual_management_fee: u128,
    /// Last time accrued interest and fees were realized
    pub last_debt_update_time: u64,
    /// Last time the batch rate changed
    pub last_interest_rate_adj_time: u64,
}

impl Batch {
    /// Create an empty batch
    pub fn new(manager: Address, annual_interest_rate: u128, annual_management_fee: u128, now: u64) -> Self {
        Self {
            manager,
            debt: 0,
            coll: 0,
            total_debt_shares: 0,
            annual_interest_rate,
            annual_management_fee,
            last_debt_update_time: now,
            last_interest_rate_adj_time: now,
        }
    }

    /// Recorded debt weighted by the batch rate
    pub fn weighted_recorded_debt(&self) -> U256 {
        wide_mul(self.debt, self.annual_interest_rate)
    }

    /// Recorded debt weighted by the management fee
    pub fn weighted_management_fee(&self) -> U256 {
        wide_mul(self.debt, self.annual_management_fee)
    }

    /// Batch state as of `accrual_end`, which the caller has already capped at shutdown
    pub fn latest(&self, accrual_end: u64) -> Result<LatestBatchData> {
        let period = accrual_end.saturating_sub(self.last_debt_update_time);
        let weighted_recorded_debt = self.weighted_recorded_debt();
        let weighted_recorded_batch_management_fee = self.weighted_management_fee();
        let accrued_interest = calc_interest(weighted_recorded_debt, period)?;
        let accrued_management_fee = calc_interest(weighted_recorded_batch_management_fee, period)?;

        let entire_debt_without_redistribution =
            safe_add(safe_add(self.debt, accrued_interest)?, accrued_management_fee)?;

        Ok(LatestBatchData {
            recorded_debt: self.debt,
            annual_interest_rate: self.annual_interest_rate,
            annual_management_fee: self.annual_management_fee,
            weighted_recorded_debt,
            weighted_recorded_batch_management_fee,
            accrued_interest,
            accrued_management_fee,
            entire_debt_without_redistribution,
            entire_coll_without_redistribution: self.coll,
            last_debt_update_time: self.last_debt_update_time,
            last_interest_rate_adj_time: self.last_interest_rate_adj_time,
        })
    }

    /// Shares minted for `debt_increase` at the current share price
    pub fn shares_for_debt(&self, debt_increase: u128) -> Result<u128> {
        if self.total_debt_shares == 0 || self.debt == 0 {
            return Ok(debt_increase);
        }
        mul_div(debt_increase, self.total_debt_shares, self.debt)
    }

    /// Debt represented by `shares`, rounded down
    pub fn debt_for_shares(&self, shares: u128) -> Result<u128> {
        if self.total_debt_shares == 0 {
            return Ok(0);
        }
        mul_div(self.debt, shares, self.total_debt_shares)
    }

    /// Reject a member whose share ratio drifted above its debt ratio
    pub fn check_shares_ratio(&self, member_shares: u128, member_debt: u128) -> Result<()> {
        if self.total_debt_shares == 0 || self.debt == 0 {
            return Ok(());
        }
        let shares_ratio = mul_div(member_shares, DECIMAL_PRECISION, self.total_debt_shares)?;
        let debt_ratio = mul_div(member_debt, DECIMAL_PRECISION, self.debt)?;
        if shares_ratio > safe_add(debt_ratio, BATCH_SHARES_RATIO_TOLERANCE)? {
            return Err(Error::BatchSharesRatioViolation {
                shares_ratio,
                debt_ratio,
            });
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LATEST BATCH DATA
// ═══════════════════════════════════════════════════════════════════════════════

/// A batch's obligations as of now
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestBatchData {
    /// Recorded debt
    pub recorded_debt: u128,
    /// Batch interest rate
    pub annual_interest_rate: u128,
    /// Batch management fee rate
    pub annual_management_fee: u128,
    /// Recorded debt weighted by rate
    pub weighted_recorded_debt: U256,
    /// Recorded debt weighted by management fee
    pub weighted_recorded_batch_management_fee: U256,
    /// Interest accrued since the last update, rounded down
    pub accrued_interest: u128,
    /// Management fee accrued since the last update, rounded down
    pub accrued_management_fee: u128,
    /// Recorded debt + interest + management fee
    pub entire_debt_without_redistribution: u128,
    /// Batch collateral
    pub entire_coll_without_redistribution: u128,
    /// Last realization time
    pub last_debt_update_time: u64,
    /// Last rate change
    pub last_interest_rate_adj_time: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::ONE_YEAR_SECS;

    fn test_batch() -> Batch {
        Batch::new(Address::from_label("manager"), percent(7), 0, 0)
    }

    #[test]
    fn test_latest_one_year() {
        let mut batch = test_batch();
        batch.debt = units(4_000);
        batch.total_debt_shares = units(4_000);

        let latest = batch.latest(ONE_YEAR_SECS).unwrap();
        assert_eq!(latest.accrued_interest, units(280));
        assert_eq!(latest.accrued_management_fee, 0);
        assert_eq!(latest.entire_debt_without_redistribution, units(4_280));
    }

    #[test]
    fn test_latest_with_management_fee() {
        let mut batch = Batch::new(Address::from_label("manager"), percent(5), percent(1), 0);
        batch.debt = units(10_000);

        let latest = batch.latest(ONE_YEAR_SECS).unwrap();
        assert_eq!(latest.accrued_interest, units(500));
        assert_eq!(latest.accrued_management_fee, units(100));
        assert_eq!(latest.entire_debt_without_redistribution, units(10_600));
    }

    #[test]
    fn test_latest_before_last_update() {
        let mut batch = test_batch();
        batch.debt = units(1_000);
        batch.last_debt_update_time = 100;
        assert_eq!(batch.latest(50).unwrap().accrued_interest, 0);
    }

    #[test]
    fn test_share_math() {
        let mut batch = test_batch();
        assert_eq!(batch.shares_for_debt(units(100)).unwrap(), units(100));

        batch.debt = units(200);
        batch.total_debt_shares = units(100);
        assert_eq!(batch.shares_for_debt(units(50)).unwrap(), units(25));
        assert_eq!(batch.debt_for_shares(units(25)).unwrap(), units(50));
    }

    #[test]
    fn test_shares_ratio_check() {
        let mut batch = test_batch();
        batch.debt = units(1_000);
        batch.total_debt_shares = units(1_000);

        assert!(batch.check_shares_ratio(units(500), units(500)).is_ok());
        assert!(batch.check_shares_ratio(units(505), units(500)).is_ok());
        assert!(matches!(
            batch.check_shares_ratio(units(600), units(500)),
            Err(Error::BatchSharesRatioViolation { .. })
        ));
    }
}
