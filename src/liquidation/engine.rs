//! Liquidation math.
//!
//! Pure functions splitting a liquidated trove's debt and collateral into:
//! - Gas compensation for the liquidator
//! - An offset portion absorbed by the stability pool
//! - A redistribution portion spread over the remaining stakes
//! - A surplus returned to the borrower
//!
//! The engine state is touched only by the trove manager, which applies the
//! accumulated `LiquidationValues` once per call.

use serde::{Deserialize, Serialize};

use crate::core::config::ProtocolParams;
use crate::core::trove::TroveId;
use crate::error::Result;
use crate::utils::constants::DECIMAL_PRECISION;
use crate::utils::math::*;

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION VALUES
// ═══════════════════════════════════════════════════════════════════════════════

/// Split of one (or several accumulated) liquidations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationValues {
    /// Collateral paid to the liquidator
    pub coll_gas_compensation: u128,
    /// Debt cancelled against stability pool deposits
    pub debt_to_offset: u128,
    /// Collateral sent to the stability pool
    pub coll_to_send_to_sp: u128,
    /// Debt spread over remaining stakes
    pub debt_to_redistribute: u128,
    /// Collateral spread over remaining stakes
    pub coll_to_redistribute: u128,
    /// Collateral returned to the borrower
    pub coll_surplus: u128,
}

impl LiquidationValues {
    /// Add another liquidation's values
    pub fn add(&mut self, other: &LiquidationValues) -> Result<()> {
        self.coll_gas_compensation = safe_add(self.coll_gas_compensation, other.coll_gas_compensation)?;
        self.debt_to_offset = safe_add(self.debt_to_offset, other.debt_to_offset)?;
        self.coll_to_send_to_sp = safe_add(self.coll_to_send_to_sp, other.coll_to_send_to_sp)?;
        self.debt_to_redistribute = safe_add(self.debt_to_redistribute, other.debt_to_redistribute)?;
        self.coll_to_redistribute = safe_add(self.coll_to_redistribute, other.coll_to_redistribute)?;
        self.coll_surplus = safe_add(self.coll_surplus, other.coll_surplus)?;
        Ok(())
    }

    /// Total debt leaving the liquidated troves
    pub fn total_debt(&self) -> Result<u128> {
        safe_add(self.debt_to_offset, self.debt_to_redistribute)
    }

    /// Total collateral leaving the liquidated troves
    pub fn total_coll(&self) -> Result<u128> {
        let coll = safe_add(self.coll_gas_compensation, self.coll_to_send_to_sp)?;
        let coll = safe_add(coll, self.coll_to_redistribute)?;
        safe_add(coll, self.coll_surplus)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION OUTCOME
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of a single or batch liquidation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationOutcome {
    /// Troves closed by this call
    pub liquidated: Vec<TroveId>,
    /// Accumulated split over all liquidated troves
    pub totals: LiquidationValues,
}

impl LiquidationOutcome {
    /// Number of troves liquidated
    pub fn count(&self) -> usize {
        self.liquidated.len()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SPLIT FUNCTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Gas compensation: `min(coll / divisor, cap)`
pub fn coll_gas_compensation(entire_coll: u128, params: &ProtocolParams) -> u128 {
    (entire_coll / params.coll_gas_compensation_divisor).min(params.coll_gas_compensation_cap)
}

/// Seize at most `debt * (1 + penalty) / price` of `coll`; the rest is surplus.
/// Returns `(seized, surplus)`.
pub fn coll_penalty_and_surplus(coll: u128, debt: u128, penalty: u128, price: u128) -> Result<(u128, u128)> {
    let max_seized = mul_div(debt, safe_add(DECIMAL_PRECISION, penalty)?, price)?;
    if coll > max_seized {
        Ok((max_seized, coll - max_seized))
    } else {
        Ok((coll, 0))
    }
}

/// Split a trove's entire debt and collateral between the stability pool
/// (up to `bold_in_sp_for_offsets`) and redistribution.
///
/// Surplus left by the offset portion is folded into the redistribution
/// portion before its own cap is applied, so the final surplus is whatever
/// redistribution could not seize.
pub fn offset_and_redistribution_vals(
    entire_debt: u128,
    entire_coll: u128,
    bold_in_sp_for_offsets: u128,
    price: u128,
    params: &ProtocolParams,
) -> Result<LiquidationValues> {
    let mut values = LiquidationValues {
        coll_gas_compensation: coll_gas_compensation(entire_coll, params),
        ..Default::default()
    };
    let coll_to_liquidate = entire_coll - values.coll_gas_compensation;

    let mut coll_sp_portion = 0;
    if bold_in_sp_for_offsets > 0 && entire_debt > 0 {
        values.debt_to_offset = entire_debt.min(bold_in_sp_for_offsets);
        coll_sp_portion = mul_div(coll_to_liquidate, values.debt_to_offset, entire_debt)?;
        let (seized, surplus) = coll_penalty_and_surplus(
            coll_sp_portion,
            values.debt_to_offset,
            params.liquidation_penalty_sp,
            price,
        )?;
        values.coll_to_send_to_sp = seized;
        values.coll_surplus = surplus;
    }

    values.debt_to_redistribute = entire_debt - values.debt_to_offset;
    if values.debt_to_redistribute > 0 {
        let coll_redist_portion = coll_to_liquidate - coll_sp_portion;
        if coll_redist_portion > 0 {
            let (seized, surplus) = coll_penalty_and_surplus(
                safe_add(coll_redist_portion, values.coll_surplus)?,
                values.debt_to_redistribute,
                params.liquidation_penalty_redistribution,
                price,
            )?;
            values.coll_to_redistribute = seized;
            values.coll_surplus = surplus;
        }
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn params() -> ProtocolParams {
        ProtocolParams::default()
    }

    #[test]
    fn test_gas_compensation_capped() {
        let params = params();
        assert_eq!(coll_gas_compensation(units(10), &params), units(10) / 200);
        assert_eq!(coll_gas_compensation(units(1_000), &params), units(2));
    }

    #[test]
    fn test_penalty_and_surplus() {
        // 1000 debt at price 2000 with 10% penalty seizes 0.55
        let (seized, surplus) =
            coll_penalty_and_surplus(units(1), units(1_000), percent(10), units(2_000)).unwrap();
        assert_eq!(seized, units(55) / 100);
        assert_eq!(surplus, units(45) / 100);

        let (seized, surplus) =
            coll_penalty_and_surplus(units(1), units(1_000), percent(10), units(1_000)).unwrap();
        assert_eq!(seized, units(1));
        assert_eq!(surplus, 0);
    }

    #[test]
    fn test_empty_pool_redistributes_everything() {
        // ICR 1.0: 10 coll, 10_000 debt, price 1000
        let values =
            offset_and_redistribution_vals(units(10_000), units(10), 0, units(1_000), &params()).unwrap();

        assert_eq!(values.debt_to_offset, 0);
        assert_eq!(values.coll_to_send_to_sp, 0);
        assert_eq!(values.debt_to_redistribute, units(10_000));
        assert_eq!(values.coll_gas_compensation, units(5) / 100);
        assert_eq!(values.coll_to_redistribute, units(10) - units(5) / 100);
        assert_eq!(values.coll_surplus, 0);
    }

    #[test]
    fn test_full_offset_leaves_surplus() {
        // ICR 1.08: 10.8 coll, 10_000 debt, price 1000; SP seizes 10.5
        let coll = units(108) / 10;
        let values =
            offset_and_redistribution_vals(units(10_000), coll, units(50_000), units(1_000), &params()).unwrap();

        let gas = coll / 200;
        assert_eq!(values.debt_to_offset, units(10_000));
        assert_eq!(values.debt_to_redistribute, 0);
        assert_eq!(values.coll_to_send_to_sp, units(105) / 10);
        assert_eq!(values.coll_surplus, coll - gas - units(105) / 10);
        assert_eq!(values.total_coll().unwrap(), coll);
    }

    #[test]
    fn test_offset_surplus_rolls_into_redistribution() {
        // Half offset, half redistributed at ICR 1.08: the SP half leaves a
        // surplus that the redistribution half's larger penalty absorbs
        let coll = units(108) / 10;
        let values =
            offset_and_redistribution_vals(units(10_000), coll, units(5_000), units(1_000), &params()).unwrap();

        assert_eq!(values.debt_to_offset, units(5_000));
        assert_eq!(values.debt_to_redistribute, units(5_000));
        assert_eq!(values.coll_to_send_to_sp, units(525) / 100);
        assert_eq!(values.coll_surplus, 0);
        assert_eq!(values.total_coll().unwrap(), coll);
    }

    #[test]
    fn test_values_accumulate() {
        let single =
            offset_and_redistribution_vals(units(10_000), units(10), 0, units(1_000), &params()).unwrap();
        let mut totals = LiquidationValues::default();
        totals.add(&single).unwrap();
        totals.add(&single).unwrap();
        assert_eq!(totals.debt_to_redistribute, units(20_000));
        assert_eq!(totals.total_coll().unwrap(), units(20));
    }

    proptest! {
        #[test]
        fn prop_split_conserves_collateral(
            debt in 1u128..1_000_000_000_000_000_000_000_000u128,
            coll in 1u128..1_000_000_000_000_000_000_000u128,
            sp in 0u128..2_000_000_000_000_000_000_000_000u128,
            price in 1_000_000_000_000_000u128..100_000_000_000_000_000_000_000u128,
        ) {
            let values = offset_and_redistribution_vals(debt, coll, sp, price, &params()).unwrap();
            prop_assert_eq!(values.total_coll().unwrap(), coll);
            prop_assert_eq!(values.total_debt().unwrap(), debt);
            prop_assert!(values.debt_to_offset <= sp);
        }
    }
}
