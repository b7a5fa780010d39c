//! Redistribution of unabsorbed debt and collateral.
//!
//! Liquidated debt the stability pool cannot absorb is spread over every
//! remaining stake through two global accumulators, `L_coll` and `L_debt`.
//! A trove's gain is `stake * (L_now - L_snapshot) / 1e18`, rounded down.
//! The remainder of each per-unit division is carried into the next call so
//! the reconstructed gains never exceed what was redistributed and never
//! drift further than one unit per stake below it.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::trove::RewardSnapshot;
use crate::error::{Error, Result};
use crate::utils::constants::DECIMAL_PRECISION;
use crate::utils::math::*;

/// Global redistribution accumulators and stake totals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedistributionState {
    /// Collateral redistributed per unit of stake
    pub l_coll: U256,
    /// Debt redistributed per unit of stake
    pub l_debt: U256,
    /// Carried remainder of the last collateral division
    pub last_coll_error: U256,
    /// Carried remainder of the last debt division
    pub last_debt_error: U256,
    /// Sum of all open troves' stakes
    pub total_stakes: u128,
    /// `total_stakes` after the last liquidation
    pub total_stakes_snapshot: u128,
    /// System collateral after the last liquidation
    pub total_collateral_snapshot: u128,
}

impl RedistributionState {
    /// Create empty accumulators
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current accumulators
    pub fn current_snapshot(&self) -> RewardSnapshot {
        RewardSnapshot {
            coll: self.l_coll,
            debt: self.l_debt,
        }
    }

    /// Pending `(debt, coll)` gains of a stake observed at `snapshot`
    pub fn pending_gains(&self, stake: u128, snapshot: &RewardSnapshot) -> Result<(u128, u128)> {
        snapshot.pending_gains(stake, self.l_coll, self.l_debt)
    }

    /// Register a new stake
    pub fn add_stake(&mut self, stake: u128) -> Result<()> {
        self.total_stakes = safe_add(self.total_stakes, stake)?;
        Ok(())
    }

    /// Remove a stake
    pub fn remove_stake(&mut self, stake: u128) -> Result<()> {
        self.total_stakes = safe_sub(self.total_stakes, stake)?;
        Ok(())
    }

    /// Replace `old` with `new` in the total
    pub fn replace_stake(&mut self, old: u128, new: u128) -> Result<()> {
        self.total_stakes = safe_add(safe_sub(self.total_stakes, old)?, new)?;
        Ok(())
    }

    /// Bump the accumulators by `coll` and `debt` spread over `total_stakes`
    pub fn redistribute(&mut self, coll: u128, debt: u128) -> Result<()> {
        if debt == 0 {
            return Ok(());
        }
        if self.total_stakes == 0 {
            return Err(Error::OnlyOneTroveInSystem);
        }
        let total = wide(self.total_stakes);

        let (coll_per_unit, coll_error) = spread(coll, self.last_coll_error, total)?;
        let (debt_per_unit, debt_error) = spread(debt, self.last_debt_error, total)?;

        self.l_coll = wide_add(self.l_coll, coll_per_unit)?;
        self.l_debt = wide_add(self.l_debt, debt_per_unit)?;
        self.last_coll_error = coll_error;
        self.last_debt_error = debt_error;

        debug!(coll, debt, total_stakes = self.total_stakes, "Redistributed debt and collateral");
        Ok(())
    }

    /// Record stake and collateral totals after a liquidation
    pub fn update_system_snapshots(&mut self, total_collateral: u128) {
        self.total_stakes_snapshot = self.total_stakes;
        self.total_collateral_snapshot = total_collateral;
    }
}

/// `(amount * 1e18 + carried) / total`, returning the quotient and new remainder
fn spread(amount: u128, carried: U256, total: U256) -> Result<(U256, U256)> {
    let numerator = wide_add(wide_mul(amount, DECIMAL_PRECISION), carried)?;
    Ok((numerator / total, numerator % total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_requires_remaining_stakes() {
        let mut state = RedistributionState::new();
        assert!(matches!(state.redistribute(units(1), units(100)), Err(Error::OnlyOneTroveInSystem)));
        assert!(state.redistribute(0, 0).is_ok());
    }

    #[test]
    fn test_gains_proportional_to_stake() {
        let mut state = RedistributionState::new();
        let snapshot = state.current_snapshot();
        state.add_stake(units(30)).unwrap();
        state.add_stake(units(10)).unwrap();

        state.redistribute(units(4), units(8_000)).unwrap();

        let (debt, coll) = state.pending_gains(units(30), &snapshot).unwrap();
        assert_eq!(debt, units(6_000));
        assert_eq!(coll, units(3));
        let (debt, coll) = state.pending_gains(units(10), &snapshot).unwrap();
        assert_eq!(debt, units(2_000));
        assert_eq!(coll, units(1));
    }

    #[test]
    fn test_error_is_carried() {
        let mut state = RedistributionState::new();
        state.add_stake(3).unwrap();

        state.redistribute(1, 1).unwrap();
        assert_eq!(state.last_debt_error, U256::from(1u64));
        let l_before = state.l_debt;
        state.redistribute(1, 1).unwrap();
        // (1e18 + 1) / 3 leaves remainder 2
        assert_eq!(state.last_debt_error, U256::from(2u64));
        assert_eq!(state.l_debt - l_before, wide(DECIMAL_PRECISION / 3));
    }

    #[test]
    fn test_stake_bookkeeping() {
        let mut state = RedistributionState::new();
        state.add_stake(units(5)).unwrap();
        state.replace_stake(units(5), units(7)).unwrap();
        state.remove_stake(units(2)).unwrap();
        assert_eq!(state.total_stakes, units(5));
        assert!(state.remove_stake(units(6)).is_err());

        state.update_system_snapshots(units(9));
        assert_eq!(state.total_stakes_snapshot, units(5));
        assert_eq!(state.total_collateral_snapshot, units(9));
    }

    proptest! {
        #[test]
        fn prop_redistribution_never_overpays(
            stakes in proptest::collection::vec(1u128..1_000_000_000_000_000_000_000u128, 1..8),
            rounds in proptest::collection::vec(
                (0u128..1_000_000_000_000_000_000u128, 1u128..1_000_000_000_000_000_000_000u128),
                1..6,
            ),
        ) {
            let mut state = RedistributionState::new();
            for stake in &stakes {
                state.add_stake(*stake).unwrap();
            }
            let snapshot = state.current_snapshot();

            let mut total_coll = 0u128;
            let mut total_debt = 0u128;
            for (coll, debt) in &rounds {
                state.redistribute(*coll, *debt).unwrap();
                total_coll += coll;
                total_debt += debt;
            }

            let mut debt_gains = 0u128;
            let mut coll_gains = 0u128;
            for stake in &stakes {
                let (debt, coll) = state.pending_gains(*stake, &snapshot).unwrap();
                debt_gains += debt;
                coll_gains += coll;
            }

            prop_assert!(debt_gains <= total_debt);
            prop_assert!(coll_gains <= total_coll);

            // Per-stake flooring plus the carried remainder bound the shortfall
            let slack = stakes.len() as u128 + 1 + state.total_stakes / DECIMAL_PRECISION;
            prop_assert!(total_debt - debt_gains <= slack);
            prop_assert!(total_coll - coll_gains <= slack);
        }
    }
}
