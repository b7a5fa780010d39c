//! Active pool.
//!
//! Aggregate ledger of every open trove. Besides the collateral balance it
//! keeps the aggregate recorded debt and the rate-weighted debt sum, so that
//! protocol-wide interest is an O(1) computation. Aggregate accrual always
//! rounds up: the aggregate may overstate what troves owe, never understate.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::token::DebtToken;
use crate::core::trove::TroveChange;
use crate::error::{Error, Result};
use crate::pools::default_pool::DefaultPool;
use crate::pools::stability_pool::StabilityPool;
use crate::utils::crypto::Address;
use crate::utils::math::*;

// ═══════════════════════════════════════════════════════════════════════════════
// ACTIVE POOL
// ═══════════════════════════════════════════════════════════════════════════════

/// Collateral and aggregate debt of all open troves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivePool {
    /// Collateral held
    coll_balance: u128,
    /// Aggregate recorded debt (updated when a trove is touched or interest is minted)
    agg_recorded_debt: u128,
    /// Σ recorded debt · interest rate
    agg_weighted_debt_sum: U256,
    /// Last time aggregate interest was minted
    last_agg_update_time: u64,
    /// Realized but unminted batch management fees
    agg_batch_management_fees: u128,
    /// Σ batch recorded debt · management fee
    agg_weighted_batch_management_fee_sum: U256,
    /// Last time aggregate batch fees were realized
    last_agg_batch_management_fees_update_time: u64,
    /// Time accrual froze, if shut down
    shutdown_time: Option<u64>,
    /// Share of minted interest routed to the stability pool
    sp_yield_split: u128,
    /// Lifetime interest and upfront fees minted
    total_interest_minted: u128,
}

impl ActivePool {
    /// Create an empty pool accruing from `now`
    pub fn new(sp_yield_split: u128, now: u64) -> Self {
        Self {
            coll_balance: 0,
            agg_recorded_debt: 0,
            agg_weighted_debt_sum: U256::zero(),
            last_agg_update_time: now,
            agg_batch_management_fees: 0,
            agg_weighted_batch_management_fee_sum: U256::zero(),
            last_agg_batch_management_fees_update_time: now,
            shutdown_time: None,
            sp_yield_split,
            total_interest_minted: 0,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Collateral held
    pub fn coll_balance(&self) -> u128 {
        self.coll_balance
    }

    /// Aggregate recorded debt
    pub fn agg_recorded_debt(&self) -> u128 {
        self.agg_recorded_debt
    }

    /// Aggregate rate-weighted debt
    pub fn agg_weighted_debt_sum(&self) -> U256 {
        self.agg_weighted_debt_sum
    }

    /// Realized batch management fees not yet minted
    pub fn agg_batch_management_fees(&self) -> u128 {
        self.agg_batch_management_fees
    }

    /// Aggregate fee-weighted batch debt
    pub fn agg_weighted_batch_management_fee_sum(&self) -> U256 {
        self.agg_weighted_batch_management_fee_sum
    }

    /// Last aggregate interest mint
    pub fn last_agg_update_time(&self) -> u64 {
        self.last_agg_update_time
    }

    /// Lifetime minted interest and upfront fees
    pub fn total_interest_minted(&self) -> u128 {
        self.total_interest_minted
    }

    /// Time accrual froze
    pub fn shutdown_time(&self) -> Option<u64> {
        self.shutdown_time
    }

    /// Check if the branch has been shut down
    pub fn has_been_shut_down(&self) -> bool {
        self.shutdown_time.is_some()
    }

    /// Interest accrued on the aggregate since the last mint, rounded up
    pub fn calc_pending_agg_interest(&self, now: u64) -> Result<u128> {
        if self.has_been_shut_down() {
            return Ok(0);
        }
        calc_interest_up(self.agg_weighted_debt_sum, now.saturating_sub(self.last_agg_update_time))
    }

    /// Stability pool share of pending interest
    pub fn calc_pending_sp_yield(&self, now: u64) -> Result<u128> {
        apply_fraction(self.calc_pending_agg_interest(now)?, self.sp_yield_split)
    }

    /// Batch management fees accrued since the last realization, rounded up
    pub fn calc_pending_agg_batch_management_fee(&self, now: u64) -> Result<u128> {
        let period_end = self.shutdown_time.unwrap_or(now);
        let period_start = self.last_agg_batch_management_fees_update_time.min(period_end);
        calc_interest_up(self.agg_weighted_batch_management_fee_sum, period_end - period_start)
    }

    /// Total debt of the active set: recorded + pending interest + batch fees
    pub fn get_bold_debt(&self, now: u64) -> Result<u128> {
        let debt = safe_add(self.agg_recorded_debt, self.calc_pending_agg_interest(now)?)?;
        let debt = safe_add(debt, self.agg_batch_management_fees)?;
        safe_add(debt, self.calc_pending_agg_batch_management_fee(now)?)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // COLLATERAL
    // ═══════════════════════════════════════════════════════════════════════════

    /// Release collateral leaving the active set
    pub fn send_coll(&mut self, amount: u128) -> Result<()> {
        if amount == 0 || amount > self.coll_balance {
            return Err(Error::AmountOutOfRange {
                requested: amount,
                available: self.coll_balance,
            });
        }
        self.coll_balance -= amount;
        Ok(())
    }

    /// Move collateral into the default pool for redistribution
    pub fn send_coll_to_default_pool(&mut self, amount: u128, default_pool: &mut DefaultPool) -> Result<()> {
        self.send_coll(amount)?;
        default_pool.receive_coll(amount)
    }

    /// Accept collateral
    pub fn receive_coll(&mut self, amount: u128) -> Result<()> {
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        self.coll_balance = safe_add(self.coll_balance, amount)?;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INTEREST MINTING
    // ═══════════════════════════════════════════════════════════════════════════

    /// Mint pending aggregate interest plus `upfront_fee`, split between the
    /// stability pool and the interest router. Returns the minted amount.
    pub fn mint_agg_interest<L: DebtToken>(
        &mut self,
        now: u64,
        upfront_fee: u128,
        stability_pool: &mut StabilityPool,
        ledger: &mut L,
    ) -> Result<u128> {
        let minted = safe_add(self.calc_pending_agg_interest(now)?, upfront_fee)?;

        if minted > 0 {
            let sp_yield = apply_fraction(minted, self.sp_yield_split)?;
            let remainder = minted - sp_yield;

            if remainder > 0 {
                ledger.mint(&Address::interest_router(), remainder)?;
            }
            if sp_yield > 0 {
                ledger.mint(&Address::stability_pool(), sp_yield)?;
                stability_pool.trigger_bold_rewards(sp_yield)?;
            }

            self.agg_recorded_debt = safe_add(self.agg_recorded_debt, minted)?;
            self.total_interest_minted = safe_add(self.total_interest_minted, minted)?;
            debug!(minted, sp_yield, "Minted aggregate interest");
        }

        self.last_agg_update_time = now;
        Ok(minted)
    }

    /// Mint pending interest and fold a trove change into the aggregates
    pub fn mint_agg_interest_and_account_for_trove_change<L: DebtToken>(
        &mut self,
        change: &TroveChange,
        batch_manager: Option<&Address>,
        now: u64,
        stability_pool: &mut StabilityPool,
        ledger: &mut L,
    ) -> Result<()> {
        self.mint_agg_interest(now, change.upfront_fee, stability_pool, ledger)?;

        let mut recorded = safe_add(self.agg_recorded_debt, change.applied_redist_debt_gain)?;
        recorded = safe_add(recorded, change.debt_increase)?;
        self.agg_recorded_debt = safe_sub(recorded, change.debt_decrease)?;

        self.agg_weighted_debt_sum = replace_weighted(
            self.agg_weighted_debt_sum,
            change.old_weighted_recorded_debt,
            change.new_weighted_recorded_debt,
        )?;

        if let Some(manager) = batch_manager {
            self.mint_batch_management_fee(
                now,
                change.batch_accrued_management_fee,
                change.old_weighted_recorded_batch_management_fee,
                change.new_weighted_recorded_batch_management_fee,
                manager,
                ledger,
            )?;
        }
        Ok(())
    }

    /// Realize a batch's accrued management fee into recorded debt, mint it
    /// to the manager and re-weight the aggregate fee sum
    pub fn mint_batch_management_fee<L: DebtToken>(
        &mut self,
        now: u64,
        batch_accrued_fee: u128,
        old_weighted_fee: U256,
        new_weighted_fee: U256,
        manager: &Address,
        ledger: &mut L,
    ) -> Result<()> {
        self.agg_recorded_debt = safe_add(self.agg_recorded_debt, batch_accrued_fee)?;

        let pending = self.calc_pending_agg_batch_management_fee(now)?;
        self.agg_batch_management_fees =
            safe_sub(safe_add(self.agg_batch_management_fees, pending)?, batch_accrued_fee)?;

        self.agg_weighted_batch_management_fee_sum = replace_weighted(
            self.agg_weighted_batch_management_fee_sum,
            old_weighted_fee,
            new_weighted_fee,
        )?;

        if batch_accrued_fee > 0 {
            ledger.mint(manager, batch_accrued_fee)?;
        }
        self.last_agg_batch_management_fees_update_time = now;
        Ok(())
    }

    /// Freeze accrual at `now`
    pub fn set_shutdown_flag(&mut self, now: u64) -> Result<()> {
        if self.has_been_shut_down() {
            return Err(Error::SystemShutDown);
        }
        self.shutdown_time = Some(now);
        Ok(())
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Deserialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::token::BoldToken;
    use crate::utils::constants::*;

    fn setup() -> (ActivePool, StabilityPool, BoldToken) {
        (
            ActivePool::new(SP_YIELD_SPLIT, 0),
            StabilityPool::new(),
            BoldToken::new(),
        )
    }

    fn open_change(debt: u128, rate: u128) -> TroveChange {
        TroveChange {
            debt_increase: debt,
            new_weighted_recorded_debt: wide_mul(debt, rate),
            ..Default::default()
        }
    }

    #[test]
    fn test_collateral_bounds() {
        let (mut pool, _, _) = setup();
        let mut default_pool = DefaultPool::new();
        pool.receive_coll(units(10)).unwrap();

        pool.send_coll(units(4)).unwrap();
        pool.send_coll_to_default_pool(units(1), &mut default_pool).unwrap();
        assert_eq!(pool.coll_balance(), units(5));
        assert_eq!(default_pool.coll_balance(), units(1));

        assert!(matches!(pool.send_coll(units(6)), Err(Error::AmountOutOfRange { .. })));
        assert!(pool.send_coll(0).is_err());
        assert!(pool.receive_coll(0).is_err());
    }

    #[test]
    fn test_pending_interest_rounds_up() {
        let (mut pool, mut sp, mut token) = setup();
        pool.mint_agg_interest_and_account_for_trove_change(
            &open_change(units(1), percent(5)),
            None,
            0,
            &mut sp,
            &mut token,
        )
        .unwrap();

        let floor = calc_interest(pool.agg_weighted_debt_sum(), 1).unwrap();
        assert_eq!(pool.calc_pending_agg_interest(1).unwrap(), floor + 1);
        assert_eq!(pool.calc_pending_agg_interest(0).unwrap(), 0);
    }

    #[test]
    fn test_mint_splits_yield() {
        let (mut pool, mut sp, mut token) = setup();
        pool.mint_agg_interest_and_account_for_trove_change(
            &open_change(units(4_000), percent(7)),
            None,
            0,
            &mut sp,
            &mut token,
        )
        .unwrap();
        assert_eq!(pool.agg_recorded_debt(), units(4_000));

        let minted = pool.mint_agg_interest(ONE_YEAR_SECS, 0, &mut sp, &mut token).unwrap();
        assert_eq!(minted, units(280));
        assert_eq!(pool.agg_recorded_debt(), units(4_280));
        assert_eq!(token.balance_of(&Address::stability_pool()), units(140));
        assert_eq!(token.balance_of(&Address::interest_router()), units(140));
        // Empty pool holds the yield until deposits clear the floor
        assert_eq!(sp.yield_gains_pending(), units(140));
        assert_eq!(pool.calc_pending_agg_interest(ONE_YEAR_SECS).unwrap(), 0);
    }

    #[test]
    fn test_upfront_fee_minted() {
        let (mut pool, mut sp, mut token) = setup();
        let mut change = open_change(units(2_000), percent(5));
        change.upfront_fee = units(2);
        pool.mint_agg_interest_and_account_for_trove_change(&change, None, 0, &mut sp, &mut token)
            .unwrap();

        assert_eq!(pool.agg_recorded_debt(), units(2_002));
        assert_eq!(token.total_supply(), units(2));
    }

    #[test]
    fn test_debt_decrease_and_reweight() {
        let (mut pool, mut sp, mut token) = setup();
        pool.mint_agg_interest_and_account_for_trove_change(
            &open_change(units(3_000), percent(4)),
            None,
            0,
            &mut sp,
            &mut token,
        )
        .unwrap();

        let change = TroveChange {
            debt_decrease: units(1_000),
            old_weighted_recorded_debt: wide_mul(units(3_000), percent(4)),
            new_weighted_recorded_debt: wide_mul(units(2_000), percent(4)),
            ..Default::default()
        };
        pool.mint_agg_interest_and_account_for_trove_change(&change, None, 0, &mut sp, &mut token)
            .unwrap();

        assert_eq!(pool.agg_recorded_debt(), units(2_000));
        assert_eq!(pool.agg_weighted_debt_sum(), wide_mul(units(2_000), percent(4)));
    }

    #[test]
    fn test_batch_management_fee() {
        let (mut pool, _, mut token) = setup();
        let manager = Address::from_label("manager");
        let weighted = wide_mul(units(10_000), percent(1));

        pool.mint_batch_management_fee(0, 0, U256::zero(), weighted, &manager, &mut token)
            .unwrap();
        assert_eq!(pool.calc_pending_agg_batch_management_fee(ONE_YEAR_SECS).unwrap(), units(100));

        pool.mint_batch_management_fee(ONE_YEAR_SECS, units(100), weighted, weighted, &manager, &mut token)
            .unwrap();
        assert_eq!(pool.agg_batch_management_fees(), 0);
        assert_eq!(pool.agg_recorded_debt(), units(100));
        assert_eq!(token.balance_of(&manager), units(100));
    }

    #[test]
    fn test_shutdown_freezes_accrual() {
        let (mut pool, mut sp, mut token) = setup();
        pool.mint_agg_interest_and_account_for_trove_change(
            &open_change(units(4_000), percent(7)),
            None,
            0,
            &mut sp,
            &mut token,
        )
        .unwrap();
        pool.mint_agg_interest(100, 0, &mut sp, &mut token).unwrap();
        pool.set_shutdown_flag(100).unwrap();

        assert_eq!(pool.calc_pending_agg_interest(ONE_YEAR_SECS).unwrap(), 0);
        assert!(matches!(pool.set_shutdown_flag(200), Err(Error::SystemShutDown)));
        assert_eq!(pool.shutdown_time(), Some(100));
    }
}
