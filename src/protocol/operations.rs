//! Borrower, batch and stability pool operations.
//!
//! Each public method validates its inputs, mutates a draft of the engine and
//! commits the draft only when every step succeeded.

use tracing::{info, warn};

use crate::core::batch::Batch;
use crate::core::sorted_troves::SortedTroves;
use crate::core::token::DebtToken;
use crate::core::trove::*;
use crate::error::{Error, Result};
use crate::oracle::price_feed::PriceFeed;
use crate::pools::DepositOutcome;
use crate::protocol::events::*;
use crate::protocol::trove_manager::TroveManager;
use crate::utils::crypto::Address;
use crate::utils::math::*;

impl<F, S, L> TroveManager<F, S, L>
where
    F: PriceFeed + Clone,
    S: SortedTroves + Clone,
    L: DebtToken + Clone,
{
    // ═══════════════════════════════════════════════════════════════════════════
    // TROVE OPERATIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Open a trove with `coll` collateral, borrowing `debt` at `rate`
    pub fn open_trove(&mut self, owner: &Address, coll: u128, debt: u128, rate: u128) -> Result<TroveId> {
        self.atomically(|tm| {
            // Verify inputs
            tm.require_not_shut_down()?;
            tm.params.require_valid_interest_rate(rate)?;
            if coll == 0 {
                return Err(Error::ZeroAmount);
            }
            if debt < tm.params.min_debt {
                return Err(Error::DebtBelowMinimum {
                    amount: debt,
                    minimum: tm.params.min_debt,
                });
            }

            // Check collateralization including the upfront fee
            let price = tm.fetch_price()?;
            let upfront_fee = tm.upfront_fee(debt, rate)?;
            let entire_debt = safe_add(debt, upfront_fee)?;
            tm.require_cr(coll, entire_debt, price, tm.params.mcr)?;

            // Register trove
            let id = TroveId(tm.next_trove_id);
            tm.next_trove_id += 1;
            let mut trove = Trove::new(id, *owner, tm.now);
            trove.set_status(TroveStatus::Active)?;
            trove.annual_interest_rate = rate;
            trove.debt = entire_debt;
            trove.coll = coll;
            tm.troves.insert(id, trove);

            // Update aggregates
            let change = TroveChange {
                coll_increase: coll,
                debt_increase: debt,
                upfront_fee,
                new_weighted_recorded_debt: wide_mul(entire_debt, rate),
                ..Default::default()
            };
            tm.account_for_change(&change, None)?;
            tm.redistribution.add_stake(coll)?;
            tm.trove_mut(id)?.stake = coll;
            let snapshot = tm.redistribution.current_snapshot();
            tm.reward_snapshots.insert(id, snapshot);

            // Move collateral and tokens
            tm.pay_in_coll(coll)?;
            tm.ledger.mint(owner, debt)?;
            tm.sorted_troves.insert(id, rate)?;

            // Emit event
            tm.push_event(ProtocolEvent::TroveOpened(TroveOpenedEvent {
                trove_id: id,
                owner: *owner,
                coll,
                debt: entire_debt,
                upfront_fee,
                annual_interest_rate: rate,
                timestamp: tm.now,
            }));

            info!(%id, %owner, coll, debt = entire_debt, rate, "Trove opened");
            Ok(id)
        })
    }

    /// Add or withdraw collateral and borrow or repay debt
    pub fn adjust_trove(&mut self, owner: &Address, id: TroveId, adjustment: TroveAdjustment) -> Result<(u128, u128)> {
        self.atomically(|tm| {
            // Verify ownership and request
            let trove = tm.owned_open_trove(owner, id)?;
            adjustment.validate()?;
            if adjustment.is_risk_increasing() {
                tm.require_not_shut_down()?;
            }

            // Realize batch accruals so member data is exact
            if let Some(manager) = trove.batch_manager {
                tm.realize_batch(&manager)?;
            }
            let latest = tm.latest_trove_data(id)?;

            // Check bounds
            if adjustment.coll_decrease > latest.entire_coll {
                return Err(Error::AmountOutOfRange {
                    requested: adjustment.coll_decrease,
                    available: latest.entire_coll,
                });
            }
            if adjustment.debt_decrease > latest.entire_debt {
                return Err(Error::AmountOutOfRange {
                    requested: adjustment.debt_decrease,
                    available: latest.entire_debt,
                });
            }

            let upfront_fee = tm.upfront_fee(adjustment.debt_increase, latest.annual_interest_rate)?;
            let new_coll =
                safe_sub(safe_add(latest.entire_coll, adjustment.coll_increase)?, adjustment.coll_decrease)?;
            let new_debt = safe_sub(
                safe_add(safe_add(latest.entire_debt, adjustment.debt_increase)?, upfront_fee)?,
                adjustment.debt_decrease,
            )?;
            if new_debt < tm.params.min_debt {
                return Err(Error::DebtBelowMinimum {
                    amount: new_debt,
                    minimum: tm.params.min_debt,
                });
            }

            // Check collateralization
            if adjustment.is_risk_increasing() {
                let minimum = if trove.is_in_batch() {
                    safe_add(tm.params.mcr, tm.params.bcr)?
                } else {
                    tm.params.mcr
                };
                tm.require_cr(new_coll, new_debt, tm.fetch_price()?, minimum)?;
            }
            if adjustment.debt_decrease > 0 {
                let available = tm.ledger.balance_of(owner);
                if available < adjustment.debt_decrease {
                    return Err(Error::InsufficientBalance {
                        required: adjustment.debt_decrease,
                        available,
                    });
                }
            }

            // Apply
            let (new_coll, new_debt) = tm.apply_trove_update(id, &latest, &adjustment, upfront_fee, true)?;

            // Move collateral and tokens
            if adjustment.coll_increase > 0 {
                tm.pay_in_coll(adjustment.coll_increase)?;
            }
            tm.pay_out_from_active(owner, adjustment.coll_decrease)?;
            if adjustment.debt_increase > 0 {
                tm.ledger.mint(owner, adjustment.debt_increase)?;
            }
            if adjustment.debt_decrease > 0 {
                tm.ledger.burn(owner, adjustment.debt_decrease)?;
            }

            // Topped-up zombies return to the index
            if trove.status == TroveStatus::Zombie {
                tm.trove_mut(id)?.set_status(TroveStatus::Active)?;
                match trove.batch_manager {
                    Some(manager) => {
                        let rate = tm.batch(&manager)?.annual_interest_rate;
                        tm.sorted_troves.insert_into_batch(id, manager, rate)?;
                    }
                    None => tm.sorted_troves.insert(id, trove.annual_interest_rate)?,
                }
                if tm.last_zombie_trove_id == Some(id) {
                    tm.last_zombie_trove_id = None;
                }
            }

            // Emit event
            tm.push_event(ProtocolEvent::TroveAdjusted(TroveAdjustedEvent {
                trove_id: id,
                new_coll,
                new_debt,
                timestamp: tm.now,
            }));

            info!(%id, new_coll, new_debt, "Trove adjusted");
            Ok((new_coll, new_debt))
        })
    }

    /// Re-price a standalone active trove at `new_rate`
    pub fn adjust_trove_interest_rate(&mut self, owner: &Address, id: TroveId, new_rate: u128) -> Result<()> {
        self.atomically(|tm| {
            // Verify
            tm.require_not_shut_down()?;
            let trove = tm.owned_open_trove(owner, id)?;
            if trove.status != TroveStatus::Active {
                return Err(Error::TroveNotOpen {
                    id: id.0,
                    status: trove.status.to_string(),
                });
            }
            if trove.is_in_batch() {
                return Err(Error::TroveInBatch(id.0));
            }
            tm.params.require_valid_interest_rate(new_rate)?;

            // Realize interest and redistribution gains at the old rate
            let latest = tm.latest_trove_data(id)?;
            let change = TroveChange {
                applied_redist_debt_gain: latest.redist_debt_gain,
                applied_redist_coll_gain: latest.redist_coll_gain,
                old_weighted_recorded_debt: trove.weighted_recorded_debt(),
                new_weighted_recorded_debt: wide_mul(latest.entire_debt, new_rate),
                ..Default::default()
            };
            tm.move_pending_rewards_to_active_pool(latest.redist_debt_gain, latest.redist_coll_gain)?;
            tm.account_for_change(&change, None)?;

            let now = tm.now;
            let record = tm.trove_mut(id)?;
            record.debt = latest.entire_debt;
            record.coll = latest.entire_coll;
            record.annual_interest_rate = new_rate;
            record.last_debt_update_time = now;
            record.last_interest_rate_adj_time = now;
            tm.update_stake_and_snapshot(id, latest.entire_coll)?;

            // Re-position
            tm.sorted_troves.remove(id)?;
            tm.sorted_troves.insert(id, new_rate)?;

            tm.push_event(ProtocolEvent::InterestRateAdjusted(InterestRateAdjustedEvent {
                trove_id: id,
                old_rate: trove.annual_interest_rate,
                new_rate,
                timestamp: now,
            }));

            info!(%id, old_rate = trove.annual_interest_rate, new_rate, "Interest rate adjusted");
            Ok(())
        })
    }

    /// Repay a trove's entire debt and take back its collateral
    pub fn close_trove(&mut self, owner: &Address, id: TroveId) -> Result<()> {
        self.atomically(|tm| {
            // Verify
            let trove = tm.owned_open_trove(owner, id)?;
            if !tm.is_shut_down() && tm.open_trove_count() <= 1 {
                return Err(Error::OnlyOneTroveInSystem);
            }
            if let Some(manager) = trove.batch_manager {
                tm.realize_batch(&manager)?;
            }
            let latest = tm.latest_trove_data(id)?;
            let available = tm.ledger.balance_of(owner);
            if available < latest.entire_debt {
                return Err(Error::InsufficientBalance {
                    required: latest.entire_debt,
                    available,
                });
            }

            // Zero the position and remove it
            let repayment = TroveAdjustment {
                coll_decrease: latest.entire_coll,
                debt_decrease: latest.entire_debt,
                ..Default::default()
            };
            tm.apply_trove_update(id, &latest, &repayment, 0, false)?;
            tm.remove_trove(id, TroveStatus::ClosedByOwner)?;

            // Move collateral and tokens
            tm.pay_out_from_active(owner, latest.entire_coll)?;
            if latest.entire_debt > 0 {
                tm.ledger.burn(owner, latest.entire_debt)?;
            }

            tm.push_event(ProtocolEvent::TroveClosed(TroveClosedEvent {
                trove_id: id,
                owner: *owner,
                debt_repaid: latest.entire_debt,
                coll_returned: latest.entire_coll,
                timestamp: tm.now,
            }));

            info!(%id, %owner, debt = latest.entire_debt, coll = latest.entire_coll, "Trove closed");
            Ok(())
        })
    }

    /// Claim collateral left over from liquidations and full redemptions
    pub fn claim_coll_surplus(&mut self, owner: &Address) -> Result<u128> {
        self.atomically(|tm| {
            let coll = tm.coll_surplus_pool.claim_coll(owner)?;
            tm.credit_payout(owner, coll)?;

            tm.push_event(ProtocolEvent::SurplusClaimed(CollClaimedEvent {
                account: *owner,
                coll,
                timestamp: tm.now,
            }));
            info!(%owner, coll, "Collateral surplus claimed");
            Ok(coll)
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BATCH OPERATIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Register an interest-rate batch run by `manager`
    pub fn create_batch(&mut self, manager: &Address, rate: u128, annual_management_fee: u128) -> Result<()> {
        self.atomically(|tm| {
            tm.require_not_shut_down()?;
            tm.params.require_valid_interest_rate(rate)?;
            if annual_management_fee > tm.params.max_annual_batch_management_fee {
                return Err(Error::ManagementFeeTooHigh {
                    fee: annual_management_fee,
                    max: tm.params.max_annual_batch_management_fee,
                });
            }
            if tm.batches.contains_key(manager) {
                return Err(Error::BatchAlreadyExists(manager.to_string()));
            }

            tm.batches
                .insert(*manager, Batch::new(*manager, rate, annual_management_fee, tm.now));

            tm.push_event(ProtocolEvent::BatchCreated(BatchCreatedEvent {
                manager: *manager,
                annual_interest_rate: rate,
                annual_management_fee,
                timestamp: tm.now,
            }));
            info!(%manager, rate, annual_management_fee, "Batch created");
            Ok(())
        })
    }

    /// Move a standalone active trove into `manager`'s batch
    pub fn join_batch(&mut self, owner: &Address, id: TroveId, manager: &Address) -> Result<()> {
        self.atomically(|tm| {
            // Verify
            tm.require_not_shut_down()?;
            let trove = tm.owned_open_trove(owner, id)?;
            if trove.status != TroveStatus::Active {
                return Err(Error::TroveNotOpen {
                    id: id.0,
                    status: trove.status.to_string(),
                });
            }
            if trove.is_in_batch() {
                return Err(Error::TroveInBatch(id.0));
            }
            tm.batch(manager)?;

            let latest = tm.latest_trove_data(id)?;
            let minimum = safe_add(tm.params.mcr, tm.params.bcr)?;
            tm.require_cr(latest.entire_coll, latest.entire_debt, tm.fetch_price()?, minimum)?;

            // Realize batch accruals, then fold the trove's weight into the batch
            tm.realize_batch(manager)?;
            let mut batch = tm.batch(manager)?.clone();
            let new_batch_debt = safe_add(batch.debt, latest.entire_debt)?;
            let change = TroveChange {
                applied_redist_debt_gain: latest.redist_debt_gain,
                applied_redist_coll_gain: latest.redist_coll_gain,
                old_weighted_recorded_debt: wide_add(trove.weighted_recorded_debt(), batch.weighted_recorded_debt())?,
                new_weighted_recorded_debt: wide_mul(new_batch_debt, batch.annual_interest_rate),
                old_weighted_recorded_batch_management_fee: batch.weighted_management_fee(),
                new_weighted_recorded_batch_management_fee: wide_mul(new_batch_debt, batch.annual_management_fee),
                ..Default::default()
            };
            tm.move_pending_rewards_to_active_pool(latest.redist_debt_gain, latest.redist_coll_gain)?;
            tm.account_for_change(&change, Some(manager))?;

            // Mint shares
            let shares = batch.shares_for_debt(latest.entire_debt)?;
            batch.total_debt_shares = safe_add(batch.total_debt_shares, shares)?;
            batch.debt = new_batch_debt;
            batch.coll = safe_add(batch.coll, latest.entire_coll)?;
            batch.last_debt_update_time = tm.now;
            let batch_rate = batch.annual_interest_rate;
            tm.batches.insert(*manager, batch);

            let now = tm.now;
            let record = tm.trove_mut(id)?;
            record.batch_manager = Some(*manager);
            record.batch_debt_shares = shares;
            record.debt = latest.entire_debt;
            record.coll = latest.entire_coll;
            record.annual_interest_rate = batch_rate;
            record.last_debt_update_time = now;
            record.last_interest_rate_adj_time = now;
            tm.update_stake_and_snapshot(id, latest.entire_coll)?;

            // Re-position at the batch rate
            tm.sorted_troves.remove(id)?;
            tm.sorted_troves.insert_into_batch(id, *manager, batch_rate)?;

            tm.push_event(ProtocolEvent::TroveJoinedBatch(BatchMembershipEvent {
                trove_id: id,
                manager: *manager,
                annual_interest_rate: batch_rate,
                timestamp: now,
            }));
            info!(%id, %manager, shares, "Trove joined batch");
            Ok(())
        })
    }

    /// Take a trove out of its batch and make it standalone at `new_rate`
    pub fn exit_batch(&mut self, owner: &Address, id: TroveId, new_rate: u128) -> Result<()> {
        self.atomically(|tm| {
            // Verify
            tm.require_not_shut_down()?;
            let trove = tm.owned_open_trove(owner, id)?;
            if trove.status != TroveStatus::Active {
                return Err(Error::TroveNotOpen {
                    id: id.0,
                    status: trove.status.to_string(),
                });
            }
            let manager = trove.batch_manager.ok_or(Error::TroveNotInBatch(id.0))?;
            tm.params.require_valid_interest_rate(new_rate)?;

            // Realize batch accruals and split the member out
            tm.realize_batch(&manager)?;
            let latest = tm.latest_trove_data(id)?;
            let mut batch = tm.batch(&manager)?.clone();
            let new_batch_debt = safe_sub(batch.debt, latest.recorded_debt)?;
            let change = TroveChange {
                applied_redist_debt_gain: latest.redist_debt_gain,
                applied_redist_coll_gain: latest.redist_coll_gain,
                old_weighted_recorded_debt: batch.weighted_recorded_debt(),
                new_weighted_recorded_debt: wide_add(
                    wide_mul(new_batch_debt, batch.annual_interest_rate),
                    wide_mul(latest.entire_debt, new_rate),
                )?,
                old_weighted_recorded_batch_management_fee: batch.weighted_management_fee(),
                new_weighted_recorded_batch_management_fee: wide_mul(new_batch_debt, batch.annual_management_fee),
                ..Default::default()
            };
            tm.move_pending_rewards_to_active_pool(latest.redist_debt_gain, latest.redist_coll_gain)?;
            tm.account_for_change(&change, Some(&manager))?;

            batch.total_debt_shares = safe_sub(batch.total_debt_shares, trove.batch_debt_shares)?;
            batch.debt = new_batch_debt;
            batch.coll = safe_sub(batch.coll, trove.coll)?;
            batch.last_debt_update_time = tm.now;
            tm.batches.insert(manager, batch);

            let now = tm.now;
            let record = tm.trove_mut(id)?;
            record.batch_manager = None;
            record.batch_debt_shares = 0;
            record.debt = latest.entire_debt;
            record.coll = latest.entire_coll;
            record.annual_interest_rate = new_rate;
            record.last_debt_update_time = now;
            record.last_interest_rate_adj_time = now;
            tm.update_stake_and_snapshot(id, latest.entire_coll)?;

            // Re-position at the new rate
            tm.sorted_troves.remove_from_batch(id)?;
            tm.sorted_troves.insert(id, new_rate)?;

            tm.push_event(ProtocolEvent::TroveExitedBatch(BatchMembershipEvent {
                trove_id: id,
                manager,
                annual_interest_rate: new_rate,
                timestamp: now,
            }));
            info!(%id, %manager, new_rate, "Trove exited batch");
            Ok(())
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STABILITY POOL OPERATIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Deposit into the stability pool
    pub fn provide_to_sp(&mut self, depositor: &Address, amount: u128, do_claim: bool) -> Result<DepositOutcome> {
        self.atomically(|tm| {
            tm.active_pool
                .mint_agg_interest(tm.now, 0, &mut tm.stability_pool, &mut tm.ledger)?;
            let outcome = tm
                .stability_pool
                .provide_to_sp(depositor, amount, do_claim, &mut tm.ledger)?;
            tm.credit_payout(depositor, outcome.coll_sent)?;

            tm.push_event(ProtocolEvent::StabilityDeposit(StabilityDepositEvent {
                depositor: *depositor,
                amount,
                new_deposit: outcome.new_deposit,
                timestamp: tm.now,
            }));
            Ok(outcome)
        })
    }

    /// Withdraw up to `amount` from the stability pool
    pub fn withdraw_from_sp(&mut self, depositor: &Address, amount: u128, do_claim: bool) -> Result<DepositOutcome> {
        self.atomically(|tm| {
            tm.active_pool
                .mint_agg_interest(tm.now, 0, &mut tm.stability_pool, &mut tm.ledger)?;
            let outcome = tm
                .stability_pool
                .withdraw_from_sp(depositor, amount, do_claim, &mut tm.ledger)?;
            tm.credit_payout(depositor, outcome.coll_sent)?;

            tm.push_event(ProtocolEvent::StabilityWithdrawal(StabilityDepositEvent {
                depositor: *depositor,
                amount: outcome.withdrawn,
                new_deposit: outcome.new_deposit,
                timestamp: tm.now,
            }));
            Ok(outcome)
        })
    }

    /// Pay out the stashed collateral of a depositor who has withdrawn
    pub fn claim_all_coll_gains(&mut self, depositor: &Address) -> Result<u128> {
        self.atomically(|tm| {
            tm.active_pool
                .mint_agg_interest(tm.now, 0, &mut tm.stability_pool, &mut tm.ledger)?;
            let coll = tm.stability_pool.claim_all_coll_gains(depositor)?;
            tm.credit_payout(depositor, coll)?;

            tm.push_event(ProtocolEvent::CollGainsClaimed(CollClaimedEvent {
                account: *depositor,
                coll,
                timestamp: tm.now,
            }));
            info!(%depositor, coll, "Stability pool collateral claimed");
            Ok(coll)
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SHUTDOWN
    // ═══════════════════════════════════════════════════════════════════════════

    /// Freeze interest accrual and switch to urgent redemptions
    pub fn shutdown(&mut self) -> Result<()> {
        self.atomically(|tm| {
            tm.require_not_shut_down()?;
            let tcr = tm.get_tcr().ok();

            tm.active_pool
                .mint_agg_interest(tm.now, 0, &mut tm.stability_pool, &mut tm.ledger)?;
            tm.active_pool.set_shutdown_flag(tm.now)?;

            tm.push_event(ProtocolEvent::Shutdown(ShutdownEvent {
                tcr,
                timestamp: tm.now,
            }));
            warn!(?tcr, timestamp = tm.now, "System shut down");
            Ok(())
        })
    }

    /// Shut down if TCR fell below the shutdown ratio. Returns whether it did.
    pub fn shutdown_if_undercollateralized(&mut self) -> Result<bool> {
        self.require_not_shut_down()?;
        let tcr = self.get_tcr()?;
        if tcr >= self.params.scr {
            return Ok(false);
        }
        self.shutdown()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use crate::core::config::ProtocolParams;
    use crate::core::sorted_troves::SortedTroves;
    use crate::core::token::DebtToken;
    use crate::core::trove::{TroveAdjustment, TroveStatus};
    use crate::error::Error;
    use crate::protocol::trove_manager::InMemoryTroveManager;
    use crate::utils::constants::ONE_YEAR_SECS;
    use crate::utils::crypto::Address;
    use crate::utils::math::{percent, units};

    fn setup() -> InMemoryTroveManager {
        InMemoryTroveManager::in_memory(ProtocolParams::default(), units(2_000)).unwrap()
    }

    fn alice() -> Address {
        Address::from_label("alice")
    }

    fn bob() -> Address {
        Address::from_label("bob")
    }

    #[test]
    fn test_open_trove() {
        let mut tm = setup();
        let id = tm.open_trove(&alice(), units(10), units(5_000), percent(5)).unwrap();

        let trove = tm.trove(id).unwrap();
        assert_eq!(trove.status, TroveStatus::Active);
        assert_eq!(trove.debt, units(5_000));
        assert_eq!(trove.stake, units(10));
        assert_eq!(tm.ledger().balance_of(&alice()), units(5_000));
        assert_eq!(tm.active_pool().coll_balance(), units(10));
        assert!(tm.sorted_troves().contains(id));
        assert_eq!(tm.events().filter_by_type("TroveOpened").len(), 1);
        tm.check_invariants().unwrap();
    }

    #[test]
    fn test_open_trove_validation() {
        let mut tm = setup();
        assert!(matches!(
            tm.open_trove(&alice(), units(10), units(1_000), percent(5)),
            Err(Error::DebtBelowMinimum { .. })
        ));
        assert!(matches!(
            tm.open_trove(&alice(), units(10), units(5_000), percent(300)),
            Err(Error::InterestRateOutOfBounds { .. })
        ));
        // 1 coll at 2000 cannot back 2000 debt at 110%
        assert!(matches!(
            tm.open_trove(&alice(), units(1), units(2_000), percent(5)),
            Err(Error::CollateralizationRatioTooLow { .. })
        ));
        assert!(tm.events().is_empty());
    }

    #[test]
    fn test_upfront_fee_charged() {
        let params = ProtocolParams::default().with_upfront_interest_period(ONE_YEAR_SECS / 52);
        let mut tm = InMemoryTroveManager::in_memory(params, units(2_000)).unwrap();
        let id = tm.open_trove(&alice(), units(10), units(5_000), percent(5)).unwrap();

        let trove = tm.trove(id).unwrap();
        assert!(trove.debt > units(5_000));
        assert_eq!(tm.ledger().balance_of(&alice()), units(5_000));
        tm.check_invariants().unwrap();
    }

    #[test]
    fn test_adjust_trove() {
        let mut tm = setup();
        let id = tm.open_trove(&alice(), units(10), units(5_000), percent(5)).unwrap();

        let (coll, debt) = tm.adjust_trove(&alice(), id, TroveAdjustment::add_coll(units(2))).unwrap();
        assert_eq!((coll, debt), (units(12), units(5_000)));

        let (_, debt) = tm.adjust_trove(&alice(), id, TroveAdjustment::repay(units(1_000))).unwrap();
        assert_eq!(debt, units(4_000));
        assert_eq!(tm.ledger().balance_of(&alice()), units(4_000));

        let (coll, _) = tm.adjust_trove(&alice(), id, TroveAdjustment::withdraw_coll(units(1))).unwrap();
        assert_eq!(coll, units(11));
        assert_eq!(tm.coll_balance_of(&alice()), units(1));
        tm.check_invariants().unwrap();
    }

    #[test]
    fn test_adjust_trove_rejects_unsafe_withdrawal() {
        let mut tm = setup();
        let id = tm.open_trove(&alice(), units(10), units(5_000), percent(5)).unwrap();
        let before = tm.state_hash().unwrap();

        assert!(matches!(
            tm.adjust_trove(&alice(), id, TroveAdjustment::withdraw_coll(units(8))),
            Err(Error::CollateralizationRatioTooLow { .. })
        ));
        assert!(matches!(
            tm.adjust_trove(&bob(), id, TroveAdjustment::add_coll(units(1))),
            Err(Error::Unauthorized(_))
        ));
        assert!(matches!(
            tm.adjust_trove(&alice(), id, TroveAdjustment::repay(units(4_000))),
            Err(Error::DebtBelowMinimum { .. })
        ));
        assert_eq!(tm.state_hash().unwrap(), before);
    }

    #[test]
    fn test_batch_member_adjustment_needs_buffer() {
        let mut tm = setup();
        let manager = Address::from_label("manager");
        tm.create_batch(&manager, percent(5), 0).unwrap();
        let id = tm.open_trove(&alice(), units(10), units(5_000), percent(5)).unwrap();
        tm.join_batch(&alice(), id, &manager).unwrap();

        // 17_000 debt is about 117.6%: enough for MCR, short of MCR + BCR
        assert!(matches!(
            tm.adjust_trove(&alice(), id, TroveAdjustment::borrow(units(12_000))),
            Err(Error::CollateralizationRatioTooLow { .. })
        ));
        tm.adjust_trove(&alice(), id, TroveAdjustment::borrow(units(10_000))).unwrap();
        tm.check_invariants().unwrap();
    }

    #[test]
    fn test_interest_accrues_and_rate_adjusts() {
        let mut tm = setup();
        let id = tm.open_trove(&alice(), units(10), units(10_000), percent(5)).unwrap();
        tm.advance_time(ONE_YEAR_SECS).unwrap();

        let latest = tm.latest_trove_data(id).unwrap();
        assert_eq!(latest.accrued_interest, units(500));
        assert_eq!(latest.entire_debt, units(10_500));

        tm.adjust_trove_interest_rate(&alice(), id, percent(10)).unwrap();
        let trove = tm.trove(id).unwrap();
        assert_eq!(trove.debt, units(10_500));
        assert_eq!(trove.annual_interest_rate, percent(10));
        tm.check_invariants().unwrap();
    }

    #[test]
    fn test_close_trove() {
        let mut tm = setup();
        let id = tm.open_trove(&alice(), units(10), units(5_000), percent(5)).unwrap();
        tm.open_trove(&bob(), units(10), units(5_000), percent(5)).unwrap();

        tm.close_trove(&alice(), id).unwrap();
        assert_eq!(tm.trove(id).unwrap().status, TroveStatus::ClosedByOwner);
        assert_eq!(tm.coll_balance_of(&alice()), units(10));
        assert_eq!(tm.ledger().balance_of(&alice()), 0);
        assert!(!tm.sorted_troves().contains(id));
        tm.check_invariants().unwrap();

        // Closed troves stay closed
        assert!(matches!(
            tm.adjust_trove(&alice(), id, TroveAdjustment::add_coll(units(1))),
            Err(Error::TroveNotOpen { .. })
        ));
    }

    #[test]
    fn test_close_last_trove_fails() {
        let mut tm = setup();
        let id = tm.open_trove(&alice(), units(10), units(5_000), percent(5)).unwrap();
        assert!(matches!(tm.close_trove(&alice(), id), Err(Error::OnlyOneTroveInSystem)));
    }

    #[test]
    fn test_batch_lifecycle() {
        let mut tm = setup();
        let manager = Address::from_label("manager");
        tm.create_batch(&manager, percent(4), percent(1)).unwrap();
        assert!(matches!(
            tm.create_batch(&manager, percent(4), percent(1)),
            Err(Error::BatchAlreadyExists(_))
        ));
        assert!(matches!(
            tm.create_batch(&bob(), percent(4), percent(20)),
            Err(Error::ManagementFeeTooHigh { .. })
        ));

        let id = tm.open_trove(&alice(), units(10), units(5_000), percent(5)).unwrap();
        tm.join_batch(&alice(), id, &manager).unwrap();

        let batch = tm.batch(&manager).unwrap();
        assert_eq!(batch.debt, units(5_000));
        assert_eq!(batch.total_debt_shares, units(5_000));
        assert_eq!(tm.trove(id).unwrap().batch_debt_shares, units(5_000));
        tm.check_invariants().unwrap();

        tm.advance_time(ONE_YEAR_SECS).unwrap();
        let latest = tm.latest_trove_data(id).unwrap();
        assert_eq!(latest.accrued_interest, units(200));
        assert_eq!(latest.accrued_batch_management_fee, units(50));

        tm.exit_batch(&alice(), id, percent(6)).unwrap();
        let trove = tm.trove(id).unwrap();
        assert!(!trove.is_in_batch());
        assert_eq!(trove.debt, units(5_250));
        assert_eq!(tm.ledger().balance_of(&manager), units(50));
        assert_eq!(tm.batch(&manager).unwrap().total_debt_shares, 0);
        tm.check_invariants().unwrap();
    }

    #[test]
    fn test_stability_pool_round_trip() {
        let mut tm = setup();
        tm.open_trove(&alice(), units(10), units(5_000), percent(5)).unwrap();

        let outcome = tm.provide_to_sp(&alice(), units(3_000), false).unwrap();
        assert_eq!(outcome.new_deposit, units(3_000));
        assert_eq!(tm.stability_pool().total_bold_deposits(), units(3_000));

        let outcome = tm.withdraw_from_sp(&alice(), units(1_000), true).unwrap();
        assert_eq!(outcome.withdrawn, units(1_000));
        assert_eq!(tm.ledger().balance_of(&alice()), units(3_000));
        assert!(matches!(tm.claim_all_coll_gains(&alice()), Err(Error::ActiveDeposit(_))));
        tm.check_invariants().unwrap();
    }

    #[test]
    fn test_shutdown_freezes_accrual() {
        let mut tm = setup();
        let id = tm.open_trove(&alice(), units(10), units(10_000), percent(5)).unwrap();
        tm.advance_time(ONE_YEAR_SECS / 2).unwrap();
        tm.shutdown().unwrap();
        let frozen = tm.latest_trove_data(id).unwrap().entire_debt;

        tm.advance_time(ONE_YEAR_SECS).unwrap();
        assert_eq!(tm.latest_trove_data(id).unwrap().entire_debt, frozen);
        assert!(matches!(tm.shutdown(), Err(Error::SystemShutDown)));
        assert!(matches!(
            tm.open_trove(&bob(), units(10), units(5_000), percent(5)),
            Err(Error::SystemShutDown)
        ));
        assert!(matches!(
            tm.adjust_trove(&alice(), id, TroveAdjustment::borrow(units(100))),
            Err(Error::SystemShutDown)
        ));
        tm.adjust_trove(&alice(), id, TroveAdjustment::add_coll(units(1))).unwrap();
        tm.check_invariants().unwrap();
    }

    #[test]
    fn test_shutdown_if_undercollateralized() {
        let mut tm = setup();
        tm.open_trove(&alice(), units(10), units(10_000), percent(5)).unwrap();
        assert!(!tm.shutdown_if_undercollateralized().unwrap());

        tm.price_feed_mut().set_price(units(1_000));
        assert!(tm.shutdown_if_undercollateralized().unwrap());
        assert!(tm.is_shut_down());
    }
}
