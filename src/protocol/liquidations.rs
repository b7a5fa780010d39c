//! Liquidation of undercollateralized troves.
//!
//! Single and batch liquidation share one loop. Each eligible trove is split
//! by `offset_and_redistribution_vals`, closed, and its batch settled; the
//! accumulated totals are then applied to the stability pool, the
//! redistribution accumulators and the default pool in one pass.

use tracing::{debug, info};

use crate::core::sorted_troves::SortedTroves;
use crate::core::token::DebtToken;
use crate::core::trove::*;
use crate::error::{Error, Result};
use crate::liquidation::engine::{offset_and_redistribution_vals, LiquidationOutcome};
use crate::oracle::price_feed::PriceFeed;
use crate::protocol::events::{ProtocolEvent, TroveLiquidatedEvent};
use crate::protocol::trove_manager::TroveManager;
use crate::utils::crypto::Address;
use crate::utils::math::*;

impl<F, S, L> TroveManager<F, S, L>
where
    F: PriceFeed + Clone,
    S: SortedTroves + Clone,
    L: DebtToken + Clone,
{
    /// Liquidate one trove; fails unless its ICR is below MCR
    pub fn liquidate(&mut self, liquidator: &Address, id: TroveId) -> Result<LiquidationOutcome> {
        self.atomically(|tm| {
            tm.require_not_shut_down()?;
            tm.trove(id)?.require_open()?;

            let price = tm.fetch_price()?;
            let icr = tm.icr_at(id, price)?;
            if icr >= tm.params.mcr {
                return Err(Error::TroveNotLiquidatable {
                    id: id.0,
                    icr,
                    mcr: tm.params.mcr,
                });
            }
            tm.liquidate_troves(liquidator, &[id], price)
        })
    }

    /// Liquidate every eligible trove in `ids`, skipping the rest
    pub fn batch_liquidate_troves(&mut self, liquidator: &Address, ids: &[TroveId]) -> Result<LiquidationOutcome> {
        self.atomically(|tm| {
            tm.require_not_shut_down()?;
            if ids.is_empty() {
                return Err(Error::EmptyTroveList);
            }
            let price = tm.fetch_price()?;
            tm.liquidate_troves(liquidator, ids, price)
        })
    }

    fn liquidate_troves(&mut self, liquidator: &Address, ids: &[TroveId], price: u128) -> Result<LiquidationOutcome> {
        let mut outcome = LiquidationOutcome::default();
        let mut standalone_change = TroveChange::default();
        let mut sp_available = self.stability_pool.available_for_offset();

        for &id in ids {
            let trove = match self.troves.get(&id) {
                Some(trove) if trove.status.is_open() => trove.clone(),
                _ => {
                    debug!(%id, "Skipping trove that is not open");
                    continue;
                }
            };
            let mut latest = self.latest_trove_data(id)?;
            let icr = compute_cr(latest.entire_coll, latest.entire_debt, price)?;
            if icr >= self.params.mcr {
                debug!(%id, icr, "Skipping healthy trove");
                continue;
            }

            // Batch members are settled against a realized batch
            if let Some(manager) = trove.batch_manager {
                self.realize_batch(&manager)?;
                latest = self.latest_trove_data(id)?;
            }

            let values = offset_and_redistribution_vals(
                latest.entire_debt,
                latest.entire_coll,
                sp_available,
                price,
                &self.params,
            )?;
            sp_available -= values.debt_to_offset;
            self.move_pending_rewards_to_active_pool(latest.redist_debt_gain, latest.redist_coll_gain)?;

            let mut change = TroveChange {
                applied_redist_debt_gain: latest.redist_debt_gain,
                applied_redist_coll_gain: latest.redist_coll_gain,
                coll_decrease: latest.entire_coll,
                debt_decrease: latest.entire_debt,
                ..Default::default()
            };
            match trove.batch_manager {
                None => {
                    change.old_weighted_recorded_debt = trove.weighted_recorded_debt();
                    standalone_change.accumulate(&change)?;
                }
                Some(manager) => {
                    let batch = self.batch(&manager)?.clone();
                    let new_batch_debt = safe_sub(batch.debt, latest.recorded_debt)?;
                    change.old_weighted_recorded_debt = batch.weighted_recorded_debt();
                    change.new_weighted_recorded_debt = wide_mul(new_batch_debt, batch.annual_interest_rate);
                    change.old_weighted_recorded_batch_management_fee = batch.weighted_management_fee();
                    change.new_weighted_recorded_batch_management_fee =
                        wide_mul(new_batch_debt, batch.annual_management_fee);
                    self.account_for_change(&change, Some(&manager))?;
                    self.batch_mut(&manager)?.debt = new_batch_debt;
                }
            }

            self.remove_trove(id, TroveStatus::ClosedByLiquidation)?;
            if values.coll_surplus > 0 {
                self.active_pool.send_coll(values.coll_surplus)?;
                self.coll_surplus_pool.account_surplus(&trove.owner, values.coll_surplus)?;
            }

            self.push_event(ProtocolEvent::TroveLiquidated(TroveLiquidatedEvent {
                trove_id: id,
                liquidator: *liquidator,
                debt: latest.entire_debt,
                coll: latest.entire_coll,
                debt_offset: values.debt_to_offset,
                debt_redistributed: values.debt_to_redistribute,
                coll_surplus: values.coll_surplus,
                timestamp: self.now,
            }));

            outcome.totals.add(&values)?;
            outcome.liquidated.push(id);
        }

        if outcome.liquidated.is_empty() {
            return Err(Error::NothingToLiquidate);
        }
        let totals = outcome.totals;

        // Apply accumulated standalone changes
        self.account_for_change(&standalone_change, None)?;

        // Offset against the stability pool
        if totals.debt_to_offset > 0 {
            self.stability_pool.offset(
                totals.debt_to_offset,
                totals.coll_to_send_to_sp,
                &mut self.active_pool,
                &mut self.ledger,
            )?;
        }

        // Redistribute the rest over remaining stakes
        if totals.debt_to_redistribute > 0 {
            self.redistribution
                .redistribute(totals.coll_to_redistribute, totals.debt_to_redistribute)?;
            if totals.coll_to_redistribute > 0 {
                self.active_pool
                    .send_coll_to_default_pool(totals.coll_to_redistribute, &mut self.default_pool)?;
            }
            self.default_pool.increase_bold_debt(totals.debt_to_redistribute)?;
        }

        // Compensate the liquidator
        self.pay_out_from_active(liquidator, totals.coll_gas_compensation)?;

        let total_coll = self.entire_system_coll()?;
        self.redistribution.update_system_snapshots(total_coll);

        info!(
            count = outcome.count(),
            debt_offset = totals.debt_to_offset,
            debt_redistributed = totals.debt_to_redistribute,
            "Liquidated troves"
        );
        Ok(outcome)
    }
}
