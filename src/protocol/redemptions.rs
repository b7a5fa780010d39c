//! Redemptions.
//!
//! Ordinary redemptions walk the ordered index from the lowest interest rate
//! upward, resuming at the last partially redeemed zombie. Urgent redemptions
//! are only available after shutdown and take an explicit trove list.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::sorted_troves::SortedTroves;
use crate::core::token::DebtToken;
use crate::core::trove::*;
use crate::error::{Error, Result};
use crate::oracle::price_feed::PriceFeed;
use crate::protocol::events::{ProtocolEvent, RedemptionEvent};
use crate::protocol::trove_manager::TroveManager;
use crate::utils::constants::{DECIMAL_PRECISION, ONE_HUNDRED_PCT};
use crate::utils::crypto::Address;
use crate::utils::math::*;

/// Totals of a redemption call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionOutcome {
    /// Debt tokens burned
    pub redeemed: u128,
    /// Collateral paid to the redeemer
    pub coll_drawn: u128,
    /// Collateral fee left with the borrowers
    pub coll_fee: u128,
    /// Troves redeemed from, in order
    pub troves: Vec<TroveId>,
}

impl<F, S, L> TroveManager<F, S, L>
where
    F: PriceFeed + Clone,
    S: SortedTroves + Clone,
    L: DebtToken + Clone,
{
    /// Redeem `amount` debt tokens for collateral, lowest rates first.
    /// `max_iterations = 0` visits troves until the amount is exhausted.
    pub fn redeem_collateral(
        &mut self,
        redeemer: &Address,
        amount: u128,
        max_iterations: usize,
    ) -> Result<RedemptionOutcome> {
        self.atomically(|tm| {
            // Verify
            tm.require_not_shut_down()?;
            tm.require_redeemable(redeemer, amount)?;
            let price = tm.fetch_price()?;

            let mut outcome = RedemptionOutcome::default();
            let mut remaining = amount;
            let mut iterations = 0usize;
            let mut current = match tm.last_zombie_trove_id {
                Some(id) if tm.troves.get(&id).map(|t| t.status) == Some(TroveStatus::Zombie) => Some(id),
                _ => tm.sorted_troves.get_last(),
            };

            while let Some(id) = current {
                if remaining == 0 || (max_iterations > 0 && iterations >= max_iterations) {
                    break;
                }
                iterations += 1;

                let trove = tm.trove(id)?.clone();
                current = if trove.status == TroveStatus::Zombie {
                    tm.sorted_troves.get_last()
                } else {
                    tm.sorted_troves.get_prev(id)
                };

                // Never worsen troves already under water
                let icr = tm.icr_at(id, price)?;
                if icr < ONE_HUNDRED_PCT {
                    debug!(%id, icr, "Skipping trove below 100%");
                    continue;
                }

                if let Some(manager) = trove.batch_manager {
                    tm.realize_batch(&manager)?;
                }
                let latest = tm.latest_trove_data(id)?;

                // Collateral lot at price minus the fee
                let lot = remaining.min(latest.entire_debt);
                let coll = debt_to_coll(lot, price)?;
                let fee = apply_fraction(coll, tm.params.redemption_fee_rate)?;
                let coll_lot = coll - fee;

                let redemption = TroveAdjustment {
                    coll_decrease: coll_lot,
                    debt_decrease: lot,
                    ..Default::default()
                };
                let (new_coll, new_debt) = tm.apply_trove_update(id, &latest, &redemption, 0, false)?;
                tm.settle_redeemed_trove(&trove, new_coll, new_debt)?;

                remaining -= lot;
                outcome.redeemed = safe_add(outcome.redeemed, lot)?;
                outcome.coll_drawn = safe_add(outcome.coll_drawn, coll_lot)?;
                outcome.coll_fee = safe_add(outcome.coll_fee, fee)?;
                outcome.troves.push(id);
            }

            if outcome.redeemed == 0 {
                return Err(Error::NothingToRedeem);
            }

            // Pay the redeemer and burn the redeemed debt
            tm.pay_out_from_active(redeemer, outcome.coll_drawn)?;
            tm.ledger.burn(redeemer, outcome.redeemed)?;

            tm.push_event(ProtocolEvent::Redemption(RedemptionEvent {
                redeemer: *redeemer,
                redeemed: outcome.redeemed,
                coll_drawn: outcome.coll_drawn,
                coll_fee: outcome.coll_fee,
                troves: outcome.troves.clone(),
                timestamp: tm.now,
            }));

            info!(
                %redeemer,
                redeemed = outcome.redeemed,
                coll_drawn = outcome.coll_drawn,
                troves = outcome.troves.len(),
                "Redemption"
            );
            Ok(outcome)
        })
    }

    /// Redeem from `trove_ids` at a collateral bonus after shutdown
    pub fn urgent_redemption(
        &mut self,
        redeemer: &Address,
        amount: u128,
        trove_ids: &[TroveId],
        min_collateral: u128,
    ) -> Result<RedemptionOutcome> {
        self.atomically(|tm| {
            // Verify
            tm.require_shut_down()?;
            tm.require_redeemable(redeemer, amount)?;
            let price = tm.fetch_price()?;
            let bonus_factor = safe_add(DECIMAL_PRECISION, tm.params.urgent_redemption_bonus)?;

            let mut outcome = RedemptionOutcome::default();
            let mut remaining = amount;

            for &id in trove_ids {
                if remaining == 0 {
                    break;
                }
                let trove = match tm.troves.get(&id) {
                    Some(trove) if trove.status.is_open() => trove.clone(),
                    _ => {
                        debug!(%id, "Skipping trove that is not open");
                        continue;
                    }
                };

                if let Some(manager) = trove.batch_manager {
                    tm.realize_batch(&manager)?;
                }
                let latest = tm.latest_trove_data(id)?;

                // Collateral at price plus the bonus, capped by the trove
                let mut lot = remaining.min(latest.entire_debt);
                let mut coll = mul_div(lot, bonus_factor, price)?;
                if coll > latest.entire_coll {
                    coll = latest.entire_coll;
                    lot = mul_div(coll, price, bonus_factor)?;
                }
                if lot == 0 {
                    continue;
                }

                let redemption = TroveAdjustment {
                    coll_decrease: coll,
                    debt_decrease: lot,
                    ..Default::default()
                };
                let (new_coll, new_debt) = tm.apply_trove_update(id, &latest, &redemption, 0, false)?;
                tm.settle_redeemed_trove(&trove, new_coll, new_debt)?;

                remaining -= lot;
                outcome.redeemed = safe_add(outcome.redeemed, lot)?;
                outcome.coll_drawn = safe_add(outcome.coll_drawn, coll)?;
                outcome.troves.push(id);
            }

            if outcome.redeemed == 0 {
                return Err(Error::NothingToRedeem);
            }
            if outcome.coll_drawn < min_collateral {
                return Err(Error::CollateralBelowMinimum {
                    received: outcome.coll_drawn,
                    minimum: min_collateral,
                });
            }

            tm.pay_out_from_active(redeemer, outcome.coll_drawn)?;
            tm.ledger.burn(redeemer, outcome.redeemed)?;

            tm.push_event(ProtocolEvent::UrgentRedemption(RedemptionEvent {
                redeemer: *redeemer,
                redeemed: outcome.redeemed,
                coll_drawn: outcome.coll_drawn,
                coll_fee: 0,
                troves: outcome.troves.clone(),
                timestamp: tm.now,
            }));

            info!(
                %redeemer,
                redeemed = outcome.redeemed,
                coll_drawn = outcome.coll_drawn,
                "Urgent redemption"
            );
            Ok(outcome)
        })
    }

    fn require_redeemable(&self, redeemer: &Address, amount: u128) -> Result<()> {
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        let available = self.ledger.balance_of(redeemer);
        if available < amount {
            return Err(Error::InsufficientBalance {
                required: amount,
                available,
            });
        }
        Ok(())
    }

    /// Close a fully redeemed trove, or turn a sub-minimum one into a zombie
    fn settle_redeemed_trove(&mut self, trove: &Trove, new_coll: u128, new_debt: u128) -> Result<()> {
        let id = trove.id;

        if new_debt == 0 {
            self.remove_trove(id, TroveStatus::ClosedByRedemption)?;
            if new_coll > 0 {
                self.active_pool.send_coll(new_coll)?;
                self.coll_surplus_pool.account_surplus(&trove.owner, new_coll)?;
            }
            debug!(%id, "Trove fully redeemed");
            return Ok(());
        }

        if new_debt < self.params.min_debt {
            if trove.status == TroveStatus::Active {
                if trove.is_in_batch() {
                    self.sorted_troves.remove_from_batch(id)?;
                } else {
                    self.sorted_troves.remove(id)?;
                }
                self.trove_mut(id)?.set_status(TroveStatus::Zombie)?;
                debug!(%id, new_debt, "Trove became a zombie");
            }
            self.last_zombie_trove_id = Some(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ProtocolParams;
    use crate::protocol::trove_manager::InMemoryTroveManager;
    use crate::utils::math::{percent, units};

    fn setup() -> InMemoryTroveManager {
        InMemoryTroveManager::in_memory(ProtocolParams::default(), units(2_000)).unwrap()
    }

    fn account(label: &str) -> Address {
        Address::from_label(label)
    }

    /// Three troves of 10 coll / 5000 debt at 3%, 5% and 7%
    fn three_troves(tm: &mut InMemoryTroveManager) -> Vec<TroveId> {
        let ids: Vec<TroveId> = [("alice", 3), ("bob", 5), ("carol", 7)]
            .iter()
            .map(|(owner, rate)| {
                tm.open_trove(&account(owner), units(10), units(5_000), percent(*rate))
                    .unwrap()
            })
            .collect();
        tm.ledger_mut()
            .transfer(&account("bob"), &account("carol"), units(5_000))
            .unwrap();
        ids
    }

    #[test]
    fn test_redeems_lowest_rate_first() {
        let mut tm = setup();
        let ids = three_troves(&mut tm);

        let outcome = tm.redeem_collateral(&account("carol"), units(6_000), 0).unwrap();
        assert_eq!(outcome.troves, vec![ids[0], ids[1]]);
        assert_eq!(outcome.redeemed, units(6_000));
        // 2.5 + 0.5 coll less the 0.5% fee
        assert_eq!(outcome.coll_fee, units(15) / 1_000);
        assert_eq!(outcome.coll_drawn, units(3) - units(15) / 1_000);

        assert_eq!(tm.trove(ids[0]).unwrap().status, TroveStatus::ClosedByRedemption);
        assert_eq!(
            tm.coll_surplus_pool().collateral_of(&account("alice")),
            units(10) - (units(25) / 10 - units(125) / 10_000)
        );
        assert_eq!(tm.trove(ids[1]).unwrap().debt, units(4_000));
        assert_eq!(tm.trove(ids[2]).unwrap().debt, units(5_000));
        assert_eq!(tm.ledger().balance_of(&account("carol")), units(4_000));
        assert_eq!(tm.coll_balance_of(&account("carol")), outcome.coll_drawn);
        tm.check_invariants().unwrap();
    }

    #[test]
    fn test_max_iterations_bounds_traversal() {
        let mut tm = setup();
        let ids = three_troves(&mut tm);

        let outcome = tm.redeem_collateral(&account("carol"), units(8_000), 1).unwrap();
        assert_eq!(outcome.troves, vec![ids[0]]);
        assert_eq!(outcome.redeemed, units(5_000));
    }

    #[test]
    fn test_partial_redemption_creates_zombie() {
        let mut tm = setup();
        let ids = three_troves(&mut tm);

        tm.redeem_collateral(&account("carol"), units(4_000), 0).unwrap();
        let zombie = ids[0];
        assert_eq!(tm.trove(zombie).unwrap().status, TroveStatus::Zombie);
        assert_eq!(tm.last_zombie_trove_id(), Some(zombie));
        assert!(!tm.sorted_troves().contains(zombie));

        // Next redemption resumes at the zombie
        let outcome = tm.redeem_collateral(&account("carol"), units(1_500), 0).unwrap();
        assert_eq!(outcome.troves, vec![zombie, ids[1]]);
        assert_eq!(tm.trove(zombie).unwrap().status, TroveStatus::ClosedByRedemption);
        assert_eq!(tm.last_zombie_trove_id(), None);
        tm.check_invariants().unwrap();
    }

    #[test]
    fn test_zombie_reactivated_by_borrowing() {
        let mut tm = setup();
        let ids = three_troves(&mut tm);
        tm.redeem_collateral(&account("carol"), units(4_000), 0).unwrap();

        tm.adjust_trove(&account("alice"), ids[0], TroveAdjustment::borrow(units(2_000)))
            .unwrap();
        assert_eq!(tm.trove(ids[0]).unwrap().status, TroveStatus::Active);
        assert!(tm.sorted_troves().contains(ids[0]));
        assert_eq!(tm.last_zombie_trove_id(), None);
        tm.check_invariants().unwrap();
    }

    #[test]
    fn test_skips_troves_below_100_percent() {
        let mut tm = setup();
        let low = tm
            .open_trove(&account("alice"), units(10), units(15_000), percent(3))
            .unwrap();
        let high = tm
            .open_trove(&account("bob"), units(20), units(5_000), percent(5))
            .unwrap();
        tm.price_feed_mut().set_price(units(1_400));

        let outcome = tm.redeem_collateral(&account("alice"), units(1_000), 0).unwrap();
        assert_eq!(outcome.troves, vec![high]);
        assert_eq!(tm.trove(low).unwrap().debt, units(15_000));
    }

    #[test]
    fn test_redemption_validation() {
        let mut tm = setup();
        three_troves(&mut tm);

        assert!(matches!(
            tm.redeem_collateral(&account("carol"), 0, 0),
            Err(Error::ZeroAmount)
        ));
        assert!(matches!(
            tm.redeem_collateral(&account("dave"), units(1), 0),
            Err(Error::InsufficientBalance { .. })
        ));
        assert!(matches!(
            tm.urgent_redemption(&account("carol"), units(1), &[TroveId(1)], 0),
            Err(Error::SystemNotShutDown)
        ));
    }

    #[test]
    fn test_urgent_redemption_pays_bonus() {
        let mut tm = setup();
        let ids = three_troves(&mut tm);
        tm.shutdown().unwrap();

        assert!(matches!(
            tm.redeem_collateral(&account("carol"), units(1_000), 0),
            Err(Error::SystemShutDown)
        ));
        assert!(matches!(
            tm.urgent_redemption(&account("carol"), units(1_000), &[ids[2]], units(1)),
            Err(Error::CollateralBelowMinimum { .. })
        ));

        let outcome = tm
            .urgent_redemption(&account("carol"), units(1_000), &[ids[2]], 0)
            .unwrap();
        assert_eq!(outcome.troves, vec![ids[2]]);
        assert_eq!(outcome.coll_fee, 0);
        // 1000 at 2000 plus 1%
        assert_eq!(outcome.coll_drawn, units(505) / 1_000);
        assert_eq!(tm.trove(ids[2]).unwrap().debt, units(4_000));
        assert_eq!(tm.events().filter_by_type("UrgentRedemption").len(), 1);
        tm.check_invariants().unwrap();
    }
}
