//! Trove manager - core orchestration engine.
//!
//! The trove manager owns every pool, the trove and batch registries and the
//! redistribution accumulators. It is the only component that knows the
//! business rules; pools are plain ledgers driven by it.
//!
//! Every public mutating operation runs on a draft copy of the engine and is
//! committed only when it succeeds, so a failed call leaves no trace.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::batch::{Batch, LatestBatchData};
use crate::core::config::ProtocolParams;
use crate::core::sorted_troves::{InMemorySortedTroves, SortedTroves};
use crate::core::token::{BoldToken, DebtToken};
use crate::core::trove::*;
use crate::error::{Error, Result};
use crate::liquidation::redistribution::RedistributionState;
use crate::oracle::price_feed::{validate_price, FixedPriceFeed, PriceFeed};
use crate::pools::*;
use crate::protocol::events::{EventLog, ProtocolEvent};
use crate::utils::crypto::{Address, Hash};
use crate::utils::math::*;

// ═══════════════════════════════════════════════════════════════════════════════
// SYSTEM STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Snapshot of system-wide balances and ratios
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemState {
    /// Collateral price used for the ratios
    pub price: u128,
    /// Collateral in the active pool
    pub active_coll: u128,
    /// Debt of the active set, including pending interest and fees
    pub active_debt: u128,
    /// Collateral awaiting redistribution
    pub default_coll: u128,
    /// Debt awaiting redistribution
    pub default_debt: u128,
    /// Collateral held by the stability pool
    pub stability_coll: u128,
    /// Stability pool deposits
    pub stability_deposits: u128,
    /// Collateral owed back to liquidated borrowers
    pub surplus_coll: u128,
    /// Active + default collateral
    pub total_coll: u128,
    /// Active + default debt
    pub total_debt: u128,
    /// Total collateralization ratio
    pub tcr: u128,
    /// Number of active troves
    pub active_troves: usize,
    /// Number of zombie troves
    pub zombie_troves: usize,
    /// TCR below the critical ratio
    pub below_critical_threshold: bool,
    /// Shutdown flag
    pub shut_down: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TROVE MANAGER
// ═══════════════════════════════════════════════════════════════════════════════

/// Engine with the in-memory collaborators
pub type InMemoryTroveManager = TroveManager<FixedPriceFeed, InMemorySortedTroves, BoldToken>;

/// Bold accounting engine
#[derive(Debug, Clone)]
pub struct TroveManager<F, S, L> {
    /// Economic parameters
    pub(crate) params: ProtocolParams,
    /// Collateral price source
    pub(crate) price_feed: F,
    /// Rate-ordered index of active troves
    pub(crate) sorted_troves: S,
    /// Debt-token ledger
    pub(crate) ledger: L,
    /// Aggregate ledger of open troves
    pub(crate) active_pool: ActivePool,
    /// Redistribution staging
    pub(crate) default_pool: DefaultPool,
    /// Pooled depositor capital
    pub(crate) stability_pool: StabilityPool,
    /// Collateral owed back after liquidation
    pub(crate) coll_surplus_pool: CollSurplusPool,
    /// Trove registry
    pub(crate) troves: BTreeMap<TroveId, Trove>,
    /// Redistribution snapshots by trove
    pub(crate) reward_snapshots: BTreeMap<TroveId, RewardSnapshot>,
    /// Batch registry keyed by manager
    pub(crate) batches: BTreeMap<Address, Batch>,
    /// Redistribution accumulators and stakes
    pub(crate) redistribution: RedistributionState,
    /// Logical clock in seconds
    pub(crate) now: u64,
    /// Next trove id
    pub(crate) next_trove_id: u64,
    /// Partially redeemed zombie where the next redemption resumes
    pub(crate) last_zombie_trove_id: Option<TroveId>,
    /// Collateral paid out of the system, by account
    pub(crate) coll_payouts: BTreeMap<Address, u128>,
    /// Collateral paid into the system
    pub(crate) total_coll_paid_in: u128,
    /// Committed events
    pub(crate) events: EventLog,
}

impl InMemoryTroveManager {
    /// Engine with a fixed price feed, in-memory index and ledger, starting at time 0
    pub fn in_memory(params: ProtocolParams, price: u128) -> Result<Self> {
        Self::new(
            params,
            FixedPriceFeed::new(price),
            InMemorySortedTroves::new(),
            BoldToken::new(),
            0,
        )
    }
}

impl<F, S, L> TroveManager<F, S, L>
where
    F: PriceFeed + Clone,
    S: SortedTroves + Clone,
    L: DebtToken + Clone,
{
    /// Create an engine starting at `now`
    pub fn new(params: ProtocolParams, price_feed: F, sorted_troves: S, ledger: L, now: u64) -> Result<Self> {
        params.validate()?;

        Ok(Self {
            active_pool: ActivePool::new(params.sp_yield_split, now),
            default_pool: DefaultPool::new(),
            stability_pool: StabilityPool::with_min_deposits(params.min_bold_in_sp),
            coll_surplus_pool: CollSurplusPool::new(),
            params,
            price_feed,
            sorted_troves,
            ledger,
            troves: BTreeMap::new(),
            reward_snapshots: BTreeMap::new(),
            batches: BTreeMap::new(),
            redistribution: RedistributionState::new(),
            now,
            next_trove_id: 1,
            last_zombie_trove_id: None,
            coll_payouts: BTreeMap::new(),
            total_coll_paid_in: 0,
            events: EventLog::new(),
        })
    }

    /// Run `op` on a draft copy and commit it only on success
    pub(crate) fn atomically<R>(&mut self, op: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        let mut draft = self.clone();
        let out = op(&mut draft)?;
        *self = draft;
        Ok(out)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CLOCK
    // ═══════════════════════════════════════════════════════════════════════════

    /// Current engine time
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Move the clock forward by `secs`
    pub fn advance_time(&mut self, secs: u64) -> Result<u64> {
        self.now = self.now.checked_add(secs).ok_or_else(|| Error::Overflow {
            operation: "advance_time".into(),
        })?;
        Ok(self.now)
    }

    /// Move the clock to `timestamp`; the clock never goes back
    pub fn set_time(&mut self, timestamp: u64) -> Result<()> {
        if timestamp < self.now {
            return Err(Error::TimeWentBackwards {
                now: self.now,
                requested: timestamp,
            });
        }
        self.now = timestamp;
        Ok(())
    }

    /// End of the accrual period: now, capped at shutdown
    pub(crate) fn accrual_end(&self) -> u64 {
        match self.active_pool.shutdown_time() {
            Some(shutdown) => self.now.min(shutdown),
            None => self.now,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ACCESSORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Economic parameters
    pub fn params(&self) -> &ProtocolParams {
        &self.params
    }

    /// Price feed
    pub fn price_feed(&self) -> &F {
        &self.price_feed
    }

    /// Mutable price feed
    pub fn price_feed_mut(&mut self) -> &mut F {
        &mut self.price_feed
    }

    /// Ordered trove index
    pub fn sorted_troves(&self) -> &S {
        &self.sorted_troves
    }

    /// Debt-token ledger
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Mutable debt-token ledger, for transfers between accounts
    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    /// Active pool
    pub fn active_pool(&self) -> &ActivePool {
        &self.active_pool
    }

    /// Default pool
    pub fn default_pool(&self) -> &DefaultPool {
        &self.default_pool
    }

    /// Stability pool
    pub fn stability_pool(&self) -> &StabilityPool {
        &self.stability_pool
    }

    /// Collateral surplus pool
    pub fn coll_surplus_pool(&self) -> &CollSurplusPool {
        &self.coll_surplus_pool
    }

    /// Redistribution accumulators
    pub fn redistribution(&self) -> &RedistributionState {
        &self.redistribution
    }

    /// Committed events
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Trove record
    pub fn trove(&self, id: TroveId) -> Result<&Trove> {
        self.troves.get(&id).ok_or(Error::TroveNotFound(id.0))
    }

    /// Batch record
    pub fn batch(&self, manager: &Address) -> Result<&Batch> {
        self.batches
            .get(manager)
            .ok_or_else(|| Error::BatchNotFound(manager.to_string()))
    }

    /// All trove ids ever opened
    pub fn trove_ids(&self) -> Vec<TroveId> {
        self.troves.keys().copied().collect()
    }

    /// Collateral paid out of the system to `account`
    pub fn coll_balance_of(&self, account: &Address) -> u128 {
        self.coll_payouts.get(account).copied().unwrap_or(0)
    }

    /// Collateral paid into the system
    pub fn total_coll_paid_in(&self) -> u128 {
        self.total_coll_paid_in
    }

    /// Zombie where the next redemption resumes
    pub fn last_zombie_trove_id(&self) -> Option<TroveId> {
        self.last_zombie_trove_id
    }

    /// Check if the system has been shut down
    pub fn is_shut_down(&self) -> bool {
        self.active_pool.has_been_shut_down()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Validated oracle price
    pub fn fetch_price(&self) -> Result<u128> {
        validate_price(self.price_feed.fetch_price()?)
    }

    /// A batch's obligations as of now
    pub fn latest_batch_data(&self, manager: &Address) -> Result<LatestBatchData> {
        self.batch(manager)?.latest(self.accrual_end())
    }

    /// A trove's obligations as of now, including redistribution gains,
    /// accrued interest and its share of batch fees
    pub fn latest_trove_data(&self, id: TroveId) -> Result<LatestTroveData> {
        let trove = self.trove(id)?;
        let snapshot = self.reward_snapshots.get(&id).copied().unwrap_or_default();
        let (redist_debt_gain, redist_coll_gain) = self.redistribution.pending_gains(trove.stake, &snapshot)?;

        let mut data = LatestTroveData {
            redist_debt_gain,
            redist_coll_gain,
            ..Default::default()
        };

        match trove.batch_manager {
            Some(manager) => {
                let batch = self.batch(&manager)?;
                let latest = batch.latest(self.accrual_end())?;
                let (shares, total) = (trove.batch_debt_shares, batch.total_debt_shares);
                if total > 0 {
                    data.recorded_debt = mul_div(latest.recorded_debt, shares, total)?;
                    data.accrued_interest = mul_div(latest.accrued_interest, shares, total)?;
                    data.accrued_batch_management_fee = mul_div(latest.accrued_management_fee, shares, total)?;
                }
                data.annual_interest_rate = latest.annual_interest_rate;
                data.weighted_recorded_debt = wide_mul(data.recorded_debt, latest.annual_interest_rate);
                data.last_interest_rate_adj_time =
                    trove.last_interest_rate_adj_time.max(latest.last_interest_rate_adj_time);
            }
            None => {
                let period = self.accrual_end().saturating_sub(trove.last_debt_update_time);
                data.recorded_debt = trove.debt;
                data.annual_interest_rate = trove.annual_interest_rate;
                data.weighted_recorded_debt = trove.weighted_recorded_debt();
                data.accrued_interest = calc_interest(data.weighted_recorded_debt, period)?;
                data.last_interest_rate_adj_time = trove.last_interest_rate_adj_time;
            }
        }

        let debt = safe_add(data.recorded_debt, data.redist_debt_gain)?;
        let debt = safe_add(debt, data.accrued_interest)?;
        data.entire_debt = safe_add(debt, data.accrued_batch_management_fee)?;
        data.entire_coll = safe_add(trove.coll, data.redist_coll_gain)?;
        Ok(data)
    }

    /// ICR of a trove at `price`
    pub fn icr_at(&self, id: TroveId, price: u128) -> Result<u128> {
        let latest = self.latest_trove_data(id)?;
        compute_cr(latest.entire_coll, latest.entire_debt, price)
    }

    /// ICR of a trove at the oracle price
    pub fn get_current_icr(&self, id: TroveId) -> Result<u128> {
        self.icr_at(id, self.fetch_price()?)
    }

    /// Active + default collateral
    pub fn entire_system_coll(&self) -> Result<u128> {
        safe_add(self.active_pool.coll_balance(), self.default_pool.coll_balance())
    }

    /// Active + default debt, including pending interest and batch fees
    pub fn entire_system_debt(&self) -> Result<u128> {
        safe_add(self.active_pool.get_bold_debt(self.now)?, self.default_pool.bold_debt())
    }

    /// Total collateralization ratio at the oracle price
    pub fn get_tcr(&self) -> Result<u128> {
        compute_cr(self.entire_system_coll()?, self.entire_system_debt()?, self.fetch_price()?)
    }

    /// Number of active and zombie troves
    pub fn open_trove_count(&self) -> usize {
        self.troves.values().filter(|t| t.status.is_open()).count()
    }

    /// System-wide balances and ratios
    pub fn system_state(&self) -> Result<SystemState> {
        let price = self.fetch_price()?;
        let total_coll = self.entire_system_coll()?;
        let total_debt = self.entire_system_debt()?;
        let tcr = compute_cr(total_coll, total_debt, price)?;
        let count = |status: TroveStatus| self.troves.values().filter(|t| t.status == status).count();

        Ok(SystemState {
            price,
            active_coll: self.active_pool.coll_balance(),
            active_debt: self.active_pool.get_bold_debt(self.now)?,
            default_coll: self.default_pool.coll_balance(),
            default_debt: self.default_pool.bold_debt(),
            stability_coll: self.stability_pool.coll_balance(),
            stability_deposits: self.stability_pool.total_bold_deposits(),
            surplus_coll: self.coll_surplus_pool.coll_balance(),
            total_coll,
            total_debt,
            tcr,
            active_troves: count(TroveStatus::Active),
            zombie_troves: count(TroveStatus::Zombie),
            below_critical_threshold: tcr < self.params.ccr,
            shut_down: self.is_shut_down(),
        })
    }

    /// SHA-256 fingerprint of the engine's accounting state and event log
    pub fn state_hash(&self) -> Result<Hash> {
        let state = (
            &self.active_pool,
            &self.default_pool,
            &self.stability_pool,
            &self.coll_surplus_pool,
            &self.troves,
            &self.reward_snapshots,
            &self.batches,
            &self.redistribution,
            (self.now, self.next_trove_id, self.last_zombie_trove_id),
            (&self.coll_payouts, self.total_coll_paid_in),
            self.events.merkle_root()?,
        );
        let data = bincode::serialize(&state).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(Hash::sha256(&data))
    }

    /// Cross-check aggregates against the registries
    pub fn check_invariants(&self) -> Result<()> {
        let mut weighted_debt = U256::zero();
        let mut weighted_fee = U256::zero();
        let mut stakes = 0u128;
        let mut entire_debts = 0u128;
        let mut batch_shares: BTreeMap<Address, (u128, u128)> = BTreeMap::new();

        for trove in self.troves.values().filter(|t| t.status.is_open()) {
            stakes = safe_add(stakes, trove.stake)?;
            entire_debts = safe_add(entire_debts, self.latest_trove_data(trove.id)?.entire_debt)?;
            match trove.batch_manager {
                Some(manager) => {
                    let entry = batch_shares.entry(manager).or_default();
                    entry.0 = safe_add(entry.0, trove.batch_debt_shares)?;
                    entry.1 = safe_add(entry.1, trove.coll)?;
                }
                None => weighted_debt = wide_add(weighted_debt, trove.weighted_recorded_debt())?,
            }
        }
        for batch in self.batches.values() {
            weighted_debt = wide_add(weighted_debt, batch.weighted_recorded_debt())?;
            weighted_fee = wide_add(weighted_fee, batch.weighted_management_fee())?;
            let (shares, coll) = batch_shares.get(&batch.manager).copied().unwrap_or_default();
            if shares != batch.total_debt_shares || coll != batch.coll {
                return Err(Error::InvariantViolation(format!(
                    "batch {} members do not add up",
                    batch.manager
                )));
            }
        }

        if weighted_debt != self.active_pool.agg_weighted_debt_sum() {
            return Err(Error::InvariantViolation("aggregate weighted debt mismatch".into()));
        }
        if weighted_fee != self.active_pool.agg_weighted_batch_management_fee_sum() {
            return Err(Error::InvariantViolation("aggregate weighted fee mismatch".into()));
        }
        if stakes != self.redistribution.total_stakes {
            return Err(Error::InvariantViolation("total stakes mismatch".into()));
        }
        if self.stability_pool.p().is_zero() {
            return Err(Error::ProductDepleted);
        }
        if self.entire_system_debt()? < entire_debts {
            return Err(Error::InvariantViolation(format!(
                "system debt {} below trove debts {}",
                self.entire_system_debt()?,
                entire_debts
            )));
        }

        let mut held = safe_add(self.active_pool.coll_balance(), self.default_pool.coll_balance())?;
        held = safe_add(held, self.stability_pool.coll_balance())?;
        held = safe_add(held, self.coll_surplus_pool.coll_balance())?;
        let paid_out = self.coll_payouts.values().try_fold(0u128, |acc, v| safe_add(acc, *v))?;
        if safe_add(held, paid_out)? != self.total_coll_paid_in {
            return Err(Error::InvariantViolation("collateral not conserved".into()));
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // GUARDS
    // ═══════════════════════════════════════════════════════════════════════════

    pub(crate) fn require_not_shut_down(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(Error::SystemShutDown);
        }
        Ok(())
    }

    pub(crate) fn require_shut_down(&self) -> Result<()> {
        if !self.is_shut_down() {
            return Err(Error::SystemNotShutDown);
        }
        Ok(())
    }

    pub(crate) fn require_cr(&self, coll: u128, debt: u128, price: u128, minimum: u128) -> Result<()> {
        let current = compute_cr(coll, debt, price)?;
        if current < minimum {
            return Err(Error::CollateralizationRatioTooLow { current, minimum });
        }
        Ok(())
    }

    pub(crate) fn owned_open_trove(&self, owner: &Address, id: TroveId) -> Result<Trove> {
        let trove = self.trove(id)?;
        trove.require_owner(owner)?;
        trove.require_open()?;
        Ok(trove.clone())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // HELPER METHODS
    // ═══════════════════════════════════════════════════════════════════════════

    pub(crate) fn trove_mut(&mut self, id: TroveId) -> Result<&mut Trove> {
        self.troves.get_mut(&id).ok_or(Error::TroveNotFound(id.0))
    }

    pub(crate) fn batch_mut(&mut self, manager: &Address) -> Result<&mut Batch> {
        self.batches
            .get_mut(manager)
            .ok_or_else(|| Error::BatchNotFound(manager.to_string()))
    }

    pub(crate) fn push_event(&mut self, event: ProtocolEvent) {
        self.events.push(event);
    }

    /// Upfront interest on new debt, zero when the period is disabled
    pub(crate) fn upfront_fee(&self, debt: u128, rate: u128) -> Result<u128> {
        calc_interest_up(wide_mul(debt, rate), self.params.upfront_interest_period_secs)
    }

    pub(crate) fn pay_in_coll(&mut self, amount: u128) -> Result<()> {
        self.active_pool.receive_coll(amount)?;
        self.total_coll_paid_in = safe_add(self.total_coll_paid_in, amount)?;
        Ok(())
    }

    /// Credit collateral already released by a pool to `account`
    pub(crate) fn credit_payout(&mut self, account: &Address, amount: u128) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let balance = safe_add(self.coll_balance_of(account), amount)?;
        self.coll_payouts.insert(*account, balance);
        Ok(())
    }

    /// Release collateral from the active pool to `account`
    pub(crate) fn pay_out_from_active(&mut self, account: &Address, amount: u128) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        self.active_pool.send_coll(amount)?;
        self.credit_payout(account, amount)
    }

    /// Mint pending aggregate interest and apply `change` to the aggregates
    pub(crate) fn account_for_change(&mut self, change: &TroveChange, batch_manager: Option<&Address>) -> Result<()> {
        self.active_pool.mint_agg_interest_and_account_for_trove_change(
            change,
            batch_manager,
            self.now,
            &mut self.stability_pool,
            &mut self.ledger,
        )
    }

    pub(crate) fn move_pending_rewards_to_active_pool(&mut self, debt_gain: u128, coll_gain: u128) -> Result<()> {
        if debt_gain > 0 {
            self.default_pool.decrease_bold_debt(debt_gain)?;
        }
        if coll_gain > 0 {
            self.default_pool.send_coll_to_active_pool(coll_gain, &mut self.active_pool)?;
        }
        Ok(())
    }

    pub(crate) fn update_stake_and_snapshot(&mut self, id: TroveId, new_stake: u128) -> Result<()> {
        let old_stake = self.trove(id)?.stake;
        self.redistribution.replace_stake(old_stake, new_stake)?;
        self.trove_mut(id)?.stake = new_stake;
        let snapshot = self.redistribution.current_snapshot();
        self.reward_snapshots.insert(id, snapshot);
        Ok(())
    }

    /// Fold a batch's accrued interest and management fee into its recorded debt
    pub(crate) fn realize_batch(&mut self, manager: &Address) -> Result<LatestBatchData> {
        let latest = self.latest_batch_data(manager)?;
        let new_debt = latest.entire_debt_without_redistribution;
        let change = TroveChange {
            old_weighted_recorded_debt: latest.weighted_recorded_debt,
            new_weighted_recorded_debt: wide_mul(new_debt, latest.annual_interest_rate),
            batch_accrued_management_fee: latest.accrued_management_fee,
            old_weighted_recorded_batch_management_fee: latest.weighted_recorded_batch_management_fee,
            new_weighted_recorded_batch_management_fee: wide_mul(new_debt, latest.annual_management_fee),
            ..Default::default()
        };
        self.account_for_change(&change, Some(manager))?;

        let now = self.now;
        let batch = self.batch_mut(manager)?;
        batch.debt = new_debt;
        batch.last_debt_update_time = now;
        Ok(latest)
    }

    /// Re-price a member's shares after its debt moved by
    /// `debt_increase - debt_decrease`. The batch must be realized.
    pub(crate) fn update_batch_shares(
        &mut self,
        id: TroveId,
        manager: &Address,
        debt_increase: u128,
        debt_decrease: u128,
        new_trove_debt: u128,
        new_trove_coll: u128,
        check_ratio: bool,
    ) -> Result<()> {
        let trove = self.trove(id)?.clone();
        let mut batch = self.batch(manager)?.clone();
        let mut shares = trove.batch_debt_shares;

        if debt_increase > debt_decrease {
            let delta_debt = debt_increase - debt_decrease;
            let delta_shares = batch.shares_for_debt(delta_debt)?;
            shares = safe_add(shares, delta_shares)?;
            batch.total_debt_shares = safe_add(batch.total_debt_shares, delta_shares)?;
            batch.debt = safe_add(batch.debt, delta_debt)?;
        } else if debt_decrease > debt_increase {
            let delta_debt = debt_decrease - debt_increase;
            let delta_shares = if new_trove_debt == 0 {
                shares
            } else {
                mul_div(batch.total_debt_shares, delta_debt, batch.debt)?.min(shares)
            };
            shares -= delta_shares;
            batch.total_debt_shares = safe_sub(batch.total_debt_shares, delta_shares)?;
            batch.debt = safe_sub(batch.debt, delta_debt)?;
        }
        batch.coll = safe_sub(safe_add(batch.coll, new_trove_coll)?, trove.coll)?;
        batch.last_debt_update_time = self.now;

        if check_ratio {
            batch.check_shares_ratio(shares, new_trove_debt)?;
        }

        self.batches.insert(*manager, batch);
        let now = self.now;
        let record = self.trove_mut(id)?;
        record.batch_debt_shares = shares;
        record.debt = new_trove_debt;
        record.last_debt_update_time = now;
        Ok(())
    }

    /// Apply a collateral/debt change to an open trove: realize its
    /// redistribution gains and interest, update the aggregates, its stake
    /// and (for members) the batch shares. Token and external collateral
    /// movements are left to the caller. Returns `(new_coll, new_debt)`.
    pub(crate) fn apply_trove_update(
        &mut self,
        id: TroveId,
        latest: &LatestTroveData,
        delta: &TroveAdjustment,
        upfront_fee: u128,
        check_batch_ratio: bool,
    ) -> Result<(u128, u128)> {
        let trove = self.trove(id)?.clone();
        let new_coll = safe_sub(safe_add(latest.entire_coll, delta.coll_increase)?, delta.coll_decrease)?;
        let new_debt = safe_add(safe_add(latest.entire_debt, delta.debt_increase)?, upfront_fee)?;
        let new_debt = safe_sub(new_debt, delta.debt_decrease)?;

        let mut change = TroveChange {
            applied_redist_debt_gain: latest.redist_debt_gain,
            applied_redist_coll_gain: latest.redist_coll_gain,
            coll_increase: delta.coll_increase,
            coll_decrease: delta.coll_decrease,
            debt_increase: delta.debt_increase,
            debt_decrease: delta.debt_decrease,
            upfront_fee,
            ..Default::default()
        };
        self.move_pending_rewards_to_active_pool(latest.redist_debt_gain, latest.redist_coll_gain)?;

        match trove.batch_manager {
            None => {
                change.old_weighted_recorded_debt = trove.weighted_recorded_debt();
                change.new_weighted_recorded_debt = wide_mul(new_debt, trove.annual_interest_rate);
                self.account_for_change(&change, None)?;

                let now = self.now;
                let record = self.trove_mut(id)?;
                record.debt = new_debt;
                record.last_debt_update_time = now;
            }
            Some(manager) => {
                let batch = self.batch(&manager)?.clone();
                let batch_debt_increase = safe_add(
                    safe_add(latest.redist_debt_gain, delta.debt_increase)?,
                    upfront_fee,
                )?;
                let new_batch_debt =
                    safe_sub(safe_add(batch.debt, batch_debt_increase)?, delta.debt_decrease)?;
                change.old_weighted_recorded_debt = batch.weighted_recorded_debt();
                change.new_weighted_recorded_debt = wide_mul(new_batch_debt, batch.annual_interest_rate);
                change.old_weighted_recorded_batch_management_fee = batch.weighted_management_fee();
                change.new_weighted_recorded_batch_management_fee =
                    wide_mul(new_batch_debt, batch.annual_management_fee);
                self.account_for_change(&change, Some(&manager))?;

                self.update_batch_shares(
                    id,
                    &manager,
                    batch_debt_increase,
                    delta.debt_decrease,
                    new_debt,
                    new_coll,
                    check_batch_ratio,
                )?;
            }
        }

        self.trove_mut(id)?.coll = new_coll;
        self.update_stake_and_snapshot(id, new_coll)?;
        Ok((new_coll, new_debt))
    }

    /// Move an open trove to a terminal `status`, dropping it from the index,
    /// the stake total and its batch. Returns the record as it was.
    pub(crate) fn remove_trove(&mut self, id: TroveId, status: TroveStatus) -> Result<Trove> {
        let trove = self.trove(id)?.clone();

        if trove.status == TroveStatus::Active {
            if trove.is_in_batch() {
                self.sorted_troves.remove_from_batch(id)?;
            } else {
                self.sorted_troves.remove(id)?;
            }
        }
        if let Some(manager) = trove.batch_manager {
            let batch = self.batch_mut(&manager)?;
            batch.total_debt_shares = safe_sub(batch.total_debt_shares, trove.batch_debt_shares)?;
            batch.coll = safe_sub(batch.coll, trove.coll)?;
        }
        self.redistribution.remove_stake(trove.stake)?;

        let record = self.trove_mut(id)?;
        record.set_status(status)?;
        record.zero_out();
        self.reward_snapshots.remove(&id);
        if self.last_zombie_trove_id == Some(id) {
            self.last_zombie_trove_id = None;
        }
        Ok(trove)
    }
}
