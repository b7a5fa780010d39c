//! Stability Pool implementation (Liquity v2 style).
//!
//! Depositors pool debt tokens that absorb liquidated debt in exchange for
//! the liquidated collateral, and earn a share of minted interest.
//!
//! Per-depositor accounting is O(1) through a product/sum scheme:
//! - `P` tracks how much a unit deposited at the start has shrunk
//! - `S[scale]` accumulates collateral gain per unit of deposit
//! - `B[scale]` accumulates yield gain per unit of deposit
//!
//! When `P` falls below `P_PRECISION / SCALE_FACTOR` it is multiplied by
//! `SCALE_FACTOR` and the scale counter increments. Gains from later scales
//! are divided by `SCALE_FACTOR^i`; deposits older than
//! `MAX_SCALE_FACTOR_EXPONENT` scales compound to zero.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::core::token::DebtToken;
use crate::error::{Error, Result};
use crate::pools::active_pool::ActivePool;
use crate::utils::constants::*;
use crate::utils::crypto::Address;
use crate::utils::math::*;

// ═══════════════════════════════════════════════════════════════════════════════
// DEPOSITOR SNAPSHOT
// ═══════════════════════════════════════════════════════════════════════════════

/// Pool state captured at a depositor's last interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositSnapshot {
    /// Running product
    pub p: U256,
    /// Collateral sum at `scale`
    pub s: U256,
    /// Yield sum at `scale`
    pub b: U256,
    /// Scale index
    pub scale: u64,
}

impl Default for DepositSnapshot {
    fn default() -> Self {
        Self {
            p: wide(P_PRECISION),
            s: U256::zero(),
            b: U256::zero(),
            scale: 0,
        }
    }
}

/// Deposit value after compounding from `snapshot` to the current `(p, scale)`
///
/// Zero once more than `MAX_SCALE_FACTOR_EXPONENT` rescales have passed.
pub fn compound_deposit(initial: U256, p: U256, current_scale: u64, snapshot: &DepositSnapshot) -> Result<U256> {
    if initial.is_zero() {
        return Ok(U256::zero());
    }
    let scale_diff = current_scale.checked_sub(snapshot.scale).ok_or_else(|| Error::InvariantViolation(
        "snapshot scale ahead of pool scale".into(),
    ))?;
    if scale_diff > MAX_SCALE_FACTOR_EXPONENT {
        return Ok(U256::zero());
    }
    if snapshot.p.is_zero() {
        return Err(Error::DivisionByZero {
            operation: "compound_deposit".into(),
        });
    }
    let compounded = initial
        .checked_mul(p)
        .ok_or_else(|| Error::Overflow {
            operation: "compound_deposit".into(),
        })?
        / snapshot.p;
    Ok(compounded / scale_factor_pow(scale_diff))
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLAIM RESULT
// ═══════════════════════════════════════════════════════════════════════════════

/// Amounts moved by a deposit, withdrawal or claim
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositOutcome {
    /// Deposit after the operation
    pub new_deposit: u128,
    /// Debt tokens withdrawn
    pub withdrawn: u128,
    /// Yield paid out in debt tokens
    pub yield_sent: u128,
    /// Collateral paid out
    pub coll_sent: u128,
    /// Collateral left in the stash
    pub coll_stashed: u128,
}

// ═══════════════════════════════════════════════════════════════════════════════
// STABILITY POOL
// ═══════════════════════════════════════════════════════════════════════════════

/// The Stability Pool for absorbing liquidations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StabilityPool {
    /// Collateral gained from offsets and not yet paid out
    coll_balance: u128,
    /// Total deposits
    total_bold_deposits: u128,
    /// Yield distributed through `B` and not yet paid out
    yield_gains_owed: u128,
    /// Yield held back while deposits are below the floor
    yield_gains_pending: u128,
    /// Nominal deposit by depositor
    deposits: BTreeMap<Address, u128>,
    /// Snapshot by depositor
    snapshots: BTreeMap<Address, DepositSnapshot>,
    /// Deferred collateral gains by depositor
    stashed_coll: BTreeMap<Address, u128>,
    /// Running product
    p: U256,
    /// Current scale
    current_scale: u64,
    /// Collateral sums by scale
    scale_to_s: BTreeMap<u64, U256>,
    /// Yield sums by scale
    scale_to_b: BTreeMap<u64, U256>,
    /// Minimum total deposits
    min_bold_in_sp: u128,
    /// Number of offsets absorbed
    total_offsets: u64,
    /// Total debt absorbed
    total_debt_absorbed: u128,
}

impl Default for StabilityPool {
    fn default() -> Self {
        Self::new()
    }
}

impl StabilityPool {
    /// Create an empty pool with the default deposit floor
    pub fn new() -> Self {
        Self::with_min_deposits(MIN_BOLD_IN_SP)
    }

    /// Create an empty pool with a custom deposit floor
    pub fn with_min_deposits(min_bold_in_sp: u128) -> Self {
        let mut scale_to_s = BTreeMap::new();
        let mut scale_to_b = BTreeMap::new();
        scale_to_s.insert(0, U256::zero());
        scale_to_b.insert(0, U256::zero());

        Self {
            coll_balance: 0,
            total_bold_deposits: 0,
            yield_gains_owed: 0,
            yield_gains_pending: 0,
            deposits: BTreeMap::new(),
            snapshots: BTreeMap::new(),
            stashed_coll: BTreeMap::new(),
            p: wide(P_PRECISION),
            current_scale: 0,
            scale_to_s,
            scale_to_b,
            min_bold_in_sp,
            total_offsets: 0,
            total_debt_absorbed: 0,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Collateral held
    pub fn coll_balance(&self) -> u128 {
        self.coll_balance
    }

    /// Total deposits
    pub fn total_bold_deposits(&self) -> u128 {
        self.total_bold_deposits
    }

    /// Deposits available to offset while keeping the floor
    pub fn available_for_offset(&self) -> u128 {
        self.total_bold_deposits.saturating_sub(self.min_bold_in_sp)
    }

    /// Yield owed to depositors
    pub fn yield_gains_owed(&self) -> u128 {
        self.yield_gains_owed
    }

    /// Yield held back below the floor
    pub fn yield_gains_pending(&self) -> u128 {
        self.yield_gains_pending
    }

    /// Running product
    pub fn p(&self) -> U256 {
        self.p
    }

    /// Current scale
    pub fn current_scale(&self) -> u64 {
        self.current_scale
    }

    /// Number of depositors
    pub fn depositor_count(&self) -> usize {
        self.deposits.len()
    }

    /// Offsets absorbed so far
    pub fn total_offsets(&self) -> u64 {
        self.total_offsets
    }

    /// Debt absorbed so far
    pub fn total_debt_absorbed(&self) -> u128 {
        self.total_debt_absorbed
    }

    /// Nominal deposit recorded at the last interaction
    pub fn initial_deposit(&self, depositor: &Address) -> u128 {
        self.deposits.get(depositor).copied().unwrap_or(0)
    }

    /// Deferred collateral gains
    pub fn stashed_coll(&self, depositor: &Address) -> u128 {
        self.stashed_coll.get(depositor).copied().unwrap_or(0)
    }

    /// Snapshot taken at the last interaction
    pub fn snapshot(&self, depositor: &Address) -> Option<&DepositSnapshot> {
        self.snapshots.get(depositor)
    }

    fn s_at(&self, scale: u64) -> U256 {
        self.scale_to_s.get(&scale).copied().unwrap_or_default()
    }

    fn b_at(&self, scale: u64) -> U256 {
        self.scale_to_b.get(&scale).copied().unwrap_or_default()
    }

    /// Gain per unit of `snapshot.p` accumulated since the snapshot
    fn normalized_gains(&self, snapshot: &DepositSnapshot, sums: impl Fn(u64) -> U256, snapshot_sum: U256) -> Result<U256> {
        let mut gains = wide_sub(sums(snapshot.scale), snapshot_sum)?;
        for i in 1..=SCALE_SPAN {
            gains = wide_add(gains, sums(snapshot.scale + i) / scale_factor_pow(i))?;
        }
        Ok(gains)
    }

    fn gain_for(&self, depositor: &Address, use_coll: bool, extra_b: U256) -> Result<u128> {
        let initial = self.initial_deposit(depositor);
        if initial == 0 {
            return Ok(0);
        }
        let snapshot = self.snapshots.get(depositor).copied().unwrap_or_default();
        let current = self.current_scale;
        let normalized = if use_coll {
            self.normalized_gains(&snapshot, |scale| self.s_at(scale), snapshot.s)?
        } else {
            self.normalized_gains(
                &snapshot,
                |scale| {
                    let b = self.b_at(scale);
                    if scale == current { b.saturating_add(extra_b) } else { b }
                },
                snapshot.b,
            )?
        };
        let gain = wide(initial)
            .checked_mul(normalized)
            .ok_or_else(|| Error::Overflow {
                operation: "depositor gain".into(),
            })?
            / snapshot.p;
        // Capped by what the pool actually holds
        let cap = if use_coll {
            self.coll_balance
        } else {
            safe_add(self.yield_gains_owed, if extra_b.is_zero() { 0 } else { self.yield_gains_pending })?
        };
        Ok(narrow(gain, "depositor gain").unwrap_or(u128::MAX).min(cap))
    }

    /// Collateral gained since the last interaction
    pub fn depositor_coll_gain(&self, depositor: &Address) -> Result<u128> {
        self.gain_for(depositor, true, U256::zero())
    }

    /// Yield gained since the last interaction
    pub fn depositor_yield_gain(&self, depositor: &Address) -> Result<u128> {
        self.gain_for(depositor, false, U256::zero())
    }

    /// Yield gain including pending yield that would be distributed if the
    /// pool were above its floor
    pub fn depositor_yield_gain_with_pending(&self, depositor: &Address) -> Result<u128> {
        if self.total_bold_deposits < self.min_bold_in_sp || self.yield_gains_pending == 0 {
            return self.depositor_yield_gain(depositor);
        }
        let extra_b = wide(self.yield_gains_pending)
            .checked_mul(self.p)
            .ok_or_else(|| Error::Overflow {
                operation: "pending yield".into(),
            })?
            / wide(self.total_bold_deposits);
        self.gain_for(depositor, false, extra_b)
    }

    /// Current value of a deposit after absorbed offsets
    pub fn compounded_bold_deposit(&self, depositor: &Address) -> Result<u128> {
        let initial = self.initial_deposit(depositor);
        if initial == 0 {
            return Ok(0);
        }
        let snapshot = self.snapshots.get(depositor).copied().unwrap_or_default();
        narrow(
            compound_deposit(wide(initial), self.p, self.current_scale, &snapshot)?,
            "compounded deposit",
        )
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // DEPOSITS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Deposit `amount`, settling gains first. With `do_claim` yield and
    /// collateral are paid out; otherwise yield compounds into the deposit and
    /// collateral goes to the stash.
    pub fn provide_to_sp<L: DebtToken>(
        &mut self,
        depositor: &Address,
        amount: u128,
        do_claim: bool,
        ledger: &mut L,
    ) -> Result<DepositOutcome> {
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }

        let coll_gain = self.depositor_coll_gain(depositor)?;
        let yield_gain = self.depositor_yield_gain(depositor)?;
        let compounded = self.compounded_bold_deposit(depositor)?;

        let (kept_yield, yield_to_send) = if do_claim { (0, yield_gain) } else { (yield_gain, 0) };
        let stash = safe_add(self.stashed_coll(depositor), coll_gain)?;
        let (coll_stashed, coll_to_send) = if do_claim { (0, stash) } else { (stash, 0) };
        let new_deposit = safe_add(safe_add(compounded, amount)?, kept_yield)?;

        ledger.transfer(depositor, &Address::stability_pool(), amount)?;
        self.update_deposit_and_snapshots(depositor, new_deposit, coll_stashed);
        self.total_bold_deposits = safe_add(self.total_bold_deposits, safe_add(amount, kept_yield)?)?;
        self.yield_gains_owed = safe_sub(self.yield_gains_owed, yield_gain)?;

        if yield_to_send > 0 {
            ledger.transfer(&Address::stability_pool(), depositor, yield_to_send)?;
        }
        if coll_to_send > 0 {
            self.coll_balance = safe_sub(self.coll_balance, coll_to_send)?;
        }

        // Deposits may now clear the floor
        self.update_yield_rewards_sum(0)?;

        info!(%depositor, amount, new_deposit, "Stability pool deposit");
        Ok(DepositOutcome {
            new_deposit,
            withdrawn: 0,
            yield_sent: yield_to_send,
            coll_sent: coll_to_send,
            coll_stashed,
        })
    }

    /// Withdraw up to `amount` of the compounded deposit, settling gains
    pub fn withdraw_from_sp<L: DebtToken>(
        &mut self,
        depositor: &Address,
        amount: u128,
        do_claim: bool,
        ledger: &mut L,
    ) -> Result<DepositOutcome> {
        if self.initial_deposit(depositor) == 0 {
            return Err(Error::NoDeposit(depositor.to_string()));
        }

        let coll_gain = self.depositor_coll_gain(depositor)?;
        let yield_gain = self.depositor_yield_gain(depositor)?;
        let compounded = self.compounded_bold_deposit(depositor)?;
        let to_withdraw = amount.min(compounded);

        let (kept_yield, yield_to_send) = if do_claim { (0, yield_gain) } else { (yield_gain, 0) };
        let stash = safe_add(self.stashed_coll(depositor), coll_gain)?;
        let (coll_stashed, coll_to_send) = if do_claim { (0, stash) } else { (stash, 0) };
        let new_deposit = safe_add(compounded - to_withdraw, kept_yield)?;

        let new_total = safe_sub(safe_add(self.total_bold_deposits, kept_yield)?, to_withdraw)?;
        if new_total < self.min_bold_in_sp {
            return Err(Error::DepositsBelowMinimum {
                remaining: new_total,
                minimum: self.min_bold_in_sp,
            });
        }

        self.update_deposit_and_snapshots(depositor, new_deposit, coll_stashed);
        self.yield_gains_owed = safe_sub(self.yield_gains_owed, yield_gain)?;
        self.total_bold_deposits = new_total;

        let to_send = safe_add(to_withdraw, yield_to_send)?;
        if to_send > 0 {
            ledger.transfer(&Address::stability_pool(), depositor, to_send)?;
        }
        if coll_to_send > 0 {
            self.coll_balance = safe_sub(self.coll_balance, coll_to_send)?;
        }

        info!(%depositor, withdrawn = to_withdraw, new_deposit, "Stability pool withdrawal");
        Ok(DepositOutcome {
            new_deposit,
            withdrawn: to_withdraw,
            yield_sent: yield_to_send,
            coll_sent: coll_to_send,
            coll_stashed,
        })
    }

    /// Pay out the collateral stash of a depositor without a deposit
    pub fn claim_all_coll_gains(&mut self, depositor: &Address) -> Result<u128> {
        if self.initial_deposit(depositor) > 0 {
            return Err(Error::ActiveDeposit(depositor.to_string()));
        }
        let stash = self.stashed_coll(depositor);
        if stash == 0 {
            return Err(Error::NothingToClaim(depositor.to_string()));
        }
        self.coll_balance = safe_sub(self.coll_balance, stash)?;
        self.stashed_coll.remove(depositor);
        Ok(stash)
    }

    fn update_deposit_and_snapshots(&mut self, depositor: &Address, new_deposit: u128, stashed: u128) {
        if stashed == 0 {
            self.stashed_coll.remove(depositor);
        } else {
            self.stashed_coll.insert(*depositor, stashed);
        }

        if new_deposit == 0 {
            self.deposits.remove(depositor);
            self.snapshots.remove(depositor);
            return;
        }

        self.deposits.insert(*depositor, new_deposit);
        self.snapshots.insert(
            *depositor,
            DepositSnapshot {
                p: self.p,
                s: self.s_at(self.current_scale),
                b: self.b_at(self.current_scale),
                scale: self.current_scale,
            },
        );
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // YIELD
    // ═══════════════════════════════════════════════════════════════════════════

    /// Account for yield minted to the pool
    pub fn trigger_bold_rewards(&mut self, bold_yield: u128) -> Result<()> {
        self.update_yield_rewards_sum(bold_yield)
    }

    fn update_yield_rewards_sum(&mut self, new_yield: u128) -> Result<()> {
        let accumulated = safe_add(self.yield_gains_pending, new_yield)?;
        if accumulated == 0 {
            return Ok(());
        }

        if self.total_bold_deposits < self.min_bold_in_sp {
            self.yield_gains_pending = accumulated;
            return Ok(());
        }

        self.yield_gains_owed = safe_add(self.yield_gains_owed, accumulated)?;
        self.yield_gains_pending = 0;

        let increment = wide(accumulated)
            .checked_mul(self.p)
            .ok_or_else(|| Error::Overflow {
                operation: "yield sum".into(),
            })?
            / wide(self.total_bold_deposits);
        let b = wide_add(self.b_at(self.current_scale), increment)?;
        self.scale_to_b.insert(self.current_scale, b);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // OFFSET
    // ═══════════════════════════════════════════════════════════════════════════

    /// Cancel `debt_to_offset` against deposits and take `coll_to_add` from
    /// the active pool
    pub fn offset<L: DebtToken>(
        &mut self,
        debt_to_offset: u128,
        coll_to_add: u128,
        active_pool: &mut ActivePool,
        ledger: &mut L,
    ) -> Result<()> {
        if self.total_bold_deposits == 0 {
            return Err(Error::DivisionByZero {
                operation: "stability pool offset".into(),
            });
        }
        if debt_to_offset > self.total_bold_deposits {
            return Err(Error::AmountOutOfRange {
                requested: debt_to_offset,
                available: self.total_bold_deposits,
            });
        }

        let total = wide(self.total_bold_deposits);
        let s_increment = self
            .p
            .checked_mul(wide(coll_to_add))
            .ok_or_else(|| Error::Overflow {
                operation: "collateral sum".into(),
            })?
            / total;

        let mut numerator = self
            .p
            .checked_mul(wide(self.total_bold_deposits - debt_to_offset))
            .ok_or_else(|| Error::Overflow {
                operation: "product update".into(),
            })?;
        let mut new_p = numerator / total;
        if new_p.is_zero() {
            return Err(Error::ProductDepleted);
        }

        let s = wide_add(self.s_at(self.current_scale), s_increment)?;
        self.scale_to_s.insert(self.current_scale, s);

        let threshold = wide(P_PRECISION / SCALE_FACTOR);
        while new_p < threshold {
            numerator = numerator.checked_mul(wide(SCALE_FACTOR)).ok_or_else(|| Error::Overflow {
                operation: "product rescale".into(),
            })?;
            new_p = numerator / total;
            self.current_scale += 1;
            self.scale_to_s.entry(self.current_scale).or_default();
            self.scale_to_b.entry(self.current_scale).or_default();
            debug!(scale = self.current_scale, "Stability pool rescaled");
        }
        self.p = new_p;

        self.total_bold_deposits -= debt_to_offset;
        if debt_to_offset > 0 {
            ledger.burn(&Address::stability_pool(), debt_to_offset)?;
        }
        if coll_to_add > 0 {
            active_pool.send_coll(coll_to_add)?;
            self.coll_balance = safe_add(self.coll_balance, coll_to_add)?;
        }

        self.total_offsets += 1;
        self.total_debt_absorbed = safe_add(self.total_debt_absorbed, debt_to_offset)?;
        debug!(debt_to_offset, coll_to_add, "Stability pool offset");
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
    use proptest::prelude::*;

    fn depositor(label: &str) -> Address {
        Address::from_label(label)
    }

    /// Pool with `amount` deposited by `label` and collateral available to offset
    fn funded_pool(label: &str, amount: u128, coll: u128) -> (StabilityPool, ActivePool, BoldToken) {
        let mut sp = StabilityPool::new();
        let mut active = ActivePool::new(SP_YIELD_SPLIT, 0);
        let mut token = BoldToken::new();
        token.mint(&depositor(label), amount).unwrap();
        sp.provide_to_sp(&depositor(label), amount, true, &mut token).unwrap();
        if coll > 0 {
            active.receive_coll(coll).unwrap();
        }
        (sp, active, token)
    }

    #[test]
    fn test_offset_single_depositor() {
        let (mut sp, mut active, mut token) = funded_pool("alice", units(5_000), units(10));

        sp.offset(units(2_000), units(1), &mut active, &mut token).unwrap();

        let alice = depositor("alice");
        assert_eq!(sp.compounded_bold_deposit(&alice).unwrap(), units(3_000));
        assert_eq!(sp.depositor_coll_gain(&alice).unwrap(), units(1));
        assert_eq!(sp.current_scale(), 0);
        assert_eq!(sp.total_bold_deposits(), units(3_000));
        assert_eq!(token.balance_of(&Address::stability_pool()), units(3_000));
        assert_eq!(active.coll_balance(), units(9));
    }

    #[test]
    fn test_offset_two_depositors_pro_rata() {
        let (mut sp, mut active, mut token) = funded_pool("alice", units(3_000), units(10));
        token.mint(&depositor("bob"), units(1_000)).unwrap();
        sp.provide_to_sp(&depositor("bob"), units(1_000), true, &mut token).unwrap();

        sp.offset(units(2_000), units(2), &mut active, &mut token).unwrap();

        assert_eq!(sp.compounded_bold_deposit(&depositor("alice")).unwrap(), units(1_500));
        assert_eq!(sp.compounded_bold_deposit(&depositor("bob")).unwrap(), units(500));
        assert_eq!(sp.depositor_coll_gain(&depositor("alice")).unwrap(), units(3) / 2);
        assert_eq!(sp.depositor_coll_gain(&depositor("bob")).unwrap(), units(1) / 2);
    }

    #[test]
    fn test_full_offset_rejected() {
        let (mut sp, mut active, mut token) = funded_pool("alice", units(5_000), units(10));
        let before = sp.clone();

        let result = sp.offset(units(5_000), units(1), &mut active, &mut token);
        assert!(matches!(result, Err(Error::ProductDepleted)));
        assert_eq!(sp, before);
        assert!(!sp.p().is_zero());
    }

    #[test]
    fn test_rescale() {
        let (mut sp, mut active, mut token) = funded_pool("alice", units(10_000), units(10));

        // Leaves 1e-10 of the pool: P drops to 1e26 and is rescaled once
        let remaining = units(10_000) / 10_000_000_000;
        sp.offset(units(10_000) - remaining, units(1), &mut active, &mut token).unwrap();

        assert_eq!(sp.current_scale(), 1);
        assert_eq!(sp.p(), wide(P_PRECISION / 10));
        assert_eq!(sp.compounded_bold_deposit(&depositor("alice")).unwrap(), remaining);
        assert_eq!(sp.depositor_coll_gain(&depositor("alice")).unwrap(), units(1));
    }

    #[test]
    fn test_compound_decay_boundary() {
        // No u128 deposit survives eight rescales, so the bound is checked on the pure function
        let snapshot = DepositSnapshot {
            p: U256::one(),
            ..Default::default()
        };
        let p = wide(P_PRECISION);
        let initial = U256::exp10(40);

        let at_span = compound_deposit(initial, p, MAX_SCALE_FACTOR_EXPONENT, &snapshot).unwrap();
        assert_eq!(at_span, U256::exp10(4));

        let past_span = compound_deposit(initial, p, MAX_SCALE_FACTOR_EXPONENT + 1, &snapshot).unwrap();
        assert!(past_span.is_zero());
    }

    #[test]
    fn test_yield_held_below_floor() {
        let mut sp = StabilityPool::new();
        let mut token = BoldToken::new();
        let alice = depositor("alice");

        sp.trigger_bold_rewards(units(10)).unwrap();
        assert_eq!(sp.yield_gains_pending(), units(10));
        token.mint(&Address::stability_pool(), units(10)).unwrap();

        token.mint(&alice, units(100)).unwrap();
        sp.provide_to_sp(&alice, units(100), true, &mut token).unwrap();
        assert_eq!(sp.yield_gains_pending(), 0);
        assert_eq!(sp.yield_gains_owed(), units(10));
        assert_eq!(sp.depositor_yield_gain(&alice).unwrap(), units(10));
    }

    #[test]
    fn test_yield_gain_with_pending() {
        let (mut sp, _, mut token) = funded_pool("alice", units(100), 0);
        let alice = depositor("alice");

        sp.trigger_bold_rewards(units(4)).unwrap();
        token.mint(&Address::stability_pool(), units(4)).unwrap();
        assert_eq!(sp.depositor_yield_gain(&alice).unwrap(), units(4));
        assert_eq!(sp.depositor_yield_gain_with_pending(&alice).unwrap(), units(4));

        let outcome = sp.withdraw_from_sp(&alice, units(10), true, &mut token).unwrap();
        assert_eq!(outcome.yield_sent, units(4));
        assert_eq!(token.balance_of(&alice), units(14));
    }

    #[test]
    fn test_provide_without_claim_compounds_yield() {
        let (mut sp, _, mut token) = funded_pool("alice", units(100), 0);
        let alice = depositor("alice");
        sp.trigger_bold_rewards(units(5)).unwrap();
        token.mint(&Address::stability_pool(), units(5)).unwrap();
        token.mint(&alice, units(10)).unwrap();

        let outcome = sp.provide_to_sp(&alice, units(10), false, &mut token).unwrap();
        assert_eq!(outcome.new_deposit, units(115));
        assert_eq!(outcome.yield_sent, 0);
        assert_eq!(sp.total_bold_deposits(), units(115));
        assert_eq!(sp.yield_gains_owed(), 0);
    }

    #[test]
    fn test_withdraw_floor() {
        let (mut sp, _, mut token) = funded_pool("alice", units(100), 0);
        let alice = depositor("alice");

        let result = sp.withdraw_from_sp(&alice, units(100), true, &mut token);
        assert!(matches!(result, Err(Error::DepositsBelowMinimum { .. })));

        let outcome = sp.withdraw_from_sp(&alice, units(99), true, &mut token).unwrap();
        assert_eq!(outcome.withdrawn, units(99));
        assert_eq!(sp.total_bold_deposits(), units(1));
        assert!(matches!(
            sp.withdraw_from_sp(&depositor("bob"), 1, true, &mut token),
            Err(Error::NoDeposit(_))
        ));
    }

    #[test]
    fn test_stash_and_claim_all() {
        let (mut sp, mut active, mut token) = funded_pool("alice", units(1_000), units(5));
        token.mint(&depositor("bob"), units(1_000)).unwrap();
        sp.provide_to_sp(&depositor("bob"), units(1_000), true, &mut token).unwrap();
        sp.offset(units(500), units(2), &mut active, &mut token).unwrap();
        let alice = depositor("alice");

        let outcome = sp.withdraw_from_sp(&alice, u128::MAX, false, &mut token).unwrap();
        assert_eq!(outcome.new_deposit, 0);
        assert_eq!(outcome.coll_stashed, units(1));
        assert_eq!(sp.initial_deposit(&alice), 0);
        assert!(sp.snapshot(&alice).is_none());

        assert_eq!(sp.claim_all_coll_gains(&alice).unwrap(), units(1));
        assert!(matches!(sp.claim_all_coll_gains(&alice), Err(Error::NothingToClaim(_))));
        assert!(matches!(
            sp.claim_all_coll_gains(&depositor("bob")),
            Err(Error::ActiveDeposit(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_offset_keeps_p_positive(
            deposit in 2u128..1_000_000,
            fractions in proptest::collection::vec(1u128..1_000, 1..8),
        ) {
            let (mut sp, mut active, mut token) = funded_pool("alice", units(deposit), units(1));
            for fraction in fractions {
                let total = sp.total_bold_deposits();
                let debt = total / 1_000 * fraction;
                if debt == 0 || debt >= total {
                    continue;
                }
                sp.offset(debt, 0, &mut active, &mut token).unwrap();
                prop_assert!(!sp.p().is_zero());
                prop_assert!(sp.p() <= wide(P_PRECISION));
                prop_assert!(sp.compounded_bold_deposit(&depositor("alice")).unwrap() <= sp.total_bold_deposits());
            }
        }
    }
}
