//! Trove records and their lifecycle.
//!
//! A trove is a borrower position: collateral, recorded debt, an interest
//! rate and a stake used for redistribution. Status changes go through a
//! single transition table so no call site can move a trove into a state
//! it must not reach.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::utils::constants::DECIMAL_PRECISION;
use crate::utils::crypto::Address;
use crate::utils::math::*;

// ═══════════════════════════════════════════════════════════════════════════════
// TROVE ID
// ═══════════════════════════════════════════════════════════════════════════════

/// Stable arena key of a trove
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TroveId(pub u64);

impl TroveId {
    /// Raw numeric value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TroveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TROVE STATUS
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifecycle state of a trove
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TroveStatus {
    /// Never opened
    NonExistent,
    /// Open with at least the minimum debt
    Active,
    /// Open with sub-minimum debt after a partial redemption
    Zombie,
    /// Closed by its owner
    ClosedByOwner,
    /// Closed by liquidation
    ClosedByLiquidation,
    /// Closed by a redemption that cleared its debt
    ClosedByRedemption,
}

impl TroveStatus {
    /// Liquidatable and redeemable states
    pub fn is_open(&self) -> bool {
        matches!(self, TroveStatus::Active | TroveStatus::Zombie)
    }

    /// Check if the trove can never be used again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TroveStatus::ClosedByOwner
                | TroveStatus::ClosedByLiquidation
                | TroveStatus::ClosedByRedemption
        )
    }

    /// Transition table
    pub fn can_transition_to(&self, next: TroveStatus) -> bool {
        use TroveStatus::*;
        matches!(
            (self, next),
            (NonExistent, Active)
                | (Active, Zombie)
                | (Zombie, Active)
                | (Active, ClosedByOwner)
                | (Active, ClosedByLiquidation)
                | (Active, ClosedByRedemption)
                | (Zombie, ClosedByOwner)
                | (Zombie, ClosedByLiquidation)
                | (Zombie, ClosedByRedemption)
        )
    }

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            TroveStatus::NonExistent => "NonExistent",
            TroveStatus::Active => "Active",
            TroveStatus::Zombie => "Zombie",
            TroveStatus::ClosedByOwner => "ClosedByOwner",
            TroveStatus::ClosedByLiquidation => "ClosedByLiquidation",
            TroveStatus::ClosedByRedemption => "ClosedByRedemption",
        }
    }
}

impl fmt::Display for TroveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TROVE
// ═══════════════════════════════════════════════════════════════════════════════

/// A borrower position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trove {
    /// Registry key
    pub id: TroveId,
    /// Owner account
    pub owner: Address,
    /// Recorded debt (standalone troves only, batch members use shares)
    pub debt: u128,
    /// Recorded collateral
    pub coll: u128,
    /// Redistribution stake
    pub stake: u128,
    /// Lifecycle state
    pub status: TroveStatus,
    /// Annual interest rate (batch rate for members)
    pub annual_interest_rate: u128,
    /// Batch manager, if the trove belongs to a batch
    pub batch_manager: Option<Address>,
    /// Share of the batch's debt
    pub batch_debt_shares: u128,
    /// Last time recorded debt absorbed accrued interest
    pub last_debt_update_time: u64,
    /// Last time the interest rate changed
    pub last_interest_rate_adj_time: u64,
}

impl Trove {
    /// Create an unopened trove record
    pub fn new(id: TroveId, owner: Address, now: u64) -> Self {
        Self {
            id,
            owner,
            debt: 0,
            coll: 0,
            stake: 0,
            status: TroveStatus::NonExistent,
            annual_interest_rate: 0,
            batch_manager: None,
            batch_debt_shares: 0,
            last_debt_update_time: now,
            last_interest_rate_adj_time: now,
        }
    }

    /// Move to `next` if the transition table allows it
    pub fn set_status(&mut self, next: TroveStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidStatusTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// Fail unless the trove is active or zombie
    pub fn require_open(&self) -> Result<()> {
        if !self.status.is_open() {
            return Err(Error::TroveNotOpen {
                id: self.id.0,
                status: self.status.to_string(),
            });
        }
        Ok(())
    }

    /// Fail unless `caller` owns the trove
    pub fn require_owner(&self, caller: &Address) -> Result<()> {
        if &self.owner != caller {
            return Err(Error::Unauthorized(format!(
                "{} does not own trove {}",
                caller, self.id
            )));
        }
        Ok(())
    }

    /// Check batch membership
    pub fn is_in_batch(&self) -> bool {
        self.batch_manager.is_some()
    }

    /// Clear balances after a terminal transition
    pub fn zero_out(&mut self) {
        self.debt = 0;
        self.coll = 0;
        self.stake = 0;
        self.annual_interest_rate = 0;
        self.batch_manager = None;
        self.batch_debt_shares = 0;
    }

    /// Recorded debt weighted by the trove's own rate
    pub fn weighted_recorded_debt(&self) -> U256 {
        wide_mul(self.debt, self.annual_interest_rate)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REDISTRIBUTION SNAPSHOT
// ═══════════════════════════════════════════════════════════════════════════════

/// Redistribution accumulators observed at a trove's last update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSnapshot {
    /// `L_coll` at last update
    pub coll: U256,
    /// `L_debt` at last update
    pub debt: U256,
}

impl RewardSnapshot {
    /// Pending redistribution gains `(debt, coll)` for `stake`
    pub fn pending_gains(&self, stake: u128, l_coll: U256, l_debt: U256) -> Result<(u128, u128)> {
        let unit = wide(DECIMAL_PRECISION);
        let debt_gain = wide(stake)
            .checked_mul(wide_sub(l_debt, self.debt)?)
            .ok_or_else(|| Error::Overflow {
                operation: "redistribution debt gain".into(),
            })?
            / unit;
        let coll_gain = wide(stake)
            .checked_mul(wide_sub(l_coll, self.coll)?)
            .ok_or_else(|| Error::Overflow {
                operation: "redistribution coll gain".into(),
            })?
            / unit;
        Ok((
            narrow(debt_gain, "redistribution debt gain")?,
            narrow(coll_gain, "redistribution coll gain")?,
        ))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TROVE CHANGE
// ═══════════════════════════════════════════════════════════════════════════════

/// Delta applied to the aggregate pools by one or more trove updates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TroveChange {
    /// Redistribution debt moved from the default pool
    pub applied_redist_debt_gain: u128,
    /// Redistribution collateral moved from the default pool
    pub applied_redist_coll_gain: u128,
    /// Collateral added
    pub coll_increase: u128,
    /// Collateral removed
    pub coll_decrease: u128,
    /// Debt added
    pub debt_increase: u128,
    /// Debt removed
    pub debt_decrease: u128,
    /// Weighted recorded debt after the change
    pub new_weighted_recorded_debt: U256,
    /// Weighted recorded debt before the change
    pub old_weighted_recorded_debt: U256,
    /// Upfront interest charged
    pub upfront_fee: u128,
    /// Batch management fee realized by the change
    pub batch_accrued_management_fee: u128,
    /// Weighted batch management fee after the change
    pub new_weighted_recorded_batch_management_fee: U256,
    /// Weighted batch management fee before the change
    pub old_weighted_recorded_batch_management_fee: U256,
}

impl TroveChange {
    /// Add another change's debt, collateral and weighted-debt terms
    pub fn accumulate(&mut self, other: &TroveChange) -> Result<()> {
        self.applied_redist_debt_gain =
            safe_add(self.applied_redist_debt_gain, other.applied_redist_debt_gain)?;
        self.applied_redist_coll_gain =
            safe_add(self.applied_redist_coll_gain, other.applied_redist_coll_gain)?;
        self.coll_increase = safe_add(self.coll_increase, other.coll_increase)?;
        self.coll_decrease = safe_add(self.coll_decrease, other.coll_decrease)?;
        self.debt_increase = safe_add(self.debt_increase, other.debt_increase)?;
        self.debt_decrease = safe_add(self.debt_decrease, other.debt_decrease)?;
        self.new_weighted_recorded_debt =
            wide_add(self.new_weighted_recorded_debt, other.new_weighted_recorded_debt)?;
        self.old_weighted_recorded_debt =
            wide_add(self.old_weighted_recorded_debt, other.old_weighted_recorded_debt)?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LATEST TROVE DATA
// ═══════════════════════════════════════════════════════════════════════════════

/// A trove's obligations as of now, including everything not yet recorded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestTroveData {
    /// Recorded debt + redistribution gain + interest + batch fee
    pub entire_debt: u128,
    /// Recorded collateral + redistribution gain
    pub entire_coll: u128,
    /// Pending redistribution debt
    pub redist_debt_gain: u128,
    /// Pending redistribution collateral
    pub redist_coll_gain: u128,
    /// Recorded debt (pro-rata for batch members)
    pub recorded_debt: u128,
    /// Effective annual interest rate
    pub annual_interest_rate: u128,
    /// Recorded debt weighted by rate
    pub weighted_recorded_debt: U256,
    /// Interest accrued since the last update, rounded down
    pub accrued_interest: u128,
    /// Batch management fee accrued since the last update
    pub accrued_batch_management_fee: u128,
    /// Last interest rate change (trove or batch, whichever is later)
    pub last_interest_rate_adj_time: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TROVE ADJUSTMENT
// ═══════════════════════════════════════════════════════════════════════════════

/// Owner-requested change to a trove's collateral and debt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TroveAdjustment {
    /// Collateral to add
    pub coll_increase: u128,
    /// Collateral to withdraw
    pub coll_decrease: u128,
    /// Debt to borrow
    pub debt_increase: u128,
    /// Debt to repay
    pub debt_decrease: u128,
}

impl TroveAdjustment {
    /// Add collateral
    pub fn add_coll(amount: u128) -> Self {
        Self { coll_increase: amount, ..Default::default() }
    }

    /// Withdraw collateral
    pub fn withdraw_coll(amount: u128) -> Self {
        Self { coll_decrease: amount, ..Default::default() }
    }

    /// Borrow more
    pub fn borrow(amount: u128) -> Self {
        Self { debt_increase: amount, ..Default::default() }
    }

    /// Repay debt
    pub fn repay(amount: u128) -> Self {
        Self { debt_decrease: amount, ..Default::default() }
    }

    /// True if the adjustment can lower the trove's ICR
    pub fn is_risk_increasing(&self) -> bool {
        self.debt_increase > 0 || self.coll_decrease > 0
    }

    /// Reject empty or contradictory adjustments
    pub fn validate(&self) -> Result<()> {
        if self.coll_increase > 0 && self.coll_decrease > 0 {
            return Err(Error::InvalidParameter {
                name: "coll".into(),
                reason: "cannot add and withdraw collateral together".into(),
            });
        }
        if self.debt_increase > 0 && self.debt_decrease > 0 {
            return Err(Error::InvalidParameter {
                name: "debt".into(),
                reason: "cannot borrow and repay together".into(),
            });
        }
        if self.coll_increase == 0
            && self.coll_decrease == 0
            && self.debt_increase == 0
            && self.debt_decrease == 0
        {
            return Err(Error::ZeroAmount);
        }
        Ok(())
    }
}
