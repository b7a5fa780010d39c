//! Collateral surplus pool.
//!
//! Escrow for collateral owed back to borrowers: the part of a liquidated
//! trove's collateral above the penalty cap, and whatever is left in a trove
//! closed by redemption.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::utils::crypto::Address;
use crate::utils::math::{safe_add, safe_sub};

/// Per-account claimable collateral
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollSurplusPool {
    /// Total collateral held
    coll_balance: u128,
    /// Claimable collateral by account
    balances: BTreeMap<Address, u128>,
}

impl CollSurplusPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Total collateral held
    pub fn coll_balance(&self) -> u128 {
        self.coll_balance
    }

    /// Claimable collateral of `account`
    pub fn collateral_of(&self, account: &Address) -> u128 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Credit `amount` to `account`; the collateral arrives with the credit
    pub fn account_surplus(&mut self, account: &Address, amount: u128) -> Result<()> {
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        let new_balance = safe_add(self.collateral_of(account), amount)?;
        self.coll_balance = safe_add(self.coll_balance, amount)?;
        self.balances.insert(*account, new_balance);
        Ok(())
    }

    /// Zero `account`'s balance and return it
    pub fn claim_coll(&mut self, account: &Address) -> Result<u128> {
        let claimable = self.collateral_of(account);
        if claimable == 0 {
            return Err(Error::NothingToClaim(account.to_string()));
        }
        self.coll_balance = safe_sub(self.coll_balance, claimable)?;
        self.balances.remove(account);
        Ok(claimable)
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
