//! Default pool.
//!
//! Staging ledger for collateral and debt removed from liquidated troves by
//! redistribution. Active troves absorb it lazily as they are touched.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pools::active_pool::ActivePool;
use crate::utils::math::{safe_add, safe_sub};

/// Collateral and debt awaiting absorption by active troves
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultPool {
    /// Collateral held
    coll_balance: u128,
    /// Debt held
    bold_debt: u128,
}

impl DefaultPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Collateral held
    pub fn coll_balance(&self) -> u128 {
        self.coll_balance
    }

    /// Debt held
    pub fn bold_debt(&self) -> u128 {
        self.bold_debt
    }

    /// Receive redistributed collateral
    pub fn receive_coll(&mut self, amount: u128) -> Result<()> {
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        self.coll_balance = safe_add(self.coll_balance, amount)?;
        Ok(())
    }

    /// Move collateral back to the active pool as troves absorb their gains
    pub fn send_coll_to_active_pool(&mut self, amount: u128, active_pool: &mut ActivePool) -> Result<()> {
        if amount == 0 || amount > self.coll_balance {
            return Err(Error::AmountOutOfRange {
                requested: amount,
                available: self.coll_balance,
            });
        }
        active_pool.receive_coll(amount)?;
        self.coll_balance -= amount;
        Ok(())
    }

    /// Add redistributed debt
    pub fn increase_bold_debt(&mut self, amount: u128) -> Result<()> {
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        self.bold_debt = safe_add(self.bold_debt, amount)?;
        Ok(())
    }

    /// Remove debt absorbed by a trove
    pub fn decrease_bold_debt(&mut self, amount: u128) -> Result<()> {
        if amount == 0 || amount > self.bold_debt {
            return Err(Error::AmountOutOfRange {
                requested: amount,
                available: self.bold_debt,
            });
        }
        self.bold_debt = safe_sub(self.bold_debt, amount)?;
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
