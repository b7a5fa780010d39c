//! Debt token ledger.
//!
//! The engine never stores debt-token balances itself. It talks to a ledger
//! through the `DebtToken` trait:
//! - Minting on borrow and interest mint
//! - Burning on repayment, redemption and stability pool offsets
//! - Transfers into and out of the stability pool
//!
//! `BoldToken` is the in-memory ledger used by hosts without their own.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::utils::crypto::{Address, Hash};
use crate::utils::math::{safe_add, safe_sub};

// ═══════════════════════════════════════════════════════════════════════════════
// LEDGER INTERFACE
// ═══════════════════════════════════════════════════════════════════════════════

/// Debt-token ledger consumed by the engine
pub trait DebtToken {
    /// Create `amount` new tokens for `account`
    fn mint(&mut self, account: &Address, amount: u128) -> Result<()>;

    /// Destroy `amount` tokens held by `account`
    fn burn(&mut self, account: &Address, amount: u128) -> Result<()>;

    /// Move `amount` tokens between accounts
    fn transfer(&mut self, from: &Address, to: &Address, amount: u128) -> Result<()>;

    /// Current balance of `account`
    fn balance_of(&self, account: &Address) -> u128;

    /// Total tokens in circulation
    fn total_supply(&self) -> u128;
}

// ═══════════════════════════════════════════════════════════════════════════════
// TOKEN OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Type of token operation for event logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenOperation {
    /// Minting new tokens
    Mint,
    /// Burning tokens
    Burn,
    /// Transfer between accounts
    Transfer,
}

/// Record of a token operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEvent {
    /// Type of operation
    pub operation: TokenOperation,
    /// Sender (None for mint)
    pub from: Option<Address>,
    /// Recipient (None for burn)
    pub to: Option<Address>,
    /// Amount moved
    pub amount: u128,
}

// ═══════════════════════════════════════════════════════════════════════════════
// BOLD TOKEN
// ═══════════════════════════════════════════════════════════════════════════════

/// In-memory debt-token ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoldToken {
    /// Token symbol
    pub symbol: String,
    /// Total supply
    total_supply: u128,
    /// Balances by account
    balances: BTreeMap<Address, u128>,
    /// Recent events (for client-side tracking)
    events: Vec<TokenEvent>,
    /// Maximum events to keep in memory
    max_events: usize,
}

impl Default for BoldToken {
    fn default() -> Self {
        Self::new()
    }
}

impl BoldToken {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self {
            symbol: "BOLD".to_string(),
            total_supply: 0,
            balances: BTreeMap::new(),
            events: Vec::new(),
            max_events: 1000,
        }
    }

    fn require_balance(&self, account: &Address, amount: u128) -> Result<u128> {
        let available = self.balance_of(account);
        if available < amount {
            return Err(Error::InsufficientBalance {
                required: amount,
                available,
            });
        }
        Ok(available)
    }

    fn set_balance(&mut self, account: &Address, balance: u128) {
        if balance == 0 {
            self.balances.remove(account);
        } else {
            self.balances.insert(*account, balance);
        }
    }

    /// Get number of token holders
    pub fn holder_count(&self) -> usize {
        self.balances.len()
    }

    /// Verify supply invariant (total_supply == sum of all balances)
    pub fn verify_supply_invariant(&self) -> bool {
        let sum = self
            .balances
            .values()
            .try_fold(0u128, |acc, b| acc.checked_add(*b));
        sum == Some(self.total_supply)
    }

    /// Get recent events
    pub fn recent_events(&self) -> &[TokenEvent] {
        &self.events
    }

    /// Get events touching a specific account
    pub fn events_for_address(&self, address: &Address) -> Vec<&TokenEvent> {
        self.events
            .iter()
            .filter(|e| e.from.as_ref() == Some(address) || e.to.as_ref() == Some(address))
            .collect()
    }

    fn add_event(&mut self, event: TokenEvent) {
        self.events.push(event);

        if self.events.len() > self.max_events {
            self.events.drain(0..self.events.len() - self.max_events);
        }
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Hash of supply and balances
    pub fn state_hash(&self) -> Hash {
        let mut data = Vec::new();
        data.extend_from_slice(&self.total_supply.to_be_bytes());
        for (account, balance) in &self.balances {
            data.extend_from_slice(account.as_bytes());
            data.extend_from_slice(&balance.to_be_bytes());
        }
        Hash::sha256(&data)
    }
}

impl DebtToken for BoldToken {
    fn mint(&mut self, account: &Address, amount: u128) -> Result<()> {
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }

        let new_supply = safe_add(self.total_supply, amount)?;
        let new_balance = safe_add(self.balance_of(account), amount)?;

        self.set_balance(account, new_balance);
        self.total_supply = new_supply;

        self.add_event(TokenEvent {
            operation: TokenOperation::Mint,
            from: None,
            to: Some(*account),
            amount,
        });
        Ok(())
    }

    fn burn(&mut self, account: &Address, amount: u128) -> Result<()> {
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }

        let balance = self.require_balance(account, amount)?;
        let new_supply = safe_sub(self.total_supply, amount)?;

        self.set_balance(account, balance - amount);
        self.total_supply = new_supply;

        self.add_event(TokenEvent {
            operation: TokenOperation::Burn,
            from: Some(*account),
            to: None,
            amount,
        });
        Ok(())
    }

    fn transfer(&mut self, from: &Address, to: &Address, amount: u128) -> Result<()> {
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }

        let from_balance = self.require_balance(from, amount)?;
        if from == to {
            return Ok(());
        }

        let to_balance = safe_add(self.balance_of(to), amount)?;
        self.set_balance(from, from_balance - amount);
        self.set_balance(to, to_balance);

        self.add_event(TokenEvent {
            operation: TokenOperation::Transfer,
            from: Some(*from),
            to: Some(*to),
            amount,
        });
        Ok(())
    }

    fn balance_of(&self, account: &Address) -> u128 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn total_supply(&self) -> u128 {
        self.total_supply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::math::units;

    fn alice() -> Address {
        Address::from_label("alice")
    }

    fn bob() -> Address {
        Address::from_label("bob")
    }

    #[test]
    fn test_mint() {
        let mut token = BoldToken::new();

        token.mint(&alice(), units(1_000)).unwrap();

        assert_eq!(token.balance_of(&alice()), units(1_000));
        assert_eq!(token.total_supply(), units(1_000));
        assert!(matches!(token.mint(&alice(), 0), Err(Error::ZeroAmount)));
    }

    #[test]
    fn test_burn() {
        let mut token = BoldToken::new();
        token.mint(&alice(), units(1_000)).unwrap();

        token.burn(&alice(), units(400)).unwrap();

        assert_eq!(token.balance_of(&alice()), units(600));
        assert_eq!(token.total_supply(), units(600));
    }

    #[test]
    fn test_burn_insufficient_balance() {
        let mut token = BoldToken::new();
        token.mint(&alice(), units(100)).unwrap();

        let result = token.burn(&alice(), units(101));
        assert!(matches!(result, Err(Error::InsufficientBalance { .. })));
        assert_eq!(token.total_supply(), units(100));
    }

    #[test]
    fn test_transfer() {
        let mut token = BoldToken::new();
        token.mint(&alice(), units(1_000)).unwrap();

        token.transfer(&alice(), &bob(), units(250)).unwrap();

        assert_eq!(token.balance_of(&alice()), units(750));
        assert_eq!(token.balance_of(&bob()), units(250));
        assert!(token.transfer(&bob(), &alice(), units(251)).is_err());
        assert_eq!(token.events_for_address(&bob()).len(), 1);
    }

    #[test]
    fn test_supply_invariant() {
        let mut token = BoldToken::new();
        token.mint(&alice(), units(10)).unwrap();
        token.mint(&bob(), units(5)).unwrap();
        token.transfer(&alice(), &bob(), units(3)).unwrap();
        token.burn(&bob(), units(8)).unwrap();

        assert!(token.verify_supply_invariant());
        assert_eq!(token.holder_count(), 1);
    }

    #[test]
    fn test_state_hash_deterministic() {
        let mut a = BoldToken::new();
        let mut b = BoldToken::new();
        a.mint(&alice(), units(1)).unwrap();
        a.mint(&bob(), units(2)).unwrap();
        b.mint(&bob(), units(2)).unwrap();
        b.mint(&alice(), units(1)).unwrap();

        assert_eq!(a.state_hash(), b.state_hash());
        let restored = BoldToken::from_bytes(&a.to_bytes().unwrap()).unwrap();
        assert_eq!(restored.state_hash(), a.state_hash());
    }
}
