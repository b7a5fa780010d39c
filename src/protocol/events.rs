//! Protocol events for state change notifications.
//!
//! Every committed operation appends one event to the engine's log. A failed
//! operation leaves the log untouched along with the rest of the state.

use serde::{Deserialize, Serialize};

use crate::core::trove::TroveId;
use crate::error::{Error, Result};
use crate::utils::crypto::{merkle_root, Address, Hash};

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// All protocol event types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolEvent {
    // Trove Events
    /// Trove was opened
    TroveOpened(TroveOpenedEvent),
    /// Trove collateral or debt changed
    TroveAdjusted(TroveAdjustedEvent),
    /// Trove interest rate changed
    InterestRateAdjusted(InterestRateAdjustedEvent),
    /// Trove was closed by its owner
    TroveClosed(TroveClosedEvent),
    /// Trove was liquidated
    TroveLiquidated(TroveLiquidatedEvent),
    /// Liquidation surplus claimed
    SurplusClaimed(CollClaimedEvent),

    // Batch Events
    /// Batch was registered
    BatchCreated(BatchCreatedEvent),
    /// Trove joined a batch
    TroveJoinedBatch(BatchMembershipEvent),
    /// Trove left a batch
    TroveExitedBatch(BatchMembershipEvent),

    // Redemption Events
    /// Debt redeemed for collateral
    Redemption(RedemptionEvent),
    /// Debt redeemed for collateral during shutdown
    UrgentRedemption(RedemptionEvent),

    // Stability Pool Events
    /// Deposit to stability pool
    StabilityDeposit(StabilityDepositEvent),
    /// Withdrawal from stability pool
    StabilityWithdrawal(StabilityDepositEvent),
    /// Stashed collateral gains claimed
    CollGainsClaimed(CollClaimedEvent),

    // Protocol Events
    /// System shut down
    Shutdown(ShutdownEvent),
}

impl ProtocolEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TroveOpened(_) => "TroveOpened",
            Self::TroveAdjusted(_) => "TroveAdjusted",
            Self::InterestRateAdjusted(_) => "InterestRateAdjusted",
            Self::TroveClosed(_) => "TroveClosed",
            Self::TroveLiquidated(_) => "TroveLiquidated",
            Self::SurplusClaimed(_) => "SurplusClaimed",
            Self::BatchCreated(_) => "BatchCreated",
            Self::TroveJoinedBatch(_) => "TroveJoinedBatch",
            Self::TroveExitedBatch(_) => "TroveExitedBatch",
            Self::Redemption(_) => "Redemption",
            Self::UrgentRedemption(_) => "UrgentRedemption",
            Self::StabilityDeposit(_) => "StabilityDeposit",
            Self::StabilityWithdrawal(_) => "StabilityWithdrawal",
            Self::CollGainsClaimed(_) => "CollGainsClaimed",
            Self::Shutdown(_) => "Shutdown",
        }
    }

    /// Get the timestamp of the event
    pub fn timestamp(&self) -> u64 {
        match self {
            Self::TroveOpened(e) => e.timestamp,
            Self::TroveAdjusted(e) => e.timestamp,
            Self::InterestRateAdjusted(e) => e.timestamp,
            Self::TroveClosed(e) => e.timestamp,
            Self::TroveLiquidated(e) => e.timestamp,
            Self::SurplusClaimed(e) => e.timestamp,
            Self::BatchCreated(e) => e.timestamp,
            Self::TroveJoinedBatch(e) => e.timestamp,
            Self::TroveExitedBatch(e) => e.timestamp,
            Self::Redemption(e) => e.timestamp,
            Self::UrgentRedemption(e) => e.timestamp,
            Self::StabilityDeposit(e) => e.timestamp,
            Self::StabilityWithdrawal(e) => e.timestamp,
            Self::CollGainsClaimed(e) => e.timestamp,
            Self::Shutdown(e) => e.timestamp,
        }
    }

    /// Compute event hash
    pub fn hash(&self) -> Result<Hash> {
        let data = bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(Hash::sha256(&data))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TROVE EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Event emitted when a trove is opened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TroveOpenedEvent {
    /// Trove identifier
    pub trove_id: TroveId,
    /// Owner
    pub owner: Address,
    /// Collateral deposited
    pub coll: u128,
    /// Debt borrowed
    pub debt: u128,
    /// Upfront fee added to the debt
    pub upfront_fee: u128,
    /// Annual interest rate
    pub annual_interest_rate: u128,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when a trove's collateral or debt changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TroveAdjustedEvent {
    /// Trove identifier
    pub trove_id: TroveId,
    /// Collateral after the change
    pub new_coll: u128,
    /// Debt after the change
    pub new_debt: u128,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when a standalone trove changes its rate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestRateAdjustedEvent {
    /// Trove identifier
    pub trove_id: TroveId,
    /// Previous rate
    pub old_rate: u128,
    /// New rate
    pub new_rate: u128,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when an owner closes a trove
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TroveClosedEvent {
    /// Trove identifier
    pub trove_id: TroveId,
    /// Owner
    pub owner: Address,
    /// Debt burned
    pub debt_repaid: u128,
    /// Collateral returned
    pub coll_returned: u128,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted for each liquidated trove
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TroveLiquidatedEvent {
    /// Trove identifier
    pub trove_id: TroveId,
    /// Liquidator
    pub liquidator: Address,
    /// Entire debt at liquidation
    pub debt: u128,
    /// Entire collateral at liquidation
    pub coll: u128,
    /// Debt absorbed by the stability pool
    pub debt_offset: u128,
    /// Debt redistributed
    pub debt_redistributed: u128,
    /// Collateral returned to the owner through the surplus pool
    pub coll_surplus: u128,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when collateral is paid out on claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollClaimedEvent {
    /// Claiming account
    pub account: Address,
    /// Collateral paid
    pub coll: u128,
    /// Timestamp
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// BATCH EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Event emitted when a batch is registered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCreatedEvent {
    /// Manager
    pub manager: Address,
    /// Batch rate
    pub annual_interest_rate: u128,
    /// Management fee
    pub annual_management_fee: u128,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when a trove joins or exits a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchMembershipEvent {
    /// Trove identifier
    pub trove_id: TroveId,
    /// Batch manager
    pub manager: Address,
    /// Trove's rate after the change
    pub annual_interest_rate: u128,
    /// Timestamp
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// REDEMPTION & STABILITY POOL EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Event emitted for a redemption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionEvent {
    /// Redeemer
    pub redeemer: Address,
    /// Debt redeemed
    pub redeemed: u128,
    /// Collateral paid to the redeemer
    pub coll_drawn: u128,
    /// Collateral kept by troves as fee
    pub coll_fee: u128,
    /// Troves touched
    pub troves: Vec<TroveId>,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted for a stability pool deposit or withdrawal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StabilityDepositEvent {
    /// Depositor
    pub depositor: Address,
    /// Amount deposited or withdrawn
    pub amount: u128,
    /// Deposit after the operation
    pub new_deposit: u128,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted on shutdown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownEvent {
    /// Total collateral ratio at shutdown, if a price was available
    pub tcr: Option<u128>,
    /// Timestamp
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT LOG
// ═══════════════════════════════════════════════════════════════════════════════

/// Ordered log of committed events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<ProtocolEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Add an event to the log
    pub fn push(&mut self, event: ProtocolEvent) {
        self.events.push(event);
    }

    /// Get all events
    pub fn events(&self) -> &[ProtocolEvent] {
        &self.events
    }

    /// Get events of a specific type
    pub fn filter_by_type(&self, event_type: &str) -> Vec<&ProtocolEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Get the number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Compute merkle root of all events
    pub fn merkle_root(&self) -> Result<Hash> {
        let hashes = self.events.iter().map(ProtocolEvent::hash).collect::<Result<Vec<_>>>()?;
        Ok(merkle_root(&hashes))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn opened(timestamp: u64) -> ProtocolEvent {
        ProtocolEvent::TroveOpened(TroveOpenedEvent {
            trove_id: TroveId(1),
            owner: Address::from_label("alice"),
            coll: 10,
            debt: 2_000,
            upfront_fee: 0,
            annual_interest_rate: 5,
            timestamp,
        })
    }

    #[test]
    fn test_event_types() {
        let event = opened(1234567890);
        assert_eq!(event.event_type(), "TroveOpened");
        assert_eq!(event.timestamp(), 1234567890);

        let shutdown = ProtocolEvent::Shutdown(ShutdownEvent { tcr: None, timestamp: 7 });
        assert_eq!(shutdown.event_type(), "Shutdown");
        assert_eq!(shutdown.timestamp(), 7);
    }

    #[test]
    fn test_event_log() {
        let mut log = EventLog::new();
        assert!(log.is_empty());

        log.push(opened(1));
        log.push(ProtocolEvent::StabilityDeposit(StabilityDepositEvent {
            depositor: Address::from_label("bob"),
            amount: 100,
            new_deposit: 100,
            timestamp: 2,
        }));

        assert_eq!(log.len(), 2);
        assert_eq!(log.filter_by_type("TroveOpened").len(), 1);
        assert_eq!(log.filter_by_type("StabilityDeposit").len(), 1);
        assert!(log.filter_by_type("Redemption").is_empty());
    }

    #[test]
    fn test_event_hash() {
        let hash1 = opened(1).hash().unwrap();
        let hash2 = opened(1).hash().unwrap();
        assert_eq!(hash1, hash2);
        assert!(!hash1.is_zero());
        assert_ne!(hash1, opened(2).hash().unwrap());
    }

    #[test]
    fn test_event_log_merkle_root() {
        let mut log = EventLog::new();

        let empty_root = log.merkle_root().unwrap();
        assert!(empty_root.is_zero());

        log.push(opened(1));
        let root_with_one = log.merkle_root().unwrap();
        assert!(!root_with_one.is_zero());
        assert_ne!(empty_root, root_with_one);
    }
}
