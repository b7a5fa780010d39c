//! Error types for the Bold accounting core.
//!
//! Every failure is surfaced synchronously to the caller of the triggering
//! operation. Nothing is retried internally and no state from a failed
//! operation is committed.

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the Bold accounting core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ═══════════════════════════════════════════════════════════════════
    // Trove & Batch Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Trove not found in the registry
    #[error("Trove not found: {0}")]
    TroveNotFound(u64),

    /// Trove status does not allow the requested operation
    #[error("Trove {id} is {status}, operation requires an open trove")]
    TroveNotOpen {
        /// Trove identifier
        id: u64,
        /// Current status name
        status: String,
    },

    /// Status change not present in the transition table
    #[error("Invalid trove status transition: {from} -> {to}")]
    InvalidStatusTransition {
        /// Current status name
        from: String,
        /// Requested status name
        to: String,
    },

    /// Debt amount below protocol minimum
    #[error("Debt amount {amount} below minimum {minimum}")]
    DebtBelowMinimum {
        /// Resulting debt amount
        amount: u128,
        /// Protocol minimum debt
        minimum: u128,
    },

    /// Collateralization ratio below the floor required by the operation
    #[error("Collateralization ratio {current} below required {minimum}")]
    CollateralizationRatioTooLow {
        /// Current ratio (1e18 = 100%)
        current: u128,
        /// Required ratio (1e18 = 100%)
        minimum: u128,
    },

    /// Trove is already a batch member
    #[error("Trove {0} already belongs to a batch")]
    TroveInBatch(u64),

    /// Trove is not a batch member
    #[error("Trove {0} is not in a batch")]
    TroveNotInBatch(u64),

    /// Batch not found
    #[error("Batch not found: {0}")]
    BatchNotFound(String),

    /// Batch already registered for this manager
    #[error("Batch already exists: {0}")]
    BatchAlreadyExists(String),

    /// Closing or liquidating the last remaining trove is not allowed
    #[error("Only one trove left in the system")]
    OnlyOneTroveInSystem,

    // ═══════════════════════════════════════════════════════════════════
    // Liquidation Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Trove is healthy and cannot be liquidated
    #[error("Trove {id} is not liquidatable: ICR {icr} >= MCR {mcr}")]
    TroveNotLiquidatable {
        /// Trove identifier
        id: u64,
        /// Current ICR
        icr: u128,
        /// Minimum collateral ratio
        mcr: u128,
    },

    /// No trove in the input set was eligible
    #[error("Nothing to liquidate")]
    NothingToLiquidate,

    /// Empty trove list supplied
    #[error("Empty trove list")]
    EmptyTroveList,

    // ═══════════════════════════════════════════════════════════════════
    // Redemption Errors
    // ═══════════════════════════════════════════════════════════════════

    /// No debt could be redeemed from the traversed troves
    #[error("Nothing to redeem")]
    NothingToRedeem,

    /// Account balance too small for the requested burn or transfer
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Required amount
        required: u128,
        /// Available amount
        available: u128,
    },

    /// Urgent redemption yielded less collateral than requested
    #[error("Collateral drawn {received} below minimum {minimum}")]
    CollateralBelowMinimum {
        /// Collateral that would be paid out
        received: u128,
        /// Caller-supplied floor
        minimum: u128,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Stability Pool Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Depositor has no deposit
    #[error("No stability pool deposit for {0}")]
    NoDeposit(String),

    /// Withdrawal would leave total deposits below the floor
    #[error("Stability pool deposits {remaining} would fall below minimum {minimum}")]
    DepositsBelowMinimum {
        /// Total deposits after the withdrawal
        remaining: u128,
        /// Minimum total deposits
        minimum: u128,
    },

    /// Nothing to claim
    #[error("Nothing to claim for {0}")]
    NothingToClaim(String),

    /// Depositor still holds a deposit
    #[error("Depositor {0} still has an active deposit")]
    ActiveDeposit(String),

    // ═══════════════════════════════════════════════════════════════════
    // Oracle & Authorization Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Price is zero or otherwise unusable
    #[error("Invalid price: {0}")]
    InvalidPrice(u128),

    /// Not authorized to perform this action
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    // ═══════════════════════════════════════════════════════════════════
    // Validation Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Invalid input parameter
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Amount is zero
    #[error("Amount cannot be zero")]
    ZeroAmount,

    /// Amount exceeds the available balance of a pool
    #[error("Amount {requested} out of range, available {available}")]
    AmountOutOfRange {
        /// Requested amount
        requested: u128,
        /// Available balance
        available: u128,
    },

    /// Interest rate outside allowed bounds
    #[error("Interest rate {rate} outside [{min}, {max}]")]
    InterestRateOutOfBounds {
        /// Requested rate
        rate: u128,
        /// Minimum rate
        min: u128,
        /// Maximum rate
        max: u128,
    },

    /// Batch management fee above the maximum
    #[error("Management fee {fee} exceeds maximum {max}")]
    ManagementFeeTooHigh {
        /// Requested fee
        fee: u128,
        /// Maximum fee
        max: u128,
    },

    /// Overflow in calculation
    #[error("Arithmetic overflow in {operation}")]
    Overflow {
        /// Operation that overflowed
        operation: String,
    },

    /// Underflow in calculation
    #[error("Arithmetic underflow in {operation}")]
    Underflow {
        /// Operation that underflowed
        operation: String,
    },

    /// Division by zero
    #[error("Division by zero in {operation}")]
    DivisionByZero {
        /// Operation that divided by zero
        operation: String,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Protocol & State Errors
    // ═══════════════════════════════════════════════════════════════════

    /// System has been shut down
    #[error("System is shut down")]
    SystemShutDown,

    /// Operation requires the system to be shut down
    #[error("System is not shut down")]
    SystemNotShutDown,

    /// Clock moved backwards
    #[error("Time cannot move backwards: now {now}, requested {requested}")]
    TimeWentBackwards {
        /// Current engine time
        now: u64,
        /// Requested time
        requested: u64,
    },

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ═══════════════════════════════════════════════════════════════════
    // Invariant Violations
    // ═══════════════════════════════════════════════════════════════════

    /// Stability pool product would reach zero
    #[error("Stability pool product P would reach zero")]
    ProductDepleted,

    /// Batch debt shares drifted away from the debt ratio
    #[error("Batch shares ratio {shares_ratio} exceeds debt ratio {debt_ratio} beyond tolerance")]
    BatchSharesRatioViolation {
        /// Trove shares / total shares (1e18 = 100%)
        shares_ratio: u128,
        /// Trove debt / batch debt (1e18 = 100%)
        debt_ratio: u128,
    },

    /// Invariant violation detected
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    // ═══════════════════════════════════════════════════════════════════
    // Serialization Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed
    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl Error {
    /// Returns true if the caller can correct the input and retry
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::DebtBelowMinimum { .. }
                | Error::CollateralizationRatioTooLow { .. }
                | Error::InsufficientBalance { .. }
                | Error::AmountOutOfRange { .. }
                | Error::InterestRateOutOfBounds { .. }
                | Error::ManagementFeeTooHigh { .. }
                | Error::ZeroAmount
                | Error::DepositsBelowMinimum { .. }
                | Error::CollateralBelowMinimum { .. }
        )
    }

    /// Returns true if this is a critical error requiring immediate attention
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Error::ProductDepleted
                | Error::BatchSharesRatioViolation { .. }
                | Error::InvariantViolation(_)
                | Error::Overflow { .. }
                | Error::Underflow { .. }
        )
    }

    /// Returns the error code for external systems
    pub fn code(&self) -> u32 {
        match self {
            // Trove & batch errors: 1xxx
            Error::TroveNotFound(_) => 1001,
            Error::TroveNotOpen { .. } => 1002,
            Error::InvalidStatusTransition { .. } => 1003,
            Error::DebtBelowMinimum { .. } => 1004,
            Error::CollateralizationRatioTooLow { .. } => 1005,
            Error::TroveInBatch(_) => 1006,
            Error::TroveNotInBatch(_) => 1007,
            Error::BatchNotFound(_) => 1008,
            Error::BatchAlreadyExists(_) => 1009,
            Error::OnlyOneTroveInSystem => 1010,

            // Liquidation errors: 2xxx
            Error::TroveNotLiquidatable { .. } => 2001,
            Error::NothingToLiquidate => 2002,
            Error::EmptyTroveList => 2003,

            // Redemption errors: 3xxx
            Error::NothingToRedeem => 3001,
            Error::InsufficientBalance { .. } => 3002,
            Error::CollateralBelowMinimum { .. } => 3003,

            // Stability pool errors: 4xxx
            Error::NoDeposit(_) => 4001,
            Error::DepositsBelowMinimum { .. } => 4002,
            Error::NothingToClaim(_) => 4003,
            Error::ActiveDeposit(_) => 4004,

            // Validation errors: 5xxx
            Error::InvalidParameter { .. } => 5001,
            Error::ZeroAmount => 5002,
            Error::AmountOutOfRange { .. } => 5003,
            Error::InterestRateOutOfBounds { .. } => 5004,
            Error::ManagementFeeTooHigh { .. } => 5005,
            Error::Overflow { .. } => 5006,
            Error::Underflow { .. } => 5007,
            Error::DivisionByZero { .. } => 5008,

            // Protocol & state errors: 6xxx
            Error::SystemShutDown => 6001,
            Error::SystemNotShutDown => 6002,
            Error::TimeWentBackwards { .. } => 6003,
            Error::InvalidConfig(_) => 6004,

            // Serialization errors: 7xxx
            Error::Serialization(_) => 7001,
            Error::Deserialization(_) => 7002,

            // Oracle & authorization errors: 8xxx
            Error::InvalidPrice(_) => 8001,
            Error::Unauthorized(_) => 8002,

            // Invariant violations: 9xxx
            Error::ProductDepleted => 9001,
            Error::BatchSharesRatioViolation { .. } => 9002,
            Error::InvariantViolation(_) => 9003,
        }
    }
}
