//! Protocol module - trove manager and orchestration.
//!
//! This module provides the trove manager that drives every pool and
//! registry, together with its operations:
//! - Borrower, batch and stability pool operations
//! - Liquidations
//! - Redemptions
//! - Event log

pub mod events;
pub mod liquidations;
pub mod operations;
pub mod redemptions;
pub mod trove_manager;

pub use events::*;
pub use redemptions::*;
pub use trove_manager::*;
