//! # Bold Core
//!
//! Accounting core of an interest-bearing, overcollateralized stablecoin:
//! borrower troves, interest batches, liquidations, redistribution,
//! redemptions and the stability pool.
//!
//! ## Architecture
//!
//! - **Core**: Configuration, trove and batch records, ordered index, debt-token ledger
//! - **Pools**: Active, default, stability and collateral surplus pools
//! - **Liquidation**: Offset / redistribution split and redistribution accumulators
//! - **Protocol**: The trove manager and its operations
//! - **Oracle**: Price feed interface
//!
//! All amounts are 18-decimal fixed point. Every operation is all-or-nothing.
//!
//! ## Example
//!
//! ```rust,ignore
//! use bold_core::prelude::*;
//!
//! let mut tm = InMemoryTroveManager::in_memory(ProtocolParams::default(), units(2_000))?;
//! let owner = Address::from_label("alice");
//! let id = tm.open_trove(&owner, units(10), units(5_000), percent(5))?;
//! tm.advance_time(ONE_YEAR_SECS)?;
//! let debt = tm.latest_trove_data(id)?.entire_debt;
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    trivial_casts,
    unused_lifetimes,
    unused_qualifications
)]

pub mod core;
pub mod error;
pub mod liquidation;
pub mod oracle;
pub mod pools;
pub mod protocol;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{
        batch::{Batch, LatestBatchData},
        config::ProtocolParams,
        sorted_troves::{InMemorySortedTroves, SortedTroves},
        token::{BoldToken, DebtToken},
        trove::{LatestTroveData, Trove, TroveAdjustment, TroveId, TroveStatus},
    };
    pub use crate::error::{Error, Result};
    pub use crate::liquidation::engine::{LiquidationOutcome, LiquidationValues};
    pub use crate::oracle::price_feed::{FixedPriceFeed, PriceFeed};
    pub use crate::pools::{ActivePool, CollSurplusPool, DefaultPool, DepositOutcome, StabilityPool};
    pub use crate::protocol::{
        events::ProtocolEvent,
        redemptions::RedemptionOutcome,
        trove_manager::{InMemoryTroveManager, SystemState, TroveManager},
    };
    pub use crate::utils::{
        constants::ONE_YEAR_SECS,
        crypto::{Address, Hash},
        math::{percent, units},
    };
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol name
pub const PROTOCOL_NAME: &str = "Bold";
