//! Liquidation module for the Bold accounting core.
//!
//! This module holds the liquidation math shared by single and batch
//! liquidations:
//! - Offset / redistribution / surplus split of a trove
//! - Redistribution accumulators with carried rounding error

pub mod engine;
pub mod redistribution;

pub use engine::*;
pub use redistribution::*;
