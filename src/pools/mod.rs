//! Internal pools of the Bold accounting engine.
//!
//! - Active pool: collateral and aggregate debt of open troves
//! - Default pool: redistributed value awaiting absorption
//! - Stability pool: depositor capital absorbing liquidations
//! - Collateral surplus pool: collateral owed back to borrowers

pub mod active_pool;
pub mod coll_surplus_pool;
pub mod default_pool;
pub mod stability_pool;

pub use active_pool::*;
pub use coll_surplus_pool::*;
pub use default_pool::*;
pub use stability_pool::*;
