//! Oracle module for price feeds.
//!
//! The engine reads a single collateral price per operation through the
//! `PriceFeed` trait. `FixedPriceFeed` serves tests and simulations.

pub mod price_feed;

pub use price_feed::*;
