//! Price feed interface.
//!
//! This module provides the price source consumed by the engine:
//! - `PriceFeed` trait returning the collateral price
//! - `FixedPriceFeed` with a settable price and update history

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE FEED
// ═══════════════════════════════════════════════════════════════════════════════

/// Source of the collateral price (debt-token units per collateral unit, 1e18 = 1.0)
pub trait PriceFeed {
    /// Current price; zero is a hard failure
    fn fetch_price(&self) -> Result<u128>;
}

/// Validate a price read from any source
pub fn validate_price(price: u128) -> Result<u128> {
    if price == 0 {
        return Err(Error::InvalidPrice(price));
    }
    Ok(price)
}

// ═══════════════════════════════════════════════════════════════════════════════
// FIXED PRICE FEED
// ═══════════════════════════════════════════════════════════════════════════════

/// Price feed holding a manually set price
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedPriceFeed {
    /// Current price
    current: u128,
    /// Previous price (for change detection)
    previous: u128,
    /// Price history
    history: Vec<u128>,
    /// Maximum history size
    max_history: usize,
}

impl FixedPriceFeed {
    /// Create a feed at `price`
    pub fn new(price: u128) -> Self {
        Self {
            current: price,
            previous: price,
            history: vec![price],
            max_history: 100,
        }
    }

    /// Replace the current price
    pub fn set_price(&mut self, price: u128) {
        self.previous = self.current;
        self.current = price;

        self.history.push(price);
        if self.history.len() > self.max_history {
            self.history.remove(0);
        }
    }

    /// Price before the last update
    pub fn previous_price(&self) -> u128 {
        self.previous
    }

    /// Recorded prices, oldest first
    pub fn history(&self) -> &[u128] {
        &self.history
    }

    /// Change from previous price in basis points
    pub fn price_change_bps(&self) -> i64 {
        if self.previous == 0 {
            return 0;
        }
        let diff = self.current as i128 - self.previous as i128;
        (diff * 10_000 / self.previous as i128) as i64
    }
}

impl PriceFeed for FixedPriceFeed {
    fn fetch_price(&self) -> Result<u128> {
        validate_price(self.current)
    }
}
