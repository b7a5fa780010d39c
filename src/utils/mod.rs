//! Utility modules for the Bold accounting core.
//!
//! This module contains shared utilities used across the engine:
//! - Hashing and account identifiers
//! - Fixed-point arithmetic with explicit rounding
//! - Constants

pub mod constants;
pub mod crypto;
pub mod math;

pub use constants::*;
pub use crypto::*;
pub use math::*;
