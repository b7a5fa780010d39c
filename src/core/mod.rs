//! Core modules for the Bold accounting engine.
//!
//! This module contains the fundamental building blocks:
//! - Configuration and protocol parameters
//! - Trove and batch records
//! - Ordered trove index
//! - Debt token ledger interface

pub mod batch;
pub mod config;
pub mod sorted_troves;
pub mod token;
pub mod trove;

pub use batch::*;
pub use config::*;
pub use sorted_troves::*;
pub use token::*;
pub use trove::*;
