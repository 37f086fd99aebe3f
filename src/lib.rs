//! Yield Router
//!
//! Routes a vault's underlying token through multi-step strategies across
//! lending and liquidity venues. Strategies are content-addressed, deposits
//! are clipped by governance limits, and every rebalance executes as one
//! atomic batch against the ledger.

pub mod abi;
pub mod adapters;
pub mod catalog;
pub mod chain;
pub mod config;
pub mod error;
pub mod governance;
pub mod ledger;
pub mod rewards;
pub mod sandbox;
pub mod selection;
pub mod vault;

pub use error::{Result, RouterError};
