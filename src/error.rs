//! Error taxonomy for the routing engine
//!
//! Governance setters fail fast with a static reason. Problems in generated
//! instruction lists only surface when a batch executes, as `BatchAborted`.

use alloy_primitives::{Address, B256};
use thiserror::Error;

/// Library result type
pub type Result<T> = std::result::Result<T, RouterError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Venue unavailable: no code at {0}")]
    VenueUnavailable(Address),

    #[error("Unauthorized: {caller} lacks role {role}")]
    Unauthorized { caller: Address, role: &'static str },

    #[error("Deposit limit exceeded for pool {pool}: requested {requested}, headroom {headroom}")]
    LimitExceeded {
        pool: Address,
        requested: String,
        headroom: String,
    },

    #[error("Invalid strategy step {index}: {reason}")]
    InvalidStep { index: usize, reason: &'static str },

    #[error("Batch aborted at instruction {index} (target {target}): {reason}")]
    BatchAborted {
        index: usize,
        target: Address,
        reason: String,
    },

    #[error("Operation not supported by {family} adapter: {operation}")]
    Unsupported {
        family: &'static str,
        operation: &'static str,
    },

    #[error("Stake locked in tier {tier} until {unlock_at}")]
    StakeLocked { tier: usize, unlock_at: u64 },

    #[error("Insufficient stake: requested {requested}, staked {staked}")]
    InsufficientStake { requested: String, staked: String },

    #[error("Insufficient shares: requested {requested}, held {held}")]
    InsufficientShares { requested: String, held: String },

    #[error("Strategy {strategy} not eligible: {reason}")]
    Ineligible {
        strategy: B256,
        reason: &'static str,
    },

    #[error("Vault is paused")]
    Paused,

    #[error("Vault is discontinued and no longer accepts deposits")]
    Discontinued,

    #[error("Vault value is zero with {shares} shares outstanding")]
    WorthlessShares { shares: String },

    #[error("Call to {target} failed: {reason}")]
    CallFailed { target: Address, reason: String },

    #[error("Failed to decode return data: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RouterError {
    pub fn unknown_strategy(hash: B256) -> Self {
        RouterError::NotFound(format!("strategy {hash}"))
    }

    pub fn unknown_pool(pool: Address) -> Self {
        RouterError::NotFound(format!("pool {pool}"))
    }
}

impl From<alloy_sol_types::Error> for RouterError {
    fn from(err: alloy_sol_types::Error) -> Self {
        RouterError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_subject() {
        let pool = Address::repeat_byte(0x11);
        let err = RouterError::VenueUnavailable(pool);
        assert!(err.to_string().contains(&pool.to_string()));

        let err = RouterError::unknown_strategy(B256::ZERO);
        assert!(matches!(err, RouterError::NotFound(_)));
        assert!(err.to_string().starts_with("Not found: strategy"));
    }
}
