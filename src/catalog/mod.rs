//! Strategy Catalog
//!
//! Content-addressed store of ordered investment steps. A strategy is keyed by
//! the hash of its step sequence; strategies are also listed per token set in
//! insertion order. Entries are immutable: re-registering identical steps
//! returns the existing hash.

mod hashing;

pub use hashing::{canonical_tokens, step_hash, strategy_hash, tokens_hash};

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::error::{Result, RouterError};

// ============================================
// TYPES
// ============================================

/// One pipeline stage: invest the incoming token in `pool`, producing
/// `output_token` (the receipt, or the borrowed asset for borrow steps)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StrategyStep {
    pub pool: Address,
    pub output_token: Address,
    pub is_borrow: bool,
}

impl StrategyStep {
    pub fn invest(pool: Address, output_token: Address) -> Self {
        Self {
            pool,
            output_token,
            is_borrow: false,
        }
    }

    pub fn borrow(pool: Address, borrowed: Address) -> Self {
        Self {
            pool,
            output_token: borrowed,
            is_borrow: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strategy {
    pub tokens_hash: B256,
    pub steps: Vec<StrategyStep>,
}

impl Strategy {
    pub fn has_borrow(&self) -> bool {
        self.steps.iter().any(|s| s.is_borrow)
    }

    pub fn pools(&self) -> impl Iterator<Item = Address> + '_ {
        self.steps.iter().map(|s| s.pool)
    }
}

// ============================================
// CATALOG
// ============================================

#[derive(Debug, Clone, Default)]
pub struct StrategyCatalog {
    token_sets: HashMap<B256, Vec<Address>>,
    strategies: HashMap<B256, Strategy>,
    by_tokens: HashMap<B256, Vec<B256>>,
}

impl StrategyCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a token set and return its canonical hash
    pub fn register_tokens(&mut self, tokens: &[Address]) -> B256 {
        let canonical = canonical_tokens(tokens);
        let hash = tokens_hash(&canonical);
        self.token_sets.entry(hash).or_insert(canonical);
        hash
    }

    pub fn tokens(&self, tokens_hash: &B256) -> Option<&[Address]> {
        self.token_sets.get(tokens_hash).map(Vec::as_slice)
    }

    /// The single underlying token of a registered one-token set
    pub fn underlying(&self, tokens_hash: &B256) -> Option<Address> {
        match self.tokens(tokens_hash) {
            Some([token]) => Some(*token),
            _ => None,
        }
    }

    /// Validate and store `steps` under `tokens_hash`. Idempotent.
    pub fn set_strategy(&mut self, tokens_hash: B256, steps: Vec<StrategyStep>) -> Result<B256> {
        self.validate(&tokens_hash, &steps)?;

        let hash = strategy_hash(tokens_hash, &steps);
        if self.strategies.contains_key(&hash) {
            debug!("Strategy {} already registered", hash);
            return Ok(hash);
        }

        self.strategies.insert(
            hash,
            Strategy {
                tokens_hash,
                steps,
            },
        );
        let listed = self.by_tokens.entry(tokens_hash).or_default();
        if !listed.contains(&hash) {
            listed.push(hash);
        }
        info!("📚 Registered strategy {} for token set {}", hash, tokens_hash);
        Ok(hash)
    }

    fn validate(&self, tokens_hash: &B256, steps: &[StrategyStep]) -> Result<()> {
        if steps.is_empty() {
            return Err(RouterError::InvalidStep {
                index: 0,
                reason: "strategy has no steps",
            });
        }

        let mut input = self.underlying(tokens_hash);
        for (index, step) in steps.iter().enumerate() {
            if step.pool.is_zero() {
                return Err(RouterError::InvalidStep {
                    index,
                    reason: "zero pool address",
                });
            }
            if step.is_borrow {
                if step.output_token.is_zero() {
                    return Err(RouterError::InvalidStep {
                        index,
                        reason: "borrow step without output token",
                    });
                }
                if input == Some(step.output_token) {
                    return Err(RouterError::InvalidStep {
                        index,
                        reason: "borrow output equals its input",
                    });
                }
            }
            input = Some(step.output_token);
        }
        Ok(())
    }

    pub fn get_strategy(&self, strategy_hash: &B256) -> Result<&Strategy> {
        self.strategies
            .get(strategy_hash)
            .ok_or_else(|| RouterError::unknown_strategy(*strategy_hash))
    }

    /// Strategy hashes for a token set, in registration order. Each call
    /// starts a fresh pass.
    pub fn get_strategies_for(&self, tokens_hash: &B256) -> impl Iterator<Item = B256> + '_ {
        self.by_tokens
            .get(tokens_hash)
            .into_iter()
            .flatten()
            .copied()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAI: Address = Address::repeat_byte(0xda);
    const USDC: Address = Address::repeat_byte(0xdc);
    const CDAI: Address = Address::repeat_byte(0xcd);
    const AAVE: Address = Address::repeat_byte(0xaa);

    fn catalog() -> (StrategyCatalog, B256) {
        let mut catalog = StrategyCatalog::new();
        let th = catalog.register_tokens(&[DAI]);
        (catalog, th)
    }

    #[test]
    fn test_identical_registration_is_idempotent() {
        let (mut catalog, th) = catalog();
        let steps = vec![StrategyStep::invest(CDAI, CDAI)];

        let first = catalog.set_strategy(th, steps.clone()).unwrap();
        let second = catalog.set_strategy(th, steps).unwrap();

        assert_eq!(first, second);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get_strategies_for(&th).count(), 1);
    }

    #[test]
    fn test_rejects_malformed_steps() {
        let (mut catalog, th) = catalog();

        let err = catalog.set_strategy(th, vec![]).unwrap_err();
        assert!(matches!(err, RouterError::InvalidStep { index: 0, .. }));

        let err = catalog
            .set_strategy(
                th,
                vec![
                    StrategyStep::invest(CDAI, CDAI),
                    StrategyStep::invest(Address::ZERO, DAI),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, RouterError::InvalidStep { index: 1, .. }));

        // Borrowing the token we already hold
        let err = catalog
            .set_strategy(th, vec![StrategyStep::borrow(AAVE, DAI)])
            .unwrap_err();
        assert!(matches!(err, RouterError::InvalidStep { index: 0, .. }));

        assert!(catalog
            .set_strategy(th, vec![StrategyStep::borrow(AAVE, USDC)])
            .is_ok());
    }

    #[test]
    fn test_strategies_listed_in_insertion_order_and_restartable() {
        let (mut catalog, th) = catalog();
        let a = catalog
            .set_strategy(th, vec![StrategyStep::invest(CDAI, CDAI)])
            .unwrap();
        let b = catalog
            .set_strategy(th, vec![StrategyStep::borrow(AAVE, USDC)])
            .unwrap();

        let first: Vec<B256> = catalog.get_strategies_for(&th).collect();
        let second: Vec<B256> = catalog.get_strategies_for(&th).collect();
        assert_eq!(first, vec![a, b]);
        assert_eq!(first, second);

        assert_eq!(catalog.get_strategies_for(&B256::ZERO).count(), 0);
    }

    #[test]
    fn test_unknown_strategy_is_not_found() {
        let (catalog, _) = catalog();
        assert!(matches!(
            catalog.get_strategy(&B256::repeat_byte(7)),
            Err(RouterError::NotFound(_))
        ));
    }
}
