//! Strategy Selection
//!
//! Selection is a governance-set lookup from `(risk profile, token set)` to a
//! strategy hash: one "best" and one "default" entry per key. The rebalance
//! engine asks for the best strategy and falls back to the default.

use alloy_primitives::B256;
use std::collections::HashMap;

use crate::governance::RiskProfile;

pub trait StrategySelector {
    fn best_strategy_for(&self, profile: &RiskProfile, tokens_hash: B256) -> Option<B256>;

    fn best_default_strategy_for(&self, profile: &RiskProfile, tokens_hash: B256) -> Option<B256>;

    /// Best, else default
    fn select(&self, profile: &RiskProfile, tokens_hash: B256) -> Option<B256> {
        self.best_strategy_for(profile, tokens_hash)
            .or_else(|| self.best_default_strategy_for(profile, tokens_hash))
    }
}

/// Plain lookup table. Writes go through `GovernanceStore`, which checks
/// roles and eligibility first.
#[derive(Debug, Clone, Default)]
pub struct StrategyBook {
    best: HashMap<(u32, B256), B256>,
    default: HashMap<(u32, B256), B256>,
}

impl StrategyBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the previous entry
    pub fn set_best(&mut self, profile: u32, tokens_hash: B256, strategy: B256) -> Option<B256> {
        self.best.insert((profile, tokens_hash), strategy)
    }

    pub fn set_default(&mut self, profile: u32, tokens_hash: B256, strategy: B256) -> Option<B256> {
        self.default.insert((profile, tokens_hash), strategy)
    }

    pub fn clear_best(&mut self, profile: u32, tokens_hash: B256) -> Option<B256> {
        self.best.remove(&(profile, tokens_hash))
    }
}

impl StrategySelector for StrategyBook {
    fn best_strategy_for(&self, profile: &RiskProfile, tokens_hash: B256) -> Option<B256> {
        self.best.get(&(profile.code, tokens_hash)).copied()
    }

    fn best_default_strategy_for(&self, profile: &RiskProfile, tokens_hash: B256) -> Option<B256> {
        self.default.get(&(profile.code, tokens_hash)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_falls_back_to_default() {
        let profile = RiskProfile::new(1, "low", false, (0, 10));
        let tokens = B256::repeat_byte(1);
        let mut book = StrategyBook::new();
        assert_eq!(book.select(&profile, tokens), None);

        book.set_default(1, tokens, B256::repeat_byte(0xd));
        assert_eq!(book.select(&profile, tokens), Some(B256::repeat_byte(0xd)));

        book.set_best(1, tokens, B256::repeat_byte(0xb));
        assert_eq!(book.select(&profile, tokens), Some(B256::repeat_byte(0xb)));

        // Other profiles see nothing
        let other = RiskProfile::new(2, "high", true, (0, 10));
        assert_eq!(book.select(&other, tokens), None);
    }
}
