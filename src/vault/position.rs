use alloy_primitives::{B256, U256};
use serde::{Deserialize, Serialize};

use crate::adapters::valuation::WAD;

/// What the vault currently holds and owes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultPosition {
    /// `None` while funds sit idle
    pub current_strategy_hash: Option<B256>,
    pub shares_outstanding: U256,
    /// Observation from the last committed rebalance, zero before the first
    pub last_value_per_share: U256,
    /// Gas reimbursement accrued for batch execution, in wei
    pub gas_owed_to_operator: U256,
}

impl VaultPosition {
    pub fn is_invested(&self) -> bool {
        self.current_strategy_hash.is_some()
    }
}

/// Value per share scaled by 1e18. 1:1 while no shares exist.
pub fn value_per_share(value: U256, shares: U256) -> U256 {
    if shares.is_zero() {
        WAD
    } else {
        value * WAD / shares
    }
}

/// Relative move between two observations in basis points, either direction
pub fn jump_bps(previous: U256, current: U256) -> u64 {
    if previous.is_zero() {
        return 0;
    }
    let diff = if current > previous {
        current - previous
    } else {
        previous - current
    };
    u64::try_from(diff * U256::from(10_000u64) / previous).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_per_share_defaults_to_one() {
        assert_eq!(value_per_share(U256::from(123u64), U256::ZERO), WAD);
        assert_eq!(
            value_per_share(U256::from(150u64), U256::from(100u64)),
            WAD * U256::from(3u64) / U256::from(2u64)
        );
    }

    #[test]
    fn test_jump_bps_is_symmetric_in_direction() {
        let base = WAD;
        let up = WAD + WAD / U256::from(50u64);
        let down = WAD - WAD / U256::from(50u64);
        assert_eq!(jump_bps(base, up), 200);
        assert_eq!(jump_bps(base, down), 200);
        assert_eq!(jump_bps(base, base), 0);
        assert_eq!(jump_bps(U256::ZERO, up), 0);
    }
}
