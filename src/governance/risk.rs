//! Risk profiles and the pool registry they are checked against

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::adapters::ProtocolFamily;
use crate::catalog::Strategy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskProfile {
    pub code: u32,
    pub name: String,
    pub can_borrow: bool,
    /// Inclusive (lower, upper) pool rating bounds
    pub pool_rating_range: (u8, u8),
}

impl RiskProfile {
    pub fn new(code: u32, name: &str, can_borrow: bool, pool_rating_range: (u8, u8)) -> Self {
        Self {
            code,
            name: name.to_string(),
            can_borrow,
            pool_rating_range,
        }
    }

    pub fn admits(&self, rating: u8) -> bool {
        let (lower, upper) = self.pool_rating_range;
        (lower..=upper).contains(&rating)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolInfo {
    pub family: ProtocolFamily,
    pub rating: u8,
    pub active: bool,
}

/// Why a strategy is not eligible for a profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ineligible {
    UnregisteredPool(Address),
    InactivePool(Address),
    RatingOutOfRange { pool: Address, rating: u8 },
    BorrowNotAllowed,
}

impl Ineligible {
    pub fn reason(&self) -> &'static str {
        match self {
            Ineligible::UnregisteredPool(_) => "strategy uses an unregistered pool",
            Ineligible::InactivePool(_) => "strategy uses an inactive pool",
            Ineligible::RatingOutOfRange { .. } => "pool rating outside risk profile range",
            Ineligible::BorrowNotAllowed => "risk profile does not allow borrowing",
        }
    }
}

/// Check every step of `strategy` against `profile`
pub fn check_eligible(
    profile: &RiskProfile,
    strategy: &Strategy,
    pool_info: impl Fn(&Address) -> Option<PoolInfo>,
) -> Result<(), Ineligible> {
    if strategy.has_borrow() && !profile.can_borrow {
        return Err(Ineligible::BorrowNotAllowed);
    }
    for pool in strategy.pools() {
        let info = pool_info(&pool).ok_or(Ineligible::UnregisteredPool(pool))?;
        if !info.active {
            return Err(Ineligible::InactivePool(pool));
        }
        if !profile.admits(info.rating) {
            return Err(Ineligible::RatingOutOfRange {
                pool,
                rating: info.rating,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StrategyStep;
    use alloy_primitives::B256;

    #[test]
    fn test_eligibility_checks() {
        let pool = Address::repeat_byte(1);
        let conservative = RiskProfile::new(1, "conservative", false, (7, 10));
        let strategy = Strategy {
            tokens_hash: B256::ZERO,
            steps: vec![StrategyStep::invest(pool, pool)],
        };
        let info = |rating, active| {
            move |_: &Address| {
                Some(PoolInfo {
                    family: ProtocolFamily::Compound,
                    rating,
                    active,
                })
            }
        };

        assert!(check_eligible(&conservative, &strategy, info(8, true)).is_ok());
        assert_eq!(
            check_eligible(&conservative, &strategy, info(5, true)),
            Err(Ineligible::RatingOutOfRange { pool, rating: 5 })
        );
        assert_eq!(
            check_eligible(&conservative, &strategy, info(8, false)),
            Err(Ineligible::InactivePool(pool))
        );
        assert_eq!(
            check_eligible(&conservative, &strategy, |_: &Address| None),
            Err(Ineligible::UnregisteredPool(pool))
        );

        let levered = Strategy {
            tokens_hash: B256::ZERO,
            steps: vec![StrategyStep::borrow(pool, Address::repeat_byte(2))],
        };
        assert_eq!(
            check_eligible(&conservative, &levered, info(8, true)),
            Err(Ineligible::BorrowNotAllowed)
        );
    }
}
