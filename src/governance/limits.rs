//! Deposit Limit Governor
//!
//! Resolves the deposit ceiling for a pool from governance-set state:
//!
//! - **Percentage** mode: `pool_value * min(protocol_pct, pool_pct) / 10_000`.
//!   An unset (zero) percentage defers to the other one; both zero blocks
//!   deposits entirely.
//! - **Number** mode: the pool's absolute amount.
//!
//! Pool values are read fresh on every call. Headroom is the ceiling minus
//! what the holder already keeps in the pool.
//!
//! Setters return the change they made (or `None` for a no-op write) so the
//! governance store can audit only effective mutations.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use crate::adapters::valuation::apply_bps;
use crate::adapters::{ProtocolFamily, VenueAdapter};
use crate::error::{Result, RouterError};
use crate::ledger::LedgerView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LimitMode {
    Number,
    #[default]
    Percentage,
}

/// What happens when a deposit exceeds the remaining headroom
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LimitBreachPolicy {
    /// Clip the deposit to the headroom and proceed
    #[default]
    Cap,
    /// Fail with `LimitExceeded`
    Reject,
}

impl fmt::Display for LimitBreachPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitBreachPolicy::Cap => f.pad("CAP"),
            LimitBreachPolicy::Reject => f.pad("REJECT"),
        }
    }
}

/// Which piece of limit state a setter touched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitKey {
    PoolPct(Address),
    ProtocolPct(ProtocolFamily),
    AbsoluteAmount(Address),
    PoolMode(Address),
    FamilyMode(ProtocolFamily),
    BreachPolicy,
}

impl fmt::Display for LimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitKey::PoolPct(pool) => write!(f, "pool_pct[{pool}]"),
            LimitKey::ProtocolPct(family) => write!(f, "protocol_pct[{family}]"),
            LimitKey::AbsoluteAmount(pool) => write!(f, "absolute_amount[{pool}]"),
            LimitKey::PoolMode(pool) => write!(f, "mode[{pool}]"),
            LimitKey::FamilyMode(family) => write!(f, "mode[{family}]"),
            LimitKey::BreachPolicy => write!(f, "breach_policy"),
        }
    }
}

/// An effective change to limit state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitChange {
    pub key: LimitKey,
    pub old: String,
    pub new: String,
}

#[derive(Debug, Clone, Default)]
struct PoolLimit {
    mode: Option<LimitMode>,
    pool_pct_bps: u64,
    absolute_amount: U256,
}

#[derive(Debug, Clone, Default)]
pub struct DepositLimitGovernor {
    pools: HashMap<Address, PoolLimit>,
    protocol_pct_bps: HashMap<ProtocolFamily, u64>,
    family_mode: HashMap<ProtocolFamily, LimitMode>,
    policy: LimitBreachPolicy,
}

fn change<T: fmt::Display + PartialEq>(key: LimitKey, old: T, new: T) -> Option<LimitChange> {
    (old != new).then(|| LimitChange {
        key,
        old: old.to_string(),
        new: new.to_string(),
    })
}

fn mode_label(mode: Option<LimitMode>) -> String {
    match mode {
        Some(m) => format!("{m:?}"),
        None => "inherit".to_string(),
    }
}

impl DepositLimitGovernor {
    pub fn new(policy: LimitBreachPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    // ---------- Setters ----------

    pub fn set_pool_pct(&mut self, pool: Address, bps: u64) -> Option<LimitChange> {
        let entry = self.pools.entry(pool).or_default();
        let old = entry.pool_pct_bps;
        entry.pool_pct_bps = bps;
        change(LimitKey::PoolPct(pool), old, bps)
    }

    pub fn set_protocol_pct(&mut self, family: ProtocolFamily, bps: u64) -> Option<LimitChange> {
        let old = self.protocol_pct_bps.insert(family, bps).unwrap_or(0);
        change(LimitKey::ProtocolPct(family), old, bps)
    }

    pub fn set_absolute_amount(&mut self, pool: Address, amount: U256) -> Option<LimitChange> {
        let entry = self.pools.entry(pool).or_default();
        let old = entry.absolute_amount;
        entry.absolute_amount = amount;
        change(LimitKey::AbsoluteAmount(pool), old, amount)
    }

    pub fn set_pool_mode(&mut self, pool: Address, mode: LimitMode) -> Option<LimitChange> {
        let entry = self.pools.entry(pool).or_default();
        let old = entry.mode;
        entry.mode = Some(mode);
        (old != Some(mode)).then(|| LimitChange {
            key: LimitKey::PoolMode(pool),
            old: mode_label(old),
            new: mode_label(Some(mode)),
        })
    }

    pub fn set_family_mode(&mut self, family: ProtocolFamily, mode: LimitMode) -> Option<LimitChange> {
        let old = self.family_mode.insert(family, mode);
        (old != Some(mode)).then(|| LimitChange {
            key: LimitKey::FamilyMode(family),
            old: mode_label(old),
            new: mode_label(Some(mode)),
        })
    }

    pub fn set_breach_policy(&mut self, policy: LimitBreachPolicy) -> Option<LimitChange> {
        let old = std::mem::replace(&mut self.policy, policy);
        change(LimitKey::BreachPolicy, old, policy)
    }

    // ---------- Resolution ----------

    pub fn policy(&self) -> LimitBreachPolicy {
        self.policy
    }

    /// Pool override, else family default, else Percentage
    pub fn mode(&self, pool: &Address, family: ProtocolFamily) -> LimitMode {
        self.pools
            .get(pool)
            .and_then(|p| p.mode)
            .or_else(|| self.family_mode.get(&family).copied())
            .unwrap_or_default()
    }

    /// Percentage applied under Percentage mode, basis points
    pub fn effective_pct(&self, pool: &Address, family: ProtocolFamily) -> u64 {
        let pool_pct = self.pools.get(pool).map(|p| p.pool_pct_bps).unwrap_or(0);
        let protocol_pct = self.protocol_pct_bps.get(&family).copied().unwrap_or(0);
        match (pool_pct, protocol_pct) {
            (0, p) | (p, 0) => p,
            (a, b) => a.min(b),
        }
    }

    /// Current deposit ceiling for the adapter's pool
    pub fn effective_limit<A: VenueAdapter + ?Sized>(
        &self,
        view: &dyn LedgerView,
        adapter: &A,
    ) -> Result<U256> {
        let pool = adapter.pool();
        let family = adapter.family();
        match self.mode(&pool, family) {
            LimitMode::Number => Ok(self
                .pools
                .get(&pool)
                .map(|p| p.absolute_amount)
                .unwrap_or_default()),
            LimitMode::Percentage => {
                let pct = self.effective_pct(&pool, family);
                if pct == 0 {
                    return Ok(U256::ZERO);
                }
                Ok(apply_bps(adapter.pool_value(view)?, pct))
            }
        }
    }

    /// Ceiling minus what `holder` already keeps in the pool
    pub fn headroom<A: VenueAdapter + ?Sized>(
        &self,
        view: &dyn LedgerView,
        adapter: &A,
        holder: Address,
    ) -> Result<U256> {
        let limit = self.effective_limit(view, adapter)?;
        if limit.is_zero() {
            return Ok(U256::ZERO);
        }
        let held = adapter.holding_value(view, holder)?;
        Ok(limit.saturating_sub(held))
    }

    /// Apply the breach policy to a requested deposit
    pub fn clip<A: VenueAdapter + ?Sized>(
        &self,
        view: &dyn LedgerView,
        adapter: &A,
        holder: Address,
        requested: U256,
    ) -> Result<U256> {
        let headroom = self.headroom(view, adapter, holder)?;
        if requested <= headroom {
            return Ok(requested);
        }
        match self.policy {
            LimitBreachPolicy::Cap => {
                debug!(
                    "Deposit into {} capped: requested {}, headroom {}",
                    adapter.pool(),
                    requested,
                    headroom
                );
                Ok(headroom)
            }
            LimitBreachPolicy::Reject => Err(RouterError::LimitExceeded {
                pool: adapter.pool(),
                requested: requested.to_string(),
                headroom: headroom.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{Sandbox, DAI};

    #[test]
    fn test_no_op_writes_are_suppressed() {
        let mut governor = DepositLimitGovernor::default();
        let pool = Address::repeat_byte(1);

        assert!(governor.set_pool_pct(pool, 0).is_none());
        let change = governor.set_pool_pct(pool, 250).unwrap();
        assert_eq!(change.old, "0");
        assert_eq!(change.new, "250");
        assert!(governor.set_pool_pct(pool, 250).is_none());

        assert!(governor.set_breach_policy(LimitBreachPolicy::Cap).is_none());
        assert!(governor.set_breach_policy(LimitBreachPolicy::Reject).is_some());

        assert!(governor.set_pool_mode(pool, LimitMode::Percentage).is_some());
        assert!(governor.set_pool_mode(pool, LimitMode::Percentage).is_none());
    }

    #[test]
    fn test_effective_pct_takes_min_of_set_values() {
        let mut governor = DepositLimitGovernor::default();
        let pool = Address::repeat_byte(1);
        let family = ProtocolFamily::Compound;

        assert_eq!(governor.effective_pct(&pool, family), 0);
        governor.set_protocol_pct(family, 500);
        assert_eq!(governor.effective_pct(&pool, family), 500);
        governor.set_pool_pct(pool, 300);
        assert_eq!(governor.effective_pct(&pool, family), 300);
        governor.set_pool_pct(pool, 900);
        assert_eq!(governor.effective_pct(&pool, family), 500);
    }

    #[test]
    fn test_mode_resolution_order() {
        let mut governor = DepositLimitGovernor::default();
        let pool = Address::repeat_byte(1);
        let family = ProtocolFamily::Curve;

        assert_eq!(governor.mode(&pool, family), LimitMode::Percentage);
        governor.set_family_mode(family, LimitMode::Number);
        assert_eq!(governor.mode(&pool, family), LimitMode::Number);
        governor.set_pool_mode(pool, LimitMode::Percentage);
        assert_eq!(governor.mode(&pool, family), LimitMode::Percentage);
    }

    #[test]
    fn test_percentage_limit_reads_fresh_pool_value() {
        let mut sandbox = Sandbox::new().unwrap();
        let mut governor = DepositLimitGovernor::default();
        governor.set_protocol_pct(ProtocolFamily::Compound, 500);

        let adapter = sandbox.adapters.get(&sandbox.cdai).unwrap();
        let before = governor.effective_limit(&sandbox.ledger, adapter).unwrap();
        let cash = adapter.pool_value(&sandbox.ledger).unwrap();
        assert_eq!(before, apply_bps(cash, 500));

        // More cash in the market raises the ceiling
        sandbox.fund(DAI, sandbox.cdai, 1_000).unwrap();
        let adapter = sandbox.adapters.get(&sandbox.cdai).unwrap();
        let after = governor.effective_limit(&sandbox.ledger, adapter).unwrap();
        assert_eq!(after, before + Sandbox::units(50));
    }

    #[test]
    fn test_breach_policy_cap_vs_reject() {
        let sandbox = Sandbox::new().unwrap();
        let adapter = sandbox.adapters.get(&sandbox.cdai).unwrap();
        let holder = Address::repeat_byte(0x61);
        let mut governor = DepositLimitGovernor::default();
        governor.set_pool_mode(adapter.pool(), LimitMode::Number);
        governor.set_absolute_amount(adapter.pool(), Sandbox::units(100));

        let capped = governor
            .clip(&sandbox.ledger, adapter, holder, Sandbox::units(250))
            .unwrap();
        assert_eq!(capped, Sandbox::units(100));

        governor.set_breach_policy(LimitBreachPolicy::Reject);
        let err = governor
            .clip(&sandbox.ledger, adapter, holder, Sandbox::units(250))
            .unwrap_err();
        assert!(matches!(err, RouterError::LimitExceeded { .. }));

        // Within headroom both policies pass the request through
        assert_eq!(
            governor
                .clip(&sandbox.ledger, adapter, holder, Sandbox::units(40))
                .unwrap(),
            Sandbox::units(40)
        );
    }
}
