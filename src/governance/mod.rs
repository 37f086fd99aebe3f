//! Governance Store
//!
//! Owns every piece of shared, governed state: the role table, the strategy
//! catalog, deposit limits, risk profiles, the pool registry and the strategy
//! selection book. It is passed by reference into the engine; every mutator
//! takes the caller and checks its role before touching anything.
//!
//! Roles:
//! - `Governance`: roles, risk profiles, breach policy, vault lifecycle
//! - `Operator`: token sets, strategies, pool registry, selection, rebalance
//! - `FinanceOperator`: deposit limits

mod limits;
mod risk;

pub use limits::{DepositLimitGovernor, LimitBreachPolicy, LimitChange, LimitKey, LimitMode};
pub use risk::{check_eligible, Ineligible, PoolInfo, RiskProfile};

use alloy_primitives::{Address, B256, U256};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{info, warn};

use crate::adapters::ProtocolFamily;
use crate::catalog::{StrategyCatalog, StrategyStep};
use crate::error::{Result, RouterError};
use crate::selection::{StrategyBook, StrategySelector};

// ============================================
// ROLES & EVENTS
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Governance,
    Operator,
    FinanceOperator,
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Role::Governance => "governance",
            Role::Operator => "operator",
            Role::FinanceOperator => "finance-operator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Audit trail entry for an effective governance mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GovernanceEvent {
    RoleGranted { role: Role, account: Address, caller: Address },
    RoleRevoked { role: Role, account: Address, caller: Address },
    LimitChanged { change: LimitChange, caller: Address },
    StrategyRegistered { strategy: B256, tokens_hash: B256, caller: Address },
    RiskProfileSet { code: u32, caller: Address },
    PoolRegistered { pool: Address, info: PoolInfo, caller: Address },
    PoolStatusChanged { pool: Address, active: bool, caller: Address },
    SelectionChanged {
        profile: u32,
        tokens_hash: B256,
        strategy: B256,
        is_default: bool,
        caller: Address,
    },
    SelectionCleared {
        profile: u32,
        tokens_hash: B256,
        strategy: B256,
        caller: Address,
    },
}

// ============================================
// STORE
// ============================================

#[derive(Debug, Clone)]
pub struct GovernanceStore {
    roles: HashMap<Role, HashSet<Address>>,
    catalog: StrategyCatalog,
    limits: DepositLimitGovernor,
    risk_profiles: HashMap<u32, RiskProfile>,
    pools: HashMap<Address, PoolInfo>,
    book: StrategyBook,
    events: Vec<GovernanceEvent>,
}

impl GovernanceStore {
    /// Fresh store with `governance` holding the governance role
    pub fn new(governance: Address) -> Self {
        let mut roles: HashMap<Role, HashSet<Address>> = HashMap::new();
        roles.entry(Role::Governance).or_default().insert(governance);
        Self {
            roles,
            catalog: StrategyCatalog::new(),
            limits: DepositLimitGovernor::default(),
            risk_profiles: HashMap::new(),
            pools: HashMap::new(),
            book: StrategyBook::new(),
            events: Vec::new(),
        }
    }

    // ---------- Roles ----------

    pub fn has_role(&self, account: &Address, role: Role) -> bool {
        self.roles
            .get(&role)
            .map(|holders| holders.contains(account))
            .unwrap_or(false)
    }

    pub fn require_role(&self, caller: Address, role: Role) -> Result<()> {
        if self.has_role(&caller, role) {
            Ok(())
        } else {
            warn!("⛔ {} rejected: missing role {}", caller, role);
            Err(RouterError::Unauthorized {
                caller,
                role: role.name(),
            })
        }
    }

    pub fn grant_role(&mut self, caller: Address, role: Role, account: Address) -> Result<()> {
        self.require_role(caller, Role::Governance)?;
        if self.roles.entry(role).or_default().insert(account) {
            info!("🔑 Granted {} to {}", role, account);
            self.events.push(GovernanceEvent::RoleGranted {
                role,
                account,
                caller,
            });
        }
        Ok(())
    }

    pub fn revoke_role(&mut self, caller: Address, role: Role, account: Address) -> Result<()> {
        self.require_role(caller, Role::Governance)?;
        let removed = self
            .roles
            .get_mut(&role)
            .map(|holders| holders.remove(&account))
            .unwrap_or(false);
        if removed {
            info!("🔑 Revoked {} from {}", role, account);
            self.events.push(GovernanceEvent::RoleRevoked {
                role,
                account,
                caller,
            });
        }
        Ok(())
    }

    // ---------- Read access ----------

    pub fn catalog(&self) -> &StrategyCatalog {
        &self.catalog
    }

    pub fn limits(&self) -> &DepositLimitGovernor {
        &self.limits
    }

    pub fn book(&self) -> &StrategyBook {
        &self.book
    }

    pub fn risk_profile(&self, code: u32) -> Result<&RiskProfile> {
        self.risk_profiles
            .get(&code)
            .ok_or_else(|| RouterError::NotFound(format!("risk profile {code}")))
    }

    pub fn pool_info(&self, pool: &Address) -> Option<PoolInfo> {
        self.pools.get(pool).copied()
    }

    pub fn events(&self) -> &[GovernanceEvent] {
        &self.events
    }

    // ---------- Catalog (operator) ----------

    pub fn register_tokens(&mut self, caller: Address, tokens: &[Address]) -> Result<B256> {
        self.require_role(caller, Role::Operator)?;
        Ok(self.catalog.register_tokens(tokens))
    }

    pub fn set_strategy(
        &mut self,
        caller: Address,
        tokens_hash: B256,
        steps: Vec<StrategyStep>,
    ) -> Result<B256> {
        self.require_role(caller, Role::Operator)?;
        let known = self.catalog.len();
        let strategy = self.catalog.set_strategy(tokens_hash, steps)?;
        if self.catalog.len() > known {
            self.events.push(GovernanceEvent::StrategyRegistered {
                strategy,
                tokens_hash,
                caller,
            });
        }
        Ok(strategy)
    }

    // ---------- Pools & risk ----------

    pub fn register_pool(
        &mut self,
        caller: Address,
        pool: Address,
        family: ProtocolFamily,
        rating: u8,
    ) -> Result<()> {
        self.require_role(caller, Role::Operator)?;
        let info = PoolInfo {
            family,
            rating,
            active: true,
        };
        if self.pools.insert(pool, info) != Some(info) {
            info!("🏊 Registered {} pool {} (rating {})", family, pool, rating);
            self.events.push(GovernanceEvent::PoolRegistered { pool, info, caller });
        }
        Ok(())
    }

    pub fn set_pool_active(&mut self, caller: Address, pool: Address, active: bool) -> Result<()> {
        self.require_role(caller, Role::Operator)?;
        let info = self
            .pools
            .get_mut(&pool)
            .ok_or_else(|| RouterError::unknown_pool(pool))?;
        if info.active != active {
            info.active = active;
            info!("🏊 Pool {} active = {}", pool, active);
            self.events.push(GovernanceEvent::PoolStatusChanged {
                pool,
                active,
                caller,
            });
        }
        Ok(())
    }

    pub fn set_risk_profile(&mut self, caller: Address, profile: RiskProfile) -> Result<()> {
        self.require_role(caller, Role::Governance)?;
        let code = profile.code;
        if self.risk_profiles.get(&code) != Some(&profile) {
            info!("🛡️  Risk profile {} ({}) set", code, profile.name);
            self.risk_profiles.insert(code, profile);
            self.events.push(GovernanceEvent::RiskProfileSet { code, caller });
        }
        Ok(())
    }

    /// Whether `strategy` may be selected under `profile` right now
    pub fn check_strategy(&self, profile: &RiskProfile, strategy: B256) -> Result<()> {
        let resolved = self.catalog.get_strategy(&strategy)?;
        check_eligible(profile, resolved, |pool| self.pool_info(pool)).map_err(|why| {
            RouterError::Ineligible {
                strategy,
                reason: why.reason(),
            }
        })
    }

    // ---------- Selection (operator) ----------

    pub fn set_best_strategy(
        &mut self,
        caller: Address,
        profile: u32,
        strategy: B256,
    ) -> Result<()> {
        self.set_selection(caller, profile, strategy, false)
    }

    pub fn set_default_strategy(
        &mut self,
        caller: Address,
        profile: u32,
        strategy: B256,
    ) -> Result<()> {
        self.set_selection(caller, profile, strategy, true)
    }

    /// Drop the best entry so selection falls back to the default
    pub fn clear_best_strategy(
        &mut self,
        caller: Address,
        profile: u32,
        tokens_hash: B256,
    ) -> Result<()> {
        self.require_role(caller, Role::Operator)?;
        self.risk_profile(profile)?;
        if let Some(strategy) = self.book.clear_best(profile, tokens_hash) {
            info!(
                "🎯 Best strategy for profile {} / {} cleared (was {})",
                profile, tokens_hash, strategy
            );
            self.events.push(GovernanceEvent::SelectionCleared {
                profile,
                tokens_hash,
                strategy,
                caller,
            });
        }
        Ok(())
    }

    fn set_selection(
        &mut self,
        caller: Address,
        profile: u32,
        strategy: B256,
        is_default: bool,
    ) -> Result<()> {
        self.require_role(caller, Role::Operator)?;
        let risk = self.risk_profile(profile)?.clone();
        self.check_strategy(&risk, strategy)?;
        let tokens_hash = self.catalog.get_strategy(&strategy)?.tokens_hash;

        let previous = if is_default {
            self.book.set_default(profile, tokens_hash, strategy)
        } else {
            self.book.set_best(profile, tokens_hash, strategy)
        };
        if previous != Some(strategy) {
            info!(
                "🎯 {} strategy for profile {} / {} -> {}",
                if is_default { "Default" } else { "Best" },
                risk.name,
                tokens_hash,
                strategy
            );
            self.events.push(GovernanceEvent::SelectionChanged {
                profile,
                tokens_hash,
                strategy,
                is_default,
                caller,
            });
        }
        Ok(())
    }

    // ---------- Deposit limits (finance operator) ----------

    fn record_limit(&mut self, caller: Address, change: Option<LimitChange>) {
        if let Some(change) = change {
            info!("📏 {}: {} -> {} (by {})", change.key, change.old, change.new, caller);
            self.events.push(GovernanceEvent::LimitChanged { change, caller });
        }
    }

    pub fn set_pool_pct(&mut self, caller: Address, pool: Address, bps: u64) -> Result<()> {
        self.require_role(caller, Role::FinanceOperator)?;
        let change = self.limits.set_pool_pct(pool, bps);
        self.record_limit(caller, change);
        Ok(())
    }

    pub fn set_protocol_pct(
        &mut self,
        caller: Address,
        family: ProtocolFamily,
        bps: u64,
    ) -> Result<()> {
        self.require_role(caller, Role::FinanceOperator)?;
        let change = self.limits.set_protocol_pct(family, bps);
        self.record_limit(caller, change);
        Ok(())
    }

    pub fn set_absolute_amount(&mut self, caller: Address, pool: Address, amount: U256) -> Result<()> {
        self.require_role(caller, Role::FinanceOperator)?;
        let change = self.limits.set_absolute_amount(pool, amount);
        self.record_limit(caller, change);
        Ok(())
    }

    pub fn set_pool_mode(&mut self, caller: Address, pool: Address, mode: LimitMode) -> Result<()> {
        self.require_role(caller, Role::FinanceOperator)?;
        let change = self.limits.set_pool_mode(pool, mode);
        self.record_limit(caller, change);
        Ok(())
    }

    pub fn set_family_mode(
        &mut self,
        caller: Address,
        family: ProtocolFamily,
        mode: LimitMode,
    ) -> Result<()> {
        self.require_role(caller, Role::FinanceOperator)?;
        let change = self.limits.set_family_mode(family, mode);
        self.record_limit(caller, change);
        Ok(())
    }

    pub fn set_breach_policy(&mut self, caller: Address, policy: LimitBreachPolicy) -> Result<()> {
        self.require_role(caller, Role::Governance)?;
        let change = self.limits.set_breach_policy(policy);
        self.record_limit(caller, change);
        Ok(())
    }
}

/// Selection that re-checks eligibility at lookup time, so deactivating a
/// pool immediately steers the engine to the default strategy
impl StrategySelector for GovernanceStore {
    fn best_strategy_for(&self, profile: &RiskProfile, tokens_hash: B256) -> Option<B256> {
        self.book
            .best_strategy_for(profile, tokens_hash)
            .filter(|s| self.check_strategy(profile, *s).is_ok())
    }

    fn best_default_strategy_for(&self, profile: &RiskProfile, tokens_hash: B256) -> Option<B256> {
        self.book
            .best_default_strategy_for(profile, tokens_hash)
            .filter(|s| self.check_strategy(profile, *s).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOV: Address = Address::repeat_byte(0x60);
    const OPS: Address = Address::repeat_byte(0x61);
    const FIN: Address = Address::repeat_byte(0x62);
    const EVE: Address = Address::repeat_byte(0x66);
    const DAI: Address = Address::repeat_byte(0xda);
    const CDAI: Address = Address::repeat_byte(0xcd);
    const VAULT: Address = Address::repeat_byte(0x46);

    fn store() -> GovernanceStore {
        let mut store = GovernanceStore::new(GOV);
        store.grant_role(GOV, Role::Operator, OPS).unwrap();
        store.grant_role(GOV, Role::FinanceOperator, FIN).unwrap();
        store
    }

    #[test]
    fn test_setters_require_roles() {
        let mut store = store();
        assert_eq!(
            store.set_pool_pct(EVE, CDAI, 100).unwrap_err(),
            RouterError::Unauthorized {
                caller: EVE,
                role: "finance-operator"
            }
        );
        assert!(store.set_pool_pct(OPS, CDAI, 100).is_err());
        assert!(store.register_tokens(FIN, &[DAI]).is_err());
        assert!(store.grant_role(OPS, Role::Operator, EVE).is_err());
        assert!(store.set_breach_policy(FIN, LimitBreachPolicy::Reject).is_err());
    }

    #[test]
    fn test_limit_audit_only_on_change() {
        let mut store = store();
        let before = store.events().len();

        store.set_pool_pct(FIN, CDAI, 100).unwrap();
        store.set_pool_pct(FIN, CDAI, 100).unwrap();
        store
            .set_protocol_pct(FIN, ProtocolFamily::Compound, 500)
            .unwrap();

        let limit_events: Vec<_> = store.events()[before..]
            .iter()
            .filter_map(|e| match e {
                GovernanceEvent::LimitChanged { change, caller } => Some((change.clone(), *caller)),
                _ => None,
            })
            .collect();
        assert_eq!(limit_events.len(), 2);
        assert_eq!(limit_events[0].0.key, LimitKey::PoolPct(CDAI));
        assert_eq!(limit_events[0].0.new, "100");
        assert_eq!(limit_events[0].1, FIN);
    }

    #[test]
    fn test_selection_checks_eligibility_and_reacts_to_pool_status() {
        let mut store = store();
        let th = store.register_tokens(OPS, &[DAI]).unwrap();
        let compound = store
            .set_strategy(OPS, th, vec![StrategyStep::invest(CDAI, CDAI)])
            .unwrap();
        let vault = store
            .set_strategy(OPS, th, vec![StrategyStep::invest(VAULT, VAULT)])
            .unwrap();
        store
            .set_risk_profile(GOV, RiskProfile::new(1, "safe", false, (5, 10)))
            .unwrap();

        // Unregistered pool
        assert!(matches!(
            store.set_best_strategy(OPS, 1, compound),
            Err(RouterError::Ineligible { .. })
        ));

        store
            .register_pool(OPS, CDAI, ProtocolFamily::Compound, 8)
            .unwrap();
        store
            .register_pool(OPS, VAULT, ProtocolFamily::Erc4626, 6)
            .unwrap();
        store.set_best_strategy(OPS, 1, compound).unwrap();
        store.set_default_strategy(OPS, 1, vault).unwrap();

        let profile = store.risk_profile(1).unwrap().clone();
        assert_eq!(store.select(&profile, th), Some(compound));

        store.set_pool_active(OPS, CDAI, false).unwrap();
        assert_eq!(store.select(&profile, th), Some(vault));
        // The raw book still holds the entry
        assert_eq!(store.book().best_strategy_for(&profile, th), Some(compound));
    }

    #[test]
    fn test_clearing_best_falls_back_to_default() {
        let mut store = store();
        let th = store.register_tokens(OPS, &[DAI]).unwrap();
        let compound = store
            .set_strategy(OPS, th, vec![StrategyStep::invest(CDAI, CDAI)])
            .unwrap();
        let vault = store
            .set_strategy(OPS, th, vec![StrategyStep::invest(VAULT, VAULT)])
            .unwrap();
        store
            .set_risk_profile(GOV, RiskProfile::new(1, "safe", false, (0, 10)))
            .unwrap();
        store
            .register_pool(OPS, CDAI, ProtocolFamily::Compound, 3)
            .unwrap();
        store
            .register_pool(OPS, VAULT, ProtocolFamily::Erc4626, 3)
            .unwrap();
        store.set_best_strategy(OPS, 1, compound).unwrap();
        store.set_default_strategy(OPS, 1, vault).unwrap();

        assert!(matches!(
            store.clear_best_strategy(EVE, 1, th),
            Err(RouterError::Unauthorized { .. })
        ));
        assert!(store.clear_best_strategy(OPS, 9, th).is_err());

        let before = store.events().len();
        store.clear_best_strategy(OPS, 1, th).unwrap();
        store.clear_best_strategy(OPS, 1, th).unwrap();
        assert_eq!(store.events().len(), before + 1);
        assert_eq!(
            store.events()[before],
            GovernanceEvent::SelectionCleared {
                profile: 1,
                tokens_hash: th,
                strategy: compound,
                caller: OPS,
            }
        );

        let profile = store.risk_profile(1).unwrap().clone();
        assert_eq!(store.book().best_strategy_for(&profile, th), None);
        assert_eq!(store.select(&profile, th), Some(vault));
    }
}
