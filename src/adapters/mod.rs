//! Venue Adapters
//!
//! One adapter per venue family translates intent (deposit, withdraw, stake,
//! harvest, borrow) into ordered [`Instruction`] lists and exposes the
//! family's valuation formulas. Adapters hold only addresses; every balance
//! they need is read from the [`LedgerView`] at generation time.
//!
//! Supported families:
//! - Compound cToken markets (`mint` / `redeem`)
//! - Aave V2 lending pools (`deposit` / `withdraw`, plus borrow steps)
//! - Curve StableSwap pools with optional gauge staking and harvest
//! - ERC-4626 tokenized vaults

mod aave;
mod compound;
mod curve;
mod erc4626;
mod harvest;
pub mod valuation;

pub use aave::AaveV2Adapter;
pub use compound::CompoundAdapter;
pub use curve::{CurveAdapter, CurvePoolSpec, GaugeSpec};
pub use erc4626::Erc4626Adapter;
pub use harvest::{HarvestHelper, RouterHarvester};

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use crate::abi::IERC20;
use crate::error::{Result, RouterError};
use crate::governance::DepositLimitGovernor;
use crate::ledger::{balance_of, Instruction, LedgerView};

// ============================================
// PROTOCOL FAMILIES
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolFamily {
    Compound,
    AaveV2,
    Curve,
    Erc4626,
}

impl ProtocolFamily {
    pub const ALL: [ProtocolFamily; 4] = [
        ProtocolFamily::Compound,
        ProtocolFamily::AaveV2,
        ProtocolFamily::Curve,
        ProtocolFamily::Erc4626,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ProtocolFamily::Compound => "compound",
            ProtocolFamily::AaveV2 => "aave-v2",
            ProtocolFamily::Curve => "curve",
            ProtocolFamily::Erc4626 => "erc4626",
        }
    }
}

impl fmt::Display for ProtocolFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl std::str::FromStr for ProtocolFamily {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "compound" => Ok(ProtocolFamily::Compound),
            "aave" | "aave-v2" | "aavev2" => Ok(ProtocolFamily::AaveV2),
            "curve" => Ok(ProtocolFamily::Curve),
            "erc4626" | "4626" => Ok(ProtocolFamily::Erc4626),
            other => Err(RouterError::Config(format!("unknown protocol family '{other}'"))),
        }
    }
}

// ============================================
// ADAPTER TRAIT
// ============================================

mod sealed {
    pub trait Sealed {}
}

/// Zero-then-set allowance: some tokens reject nonzero -> nonzero changes
pub fn approve_codes(token: Address, spender: Address, amount: U256) -> Vec<Instruction> {
    vec![
        Instruction::call(
            token,
            IERC20::approveCall {
                spender,
                amount: U256::ZERO,
            },
        ),
        Instruction::call(token, IERC20::approveCall { spender, amount }),
    ]
}

pub trait VenueAdapter: sealed::Sealed + fmt::Debug + Send + Sync {
    fn family(&self) -> ProtocolFamily;

    /// Address identifying this venue in strategy steps
    fn pool(&self) -> Address;

    /// Token this venue consumes
    fn underlying(&self) -> Address;

    /// Receipt token issued for deposits
    fn liquidity_token(&self) -> Address;

    /// Total value held by the venue, in the venue's valuation unit
    fn pool_value(&self, view: &dyn LedgerView) -> Result<U256>;

    /// Underlying redeemable for `amount` receipt tokens
    fn amount_in_underlying(&self, view: &dyn LedgerView, amount: U256) -> Result<U256>;

    /// Venue invest call(s) for an exact amount, allowance included
    fn invest_codes(&self, holder: Address, amount: U256) -> Vec<Instruction>;

    /// Venue divest call(s) for an exact receipt amount, allowance included
    fn divest_codes(&self, holder: Address, receipt_amount: U256) -> Vec<Instruction>;

    fn liquidity_token_balance(&self, view: &dyn LedgerView, holder: Address) -> Result<U256> {
        balance_of(view, self.liquidity_token(), holder)
    }

    /// Underlying value of everything `holder` keeps in this venue
    fn holding_value(&self, view: &dyn LedgerView, holder: Address) -> Result<U256> {
        let receipts =
            self.liquidity_token_balance(view, holder)? + self.staked_balance(view, holder)?;
        if receipts.is_zero() {
            return Ok(U256::ZERO);
        }
        self.amount_in_underlying(view, receipts)
    }

    /// Deposit up to `amount`, clipped by the deposit limit governor
    fn deposit_some(
        &self,
        view: &dyn LedgerView,
        governor: &DepositLimitGovernor,
        holder: Address,
        amount: U256,
    ) -> Result<Vec<Instruction>> {
        if amount.is_zero() {
            return Ok(Vec::new());
        }
        let allowed = governor.clip(view, self, holder, amount)?;
        if allowed.is_zero() {
            debug!("{} deposit into {} fully clipped", self.family(), self.pool());
            return Ok(Vec::new());
        }
        debug!(
            "{} deposit {} (requested {}) into {}",
            self.family(),
            allowed,
            amount,
            self.pool()
        );
        Ok(self.invest_codes(holder, allowed))
    }

    /// Deposit the holder's whole current underlying balance
    fn deposit_all(
        &self,
        view: &dyn LedgerView,
        governor: &DepositLimitGovernor,
        holder: Address,
    ) -> Result<Vec<Instruction>> {
        let balance = balance_of(view, self.underlying(), holder)?;
        self.deposit_some(view, governor, holder, balance)
    }

    fn withdraw_some(
        &self,
        _view: &dyn LedgerView,
        holder: Address,
        receipt_amount: U256,
    ) -> Result<Vec<Instruction>> {
        if receipt_amount.is_zero() {
            return Ok(Vec::new());
        }
        Ok(self.divest_codes(holder, receipt_amount))
    }

    /// Withdraw the holder's whole current receipt balance
    fn withdraw_all(&self, view: &dyn LedgerView, holder: Address) -> Result<Vec<Instruction>> {
        let balance = self.liquidity_token_balance(view, holder)?;
        self.withdraw_some(view, holder, balance)
    }

    // ---------- Staking (venues with a separate reward contract) ----------

    fn can_stake(&self) -> bool {
        false
    }

    fn staked_balance(&self, _view: &dyn LedgerView, _holder: Address) -> Result<U256> {
        Ok(U256::ZERO)
    }

    fn stake_all(&self, _view: &dyn LedgerView, _holder: Address) -> Result<Vec<Instruction>> {
        Err(self.unsupported("stake_all"))
    }

    fn unstake_all(&self, _view: &dyn LedgerView, _holder: Address) -> Result<Vec<Instruction>> {
        Err(self.unsupported("unstake_all"))
    }

    fn harvest_all(
        &self,
        _view: &dyn LedgerView,
        _holder: Address,
        _helper: &dyn HarvestHelper,
    ) -> Result<Vec<Instruction>> {
        Err(self.unsupported("harvest_all"))
    }

    // ---------- Borrowing ----------

    fn can_borrow(&self) -> bool {
        false
    }

    /// Borrow as much of `asset` as the position safely allows
    fn borrow_all(
        &self,
        _view: &dyn LedgerView,
        _holder: Address,
        _asset: Address,
    ) -> Result<Vec<Instruction>> {
        Err(self.unsupported("borrow_all"))
    }

    /// Repay the whole `asset` debt, then withdraw all collateral
    fn repay_and_withdraw_all(
        &self,
        _view: &dyn LedgerView,
        _holder: Address,
        _asset: Address,
    ) -> Result<Vec<Instruction>> {
        Err(self.unsupported("repay_and_withdraw_all"))
    }

    /// Collateral minus debt, in underlying units
    fn borrow_position_value(
        &self,
        _view: &dyn LedgerView,
        _holder: Address,
        _asset: Address,
    ) -> Result<U256> {
        Err(self.unsupported("borrow_position_value"))
    }

    /// Convert an amount of borrowed `asset` into underlying units
    fn borrowed_in_underlying(
        &self,
        _view: &dyn LedgerView,
        _asset: Address,
        _amount: U256,
    ) -> Result<U256> {
        Err(self.unsupported("borrowed_in_underlying"))
    }

    fn unsupported(&self, operation: &'static str) -> RouterError {
        RouterError::Unsupported {
            family: self.family().name(),
            operation,
        }
    }
}

// ============================================
// ADAPTER SET
// ============================================

/// Adapters keyed by the pool address used in strategy steps
#[derive(Debug, Default)]
pub struct AdapterSet {
    adapters: HashMap<Address, Box<dyn VenueAdapter>>,
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, adapter: impl VenueAdapter + 'static) {
        self.adapters.insert(adapter.pool(), Box::new(adapter));
    }

    pub fn get(&self, pool: &Address) -> Result<&dyn VenueAdapter> {
        self.adapters
            .get(pool)
            .map(|a| a.as_ref())
            .ok_or_else(|| RouterError::unknown_pool(*pool))
    }

    pub fn contains(&self, pool: &Address) -> bool {
        self.adapters.contains_key(pool)
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn VenueAdapter> {
        self.adapters.values().map(|a| a.as_ref())
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::{DepositLimitGovernor, LimitMode};
    use crate::sandbox::{Sandbox, DAI};

    #[test]
    fn test_approve_codes_reset_then_set() {
        let codes = approve_codes(DAI, Address::repeat_byte(5), U256::from(42u64));
        assert_eq!(codes.len(), 2);
        let reset: IERC20::approveCall = codes[0].decode().unwrap();
        let set: IERC20::approveCall = codes[1].decode().unwrap();
        assert_eq!(reset.amount, U256::ZERO);
        assert_eq!(set.amount, U256::from(42u64));
    }

    #[test]
    fn test_deposit_all_reads_current_balance() {
        let mut sandbox = Sandbox::new().unwrap();
        let adapter = sandbox.adapters.get(&sandbox.cdai).unwrap();
        let mut governor = DepositLimitGovernor::default();
        governor.set_pool_mode(adapter.pool(), LimitMode::Number);
        governor.set_absolute_amount(adapter.pool(), U256::MAX);
        let holder = Address::repeat_byte(0x77);

        sandbox.ledger.mint(DAI, holder, Sandbox::units(100)).unwrap();
        let first = adapter.deposit_all(&sandbox.ledger, &governor, holder).unwrap();
        // Idempotent without a balance change
        let again = adapter.deposit_all(&sandbox.ledger, &governor, holder).unwrap();
        assert_eq!(first, again);

        sandbox.ledger.mint(DAI, holder, Sandbox::units(50)).unwrap();
        let second = adapter.deposit_all(&sandbox.ledger, &governor, holder).unwrap();

        let amount = |codes: &[Instruction]| -> U256 {
            codes[1].decode::<IERC20::approveCall>().unwrap().amount
        };
        assert_eq!(amount(&first), Sandbox::units(100));
        assert_eq!(amount(&second), Sandbox::units(150));
        assert_ne!(first, second);
    }

    #[test]
    fn test_zero_balance_yields_empty_codes() {
        let sandbox = Sandbox::new().unwrap();
        let governor = DepositLimitGovernor::default();
        let holder = Address::repeat_byte(0x78);
        for adapter in sandbox.adapters.iter() {
            assert!(adapter
                .deposit_all(&sandbox.ledger, &governor, holder)
                .unwrap()
                .is_empty());
            assert!(adapter.withdraw_all(&sandbox.ledger, holder).unwrap().is_empty());
        }
    }

    #[test]
    fn test_pool_value_without_code_is_venue_unavailable() {
        let mut sandbox = Sandbox::new().unwrap();
        let pool = sandbox.cdai;
        sandbox.ledger.destroy(pool);
        let adapter = sandbox.adapters.get(&pool).unwrap();
        assert_eq!(
            adapter.pool_value(&sandbox.ledger).unwrap_err(),
            RouterError::VenueUnavailable(pool)
        );
    }

    #[test]
    fn test_unsupported_capability_names_family() {
        let sandbox = Sandbox::new().unwrap();
        let adapter = sandbox.adapters.get(&sandbox.cdai).unwrap();
        assert!(!adapter.can_stake());
        assert_eq!(
            adapter.stake_all(&sandbox.ledger, DAI).unwrap_err(),
            RouterError::Unsupported {
                family: "compound",
                operation: "stake_all"
            }
        );
    }
}
