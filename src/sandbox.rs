//! Sandbox Venue World
//!
//! A seeded [`SimLedger`] with one venue per supported family, a swap router
//! for harvests and a matching [`AdapterSet`]. Used by the `demo` command and
//! by tests across the crate.
//!
//! | venue         | underlying | seeded with                         |
//! |---------------|------------|-------------------------------------|
//! | cDAI          | DAI        | 100k DAI cash, rate 0.02            |
//! | Aave V2       | DAI, USDC  | 100k of each, 75% LTV, equal prices |
//! | Curve DAI/USDC| DAI        | 50k + 50k, 4 bps withdraw fee       |
//! | ERC-4626      | DAI        | 100k DAI from an outside depositor  |

use alloy_primitives::{Address, B256, U256};

use crate::adapters::valuation::WAD;
use crate::adapters::{
    AaveV2Adapter, AdapterSet, CompoundAdapter, CurveAdapter, CurvePoolSpec, Erc4626Adapter,
    GaugeSpec, ProtocolFamily, RouterHarvester,
};
use crate::catalog::StrategyStep;
use crate::error::Result;
use crate::governance::{GovernanceStore, RiskProfile, Role};
use crate::ledger::venues::{
    AaveMarket, AaveReserve, CTokenMarket, CurveGauge, CurveSwap, Erc4626Vault, SwapRouter, Venue,
};
use crate::ledger::{balance_of, Batch, BatchReceipt, Erc20, SimLedger};

pub const DAI: Address = Address::repeat_byte(0xda);
pub const USDC: Address = Address::repeat_byte(0xdc);
pub const CRV: Address = Address::repeat_byte(0xc3);

pub const GOVERNANCE: Address = Address::repeat_byte(0xf0);
pub const OPERATOR: Address = Address::repeat_byte(0xf1);
pub const FINANCE: Address = Address::repeat_byte(0xf2);
/// Outside liquidity provider used for seeding
pub const WHALE: Address = Address::repeat_byte(0xf9);
/// Address the sandbox vault holds its positions at
pub const VAULT: Address = Address::repeat_byte(0xee);

const CDAI: Address = Address::repeat_byte(0xcd);
const AAVE_POOL: Address = Address::repeat_byte(0xaa);
const ADAI: Address = Address::repeat_byte(0xad);
const AUSDC: Address = Address::repeat_byte(0xac);
const VD_DAI: Address = Address::repeat_byte(0xbd);
const VD_USDC: Address = Address::repeat_byte(0xbc);
const CURVE_POOL: Address = Address::repeat_byte(0xc0);
const CURVE_LP: Address = Address::repeat_byte(0xc1);
const CURVE_GAUGE: Address = Address::repeat_byte(0xc2);
const VAULT4626: Address = Address::repeat_byte(0x46);
const ROUTER: Address = Address::repeat_byte(0xe0);

const GENESIS_TIMESTAMP: u64 = 1_700_000_000;

/// Conservative profile: no borrowing, ratings 1..=7
pub const BALANCED_PROFILE: u32 = 1;
/// Allows borrow steps and every rating
pub const AGGRESSIVE_PROFILE: u32 = 2;

/// Strategies registered by [`Sandbox::governance`]
#[derive(Debug, Clone, Copy)]
pub struct SandboxStrategies {
    pub tokens_hash: B256,
    pub compound: B256,
    pub aave: B256,
    pub curve_staked: B256,
    pub vault4626: B256,
    /// DAI collateral on Aave, USDC borrowed and held
    pub aave_borrow: B256,
}

pub struct Sandbox {
    pub ledger: SimLedger,
    pub adapters: AdapterSet,
    pub harvester: RouterHarvester,
    pub cdai: Address,
    pub aave_pool: Address,
    pub adai: Address,
    pub ausdc: Address,
    pub curve_pool: Address,
    pub curve_lp: Address,
    pub curve_gauge: Address,
    pub vault4626: Address,
    pub router: Address,
}

impl Sandbox {
    pub fn new() -> Result<Self> {
        let mut ledger = SimLedger::new();
        ledger.set_timestamp(GENESIS_TIMESTAMP);

        ledger.deploy_token(DAI, Erc20::new("DAI", 18));
        ledger.deploy_token(USDC, Erc20::strict("USDC", 18));
        ledger.deploy_token(CRV, Erc20::new("CRV", 18));

        // Compound
        ledger.deploy_token(CDAI, Erc20::new("cDAI", 8));
        ledger.deploy_venue(
            CDAI,
            Venue::Compound(CTokenMarket::new(DAI, U256::from(20_000_000_000_000_000u64))),
        );
        ledger.mint(DAI, CDAI, Self::units(100_000))?;

        // Aave V2
        let price = U256::from(500_000_000_000_000u64);
        for (address, symbol) in [
            (ADAI, "aDAI"),
            (AUSDC, "aUSDC"),
            (VD_DAI, "variableDebtDAI"),
            (VD_USDC, "variableDebtUSDC"),
        ] {
            ledger.deploy_token(address, Erc20::new(symbol, 18));
        }
        let market = AaveMarket::new(7_500)
            .with_reserve(
                DAI,
                AaveReserve {
                    a_token: ADAI,
                    variable_debt_token: VD_DAI,
                    price,
                },
            )
            .with_reserve(
                USDC,
                AaveReserve {
                    a_token: AUSDC,
                    variable_debt_token: VD_USDC,
                    price,
                },
            );
        ledger.deploy_venue(AAVE_POOL, Venue::Aave(market));
        ledger.mint(DAI, ADAI, Self::units(100_000))?;
        ledger.mint(USDC, AUSDC, Self::units(100_000))?;

        // Curve DAI/USDC with a CRV gauge
        ledger.deploy_token(CURVE_LP, Erc20::new("crvDAIUSDC", 18));
        ledger.deploy_venue(
            CURVE_POOL,
            Venue::Curve(CurveSwap::new(vec![DAI, USDC], CURVE_LP, 4)),
        );
        ledger.mint(DAI, CURVE_POOL, Self::units(50_000))?;
        ledger.mint(USDC, CURVE_POOL, Self::units(50_000))?;
        ledger.mint(CURVE_LP, WHALE, Self::units(100_000))?;

        ledger.deploy_token(CURVE_GAUGE, Erc20::new("crvDAIUSDC-gauge", 18));
        ledger.deploy_venue(
            CURVE_GAUGE,
            Venue::Gauge(CurveGauge::new(
                CURVE_LP,
                CRV,
                U256::from(1_000_000_000_000_000u64),
            )),
        );
        ledger.mint(CRV, CURVE_GAUGE, Self::units(1_000_000))?;

        // ERC-4626 over DAI
        ledger.deploy_token(VAULT4626, Erc20::new("vDAI", 18));
        ledger.deploy_venue(VAULT4626, Venue::Vault4626(Erc4626Vault::new(DAI)));
        ledger.mint(DAI, VAULT4626, Self::units(100_000))?;
        ledger.mint(VAULT4626, WHALE, Self::units(100_000))?;

        // Router: 1 CRV = 0.5 DAI, DAI <-> USDC at par
        let router = SwapRouter::new()
            .with_rate(CRV, DAI, U256::from(500_000_000_000_000_000u64))
            .with_rate(USDC, DAI, WAD)
            .with_rate(DAI, USDC, WAD);
        ledger.deploy_venue(ROUTER, Venue::Router(router));
        ledger.mint(DAI, ROUTER, Self::units(1_000_000))?;
        ledger.mint(USDC, ROUTER, Self::units(1_000_000))?;

        let mut adapters = AdapterSet::new();
        adapters.insert(CompoundAdapter::new(CDAI, DAI));
        adapters.insert(AaveV2Adapter::new(AAVE_POOL, DAI, ADAI));
        adapters.insert(CurveAdapter::new(CurvePoolSpec {
            pool: CURVE_POOL,
            lp_token: CURVE_LP,
            coins: vec![DAI, USDC],
            coin_index: 0,
            gauge: Some(GaugeSpec {
                gauge: CURVE_GAUGE,
                reward_token: CRV,
            }),
        })?);
        adapters.insert(Erc4626Adapter::new(VAULT4626, DAI));

        Ok(Self {
            ledger,
            adapters,
            harvester: RouterHarvester::new(ROUTER, 50),
            cdai: CDAI,
            aave_pool: AAVE_POOL,
            adai: ADAI,
            ausdc: AUSDC,
            curve_pool: CURVE_POOL,
            curve_lp: CURVE_LP,
            curve_gauge: CURVE_GAUGE,
            vault4626: VAULT4626,
            router: ROUTER,
        })
    }

    /// `n` whole tokens at 18 decimals
    /// Rebuild the harvester with a different swap slippage
    pub fn set_harvest_slippage(&mut self, slippage_bps: u64) {
        self.harvester = RouterHarvester::new(self.router, slippage_bps);
    }

    pub fn units(n: u64) -> U256 {
        U256::from(n) * WAD
    }

    pub fn fund(&mut self, token: Address, holder: Address, whole_units: u64) -> Result<()> {
        self.ledger.mint(token, holder, Self::units(whole_units))
    }

    /// Invest the holder's whole underlying balance, bypassing limits
    pub fn deposit_direct(&mut self, pool: Address, holder: Address) -> Result<BatchReceipt> {
        let adapter = self.adapters.get(&pool)?;
        let amount = balance_of(&self.ledger, adapter.underlying(), holder)?;
        let codes = adapter.invest_codes(holder, amount);
        self.ledger.execute_batch(holder, &Batch::from(codes))
    }

    /// Divest the holder's whole receipt balance
    pub fn withdraw_direct(&mut self, pool: Address, holder: Address) -> Result<BatchReceipt> {
        let adapter = self.adapters.get(&pool)?;
        let receipts = adapter.liquidity_token_balance(&self.ledger, holder)?;
        let codes = adapter.divest_codes(holder, receipts);
        self.ledger.execute_batch(holder, &Batch::from(codes))
    }

    /// Governance store wired to this world: roles granted, DAI registered,
    /// every pool rated and one strategy per venue.
    ///
    /// Every family may take up to 100% of pool value.
    pub fn governance(&self) -> Result<(GovernanceStore, SandboxStrategies)> {
        let mut store = GovernanceStore::new(GOVERNANCE);
        store.grant_role(GOVERNANCE, Role::Operator, OPERATOR)?;
        store.grant_role(GOVERNANCE, Role::FinanceOperator, FINANCE)?;
        store.set_risk_profile(
            GOVERNANCE,
            RiskProfile::new(BALANCED_PROFILE, "balanced", false, (1, 7)),
        )?;
        store.set_risk_profile(
            GOVERNANCE,
            RiskProfile::new(AGGRESSIVE_PROFILE, "aggressive", true, (1, 10)),
        )?;

        for adapter in self.adapters.iter() {
            let rating = match adapter.family() {
                ProtocolFamily::Compound => 2,
                ProtocolFamily::AaveV2 => 3,
                ProtocolFamily::Erc4626 => 4,
                ProtocolFamily::Curve => 6,
            };
            store.register_pool(OPERATOR, adapter.pool(), adapter.family(), rating)?;
        }
        for family in ProtocolFamily::ALL {
            store.set_protocol_pct(FINANCE, family, 10_000)?;
        }

        let tokens_hash = store.register_tokens(OPERATOR, &[DAI])?;
        let mut register = |steps: Vec<StrategyStep>| store.set_strategy(OPERATOR, tokens_hash, steps);
        let compound = register(vec![StrategyStep::invest(CDAI, CDAI)])?;
        let aave = register(vec![StrategyStep::invest(AAVE_POOL, ADAI)])?;
        let curve_staked = register(vec![StrategyStep::invest(CURVE_POOL, CURVE_LP)])?;
        let vault4626 = register(vec![StrategyStep::invest(VAULT4626, VAULT4626)])?;
        let aave_borrow = register(vec![StrategyStep::borrow(AAVE_POOL, USDC)])?;

        Ok((
            store,
            SandboxStrategies {
                tokens_hash,
                compound,
                aave,
                curve_staked,
                vault4626,
                aave_borrow,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerView;

    #[test]
    fn test_every_adapter_has_live_code() {
        let sandbox = Sandbox::new().unwrap();
        assert_eq!(sandbox.adapters.len(), 4);
        for adapter in sandbox.adapters.iter() {
            assert!(sandbox.ledger.has_code(adapter.pool()));
            assert!(!adapter.pool_value(&sandbox.ledger).unwrap().is_zero());
        }
    }

    #[test]
    fn test_governance_registers_strategies() {
        let sandbox = Sandbox::new().unwrap();
        let (store, strategies) = sandbox.governance().unwrap();
        assert_eq!(store.catalog().get_strategies_for(&strategies.tokens_hash).count(), 5);
        assert!(store
            .catalog()
            .get_strategy(&strategies.aave_borrow)
            .unwrap()
            .has_borrow());
    }
}
