//! Curve StableSwap adapter
//!
//! The `add_liquidity` shape depends on the pool's coin count, so the adapter
//! is built from a [`CurvePoolSpec`] describing the pool rather than probing
//! it. Single-sided: the adapter deposits and withdraws one coin.
//!
//! When the pool has a gauge, LP tokens can be staked there and the gauge's
//! reward token harvested back into the deposit coin.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::valuation::curve_pool_value;
use super::{approve_codes, sealed, HarvestHelper, ProtocolFamily, VenueAdapter};
use crate::abi::{ICurveGauge, ICurveSwap, ICurveSwap2, ICurveSwap3, ICurveSwap4, IERC20};
use crate::error::{Result, RouterError};
use crate::ledger::{balance_of, read, Instruction, LedgerView};

// ============================================
// POOL SPEC
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GaugeSpec {
    pub gauge: Address,
    pub reward_token: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurvePoolSpec {
    pub pool: Address,
    pub lp_token: Address,
    /// Pool coins in index order (2 to 4)
    pub coins: Vec<Address>,
    /// Index of the coin this adapter deposits
    pub coin_index: usize,
    pub gauge: Option<GaugeSpec>,
}

impl CurvePoolSpec {
    pub fn n_coins(&self) -> usize {
        self.coins.len()
    }
}

// ============================================
// ADAPTER
// ============================================

#[derive(Debug, Clone)]
pub struct CurveAdapter {
    spec: CurvePoolSpec,
}

impl CurveAdapter {
    pub fn new(spec: CurvePoolSpec) -> Result<Self> {
        if !(2..=4).contains(&spec.n_coins()) {
            return Err(RouterError::Config(format!(
                "curve pool {} has {} coins, expected 2 to 4",
                spec.pool,
                spec.n_coins()
            )));
        }
        if spec.coin_index >= spec.n_coins() {
            return Err(RouterError::Config(format!(
                "curve coin index {} out of range for pool {}",
                spec.coin_index, spec.pool
            )));
        }
        Ok(Self { spec })
    }

    pub fn spec(&self) -> &CurvePoolSpec {
        &self.spec
    }

    fn coin_index(&self) -> i128 {
        self.spec.coin_index as i128
    }

    /// `add_liquidity` sized to the pool's coin count
    fn add_liquidity(&self, amount: U256) -> Instruction {
        let i = self.spec.coin_index;
        let pool = self.spec.pool;
        let min_mint_amount = U256::ZERO;
        match self.spec.n_coins() {
            2 => {
                let mut amounts = [U256::ZERO; 2];
                amounts[i] = amount;
                Instruction::call(pool, ICurveSwap2::add_liquidityCall { amounts, min_mint_amount })
            }
            3 => {
                let mut amounts = [U256::ZERO; 3];
                amounts[i] = amount;
                Instruction::call(pool, ICurveSwap3::add_liquidityCall { amounts, min_mint_amount })
            }
            _ => {
                let mut amounts = [U256::ZERO; 4];
                amounts[i] = amount;
                Instruction::call(pool, ICurveSwap4::add_liquidityCall { amounts, min_mint_amount })
            }
        }
    }

    fn gauge(&self) -> Result<&GaugeSpec> {
        self.spec.gauge.as_ref().ok_or(RouterError::Unsupported {
            family: ProtocolFamily::Curve.name(),
            operation: "gauge",
        })
    }
}

impl sealed::Sealed for CurveAdapter {}

impl VenueAdapter for CurveAdapter {
    fn family(&self) -> ProtocolFamily {
        ProtocolFamily::Curve
    }

    fn pool(&self) -> Address {
        self.spec.pool
    }

    fn underlying(&self) -> Address {
        self.spec.coins[self.spec.coin_index]
    }

    fn liquidity_token(&self) -> Address {
        self.spec.lp_token
    }

    fn pool_value(&self, view: &dyn LedgerView) -> Result<U256> {
        let virtual_price = read(view, self.spec.pool, &ICurveSwap::get_virtual_priceCall {})?;
        let supply = read(view, self.spec.lp_token, &IERC20::totalSupplyCall {})?;
        Ok(curve_pool_value(virtual_price, supply))
    }

    fn amount_in_underlying(&self, view: &dyn LedgerView, amount: U256) -> Result<U256> {
        if amount.is_zero() {
            return Ok(U256::ZERO);
        }
        read(
            view,
            self.spec.pool,
            &ICurveSwap::calc_withdraw_one_coinCall {
                token_amount: amount,
                i: self.coin_index(),
            },
        )
    }

    fn invest_codes(&self, _holder: Address, amount: U256) -> Vec<Instruction> {
        let mut codes = approve_codes(self.underlying(), self.spec.pool, amount);
        codes.push(self.add_liquidity(amount));
        codes
    }

    fn divest_codes(&self, _holder: Address, receipt_amount: U256) -> Vec<Instruction> {
        let mut codes = approve_codes(self.spec.lp_token, self.spec.pool, receipt_amount);
        codes.push(Instruction::call(
            self.spec.pool,
            ICurveSwap::remove_liquidity_one_coinCall {
                token_amount: receipt_amount,
                i: self.coin_index(),
                min_amount: U256::ZERO,
            },
        ));
        codes
    }

    fn can_stake(&self) -> bool {
        self.spec.gauge.is_some()
    }

    fn staked_balance(&self, view: &dyn LedgerView, holder: Address) -> Result<U256> {
        match &self.spec.gauge {
            Some(g) => read(view, g.gauge, &ICurveGauge::balanceOfCall { addr: holder }),
            None => Ok(U256::ZERO),
        }
    }

    fn stake_all(&self, view: &dyn LedgerView, holder: Address) -> Result<Vec<Instruction>> {
        let gauge = self.gauge()?.gauge;
        let lp = self.liquidity_token_balance(view, holder)?;
        if lp.is_zero() {
            return Ok(Vec::new());
        }
        let mut codes = approve_codes(self.spec.lp_token, gauge, lp);
        codes.push(Instruction::call(gauge, ICurveGauge::depositCall { value: lp }));
        Ok(codes)
    }

    fn unstake_all(&self, view: &dyn LedgerView, holder: Address) -> Result<Vec<Instruction>> {
        let gauge = self.gauge()?.gauge;
        let staked = self.staked_balance(view, holder)?;
        if staked.is_zero() {
            return Ok(Vec::new());
        }
        Ok(vec![Instruction::call(
            gauge,
            ICurveGauge::withdrawCall { value: staked },
        )])
    }

    /// Claim gauge rewards and swap them (plus any reward already held) into
    /// the deposit coin
    fn harvest_all(
        &self,
        view: &dyn LedgerView,
        holder: Address,
        helper: &dyn HarvestHelper,
    ) -> Result<Vec<Instruction>> {
        let gauge = self.gauge()?;
        let claimable = read(
            view,
            gauge.gauge,
            &ICurveGauge::claimable_rewardCall {
                user: holder,
                reward_token: gauge.reward_token,
            },
        )?;
        let held = balance_of(view, gauge.reward_token, holder)?;

        let mut codes = Vec::new();
        if !claimable.is_zero() {
            codes.push(Instruction::call(gauge.gauge, ICurveGauge::claim_rewardsCall {}));
        }
        let total = claimable + held;
        if total.is_zero() {
            return Ok(codes);
        }
        debug!("curve harvest {} reward {} for {}", total, gauge.reward_token, holder);
        codes.extend(helper.swap_codes(
            view,
            holder,
            gauge.reward_token,
            self.underlying(),
            total,
        )?);
        Ok(codes)
    }
}
