//! Aave V2 lending pool, with the protocol data provider and price oracle
//! surfaces served from the same address.
//!
//! Underlying liquidity sits at the aToken address; debt is tracked in a
//! variable-debt token. Every asset is assumed to use 18 decimals.

use alloy_primitives::{Address, U256};
use alloy_sol_types::{SolCall, SolValue};
use std::collections::HashMap;

use super::{decode, ok, require, VenueOutcome, WAD};
use crate::abi::{IAaveLendingPool, IAavePriceOracle, IAaveProtocolDataProvider};
use crate::ledger::Env;

#[derive(Debug, Clone)]
pub struct AaveReserve {
    pub a_token: Address,
    pub variable_debt_token: Address,
    /// Price in ETH wei per whole token
    pub price: U256,
}

#[derive(Debug, Clone)]
pub struct AaveMarket {
    pub reserves: HashMap<Address, AaveReserve>,
    /// Loan-to-value applied to all collateral, in basis points
    pub ltv_bps: u64,
    pub liquidation_threshold_bps: u64,
}

impl AaveMarket {
    pub fn new(ltv_bps: u64) -> Self {
        Self {
            reserves: HashMap::new(),
            ltv_bps,
            liquidation_threshold_bps: ltv_bps + 500,
        }
    }

    pub fn with_reserve(mut self, asset: Address, reserve: AaveReserve) -> Self {
        self.reserves.insert(asset, reserve);
        self
    }

    fn reserve(&self, asset: &Address) -> Result<&AaveReserve, crate::ledger::Revert> {
        self.reserves
            .get(asset)
            .ok_or_else(|| crate::ledger::Revert::new("reserve not initialized"))
    }

    /// (collateral, debt) in ETH wei
    fn account_eth(&self, env: &Env, user: Address) -> (U256, U256) {
        let mut collateral = U256::ZERO;
        let mut debt = U256::ZERO;
        for reserve in self.reserves.values() {
            collateral += env.tokens.balance_of(reserve.a_token, user) * reserve.price / WAD;
            debt += env.tokens.balance_of(reserve.variable_debt_token, user) * reserve.price / WAD;
        }
        (collateral, debt)
    }

    fn borrow_capacity(&self, collateral: U256) -> U256 {
        collateral * U256::from(self.ltv_bps) / U256::from(10_000u64)
    }

    pub(super) fn call(
        &mut self,
        env: &mut Env,
        this: Address,
        caller: Address,
        selector: [u8; 4],
        input: &[u8],
    ) -> VenueOutcome {
        if selector == IAaveLendingPool::depositCall::SELECTOR {
            let call: IAaveLendingPool::depositCall = decode(input)?;
            let reserve = self.reserve(&call.asset)?.clone();
            env.tokens
                .transfer_from(call.asset, this, caller, reserve.a_token, call.amount)?;
            env.tokens.mint(reserve.a_token, call.onBehalfOf, call.amount)?;
            Ok(Some(Default::default()))
        } else if selector == IAaveLendingPool::withdrawCall::SELECTOR {
            let call: IAaveLendingPool::withdrawCall = decode(input)?;
            let reserve = self.reserve(&call.asset)?.clone();
            let held = env.tokens.balance_of(reserve.a_token, caller);
            let amount = if call.amount == U256::MAX {
                held
            } else {
                call.amount
            };
            env.tokens.burn(reserve.a_token, caller, amount)?;
            let (collateral, debt) = self.account_eth(env, caller);
            require(
                self.borrow_capacity(collateral) >= debt,
                "withdraw: health factor too low",
            )?;
            env.tokens.transfer(call.asset, reserve.a_token, call.to, amount)?;
            ok(amount.abi_encode())
        } else if selector == IAaveLendingPool::borrowCall::SELECTOR {
            let call: IAaveLendingPool::borrowCall = decode(input)?;
            let reserve = self.reserve(&call.asset)?.clone();
            env.tokens
                .mint(reserve.variable_debt_token, call.onBehalfOf, call.amount)?;
            let (collateral, debt) = self.account_eth(env, call.onBehalfOf);
            require(
                self.borrow_capacity(collateral) >= debt,
                "borrow: collateral cannot cover new borrow",
            )?;
            env.tokens
                .transfer(call.asset, reserve.a_token, caller, call.amount)?;
            Ok(Some(Default::default()))
        } else if selector == IAaveLendingPool::repayCall::SELECTOR {
            let call: IAaveLendingPool::repayCall = decode(input)?;
            let reserve = self.reserve(&call.asset)?.clone();
            let owed = env
                .tokens
                .balance_of(reserve.variable_debt_token, call.onBehalfOf);
            let paid = call.amount.min(owed);
            env.tokens
                .transfer_from(call.asset, this, caller, reserve.a_token, paid)?;
            env.tokens
                .burn(reserve.variable_debt_token, call.onBehalfOf, paid)?;
            ok(paid.abi_encode())
        } else if selector == IAaveLendingPool::getUserAccountDataCall::SELECTOR {
            let call: IAaveLendingPool::getUserAccountDataCall = decode(input)?;
            let (collateral, debt) = self.account_eth(env, call.user);
            let available = self.borrow_capacity(collateral).saturating_sub(debt);
            let health = if debt.is_zero() {
                U256::MAX
            } else {
                collateral * U256::from(self.liquidation_threshold_bps) * WAD
                    / U256::from(10_000u64)
                    / debt
            };
            ok((
                collateral,
                debt,
                available,
                U256::from(self.liquidation_threshold_bps),
                U256::from(self.ltv_bps),
                health,
            )
                .abi_encode_params())
        } else if selector == IAaveProtocolDataProvider::getReserveDataCall::SELECTOR {
            let call: IAaveProtocolDataProvider::getReserveDataCall = decode(input)?;
            let reserve = self.reserve(&call.asset)?;
            let available = env.tokens.balance_of(call.asset, reserve.a_token);
            let variable_debt = env.tokens.total_supply(reserve.variable_debt_token);
            ok((
                available,
                U256::ZERO,
                variable_debt,
                U256::ZERO,
                U256::ZERO,
                U256::ZERO,
                U256::ZERO,
                WAD * U256::from(1_000_000_000u64),
                WAD * U256::from(1_000_000_000u64),
                U256::from(env.timestamp),
            )
                .abi_encode_params())
        } else if selector == IAaveProtocolDataProvider::getReserveTokensAddressesCall::SELECTOR {
            let call: IAaveProtocolDataProvider::getReserveTokensAddressesCall = decode(input)?;
            let reserve = self.reserve(&call.asset)?;
            ok((reserve.a_token, Address::ZERO, reserve.variable_debt_token).abi_encode_params())
        } else if selector == IAavePriceOracle::getAssetPriceCall::SELECTOR {
            let call: IAavePriceOracle::getAssetPriceCall = decode(input)?;
            ok(self.reserve(&call.asset)?.price.abi_encode())
        } else {
            Ok(None)
        }
    }
}
