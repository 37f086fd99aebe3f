//! Aave V2 adapter
//!
//! Deposits mint aTokens 1:1. As a borrow step the deposited asset becomes
//! collateral and a share of the remaining borrow capacity is drawn in the
//! step's output asset at the variable rate.

use alloy_primitives::{Address, U256};
use tracing::debug;

use super::valuation::{apply_bps, atoken_to_underlying, convert_by_price, eth_to_asset};
use super::{approve_codes, sealed, ProtocolFamily, VenueAdapter};
use crate::abi::{IAaveLendingPool, IAavePriceOracle, IAaveProtocolDataProvider, AAVE_VARIABLE_RATE};
use crate::error::Result;
use crate::ledger::{balance_of, read, Instruction, LedgerView};

#[derive(Debug, Clone)]
pub struct AaveV2Adapter {
    lending_pool: Address,
    data_provider: Address,
    price_oracle: Address,
    asset: Address,
    a_token: Address,
    /// Share of available borrow capacity drawn by `borrow_all`, basis points
    borrow_ratio_bps: u64,
}

impl AaveV2Adapter {
    pub fn new(lending_pool: Address, asset: Address, a_token: Address) -> Self {
        Self {
            lending_pool,
            data_provider: lending_pool,
            price_oracle: lending_pool,
            asset,
            a_token,
            borrow_ratio_bps: 5_000,
        }
    }

    pub fn with_periphery(mut self, data_provider: Address, price_oracle: Address) -> Self {
        self.data_provider = data_provider;
        self.price_oracle = price_oracle;
        self
    }

    pub fn with_borrow_ratio(mut self, bps: u64) -> Self {
        self.borrow_ratio_bps = bps.min(10_000);
        self
    }

    fn price(&self, view: &dyn LedgerView, asset: Address) -> Result<U256> {
        read(view, self.price_oracle, &IAavePriceOracle::getAssetPriceCall { asset })
    }

    fn available_liquidity(&self, view: &dyn LedgerView, asset: Address) -> Result<U256> {
        let data = read(
            view,
            self.data_provider,
            &IAaveProtocolDataProvider::getReserveDataCall { asset },
        )?;
        Ok(data.availableLiquidity)
    }

    fn debt(&self, view: &dyn LedgerView, holder: Address, asset: Address) -> Result<U256> {
        let tokens = read(
            view,
            self.data_provider,
            &IAaveProtocolDataProvider::getReserveTokensAddressesCall { asset },
        )?;
        balance_of(view, tokens.variableDebtTokenAddress, holder)
    }
}

impl sealed::Sealed for AaveV2Adapter {}

impl VenueAdapter for AaveV2Adapter {
    fn family(&self) -> ProtocolFamily {
        ProtocolFamily::AaveV2
    }

    fn pool(&self) -> Address {
        self.lending_pool
    }

    fn underlying(&self) -> Address {
        self.asset
    }

    fn liquidity_token(&self) -> Address {
        self.a_token
    }

    fn pool_value(&self, view: &dyn LedgerView) -> Result<U256> {
        self.available_liquidity(view, self.asset)
    }

    fn amount_in_underlying(&self, _view: &dyn LedgerView, amount: U256) -> Result<U256> {
        Ok(atoken_to_underlying(amount))
    }

    fn invest_codes(&self, holder: Address, amount: U256) -> Vec<Instruction> {
        let mut codes = approve_codes(self.asset, self.lending_pool, amount);
        codes.push(Instruction::call(
            self.lending_pool,
            IAaveLendingPool::depositCall {
                asset: self.asset,
                amount,
                onBehalfOf: holder,
                referralCode: 0,
            },
        ));
        codes
    }

    fn divest_codes(&self, holder: Address, receipt_amount: U256) -> Vec<Instruction> {
        let mut codes = approve_codes(self.a_token, self.lending_pool, receipt_amount);
        codes.push(Instruction::call(
            self.lending_pool,
            IAaveLendingPool::withdrawCall {
                asset: self.asset,
                amount: receipt_amount,
                to: holder,
            },
        ));
        codes
    }

    fn can_borrow(&self) -> bool {
        true
    }

    fn borrow_all(
        &self,
        view: &dyn LedgerView,
        holder: Address,
        asset: Address,
    ) -> Result<Vec<Instruction>> {
        let account = read(
            view,
            self.lending_pool,
            &IAaveLendingPool::getUserAccountDataCall { user: holder },
        )?;
        let capacity_eth = apply_bps(account.availableBorrowsETH, self.borrow_ratio_bps);
        let wanted = eth_to_asset(capacity_eth, self.price(view, asset)?);
        let amount = wanted.min(self.available_liquidity(view, asset)?);
        if amount.is_zero() {
            return Ok(Vec::new());
        }
        debug!("aave borrow {} of {} for {}", amount, asset, holder);
        Ok(vec![Instruction::call(
            self.lending_pool,
            IAaveLendingPool::borrowCall {
                asset,
                amount,
                interestRateMode: U256::from(AAVE_VARIABLE_RATE),
                referralCode: 0,
                onBehalfOf: holder,
            },
        )])
    }

    fn repay_and_withdraw_all(
        &self,
        view: &dyn LedgerView,
        holder: Address,
        asset: Address,
    ) -> Result<Vec<Instruction>> {
        let mut codes = Vec::new();
        let debt = self.debt(view, holder, asset)?;
        if !debt.is_zero() {
            codes.extend(approve_codes(asset, self.lending_pool, debt));
            codes.push(Instruction::call(
                self.lending_pool,
                IAaveLendingPool::repayCall {
                    asset,
                    amount: debt,
                    rateMode: U256::from(AAVE_VARIABLE_RATE),
                    onBehalfOf: holder,
                },
            ));
        }
        codes.extend(self.withdraw_all(view, holder)?);
        Ok(codes)
    }

    fn borrow_position_value(
        &self,
        view: &dyn LedgerView,
        holder: Address,
        asset: Address,
    ) -> Result<U256> {
        let collateral = self.liquidity_token_balance(view, holder)?;
        let debt = self.debt(view, holder, asset)?;
        let owed = self.borrowed_in_underlying(view, asset, debt)?;
        Ok(collateral.saturating_sub(owed))
    }

    fn borrowed_in_underlying(
        &self,
        view: &dyn LedgerView,
        asset: Address,
        amount: U256,
    ) -> Result<U256> {
        if amount.is_zero() {
            return Ok(U256::ZERO);
        }
        Ok(convert_by_price(
            amount,
            self.price(view, asset)?,
            self.price(view, self.asset)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::{DepositLimitGovernor, LimitMode};
    use crate::ledger::Batch;
    use crate::sandbox::{Sandbox, DAI, USDC};

    #[test]
    fn test_borrow_then_repay_round_trip() {
        let mut sandbox = Sandbox::new().unwrap();
        let holder = Address::repeat_byte(0x41);
        let pool = sandbox.aave_pool;
        sandbox.fund(DAI, holder, 1_000).unwrap();

        let mut governor = DepositLimitGovernor::default();
        governor.set_pool_mode(pool, LimitMode::Number);
        governor.set_absolute_amount(pool, U256::MAX);

        let adapter = sandbox.adapters.get(&pool).unwrap();
        let deposit = adapter.deposit_all(&sandbox.ledger, &governor, holder).unwrap();
        sandbox.ledger.execute_batch(holder, &Batch::from(deposit)).unwrap();
        assert_eq!(sandbox.ledger.token_balance(sandbox.adai, holder), Sandbox::units(1_000));

        let borrow = adapter.borrow_all(&sandbox.ledger, holder, USDC).unwrap();
        assert_eq!(borrow.len(), 1);
        sandbox.ledger.execute_batch(holder, &Batch::from(borrow)).unwrap();
        let borrowed = sandbox.ledger.token_balance(USDC, holder);
        assert!(!borrowed.is_zero());

        // Same price for DAI and USDC, 75% LTV, half the capacity drawn
        assert_eq!(borrowed, Sandbox::units(375));
        let net = adapter.borrow_position_value(&sandbox.ledger, holder, USDC).unwrap();
        assert_eq!(net, Sandbox::units(625));

        let unwind = adapter
            .repay_and_withdraw_all(&sandbox.ledger, holder, USDC)
            .unwrap();
        sandbox.ledger.execute_batch(holder, &Batch::from(unwind)).unwrap();
        assert_eq!(sandbox.ledger.token_balance(DAI, holder), Sandbox::units(1_000));
        assert_eq!(sandbox.ledger.token_balance(USDC, holder), U256::ZERO);
    }

    #[test]
    fn test_pool_value_is_available_liquidity() {
        let sandbox = Sandbox::new().unwrap();
        let adapter = sandbox.adapters.get(&sandbox.aave_pool).unwrap();
        let value = adapter.pool_value(&sandbox.ledger).unwrap();
        assert_eq!(value, sandbox.ledger.token_balance(DAI, sandbox.adai));
    }
}
