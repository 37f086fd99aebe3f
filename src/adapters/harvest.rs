//! Reward harvest helper
//!
//! Quotes reward tokens in underlying terms and emits the swap codes that
//! liquidate them. The default implementation routes through a
//! UniswapV2-style router.

use alloy_primitives::{Address, U256};

use super::approve_codes;
use super::valuation::apply_bps;
use crate::abi::IUniswapV2Router;
use crate::error::Result;
use crate::ledger::{balance_of, read, Instruction, LedgerView};

pub trait HarvestHelper: Send + Sync {
    /// Underlying received for selling `amount` of `reward_token`
    fn optimal_token_amount(
        &self,
        view: &dyn LedgerView,
        reward_token: Address,
        underlying: Address,
        amount: U256,
    ) -> Result<U256>;

    /// Value of `holder`'s reward balance in underlying
    fn reward_balance_in_underlying(
        &self,
        view: &dyn LedgerView,
        holder: Address,
        reward_token: Address,
        underlying: Address,
    ) -> Result<U256> {
        let balance = balance_of(view, reward_token, holder)?;
        if balance.is_zero() {
            return Ok(U256::ZERO);
        }
        self.optimal_token_amount(view, reward_token, underlying, balance)
    }

    /// Codes selling `amount` of `reward_token` for `underlying`, paid to `holder`
    fn swap_codes(
        &self,
        view: &dyn LedgerView,
        holder: Address,
        reward_token: Address,
        underlying: Address,
        amount: U256,
    ) -> Result<Vec<Instruction>>;
}

#[derive(Debug, Clone)]
pub struct RouterHarvester {
    router: Address,
    /// Slippage tolerated on the quoted amount, basis points
    slippage_bps: u64,
    deadline_secs: u64,
}

impl RouterHarvester {
    pub fn new(router: Address, slippage_bps: u64) -> Self {
        Self {
            router,
            slippage_bps: slippage_bps.min(10_000),
            deadline_secs: 300,
        }
    }

    pub fn router(&self) -> Address {
        self.router
    }
}

impl HarvestHelper for RouterHarvester {
    fn optimal_token_amount(
        &self,
        view: &dyn LedgerView,
        reward_token: Address,
        underlying: Address,
        amount: U256,
    ) -> Result<U256> {
        if amount.is_zero() || reward_token == underlying {
            return Ok(amount);
        }
        let amounts = read(
            view,
            self.router,
            &IUniswapV2Router::getAmountsOutCall {
                amountIn: amount,
                path: vec![reward_token, underlying],
            },
        )?;
        Ok(amounts.last().copied().unwrap_or_default())
    }

    fn swap_codes(
        &self,
        view: &dyn LedgerView,
        holder: Address,
        reward_token: Address,
        underlying: Address,
        amount: U256,
    ) -> Result<Vec<Instruction>> {
        if amount.is_zero() || reward_token == underlying {
            return Ok(Vec::new());
        }
        let quoted = self.optimal_token_amount(view, reward_token, underlying, amount)?;
        if quoted.is_zero() {
            return Ok(Vec::new());
        }
        let min_out = quoted - apply_bps(quoted, self.slippage_bps);
        let deadline = U256::from(view.timestamp() + self.deadline_secs);

        let mut codes = approve_codes(reward_token, self.router, amount);
        codes.push(Instruction::call(
            self.router,
            IUniswapV2Router::swapExactTokensForTokensCall {
                amountIn: amount,
                amountOutMin: min_out,
                path: vec![reward_token, underlying],
                to: holder,
                deadline,
            },
        ));
        Ok(codes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Batch;
    use crate::sandbox::{Sandbox, CRV, DAI};

    #[test]
    fn test_quote_and_swap_through_router() {
        let mut sandbox = Sandbox::new().unwrap();
        let holder = Address::repeat_byte(0x51);
        sandbox.fund(CRV, holder, 10).unwrap();

        let helper = sandbox.harvester.clone();
        let value = helper
            .reward_balance_in_underlying(&sandbox.ledger, holder, CRV, DAI)
            .unwrap();
        // 1 CRV = 0.5 DAI
        assert_eq!(value, Sandbox::units(5));

        let codes = helper
            .swap_codes(&sandbox.ledger, holder, CRV, DAI, Sandbox::units(10))
            .unwrap();
        assert_eq!(codes.len(), 3);
        sandbox.ledger.execute_batch(holder, &Batch::from(codes)).unwrap();
        assert_eq!(sandbox.ledger.token_balance(DAI, holder), Sandbox::units(5));
        assert_eq!(sandbox.ledger.token_balance(CRV, holder), U256::ZERO);
    }

    #[test]
    fn test_same_token_needs_no_swap() {
        let sandbox = Sandbox::new().unwrap();
        let codes = sandbox
            .harvester
            .swap_codes(&sandbox.ledger, Address::ZERO, DAI, DAI, U256::from(1u64))
            .unwrap();
        assert!(codes.is_empty());
    }
}
