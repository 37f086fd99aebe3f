//! UniswapV2-style router quoting fixed pair rates out of its own inventory

use alloy_primitives::{Address, U256};
use alloy_sol_types::{SolCall, SolValue};
use std::collections::HashMap;

use super::{decode, ok, require, VenueOutcome, WAD};
use crate::abi::IUniswapV2Router;
use crate::ledger::{Env, Revert};

#[derive(Debug, Clone, Default)]
pub struct SwapRouter {
    /// (token_in, token_out) -> amount out per 1e18 in
    rates: HashMap<(Address, Address), U256>,
}

impl SwapRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(mut self, token_in: Address, token_out: Address, rate: U256) -> Self {
        self.rates.insert((token_in, token_out), rate);
        self
    }

    pub fn set_rate(&mut self, token_in: Address, token_out: Address, rate: U256) {
        self.rates.insert((token_in, token_out), rate);
    }

    fn amounts_out(&self, amount_in: U256, path: &[Address]) -> Result<Vec<U256>, Revert> {
        require(path.len() >= 2, "INVALID_PATH")?;
        let mut amounts = Vec::with_capacity(path.len());
        amounts.push(amount_in);
        for hop in path.windows(2) {
            let rate = self
                .rates
                .get(&(hop[0], hop[1]))
                .ok_or_else(|| Revert::new("no pair"))?;
            let last = amounts[amounts.len() - 1];
            amounts.push(last * *rate / WAD);
        }
        Ok(amounts)
    }

    pub(super) fn call(
        &mut self,
        env: &mut Env,
        this: Address,
        caller: Address,
        selector: [u8; 4],
        input: &[u8],
    ) -> VenueOutcome {
        if selector == IUniswapV2Router::getAmountsOutCall::SELECTOR {
            let call: IUniswapV2Router::getAmountsOutCall = decode(input)?;
            let amounts = self.amounts_out(call.amountIn, &call.path)?;
            ok((amounts,).abi_encode_params())
        } else if selector == IUniswapV2Router::swapExactTokensForTokensCall::SELECTOR {
            let call: IUniswapV2Router::swapExactTokensForTokensCall = decode(input)?;
            require(
                call.deadline >= U256::from(env.timestamp),
                "UniswapV2Router: EXPIRED",
            )?;
            let amounts = self.amounts_out(call.amountIn, &call.path)?;
            let out = amounts[amounts.len() - 1];
            require(
                out >= call.amountOutMin,
                "UniswapV2Router: INSUFFICIENT_OUTPUT_AMOUNT",
            )?;
            let token_in = call.path[0];
            let token_out = call.path[call.path.len() - 1];
            env.tokens
                .transfer_from(token_in, this, caller, this, call.amountIn)?;
            env.tokens.transfer(token_out, this, call.to, out)?;
            ok((amounts,).abi_encode_params())
        } else {
            Ok(None)
        }
    }
}
