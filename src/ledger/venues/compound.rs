//! Compound cToken market
//!
//! The cToken balance lives in the ERC20 deployed at the market address;
//! `balanceOf`/`approve` fall through to it.

use alloy_primitives::{Address, U256};
use alloy_sol_types::{SolCall, SolValue};

use super::{decode, ok, require, VenueOutcome, WAD};
use crate::abi::ICToken;
use crate::ledger::Env;

#[derive(Debug, Clone)]
pub struct CTokenMarket {
    pub underlying: Address,
    /// Underlying per cToken, scaled by 1e18
    pub exchange_rate: U256,
    pub total_borrows: U256,
    pub total_reserves: U256,
}

impl CTokenMarket {
    pub fn new(underlying: Address, exchange_rate: U256) -> Self {
        Self {
            underlying,
            exchange_rate,
            total_borrows: U256::ZERO,
            total_reserves: U256::ZERO,
        }
    }

    pub(super) fn call(
        &mut self,
        env: &mut Env,
        this: Address,
        caller: Address,
        selector: [u8; 4],
        input: &[u8],
    ) -> VenueOutcome {
        if selector == ICToken::mintCall::SELECTOR {
            let call: ICToken::mintCall = decode(input)?;
            env.tokens
                .transfer_from(self.underlying, this, caller, this, call.mintAmount)?;
            // cTokens = amount / rate, truncated
            let minted = call.mintAmount * WAD / self.exchange_rate;
            env.tokens.mint(this, caller, minted)?;
            ok(U256::ZERO.abi_encode())
        } else if selector == ICToken::redeemCall::SELECTOR {
            let call: ICToken::redeemCall = decode(input)?;
            let amount = call.redeemTokens * self.exchange_rate / WAD;
            require(
                env.tokens.balance_of(self.underlying, this) >= amount,
                "redeem: insufficient cash",
            )?;
            env.tokens.burn(this, caller, call.redeemTokens)?;
            env.tokens.transfer(self.underlying, this, caller, amount)?;
            ok(U256::ZERO.abi_encode())
        } else if selector == ICToken::exchangeRateStoredCall::SELECTOR {
            ok(self.exchange_rate.abi_encode())
        } else if selector == ICToken::getCashCall::SELECTOR {
            ok(env.tokens.balance_of(self.underlying, this).abi_encode())
        } else if selector == ICToken::totalBorrowsCall::SELECTOR {
            ok(self.total_borrows.abi_encode())
        } else if selector == ICToken::totalReservesCall::SELECTOR {
            ok(self.total_reserves.abi_encode())
        } else if selector == ICToken::underlyingCall::SELECTOR {
            ok(self.underlying.abi_encode())
        } else {
            Ok(None)
        }
    }
}
