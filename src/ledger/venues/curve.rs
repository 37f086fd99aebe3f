//! Curve StableSwap pool and liquidity gauge
//!
//! The pool prices every coin 1:1 (all coins use 18 decimals) and charges a
//! flat fee on single-coin withdrawals, so the virtual price only grows. The
//! LP token is a separate ERC20 minted and burned by the pool. The gauge
//! issues its own staked-balance token at the gauge address and streams one
//! reward token at a fixed rate.

use alloy_primitives::{Address, U256};
use alloy_sol_types::{SolCall, SolValue};
use std::collections::HashMap;

use super::{decode, ok, require, VenueOutcome, WAD};
use crate::abi::{ICurveGauge, ICurveSwap, ICurveSwap2, ICurveSwap3, ICurveSwap4};
use crate::ledger::{Env, Revert};

// ============================================
// SWAP
// ============================================

#[derive(Debug, Clone)]
pub struct CurveSwap {
    pub coins: Vec<Address>,
    pub lp_token: Address,
    /// Fee charged by `remove_liquidity_one_coin`, basis points
    pub withdraw_fee_bps: u64,
}

impl CurveSwap {
    pub fn new(coins: Vec<Address>, lp_token: Address, withdraw_fee_bps: u64) -> Self {
        Self {
            coins,
            lp_token,
            withdraw_fee_bps,
        }
    }

    fn total_value(&self, env: &Env, this: Address) -> U256 {
        self.coins
            .iter()
            .map(|coin| env.tokens.balance_of(*coin, this))
            .fold(U256::ZERO, |acc, b| acc + b)
    }

    fn virtual_price(&self, env: &Env, this: Address) -> U256 {
        let supply = env.tokens.total_supply(self.lp_token);
        if supply.is_zero() {
            WAD
        } else {
            self.total_value(env, this) * WAD / supply
        }
    }

    fn coin_index(&self, i: i128) -> Result<usize, Revert> {
        usize::try_from(i)
            .ok()
            .filter(|i| *i < self.coins.len())
            .ok_or_else(|| Revert::new("coin index out of range"))
    }

    fn withdraw_one(&self, env: &Env, this: Address, amount: U256, i: usize) -> Result<U256, Revert> {
        let supply = env.tokens.total_supply(self.lp_token);
        require(!supply.is_zero() && amount <= supply, "withdraw exceeds supply")?;
        let gross = amount * self.total_value(env, this) / supply;
        let fee = gross * U256::from(self.withdraw_fee_bps) / U256::from(10_000u64);
        let out = gross - fee;
        require(
            env.tokens.balance_of(self.coins[i], this) >= out,
            "not enough coin in pool",
        )?;
        Ok(out)
    }

    fn add_liquidity(
        &self,
        env: &mut Env,
        this: Address,
        caller: Address,
        amounts: &[U256],
        min_mint: U256,
    ) -> VenueOutcome {
        require(amounts.len() == self.coins.len(), "wrong coin count")?;
        let value_before = self.total_value(env, this);
        let supply = env.tokens.total_supply(self.lp_token);

        let mut deposited = U256::ZERO;
        for (coin, amount) in self.coins.iter().zip(amounts) {
            if !amount.is_zero() {
                env.tokens.transfer_from(*coin, this, caller, this, *amount)?;
                deposited += *amount;
            }
        }
        require(!deposited.is_zero(), "zero deposit")?;

        let minted = if supply.is_zero() {
            deposited
        } else {
            deposited * supply / value_before
        };
        require(minted >= min_mint, "slippage screwed you")?;
        env.tokens.mint(self.lp_token, caller, minted)?;
        Ok(Some(Default::default()))
    }

    pub(super) fn call(
        &mut self,
        env: &mut Env,
        this: Address,
        caller: Address,
        selector: [u8; 4],
        input: &[u8],
    ) -> VenueOutcome {
        if selector == ICurveSwap2::add_liquidityCall::SELECTOR {
            let call: ICurveSwap2::add_liquidityCall = decode(input)?;
            self.add_liquidity(env, this, caller, &call.amounts, call.min_mint_amount)
        } else if selector == ICurveSwap3::add_liquidityCall::SELECTOR {
            let call: ICurveSwap3::add_liquidityCall = decode(input)?;
            self.add_liquidity(env, this, caller, &call.amounts, call.min_mint_amount)
        } else if selector == ICurveSwap4::add_liquidityCall::SELECTOR {
            let call: ICurveSwap4::add_liquidityCall = decode(input)?;
            self.add_liquidity(env, this, caller, &call.amounts, call.min_mint_amount)
        } else if selector == ICurveSwap::remove_liquidity_one_coinCall::SELECTOR {
            let call: ICurveSwap::remove_liquidity_one_coinCall = decode(input)?;
            let i = self.coin_index(call.i)?;
            let out = self.withdraw_one(env, this, call.token_amount, i)?;
            require(out >= call.min_amount, "not enough coins removed")?;
            env.tokens.burn(self.lp_token, caller, call.token_amount)?;
            env.tokens.transfer(self.coins[i], this, caller, out)?;
            Ok(Some(Default::default()))
        } else if selector == ICurveSwap::calc_withdraw_one_coinCall::SELECTOR {
            let call: ICurveSwap::calc_withdraw_one_coinCall = decode(input)?;
            let i = self.coin_index(call.i)?;
            ok(self.withdraw_one(env, this, call.token_amount, i)?.abi_encode())
        } else if selector == ICurveSwap::get_virtual_priceCall::SELECTOR {
            ok(self.virtual_price(env, this).abi_encode())
        } else if selector == ICurveSwap::coinsCall::SELECTOR {
            let call: ICurveSwap::coinsCall = decode(input)?;
            let coin = usize::try_from(call.i)
                .ok()
                .and_then(|i| self.coins.get(i))
                .ok_or_else(|| Revert::new("coin index out of range"))?;
            ok(coin.abi_encode())
        } else if selector == ICurveSwap::balancesCall::SELECTOR {
            let call: ICurveSwap::balancesCall = decode(input)?;
            let coin = usize::try_from(call.i)
                .ok()
                .and_then(|i| self.coins.get(i))
                .ok_or_else(|| Revert::new("coin index out of range"))?;
            ok(env.tokens.balance_of(*coin, this).abi_encode())
        } else {
            Ok(None)
        }
    }
}

// ============================================
// GAUGE
// ============================================

#[derive(Debug, Clone)]
pub struct CurveGauge {
    pub lp_token: Address,
    pub reward_token: Address,
    /// Reward tokens emitted per second across all stakers
    pub reward_rate: U256,
    reward_per_token: U256,
    last_update: u64,
    paid: HashMap<Address, U256>,
    owed: HashMap<Address, U256>,
}

impl CurveGauge {
    pub fn new(lp_token: Address, reward_token: Address, reward_rate: U256) -> Self {
        Self {
            lp_token,
            reward_token,
            reward_rate,
            reward_per_token: U256::ZERO,
            last_update: 0,
            paid: HashMap::new(),
            owed: HashMap::new(),
        }
    }

    fn current_reward_per_token(&self, env: &Env, this: Address) -> U256 {
        let staked = env.tokens.total_supply(this);
        if staked.is_zero() || env.timestamp <= self.last_update {
            return self.reward_per_token;
        }
        let elapsed = U256::from(env.timestamp - self.last_update);
        self.reward_per_token + self.reward_rate * elapsed * WAD / staked
    }

    fn earned(&self, env: &Env, this: Address, user: Address) -> U256 {
        let rpt = self.current_reward_per_token(env, this);
        let paid = self.paid.get(&user).copied().unwrap_or_default();
        let owed = self.owed.get(&user).copied().unwrap_or_default();
        owed + env.tokens.balance_of(this, user) * (rpt - paid) / WAD
    }

    /// Checkpoint `user` before their stake changes
    fn checkpoint(&mut self, env: &Env, this: Address, user: Address) {
        let earned = self.earned(env, this, user);
        self.reward_per_token = self.current_reward_per_token(env, this);
        self.last_update = self.last_update.max(env.timestamp);
        self.paid.insert(user, self.reward_per_token);
        self.owed.insert(user, earned);
    }

    pub(super) fn call(
        &mut self,
        env: &mut Env,
        this: Address,
        caller: Address,
        selector: [u8; 4],
        input: &[u8],
    ) -> VenueOutcome {
        if selector == ICurveGauge::depositCall::SELECTOR {
            let call: ICurveGauge::depositCall = decode(input)?;
            self.checkpoint(env, this, caller);
            env.tokens
                .transfer_from(self.lp_token, this, caller, this, call.value)?;
            env.tokens.mint(this, caller, call.value)?;
            Ok(Some(Default::default()))
        } else if selector == ICurveGauge::withdrawCall::SELECTOR {
            let call: ICurveGauge::withdrawCall = decode(input)?;
            self.checkpoint(env, this, caller);
            env.tokens.burn(this, caller, call.value)?;
            env.tokens.transfer(self.lp_token, this, caller, call.value)?;
            Ok(Some(Default::default()))
        } else if selector == ICurveGauge::claim_rewardsCall::SELECTOR {
            self.checkpoint(env, this, caller);
            let owed = self.owed.insert(caller, U256::ZERO).unwrap_or_default();
            if !owed.is_zero() {
                env.tokens.transfer(self.reward_token, this, caller, owed)?;
            }
            Ok(Some(Default::default()))
        } else if selector == ICurveGauge::claimable_rewardCall::SELECTOR {
            let call: ICurveGauge::claimable_rewardCall = decode(input)?;
            let amount = if call.reward_token == self.reward_token {
                self.earned(env, this, call.user)
            } else {
                U256::ZERO
            };
            ok(amount.abi_encode())
        } else {
            Ok(None)
        }
    }
}
