//! ERC-4626 tokenized vault. Shares live in the ERC20 at the vault address.

use alloy_primitives::{Address, U256};
use alloy_sol_types::{SolCall, SolValue};

use super::{decode, ok, require, VenueOutcome};
use crate::abi::IERC4626;
use crate::ledger::Env;

#[derive(Debug, Clone)]
pub struct Erc4626Vault {
    pub asset: Address,
}

impl Erc4626Vault {
    pub fn new(asset: Address) -> Self {
        Self { asset }
    }

    fn total_assets(&self, env: &Env, this: Address) -> U256 {
        env.tokens.balance_of(self.asset, this)
    }

    fn to_shares(&self, env: &Env, this: Address, assets: U256) -> U256 {
        let supply = env.tokens.total_supply(this);
        let total = self.total_assets(env, this);
        if supply.is_zero() || total.is_zero() {
            assets
        } else {
            assets * supply / total
        }
    }

    fn to_assets(&self, env: &Env, this: Address, shares: U256) -> U256 {
        let supply = env.tokens.total_supply(this);
        if supply.is_zero() {
            shares
        } else {
            shares * self.total_assets(env, this) / supply
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
        if selector == IERC4626::depositCall::SELECTOR {
            let call: IERC4626::depositCall = decode(input)?;
            let shares = self.to_shares(env, this, call.assets);
            require(!shares.is_zero(), "ZERO_SHARES")?;
            env.tokens
                .transfer_from(self.asset, this, caller, this, call.assets)?;
            env.tokens.mint(this, call.receiver, shares)?;
            ok(shares.abi_encode())
        } else if selector == IERC4626::redeemCall::SELECTOR {
            let call: IERC4626::redeemCall = decode(input)?;
            require(call.owner == caller, "redeem: caller is not owner")?;
            let assets = self.to_assets(env, this, call.shares);
            require(!assets.is_zero(), "ZERO_ASSETS")?;
            env.tokens.burn(this, call.owner, call.shares)?;
            env.tokens.transfer(self.asset, this, call.receiver, assets)?;
            ok(assets.abi_encode())
        } else if selector == IERC4626::assetCall::SELECTOR {
            ok(self.asset.abi_encode())
        } else if selector == IERC4626::totalAssetsCall::SELECTOR {
            ok(self.total_assets(env, this).abi_encode())
        } else if selector == IERC4626::convertToSharesCall::SELECTOR {
            let call: IERC4626::convertToSharesCall = decode(input)?;
            ok(self.to_shares(env, this, call.assets).abi_encode())
        } else if selector == IERC4626::convertToAssetsCall::SELECTOR {
            let call: IERC4626::convertToAssetsCall = decode(input)?;
            ok(self.to_assets(env, this, call.shares).abi_encode())
        } else {
            Ok(None)
        }
    }
}
