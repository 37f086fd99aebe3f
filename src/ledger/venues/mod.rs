//! Simulated venue contracts
//!
//! Each venue keeps its own accounting and answers the same selectors the real
//! protocol exposes. Adapter valuation formulas are tested against these, so
//! the math here is written independently of `crate::adapters`.

mod aave;
mod compound;
mod curve;
mod erc4626;
mod router;

pub use aave::{AaveMarket, AaveReserve};
pub use compound::CTokenMarket;
pub use curve::{CurveGauge, CurveSwap};
pub use erc4626::Erc4626Vault;
pub use router::SwapRouter;

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;

use super::{Env, Revert};

/// 1e18
pub(crate) const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// `Ok(None)` means "not my selector": the world falls through to the ERC20
/// state deployed at the same address.
pub type VenueOutcome = Result<Option<Bytes>, Revert>;

#[derive(Debug, Clone)]
pub enum Venue {
    Compound(CTokenMarket),
    Aave(AaveMarket),
    Curve(CurveSwap),
    Gauge(CurveGauge),
    Vault4626(Erc4626Vault),
    Router(SwapRouter),
}

impl Venue {
    pub fn call(
        &mut self,
        env: &mut Env,
        this: Address,
        caller: Address,
        input: &[u8],
    ) -> VenueOutcome {
        let selector = selector(input)?;
        match self {
            Venue::Compound(v) => v.call(env, this, caller, selector, input),
            Venue::Aave(v) => v.call(env, this, caller, selector, input),
            Venue::Curve(v) => v.call(env, this, caller, selector, input),
            Venue::Gauge(v) => v.call(env, this, caller, selector, input),
            Venue::Vault4626(v) => v.call(env, this, caller, selector, input),
            Venue::Router(v) => v.call(env, this, caller, selector, input),
        }
    }
}

fn selector(input: &[u8]) -> Result<[u8; 4], Revert> {
    input
        .get(..4)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| Revert::new("missing selector"))
}

pub(crate) fn decode<C: SolCall>(input: &[u8]) -> Result<C, Revert> {
    C::abi_decode(input).map_err(|e| Revert::new(format!("bad calldata: {e}")))
}

pub(crate) fn ok(data: Vec<u8>) -> VenueOutcome {
    Ok(Some(Bytes::from(data)))
}

pub(crate) fn require(condition: bool, reason: &str) -> Result<(), Revert> {
    if condition {
        Ok(())
    } else {
        Err(Revert::new(reason))
    }
}
