//! Per-family valuation formulas
//!
//! Pure functions over values read from the venue. Rounding direction matches
//! the venue's own accounting (floor everywhere); limit and accrual math
//! downstream depends on that.

use alloy_primitives::U256;

/// 1e18
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Compound: underlying for `ctokens` at `exchangeRateStored`
pub fn ctoken_to_underlying(ctokens: U256, exchange_rate: U256) -> U256 {
    ctokens * exchange_rate / WAD
}

/// Curve: pool value as `virtual_price * lp_supply / 1e18`
pub fn curve_pool_value(virtual_price: U256, lp_supply: U256) -> U256 {
    virtual_price * lp_supply / WAD
}

/// Aave V2: aTokens track the underlying 1:1
pub fn atoken_to_underlying(atokens: U256) -> U256 {
    atokens
}

/// Convert between two assets priced in a common unit (Aave oracle, ETH wei)
pub fn convert_by_price(amount: U256, price_from: U256, price_to: U256) -> U256 {
    if price_to.is_zero() {
        return U256::ZERO;
    }
    amount * price_from / price_to
}

/// Amount of an asset worth `eth` at `price` (ETH wei per whole token)
pub fn eth_to_asset(eth: U256, price: U256) -> U256 {
    convert_by_price(eth, WAD, price)
}

/// `value * bps / 10_000`, floor
pub fn apply_bps(value: U256, bps: u64) -> U256 {
    value * U256::from(bps) / U256::from(10_000u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Address;
    use crate::abi::{ICToken, ICurveSwap, IERC20, IERC4626};
    use crate::ledger::{read, LedgerView};
    use crate::sandbox::{Sandbox, DAI};

    #[test]
    fn test_ctoken_formula_floors() {
        // 0.02 DAI per cToken
        let rate = U256::from(20_000_000_000_000_000u64);
        assert_eq!(ctoken_to_underlying(U256::from(50u64), rate), U256::from(1u64));
        assert_eq!(ctoken_to_underlying(U256::from(49u64), rate), U256::ZERO);
    }

    #[test]
    fn test_ctoken_formula_matches_redeem() {
        let mut sandbox = Sandbox::new().unwrap();
        let holder = Address::repeat_byte(0x31);
        sandbox.fund(DAI, holder, 1_000).unwrap();
        sandbox.deposit_direct(sandbox.cdai, holder).unwrap();

        let ctokens = sandbox.ledger.token_balance(sandbox.cdai, holder);
        let rate = read(&sandbox.ledger, sandbox.cdai, &ICToken::exchangeRateStoredCall {}).unwrap();
        let predicted = ctoken_to_underlying(ctokens, rate);

        sandbox.withdraw_direct(sandbox.cdai, holder).unwrap();
        assert_eq!(sandbox.ledger.token_balance(DAI, holder), predicted);
    }

    #[test]
    fn test_curve_pool_value_tracks_coin_balances() {
        let mut sandbox = Sandbox::new().unwrap();
        let holder = Address::repeat_byte(0x32);
        sandbox.fund(DAI, holder, 500).unwrap();
        sandbox.deposit_direct(sandbox.curve_pool, holder).unwrap();

        let view: &dyn LedgerView = &sandbox.ledger;
        let vp = read(view, sandbox.curve_pool, &ICurveSwap::get_virtual_priceCall {}).unwrap();
        let supply = read(view, sandbox.curve_lp, &IERC20::totalSupplyCall {}).unwrap();
        let dai_held = read(view, DAI, &IERC20::balanceOfCall { account: sandbox.curve_pool }).unwrap();
        let usdc_held = read(
            view,
            crate::sandbox::USDC,
            &IERC20::balanceOfCall {
                account: sandbox.curve_pool,
            },
        )
        .unwrap();

        let value = curve_pool_value(vp, supply);
        let actual = dai_held + usdc_held;
        // Floor rounding may lose at most one wei per WAD of supply
        assert!(value <= actual);
        assert!(actual - value <= supply / WAD + U256::from(1u64));
    }

    #[test]
    fn test_erc4626_convert_to_assets_matches_redeem() {
        let mut sandbox = Sandbox::new().unwrap();
        let holder = Address::repeat_byte(0x33);
        sandbox.fund(DAI, holder, 300).unwrap();
        sandbox.deposit_direct(sandbox.vault4626, holder).unwrap();
        // Yield lands in the vault
        sandbox.fund(DAI, sandbox.vault4626, 30).unwrap();

        let shares = sandbox.ledger.token_balance(sandbox.vault4626, holder);
        let predicted = read(
            &sandbox.ledger,
            sandbox.vault4626,
            &IERC4626::convertToAssetsCall { shares },
        )
        .unwrap();
        sandbox.withdraw_direct(sandbox.vault4626, holder).unwrap();
        assert_eq!(sandbox.ledger.token_balance(DAI, holder), predicted);
        assert!(predicted > Sandbox::units(300));
    }

    #[test]
    fn test_price_conversion() {
        let one_eth = WAD;
        // DAI at 0.0005 ETH
        let dai_price = U256::from(500_000_000_000_000u64);
        assert_eq!(eth_to_asset(one_eth, dai_price), U256::from(2_000u64) * WAD);
        assert_eq!(apply_bps(U256::from(20_000u64), 500), U256::from(1_000u64));
        assert_eq!(convert_by_price(U256::from(1u64), U256::from(1u64), U256::ZERO), U256::ZERO);
    }
}
