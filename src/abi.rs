//! Venue Call Surfaces
//!
//! Solidity interfaces for every external venue family the router targets.
//! Selectors and argument shapes are fixed per family (and, for Curve, per
//! pool coin count), so adapters encode against these and never discover
//! call shapes at runtime.

use alloy_primitives::{address, Address};
use alloy_sol_types::sol;

// ============================================
// WELL-KNOWN ADDRESSES
// ============================================

/// Multicall3 (same on all chains)
pub const MULTICALL3: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");

/// Aave V2 variable interest rate mode
pub const AAVE_VARIABLE_RATE: u64 = 2;

// ============================================
// ERC20
// ============================================

sol! {
    #[allow(missing_docs)]
    interface IERC20 {
        function totalSupply() external view returns (uint256);
        function decimals() external view returns (uint8);
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function transfer(address to, uint256 amount) external returns (bool);
        function transferFrom(address from, address to, uint256 amount) external returns (bool);
    }
}

// ============================================
// COMPOUND (rate-based lending)
// ============================================

sol! {
    /// Compound cToken market
    #[allow(missing_docs)]
    interface ICToken {
        function mint(uint256 mintAmount) external returns (uint256);
        function redeem(uint256 redeemTokens) external returns (uint256);
        function exchangeRateStored() external view returns (uint256);
        function getCash() external view returns (uint256);
        function totalBorrows() external view returns (uint256);
        function totalReserves() external view returns (uint256);
        function underlying() external view returns (address);
    }
}

// ============================================
// AAVE V2 (reserve-based lending + borrowing)
// ============================================

sol! {
    #[allow(missing_docs)]
    interface IAaveLendingPool {
        function deposit(address asset, uint256 amount, address onBehalfOf, uint16 referralCode) external;
        function withdraw(address asset, uint256 amount, address to) external returns (uint256);
        function borrow(address asset, uint256 amount, uint256 interestRateMode, uint16 referralCode, address onBehalfOf) external;
        function repay(address asset, uint256 amount, uint256 rateMode, address onBehalfOf) external returns (uint256);
        function getUserAccountData(address user) external view returns (
            uint256 totalCollateralETH,
            uint256 totalDebtETH,
            uint256 availableBorrowsETH,
            uint256 currentLiquidationThreshold,
            uint256 ltv,
            uint256 healthFactor
        );
    }

    #[allow(missing_docs)]
    interface IAaveProtocolDataProvider {
        function getReserveData(address asset) external view returns (
            uint256 availableLiquidity,
            uint256 totalStableDebt,
            uint256 totalVariableDebt,
            uint256 liquidityRate,
            uint256 variableBorrowRate,
            uint256 stableBorrowRate,
            uint256 averageStableBorrowRate,
            uint256 liquidityIndex,
            uint256 variableBorrowIndex,
            uint40 lastUpdateTimestamp
        );
        function getReserveTokensAddresses(address asset) external view returns (
            address aTokenAddress,
            address stableDebtTokenAddress,
            address variableDebtTokenAddress
        );
    }

    #[allow(missing_docs)]
    interface IAavePriceOracle {
        /// Asset price in ETH wei
        function getAssetPrice(address asset) external view returns (uint256);
    }
}

// ============================================
// CURVE (invariant-curve pools + gauges)
// ============================================

sol! {
    /// Functions whose shape does not depend on the coin count
    /// IMPORTANT: StableSwap uses int128 for indices
    #[allow(missing_docs)]
    interface ICurveSwap {
        function coins(uint256 i) external view returns (address);
        function balances(uint256 i) external view returns (uint256);
        function get_virtual_price() external view returns (uint256);
        function calc_withdraw_one_coin(uint256 token_amount, int128 i) external view returns (uint256);
        function remove_liquidity_one_coin(uint256 token_amount, int128 i, uint256 min_amount) external;
    }

    #[allow(missing_docs)]
    interface ICurveSwap2 {
        function add_liquidity(uint256[2] amounts, uint256 min_mint_amount) external;
    }

    #[allow(missing_docs)]
    interface ICurveSwap3 {
        function add_liquidity(uint256[3] amounts, uint256 min_mint_amount) external;
    }

    #[allow(missing_docs)]
    interface ICurveSwap4 {
        function add_liquidity(uint256[4] amounts, uint256 min_mint_amount) external;
    }

    /// Liquidity gauge (separate reward-accrual contract)
    #[allow(missing_docs)]
    interface ICurveGauge {
        function deposit(uint256 value) external;
        function withdraw(uint256 value) external;
        function balanceOf(address addr) external view returns (uint256);
        function claim_rewards() external;
        function claimable_reward(address user, address reward_token) external view returns (uint256);
    }
}

// ============================================
// ERC-4626 (tokenized vaults)
// ============================================

sol! {
    #[allow(missing_docs)]
    interface IERC4626 {
        function asset() external view returns (address);
        function totalAssets() external view returns (uint256);
        function convertToShares(uint256 assets) external view returns (uint256);
        function convertToAssets(uint256 shares) external view returns (uint256);
        function deposit(uint256 assets, address receiver) external returns (uint256);
        function redeem(uint256 shares, address receiver, address owner) external returns (uint256);
    }
}

// ============================================
// SWAP ROUTER (reward liquidation)
// ============================================

sol! {
    #[allow(missing_docs)]
    interface IUniswapV2Router {
        function getAmountsOut(uint256 amountIn, address[] path) external view returns (uint256[] amounts);
        function swapExactTokensForTokens(
            uint256 amountIn,
            uint256 amountOutMin,
            address[] path,
            address to,
            uint256 deadline
        ) external returns (uint256[] amounts);
    }
}

// ============================================
// MULTICALL3 (chain inspector)
// ============================================

sol! {
    #[allow(missing_docs)]
    interface IMulticall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct Result {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls)
            external payable returns (Result[] memory returnData);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use alloy_sol_types::SolCall;

    #[test]
    fn test_curve_add_liquidity_selectors_differ_by_coin_count() {
        assert_ne!(
            ICurveSwap2::add_liquidityCall::SELECTOR,
            ICurveSwap3::add_liquidityCall::SELECTOR
        );
        assert_ne!(
            ICurveSwap3::add_liquidityCall::SELECTOR,
            ICurveSwap4::add_liquidityCall::SELECTOR
        );
    }

    #[test]
    fn test_erc20_approve_selector() {
        // approve(address,uint256)
        assert_eq!(IERC20::approveCall::SELECTOR, [0x09, 0x5e, 0xa7, 0xb3]);
        let data = IERC20::approveCall {
            spender: Address::ZERO,
            amount: U256::from(1u64),
        }
        .abi_encode();
        assert_eq!(data.len(), 4 + 32 * 2);
    }
}
