//! ERC-4626 vault adapter. Vault shares are the receipt token.

use alloy_primitives::{Address, U256};

use super::{approve_codes, sealed, ProtocolFamily, VenueAdapter};
use crate::abi::IERC4626;
use crate::error::Result;
use crate::ledger::{read, Instruction, LedgerView};

#[derive(Debug, Clone)]
pub struct Erc4626Adapter {
    vault: Address,
    asset: Address,
}

impl Erc4626Adapter {
    pub fn new(vault: Address, asset: Address) -> Self {
        Self { vault, asset }
    }
}

impl sealed::Sealed for Erc4626Adapter {}

impl VenueAdapter for Erc4626Adapter {
    fn family(&self) -> ProtocolFamily {
        ProtocolFamily::Erc4626
    }

    fn pool(&self) -> Address {
        self.vault
    }

    fn underlying(&self) -> Address {
        self.asset
    }

    fn liquidity_token(&self) -> Address {
        self.vault
    }

    fn pool_value(&self, view: &dyn LedgerView) -> Result<U256> {
        read(view, self.vault, &IERC4626::totalAssetsCall {})
    }

    fn amount_in_underlying(&self, view: &dyn LedgerView, amount: U256) -> Result<U256> {
        read(view, self.vault, &IERC4626::convertToAssetsCall { shares: amount })
    }

    fn invest_codes(&self, holder: Address, amount: U256) -> Vec<Instruction> {
        let mut codes = approve_codes(self.asset, self.vault, amount);
        codes.push(Instruction::call(
            self.vault,
            IERC4626::depositCall {
                assets: amount,
                receiver: holder,
            },
        ));
        codes
    }

    fn divest_codes(&self, holder: Address, receipt_amount: U256) -> Vec<Instruction> {
        let mut codes = approve_codes(self.vault, self.vault, receipt_amount);
        codes.push(Instruction::call(
            self.vault,
            IERC4626::redeemCall {
                shares: receipt_amount,
                receiver: holder,
                owner: holder,
            },
        ));
        codes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::IERC20;
    use crate::governance::DepositLimitGovernor;
    use crate::sandbox::{Sandbox, DAI};

    #[test]
    fn test_deposit_code_shape() {
        let vault = Address::repeat_byte(0x46);
        let holder = Address::repeat_byte(0x77);
        let adapter = Erc4626Adapter::new(vault, DAI);
        let codes = adapter.invest_codes(holder, U256::from(10u64));

        assert_eq!(codes.len(), 3);
        assert_eq!(codes[0].target, DAI);
        assert_eq!(codes[1].decode::<IERC20::approveCall>().unwrap().spender, vault);
        assert_eq!(codes[2].target, vault);
        let deposit: IERC4626::depositCall = codes[2].decode().unwrap();
        assert_eq!(deposit.assets, U256::from(10u64));
        assert_eq!(deposit.receiver, holder);
    }

    #[test]
    fn test_redeem_code_shape() {
        let vault = Address::repeat_byte(0x46);
        let holder = Address::repeat_byte(0x77);
        let adapter = Erc4626Adapter::new(vault, DAI);
        let codes = adapter.divest_codes(holder, U256::from(7u64));

        assert_eq!(codes.len(), 3);
        assert_eq!(codes[0].target, vault);
        let redeem: IERC4626::redeemCall = codes[2].decode().unwrap();
        assert_eq!(redeem.shares, U256::from(7u64));
        assert_eq!(redeem.receiver, holder);
        assert_eq!(redeem.owner, holder);
    }

    #[test]
    fn test_shares_round_trip_against_sandbox_vault() {
        let mut sandbox = Sandbox::new().unwrap();
        let holder = Address::repeat_byte(0x77);
        sandbox.ledger.mint(DAI, holder, Sandbox::units(40)).unwrap();

        let adapter = Erc4626Adapter::new(sandbox.vault4626, DAI);
        let governor = DepositLimitGovernor::default();
        assert_eq!(
            adapter.pool_value(&sandbox.ledger).unwrap(),
            Sandbox::units(100_000)
        );

        // Default governor has no percentage set, so deposits are blocked
        assert!(adapter
            .deposit_all(&sandbox.ledger, &governor, holder)
            .unwrap()
            .is_empty());

        let codes = adapter.invest_codes(holder, Sandbox::units(40));
        sandbox.ledger.execute_batch(holder, &codes.into()).unwrap();
        let shares = adapter.liquidity_token_balance(&sandbox.ledger, holder).unwrap();
        assert_eq!(shares, Sandbox::units(40));
        assert_eq!(
            adapter.amount_in_underlying(&sandbox.ledger, shares).unwrap(),
            Sandbox::units(40)
        );

        let codes = adapter.withdraw_all(&sandbox.ledger, holder).unwrap();
        sandbox.ledger.execute_batch(holder, &codes.into()).unwrap();
        assert_eq!(sandbox.ledger.token_balance(DAI, holder), Sandbox::units(40));
        assert_eq!(sandbox.ledger.token_balance(sandbox.vault4626, holder), U256::ZERO);
    }
}
