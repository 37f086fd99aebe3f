//! Compound cToken adapter
//!
//! The cToken is both the pool and the receipt token.

use alloy_primitives::{Address, U256};

use super::valuation::ctoken_to_underlying;
use super::{approve_codes, sealed, ProtocolFamily, VenueAdapter};
use crate::abi::ICToken;
use crate::error::Result;
use crate::ledger::{read, Instruction, LedgerView};

#[derive(Debug, Clone)]
pub struct CompoundAdapter {
    ctoken: Address,
    underlying: Address,
}

impl CompoundAdapter {
    pub fn new(ctoken: Address, underlying: Address) -> Self {
        Self { ctoken, underlying }
    }
}

impl sealed::Sealed for CompoundAdapter {}

impl VenueAdapter for CompoundAdapter {
    fn family(&self) -> ProtocolFamily {
        ProtocolFamily::Compound
    }

    fn pool(&self) -> Address {
        self.ctoken
    }

    fn underlying(&self) -> Address {
        self.underlying
    }

    fn liquidity_token(&self) -> Address {
        self.ctoken
    }

    /// Reserve cash: underlying sitting in the market
    fn pool_value(&self, view: &dyn LedgerView) -> Result<U256> {
        read(view, self.ctoken, &ICToken::getCashCall {})
    }

    fn amount_in_underlying(&self, view: &dyn LedgerView, amount: U256) -> Result<U256> {
        let rate = read(view, self.ctoken, &ICToken::exchangeRateStoredCall {})?;
        Ok(ctoken_to_underlying(amount, rate))
    }

    fn invest_codes(&self, _holder: Address, amount: U256) -> Vec<Instruction> {
        let mut codes = approve_codes(self.underlying, self.ctoken, amount);
        codes.push(Instruction::call(
            self.ctoken,
            ICToken::mintCall {
                mintAmount: amount,
            },
        ));
        codes
    }

    fn divest_codes(&self, _holder: Address, receipt_amount: U256) -> Vec<Instruction> {
        let mut codes = approve_codes(self.ctoken, self.ctoken, receipt_amount);
        codes.push(Instruction::call(
            self.ctoken,
            ICToken::redeemCall {
                redeemTokens: receipt_amount,
            },
        ));
        codes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::IERC20;

    #[test]
    fn test_deposit_code_shape() {
        let ctoken = Address::repeat_byte(0xcd);
        let dai = Address::repeat_byte(0xda);
        let adapter = CompoundAdapter::new(ctoken, dai);
        let codes = adapter.invest_codes(Address::ZERO, U256::from(10u64));

        assert_eq!(codes.len(), 3);
        assert_eq!(codes[0].target, dai);
        assert!(codes[0].is::<IERC20::approveCall>());
        assert!(codes[1].is::<IERC20::approveCall>());
        assert_eq!(codes[2].target, ctoken);
        let mint: ICToken::mintCall = codes[2].decode().unwrap();
        assert_eq!(mint.mintAmount, U256::from(10u64));
    }

    #[test]
    fn test_withdraw_code_shape() {
        let ctoken = Address::repeat_byte(0xcd);
        let adapter = CompoundAdapter::new(ctoken, Address::repeat_byte(0xda));
        let codes = adapter.divest_codes(Address::ZERO, U256::from(7u64));
        assert_eq!(codes.len(), 3);
        assert!(codes[2].is::<ICToken::redeemCall>());
        assert_eq!(codes[2].decode::<ICToken::redeemCall>().unwrap().redeemTokens, U256::from(7u64));
    }
}
