//! Simulated ERC20 state

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{SolCall, SolValue};
use std::collections::HashMap;

use super::{CallResult, Revert};
use crate::abi::IERC20;

#[derive(Debug, Clone)]
pub struct Erc20 {
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: U256,
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
    /// Reject nonzero -> nonzero allowance changes (USDT behaviour)
    pub strict_approve: bool,
}

impl Erc20 {
    pub fn new(symbol: &str, decimals: u8) -> Self {
        Self {
            symbol: symbol.to_string(),
            decimals,
            total_supply: U256::ZERO,
            balances: HashMap::new(),
            allowances: HashMap::new(),
            strict_approve: false,
        }
    }

    /// Token that reverts when an allowance moves from nonzero to nonzero
    pub fn strict(symbol: &str, decimals: u8) -> Self {
        Self {
            strict_approve: true,
            ..Self::new(symbol, decimals)
        }
    }

    pub fn balance_of(&self, holder: &Address) -> U256 {
        self.balances.get(holder).copied().unwrap_or_default()
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> U256 {
        self.allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or_default()
    }
}

/// All tokens deployed in the simulated world
#[derive(Debug, Clone, Default)]
pub struct TokenBook {
    tokens: HashMap<Address, Erc20>,
}

impl TokenBook {
    pub fn deploy(&mut self, address: Address, token: Erc20) {
        self.tokens.insert(address, token);
    }

    pub fn remove(&mut self, address: &Address) {
        self.tokens.remove(address);
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.tokens.contains_key(address)
    }

    pub fn get(&self, address: &Address) -> Option<&Erc20> {
        self.tokens.get(address)
    }

    fn token_mut(&mut self, token: Address) -> Result<&mut Erc20, Revert> {
        self.tokens
            .get_mut(&token)
            .ok_or_else(|| Revert::new(format!("no token at {token}")))
    }

    pub fn balance_of(&self, token: Address, holder: Address) -> U256 {
        self.tokens
            .get(&token)
            .map(|t| t.balance_of(&holder))
            .unwrap_or_default()
    }

    pub fn total_supply(&self, token: Address) -> U256 {
        self.tokens
            .get(&token)
            .map(|t| t.total_supply)
            .unwrap_or_default()
    }

    pub fn mint(&mut self, token: Address, to: Address, amount: U256) -> Result<(), Revert> {
        let t = self.token_mut(token)?;
        *t.balances.entry(to).or_default() += amount;
        t.total_supply += amount;
        Ok(())
    }

    pub fn burn(&mut self, token: Address, from: Address, amount: U256) -> Result<(), Revert> {
        let t = self.token_mut(token)?;
        let balance = t.balance_of(&from);
        if balance < amount {
            return Err(Revert::new(format!("{}: burn amount exceeds balance", t.symbol)));
        }
        t.balances.insert(from, balance - amount);
        t.total_supply -= amount;
        Ok(())
    }

    pub fn transfer(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), Revert> {
        let t = self.token_mut(token)?;
        let balance = t.balance_of(&from);
        if balance < amount {
            return Err(Revert::new(format!(
                "{}: transfer amount exceeds balance",
                t.symbol
            )));
        }
        t.balances.insert(from, balance - amount);
        *t.balances.entry(to).or_default() += amount;
        Ok(())
    }

    /// Spend `spender`'s allowance over `from`, then transfer
    pub fn transfer_from(
        &mut self,
        token: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), Revert> {
        let t = self.token_mut(token)?;
        let allowed = t.allowance(&from, &spender);
        if allowed < amount {
            return Err(Revert::new(format!(
                "{}: transfer amount exceeds allowance",
                t.symbol
            )));
        }
        if allowed != U256::MAX {
            t.allowances.insert((from, spender), allowed - amount);
        }
        self.transfer(token, from, to, amount)
    }

    pub fn approve(
        &mut self,
        token: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> Result<(), Revert> {
        let t = self.token_mut(token)?;
        if t.strict_approve && !amount.is_zero() && !t.allowance(&owner, &spender).is_zero() {
            return Err(Revert::new(format!(
                "{}: approve from non-zero to non-zero allowance",
                t.symbol
            )));
        }
        t.allowances.insert((owner, spender), amount);
        Ok(())
    }
}

/// Execute an ERC20 call against `token`
pub(super) fn dispatch(
    book: &mut TokenBook,
    token: Address,
    caller: Address,
    input: &[u8],
) -> CallResult {
    let selector: [u8; 4] = input
        .get(..4)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| Revert::new("missing selector"))?;
    let bad = |e: alloy_sol_types::Error| Revert::new(format!("bad calldata: {e}"));

    let out = if selector == IERC20::balanceOfCall::SELECTOR {
        let call = IERC20::balanceOfCall::abi_decode(input).map_err(bad)?;
        book.balance_of(token, call.account).abi_encode()
    } else if selector == IERC20::totalSupplyCall::SELECTOR {
        book.total_supply(token).abi_encode()
    } else if selector == IERC20::decimalsCall::SELECTOR {
        let decimals = book.get(&token).map(|t| t.decimals).unwrap_or(18);
        U256::from(decimals).abi_encode()
    } else if selector == IERC20::allowanceCall::SELECTOR {
        let call = IERC20::allowanceCall::abi_decode(input).map_err(bad)?;
        book.get(&token)
            .map(|t| t.allowance(&call.owner, &call.spender))
            .unwrap_or_default()
            .abi_encode()
    } else if selector == IERC20::approveCall::SELECTOR {
        let call = IERC20::approveCall::abi_decode(input).map_err(bad)?;
        book.approve(token, caller, call.spender, call.amount)?;
        true.abi_encode()
    } else if selector == IERC20::transferCall::SELECTOR {
        let call = IERC20::transferCall::abi_decode(input).map_err(bad)?;
        book.transfer(token, caller, call.to, call.amount)?;
        true.abi_encode()
    } else if selector == IERC20::transferFromCall::SELECTOR {
        let call = IERC20::transferFromCall::abi_decode(input).map_err(bad)?;
        book.transfer_from(token, caller, call.from, call.to, call.amount)?;
        true.abi_encode()
    } else {
        return Err(Revert::new("unknown selector"));
    };

    Ok(Bytes::from(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_approve_rejects_nonzero_to_nonzero() {
        let usdt = Address::repeat_byte(0x07);
        let owner = Address::repeat_byte(1);
        let spender = Address::repeat_byte(2);
        let mut book = TokenBook::default();
        book.deploy(usdt, Erc20::strict("USDT", 6));

        book.approve(usdt, owner, spender, U256::from(10u64)).unwrap();
        assert!(book.approve(usdt, owner, spender, U256::from(20u64)).is_err());

        // Zero-then-set is accepted
        book.approve(usdt, owner, spender, U256::ZERO).unwrap();
        book.approve(usdt, owner, spender, U256::from(20u64)).unwrap();
        assert_eq!(
            book.get(&usdt).unwrap().allowance(&owner, &spender),
            U256::from(20u64)
        );
    }

    #[test]
    fn test_transfer_from_spends_allowance() {
        let dai = Address::repeat_byte(0xda);
        let owner = Address::repeat_byte(1);
        let spender = Address::repeat_byte(2);
        let mut book = TokenBook::default();
        book.deploy(dai, Erc20::new("DAI", 18));
        book.mint(dai, owner, U256::from(100u64)).unwrap();
        book.approve(dai, owner, spender, U256::from(60u64)).unwrap();

        book.transfer_from(dai, spender, owner, spender, U256::from(50u64))
            .unwrap();
        assert!(book
            .transfer_from(dai, spender, owner, spender, U256::from(50u64))
            .is_err());
        assert_eq!(book.balance_of(dai, spender), U256::from(50u64));
    }
}
