//! Pending user flows, settled FIFO at the next rebalance

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDeposit {
    pub user: Address,
    /// Underlying already transferred into the vault
    pub amount: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingWithdrawal {
    pub user: Address,
    /// Shares already debited from the user
    pub shares: U256,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingQueue {
    deposits: Vec<PendingDeposit>,
    withdrawals: Vec<PendingWithdrawal>,
}

impl PendingQueue {
    pub fn push_deposit(&mut self, user: Address, amount: U256) {
        self.deposits.push(PendingDeposit { user, amount });
    }

    pub fn push_withdrawal(&mut self, user: Address, shares: U256) {
        self.withdrawals.push(PendingWithdrawal { user, shares });
    }

    pub fn deposits(&self) -> &[PendingDeposit] {
        &self.deposits
    }

    pub fn withdrawals(&self) -> &[PendingWithdrawal] {
        &self.withdrawals
    }

    /// Underlying parked in the vault awaiting share issuance
    pub fn deposit_total(&self) -> U256 {
        self.deposits
            .iter()
            .fold(U256::ZERO, |acc, d| acc + d.amount)
    }

    pub fn is_empty(&self) -> bool {
        self.deposits.is_empty() && self.withdrawals.is_empty()
    }

    /// Drain both queues, oldest first
    pub fn take(&mut self) -> (Vec<PendingDeposit>, Vec<PendingWithdrawal>) {
        (
            std::mem::take(&mut self.deposits),
            std::mem::take(&mut self.withdrawals),
        )
    }
}
