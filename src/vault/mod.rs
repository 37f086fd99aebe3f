//! Vault Rebalance Engine
//!
//! A vault holds one underlying token and at most one active strategy. Every
//! state change runs through the same pipeline inside a single ledger
//! session:
//!
//! 1. Value the vault and fix the value per share
//! 2. Apply the user's transfer (eager flows only)
//! 3. Harvest, unstake and unwind the current strategy, last step first
//! 4. Settle queued withdrawals, then queued deposits, at the fixed price
//! 5. Walk the selected strategy forward. Each step's instructions are
//!    generated against the state the previous step left behind.
//! 6. Commit
//!
//! Nothing is written to the ledger or the vault's books unless step 6
//! succeeds. Anomaly detection and gas accounting run after the commit and
//! never roll it back.

mod position;
mod queue;

pub use position::{jump_bps, value_per_share, VaultPosition};
pub use queue::{PendingDeposit, PendingQueue, PendingWithdrawal};

use alloy_primitives::{Address, B256, U256};
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::abi::IERC20;
use crate::adapters::valuation::WAD;
use crate::adapters::{AdapterSet, HarvestHelper, VenueAdapter};
use crate::catalog::{StrategyCatalog, StrategyStep};
use crate::config::{AnomalyRecord, EngineConfig};
use crate::error::{Result, RouterError};
use crate::governance::{GovernanceStore, Role};
use crate::ledger::{balance_of, BatchReceipt, Instruction, LedgerView, Session, SimLedger};
use crate::selection::StrategySelector;

// ============================================
// CONTEXT
// ============================================

/// Everything the engine reads besides the ledger
#[derive(Clone, Copy)]
pub struct RouterContext<'a> {
    pub governance: &'a GovernanceStore,
    pub adapters: &'a AdapterSet,
    pub selector: &'a dyn StrategySelector,
    pub harvester: &'a dyn HarvestHelper,
}

impl<'a> RouterContext<'a> {
    /// Context selecting through the governance store's strategy book
    pub fn new(
        governance: &'a GovernanceStore,
        adapters: &'a AdapterSet,
        harvester: &'a dyn HarvestHelper,
    ) -> Self {
        Self {
            governance,
            adapters,
            selector: governance,
            harvester,
        }
    }

    pub fn with_selector(mut self, selector: &'a dyn StrategySelector) -> Self {
        self.selector = selector;
        self
    }
}

/// A strategy step bound to the adapter serving its pool
struct ResolvedStep<'a> {
    step: StrategyStep,
    adapter: &'a dyn VenueAdapter,
}

enum Intent {
    Rebalance,
    Deposit { user: Address, amount: U256 },
    Withdraw { user: Address, shares: U256 },
}

/// Outcome of one committed pipeline run
#[derive(Debug, Clone)]
pub struct RebalanceReport {
    pub previous_strategy: Option<B256>,
    pub strategy: Option<B256>,
    pub receipt: BatchReceipt,
    pub total_value: U256,
    pub value_per_share: U256,
    pub deposits_settled: usize,
    pub withdrawals_settled: usize,
    pub gas_charged: U256,
    pub anomaly: Option<AnomalyRecord>,
}

// ============================================
// VAULT
// ============================================

#[derive(Debug, Clone, Default)]
struct VaultBook {
    position: VaultPosition,
    shares: HashMap<Address, U256>,
    queue: PendingQueue,
}

impl VaultBook {
    fn debit_shares(&mut self, user: Address, shares: U256) -> Result<()> {
        let held = self.shares.get(&user).copied().unwrap_or_default();
        if held < shares {
            return Err(RouterError::InsufficientShares {
                requested: shares.to_string(),
                held: held.to_string(),
            });
        }
        self.shares.insert(user, held - shares);
        Ok(())
    }
}

#[derive(Debug)]
pub struct Vault {
    address: Address,
    underlying: Address,
    tokens_hash: B256,
    risk_profile: u32,
    max_value_jump_bps: u64,
    gas_per_instruction: u64,
    gas_price_wei: U256,
    anomaly_log_path: Option<PathBuf>,
    paused: bool,
    discontinued: bool,
    book: VaultBook,
    anomalies: Vec<AnomalyRecord>,
}

impl Vault {
    /// Vault at `address` over a registered single-token set
    pub fn new(
        address: Address,
        tokens_hash: B256,
        catalog: &StrategyCatalog,
        config: &EngineConfig,
    ) -> Result<Self> {
        let underlying = catalog.underlying(&tokens_hash).ok_or_else(|| {
            RouterError::NotFound(format!("single-token set {tokens_hash}"))
        })?;
        Ok(Self {
            address,
            underlying,
            tokens_hash,
            risk_profile: config.risk_profile,
            max_value_jump_bps: config.max_value_jump_bps,
            gas_per_instruction: config.gas_per_instruction,
            gas_price_wei: config.gas_price_wei(),
            anomaly_log_path: config
                .anomaly_log
                .then(|| PathBuf::from(&config.anomaly_log_path)),
            paused: false,
            discontinued: false,
            book: VaultBook::default(),
            anomalies: Vec::new(),
        })
    }

    // ---------- Accessors ----------

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn underlying(&self) -> Address {
        self.underlying
    }

    pub fn tokens_hash(&self) -> B256 {
        self.tokens_hash
    }

    pub fn position(&self) -> &VaultPosition {
        &self.book.position
    }

    pub fn shares_of(&self, user: &Address) -> U256 {
        self.book.shares.get(user).copied().unwrap_or_default()
    }

    pub fn pending(&self) -> &PendingQueue {
        &self.book.queue
    }

    /// Anomalies flagged since the vault was created
    pub fn anomalies(&self) -> &[AnomalyRecord] {
        &self.anomalies
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_discontinued(&self) -> bool {
        self.discontinued
    }

    /// Idle underlying plus the unwound value of the current strategy
    pub fn total_value(&self, view: &dyn LedgerView, ctx: &RouterContext<'_>) -> Result<U256> {
        let steps = self.current_steps(ctx)?;
        Ok(balance_of(view, self.underlying, self.address)?
            + invested_value(view, self.address, &steps)?)
    }

    /// Value per share excluding deposits still waiting for shares
    pub fn value_per_share(&self, view: &dyn LedgerView, ctx: &RouterContext<'_>) -> Result<U256> {
        let steps = self.current_steps(ctx)?;
        let value = self.settled_value(view, &steps, &self.book.queue)?;
        Ok(value_per_share(value, self.book.position.shares_outstanding))
    }

    // ---------- User flows ----------

    /// Transfer `amount` into the vault; shares are issued at the next rebalance
    pub fn user_deposit(
        &mut self,
        ledger: &mut SimLedger,
        user: Address,
        amount: U256,
    ) -> Result<BatchReceipt> {
        self.ensure_accepting_deposits()?;
        let transfer = self.transfer_in(amount);
        let receipt = ledger.execute_batch(user, &vec![transfer].into())?;
        self.book.queue.push_deposit(user, amount);
        info!("📥 Queued deposit of {} from {}", amount, user);
        Ok(receipt)
    }

    /// Debit `shares` now; underlying is paid out at the next rebalance
    pub fn user_withdraw(&mut self, user: Address, shares: U256) -> Result<()> {
        self.ensure_not_paused()?;
        self.book.debit_shares(user, shares)?;
        self.book.queue.push_withdrawal(user, shares);
        info!("📤 Queued withdrawal of {} shares for {}", shares, user);
        Ok(())
    }

    /// Deposit and rebalance in one atomic batch
    pub fn user_deposit_rebalance(
        &mut self,
        ledger: &mut SimLedger,
        ctx: &RouterContext<'_>,
        user: Address,
        amount: U256,
    ) -> Result<RebalanceReport> {
        self.ensure_accepting_deposits()?;
        self.run(ledger, ctx, Intent::Deposit { user, amount })
    }

    /// Withdraw and rebalance in one atomic batch
    pub fn user_withdraw_rebalance(
        &mut self,
        ledger: &mut SimLedger,
        ctx: &RouterContext<'_>,
        user: Address,
        shares: U256,
    ) -> Result<RebalanceReport> {
        self.ensure_not_paused()?;
        self.run(ledger, ctx, Intent::Withdraw { user, shares })
    }

    // ---------- Operator / governance ----------

    pub fn rebalance(
        &mut self,
        ledger: &mut SimLedger,
        ctx: &RouterContext<'_>,
        caller: Address,
    ) -> Result<RebalanceReport> {
        ctx.governance.require_role(caller, Role::Operator)?;
        self.run(ledger, ctx, Intent::Rebalance)
    }

    /// Unwind to idle for good. Deposits are refused afterwards; queued and
    /// new withdrawals still settle on later rebalances.
    pub fn discontinue(
        &mut self,
        ledger: &mut SimLedger,
        ctx: &RouterContext<'_>,
        caller: Address,
    ) -> Result<RebalanceReport> {
        ctx.governance.require_role(caller, Role::Governance)?;
        let was = std::mem::replace(&mut self.discontinued, true);
        let report = self.run(ledger, ctx, Intent::Rebalance);
        if report.is_err() {
            self.discontinued = was;
        } else {
            warn!("🛑 Vault {} discontinued", self.address);
        }
        report
    }

    pub fn set_paused(
        &mut self,
        governance: &GovernanceStore,
        caller: Address,
        paused: bool,
    ) -> Result<()> {
        governance.require_role(caller, Role::Governance)?;
        if self.paused != paused {
            self.paused = paused;
            info!("⏸️  Vault {} paused = {}", self.address, paused);
        }
        Ok(())
    }

    /// Hand the accrued gas reimbursement to the operator and reset it
    pub fn settle_gas_owed(&mut self, governance: &GovernanceStore, caller: Address) -> Result<U256> {
        governance.require_role(caller, Role::Operator)?;
        let owed = std::mem::take(&mut self.book.position.gas_owed_to_operator);
        info!("⛽ Settled {} wei of gas owed to {}", owed, caller);
        Ok(owed)
    }

    // ---------- Pipeline ----------

    fn run(
        &mut self,
        ledger: &mut SimLedger,
        ctx: &RouterContext<'_>,
        intent: Intent,
    ) -> Result<RebalanceReport> {
        let profile = ctx.governance.risk_profile(self.risk_profile)?;
        let previous = self.book.position.current_strategy_hash;
        let current = self.current_steps(ctx)?;

        let mut next = self.book.clone();
        let mut session = ledger.begin();

        let value_before = self.settled_value(&session, &current, &next.queue)?;
        let price = value_per_share(value_before, next.position.shares_outstanding);
        debug!("Vault {} value {} ({} per share)", self.address, value_before, price);

        match intent {
            Intent::Rebalance => {}
            Intent::Deposit { user, amount } => {
                session.execute(user, &[self.transfer_in(amount)])?;
                next.queue.push_deposit(user, amount);
            }
            Intent::Withdraw { user, shares } => {
                next.debit_shares(user, shares)?;
                next.queue.push_withdrawal(user, shares);
            }
        }

        self.unwind(&mut session, ctx, &current)?;
        let (deposits_settled, withdrawals_settled) = self.settle(&mut session, &mut next, price)?;

        let target = if self.discontinued {
            None
        } else {
            ctx.selector.select(profile, self.tokens_hash)
        };
        let target_steps = match target {
            Some(hash) => self.resolve(ctx, hash)?,
            None => Vec::new(),
        };
        self.invest(&mut session, ctx, &target_steps)?;

        let total_value = balance_of(&session, self.underlying, self.address)?
            + invested_value(&session, self.address, &target_steps)?;
        let value_per_share = value_per_share(total_value, next.position.shares_outstanding);

        let receipt = session.commit()?;

        next.position.current_strategy_hash = target;
        let anomaly = self.observe(&mut next.position, value_per_share, target, receipt.timestamp);
        let gas_charged = U256::from(receipt.instruction_count())
            * U256::from(self.gas_per_instruction)
            * self.gas_price_wei;
        next.position.gas_owed_to_operator += gas_charged;
        self.book = next;

        info!(
            "🔄 Vault {} rebalanced: {} -> {} ({} instructions, {} per share)",
            self.address,
            strategy_label(previous),
            strategy_label(target),
            receipt.instruction_count(),
            value_per_share
        );

        Ok(RebalanceReport {
            previous_strategy: previous,
            strategy: target,
            receipt,
            total_value,
            value_per_share,
            deposits_settled,
            withdrawals_settled,
            gas_charged,
            anomaly,
        })
    }

    fn unwind(
        &self,
        session: &mut Session<'_>,
        ctx: &RouterContext<'_>,
        steps: &[ResolvedStep<'_>],
    ) -> Result<()> {
        let holder = self.address;
        if let Some(last) = steps.last() {
            if stakes(last) {
                let codes = last.adapter.harvest_all(&*session, holder, ctx.harvester)?;
                session.execute(holder, &codes)?;
                let codes = last.adapter.unstake_all(&*session, holder)?;
                session.execute(holder, &codes)?;
            }
        }

        for resolved in steps.iter().rev() {
            let adapter = resolved.adapter;
            if resolved.step.is_borrow {
                let asset = resolved.step.output_token;
                let codes = adapter.repay_and_withdraw_all(&*session, holder, asset)?;
                session.execute(holder, &codes)?;
                // Whatever the later steps earned beyond the debt
                let surplus = balance_of(&*session, asset, holder)?;
                if !surplus.is_zero() {
                    let codes = ctx.harvester.swap_codes(
                        &*session,
                        holder,
                        asset,
                        adapter.underlying(),
                        surplus,
                    )?;
                    session.execute(holder, &codes)?;
                }
            } else {
                let codes = adapter.withdraw_all(&*session, holder)?;
                session.execute(holder, &codes)?;
            }
        }
        Ok(())
    }

    fn invest(
        &self,
        session: &mut Session<'_>,
        ctx: &RouterContext<'_>,
        steps: &[ResolvedStep<'_>],
    ) -> Result<()> {
        let holder = self.address;
        let limits = ctx.governance.limits();
        for resolved in steps {
            let codes = resolved.adapter.deposit_all(&*session, limits, holder)?;
            session.execute(holder, &codes)?;
            if resolved.step.is_borrow {
                let codes =
                    resolved
                        .adapter
                        .borrow_all(&*session, holder, resolved.step.output_token)?;
                session.execute(holder, &codes)?;
            }
        }
        if let Some(last) = steps.last() {
            if stakes(last) {
                let codes = last.adapter.stake_all(&*session, holder)?;
                session.execute(holder, &codes)?;
            }
        }
        Ok(())
    }

    /// Pay queued withdrawals, then issue shares for queued deposits, both at
    /// `price`. When idle underlying (net of queued deposits) falls short of
    /// what the withdrawals are owed, every withdrawal takes the same haircut.
    fn settle(
        &self,
        session: &mut Session<'_>,
        next: &mut VaultBook,
        price: U256,
    ) -> Result<(usize, usize)> {
        let (deposits, withdrawals) = next.queue.take();
        let pending = deposits.iter().fold(U256::ZERO, |acc, d| acc + d.amount);

        let owed: Vec<U256> = withdrawals.iter().map(|w| w.shares * price / WAD).collect();
        let total_owed = owed.iter().fold(U256::ZERO, |acc, o| acc + *o);
        let available =
            balance_of(&*session, self.underlying, self.address)?.saturating_sub(pending);
        let short = total_owed > available;
        if short {
            warn!(
                "Withdrawals owed {} but only {} idle; paying pro rata",
                total_owed, available
            );
        }

        for (withdrawal, owed) in withdrawals.iter().zip(owed) {
            let amount = if short {
                owed * available / total_owed
            } else {
                owed
            };
            if !amount.is_zero() {
                let transfer = Instruction::call(
                    self.underlying,
                    IERC20::transferCall {
                        to: withdrawal.user,
                        amount,
                    },
                );
                session.execute(self.address, &[transfer])?;
            }
            next.position.shares_outstanding =
                next.position.shares_outstanding.saturating_sub(withdrawal.shares);
        }

        for deposit in &deposits {
            let outstanding = next.position.shares_outstanding;
            let shares = if outstanding.is_zero() {
                deposit.amount
            } else if price.is_zero() {
                return Err(RouterError::WorthlessShares {
                    shares: outstanding.to_string(),
                });
            } else {
                deposit.amount * WAD / price
            };
            *next.shares.entry(deposit.user).or_default() += shares;
            next.position.shares_outstanding += shares;
        }

        Ok((deposits.len(), withdrawals.len()))
    }

    /// Record the new observation; flag it when it moved too far
    fn observe(
        &mut self,
        position: &mut VaultPosition,
        value_per_share: U256,
        strategy: Option<B256>,
        ledger_timestamp: u64,
    ) -> Option<AnomalyRecord> {
        if position.shares_outstanding.is_zero() {
            position.last_value_per_share = U256::ZERO;
            return None;
        }
        let previous = std::mem::replace(&mut position.last_value_per_share, value_per_share);
        let jump = jump_bps(previous, value_per_share);
        if previous.is_zero() || jump <= self.max_value_jump_bps {
            return None;
        }

        warn!(
            "⚠️  Vault {} value per share moved {} bps ({} -> {})",
            self.address, jump, previous, value_per_share
        );
        let record = AnomalyRecord {
            timestamp: Utc::now(),
            vault: self.address.to_string(),
            strategy: strategy.map(|s| s.to_string()),
            previous_value_per_share: previous.to_string(),
            value_per_share: value_per_share.to_string(),
            jump_bps: jump,
            ledger_timestamp,
        };
        if let Some(path) = &self.anomaly_log_path {
            if let Err(e) = record.append_to_file(path) {
                warn!("Failed to write anomaly log {}: {}", path.display(), e);
            }
        }
        self.anomalies.push(record.clone());
        Some(record)
    }

    // ---------- Helpers ----------

    fn current_steps<'c>(&self, ctx: &RouterContext<'c>) -> Result<Vec<ResolvedStep<'c>>> {
        match self.book.position.current_strategy_hash {
            Some(hash) => self.resolve(ctx, hash),
            None => Ok(Vec::new()),
        }
    }

    /// Bind each step to its adapter and check the token chain
    fn resolve<'c>(&self, ctx: &RouterContext<'c>, hash: B256) -> Result<Vec<ResolvedStep<'c>>> {
        let adapters: &'c AdapterSet = ctx.adapters;
        let strategy = ctx.governance.catalog().get_strategy(&hash)?;
        if strategy.tokens_hash != self.tokens_hash {
            return Err(RouterError::InvalidStep {
                index: 0,
                reason: "strategy belongs to another token set",
            });
        }

        let mut input = self.underlying;
        let mut resolved = Vec::with_capacity(strategy.steps.len());
        for (index, step) in strategy.steps.iter().enumerate() {
            let adapter = adapters.get(&step.pool)?;
            if adapter.underlying() != input {
                return Err(RouterError::InvalidStep {
                    index,
                    reason: "step input is not the venue's underlying",
                });
            }
            if step.is_borrow && !adapter.can_borrow() {
                return Err(RouterError::InvalidStep {
                    index,
                    reason: "venue cannot borrow",
                });
            }
            if !step.is_borrow && step.output_token != adapter.liquidity_token() {
                return Err(RouterError::InvalidStep {
                    index,
                    reason: "output is not the venue's receipt token",
                });
            }
            input = step.output_token;
            resolved.push(ResolvedStep {
                step: step.clone(),
                adapter,
            });
        }
        Ok(resolved)
    }

    /// Total value minus deposits that have not been issued shares yet
    fn settled_value(
        &self,
        view: &dyn LedgerView,
        steps: &[ResolvedStep<'_>],
        queue: &PendingQueue,
    ) -> Result<U256> {
        let value = balance_of(view, self.underlying, self.address)?
            + invested_value(view, self.address, steps)?;
        Ok(value.saturating_sub(queue.deposit_total()))
    }

    fn transfer_in(&self, amount: U256) -> Instruction {
        Instruction::call(
            self.underlying,
            IERC20::transferCall {
                to: self.address,
                amount,
            },
        )
    }

    fn ensure_not_paused(&self) -> Result<()> {
        if self.paused {
            Err(RouterError::Paused)
        } else {
            Ok(())
        }
    }

    fn ensure_accepting_deposits(&self) -> Result<()> {
        if self.discontinued {
            return Err(RouterError::Discontinued);
        }
        self.ensure_not_paused()
    }
}

fn stakes(resolved: &ResolvedStep<'_>) -> bool {
    !resolved.step.is_borrow && resolved.adapter.can_stake()
}

fn strategy_label(strategy: Option<B256>) -> String {
    strategy
        .map(|s| s.to_string())
        .unwrap_or_else(|| "idle".to_string())
}

/// Underlying value of a strategy position, walked from the last step back.
///
/// Each step converts what the later steps are worth (plus any idle balance
/// of its own output) into its input token. Borrow steps contribute their net
/// collateral and convert the borrowed asset's value at the venue's prices.
fn invested_value(
    view: &dyn LedgerView,
    holder: Address,
    steps: &[ResolvedStep<'_>],
) -> Result<U256> {
    let Some(last) = steps.last() else {
        return Ok(U256::ZERO);
    };

    let mut carry = balance_of(view, last.step.output_token, holder)?;
    if stakes(last) {
        carry += last.adapter.staked_balance(view, holder)?;
    }

    for (index, resolved) in steps.iter().enumerate().rev() {
        let adapter = resolved.adapter;
        carry = if resolved.step.is_borrow {
            let asset = resolved.step.output_token;
            adapter.borrow_position_value(view, holder, asset)?
                + adapter.borrowed_in_underlying(view, asset, carry)?
        } else if carry.is_zero() {
            U256::ZERO
        } else {
            adapter.amount_in_underlying(view, carry)?
        };
        if index > 0 {
            carry += balance_of(view, steps[index - 1].step.output_token, holder)?;
        }
    }
    Ok(carry)
}

// ============================================
// TESTS
// ============================================
