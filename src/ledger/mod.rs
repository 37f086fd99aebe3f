//! Ledger: Instructions, Batches and Atomic Sessions
//!
//! Adapters emit ordered `(target, payload)` instructions. A batch of them runs
//! inside a [`Session`]: every instruction executes against a scratch copy of
//! the world, and the scratch only replaces the ledger state on
//! [`Session::commit`]. Dropping a session (or any failing instruction) leaves
//! the ledger untouched.
//!
//! The simulated world hosts ERC20 tokens and one contract per venue family
//! speaking that family's real ABI, so generated calldata is executed exactly
//! as encoded.

mod token;
pub mod venues;

pub use token::{Erc20, TokenBook};
pub use venues::Venue;

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, trace};

use crate::abi::IERC20;
use crate::error::{Result, RouterError};

// ============================================
// INSTRUCTIONS
// ============================================

/// One opaque call: the target contract and its ABI-encoded payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub target: Address,
    pub payload: Bytes,
}

impl Instruction {
    /// Encode a typed call against `target`
    pub fn call<C: SolCall>(target: Address, call: C) -> Self {
        Self {
            target,
            payload: Bytes::from(call.abi_encode()),
        }
    }

    pub fn selector(&self) -> Option<[u8; 4]> {
        self.payload.get(..4).and_then(|s| s.try_into().ok())
    }

    /// True when this instruction is a call to `C` on any target
    pub fn is<C: SolCall>(&self) -> bool {
        self.selector() == Some(C::SELECTOR)
    }

    /// Decode the payload as a typed call
    pub fn decode<C: SolCall>(&self) -> Result<C> {
        C::abi_decode(&self.payload).map_err(RouterError::from)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <- 0x{}", self.target, hex::encode(&self.payload))
    }
}

/// Ordered instruction list executed as one unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    instructions: Vec<Instruction>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    pub fn extend(&mut self, instructions: impl IntoIterator<Item = Instruction>) {
        self.instructions.extend(instructions);
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }
}

impl From<Vec<Instruction>> for Batch {
    fn from(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }
}

/// What a committed session executed
#[derive(Debug, Clone)]
pub struct BatchReceipt {
    pub batch: Batch,
    pub timestamp: u64,
}

impl BatchReceipt {
    pub fn instruction_count(&self) -> usize {
        self.batch.len()
    }
}

/// Revert reason raised by a simulated contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revert(pub String);

impl Revert {
    pub fn new(reason: impl Into<String>) -> Self {
        Revert(reason.into())
    }
}

impl fmt::Display for Revert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub type CallResult = std::result::Result<Bytes, Revert>;

// ============================================
// READ VIEW
// ============================================

/// Read-only access to ledger state, as seen by code generation and valuation
pub trait LedgerView {
    /// Whether any contract is deployed at `account`
    fn has_code(&self, account: Address) -> bool;

    /// Execute a call without persisting its effects
    fn static_call(&self, target: Address, input: &[u8]) -> CallResult;

    /// Current ledger timestamp (seconds)
    fn timestamp(&self) -> u64;
}

/// Typed view call. Fails with `VenueUnavailable` when `target` has no code.
pub fn read<C: SolCall>(view: &dyn LedgerView, target: Address, call: &C) -> Result<C::Return> {
    if !view.has_code(target) {
        return Err(RouterError::VenueUnavailable(target));
    }
    let output = view
        .static_call(target, &call.abi_encode())
        .map_err(|revert| RouterError::CallFailed {
            target,
            reason: revert.0,
        })?;
    Ok(C::abi_decode_returns(&output)?)
}

/// ERC20 balance of `holder`
pub fn balance_of(view: &dyn LedgerView, token: Address, holder: Address) -> Result<U256> {
    read(view, token, &IERC20::balanceOfCall { account: holder })
}

// ============================================
// SIMULATED WORLD
// ============================================

/// Everything a simulated contract can touch besides itself
#[derive(Debug, Clone, Default)]
pub struct Env {
    pub tokens: TokenBook,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Default)]
pub struct World {
    env: Env,
    venues: HashMap<Address, Venue>,
}

impl World {
    /// Dispatch a call. Venue logic runs first; selectors a venue does not
    /// handle fall through to the ERC20 state deployed at the same address.
    pub fn call(&mut self, caller: Address, target: Address, input: &[u8]) -> CallResult {
        let mut is_venue = false;
        if let Some(mut venue) = self.venues.remove(&target) {
            is_venue = true;
            let outcome = venue.call(&mut self.env, target, caller, input);
            self.venues.insert(target, venue);
            if let Some(output) = outcome? {
                return Ok(output);
            }
        }

        if self.env.tokens.contains(&target) {
            return token::dispatch(&mut self.env.tokens, target, caller, input);
        }

        if is_venue {
            Err(Revert::new("unknown selector"))
        } else {
            Err(Revert::new(format!("no code at {target}")))
        }
    }

    fn has_code(&self, account: Address) -> bool {
        self.venues.contains_key(&account) || self.env.tokens.contains(&account)
    }
}

/// In-memory ledger hosting simulated tokens and venues
#[derive(Debug, Clone, Default)]
pub struct SimLedger {
    world: World,
    batches_committed: u64,
}

impl SimLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deploy an ERC20 at `address`
    pub fn deploy_token(&mut self, address: Address, token: Erc20) {
        self.world.env.tokens.deploy(address, token);
    }

    /// Deploy a venue contract at `address`
    pub fn deploy_venue(&mut self, address: Address, venue: Venue) {
        self.world.venues.insert(address, venue);
    }

    /// Remove whatever is deployed at `address`
    pub fn destroy(&mut self, address: Address) {
        self.world.venues.remove(&address);
        self.world.env.tokens.remove(&address);
    }

    /// Mint tokens out of thin air (test funding, simulated yield)
    pub fn mint(&mut self, token: Address, to: Address, amount: U256) -> Result<()> {
        self.world
            .env
            .tokens
            .mint(token, to, amount)
            .map_err(|revert| RouterError::CallFailed {
                target: token,
                reason: revert.0,
            })
    }

    pub fn token_balance(&self, token: Address, holder: Address) -> U256 {
        self.world.env.tokens.balance_of(token, holder)
    }

    pub fn venue(&self, address: Address) -> Option<&Venue> {
        self.world.venues.get(&address)
    }

    /// Direct access to a venue's state (simulating external state movement)
    pub fn venue_mut(&mut self, address: Address) -> Option<&mut Venue> {
        self.world.venues.get_mut(&address)
    }

    pub fn advance_time(&mut self, seconds: u64) {
        self.world.env.timestamp += seconds;
    }

    pub fn set_timestamp(&mut self, timestamp: u64) {
        self.world.env.timestamp = timestamp;
    }

    pub fn batches_committed(&self) -> u64 {
        self.batches_committed
    }

    /// Open an atomic session
    pub fn begin(&mut self) -> Session<'_> {
        let scratch = self.world.clone();
        Session {
            ledger: self,
            scratch,
            executed: Batch::new(),
            poisoned: false,
        }
    }

    /// Execute a whole batch as `caller`; all-or-nothing
    pub fn execute_batch(&mut self, caller: Address, batch: &Batch) -> Result<BatchReceipt> {
        let mut session = self.begin();
        session.execute(caller, batch.instructions())?;
        session.commit()
    }
}

impl LedgerView for SimLedger {
    fn has_code(&self, account: Address) -> bool {
        self.world.has_code(account)
    }

    fn static_call(&self, target: Address, input: &[u8]) -> CallResult {
        self.world.clone().call(Address::ZERO, target, input)
    }

    fn timestamp(&self) -> u64 {
        self.world.env.timestamp
    }
}

// ============================================
// SESSION
// ============================================

/// Copy-on-write transaction over a [`SimLedger`]
///
/// Reads through the session observe every instruction executed so far, so
/// later steps generate codes against the intermediate state.
pub struct Session<'a> {
    ledger: &'a mut SimLedger,
    scratch: World,
    executed: Batch,
    poisoned: bool,
}

impl Session<'_> {
    /// Execute instructions in order as `caller`
    pub fn execute(&mut self, caller: Address, instructions: &[Instruction]) -> Result<()> {
        if self.poisoned {
            return Err(RouterError::BatchAborted {
                index: self.executed.len(),
                target: Address::ZERO,
                reason: "session already aborted".to_string(),
            });
        }

        for instruction in instructions {
            trace!("exec {}", instruction);
            if let Err(revert) = self
                .scratch
                .call(caller, instruction.target, &instruction.payload)
            {
                self.poisoned = true;
                debug!(
                    "Batch aborted at #{} ({}): {}",
                    self.executed.len(),
                    instruction.target,
                    revert
                );
                return Err(RouterError::BatchAborted {
                    index: self.executed.len(),
                    target: instruction.target,
                    reason: revert.0,
                });
            }
            self.executed.push(instruction.clone());
        }
        Ok(())
    }

    /// Persist the scratch state. Fails if any instruction reverted.
    pub fn commit(self) -> Result<BatchReceipt> {
        if self.poisoned {
            return Err(RouterError::BatchAborted {
                index: self.executed.len(),
                target: Address::ZERO,
                reason: "cannot commit an aborted session".to_string(),
            });
        }
        let timestamp = self.scratch.env.timestamp;
        self.ledger.world = self.scratch;
        self.ledger.batches_committed += 1;
        Ok(BatchReceipt {
            batch: self.executed,
            timestamp,
        })
    }
}

impl LedgerView for Session<'_> {
    fn has_code(&self, account: Address) -> bool {
        self.scratch.has_code(account)
    }

    fn static_call(&self, target: Address, input: &[u8]) -> CallResult {
        self.scratch.clone().call(Address::ZERO, target, input)
    }

    fn timestamp(&self) -> u64 {
        self.scratch.env.timestamp
    }
}
