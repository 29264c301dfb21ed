//! Collaborator interfaces of the engine: the state database, the block and
//! transaction context, and the account-creation primitive of the enclosing
//! state-transition engine. Reference implementations suitable for tests and
//! local tooling are provided at the bottom.

use crate::{
    types::{Address, Contract, TerminateType, Word},
    ExecResult,
};
use anyhow::bail;
use derive_more::{From, Into};
use std::collections::BTreeMap;
use tinyvec::ArrayVec;

/// An opaque checkpoint token issued by the state database. Reverting to it
/// undoes every mutation performed since it was issued, including those of
/// nested sub-calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq, From, Into)]
pub struct Snapshot(usize);

/// One ordered log record emitted by a contract.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    pub address:      Address,
    pub topics:       ArrayVec<[Word; 4]>,
    pub data:         Vec<u8>,
    pub block_height: u64,
}

/// The state database the engine mutates on behalf of contracts. All methods
/// are synchronous; lookups may be backed by out-of-process storage.
pub trait StateDb {
    fn get_balance(&self, address: &Address) -> u128;
    fn add_balance(&mut self, address: &Address, amount: u128);
    fn sub_balance(&mut self, address: &Address, amount: u128);

    fn get_code(&self, address: &Address) -> Vec<u8>;
    fn get_code_hash(&self, address: &Address) -> Word;

    fn get_state(&self, address: &Address, key: &Word) -> Word;
    fn set_state(&mut self, address: &Address, key: Word, value: Word);

    fn exists(&self, address: &Address) -> bool;
    fn create_account(&mut self, address: &Address);

    /// Mark the account destroyed and zero its balance. Returns whether the
    /// account was alive before the call.
    fn suicide(&mut self, address: &Address) -> bool;
    fn has_suicided(&self, address: &Address) -> bool;

    fn snapshot(&mut self) -> Snapshot;
    fn revert_to_snapshot(&mut self, snapshot: Snapshot);

    fn add_log(&mut self, log: LogEntry);
}

/// Block and transaction context supplied by the enclosing state-transition
/// engine. Value-transfer policy lives here so the engine never hard-codes
/// it.
pub trait ChainContext {
    fn block_height(&self) -> u64;
    /// Hash of the given historical block. Only consulted for heights the
    /// engine has already range-checked.
    fn block_hash(&self, number: u64) -> Word;
    fn coinbase(&self) -> Address;
    fn difficulty(&self) -> Word;
    fn gas_limit(&self) -> u64;
    fn gas_price(&self) -> u128;
    fn timestamp(&self) -> u64;
    fn origin(&self) -> Address;

    fn can_transfer(&self, state: &dyn StateDb, from: &Address, amount: u128) -> bool;
    fn transfer(&self, state: &mut dyn StateDb, from: &Address, to: &Address, amount: u128);
}

/// Outcome of the external account-creation primitive.
#[derive(Clone, Debug)]
pub struct CreateOutcome {
    /// Output produced by the initialization code.
    pub output:    Vec<u8>,
    /// Address of the newly created account.
    pub address:   Address,
    /// Gas remaining out of the forwarded budget.
    pub gas_left:  u64,
    /// How the initialization frame terminated.
    pub terminate: TerminateType,
}

/// The lower-level account-creation primitive of the state-transition engine.
/// It derives the new address, runs the initialization code and installs the
/// resulting code, snapshotting and reverting its own effects as needed.
pub trait AccountCreator {
    fn create(
        &mut self,
        state: &mut dyn StateDb,
        caller: &Contract,
        code: Vec<u8>,
        gas: u64,
        value: u128,
    ) -> ExecResult<CreateOutcome>;
}

#[derive(Clone, Debug, Default)]
struct Account {
    balance:  u128,
    code:     Vec<u8>,
    code_hash: Word,
    storage:  BTreeMap<Word, Word>,
    suicided: bool,
}

/// In-memory state database with clone-based snapshots. This backs the test
/// suites and local simulation tooling; it is not a production store.
#[derive(Clone, Debug, Default)]
pub struct MemoryStateDb {
    accounts:  BTreeMap<Address, Account>,
    logs:      Vec<LogEntry>,
    snapshots: Vec<(BTreeMap<Address, Account>, usize)>,
}

impl MemoryStateDb {
    pub fn new() -> Self { Self::default() }

    pub fn set_code(&mut self, address: &Address, code: Vec<u8>) {
        self.accounts.entry(*address).or_default().code = code;
    }

    pub fn set_code_hash(&mut self, address: &Address, hash: Word) {
        self.accounts.entry(*address).or_default().code_hash = hash;
    }

    pub fn set_balance(&mut self, address: &Address, balance: u128) {
        self.accounts.entry(*address).or_default().balance = balance;
    }

    pub fn logs(&self) -> &[LogEntry] { &self.logs }
}

impl StateDb for MemoryStateDb {
    fn get_balance(&self, address: &Address) -> u128 {
        self.accounts.get(address).map_or(0, |a| a.balance)
    }

    fn add_balance(&mut self, address: &Address, amount: u128) {
        let account = self.accounts.entry(*address).or_default();
        account.balance = account.balance.saturating_add(amount);
    }

    fn sub_balance(&mut self, address: &Address, amount: u128) {
        let account = self.accounts.entry(*address).or_default();
        account.balance = account.balance.saturating_sub(amount);
    }

    fn get_code(&self, address: &Address) -> Vec<u8> {
        self.accounts.get(address).map_or_else(Vec::new, |a| a.code.clone())
    }

    fn get_code_hash(&self, address: &Address) -> Word {
        self.accounts.get(address).map_or(Word::ZERO, |a| a.code_hash)
    }

    fn get_state(&self, address: &Address, key: &Word) -> Word {
        self.accounts
            .get(address)
            .and_then(|a| a.storage.get(key).copied())
            .unwrap_or(Word::ZERO)
    }

    fn set_state(&mut self, address: &Address, key: Word, value: Word) {
        self.accounts.entry(*address).or_default().storage.insert(key, value);
    }

    fn exists(&self, address: &Address) -> bool { self.accounts.contains_key(address) }

    fn create_account(&mut self, address: &Address) {
        self.accounts.entry(*address).or_default();
    }

    fn suicide(&mut self, address: &Address) -> bool {
        match self.accounts.get_mut(address) {
            Some(account) => {
                account.suicided = true;
                account.balance = 0;
                true
            }
            None => false,
        }
    }

    fn has_suicided(&self, address: &Address) -> bool {
        self.accounts.get(address).map_or(false, |a| a.suicided)
    }

    fn snapshot(&mut self) -> Snapshot {
        self.snapshots.push((self.accounts.clone(), self.logs.len()));
        Snapshot::from(self.snapshots.len() - 1)
    }

    fn revert_to_snapshot(&mut self, snapshot: Snapshot) {
        let index: usize = snapshot.into();
        if let Some((accounts, log_len)) = self.snapshots.get(index).cloned() {
            self.accounts = accounts;
            self.logs.truncate(log_len);
            self.snapshots.truncate(index);
        }
    }

    fn add_log(&mut self, log: LogEntry) { self.logs.push(log); }
}

/// Fixed chain context for tests and simulation.
#[derive(Clone, Debug, Default)]
pub struct TestChainContext {
    pub height:       u64,
    pub timestamp:    u64,
    pub coinbase:     Address,
    pub difficulty:   Word,
    pub gas_limit:    u64,
    pub gas_price:    u128,
    pub origin:       Address,
    pub block_hashes: BTreeMap<u64, Word>,
}

impl ChainContext for TestChainContext {
    fn block_height(&self) -> u64 { self.height }

    fn block_hash(&self, number: u64) -> Word {
        self.block_hashes.get(&number).copied().unwrap_or(Word::ZERO)
    }

    fn coinbase(&self) -> Address { self.coinbase }

    fn difficulty(&self) -> Word { self.difficulty }

    fn gas_limit(&self) -> u64 { self.gas_limit }

    fn gas_price(&self) -> u128 { self.gas_price }

    fn timestamp(&self) -> u64 { self.timestamp }

    fn origin(&self) -> Address { self.origin }

    fn can_transfer(&self, state: &dyn StateDb, from: &Address, amount: u128) -> bool {
        state.get_balance(from) >= amount
    }

    fn transfer(&self, state: &mut dyn StateDb, from: &Address, to: &Address, amount: u128) {
        if amount == 0 {
            return;
        }
        state.sub_balance(from, amount);
        state.add_balance(to, amount);
    }
}

/// An account creator that fails if it is ever reached. Useful in tests that
/// must not create contracts.
pub struct NoCreate;

impl AccountCreator for NoCreate {
    fn create(
        &mut self,
        _state: &mut dyn StateDb,
        _caller: &Contract,
        _code: Vec<u8>,
        _gas: u64,
        _value: u128,
    ) -> ExecResult<CreateOutcome> {
        bail!("account creation is not available in this configuration")
    }
}
