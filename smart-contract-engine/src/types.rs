//! Core data types of the engine: chain-native values, the contract frame
//! subject, termination classification and the two error tiers.

use derive_more::{AsRef, From, Into};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Size in bytes of an account address.
pub const ADDRESS_SIZE: usize = 20;

/// Size in bytes of a storage word or hash.
pub const WORD_SIZE: usize = 32;

/// Size in bytes of a value amount (balances, call values, gas prices).
pub const VALUE_SIZE: usize = 16;

/// A 20-byte account address in the chain's canonical big-endian order.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, From, Into, AsRef, Serialize,
    Deserialize,
)]
pub struct Address(pub [u8; ADDRESS_SIZE]);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { fmt::Display::fmt(self, f) }
}

/// A 32-byte storage word or hash in the chain's canonical big-endian order.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, From, Into, AsRef, Serialize,
    Deserialize,
)]
pub struct Word(pub [u8; WORD_SIZE]);

impl Word {
    pub const ZERO: Word = Word([0u8; WORD_SIZE]);

    pub fn is_zero(&self) -> bool { self.0 == [0u8; WORD_SIZE] }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { fmt::Display::fmt(self, f) }
}

/// A call frame's subject: the code being executed together with the identity
/// and resources of the invocation. Gas is decremented only through the gas
/// meter; on frame exit the remaining balance is refunded to the caller or
/// forfeited, depending on the outcome.
#[derive(Clone, Debug)]
pub struct Contract {
    /// The stored code this frame executes, including its framing header.
    pub code:        Vec<u8>,
    /// Address the frame executes as. Storage, balance and log accesses are
    /// keyed by it. For code- and delegate-calls this stays the caller's own
    /// address.
    pub address:     Address,
    pub caller:      Address,
    /// Value transferred with the invocation.
    pub value:       u128,
    /// Input bytes of the invocation.
    pub input:       Vec<u8>,
    /// Remaining gas.
    pub gas:         u64,
    /// Whether the frame was entered through a delegate call and therefore
    /// has no independent value semantics.
    pub is_delegate: bool,
}

impl Contract {
    pub fn new(code: Vec<u8>, address: Address, caller: Address, value: u128, gas: u64) -> Self {
        Self {
            code,
            address,
            caller,
            value,
            input: Vec::new(),
            gas,
            is_delegate: false,
        }
    }
}

/// How a frame's invocation ended. A frame that returns without an explicit
/// signal keeps the default, which is treated as `Invalid`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TerminateType {
    /// Explicit successful completion via `finish`.
    Finish,
    /// Explicit state-reverting completion via `revert`.
    Revert,
    /// The contract destroyed itself.
    Suicide,
    /// Fatal abort, or no explicit signal at all.
    #[default]
    Invalid,
}

/// The four nested-call variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    Call,
    CallCode,
    DelegateCall,
    StaticCall,
}

/// Result codes surfaced to contract code from `call`/`create`.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
pub enum CallResult {
    Success = 0,
    Failure = 1,
    Revert  = 2,
}

/// Structural failures detected before any code executes. These charge no gas
/// and touch no state; they surface as load errors to the enclosing
/// state-transition engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModuleError {
    #[error("not a valid module")]
    NotAValidModule,
    #[error("a contract must not declare a start function")]
    StartFunctionNotAllowed,
    #[error("expected exactly 2 exports, module declares {0}")]
    UnexpectedExportCount(u32),
    #[error("the entry point must be a function with no parameters and no results")]
    InvalidEntryPointSignature,
    #[error("missing linear memory export")]
    MissingMemoryExport,
    #[error("unknown host function {0}")]
    UnknownHostFunction(String),
    #[error("unknown import module {0}")]
    UnknownImportModule(String),
}

/// Fatal in-frame faults. Any of these aborts the current frame with
/// [`TerminateType::Invalid`] and forfeits its remaining gas; ancestors
/// observe the failure result code and revert their own snapshots.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("out of gas")]
    OutOfGas,
    #[error("no active call frame")]
    NoActiveFrame,
    #[error("state modification in read-only frame")]
    StaticModeViolation,
    #[error("log topic count {0} out of range")]
    InvalidTopicCount(i32),
    #[error("memory access out of bounds")]
    MemoryAccessOutOfBounds,
    #[error("call depth exceeded")]
    CallDepthExceeded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_termination_is_invalid() {
        assert_eq!(TerminateType::default(), TerminateType::Invalid);
    }

    #[test]
    fn call_result_codes() {
        assert_eq!(i32::from(CallResult::Success), 0);
        assert_eq!(i32::from(CallResult::Failure), 1);
        assert_eq!(i32::from(CallResult::Revert), 2);
    }

    #[test]
    fn word_zero_check() {
        assert!(Word::ZERO.is_zero());
        let mut w = Word::ZERO;
        w.0[31] = 1;
        assert!(!w.is_zero());
    }
}
