//! Gas schedule and structural limits of the runtime.

/// Maximum number of nested call frames. The check happens before a callee
/// frame is constructed.
pub const MAX_CALL_DEPTH: usize = 1024;

/// Number of recent blocks whose hash `getBlockHash` may return.
pub const BLOCK_HASH_WINDOW: u64 = 256;

/// The caller of `create` keeps `1/CREATE_GAS_RESERVE_DIVISOR` of its
/// remaining gas unconditionally; the rest is forwarded to the new contract.
pub const CREATE_GAS_RESERVE_DIVISOR: u64 = 64;

/// Cost of the trivial context reads (own address, caller, call value, block
/// quantities, buffer sizes).
pub const BASE_GAS: u64 = 2;

/// Cost of a balance lookup for an arbitrary account.
pub const BALANCE_GAS: u64 = 400;

/// Cost of a historical block hash lookup. Charged whether or not the
/// requested block is within [`BLOCK_HASH_WINDOW`].
pub const BLOCK_HASH_GAS: u64 = 20;

/// Cost of reading a storage word.
pub const STORAGE_LOAD_GAS: u64 = 200;

/// Cost of writing a storage word whose previous value was zero and whose new
/// value is not.
pub const STORAGE_SET_GAS: u64 = 20_000;

/// Cost of overwriting a storage word without changing its zero-ness.
pub const STORAGE_RESET_GAS: u64 = 5_000;

/// Cost of clearing a nonzero storage word. Refunds for clearing are handled
/// at the state-transition layer, not here.
pub const STORAGE_CLEAR_GAS: u64 = 5_000;

/// Base cost of a log record.
pub const LOG_GAS: u64 = 375;

/// Cost per log topic.
pub const LOG_TOPIC_GAS: u64 = 375;

/// Cost per byte of log payload.
pub const LOG_DATA_GAS: u64 = 8;

/// Base cost of every call variant.
pub const CALL_GAS: u64 = 700;

/// Surcharge for a call transferring a nonzero value.
pub const CALL_VALUE_GAS: u64 = 9_000;

/// Base cost of contract creation.
pub const CREATE_GAS: u64 = 32_000;

/// Base cost of self-destructing.
pub const SELF_DESTRUCT_GAS: u64 = 5_000;

/// Surcharge when an operation brings a previously non-existent account into
/// existence (self-destruct to a fresh beneficiary).
pub const NEW_ACCOUNT_GAS: u64 = 25_000;

/// Cost of touching another account's code (size query or copy base).
pub const EXTERNAL_CODE_GAS: u64 = 700;

/// Base cost of a buffer copy.
pub const COPY_BASE_GAS: u64 = 3;

/// Cost per 32-byte word of a buffer copy.
pub const COPY_WORD_GAS: u64 = 3;

/// Cost of copying `len` bytes between a host buffer and linear memory.
#[inline(always)]
pub fn copy_cost(len: u32) -> u64 {
    COPY_BASE_GAS + COPY_WORD_GAS * ((u64::from(len) + 31) / 32)
}
