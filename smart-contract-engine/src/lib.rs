//! Gas-metered execution engine bridging Wasm-shaped contract modules to a
//! blockchain's account state.
//!
//! The engine sits between an off-the-shelf bytecode machine (behind the
//! traits of the `wasm-machine` crate) and the chain's state database. It
//! links contract imports against a fixed host-function registry, verifies
//! module structure, drives execution one frame at a time, and implements
//! the environment interface: balances, persistent storage, call/create
//! semantics, logging and cooperative termination, every operation paying
//! through a single gas meter.
//!
//! Nested calls recurse through the same interpreter instance; each nested
//! invocation gets its own frame with its own gas budget, read-only flag and
//! termination status, and state mutations are rolled back through state
//! database snapshots on every failing path.

pub mod constants;
mod eei;
mod interpreter;
pub mod linker;
pub mod memory;
pub mod registry;
pub mod state;
mod types;
pub mod validate;

#[cfg(test)]
pub(crate) mod testutils;

pub use interpreter::{Frame, FrameResult, Interpreter};
pub use linker::ResolvedImport;
pub use types::*;

/// Auxiliary result alias used throughout the engine.
pub type ExecResult<A> = anyhow::Result<A>;
