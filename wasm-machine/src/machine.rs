//! Interface of the abstract machine that runs decoded modules.

use crate::types::{FuncIndex, Module, ValueKind};
use anyhow::bail;
use derive_more::From;

/// Result of execution. Runtime exceptions (traps, illegal memory accesses,
/// unrecovered panics inside the machine) are returned as `Err(_)`.
pub type RunResult<A> = anyhow::Result<A>;

/// A typed machine value. The values are not inherently signed or unsigned;
/// we choose signed integers as the representation type.
#[derive(Debug, Clone, Copy, PartialEq, From)]
pub enum Value {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::I32(_) => ValueKind::I32,
            Value::I64(_) => ValueKind::I64,
            Value::F32(_) => ValueKind::F32,
            Value::F64(_) => ValueKind::F64,
        }
    }
}

/// What the machine should do after a host call returns.
#[derive(Debug, Clone, PartialEq)]
pub enum HostOutcome {
    /// Continue execution. The value, if any, is the host function's result
    /// and must match its declared signature.
    Resume(Option<Value>),
    /// Stop executing the current module immediately. No further instructions
    /// of this invocation run. This is not an error; the host has captured
    /// whatever outcome it needs.
    Halt,
}

/// The host that processes imported functions. `I` is the resolved import
/// type produced by the host's own linking step.
pub trait Host<I> {
    /// Call the host function `f`, giving it access to the machine's linear
    /// memory and the arguments the module passed. `Err(_)` signifies a trap;
    /// the machine must abandon execution and report it from
    /// [`Machine::invoke`].
    fn call(&mut self, f: &I, memory: &mut Vec<u8>, args: &[Value]) -> RunResult<HostOutcome>;
}

/// An instantiated module, ready to execute. The machine owns the linear
/// memory and the value stack; the host sees memory only for the duration of
/// each host call.
pub trait Machine<I> {
    /// Run the function at `entry` in the function index space to completion.
    /// `Ok(())` covers both ordinary completion and a host-requested
    /// [`HostOutcome::Halt`].
    fn invoke(&mut self, host: &mut dyn Host<I>, entry: FuncIndex) -> RunResult<()>;
}

/// Decoder and instantiation front-end of a machine implementation.
///
/// `decode` produces the structural view of a module binary (without the
/// framing header having been inspected — callers reject malformed framing
/// first). `instantiate` binds each of the module's imports to the resolved
/// host entry at the same position.
pub trait ModuleLoader<I> {
    type Machine: Machine<I>;

    fn decode(&self, bytes: &[u8]) -> RunResult<Module>;

    fn instantiate(&self, module: &Module, imports: Vec<I>) -> RunResult<Self::Machine>;
}

/// A host which traps on any function call. Useful for driving modules that
/// must not reach the host at all.
pub struct TrapHost;

impl<I> Host<I> for TrapHost {
    fn call(&mut self, _f: &I, _memory: &mut Vec<u8>, _args: &[Value]) -> RunResult<HostOutcome> {
        bail!("TrapHost traps on all host calls.")
    }
}
