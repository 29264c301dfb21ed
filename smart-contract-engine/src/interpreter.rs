//! The execution-frame bridge: drives one bytecode module to completion and
//! translates machine outcomes plus frame termination into a result.
//!
//! Nested invocations are modelled as an explicit stack of frames, pushed on
//! entry and popped on exit, so the caller's execution state is restored on
//! every exit path by construction rather than by manual save/restore.

use crate::{
    constants::MAX_CALL_DEPTH,
    linker::{self, ResolvedImport},
    registry::{HostFunc, HostRegistry},
    state::{AccountCreator, ChainContext, StateDb},
    types::{Contract, ModuleError, RuntimeError, TerminateType},
    validate, ExecResult,
};
use anyhow::bail;
use wasm_machine::{
    has_valid_preamble,
    machine::{Host, HostOutcome, Machine, ModuleLoader, RunResult, Value},
};

/// One in-flight invocation of a contract's entry point.
#[derive(Debug)]
pub struct Frame {
    pub contract:    Contract,
    /// Outcome classification; stays at the default until an explicit signal
    /// or a fatal abort sets it.
    pub terminate:   TerminateType,
    /// Captured output of this frame, or, after a nested call returns, the
    /// callee's output.
    pub return_data: Vec<u8>,
    /// Whether state mutation is forbidden in this frame. Inherited by
    /// children and forced by static calls.
    pub read_only:   bool,
}

/// Result of driving one frame to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameResult {
    pub terminate:   TerminateType,
    pub return_data: Vec<u8>,
    /// Gas remaining in the frame. The caller decides whether it is refunded
    /// or forfeited based on `terminate`.
    pub gas_left:    u64,
}

/// The interpreter bridging contract modules to chain state. One instance
/// drives one call tree; nested calls recurse through [`Interpreter::run`]
/// on the same instance.
pub struct Interpreter<'a, L> {
    loader:             &'a L,
    pub(crate) state:   &'a mut dyn StateDb,
    pub(crate) chain:   &'a dyn ChainContext,
    pub(crate) creator: &'a mut dyn AccountCreator,
    registry:           HostRegistry,
    frames:             Vec<Frame>,
    debug:              bool,
}

impl<'a, L: ModuleLoader<ResolvedImport>> Interpreter<'a, L> {
    /// Create an interpreter. The host function registry is built and
    /// validated for duplicate names here, once.
    pub fn new(
        loader: &'a L,
        state: &'a mut dyn StateDb,
        chain: &'a dyn ChainContext,
        creator: &'a mut dyn AccountCreator,
    ) -> ExecResult<Self> {
        Ok(Self {
            loader,
            state,
            chain,
            creator,
            registry: HostRegistry::new()?,
            frames: Vec::new(),
            debug: false,
        })
    }

    /// Make the `debug` import module available to contracts.
    pub fn with_debug(mut self) -> Self {
        self.debug = true;
        self
    }

    pub fn debug_enabled(&self) -> bool { self.debug }

    /// Current recursion depth, i.e. the number of live frames.
    pub fn depth(&self) -> usize { self.frames.len() }

    pub(crate) fn frame(&self) -> ExecResult<&Frame> {
        Ok(self.frames.last().ok_or(RuntimeError::NoActiveFrame)?)
    }

    pub(crate) fn frame_mut(&mut self) -> ExecResult<&mut Frame> {
        Ok(self.frames.last_mut().ok_or(RuntimeError::NoActiveFrame)?)
    }

    /// The gas meter. Every host operation pays through here; once it fails
    /// the calling host function must not proceed.
    pub fn use_gas(&mut self, amount: u64) -> ExecResult<()> {
        let frame = self.frames.last_mut().ok_or(RuntimeError::NoActiveFrame)?;
        if amount > frame.contract.gas {
            frame.contract.gas = 0;
            frame.terminate = TerminateType::Invalid;
            bail!(RuntimeError::OutOfGas);
        }
        frame.contract.gas -= amount;
        Ok(())
    }

    /// Drive one invocation of `contract` with `input` to completion.
    ///
    /// An `Err` is either a load error ([`ModuleError`], nothing charged,
    /// nothing mutated) or a fatal in-frame fault ([`RuntimeError`] or a
    /// machine trap), after which the frame's gas is gone. Nested read-only
    /// mode is inherited from the calling frame.
    pub fn run(&mut self, contract: Contract, input: Vec<u8>) -> ExecResult<FrameResult> {
        let read_only = self.frames.last().map_or(false, |f| f.read_only);
        self.run_frame(contract, input, read_only)
    }

    pub(crate) fn run_frame(
        &mut self,
        mut contract: Contract,
        input: Vec<u8>,
        read_only: bool,
    ) -> ExecResult<FrameResult> {
        if self.frames.len() >= MAX_CALL_DEPTH {
            // the callee frame is never constructed; the gas budgeted for it
            // is forfeited along with it
            bail!(RuntimeError::CallDepthExceeded);
        }
        contract.input = input;
        self.frames.push(Frame {
            contract,
            terminate: TerminateType::default(),
            return_data: Vec::new(),
            read_only,
        });
        let outcome = self.execute_current();
        // pairs with the push above on every exit path
        let frame = match self.frames.pop() {
            Some(frame) => frame,
            None => bail!(RuntimeError::NoActiveFrame),
        };
        let result = FrameResult {
            terminate:   frame.terminate,
            return_data: frame.return_data,
            gas_left:    frame.contract.gas,
        };
        match outcome {
            Ok(()) => Ok(result),
            // self-destruct is a valid way to end execution; machines that
            // surface the forced stop as an error are not reporting a fault
            Err(_) if self.state.has_suicided(&frame.contract.address) => Ok(result),
            Err(err) => Err(err),
        }
    }

    fn execute_current(&mut self) -> ExecResult<()> {
        let loader = self.loader;
        let (module, entry, imports) = {
            let frame = self.frame()?;
            if !has_valid_preamble(&frame.contract.code) {
                bail!(ModuleError::NotAValidModule);
            }
            let module = loader.decode(&frame.contract.code)?;
            let entry = validate::validate_module(&self.registry, &module, self.debug)?;
            let imports = linker::link(&module, self.debug)?;
            (module, entry, imports)
        };
        let mut machine = loader.instantiate(&module, imports)?;
        machine.invoke(self, entry)
    }
}

impl<'a, L: ModuleLoader<ResolvedImport>> Host<ResolvedImport> for Interpreter<'a, L> {
    fn call(
        &mut self,
        f: &ResolvedImport,
        memory: &mut Vec<u8>,
        args: &[Value],
    ) -> RunResult<HostOutcome> {
        match f.func {
            HostFunc::Env(func) => self.call_env(func, memory, args),
            HostFunc::Debug(func) => self.call_debug(func, memory, args),
        }
    }
}
