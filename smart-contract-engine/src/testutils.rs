//! Test scaffolding: a scripted machine implementation driving the host
//! interface the way decoded bytecode would, plus helpers for building
//! contract code blobs and modules.

use crate::{
    linker::{ResolvedImport, DEBUG_MODULE, ENV_MODULE},
    registry::{DEBUG_API, ENV_API},
    state::{AccountCreator, CreateOutcome, StateDb},
    types::{Address, Contract, Word},
    ExecResult,
};
use anyhow::{anyhow, bail};
use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::Rc,
};
use wasm_machine::{
    machine::{Host, HostOutcome, Machine, ModuleLoader, RunResult},
    types::{
        Export, ExportDescription, FuncIndex, FunctionType, Import, ImportDescription, MemoryType,
        Module,
    },
    MAGIC, VERSION,
};

pub use wasm_machine::machine::Value;

pub fn addr(n: u8) -> Address { Address([n; 20]) }

pub fn word(n: u8) -> Word {
    let mut w = Word::ZERO;
    w.0[31] = n;
    w
}

/// A contract code blob: the framing header followed by a program id the
/// [`TestLoader`] resolves to a registered program or module.
pub fn code_for(id: u64) -> Vec<u8> {
    let mut code = Vec::with_capacity(16);
    code.extend_from_slice(&MAGIC);
    code.extend_from_slice(&VERSION.to_le_bytes());
    code.extend_from_slice(&id.to_le_bytes());
    code
}

pub fn contract(code: Vec<u8>, address: Address, gas: u64) -> Contract {
    Contract::new(code, address, addr(0x01), 0, gas)
}

/// One scripted host call.
#[derive(Clone, Debug)]
pub struct Step {
    pub name: &'static str,
    pub args: Vec<Value>,
}

pub fn step(name: &'static str, args: &[Value]) -> Step {
    Step {
        name,
        args: args.to_vec(),
    }
}

pub fn vi32(x: i32) -> Value { Value::I32(x) }

pub fn vi64(x: i64) -> Value { Value::I64(x) }

/// Values returned to the program by its host calls, in order.
pub type Trace = Rc<RefCell<Vec<Option<Value>>>>;

#[derive(Clone)]
struct Program {
    steps:         Vec<Step>,
    memory:        Vec<u8>,
    trace:         Trace,
    /// Simulate a machine that reports a host-forced stop as an error
    /// instead of a clean return.
    halt_as_error: bool,
}

/// A module loader resolving code blobs to canned modules and scripted
/// programs.
#[derive(Default)]
pub struct TestLoader {
    programs: HashMap<u64, Program>,
    modules:  HashMap<u64, Module>,
    /// Ids decoded but not yet instantiated; decode/instantiate come in
    /// strictly nested pairs within one interpreter.
    pending:  RefCell<Vec<u64>>,
    /// Number of successful decodes, observable by tests as an
    /// executed-at-all probe.
    pub decodes: Cell<usize>,
}

impl TestLoader {
    pub fn new() -> Self { Self::default() }

    pub fn register_program(&mut self, id: u64, steps: Vec<Step>, memory: Vec<u8>) -> Trace {
        let trace: Trace = Rc::new(RefCell::new(Vec::new()));
        self.programs.insert(id, Program {
            steps,
            memory,
            trace: trace.clone(),
            halt_as_error: false,
        });
        trace
    }

    /// Like [`register_program`], but the machine reports the host-requested
    /// halt as an execution error, the way an interpreter that implements
    /// forced stops with a recovered panic would.
    pub fn register_program_with_error_halt(
        &mut self,
        id: u64,
        steps: Vec<Step>,
        memory: Vec<u8>,
    ) -> Trace {
        let trace = self.register_program(id, steps, memory);
        if let Some(program) = self.programs.get_mut(&id) {
            program.halt_as_error = true;
        }
        trace
    }

    /// Register a raw module shape, for exercising the verifier through the
    /// bridge.
    pub fn register_module(&mut self, id: u64, module: Module) {
        self.modules.insert(id, module);
    }
}

fn program_id(bytes: &[u8]) -> ExecResult<u64> {
    let payload = bytes
        .get(8..16)
        .ok_or_else(|| anyhow!("code blob too short for a program id"))?;
    let mut id = [0u8; 8];
    id.copy_from_slice(payload);
    Ok(u64::from_le_bytes(id))
}

/// The module every scripted program presents: it imports the entire
/// environment surface (plus the debug surface when asked) and exports the
/// required `main`/`memory` pair, so any registered program can reach any
/// host function.
pub fn scripted_module(debug: bool) -> Module {
    let mut types = Vec::new();
    let mut imports = Vec::new();
    for function in ENV_API {
        imports.push(Import {
            mod_name:    ENV_MODULE.to_string(),
            item_name:   function.name.to_string(),
            description: ImportDescription::Func {
                type_idx: types.len() as u32,
            },
        });
        types.push(function.signature());
    }
    if debug {
        for function in DEBUG_API {
            imports.push(Import {
                mod_name:    DEBUG_MODULE.to_string(),
                item_name:   function.name.to_string(),
                description: ImportDescription::Func {
                    type_idx: types.len() as u32,
                },
            });
            types.push(function.signature());
        }
    }
    let main_index = imports.len() as FuncIndex;
    types.push(FunctionType::default());
    Module {
        funcs: vec![types.len() as u32 - 1],
        types,
        imports,
        memory: Some(MemoryType {
            min_pages: 1,
            max_pages: None,
        }),
        exports: vec![
            Export {
                name:        "main".to_string(),
                description: ExportDescription::Func { index: main_index },
            },
            Export {
                name:        "memory".to_string(),
                description: ExportDescription::Memory,
            },
        ],
        start: None,
    }
}

/// The instantiated counterpart of a scripted program.
pub struct ScriptMachine {
    steps:         Vec<Step>,
    memory:        Vec<u8>,
    imports:       HashMap<String, ResolvedImport>,
    trace:         Trace,
    halt_as_error: bool,
}

impl Machine<ResolvedImport> for ScriptMachine {
    fn invoke(&mut self, host: &mut dyn Host<ResolvedImport>, _entry: FuncIndex) -> RunResult<()> {
        for step in &self.steps {
            let import = self
                .imports
                .get(step.name)
                .ok_or_else(|| anyhow!("host function {} is not linked", step.name))?;
            match host.call(import, &mut self.memory, &step.args)? {
                HostOutcome::Halt => {
                    if self.halt_as_error {
                        bail!("machine terminated by host");
                    }
                    return Ok(());
                }
                HostOutcome::Resume(value) => self.trace.borrow_mut().push(value),
            }
        }
        Ok(())
    }
}

impl ModuleLoader<ResolvedImport> for TestLoader {
    type Machine = ScriptMachine;

    fn decode(&self, bytes: &[u8]) -> RunResult<Module> {
        let id = program_id(bytes)?;
        let module = if let Some(module) = self.modules.get(&id) {
            module.clone()
        } else if self.programs.contains_key(&id) {
            scripted_module(false)
        } else {
            bail!("no program registered under id {}", id);
        };
        self.decodes.set(self.decodes.get() + 1);
        self.pending.borrow_mut().push(id);
        Ok(module)
    }

    fn instantiate(&self, module: &Module, imports: Vec<ResolvedImport>) -> RunResult<ScriptMachine> {
        let id = self
            .pending
            .borrow_mut()
            .pop()
            .ok_or_else(|| anyhow!("instantiate without a preceding decode"))?;
        let program = self
            .programs
            .get(&id)
            .ok_or_else(|| anyhow!("no program registered under id {}", id))?;
        let imports = module
            .imports
            .iter()
            .map(|import| import.item_name.clone())
            .zip(imports)
            .collect();
        Ok(ScriptMachine {
            steps:         program.steps.clone(),
            memory:        program.memory.clone(),
            imports,
            trace:         program.trace.clone(),
            halt_as_error: program.halt_as_error,
        })
    }
}

/// An account creator replaying a canned outcome and recording what it was
/// asked to do.
#[derive(Default)]
pub struct ScriptedCreator {
    pub outcome:    Option<CreateOutcome>,
    pub last_gas:   Cell<u64>,
    pub last_value: Cell<u128>,
    pub last_code:  RefCell<Vec<u8>>,
    pub calls:      Cell<usize>,
}

impl AccountCreator for ScriptedCreator {
    fn create(
        &mut self,
        _state: &mut dyn StateDb,
        _caller: &Contract,
        code: Vec<u8>,
        gas: u64,
        value: u128,
    ) -> ExecResult<CreateOutcome> {
        self.calls.set(self.calls.get() + 1);
        self.last_gas.set(gas);
        self.last_value.set(value);
        *self.last_code.borrow_mut() = code;
        match &self.outcome {
            Some(outcome) => Ok(outcome.clone()),
            None => bail!("creation rejected"),
        }
    }
}
