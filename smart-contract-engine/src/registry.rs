//! The host function registry: a static table per API surface describing
//! every function a contract may import, together with the type mapper that
//! lowers declared host kinds to machine value kinds.
//!
//! The tables are fixed at compile time; [`HostRegistry::new`] indexes them by
//! name once at startup and rejects duplicate registrations.

use crate::ExecResult;
use anyhow::ensure;
use std::collections::BTreeMap;
use wasm_machine::types::{FunctionType, ValueKind};

/// Declared kind of a host-function parameter or result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostKind {
    /// Memory offsets, lengths, counts and result codes. 32-bit slot.
    I32,
    /// Gas amounts and block quantities. 64-bit slot.
    I64,
    F32,
    F64,
}

/// The type mapper: lower a declared host kind to the machine's value kind.
pub fn value_kind(kind: HostKind) -> ValueKind {
    match kind {
        HostKind::I32 => ValueKind::I32,
        HostKind::I64 => ValueKind::I64,
        HostKind::F32 => ValueKind::F32,
        HostKind::F64 => ValueKind::F64,
    }
}

/// Dispatch tags of the environment API.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvFunc {
    UseGas,
    GetAddress,
    GetExternalBalance,
    GetBlockHash,
    Call,
    CallDataCopy,
    GetCallDataSize,
    CallCode,
    CallDelegate,
    CallStatic,
    StorageStore,
    StorageLoad,
    GetCaller,
    GetCallValue,
    CodeCopy,
    GetCodeSize,
    GetBlockCoinbase,
    Create,
    GetBlockDifficulty,
    ExternalCodeCopy,
    GetExternalCodeSize,
    GetGasLeft,
    GetBlockGasLimit,
    GetTxGasPrice,
    Log,
    GetBlockNumber,
    GetTxOrigin,
    Finish,
    Revert,
    GetReturnDataSize,
    ReturnDataCopy,
    SelfDestruct,
    GetBlockTimestamp,
}

/// Dispatch tags of the debug API, linked only in debug mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebugFunc {
    PrintMem,
    PrintMemHex,
    PrintStorage,
    PrintStorageHex,
}

/// A resolved host function tag, dispatched on during execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostFunc {
    Env(EnvFunc),
    Debug(DebugFunc),
}

/// A single registered host function: its wire name, declared parameter and
/// result kinds, and the tag the interpreter dispatches on.
#[derive(Clone, Copy, Debug)]
pub struct HostFunction {
    pub name:   &'static str,
    pub params: &'static [HostKind],
    pub result: Option<HostKind>,
    pub func:   HostFunc,
}

impl HostFunction {
    /// Machine-level signature of the entry, derived through the type mapper.
    pub fn signature(&self) -> FunctionType {
        FunctionType {
            parameters: self.params.iter().map(|&k| value_kind(k)).collect(),
            result:     self.result.map(value_kind),
        }
    }
}

const fn env(
    name: &'static str,
    params: &'static [HostKind],
    result: Option<HostKind>,
    func: EnvFunc,
) -> HostFunction {
    HostFunction {
        name,
        params,
        result,
        func: HostFunc::Env(func),
    }
}

const fn debug(name: &'static str, params: &'static [HostKind], func: DebugFunc) -> HostFunction {
    HostFunction {
        name,
        params,
        result: None,
        func: HostFunc::Debug(func),
    }
}

use HostKind::{I32, I64};

/// The environment API, in wire order.
pub const ENV_API: &[HostFunction] = &[
    env("useGas", &[I64], None, EnvFunc::UseGas),
    env("getAddress", &[I32], None, EnvFunc::GetAddress),
    env("getExternalBalance", &[I32, I32], None, EnvFunc::GetExternalBalance),
    env("getBlockHash", &[I64, I32], Some(I32), EnvFunc::GetBlockHash),
    env("call", &[I64, I32, I32, I32, I32], Some(I32), EnvFunc::Call),
    env("callDataCopy", &[I32, I32, I32], None, EnvFunc::CallDataCopy),
    env("getCallDataSize", &[], Some(I32), EnvFunc::GetCallDataSize),
    env("callCode", &[I64, I32, I32, I32, I32], Some(I32), EnvFunc::CallCode),
    env("callDelegate", &[I64, I32, I32, I32], Some(I32), EnvFunc::CallDelegate),
    env("callStatic", &[I64, I32, I32, I32], Some(I32), EnvFunc::CallStatic),
    env("storageStore", &[I32, I32], None, EnvFunc::StorageStore),
    env("storageLoad", &[I32, I32], None, EnvFunc::StorageLoad),
    env("getCaller", &[I32], None, EnvFunc::GetCaller),
    env("getCallValue", &[I32], None, EnvFunc::GetCallValue),
    env("codeCopy", &[I32, I32, I32], None, EnvFunc::CodeCopy),
    env("getCodeSize", &[], Some(I32), EnvFunc::GetCodeSize),
    env("getBlockCoinbase", &[I32], None, EnvFunc::GetBlockCoinbase),
    env("create", &[I32, I32, I32, I32], Some(I32), EnvFunc::Create),
    env("getBlockDifficulty", &[I32], None, EnvFunc::GetBlockDifficulty),
    env("externalCodeCopy", &[I32, I32, I32, I32], None, EnvFunc::ExternalCodeCopy),
    env("getExternalCodeSize", &[I32], Some(I32), EnvFunc::GetExternalCodeSize),
    env("getGasLeft", &[], Some(I64), EnvFunc::GetGasLeft),
    env("getBlockGasLimit", &[], Some(I64), EnvFunc::GetBlockGasLimit),
    env("getTxGasPrice", &[I32], None, EnvFunc::GetTxGasPrice),
    env("log", &[I32, I32, I32, I32, I32, I32, I32], None, EnvFunc::Log),
    env("getBlockNumber", &[], Some(I64), EnvFunc::GetBlockNumber),
    env("getTxOrigin", &[I32], None, EnvFunc::GetTxOrigin),
    env("finish", &[I32, I32], None, EnvFunc::Finish),
    env("revert", &[I32, I32], None, EnvFunc::Revert),
    env("getReturnDataSize", &[], Some(I32), EnvFunc::GetReturnDataSize),
    env("returnDataCopy", &[I32, I32, I32], None, EnvFunc::ReturnDataCopy),
    env("selfDestruct", &[I32], None, EnvFunc::SelfDestruct),
    env("getBlockTimestamp", &[], Some(I64), EnvFunc::GetBlockTimestamp),
];

/// The debug API. Unmetered; available only when the interpreter runs in
/// debug mode.
pub const DEBUG_API: &[HostFunction] = &[
    debug("printMem", &[I32, I32], DebugFunc::PrintMem),
    debug("printMemHex", &[I32, I32], DebugFunc::PrintMemHex),
    debug("printStorage", &[I32], DebugFunc::PrintStorage),
    debug("printStorageHex", &[I32], DebugFunc::PrintStorageHex),
];

/// Name-indexed view of the API tables. Construction validates that no name
/// is registered twice within a surface.
#[derive(Debug)]
pub struct HostRegistry {
    env:   BTreeMap<&'static str, &'static HostFunction>,
    debug: BTreeMap<&'static str, &'static HostFunction>,
}

impl HostRegistry {
    pub fn new() -> ExecResult<Self> {
        Ok(Self {
            env:   index_table(ENV_API)?,
            debug: index_table(DEBUG_API)?,
        })
    }

    pub fn env_function(&self, name: &str) -> Option<&'static HostFunction> {
        self.env.get(name).copied()
    }

    pub fn debug_function(&self, name: &str) -> Option<&'static HostFunction> {
        self.debug.get(name).copied()
    }
}

fn index_table(
    table: &'static [HostFunction],
) -> ExecResult<BTreeMap<&'static str, &'static HostFunction>> {
    let mut map = BTreeMap::new();
    for function in table {
        ensure!(
            map.insert(function.name, function).is_none(),
            "host function {} registered twice",
            function.name
        );
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_indexes_both_surfaces() {
        let registry = HostRegistry::new().unwrap();
        assert!(registry.env_function("storageStore").is_some());
        assert!(registry.env_function("printMem").is_none());
        assert!(registry.debug_function("printMem").is_some());
        assert_eq!(registry.env.len(), ENV_API.len());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        const DUPLICATED: &[HostFunction] = &[
            env("useGas", &[I64], None, EnvFunc::UseGas),
            env("useGas", &[I64], None, EnvFunc::UseGas),
        ];
        assert!(index_table(DUPLICATED).is_err());
    }

    #[test]
    fn signatures_are_lowered_through_the_type_mapper() {
        let registry = HostRegistry::new().unwrap();
        let call = registry.env_function("call").unwrap().signature();
        assert_eq!(call.parameters, vec![
            ValueKind::I64,
            ValueKind::I32,
            ValueKind::I32,
            ValueKind::I32,
            ValueKind::I32
        ]);
        assert_eq!(call.result, Some(ValueKind::I32));
        let finish = registry.env_function("finish").unwrap().signature();
        assert_eq!(finish.result, None);
    }
}
