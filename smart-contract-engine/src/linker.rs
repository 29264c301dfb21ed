//! Import resolution. Each import module name a contract may request is
//! materialized as a synthetic module whose exports mirror the host function
//! registry; a contract's import section is then bound position by position
//! to the host entries it names.

use crate::{
    registry::{HostFunc, DEBUG_API, ENV_API},
    types::ModuleError,
    ExecResult,
};
use anyhow::{bail, ensure};
use std::collections::BTreeMap;
use wasm_machine::types::{FuncIndex, FunctionType, ImportDescription, Module};

/// Import module name of the environment API. Always available.
pub const ENV_MODULE: &str = "environment";

/// Import module name of the debug API. Available only in debug mode.
pub const DEBUG_MODULE: &str = "debug";

/// A synthetic module exposing a host API surface as its exports. Rebuilt per
/// resolution call rather than cached, so index assignment stays internally
/// consistent per instance.
#[derive(Debug)]
pub struct HostModule {
    pub types:     Vec<FunctionType>,
    pub functions: Vec<HostFunc>,
    pub exports:   BTreeMap<&'static str, FuncIndex>,
}

/// Build the synthetic module for the import module `name`.
pub fn resolve_module(name: &str, debug: bool) -> ExecResult<HostModule> {
    let table = match name {
        ENV_MODULE => ENV_API,
        DEBUG_MODULE if debug => DEBUG_API,
        other => bail!(ModuleError::UnknownImportModule(other.to_string())),
    };
    let mut module = HostModule {
        types:     Vec::with_capacity(table.len()),
        functions: Vec::with_capacity(table.len()),
        exports:   BTreeMap::new(),
    };
    for (index, function) in table.iter().enumerate() {
        module.types.push(function.signature());
        module.functions.push(function.func);
        module.exports.insert(function.name, index as FuncIndex);
    }
    Ok(module)
}

/// A contract import bound to its host implementation.
#[derive(Clone, Debug)]
pub struct ResolvedImport {
    pub func: HostFunc,
    pub ty:   FunctionType,
}

/// Resolve every import of a decoded module against the synthetic host
/// modules. The result is positionally aligned with the module's import
/// section and is handed to the machine at instantiation.
pub fn link(module: &Module, debug: bool) -> ExecResult<Vec<ResolvedImport>> {
    let mut resolved = Vec::with_capacity(module.imports.len());
    for import in &module.imports {
        let host = resolve_module(&import.mod_name, debug)?;
        let index = match host.exports.get(import.item_name.as_str()) {
            Some(index) => *index as usize,
            None => bail!(ModuleError::UnknownHostFunction(import.item_name.clone())),
        };
        let ty = host.types[index].clone();
        let ImportDescription::Func { type_idx } = import.description;
        if let Some(declared) = module.get_type(type_idx) {
            ensure!(
                *declared == ty,
                "import signature mismatch for {}.{}",
                import.mod_name,
                import.item_name
            );
        }
        resolved.push(ResolvedImport {
            func: host.functions[index],
            ty,
        });
    }
    Ok(resolved)
}
