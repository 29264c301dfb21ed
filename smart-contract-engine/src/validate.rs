//! The module verifier: structural checks a decoded contract module must pass
//! before it is linked and instantiated. All checks run before any gas is
//! charged, so verification failures are free.

use crate::{
    linker::{DEBUG_MODULE, ENV_MODULE},
    registry::HostRegistry,
    types::ModuleError,
    ExecResult,
};
use anyhow::bail;
use wasm_machine::types::{ExportDescription, FuncIndex, Module};

/// Name of the required entry-point export.
pub const MAIN_EXPORT: &str = "main";

/// Name of the required linear-memory export.
pub const MEMORY_EXPORT: &str = "memory";

/// Validate the shape of a decoded module and return the function index of
/// its entry point.
///
/// The rules, in order: no start function; exactly two exports; one export
/// `main`, a function taking and returning nothing; one export `memory`, a
/// linear memory; every import resolvable against the registered host
/// functions.
pub fn validate_module(
    registry: &HostRegistry,
    module: &Module,
    debug: bool,
) -> ExecResult<FuncIndex> {
    if module.start.is_some() {
        bail!(ModuleError::StartFunctionNotAllowed);
    }
    if module.exports.len() != 2 {
        bail!(ModuleError::UnexpectedExportCount(module.exports.len() as u32));
    }

    let mut entry = None;
    let mut has_memory = false;
    for export in &module.exports {
        match (export.name.as_str(), export.description) {
            (MAIN_EXPORT, ExportDescription::Func { index }) => {
                let ty = module.func_type(index);
                match ty {
                    Some(ty) if ty.parameters.is_empty() && ty.result.is_none() => {
                        entry = Some(index)
                    }
                    _ => bail!(ModuleError::InvalidEntryPointSignature),
                }
            }
            (MAIN_EXPORT, _) => bail!(ModuleError::InvalidEntryPointSignature),
            (MEMORY_EXPORT, ExportDescription::Memory) => has_memory = true,
            (MEMORY_EXPORT, _) => bail!(ModuleError::MissingMemoryExport),
            _ => {}
        }
    }
    let entry = match entry {
        Some(index) => index,
        None => bail!(ModuleError::InvalidEntryPointSignature),
    };
    if !has_memory {
        bail!(ModuleError::MissingMemoryExport);
    }

    for import in &module.imports {
        match import.mod_name.as_str() {
            ENV_MODULE => {
                if registry.env_function(&import.item_name).is_none() {
                    bail!(ModuleError::UnknownHostFunction(import.item_name.clone()));
                }
            }
            DEBUG_MODULE if debug => {
                if registry.debug_function(&import.item_name).is_none() {
                    bail!(ModuleError::UnknownHostFunction(import.item_name.clone()));
                }
            }
            other => bail!(ModuleError::UnknownImportModule(other.to_string())),
        }
    }

    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_machine::types::{
        Export, FunctionType, Import, ImportDescription, MemoryType, ValueKind,
    };

    fn well_formed() -> Module {
        Module {
            types: vec![FunctionType::default()],
            funcs: vec![0],
            memory: Some(MemoryType {
                min_pages: 1,
                max_pages: None,
            }),
            exports: vec![
                Export {
                    name:        MAIN_EXPORT.to_string(),
                    description: ExportDescription::Func { index: 0 },
                },
                Export {
                    name:        MEMORY_EXPORT.to_string(),
                    description: ExportDescription::Memory,
                },
            ],
            ..Default::default()
        }
    }

    fn registry() -> HostRegistry { HostRegistry::new().unwrap() }

    fn expect_error(module: &Module, expected: ModuleError) {
        let err = validate_module(&registry(), module, false).unwrap_err();
        assert_eq!(err.downcast_ref::<ModuleError>(), Some(&expected));
    }

    #[test]
    fn accepts_the_required_shape() {
        let entry = validate_module(&registry(), &well_formed(), false).unwrap();
        assert_eq!(entry, 0);
    }

    #[test]
    fn rejects_start_function() {
        let mut module = well_formed();
        module.start = Some(0);
        expect_error(&module, ModuleError::StartFunctionNotAllowed);
    }

    #[test]
    fn rejects_wrong_export_count() {
        let mut module = well_formed();
        module.exports.push(Export {
            name:        "extra".to_string(),
            description: ExportDescription::Func { index: 0 },
        });
        expect_error(&module, ModuleError::UnexpectedExportCount(3));
        module.exports.clear();
        expect_error(&module, ModuleError::UnexpectedExportCount(0));
    }

    #[test]
    fn rejects_entry_point_with_arguments() {
        let mut module = well_formed();
        module.types[0] = FunctionType {
            parameters: vec![ValueKind::I32],
            result:     None,
        };
        expect_error(&module, ModuleError::InvalidEntryPointSignature);
    }

    #[test]
    fn rejects_missing_main() {
        let mut module = well_formed();
        module.exports[0].name = "run".to_string();
        expect_error(&module, ModuleError::InvalidEntryPointSignature);
    }

    #[test]
    fn rejects_missing_memory_export() {
        let mut module = well_formed();
        module.exports[1] = Export {
            name:        "other".to_string(),
            description: ExportDescription::Memory,
        };
        expect_error(&module, ModuleError::MissingMemoryExport);
        // an export named memory that is not a linear memory is just as bad
        let mut module = well_formed();
        module.exports[1].description = ExportDescription::Func { index: 0 };
        expect_error(&module, ModuleError::MissingMemoryExport);
    }

    #[test]
    fn rejects_unknown_host_function() {
        let mut module = well_formed();
        module.types.push(FunctionType::default());
        module.imports.push(Import {
            mod_name:    ENV_MODULE.to_string(),
            item_name:   "noSuchFunction".to_string(),
            description: ImportDescription::Func { type_idx: 1 },
        });
        expect_error(
            &module,
            ModuleError::UnknownHostFunction("noSuchFunction".to_string()),
        );
    }

    #[test]
    fn debug_imports_are_gated_on_debug_mode() {
        let mut module = well_formed();
        module.types.push(FunctionType {
            parameters: vec![ValueKind::I32, ValueKind::I32],
            result:     None,
        });
        module.imports.push(Import {
            mod_name:    DEBUG_MODULE.to_string(),
            item_name:   "printMem".to_string(),
            description: ImportDescription::Func { type_idx: 1 },
        });
        expect_error(&module, ModuleError::UnknownImportModule("debug".to_string()));
        assert!(validate_module(&registry(), &module, true).is_ok());
    }
}
