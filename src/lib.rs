pub mod codegen;
pub mod context;
pub mod diagnostic;
pub mod ir;
pub mod manifest;
pub mod sig;
pub mod span;
pub mod types;

// Re-exports: the names most embedders want without module paths
pub use codegen::{generate_ir_for_module, topsort, FuncIr, ModuleIr};
pub use diagnostic::Diagnostic;
pub use ir::IrNode;
pub use manifest::Manifest;
pub use sig::{FnId, Module};
pub use span::Span;
pub use types::ValType;

use std::path::Path;

/// Load a manifest from disk and compile it with the outline generator.
pub fn compile_manifest_file(path: &Path) -> Result<ModuleIr, Vec<Diagnostic>> {
    Manifest::load(path)?.compile()
}
