//! Per-compilation lowering state.
//!
//! One `LabelAllocator` lives for one module compile and is threaded
//! explicitly through every lowering call. Independent modules get
//! independent allocators, which keeps compiles reentrant and lets the
//! CLI run them in parallel.

use crate::sig::{FnId, FunctionSpec, Module};
use crate::types::ValType;

// ─── Labels ───────────────────────────────────────────────────────

/// Issues identifiers unique within one module compilation.
#[derive(Debug, Default)]
pub struct LabelAllocator {
    counter: u32,
}

impl LabelAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `{prefix}_{n}` with a compile-unique, monotonically increasing n.
    pub fn next_label(&mut self, prefix: &str) -> String {
        let n = self.next_id();
        format!("{prefix}_{n}")
    }

    pub fn next_id(&mut self) -> u32 {
        let n = self.counter;
        self.counter += 1;
        n
    }
}

// ─── Function context ─────────────────────────────────────────────

/// Whether the surrounding evaluation context may mutate state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Constancy {
    Mutable,
    Constant,
}

/// Context threaded through the lowering of one function body.
///
/// Owns the function's temporary-memory cursor: lowering temporaries
/// (return buffers, staging buffers) are bump-allocated past the static
/// frame and never reused, so the final cursor position is the
/// function's true memory high-water mark.
pub struct FnCtx<'a> {
    pub module: &'a Module,
    pub func: FnId,
    pub labels: &'a mut LabelAllocator,
    pub constancy: Constancy,
    temp_cursor: u64,
}

impl<'a> FnCtx<'a> {
    pub fn new(module: &'a Module, func: FnId, labels: &'a mut LabelAllocator) -> Self {
        let spec = module.get(func);
        let constancy = if spec.mutability.is_read_only() {
            Constancy::Constant
        } else {
            Constancy::Mutable
        };
        let temp_cursor = spec.frame.start as u64 + spec.frame.size as u64;
        Self {
            module,
            func,
            labels,
            constancy,
            temp_cursor,
        }
    }

    pub fn spec(&self) -> &'a FunctionSpec {
        self.module.get(self.func)
    }

    /// Allocate a lowering temporary sized for `typ`, returning its
    /// memory offset.
    pub fn alloc_temp(&mut self, typ: &ValType) -> u64 {
        let ofst = self.temp_cursor;
        self.temp_cursor += typ.memory_size();
        ofst
    }

    pub fn is_constant(&self) -> bool {
        self.constancy == Constancy::Constant
    }

    /// Wording for state-access diagnostics.
    pub fn constancy_desc(&self) -> &'static str {
        match self.constancy {
            Constancy::Constant => "a read-only context",
            Constancy::Mutable => "a mutable context",
        }
    }

    /// Memory a call into this function touches: the static frame's
    /// footprint plus any lowering temporaries allocated past it.
    pub fn mem_used(&self) -> u64 {
        let frame = self.spec().frame;
        frame.mem_used() + (self.temp_cursor - (frame.start as u64 + frame.size as u64))
    }
}
