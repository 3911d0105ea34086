//! Function specifications as delivered by semantic analysis.
//!
//! A `Module` is the code generator's whole world: an indexed set of
//! checked `FunctionSpec`s plus the immutable-section size. Everything
//! here is data the front end already validated; the asserts in this
//! module guard compiler invariants, not user mistakes.

use serde::{Deserialize, Serialize};

use crate::span::Span;
use crate::types::ValType;

/// Bytes below every frame reserved for VM scratch space.
pub const RESERVED_MEMORY: u64 = 64;

/// Stable handle for a function within one `Module`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FnId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Internal,
    External,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mutability {
    Pure,
    View,
    Nonpayable,
    Payable,
}

impl Mutability {
    /// Pure and view bodies may not write state or send value.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Mutability::Pure | Mutability::View)
    }

    pub fn display(&self) -> &'static str {
        match self {
            Mutability::Pure => "pure",
            Mutability::View => "view",
            Mutability::Nonpayable => "nonpayable",
            Mutability::Payable => "payable",
        }
    }
}

/// An opaque front-end expression handle. The code generator never looks
/// inside; it hands the expression to the `ExprGenerator` collaborator
/// and keeps `src` only for annotations and call-site fingerprints.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArgExpr {
    pub id: u32,
    pub src: String,
    #[serde(default)]
    pub span: Span,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub typ: ValType,
    /// Expression for a trailing default argument, if any.
    #[serde(default)]
    pub default: Option<ArgExpr>,
}

/// Static frame assigned to a function by the allocator upstream.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct FrameInfo {
    pub start: u32,
    pub size: u32,
}

impl FrameInfo {
    /// Total memory a call into this frame touches, counting the
    /// reserved scratch region below it.
    pub fn mem_used(&self) -> u64 {
        self.size as u64 + RESERVED_MEMORY
    }
}

/// One checked function definition, stripped to what IR generation needs.
#[derive(Clone, Debug)]
pub struct FunctionSpec {
    pub name: String,
    pub visibility: Visibility,
    pub mutability: Mutability,
    pub params: Vec<Param>,
    pub return_type: Option<ValType>,
    pub frame: FrameInfo,
    /// Internal functions the body calls directly, in first-call order.
    pub callees: Vec<FnId>,
    pub gas_estimate: u64,
    pub span: Span,
}

impl FunctionSpec {
    pub fn is_constructor(&self) -> bool {
        self.name == "__init__"
    }

    pub fn is_fallback(&self) -> bool {
        self.name == "__default__"
    }

    /// Externally dispatched via selector: external, not constructor,
    /// not fallback.
    pub fn is_regular(&self) -> bool {
        self.visibility == Visibility::External && !self.is_constructor() && !self.is_fallback()
    }

    pub fn is_internal(&self) -> bool {
        self.visibility == Visibility::Internal
    }

    pub fn is_payable(&self) -> bool {
        self.mutability == Mutability::Payable
    }

    /// Params without defaults. Defaults are always trailing, so this is
    /// a prefix slice.
    pub fn base_params(&self) -> &[Param] {
        let n = self.params.iter().filter(|p| p.default.is_none()).count();
        &self.params[..n]
    }

    pub fn default_params(&self) -> &[Param] {
        let n = self.base_params().len();
        &self.params[n..]
    }

    pub fn min_arg_count(&self) -> usize {
        self.base_params().len()
    }

    pub fn max_arg_count(&self) -> usize {
        self.params.len()
    }

    /// Entry label for the internal calling convention.
    pub fn internal_label(&self) -> String {
        if !self.is_internal() {
            panic!(
                "compiler bug: entry label requested for non-internal function `{}`",
                self.name
            );
        }
        format!("internal_{}", self.name)
    }

    pub fn display(&self) -> String {
        let params: Vec<_> = self.params.iter().map(|p| p.typ.display()).collect();
        let ret = match &self.return_type {
            Some(t) => format!(" -> {}", t.display()),
            None => String::new(),
        };
        let vis = match self.visibility {
            Visibility::Internal => "internal",
            Visibility::External => "external",
        };
        format!("{} {}({}){}", vis, self.name, params.join(", "), ret)
    }
}

/// A whole contract module, ready for IR generation.
///
/// Functions are indexed by `FnId` in declaration order; the order is
/// observable in dispatch-arm and deploy-tail layout.
#[derive(Clone, Debug)]
pub struct Module {
    functions: Vec<FunctionSpec>,
    pub immutables_len: u32,
}

impl Module {
    /// Wrap checked functions. The manifest layer has already rejected
    /// user-level mistakes; anything caught here is a front-end bug.
    pub fn new(functions: Vec<FunctionSpec>, immutables_len: u32) -> Self {
        let mut constructors = 0usize;
        let mut fallbacks = 0usize;
        let mut names = std::collections::HashSet::new();
        for func in &functions {
            // Entry labels and callee resolution both key on the name.
            if !names.insert(func.name.as_str()) {
                panic!("compiler bug: module defines `{}` twice", func.name);
            }
            for callee in &func.callees {
                let spec = functions.get(callee.0 as usize).unwrap_or_else(|| {
                    panic!(
                        "compiler bug: `{}` references callee id {} out of range",
                        func.name, callee.0
                    )
                });
                if !spec.is_internal() {
                    panic!(
                        "compiler bug: `{}` lists non-internal callee `{}`",
                        func.name, spec.name
                    );
                }
            }
            let base = func.base_params().len();
            if func.params[base..].iter().any(|p| p.default.is_none()) {
                panic!(
                    "compiler bug: `{}` has a non-trailing default argument",
                    func.name
                );
            }
            if (func.is_constructor() || func.is_fallback()) && func.is_internal() {
                panic!("compiler bug: `{}` must be external", func.name);
            }
            if func.is_constructor() {
                constructors += 1;
            }
            if func.is_fallback() {
                fallbacks += 1;
            }
        }
        if constructors > 1 {
            panic!("compiler bug: module defines {constructors} constructors");
        }
        if fallbacks > 1 {
            panic!("compiler bug: module defines {fallbacks} fallback functions");
        }
        Self {
            functions,
            immutables_len,
        }
    }

    pub fn get(&self, id: FnId) -> &FunctionSpec {
        &self.functions[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FnId, &FunctionSpec)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (FnId(i as u32), f))
    }

    pub fn constructor(&self) -> Option<FnId> {
        self.iter().find(|(_, f)| f.is_constructor()).map(|(i, _)| i)
    }

    pub fn fallback(&self) -> Option<FnId> {
        self.iter().find(|(_, f)| f.is_fallback()).map(|(i, _)| i)
    }

    /// Selector-dispatched functions in declaration order.
    pub fn regular_functions(&self) -> Vec<FnId> {
        self.iter()
            .filter(|(_, f)| f.is_regular())
            .map(|(i, _)| i)
            .collect()
    }
}
