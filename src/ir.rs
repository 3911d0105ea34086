//! Tree-shaped IR consumed by the stack-VM backends.
//!
//! Every node is an S-expression: a head value plus child nodes. The
//! module assemblers in `codegen` stitch per-function trees into one
//! runtime tree and one deploy tree; backends walk the result. Metadata
//! (value type, pointed-to region, gas) rides on the node that produced
//! the value.

use std::fmt;

use crate::types::ValType;

// ─── Values ───────────────────────────────────────────────────────

/// Head of an IR node: a literal word or an opcode/identifier symbol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IrValue {
    Num(u64),
    Sym(String),
}

impl fmt::Display for IrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrValue::Num(n) => write!(f, "{}", n),
            IrValue::Sym(s) => write!(f, "{}", s),
        }
    }
}

/// Region a pointer-valued node points into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemLoc {
    Memory,
    Calldata,
}

// ─── Nodes ────────────────────────────────────────────────────────

/// One IR tree node.
///
/// Trees are built bottom-up and never mutated structurally afterwards;
/// `args` and the derived self-call flag are private so the invariant
/// `contains_self_call == is_self_call || any(child.contains_self_call)`
/// holds for the node's whole lifetime.
#[derive(Clone, Debug)]
pub struct IrNode {
    pub value: IrValue,
    args: Vec<IrNode>,
    composite: bool,
    pub typ: Option<ValType>,
    pub location: Option<MemLoc>,
    pub annotation: Option<String>,
    pub add_gas_estimate: u64,
    pub is_self_call: bool,
    contains_self_call: bool,
}

impl IrNode {
    /// Literal word leaf.
    pub fn num(n: u64) -> Self {
        Self::leaf(IrValue::Num(n))
    }

    /// Symbol leaf (opcode with no operands, variable, label name).
    pub fn sym(s: impl Into<String>) -> Self {
        Self::leaf(IrValue::Sym(s.into()))
    }

    /// Composite node. Prints parenthesized even with no children, so
    /// `(var_list)` stays distinct from the atom `var_list`.
    pub fn node(op: impl Into<String>, args: Vec<IrNode>) -> Self {
        let contains_self_call = args.iter().any(|a| a.contains_self_call);
        Self {
            value: IrValue::Sym(op.into()),
            args,
            composite: true,
            typ: None,
            location: None,
            annotation: None,
            add_gas_estimate: 0,
            is_self_call: false,
            contains_self_call,
        }
    }

    pub fn seq(args: Vec<IrNode>) -> Self {
        Self::node("seq", args)
    }

    /// The no-op statement.
    pub fn pass() -> Self {
        Self::sym("pass")
    }

    fn leaf(value: IrValue) -> Self {
        Self {
            value,
            args: Vec::new(),
            composite: false,
            typ: None,
            location: None,
            annotation: None,
            add_gas_estimate: 0,
            is_self_call: false,
            contains_self_call: false,
        }
    }

    pub fn args(&self) -> &[IrNode] {
        &self.args
    }

    pub fn into_args(self) -> Vec<IrNode> {
        self.args
    }

    /// True if this node or any descendant is an internal-call composite.
    pub fn contains_self_call(&self) -> bool {
        self.contains_self_call
    }

    pub fn as_sym(&self) -> Option<&str> {
        match &self.value {
            IrValue::Sym(s) => Some(s),
            IrValue::Num(_) => None,
        }
    }

    pub fn as_num(&self) -> Option<u64> {
        match &self.value {
            IrValue::Num(n) => Some(*n),
            IrValue::Sym(_) => None,
        }
    }

    /// True for a composite whose head symbol is `op`.
    pub fn is_op(&self, op: &str) -> bool {
        self.composite && self.as_sym() == Some(op)
    }

    // ── Builders ──

    pub fn with_typ(mut self, typ: ValType) -> Self {
        self.typ = Some(typ);
        self
    }

    pub fn with_location(mut self, location: MemLoc) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotation = Some(annotation.into());
        self
    }

    pub fn with_gas_estimate(mut self, gas: u64) -> Self {
        self.add_gas_estimate = gas;
        self
    }

    /// Mark this node as an internal-call composite.
    pub fn mark_self_call(mut self) -> Self {
        self.is_self_call = true;
        self.contains_self_call = true;
        self
    }
}

// ─── Display ──────────────────────────────────────────────────────

impl fmt::Display for IrNode {
    /// Single-line S-expression form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.composite {
            return write!(f, "{}", self.value);
        }
        write!(f, "({}", self.value)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        write!(f, ")")
    }
}

impl IrNode {
    /// Indented multi-line S-expression, for artifact output and
    /// snapshot tests. Composites that fit in 72 columns stay on one
    /// line.
    pub fn pretty(&self) -> String {
        let mut out = String::new();
        self.pretty_into(&mut out, 0);
        out
    }

    fn pretty_into(&self, out: &mut String, indent: usize) {
        let flat = self.to_string();
        if !self.composite || indent + flat.len() <= 72 {
            out.push_str(&flat);
            return;
        }
        out.push('(');
        out.push_str(&self.value.to_string());
        for arg in &self.args {
            out.push('\n');
            for _ in 0..indent + 2 {
                out.push(' ');
            }
            arg.pretty_into(out, indent + 2);
        }
        out.push(')');
    }
}

// ─── Tests ────────────────────────────────────────────────────────
