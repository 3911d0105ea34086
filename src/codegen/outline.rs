//! Reference per-function generator.
//!
//! Produces protocol-correct function skeletons: real selector arms,
//! value checks, frame marshalling, and the full internal calling
//! convention, with statement bodies reduced to the internal calls the
//! manifest declares. The CLI and the integration tests drive module
//! assembly with it; a full front end plugs in its own
//! `FunctionGenerator` with real bodies instead.

use std::collections::HashMap;

use crate::context::{FnCtx, LabelAllocator};
use crate::diagnostic::Diagnostic;
use crate::ir::{IrNode, MemLoc};
use crate::sig::{ArgExpr, FnId, Module};

use super::self_call::{lower_self_call, SelfCall};
use super::{ExprGenerator, FuncIr, FunctionGenerator};

pub struct OutlineGenerator {
    /// Dispatch selector per external regular function, as computed by
    /// the ABI layer and carried through the manifest.
    selectors: HashMap<FnId, u32>,
    /// Internal calls each function body performs, in source order.
    calls: HashMap<FnId, Vec<SelfCall>>,
    /// Argument expressions that are themselves internal calls, keyed by
    /// expression handle.
    nested: HashMap<u32, SelfCall>,
}

impl OutlineGenerator {
    pub fn new(
        selectors: HashMap<FnId, u32>,
        calls: HashMap<FnId, Vec<SelfCall>>,
        nested: HashMap<u32, SelfCall>,
    ) -> Self {
        Self {
            selectors,
            calls,
            nested,
        }
    }

    fn value_check() -> IrNode {
        IrNode::node(
            "assert",
            vec![IrNode::node("iszero", vec![IrNode::sym("callvalue")])],
        )
    }
}

impl FunctionGenerator for OutlineGenerator {
    fn generate(
        &mut self,
        func: FnId,
        module: &Module,
        labels: &mut LabelAllocator,
        skip_value_check: bool,
    ) -> Result<FuncIr, Diagnostic> {
        let spec = module.get(func);
        let calls = self.calls.get(&func).cloned().unwrap_or_default();
        let mut cx = FnCtx::new(module, func, labels);

        let ir = if spec.is_internal() {
            // Subroutine entered by goto: the caller has filled the
            // frame; the return buffer pointer (for value-returning
            // callees) and the return address arrive as stack data.
            let mut vars = Vec::new();
            if spec.return_type.is_some() {
                vars.push(IrNode::sym("return_buffer"));
            }
            vars.push(IrNode::sym("return_pc"));

            let mut stmts = Vec::new();
            for call in &calls {
                stmts.push(lower_self_call(call, &mut cx, self)?);
            }
            if spec.return_type.is_some() {
                stmts.push(IrNode::node(
                    "mstore",
                    vec![IrNode::sym("return_buffer"), IrNode::num(0)],
                ));
            }
            stmts.push(IrNode::node("exit_to", vec![IrNode::sym("return_pc")]));

            IrNode::node(
                "label",
                vec![
                    IrNode::sym(spec.internal_label()),
                    IrNode::node("var_list", vars),
                    IrNode::seq(stmts),
                ],
            )
        } else {
            let mut stmts = Vec::new();
            if !spec.is_payable() && !skip_value_check {
                stmts.push(Self::value_check());
            }

            if spec.is_regular() {
                // One word per frame slot from calldata; multi-word static
                // params copy slotwise. Real ABI decoding is the full code
                // generator's concern.
                let mut cd = 4u64;
                let mut dst = spec.frame.start as u64;
                for param in &spec.params {
                    for w in 0..param.typ.word_count() {
                        let src = IrNode::node(
                            "calldataload",
                            vec![IrNode::num(cd + 32 * w)],
                        )
                        .with_location(MemLoc::Calldata)
                        .with_annotation(param.name.clone());
                        stmts.push(IrNode::node(
                            "mstore",
                            vec![IrNode::num(dst + 32 * w), src],
                        ));
                    }
                    cd += param.typ.memory_size();
                    dst += param.typ.memory_size();
                }
            }

            for call in &calls {
                stmts.push(lower_self_call(call, &mut cx, self)?);
            }

            if spec.is_constructor() {
                // The deploy op follows in the same sequence; do not halt.
                stmts.push(IrNode::pass());
            } else {
                match &spec.return_type {
                    Some(ret) => {
                        let buf = cx.alloc_temp(ret);
                        stmts.push(IrNode::node(
                            "mstore",
                            vec![IrNode::num(buf), IrNode::num(0)],
                        ));
                        stmts.push(IrNode::node(
                            "return",
                            vec![IrNode::num(buf), IrNode::num(ret.memory_size())],
                        ));
                    }
                    None => stmts.push(IrNode::sym("stop")),
                }
            }

            if spec.is_regular() {
                let selector = *self.selectors.get(&func).unwrap_or_else(|| {
                    panic!(
                        "compiler bug: no selector for external function `{}`",
                        spec.name
                    )
                });
                IrNode::node(
                    "if",
                    vec![
                        IrNode::node(
                            "eq",
                            vec![
                                IrNode::sym("_calldata_method_id"),
                                IrNode::num(selector as u64),
                            ],
                        ),
                        IrNode::seq(stmts),
                    ],
                )
            } else {
                IrNode::seq(stmts)
            }
        };

        Ok(FuncIr {
            ir: ir.with_annotation(spec.display()),
            mem_used: cx.mem_used(),
        })
    }
}

impl ExprGenerator for OutlineGenerator {
    /// Nested-call arguments lower through the full self-call protocol;
    /// numeric literals become word constants; anything else stays a
    /// symbolic reference for a later binding pass.
    fn generate(&mut self, expr: &ArgExpr, cx: &mut FnCtx<'_>) -> Result<IrNode, Diagnostic> {
        if let Some(call) = self.nested.get(&expr.id).cloned() {
            return lower_self_call(&call, cx, self);
        }
        match expr.src.parse::<u64>() {
            Ok(n) => Ok(IrNode::num(n)),
            Err(_) => Ok(IrNode::sym(expr.src.clone())),
        }
    }
}
