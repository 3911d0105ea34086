//! Internal call lowering.
//!
//! The target machine has no call/return instruction, so an internal
//! call becomes: marshal arguments into the callee's static frame, goto
//! the callee's entry label with the return-buffer pointer and a
//! per-call-site return label as stack data, land on that label when the
//! callee jumps back, and read the result out of the buffer.
//!
//! Because a callee's frame is one fixed memory region shared by every
//! call site, argument expressions that themselves perform internal
//! calls are a write hazard: a nested call could clobber argument slots
//! already written for the outer call. Such calls stage their arguments
//! in a fresh temporary and commit them with a single bulk copy only
//! after every argument has fully evaluated.

use crate::context::FnCtx;
use crate::diagnostic::Diagnostic;
use crate::ir::{IrNode, MemLoc};
use crate::sig::{ArgExpr, FnId};
use crate::span::Span;
use crate::types::ValType;

use super::ExprGenerator;

/// One internal call expression, resolved by the front end.
#[derive(Clone, Debug)]
pub struct SelfCall {
    pub callee: FnId,
    pub args: Vec<ArgExpr>,
    /// Source text of the call expression, kept for annotations and the
    /// evaluate-once fingerprint.
    pub src: String,
    pub span: Span,
}

/// Lower one internal call to its IR subtree.
///
/// The result evaluates to the return-buffer address for a value-
/// returning callee, or to the landing label's no-op for a void one.
pub fn lower_self_call(
    call: &SelfCall,
    cx: &mut FnCtx<'_>,
    exprs: &mut dyn ExprGenerator,
) -> Result<IrNode, Diagnostic> {
    let module = cx.module;
    let callee = module.get(call.callee);

    if !callee.is_internal() {
        return Err(Diagnostic::error(
            format!("cannot call external function `{}` via `self`", callee.name),
            call.span,
        )
        .with_note(format!("`{}` is declared {}", callee.name, callee.display())));
    }

    if cx.is_constant() && !callee.mutability.is_read_only() {
        let caller = cx.spec();
        return Err(Diagnostic::error(
            format!(
                "may not call state modifying function `{}` from {}",
                callee.name,
                cx.constancy_desc()
            ),
            call.span,
        )
        .with_note(format!(
            "`{}` is declared {}",
            caller.name,
            caller.mutability.display()
        )));
    }

    let (min, max) = (callee.min_arg_count(), callee.max_arg_count());
    if call.args.len() < min || call.args.len() > max {
        let expected = if min == max {
            format!("{max}")
        } else {
            format!("between {min} and {max}")
        };
        return Err(Diagnostic::error(
            format!(
                "wrong number of arguments for `{}`: expected {}, got {}",
                callee.name,
                expected,
                call.args.len()
            ),
            call.span,
        ));
    }

    // Positional arguments first, then the defaults for whatever trailing
    // parameters the call left unfilled, evaluated as if written at the
    // call site. Left-to-right order here is load-bearing.
    let mut arg_irs = Vec::with_capacity(max);
    for expr in &call.args {
        arg_irs.push(exprs.generate(expr, cx)?);
    }
    for param in &callee.params[call.args.len()..] {
        let default = param.default.as_ref().unwrap_or_else(|| {
            panic!(
                "compiler bug: parameter `{}` of `{}` has no default past the arity check",
                param.name, callee.name
            )
        });
        arg_irs.push(exprs.generate(default, cx)?);
    }

    let dst_types: Vec<ValType> = callee.params.iter().map(|p| p.typ.clone()).collect();
    let args_size: u64 = dst_types.iter().map(|t| t.memory_size()).sum();
    if args_size > callee.frame.size as u64 {
        panic!(
            "compiler bug: frame of `{}` holds {} bytes but its parameters need {}",
            callee.name, callee.frame.size, args_size
        );
    }

    // One in-flight tuple carrying every argument; its self-call flag
    // tells us whether the frame copy below must be staged.
    let args_tuple = IrNode::node("multi", arg_irs).with_typ(ValType::Tuple(dst_types.clone()));
    let hazard = args_tuple.contains_self_call();

    let return_label = cx
        .labels
        .next_label(&format!("{}_call", callee.internal_label()));

    let return_buffer = callee.return_type.as_ref().map(|ret| {
        let ofst = cx.alloc_temp(ret);
        IrNode::num(ofst).with_annotation(format!("{return_label}_return_buf"))
    });

    let copy_args = if hazard {
        // Evaluate everything into a staging buffer, then commit to the
        // callee frame in one block once no nested call can intervene.
        let staging = cx.alloc_temp(&ValType::Tuple(dst_types.clone()));
        IrNode::seq(vec![
            unpack_into(staging, args_tuple.into_args(), &dst_types),
            IrNode::node(
                "mcopy",
                vec![
                    IrNode::num(callee.frame.start as u64),
                    IrNode::num(staging),
                    IrNode::num(args_size),
                ],
            ),
        ])
    } else {
        unpack_into(callee.frame.start as u64, args_tuple.into_args(), &dst_types)
    };

    // Guard against later passes duplicating this subtree: that would
    // double-define the return label and re-run argument side effects.
    let fingerprint = blake3::hash(call.src.as_bytes()).to_hex();
    let tag = format!("self_call_{}_{}", &fingerprint[..8], cx.labels.next_id());
    let guard = IrNode::node("unique_symbol", vec![IrNode::sym(tag)]);

    let mut goto_args = vec![IrNode::sym(callee.internal_label())];
    if let Some(buffer) = &return_buffer {
        goto_args.push(buffer.clone());
    }
    goto_args.push(IrNode::node(
        "symbol",
        vec![IrNode::sym(return_label.clone())],
    ));

    let landing = IrNode::node(
        "label",
        vec![
            IrNode::sym(return_label),
            IrNode::node("var_list", vec![]),
            IrNode::pass(),
        ],
    );

    let mut seq = vec![guard, copy_args, IrNode::node("goto", goto_args), landing];
    if let Some(buffer) = &return_buffer {
        seq.push(buffer.clone());
    }

    let mut out = IrNode::seq(seq)
        .with_annotation(call.src.clone())
        .with_gas_estimate(callee.gas_estimate);
    if let Some(ret) = &callee.return_type {
        out = out.with_typ(ret.clone()).with_location(MemLoc::Memory);
    }
    Ok(out.mark_self_call())
}

// ─── Argument copying ─────────────────────────────────────────────

/// Store one evaluated value at a memory offset. Word values store
/// directly; in-flight tuples (`multi`) store elementwise; any other
/// composite arrives as a memory pointer and is block-copied.
fn store_value(dst: u64, value: IrNode, typ: &ValType) -> IrNode {
    if value.is_op("multi") {
        let elems = match typ {
            ValType::Tuple(elems) => elems,
            _ => panic!("compiler bug: multi value for non-tuple slot of type {}", typ.display()),
        };
        return unpack_into(dst, value.into_args(), elems);
    }
    match typ {
        ValType::Word => IrNode::node("mstore", vec![IrNode::num(dst), value]),
        _ => IrNode::node(
            "mcopy",
            vec![IrNode::num(dst), value, IrNode::num(typ.memory_size())],
        ),
    }
}

/// Write evaluated values into consecutive slots of a region laid out
/// per `types`. Argument evaluation happens inside these stores, in
/// order.
fn unpack_into(dst_base: u64, values: Vec<IrNode>, types: &[ValType]) -> IrNode {
    if values.is_empty() {
        return IrNode::pass();
    }
    debug_assert_eq!(values.len(), types.len());
    let mut stores = Vec::with_capacity(values.len());
    let mut ofst = dst_base;
    for (value, typ) in values.into_iter().zip(types) {
        stores.push(store_value(ofst, value, typ));
        ofst += typ.memory_size();
    }
    IrNode::seq(stores)
}
