//! Module-level IR assembly.
//!
//! Turns a checked `Module` into two IR trees: the deploy tree, executed
//! once at contract creation, and the runtime tree it embeds, which
//! serves every later invocation. Per-function bodies come from a
//! `FunctionGenerator` collaborator; this module decides which functions
//! are generated, in what order, and with which value-check flag, and
//! stitches the results into the dispatch and deploy skeletons.

pub mod outline;
pub mod self_call;
#[cfg(test)]
mod tests;

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::context::{FnCtx, LabelAllocator};
use crate::diagnostic::Diagnostic;
use crate::ir::IrNode;
use crate::sig::{ArgExpr, FnId, Module};

// ─── Collaborator seams ───────────────────────────────────────────

/// IR for one function body plus the memory its frame and lowering
/// temporaries occupy. The deploy assembler reads `mem_used` off the
/// constructor to place immutables clear of live memory.
#[derive(Clone, Debug)]
pub struct FuncIr {
    pub ir: IrNode,
    pub mem_used: u64,
}

/// Per-function code generator.
///
/// Given a function handle it returns the complete IR for that
/// function's entry point and body. For an external function that means
/// the selector arm (or fallback body); for an internal function the
/// labeled subroutine. `skip_value_check` tells a nonpayable external
/// function that the dispatcher already asserted zero call value on its
/// behalf.
pub trait FunctionGenerator {
    fn generate(
        &mut self,
        func: FnId,
        module: &Module,
        labels: &mut LabelAllocator,
        skip_value_check: bool,
    ) -> Result<FuncIr, Diagnostic>;
}

/// Expression code generator, used while lowering internal calls to
/// evaluate argument and default-value expressions.
pub trait ExprGenerator {
    fn generate(&mut self, expr: &ArgExpr, cx: &mut FnCtx<'_>) -> Result<IrNode, Diagnostic>;
}

/// The two trees produced for one module. `runtime` also appears
/// embedded inside `deploy` as the payload of the `deploy` op.
#[derive(Clone, Debug)]
pub struct ModuleIr {
    pub deploy: IrNode,
    pub runtime: IrNode,
}

// ─── Function ordering ────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Order functions so every callee (direct or transitive) precedes its
/// callers, each function appearing exactly once.
///
/// Depth-first over the resolved callee edges, emitting a function only
/// after all of its callees. A function re-entered while still in
/// progress is a call cycle; frames are static memory regions shared by
/// every invocation, so recursion cannot be supported and is rejected.
pub fn topsort(module: &Module) -> Result<Vec<FnId>, Diagnostic> {
    let mut marks = vec![Mark::Unvisited; module.len()];
    let mut stack = Vec::new();
    let mut out = Vec::with_capacity(module.len());
    for (id, _) in module.iter() {
        visit(module, id, &mut marks, &mut stack, &mut out)?;
    }
    Ok(out)
}

fn visit(
    module: &Module,
    id: FnId,
    marks: &mut [Mark],
    stack: &mut Vec<FnId>,
    out: &mut Vec<FnId>,
) -> Result<(), Diagnostic> {
    match marks[id.0 as usize] {
        Mark::Done => return Ok(()),
        Mark::InProgress => return Err(cycle_error(module, id, stack)),
        Mark::Unvisited => {}
    }
    marks[id.0 as usize] = Mark::InProgress;
    stack.push(id);
    for callee in &module.get(id).callees {
        visit(module, *callee, marks, stack, out)?;
    }
    stack.pop();
    marks[id.0 as usize] = Mark::Done;
    out.push(id);
    Ok(())
}

fn cycle_error(module: &Module, id: FnId, stack: &[FnId]) -> Diagnostic {
    let from = stack.iter().position(|x| *x == id).unwrap_or(0);
    let mut names: Vec<&str> = stack[from..]
        .iter()
        .map(|f| module.get(*f).name.as_str())
        .collect();
    names.push(module.get(id).name.as_str());
    Diagnostic::error(
        format!("cyclic internal call chain: {}", names.join(" -> ")),
        module.get(id).span,
    )
    .with_note(
        "each function's frame is a single static memory region, so recursive calls have no \
         fresh memory to run in"
            .to_string(),
    )
}

// ─── Runtime assembly ─────────────────────────────────────────────

/// Build the runtime tree for all non-constructor functions, returning
/// it with the internal-function bodies keyed by handle (the deploy
/// assembler re-attaches the ones the constructor needs).
fn runtime_ir(
    module: &Module,
    runtime_fns: &[FnId],
    generator: &mut dyn FunctionGenerator,
    labels: &mut LabelAllocator,
) -> Result<(IrNode, IndexMap<FnId, IrNode>), Diagnostic> {
    // Internal bodies keep the topsorted order handed in (the deploy
    // tail re-attaches them in map insertion order); dispatch arms go in
    // declaration order.
    let internal: Vec<FnId> = runtime_fns
        .iter()
        .copied()
        .filter(|id| module.get(*id).is_internal())
        .collect();
    let fallback = module.fallback();
    let (payables, nonpayables): (Vec<FnId>, Vec<FnId>) = module
        .regular_functions()
        .into_iter()
        .partition(|id| module.get(*id).is_payable());

    // Internal bodies are generated unconditionally: a function unused at
    // runtime may still be reachable from the constructor, and its entry
    // label must resolve from any goto in this tree.
    let mut internal_map = IndexMap::new();
    for id in internal {
        let body = generator.generate(id, module, labels, false)?;
        internal_map.insert(id, body.ir);
    }

    // A module with no external surface at all (a "pure data" contract)
    // degenerates to its internal bodies with no dispatch or fallback.
    if fallback.is_none() && payables.is_empty() && nonpayables.is_empty() {
        let runtime = IrNode::seq(internal_map.values().cloned().collect());
        return Ok((runtime, internal_map));
    }

    // With a nonpayable (or absent, hence reverting) fallback, one
    // up-front zero-value assertion covers every nonpayable arm and the
    // fallback path, so each arm can skip its own.
    let default_is_nonpayable = fallback.map_or(true, |id| !module.get(id).is_payable());
    let batch_payable_check = !nonpayables.is_empty() && default_is_nonpayable;
    let skip_value_check = batch_payable_check;

    let mut selector_section = Vec::new();
    for id in payables {
        selector_section.push(generator.generate(id, module, labels, false)?.ir);
    }
    if batch_payable_check {
        selector_section.push(IrNode::node(
            "assert",
            vec![IrNode::node("iszero", vec![IrNode::sym("callvalue")])],
        ));
    }
    for id in nonpayables {
        selector_section.push(generator.generate(id, module, labels, skip_value_check)?.ir);
    }

    let fallback_ir = match fallback {
        Some(id) => generator.generate(id, module, labels, skip_value_check)?.ir,
        None => IrNode::node("revert", vec![IrNode::num(0), IrNode::num(0)])
            .with_annotation("Default function"),
    };

    // The dispatch section runs with the selector (top 4 bytes of the
    // first calldata word) bound to a scratch name. The unconditional
    // goto closes the dispatch block so control cannot fall through into
    // the label region.
    let mut runtime = vec![
        IrNode::node(
            "with",
            vec![
                IrNode::sym("_calldata_method_id"),
                IrNode::node(
                    "shr",
                    vec![
                        IrNode::num(224),
                        IrNode::node("calldataload", vec![IrNode::num(0)]),
                    ],
                ),
                IrNode::seq(selector_section),
            ],
        ),
        IrNode::node("goto", vec![IrNode::sym("fallback")]),
        IrNode::node(
            "label",
            vec![
                IrNode::sym("fallback"),
                IrNode::node("var_list", vec![]),
                fallback_ir,
            ],
        ),
    ];
    runtime.extend(internal_map.values().cloned());

    Ok((IrNode::seq(runtime), internal_map))
}

// ─── Deploy assembly ──────────────────────────────────────────────

/// Internal functions reachable from `from` through any chain of calls.
fn reachable_internals(module: &Module, from: FnId) -> HashSet<FnId> {
    let mut seen = HashSet::new();
    let mut stack = module.get(from).callees.clone();
    while let Some(id) = stack.pop() {
        if seen.insert(id) {
            stack.extend(module.get(id).callees.iter().copied());
        }
    }
    seen
}

/// Build the deploy tree: constructor body (if any), the `deploy` op
/// embedding the runtime tree, and the bodies of every internal function
/// the constructor transitively calls.
fn deploy_ir(
    module: &Module,
    runtime: &IrNode,
    runtime_fns: &[FnId],
    internal_map: &IndexMap<FnId, IrNode>,
    generator: &mut dyn FunctionGenerator,
    labels: &mut LabelAllocator,
) -> Result<IrNode, Diagnostic> {
    let mut deploy = Vec::new();
    match module.constructor() {
        Some(init) => {
            let init_ir = generator.generate(init, module, labels, false)?;
            deploy.push(init_ir.ir);

            // The deploy op carries the constructor's memory high-water
            // mark so immutable placement cannot clobber live memory.
            deploy.push(IrNode::node(
                "deploy",
                vec![
                    IrNode::num(init_ir.mem_used),
                    runtime.clone(),
                    IrNode::num(module.immutables_len as u64),
                ],
            ));

            // Deploy-time code is its own code region; labels defined in
            // the runtime tree are not reachable from it. Re-attach the
            // body of every internal function the constructor
            // transitively calls, in callee-first order.
            let reachable = reachable_internals(module, init);
            for id in runtime_fns.iter().filter(|id| reachable.contains(*id)) {
                let body = internal_map.get(id).unwrap_or_else(|| {
                    panic!(
                        "compiler bug: no generated body for `{}` called from the constructor",
                        module.get(*id).name
                    )
                });
                deploy.push(body.clone());
            }
        }
        None => {
            if module.immutables_len != 0 {
                panic!(
                    "compiler bug: module declares {} bytes of immutables but no constructor",
                    module.immutables_len
                );
            }
            deploy.push(IrNode::node(
                "deploy",
                vec![IrNode::num(0), runtime.clone(), IrNode::num(0)],
            ));
        }
    }
    Ok(IrNode::seq(deploy))
}

/// Generate the deploy and runtime trees for one module.
///
/// This is the top-level codegen entry point: it owns the compile's
/// `LabelAllocator`, orders the functions, assembles the runtime tree,
/// and wraps it in the deploy sequence.
pub fn generate_ir_for_module(
    module: &Module,
    generator: &mut dyn FunctionGenerator,
) -> Result<ModuleIr, Diagnostic> {
    let mut labels = LabelAllocator::new();
    let ordered = topsort(module)?;

    let runtime_fns: Vec<FnId> = ordered
        .iter()
        .copied()
        .filter(|id| !module.get(*id).is_constructor())
        .collect();

    let (runtime, internal_map) = runtime_ir(module, &runtime_fns, generator, &mut labels)?;
    let deploy = deploy_ir(
        module,
        &runtime,
        &runtime_fns,
        &internal_map,
        generator,
        &mut labels,
    )?;

    Ok(ModuleIr { deploy, runtime })
}
