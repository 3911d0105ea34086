//! Module assembly unit tests.

use super::outline::OutlineGenerator;
use super::self_call::{lower_self_call, SelfCall};
use super::*;
use crate::ir::MemLoc;
use crate::sig::{FrameInfo, FunctionSpec, Mutability, Param, Visibility};
use crate::span::Span;
use crate::types::ValType;

use std::collections::HashMap;

fn word_param(name: &str) -> Param {
    Param {
        name: name.to_string(),
        typ: ValType::Word,
        default: None,
    }
}

fn defaulted_param(name: &str, id: u32, src: &str) -> Param {
    Param {
        name: name.to_string(),
        typ: ValType::Word,
        default: Some(arg(id, src)),
    }
}

fn func(name: &str, visibility: Visibility, mutability: Mutability) -> FunctionSpec {
    FunctionSpec {
        name: name.to_string(),
        visibility,
        mutability,
        params: vec![],
        return_type: None,
        frame: FrameInfo::default(),
        callees: vec![],
        gas_estimate: 0,
        span: Span::dummy(),
    }
}

fn external(name: &str, mutability: Mutability) -> FunctionSpec {
    func(name, Visibility::External, mutability)
}

fn internal(name: &str) -> FunctionSpec {
    func(name, Visibility::Internal, Mutability::Nonpayable)
}

fn arg(id: u32, src: &str) -> ArgExpr {
    ArgExpr {
        id,
        src: src.to_string(),
        span: Span::dummy(),
    }
}

fn self_call(callee: FnId, args: Vec<ArgExpr>, src: &str) -> SelfCall {
    SelfCall {
        callee,
        args,
        src: src.to_string(),
        span: Span::dummy(),
    }
}

/// First eight hex digits of the evaluate-once fingerprint for `src`.
fn fp8(src: &str) -> String {
    let hex = blake3::hash(src.as_bytes()).to_hex();
    hex[..8].to_string()
}

/// Every node in the tree whose head is the composite op `op`.
fn ops<'a>(node: &'a IrNode, op: &str) -> Vec<&'a IrNode> {
    fn walk<'a>(node: &'a IrNode, op: &str, out: &mut Vec<&'a IrNode>) {
        if node.is_op(op) {
            out.push(node);
        }
        for child in node.args() {
            walk(child, op, out);
        }
    }
    let mut out = Vec::new();
    walk(node, op, &mut out);
    out
}

/// Emits one `(stub <name>)` node per request and records the order and
/// value-check flag it was asked for.
struct RecordingGenerator {
    log: Vec<(String, bool)>,
}

impl RecordingGenerator {
    fn new() -> Self {
        Self { log: Vec::new() }
    }
}

impl FunctionGenerator for RecordingGenerator {
    fn generate(
        &mut self,
        func: FnId,
        module: &Module,
        _labels: &mut LabelAllocator,
        skip_value_check: bool,
    ) -> Result<FuncIr, Diagnostic> {
        let name = module.get(func).name.clone();
        self.log.push((name.clone(), skip_value_check));
        Ok(FuncIr {
            ir: IrNode::node("stub", vec![IrNode::sym(name)]),
            mem_used: 128,
        })
    }
}

/// Numeric sources evaluate to word constants; anything else stands in
/// for an argument that performs an internal call of its own.
struct LiteralExprs;

impl ExprGenerator for LiteralExprs {
    fn generate(&mut self, expr: &ArgExpr, _cx: &mut FnCtx<'_>) -> Result<IrNode, Diagnostic> {
        match expr.src.parse::<u64>() {
            Ok(n) => Ok(IrNode::num(n)),
            Err(_) => Ok(IrNode::node("stub_call", vec![]).mark_self_call()),
        }
    }
}

// ─── Function ordering ────────────────────────────────────────────

#[test]
fn test_topsort_orders_callees_first() {
    let mut a = external("a", Mutability::Nonpayable);
    a.callees = vec![FnId(1)];
    let mut b = internal("b");
    b.callees = vec![FnId(2)];
    let c = internal("c");
    let module = Module::new(vec![a, b, c], 0);

    let order = topsort(&module).unwrap();
    assert_eq!(order, vec![FnId(2), FnId(1), FnId(0)]);
}

#[test]
fn test_topsort_dedups_shared_callee() {
    let mut a = external("a", Mutability::Nonpayable);
    a.callees = vec![FnId(1), FnId(2)];
    let mut b = internal("b");
    b.callees = vec![FnId(3)];
    let mut c = internal("c");
    c.callees = vec![FnId(3)];
    let d = internal("d");
    let module = Module::new(vec![a, b, c, d], 0);

    let order = topsort(&module).unwrap();
    assert_eq!(order, vec![FnId(3), FnId(1), FnId(2), FnId(0)]);
}

#[test]
fn test_topsort_independent_functions_keep_declaration_order() {
    let module = Module::new(
        vec![
            external("x", Mutability::Nonpayable),
            external("y", Mutability::Nonpayable),
            internal("z"),
        ],
        0,
    );

    let order = topsort(&module).unwrap();
    assert_eq!(order, vec![FnId(0), FnId(1), FnId(2)]);
}

#[test]
fn test_topsort_rejects_self_recursion() {
    let mut a = internal("a");
    a.callees = vec![FnId(0)];
    let module = Module::new(vec![a], 0);

    let err = topsort(&module).unwrap_err();
    assert_eq!(err.message, "cyclic internal call chain: a -> a");
}

#[test]
fn test_topsort_rejects_mutual_recursion() {
    let mut a = internal("a");
    a.callees = vec![FnId(1)];
    let mut b = internal("b");
    b.callees = vec![FnId(0)];
    let module = Module::new(vec![a, b], 0);

    let err = topsort(&module).unwrap_err();
    assert_eq!(err.message, "cyclic internal call chain: a -> b -> a");
    assert!(err.notes[0].contains("static memory region"));
}

// ─── Runtime assembly ─────────────────────────────────────────────

#[test]
fn test_runtime_dispatch_shape() {
    let module = Module::new(
        vec![
            external("pay", Mutability::Payable),
            external("send", Mutability::Nonpayable),
            internal("helper"),
        ],
        0,
    );
    let mut gen = RecordingGenerator::new();

    let ir = generate_ir_for_module(&module, &mut gen).unwrap();

    // Internal bodies first, then payables, then nonpayables with the
    // value check hoisted into the shared batch assert.
    assert_eq!(
        gen.log,
        vec![
            ("helper".to_string(), false),
            ("pay".to_string(), false),
            ("send".to_string(), true),
        ]
    );

    let parts = ir.runtime.args();
    assert_eq!(parts.len(), 4);

    let with = &parts[0];
    assert!(with.is_op("with"));
    assert_eq!(with.args()[0].as_sym(), Some("_calldata_method_id"));
    assert!(with.args()[1].is_op("shr"));
    assert_eq!(with.args()[1].args()[0].as_num(), Some(224));

    let section = with.args()[2].args();
    assert_eq!(section.len(), 3);
    assert!(section[0].is_op("stub"));
    assert!(section[1].is_op("assert"));
    assert_eq!(section[1].args()[0].args()[0].as_sym(), Some("callvalue"));
    assert!(section[2].is_op("stub"));

    assert!(parts[1].is_op("goto"));
    assert_eq!(parts[1].args()[0].as_sym(), Some("fallback"));

    let label = &parts[2];
    assert!(label.is_op("label"));
    assert_eq!(label.args()[0].as_sym(), Some("fallback"));
    assert!(label.args()[1].is_op("var_list"));

    assert!(parts[3].is_op("stub"));
}

#[test]
fn test_missing_fallback_reverts() {
    let module = Module::new(vec![external("send", Mutability::Nonpayable)], 0);
    let mut gen = RecordingGenerator::new();

    let ir = generate_ir_for_module(&module, &mut gen).unwrap();

    let fallback_body = &ir.runtime.args()[2].args()[2];
    assert!(fallback_body.is_op("revert"));
    assert_eq!(fallback_body.args()[0].as_num(), Some(0));
    assert_eq!(fallback_body.args()[1].as_num(), Some(0));
    assert_eq!(fallback_body.annotation.as_deref(), Some("Default function"));
}

#[test]
fn test_payable_fallback_keeps_arm_checks() {
    let module = Module::new(
        vec![
            external("send", Mutability::Nonpayable),
            external("__default__", Mutability::Payable),
        ],
        0,
    );
    let mut gen = RecordingGenerator::new();

    let ir = generate_ir_for_module(&module, &mut gen).unwrap();

    // A payable fallback can receive value through unmatched calldata,
    // so no up-front batch assert; every nonpayable arm checks itself.
    assert_eq!(
        gen.log,
        vec![
            ("send".to_string(), false),
            ("__default__".to_string(), false),
        ]
    );
    let section = ir.runtime.args()[0].args()[2].args();
    assert_eq!(section.len(), 1);
    assert!(section[0].is_op("stub"));
}

#[test]
fn test_all_payable_functions_skip_batch_check() {
    let module = Module::new(vec![external("pay", Mutability::Payable)], 0);
    let mut gen = RecordingGenerator::new();

    let ir = generate_ir_for_module(&module, &mut gen).unwrap();

    assert_eq!(gen.log, vec![("pay".to_string(), false)]);
    assert!(ops(&ir.runtime.args()[0], "assert").is_empty());
}

#[test]
fn test_runtime_without_externals_degenerates() {
    let module = Module::new(vec![internal("helper")], 0);
    let mut gen = RecordingGenerator::new();

    let ir = generate_ir_for_module(&module, &mut gen).unwrap();

    assert_eq!(ir.runtime.to_string(), "(seq (stub helper))");
    assert!(ops(&ir.runtime, "with").is_empty());
}

#[test]
fn test_empty_module() {
    let module = Module::new(vec![], 0);
    let mut gen = RecordingGenerator::new();

    let ir = generate_ir_for_module(&module, &mut gen).unwrap();

    assert_eq!(ir.runtime.to_string(), "(seq)");
    assert_eq!(ir.deploy.to_string(), "(seq (deploy 0 (seq) 0))");
}

// ─── Deploy assembly ──────────────────────────────────────────────

#[test]
fn test_deploy_without_constructor() {
    let module = Module::new(vec![external("pay", Mutability::Payable)], 0);
    let mut gen = RecordingGenerator::new();

    let ir = generate_ir_for_module(&module, &mut gen).unwrap();

    assert_eq!(ir.deploy.args().len(), 1);
    let op = &ir.deploy.args()[0];
    assert!(op.is_op("deploy"));
    assert_eq!(op.args()[0].as_num(), Some(0));
    assert_eq!(op.args()[1].to_string(), ir.runtime.to_string());
    assert_eq!(op.args()[2].as_num(), Some(0));
}

#[test]
fn test_deploy_reattaches_transitive_constructor_callees() {
    let mut init = external("__init__", Mutability::Nonpayable);
    init.callees = vec![FnId(1)];
    let mut a = internal("a");
    a.callees = vec![FnId(2)];
    let b = internal("b");
    let c = internal("c");
    let module = Module::new(vec![init, a, b, c], 96);
    let mut gen = RecordingGenerator::new();

    let ir = generate_ir_for_module(&module, &mut gen).unwrap();

    // Constructor body, deploy op, then the bodies of `a` and `b` (the
    // constructor reaches `b` only through `a`), callee-first. The
    // uncalled `c` stays in the runtime payload only.
    let parts = ir.deploy.args();
    assert_eq!(parts.len(), 4);
    assert_eq!(parts[0].to_string(), "(stub __init__)");
    assert!(parts[1].is_op("deploy"));
    assert_eq!(parts[1].args()[0].as_num(), Some(128));
    assert_eq!(parts[1].args()[2].as_num(), Some(96));
    assert_eq!(parts[2].to_string(), "(stub b)");
    assert_eq!(parts[3].to_string(), "(stub a)");
    assert_eq!(ir.deploy.to_string().matches("(stub c)").count(), 1);

    // The constructor is generated last, after the whole runtime tree.
    assert_eq!(
        gen.log,
        vec![
            ("b".to_string(), false),
            ("a".to_string(), false),
            ("c".to_string(), false),
            ("__init__".to_string(), false),
        ]
    );
}

#[test]
fn test_constructor_only_module() {
    let mut init = external("__init__", Mutability::Nonpayable);
    init.callees = vec![FnId(1)];
    let helper = internal("helper");
    let module = Module::new(vec![init, helper], 0);
    let mut gen = RecordingGenerator::new();

    let ir = generate_ir_for_module(&module, &mut gen).unwrap();

    assert_eq!(
        ir.deploy.to_string(),
        "(seq (stub __init__) (deploy 128 (seq (stub helper)) 0) (stub helper))"
    );
}

#[test]
#[should_panic(expected = "no constructor")]
fn test_immutables_without_constructor_is_a_bug() {
    let module = Module::new(vec![external("pay", Mutability::Payable)], 32);
    let mut gen = RecordingGenerator::new();
    let _ = generate_ir_for_module(&module, &mut gen);
}

// ─── Internal call lowering ───────────────────────────────────────

/// Caller `run` at id 0 with an empty frame at 192, callee at id 1.
fn lowering_module(callee: FunctionSpec) -> Module {
    let mut run = external("run", Mutability::Nonpayable);
    run.frame = FrameInfo {
        start: 192,
        size: 0,
    };
    Module::new(vec![run, callee], 0)
}

fn lower(module: &Module, call: &SelfCall) -> Result<IrNode, Diagnostic> {
    let mut labels = LabelAllocator::new();
    let mut cx = FnCtx::new(module, FnId(0), &mut labels);
    lower_self_call(call, &mut cx, &mut LiteralExprs)
}

#[test]
fn test_lower_writes_frame_directly_without_hazard() {
    let mut store = internal("store");
    store.params = vec![word_param("x")];
    store.frame = FrameInfo {
        start: 128,
        size: 32,
    };
    let module = lowering_module(store);

    let ir = lower(&module, &self_call(FnId(1), vec![arg(1, "7")], "self.store(7)")).unwrap();

    assert_eq!(
        ir.to_string(),
        format!(
            "(seq (unique_symbol self_call_{}_1) (seq (mstore 128 7)) \
             (goto internal_store (symbol internal_store_call_0)) \
             (label internal_store_call_0 (var_list) pass))",
            fp8("self.store(7)")
        )
    );
    assert!(!ir.to_string().contains("mcopy"));
}

#[test]
fn test_lower_stages_arguments_on_nested_call() {
    let mut store = internal("store");
    store.params = vec![word_param("x")];
    store.frame = FrameInfo {
        start: 128,
        size: 32,
    };
    let module = lowering_module(store);

    let call = self_call(FnId(1), vec![arg(1, "self.nested()")], "self.store(self.nested())");
    let ir = lower(&module, &call).unwrap();
    let s = ir.to_string();

    // Arguments evaluate into the staging buffer at 192; the callee
    // frame at 128 is written only by the final bulk copy.
    assert!(s.contains("(mstore 192 (stub_call))"));
    assert!(s.contains("(mcopy 128 192 32)"));
    assert!(s.find("(mstore 192").unwrap() < s.find("(mcopy 128").unwrap());
    assert!(!s.contains("(mstore 128"));
}

#[test]
fn test_lower_return_buffer_and_metadata() {
    let mut get = internal("get");
    get.mutability = Mutability::View;
    get.return_type = Some(ValType::Word);
    get.frame = FrameInfo {
        start: 128,
        size: 0,
    };
    get.gas_estimate = 115;
    let module = lowering_module(get);

    let ir = lower(&module, &self_call(FnId(1), vec![], "self.get()")).unwrap();

    assert_eq!(
        ir.to_string(),
        format!(
            "(seq (unique_symbol self_call_{}_1) pass \
             (goto internal_get 192 (symbol internal_get_call_0)) \
             (label internal_get_call_0 (var_list) pass) 192)",
            fp8("self.get()")
        )
    );

    // The subtree evaluates to the return-buffer pointer and carries the
    // callee's cost and the call-site source text.
    assert_eq!(ir.args().last().and_then(|n| n.as_num()), Some(192));
    assert_eq!(ir.typ, Some(ValType::Word));
    assert_eq!(ir.location, Some(MemLoc::Memory));
    assert_eq!(ir.annotation.as_deref(), Some("self.get()"));
    assert_eq!(ir.add_gas_estimate, 115);
    assert!(ir.is_self_call);
    assert!(ir.contains_self_call());
}

#[test]
fn test_lower_fills_trailing_defaults() {
    let mut send = internal("send");
    send.params = vec![
        word_param("to"),
        word_param("amount"),
        defaulted_param("memo", 9, "41"),
    ];
    send.frame = FrameInfo {
        start: 128,
        size: 96,
    };
    let module = lowering_module(send);

    let call = self_call(FnId(1), vec![arg(1, "7"), arg(2, "8")], "self.send(7, 8)");
    let ir = lower(&module, &call).unwrap();

    assert!(ir
        .to_string()
        .contains("(seq (mstore 128 7) (mstore 160 8) (mstore 192 41))"));
}

#[test]
fn test_lower_rejects_wrong_arity() {
    let mut store = internal("store");
    store.params = vec![word_param("a"), word_param("b")];
    store.frame = FrameInfo {
        start: 128,
        size: 64,
    };
    let module = lowering_module(store);

    let err = lower(&module, &self_call(FnId(1), vec![arg(1, "7")], "self.store(7)")).unwrap_err();
    assert_eq!(
        err.message,
        "wrong number of arguments for `store`: expected 2, got 1"
    );
}

#[test]
fn test_lower_reports_arity_range_with_defaults() {
    let mut send = internal("send");
    send.params = vec![word_param("to"), defaulted_param("memo", 9, "0")];
    send.frame = FrameInfo {
        start: 128,
        size: 64,
    };
    let module = lowering_module(send);

    let err = lower(&module, &self_call(FnId(1), vec![], "self.send()")).unwrap_err();
    assert_eq!(
        err.message,
        "wrong number of arguments for `send`: expected between 1 and 2, got 0"
    );
}

#[test]
fn test_lower_rejects_external_callee() {
    let pay = external("pay", Mutability::Payable);
    let module = lowering_module(pay);

    let err = lower(&module, &self_call(FnId(1), vec![], "self.pay()")).unwrap_err();
    assert_eq!(err.message, "cannot call external function `pay` via `self`");
    assert_eq!(err.notes[0], "`pay` is declared external pay()");
}

#[test]
fn test_lower_rejects_mutating_callee_from_read_only_caller() {
    let mut reader = external("reader", Mutability::View);
    reader.frame = FrameInfo {
        start: 192,
        size: 0,
    };
    let store = internal("store");
    let module = Module::new(vec![reader, store], 0);

    let mut labels = LabelAllocator::new();
    let mut cx = FnCtx::new(&module, FnId(0), &mut labels);
    let call = self_call(FnId(1), vec![], "self.store()");
    let err = lower_self_call(&call, &mut cx, &mut LiteralExprs).unwrap_err();

    assert_eq!(
        err.message,
        "may not call state modifying function `store` from a read-only context"
    );
    assert_eq!(err.notes[0], "`reader` is declared view");
}

#[test]
fn test_lower_allows_read_only_callee_from_read_only_caller() {
    let mut reader = external("reader", Mutability::View);
    reader.frame = FrameInfo {
        start: 192,
        size: 0,
    };
    let mut get = internal("get");
    get.mutability = Mutability::View;
    get.frame = FrameInfo {
        start: 128,
        size: 0,
    };
    let module = Module::new(vec![reader, get], 0);

    let mut labels = LabelAllocator::new();
    let mut cx = FnCtx::new(&module, FnId(0), &mut labels);
    let call = self_call(FnId(1), vec![], "self.get()");
    assert!(lower_self_call(&call, &mut cx, &mut LiteralExprs).is_ok());
}

#[test]
#[should_panic(expected = "compiler bug")]
fn test_lower_panics_when_frame_cannot_hold_params() {
    let mut store = internal("store");
    store.params = vec![Param {
        name: "data".to_string(),
        typ: ValType::Bytes { len: 100 },
        default: None,
    }];
    store.frame = FrameInfo {
        start: 128,
        size: 32,
    };
    let module = lowering_module(store);
    let _ = lower(&module, &self_call(FnId(1), vec![], "self.store()"));
}

#[test]
fn test_lower_labels_unique_per_call_site() {
    let mut store = internal("store");
    store.params = vec![word_param("x")];
    store.frame = FrameInfo {
        start: 128,
        size: 32,
    };
    let module = lowering_module(store);

    let mut labels = LabelAllocator::new();
    let mut cx = FnCtx::new(&module, FnId(0), &mut labels);
    let call = self_call(FnId(1), vec![arg(1, "7")], "self.store(7)");
    let first = lower_self_call(&call, &mut cx, &mut LiteralExprs).unwrap();
    let second = lower_self_call(&call, &mut cx, &mut LiteralExprs).unwrap();

    // Same call expression twice: distinct return labels and distinct
    // evaluate-once tags, from one shared counter.
    let tag = fp8("self.store(7)");
    assert!(first.to_string().contains("internal_store_call_0"));
    assert!(first.to_string().contains(&format!("self_call_{tag}_1")));
    assert!(second.to_string().contains("internal_store_call_2"));
    assert!(second.to_string().contains(&format!("self_call_{tag}_3")));
}

// ─── Outline generator ────────────────────────────────────────────

/// pay (payable, two words), send (nonpayable, calls helper), helper
/// (internal, one word in, one word out).
fn outline_module() -> Module {
    let mut pay = external("pay", Mutability::Payable);
    pay.params = vec![word_param("to"), word_param("amount")];
    pay.frame = FrameInfo {
        start: 64,
        size: 64,
    };
    let mut send = external("send", Mutability::Nonpayable);
    send.frame = FrameInfo {
        start: 192,
        size: 0,
    };
    send.callees = vec![FnId(2)];
    let mut helper = internal("helper");
    helper.params = vec![word_param("x")];
    helper.return_type = Some(ValType::Word);
    helper.frame = FrameInfo {
        start: 128,
        size: 32,
    };
    helper.gas_estimate = 115;
    Module::new(vec![pay, send, helper], 0)
}

fn outline_generator() -> OutlineGenerator {
    let mut selectors = HashMap::new();
    selectors.insert(FnId(0), 1043872354);
    selectors.insert(FnId(1), 3078093874);
    let mut calls = HashMap::new();
    calls.insert(
        FnId(1),
        vec![self_call(FnId(2), vec![arg(1, "7")], "self.helper(7)")],
    );
    OutlineGenerator::new(selectors, calls, HashMap::new())
}

#[test]
fn test_outline_internal_body_shape() {
    let module = outline_module();
    let mut gen = outline_generator();
    let mut labels = LabelAllocator::new();

    let body = FunctionGenerator::generate(&mut gen,FnId(2), &module, &mut labels, false).unwrap();

    assert_eq!(
        body.ir.to_string(),
        "(label internal_helper (var_list return_buffer return_pc) \
         (seq (mstore return_buffer 0) (exit_to return_pc)))"
    );
    assert_eq!(body.ir.annotation.as_deref(), Some("internal helper(word) -> word"));
    assert_eq!(body.mem_used, 96);
}

#[test]
fn test_outline_external_arm_with_call() {
    let module = outline_module();
    let mut gen = outline_generator();
    let mut labels = LabelAllocator::new();

    let arm = FunctionGenerator::generate(&mut gen,FnId(1), &module, &mut labels, false).unwrap();

    assert_eq!(
        arm.ir.to_string(),
        format!(
            "(if (eq _calldata_method_id 3078093874) (seq (assert (iszero callvalue)) \
             (seq (unique_symbol self_call_{}_1) (seq (mstore 128 7)) \
             (goto internal_helper 192 (symbol internal_helper_call_0)) \
             (label internal_helper_call_0 (var_list) pass) 192) stop))",
            fp8("self.helper(7)")
        )
    );
    assert_eq!(arm.mem_used, 96);
}

#[test]
fn test_outline_marshals_params_from_calldata() {
    let module = outline_module();
    let mut gen = outline_generator();
    let mut labels = LabelAllocator::new();

    let arm = FunctionGenerator::generate(&mut gen,FnId(0), &module, &mut labels, false).unwrap();

    // Payable, so no value check; one word per parameter off calldata.
    assert_eq!(
        arm.ir.to_string(),
        "(if (eq _calldata_method_id 1043872354) \
         (seq (mstore 64 (calldataload 4)) (mstore 96 (calldataload 36)) stop))"
    );
    assert_eq!(arm.mem_used, 128);
}

#[test]
fn test_outline_constructor_falls_through_to_deploy() {
    let mut init = external("__init__", Mutability::Nonpayable);
    init.frame = FrameInfo {
        start: 64,
        size: 0,
    };
    let module = Module::new(vec![init], 0);
    let mut gen = OutlineGenerator::new(HashMap::new(), HashMap::new(), HashMap::new());
    let mut labels = LabelAllocator::new();

    let body = FunctionGenerator::generate(&mut gen,FnId(0), &module, &mut labels, false).unwrap();
    assert_eq!(body.ir.to_string(), "(seq (assert (iszero callvalue)) pass)");
}

#[test]
fn test_outline_fallback_honors_skip_flag() {
    let mut fallback = external("__default__", Mutability::Nonpayable);
    fallback.frame = FrameInfo {
        start: 64,
        size: 0,
    };
    let module = Module::new(vec![fallback], 0);
    let mut gen = OutlineGenerator::new(HashMap::new(), HashMap::new(), HashMap::new());
    let mut labels = LabelAllocator::new();

    let checked = FunctionGenerator::generate(&mut gen,FnId(0), &module, &mut labels, false).unwrap();
    assert_eq!(checked.ir.to_string(), "(seq (assert (iszero callvalue)) stop)");

    let skipped = FunctionGenerator::generate(&mut gen,FnId(0), &module, &mut labels, true).unwrap();
    assert_eq!(skipped.ir.to_string(), "(seq stop)");
}

#[test]
#[should_panic(expected = "no selector")]
fn test_outline_missing_selector_is_a_bug() {
    let module = Module::new(vec![external("pay", Mutability::Payable)], 0);
    let mut gen = OutlineGenerator::new(HashMap::new(), HashMap::new(), HashMap::new());
    let mut labels = LabelAllocator::new();
    let _ = FunctionGenerator::generate(&mut gen,FnId(0), &module, &mut labels, false);
}

#[test]
fn test_outline_nested_call_lowers_inside_argument() {
    let mut a = external("a", Mutability::Nonpayable);
    a.frame = FrameInfo {
        start: 192,
        size: 0,
    };
    a.callees = vec![FnId(1), FnId(2)];
    let mut outer_help = internal("outer_help");
    outer_help.params = vec![word_param("x")];
    outer_help.frame = FrameInfo {
        start: 128,
        size: 32,
    };
    let mut inner = internal("inner");
    inner.return_type = Some(ValType::Word);
    inner.frame = FrameInfo {
        start: 160,
        size: 0,
    };
    let module = Module::new(vec![a, outer_help, inner], 0);

    let mut selectors = HashMap::new();
    selectors.insert(FnId(0), 305419896);
    let mut calls = HashMap::new();
    calls.insert(
        FnId(0),
        vec![self_call(
            FnId(1),
            vec![arg(7, "self.inner()")],
            "self.outer_help(self.inner())",
        )],
    );
    let mut nested = HashMap::new();
    nested.insert(7, self_call(FnId(2), vec![], "self.inner()"));
    let mut gen = OutlineGenerator::new(selectors, calls, nested);
    let mut labels = LabelAllocator::new();

    let arm = FunctionGenerator::generate(&mut gen,FnId(0), &module, &mut labels, false).unwrap();
    let s = arm.ir.to_string();

    // The inner call lowers first, inside the staged argument store; the
    // outer frame write happens only through the bulk copy.
    assert_eq!(ops(&arm.ir, "unique_symbol").len(), 2);
    assert!(s.contains("(goto internal_inner 192 (symbol internal_inner_call_0))"));
    assert!(s.contains("(goto internal_outer_help (symbol internal_outer_help_call_2))"));
    assert!(s.find("internal_inner_call_0").unwrap() < s.find("internal_outer_help_call_2").unwrap());
    assert!(s.contains("(mcopy 128 224 32)"));
    assert!(!s.contains("(mstore 128"));
    assert_eq!(arm.mem_used, 128);
}

#[test]
fn test_call_site_labels_unique_across_functions() {
    let mut a = external("a", Mutability::Nonpayable);
    a.frame = FrameInfo {
        start: 192,
        size: 0,
    };
    a.callees = vec![FnId(2)];
    let mut b = external("b", Mutability::Nonpayable);
    b.frame = FrameInfo {
        start: 224,
        size: 0,
    };
    b.callees = vec![FnId(2)];
    let mut helper = internal("helper");
    helper.frame = FrameInfo {
        start: 128,
        size: 0,
    };
    let module = Module::new(vec![a, b, helper], 0);

    let mut selectors = HashMap::new();
    selectors.insert(FnId(0), 1);
    selectors.insert(FnId(1), 2);
    let mut calls = HashMap::new();
    calls.insert(FnId(0), vec![self_call(FnId(2), vec![], "self.helper()")]);
    calls.insert(FnId(1), vec![self_call(FnId(2), vec![], "self.helper()")]);
    let mut gen = OutlineGenerator::new(selectors, calls, HashMap::new());

    let ir = generate_ir_for_module(&module, &mut gen).unwrap();
    let s = ir.runtime.to_string();

    // One allocator for the whole compile: the same textual call in two
    // different functions still gets distinct labels and tags.
    let tag = fp8("self.helper()");
    assert!(s.contains("internal_helper_call_0"));
    assert!(s.contains("internal_helper_call_2"));
    assert!(s.contains(&format!("self_call_{tag}_1")));
    assert!(s.contains(&format!("self_call_{tag}_3")));
}
