//! Module manifests.
//!
//! Semantic analysis lives in the front end; what crosses into this
//! crate is a JSON manifest describing one checked module: functions
//! with frames and mutability, the resolved call graph, dispatch
//! selectors, and the immutable-section size. Loading validates the
//! user-visible structure into diagnostics; what survives becomes a
//! `Module` plus the tables the outline generator consumes. This is the
//! only name-keyed boundary: past it, functions are `FnId` handles.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::codegen::outline::OutlineGenerator;
use crate::codegen::self_call::SelfCall;
use crate::codegen::{generate_ir_for_module, ModuleIr};
use crate::diagnostic::Diagnostic;
use crate::sig::{ArgExpr, FnId, FrameInfo, FunctionSpec, Module, Mutability, Param, Visibility};
use crate::span::Span;
use crate::types::{ValType, MAX_VALUE_SIZE};

// ─── Wire form ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    contract: String,
    #[serde(default)]
    source_file: Option<String>,
    /// Original contract source, embedded for diagnostic rendering.
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    immutables_len: u32,
    functions: Vec<RawFunction>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFunction {
    name: String,
    visibility: Visibility,
    mutability: Mutability,
    #[serde(default)]
    params: Vec<RawParam>,
    #[serde(default)]
    returns: Option<ValType>,
    frame: FrameInfo,
    /// Dispatch selector, required for selector-dispatched functions.
    #[serde(default)]
    selector: Option<u32>,
    #[serde(default)]
    calls: Vec<RawCall>,
    #[serde(default)]
    gas_estimate: u64,
    #[serde(default)]
    span: Span,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawParam {
    name: String,
    #[serde(rename = "type")]
    typ: ValType,
    /// Source text of a trailing default-value expression.
    #[serde(default)]
    default: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCall {
    callee: String,
    #[serde(default)]
    args: Vec<RawArg>,
    #[serde(default)]
    src: Option<String>,
    #[serde(default)]
    span: Span,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum RawArg {
    Literal { src: String },
    Call { call: RawCall },
}

// ─── Loaded form ──────────────────────────────────────────────────

/// A validated module manifest, ready to compile.
#[derive(Debug)]
pub struct Manifest {
    pub contract: String,
    pub source_file: String,
    pub source: Option<String>,
    pub module: Module,
    selectors: HashMap<FnId, u32>,
    calls: HashMap<FnId, Vec<SelfCall>>,
    nested: HashMap<u32, SelfCall>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Manifest, Vec<Diagnostic>> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            vec![Diagnostic::error(
                format!("cannot read '{}': {}", path.display(), e),
                Span::dummy(),
            )]
        })?;
        Self::from_json(&text, &path.display().to_string())
    }

    pub fn from_json(text: &str, origin: &str) -> Result<Manifest, Vec<Diagnostic>> {
        let raw: RawManifest = serde_json::from_str(text).map_err(|e| {
            vec![Diagnostic::error(
                format!("invalid manifest '{}': {}", origin, e),
                Span::dummy(),
            )]
        })?;
        Loader::default().finish(raw, origin)
    }

    /// The reference generator wired with this manifest's selector and
    /// call tables.
    pub fn outline_generator(&self) -> OutlineGenerator {
        OutlineGenerator::new(
            self.selectors.clone(),
            self.calls.clone(),
            self.nested.clone(),
        )
    }

    /// Compile with the outline generator.
    pub fn compile(&self) -> Result<ModuleIr, Vec<Diagnostic>> {
        let mut generator = self.outline_generator();
        generate_ir_for_module(&self.module, &mut generator).map_err(|d| vec![d])
    }
}

// ─── Validation ───────────────────────────────────────────────────

#[derive(Default)]
struct Loader {
    names: HashMap<String, FnId>,
    diags: Vec<Diagnostic>,
    nested: HashMap<u32, SelfCall>,
    next_expr_id: u32,
}

impl Loader {
    fn finish(mut self, raw: RawManifest, origin: &str) -> Result<Manifest, Vec<Diagnostic>> {
        for (i, func) in raw.functions.iter().enumerate() {
            let id = FnId(i as u32);
            if self.names.insert(func.name.clone(), id).is_some() {
                self.error(format!("duplicate function `{}`", func.name), func.span);
            }
        }

        let mut functions = Vec::with_capacity(raw.functions.len());
        let mut selectors = HashMap::new();
        let mut calls: HashMap<FnId, Vec<SelfCall>> = HashMap::new();

        for (i, func) in raw.functions.iter().enumerate() {
            let id = FnId(i as u32);
            self.check_roles(func);

            let params = self.convert_params(func);
            let resolved: Vec<SelfCall> = func
                .calls
                .iter()
                .filter_map(|c| self.resolve_call(c, func.span))
                .collect();

            // Callee edges cover every call in the body, nested argument
            // calls included; only internal targets become graph edges
            // (an external target is the lowerer's structural error, not
            // an edge).
            let mut callees = Vec::new();
            for call in &resolved {
                collect_callees(call, &self.nested, &mut callees);
            }
            callees.retain(|c| raw.functions[c.0 as usize].visibility == Visibility::Internal);
            dedup_keep_first(&mut callees);

            if let Some(selector) = func.selector {
                selectors.insert(id, selector);
            }
            calls.insert(id, resolved);

            functions.push(FunctionSpec {
                name: func.name.clone(),
                visibility: func.visibility,
                mutability: func.mutability,
                params,
                return_type: func.returns.clone(),
                frame: func.frame,
                callees,
                gas_estimate: func.gas_estimate,
                span: func.span,
            });
        }

        if raw.immutables_len != 0 && !functions.iter().any(|f| f.is_constructor()) {
            self.error(
                format!(
                    "module declares {} bytes of immutables but no constructor to assign them",
                    raw.immutables_len
                ),
                Span::dummy(),
            );
        }

        if !self.diags.is_empty() {
            return Err(self.diags);
        }

        Ok(Manifest {
            contract: raw.contract,
            source_file: raw.source_file.unwrap_or_else(|| origin.to_string()),
            source: raw.source,
            module: Module::new(functions, raw.immutables_len),
            selectors,
            calls,
            nested: self.nested,
        })
    }

    fn check_roles(&mut self, func: &RawFunction) {
        let is_constructor = func.name == "__init__";
        let is_fallback = func.name == "__default__";

        if (is_constructor || is_fallback) && func.visibility == Visibility::Internal {
            self.error(
                format!("`{}` must be external", func.name),
                func.span,
            );
        }
        if is_fallback {
            if !func.params.is_empty() {
                self.error("fallback function takes no parameters".to_string(), func.span);
            }
            if func.returns.is_some() {
                self.error("fallback function cannot return a value".to_string(), func.span);
            }
        }
        if is_constructor && func.returns.is_some() {
            self.error("constructor cannot return a value".to_string(), func.span);
        }

        let is_regular =
            func.visibility == Visibility::External && !is_constructor && !is_fallback;
        if is_regular && func.selector.is_none() {
            self.error(
                format!("external function `{}` needs a selector", func.name),
                func.span,
            );
        }
        if !is_regular && func.selector.is_some() {
            self.error(
                format!("`{}` is not selector-dispatched, drop its selector", func.name),
                func.span,
            );
        }

        for param in &func.params {
            self.check_value_size(
                &param.typ,
                &format!("parameter `{}` of `{}`", param.name, func.name),
                func.span,
            );
        }
        if let Some(ret) = &func.returns {
            self.check_value_size(ret, &format!("return value of `{}`", func.name), func.span);
        }

        let args_size: u64 = func.params.iter().map(|p| p.typ.memory_size()).sum();
        if args_size > func.frame.size as u64 {
            self.error(
                format!(
                    "frame of `{}` holds {} bytes but its parameters need {}",
                    func.name, func.frame.size, args_size
                ),
                func.span,
            );
        }
    }

    fn check_value_size(&mut self, typ: &ValType, what: &str, span: Span) {
        if typ.memory_size() > MAX_VALUE_SIZE {
            self.error(
                format!(
                    "{what}: type `{}` exceeds the {MAX_VALUE_SIZE}-byte value size limit",
                    typ.display()
                ),
                span,
            );
        }
    }

    fn convert_params(&mut self, func: &RawFunction) -> Vec<Param> {
        let mut seen_default = false;
        let mut params = Vec::with_capacity(func.params.len());
        for raw in &func.params {
            if raw.default.is_some() {
                seen_default = true;
            } else if seen_default {
                self.error(
                    format!(
                        "parameter `{}` of `{}` follows a defaulted parameter",
                        raw.name, func.name
                    ),
                    func.span,
                );
            }
            let default = raw.default.as_ref().map(|src| ArgExpr {
                id: self.fresh_expr_id(),
                src: src.clone(),
                span: func.span,
            });
            params.push(Param {
                name: raw.name.clone(),
                typ: raw.typ.clone(),
                default,
            });
        }
        params
    }

    fn resolve_call(&mut self, raw: &RawCall, fallback_span: Span) -> Option<SelfCall> {
        let span = if raw.span.is_dummy() { fallback_span } else { raw.span };
        let callee = match self.names.get(&raw.callee) {
            Some(id) => *id,
            None => {
                self.error(format!("call to undefined function `{}`", raw.callee), span);
                return None;
            }
        };

        let mut args = Vec::with_capacity(raw.args.len());
        for arg in &raw.args {
            let id = self.fresh_expr_id();
            match arg {
                RawArg::Literal { src } => args.push(ArgExpr {
                    id,
                    src: src.clone(),
                    span,
                }),
                RawArg::Call { call } => {
                    let nested = self.resolve_call(call, span)?;
                    args.push(ArgExpr {
                        id,
                        src: nested.src.clone(),
                        span: nested.span,
                    });
                    self.nested.insert(id, nested);
                }
            }
        }

        Some(SelfCall {
            callee,
            args,
            src: raw.src.clone().unwrap_or_else(|| render_call_src(raw)),
            span,
        })
    }

    fn fresh_expr_id(&mut self) -> u32 {
        let id = self.next_expr_id;
        self.next_expr_id += 1;
        id
    }

    fn error(&mut self, message: String, span: Span) {
        self.diags.push(Diagnostic::error(message, span));
    }
}

/// Direct callees of `call`, nested argument calls included, in
/// evaluation order.
fn collect_callees(call: &SelfCall, nested: &HashMap<u32, SelfCall>, out: &mut Vec<FnId>) {
    out.push(call.callee);
    for arg in &call.args {
        if let Some(inner) = nested.get(&arg.id) {
            collect_callees(inner, nested, out);
        }
    }
}

fn dedup_keep_first(ids: &mut Vec<FnId>) {
    let mut seen = std::collections::HashSet::new();
    ids.retain(|id| seen.insert(*id));
}

fn render_call_src(raw: &RawCall) -> String {
    let args: Vec<String> = raw
        .args
        .iter()
        .map(|a| match a {
            RawArg::Literal { src } => src.clone(),
            RawArg::Call { call } => render_call_src(call),
        })
        .collect();
    format!("self.{}({})", raw.callee, args.join(", "))
}
