// test_support.rs — Shared fixtures for unit tests

use std::collections::BTreeMap;

use crate::builder::{CodeBuilder, KernelTarget};
use crate::counter::CounterTable;
use crate::diag::{Diagnostic, InternalError};
use crate::emit::{EmitContext, ExprEmitter};
use crate::ir::*;
use crate::names::{NameGen, RefMap};

pub(crate) struct Harness {
    pub program: Program,
    pub refs: RefMap,
    pub counters: BTreeMap<DeclId, CounterTable>,
    pub target: KernelTarget,
    pub names: NameGen,
    pub diags: Vec<Diagnostic>,
}

impl Harness {
    pub fn new(program: Program) -> Self {
        let refs = RefMap::new(&program).unwrap();
        let names = NameGen::for_program(&program);
        Harness {
            program,
            refs,
            counters: BTreeMap::new(),
            target: KernelTarget::default(),
            names,
            diags: Vec::new(),
        }
    }

    pub fn traced(mut self) -> Self {
        self.target.emit_trace_messages = true;
        self
    }

    pub fn emit(
        &mut self,
        f: impl FnOnce(&mut ExprEmitter<'_>, &mut CodeBuilder) -> Result<(), InternalError>,
    ) -> String {
        let cx = EmitContext::new(&self.program, &self.refs, &self.target, &self.counters);
        let mut em = ExprEmitter::new(&cx, &mut self.names, &mut self.diags);
        let mut b = CodeBuilder::new();
        f(&mut em, &mut b).unwrap();
        b.into_string()
    }
}

pub(crate) fn hdr_field(header: &str, field: &str, width: u32) -> Expr {
    Expr::member(
        Expr::member(Expr::path("hdr", DeclId(900), None), header, None),
        field,
        Some(SemType::bits(width)),
    )
}

pub(crate) fn key_element(expr: Expr, match_kind: &str) -> KeyElement {
    KeyElement {
        expr,
        match_kind: match_kind.to_string(),
        span: Span::default(),
    }
}

pub(crate) fn action(name: &str, decl: u32, params: &[(&str, u32)]) -> Action {
    Action {
        name: name.to_string(),
        decl: DeclId(decl),
        params: params
            .iter()
            .enumerate()
            .map(|(i, (p, w))| Param {
                name: p.to_string(),
                decl: DeclId(decl * 100 + i as u32 + 1),
                ty: SemType::bits(*w),
                span: Span::default(),
            })
            .collect(),
        body: vec![],
        span: Span::default(),
    }
}

pub(crate) fn action_ref(a: &Action) -> ActionRef {
    ActionRef {
        name: a.name.clone(),
        decl: a.decl,
        span: Span::default(),
    }
}

pub(crate) fn action_call(a: &Action, args: Vec<Expr>) -> Expr {
    Expr::call(
        Expr::path(&a.name, a.decl, None),
        args.into_iter().map(Argument::positional).collect(),
    )
}

pub(crate) fn implementation(ctor: &str, size: i64) -> Property {
    Property {
        name: "implementation".into(),
        value: PropertyValue::Expression {
            expr: Expr::constructor(
                ctor,
                vec![Argument::named("size", Expr::constant(size, None))],
            ),
        },
        span: Span::default(),
    }
}

pub(crate) fn context() -> Vec<ContextParam> {
    vec![ContextParam {
        c_type: "struct headers *".into(),
        name: "hdr".into(),
    }]
}
