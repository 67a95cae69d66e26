// emit.rs — Standard expression and statement emission
//
// Renders type-checked IR as C. Action bodies are re-emitted through the
// same path with an `ActionScope` in effect: a path leaf that denotes one of
// the action's own formal parameters is rewritten to a field of the bound
// payload, and every other node recurses unchanged.
//
// Preconditions: every path DeclId resolves in the RefMap.
// Postconditions: statement structure is preserved one-to-one.
// Failure modes: expressions with no C form (ranges, don't-care) are
//   internal errors; they only appear in entries and properties.
// Side effects: appends to the caller's CodeBuilder; allocates fresh names.

use std::collections::{BTreeMap, HashSet};

use crate::builder::{CodeBuilder, Target};
use crate::counter::CounterTable;
use crate::diag::{Diagnostic, InternalError};
use crate::ir::{
    Action, Argument, DeclId, Expr, ExprKind, Program, Stmt, StmtKind, UnaryOp,
};
use crate::names::{NameGen, RefMap, Resolved};
use crate::types::TypeFactory;

/// Read-only collaborators shared by every emission pass.
pub struct EmitContext<'a> {
    pub program: &'a Program,
    pub refs: &'a RefMap,
    pub target: &'a dyn Target,
    pub types: TypeFactory,
    pub counters: &'a BTreeMap<DeclId, CounterTable>,
    pointer_params: HashSet<String>,
}

impl<'a> EmitContext<'a> {
    pub fn new(
        program: &'a Program,
        refs: &'a RefMap,
        target: &'a dyn Target,
        counters: &'a BTreeMap<DeclId, CounterTable>,
    ) -> Self {
        let pointer_params = program
            .context
            .iter()
            .filter(|p| p.c_type.trim_end().ends_with('*'))
            .map(|p| p.name.clone())
            .collect();
        EmitContext {
            program,
            refs,
            target,
            types: TypeFactory,
            counters,
            pointer_params,
        }
    }
}

/// The formal parameters of the action currently being re-emitted, and where
/// their bound values live.
#[derive(Debug, Clone)]
pub struct ActionScope {
    value_name: String,
    variant: String,
    params: HashSet<DeclId>,
}

impl ActionScope {
    pub fn new(value_name: &str, variant: &str, action: &Action) -> Self {
        ActionScope {
            value_name: value_name.to_string(),
            variant: variant.to_string(),
            params: action.params.iter().map(|p| p.decl).collect(),
        }
    }

    /// `value->u.variant.param` if `decl` is one of this action's parameters.
    pub fn param_access(&self, decl: DeclId, name: &str) -> Option<String> {
        self.params
            .contains(&decl)
            .then(|| payload_field(&self.value_name, &self.variant, name))
    }
}

pub fn payload_field(value_name: &str, variant: &str, param: &str) -> String {
    format!("{}->u.{}.{}", value_name, variant, param)
}

pub struct ExprEmitter<'a> {
    pub cx: &'a EmitContext<'a>,
    pub names: &'a mut NameGen,
    pub diagnostics: &'a mut Vec<Diagnostic>,
    scope: Option<ActionScope>,
}

impl<'a> ExprEmitter<'a> {
    pub fn new(
        cx: &'a EmitContext<'a>,
        names: &'a mut NameGen,
        diagnostics: &'a mut Vec<Diagnostic>,
    ) -> Self {
        ExprEmitter {
            cx,
            names,
            diagnostics,
            scope: None,
        }
    }

    /// Run `f` with `scope` in effect, restoring the previous scope after.
    pub fn with_scope<R>(&mut self, scope: ActionScope, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved = self.scope.replace(scope);
        let result = f(self);
        self.scope = saved;
        result
    }

    /// Render an expression to a standalone string.
    pub fn expr_string(&mut self, e: &Expr) -> Result<String, InternalError> {
        let mut b = CodeBuilder::new();
        self.emit_expr(&mut b, e)?;
        Ok(b.into_string())
    }

    // ── Expressions ─────────────────────────────────────────────────────

    pub fn emit_expr(&mut self, b: &mut CodeBuilder, e: &Expr) -> Result<(), InternalError> {
        match &e.kind {
            ExprKind::Path { name, decl } => {
                match self.scope.as_ref().and_then(|s| s.param_access(*decl, name)) {
                    Some(access) => b.append(&access),
                    None => b.append(name),
                }
            }
            ExprKind::Member { base, member } => {
                self.emit_expr(b, base)?;
                if self.is_pointer_param(base) {
                    b.append("->");
                } else {
                    b.append(".");
                }
                b.append(member);
            }
            ExprKind::Constant { value } => {
                if *value > u32::MAX as i64 {
                    b.append_fmt(format_args!("{}ULL", value));
                } else {
                    b.append_fmt(format_args!("{}", value));
                }
            }
            ExprKind::Bool { value } => b.append(if *value { "true" } else { "false" }),
            ExprKind::Unary { op, operand } => {
                let sym = match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Not => "!",
                    UnaryOp::BitNot => "~",
                };
                b.append("(");
                b.append(sym);
                self.emit_expr(b, operand)?;
                b.append(")");
            }
            ExprKind::Binary { op, left, right } => {
                b.append("(");
                self.emit_expr(b, left)?;
                b.append_fmt(format_args!(" {} ", op.c_symbol()));
                self.emit_expr(b, right)?;
                b.append(")");
            }
            ExprKind::Cast { to, expr } => {
                b.append("(");
                self.cx.types.create(to).emit(b);
                b.append(")(");
                self.emit_expr(b, expr)?;
                b.append(")");
            }
            ExprKind::Call { target, args } => {
                self.emit_expr(b, target)?;
                b.append("(");
                self.emit_args(b, args)?;
                b.append(")");
            }
            ExprKind::Mask { value, mask } => {
                b.append("(");
                self.emit_expr(b, value)?;
                b.append(" & ");
                self.emit_expr(b, mask)?;
                b.append(")");
            }
            ExprKind::Constructor { .. } | ExprKind::Range { .. } | ExprKind::DontCare => {
                return Err(InternalError::UnexpectedExpr {
                    construct: e.to_string(),
                })
            }
        }
        Ok(())
    }

    fn emit_args(&mut self, b: &mut CodeBuilder, args: &[Argument]) -> Result<(), InternalError> {
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                b.append(", ");
            }
            self.emit_expr(b, &arg.expr)?;
        }
        Ok(())
    }

    fn is_pointer_param(&self, e: &Expr) -> bool {
        match &e.kind {
            ExprKind::Path { name, decl } => {
                self.cx.pointer_params.contains(name)
                    && !self
                        .scope
                        .as_ref()
                        .is_some_and(|s| s.params.contains(decl))
            }
            _ => false,
        }
    }

    // ── Statements ──────────────────────────────────────────────────────

    pub fn emit_stmts(&mut self, b: &mut CodeBuilder, stmts: &[Stmt]) -> Result<(), InternalError> {
        for stmt in stmts {
            self.emit_stmt(b, stmt)?;
        }
        Ok(())
    }

    /// Emit one statement starting at the current indentation, ending with a
    /// newline.
    pub fn emit_stmt(&mut self, b: &mut CodeBuilder, s: &Stmt) -> Result<(), InternalError> {
        match &s.kind {
            StmtKind::Assign { lhs, rhs } => {
                b.emit_indent();
                self.emit_expr(b, lhs)?;
                b.append(" = ");
                self.emit_expr(b, rhs)?;
                b.end_of_statement(true);
            }
            StmtKind::Call { call } => {
                if let Some((counter, method, args)) = self.counter_method(call) {
                    counter.emit_method_invocation(b, self, method, args, call)?;
                } else {
                    b.emit_indent();
                    self.emit_expr(b, call)?;
                    b.end_of_statement(true);
                }
            }
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                b.emit_indent();
                b.append("if (");
                self.emit_expr(b, cond)?;
                b.append(") ");
                self.emit_braced(b, then)?;
                if let Some(otherwise) = otherwise {
                    b.append(" else ");
                    self.emit_braced(b, otherwise)?;
                }
                b.newline();
            }
            StmtKind::Block { stmts } => {
                b.emit_indent();
                b.block_start();
                self.emit_stmts(b, stmts)?;
                b.block_end(true);
            }
            StmtKind::VarDecl { name, ty, init, .. } => {
                b.emit_indent();
                self.cx.types.create(ty).declare(b, name, false);
                if let Some(init) = init {
                    b.append(" = ");
                    self.emit_expr(b, init)?;
                }
                b.end_of_statement(true);
            }
            StmtKind::Return => {
                // Leaving an action leaves its dispatch branch.
                if self.scope.is_some() {
                    b.statement("break");
                } else {
                    b.statement("return 0");
                }
            }
            StmtKind::Exit => b.statement("return 0"),
            StmtKind::Empty => {}
        }
        Ok(())
    }

    /// `{ ... }` without leading indentation or trailing newline.
    fn emit_braced(&mut self, b: &mut CodeBuilder, s: &Stmt) -> Result<(), InternalError> {
        b.block_start();
        match &s.kind {
            StmtKind::Block { stmts } => self.emit_stmts(b, stmts)?,
            _ => self.emit_stmt(b, s)?,
        }
        b.block_end(false);
        Ok(())
    }

    /// `(counter, method, args)` when `call` invokes a method on a counter
    /// instance.
    fn counter_method<'e>(
        &self,
        call: &'e Expr,
    ) -> Option<(&'a CounterTable, &'e str, &'e [Argument])> {
        let ExprKind::Call { target, args } = &call.kind else {
            return None;
        };
        let ExprKind::Member { base, member } = &target.kind else {
            return None;
        };
        let ExprKind::Path { decl, .. } = &base.kind else {
            return None;
        };
        match self.cx.refs.get(*decl) {
            Some(Resolved::Extern { .. }) => {
                let cx: &'a EmitContext<'a> = self.cx;
                cx.counters
                    .get(decl)
                    .map(|c| (c, member.as_str(), args.as_slice()))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::KernelTarget;
    use crate::ir::{BinOp, ContextParam, Param, SemType, Span};

    fn action() -> Action {
        Action {
            name: "set_port".into(),
            decl: DeclId(10),
            params: vec![Param {
                name: "port".into(),
                decl: DeclId(11),
                ty: SemType::bits(9),
                span: Span::default(),
            }],
            body: vec![],
            span: Span::default(),
        }
    }

    fn program() -> Program {
        Program {
            actions: vec![action()],
            context: vec![ContextParam {
                c_type: "struct headers *".into(),
                name: "hdr".into(),
            }],
            ..Program::default()
        }
    }

    fn render(program: &Program, f: impl FnOnce(&mut ExprEmitter<'_>, &mut CodeBuilder)) -> String {
        let refs = RefMap::new(program).unwrap();
        let counters = BTreeMap::new();
        let target = KernelTarget::default();
        let cx = EmitContext::new(program, &refs, &target, &counters);
        let mut names = NameGen::for_program(program);
        let mut diags = Vec::new();
        let mut em = ExprEmitter::new(&cx, &mut names, &mut diags);
        let mut b = CodeBuilder::new();
        f(&mut em, &mut b);
        b.into_string()
    }

    #[test]
    fn pointer_context_params_use_arrow() {
        let p = program();
        let e = Expr::member(
            Expr::member(Expr::path("hdr", DeclId(1), None), "eth", None),
            "type",
            None,
        );
        let out = render(&p, |em, b| em.emit_expr(b, &e).unwrap());
        assert_eq!(out, "hdr->eth.type");
    }

    #[test]
    fn action_parameters_rewrite_inside_scope_only() {
        let p = program();
        let meta_port = Expr::member(Expr::path("meta", DeclId(2), None), "port", None);
        let stmt = Stmt::assign(meta_port, Expr::path("port", DeclId(11), None));
        let scope = ActionScope::new("value", "set_port", &p.actions[0]);

        let out = render(&p, |em, b| {
            em.with_scope(scope, |em| em.emit_stmt(b, &stmt)).unwrap();
            em.emit_stmt(b, &stmt).unwrap();
        });
        assert_eq!(
            out,
            "meta.port = value->u.set_port.port;\nmeta.port = port;\n"
        );
    }

    #[test]
    fn same_name_different_decl_is_not_rewritten() {
        let p = program();
        // A local that shadows the parameter name resolves to another decl.
        let stmt = Stmt::assign(
            Expr::path("port", DeclId(99), None),
            Expr::binary(
                BinOp::Add,
                Expr::path("port", DeclId(11), None),
                Expr::constant(1, None),
                None,
            ),
        );
        let scope = ActionScope::new("v", "set_port", &p.actions[0]);
        let out = render(&p, |em, b| {
            em.with_scope(scope, |em| em.emit_stmt(b, &stmt)).unwrap();
        });
        assert_eq!(out, "port = (v->u.set_port.port + 1);\n");
    }

    #[test]
    fn if_else_keeps_structure() {
        let p = program();
        let stmt = Stmt::new(StmtKind::If {
            cond: Expr::boolean(true),
            then: Box::new(Stmt::new(StmtKind::Return)),
            otherwise: Some(Box::new(Stmt::new(StmtKind::Block {
                stmts: vec![Stmt::new(StmtKind::Exit)],
            }))),
        });
        let out = render(&p, |em, b| em.emit_stmt(b, &stmt).unwrap());
        assert_eq!(out, "if (true) {\n    return 0;\n} else {\n    return 0;\n}\n");
    }

    #[test]
    fn wide_constants_get_suffix_and_ranges_are_rejected() {
        let p = program();
        let out = render(&p, |em, b| {
            em.emit_expr(b, &Expr::constant(1 << 40, None)).unwrap();
        });
        assert_eq!(out, "1099511627776ULL");

        let range = Expr::new(
            ExprKind::Range {
                low: Box::new(Expr::constant(1, None)),
                high: Box::new(Expr::constant(2, None)),
            },
            None,
        );
        render(&p, |em, b| {
            assert!(matches!(
                em.emit_expr(b, &range),
                Err(InternalError::UnexpectedExpr { .. })
            ));
        });
    }
}
