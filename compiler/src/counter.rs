// counter.rs — Counter array lowering
//
// A `CounterArray(max_index, sparse)` instance becomes one map of u32
// counters. `increment(i)` and `add(i, d)` lower to a lookup followed by an
// atomic add on a hit or an insert on a miss. The lookup and the insert are
// not atomic together; concurrent misses on one slot can lose an update.
//
// Preconditions: the extern is a CounterArray instance.
// Postconditions: sparse → hash storage, dense → array storage.
// Failure modes: bad constructor arguments → E0400/E0402/E0501 and no
//   descriptor; unknown method → E0205; wrong arity → InternalError.
// Side effects: appends to the diagnostics Vec; allocates fresh names.

use tracing::debug;

use crate::builder::CodeBuilder;
use crate::diag::{codes, Diagnostic, InternalError};
use crate::emit::ExprEmitter;
use crate::ir::{argument, Argument, DeclId, Expr, ExprKind, ExternInstance, Span};
use crate::model::{
    COUNTER_ADD, COUNTER_INCREMENT, COUNTER_INDEX_TYPE, COUNTER_MAX_INDEX_PARAM,
    COUNTER_SPARSE_PARAM, COUNTER_VALUE_TYPE,
};
use crate::table::constant_capacity;
use crate::table_kind::{select_counter_kind, TableKind};

#[derive(Debug, Clone)]
pub struct CounterTable {
    pub name: String,
    pub decl: DeclId,
    pub capacity: u32,
    pub kind: TableKind,
    pub key_type: String,
    pub value_type: String,
    pub span: Span,
}

impl CounterTable {
    /// Read the constructor arguments; `None` after reporting a diagnostic.
    pub fn build(ext: &ExternInstance, diags: &mut Vec<Diagnostic>) -> Option<CounterTable> {
        let Some(size) = argument(&ext.args, COUNTER_MAX_INDEX_PARAM, 0) else {
            diags.push(Diagnostic::error(
                codes::E0400,
                ext.span,
                format!(
                    "{} ({}): expected an integer argument",
                    COUNTER_MAX_INDEX_PARAM, ext.name
                ),
            ));
            return None;
        };
        let capacity = constant_capacity(size, &ext.name, COUNTER_MAX_INDEX_PARAM, diags)?;

        let sparse = match argument(&ext.args, COUNTER_SPARSE_PARAM, 1).map(|e| &e.kind) {
            Some(ExprKind::Bool { value }) => *value,
            _ => {
                diags.push(Diagnostic::error(
                    codes::E0400,
                    ext.span,
                    format!(
                        "{} ({}): expected a boolean argument",
                        COUNTER_SPARSE_PARAM, ext.name
                    ),
                ));
                return None;
            }
        };

        let kind = select_counter_kind(sparse);
        debug!(counter = %ext.name, capacity, %kind, "counter storage");
        Some(CounterTable {
            name: ext.name.clone(),
            decl: ext.decl,
            capacity,
            kind,
            key_type: format!("{}_key", ext.name),
            value_type: format!("{}_value", ext.name),
            span: ext.span,
        })
    }

    pub fn emit_types(&self, b: &mut CodeBuilder) {
        b.statement(&format!("typedef {} {}", COUNTER_INDEX_TYPE, self.key_type));
        b.statement(&format!("typedef {} {}", COUNTER_VALUE_TYPE, self.value_type));
    }

    pub fn emit_instance(&self, b: &mut CodeBuilder, em: &ExprEmitter<'_>) {
        em.cx.target.emit_table_decl(
            b,
            &self.name,
            self.kind,
            &self.key_type,
            &self.value_type,
            self.capacity,
        );
    }

    pub fn emit_method_invocation(
        &self,
        b: &mut CodeBuilder,
        em: &mut ExprEmitter<'_>,
        method: &str,
        args: &[Argument],
        call: &Expr,
    ) -> Result<(), InternalError> {
        let expected = match method {
            COUNTER_INCREMENT => 1,
            COUNTER_ADD => 2,
            _ => {
                em.diagnostics.push(Diagnostic::error(
                    codes::E0205,
                    call.span,
                    format!("{}: unexpected method {} for {}", call, method, self.name),
                ));
                return Ok(());
            }
        };
        if args.len() != expected {
            return Err(InternalError::MethodArity {
                construct: call.to_string(),
                expected,
                got: args.len(),
            });
        }

        let key = em.names.new_name("key");
        let value = em.names.new_name("value");

        b.statement(&format!("{} *{}", self.value_type, value));
        let init_val = if method == COUNTER_INCREMENT {
            let init = em.names.new_name("init_val");
            b.statement(&format!("{} {} = 1", self.value_type, init));
            Some(init)
        } else {
            None
        };

        let index = em.expr_string(&args[0].expr)?;
        b.statement(&format!("{} {} = {}", self.key_type, key, index));

        // add() seeds a missing slot with the delta itself.
        let (delta, init) = match init_val {
            Some(init) => ("1".to_string(), init),
            None => {
                let inc = em.names.new_name("inc");
                let amount = em.expr_string(&args[1].expr)?;
                b.statement(&format!("{} {} = {}", self.value_type, inc, amount));
                (inc.clone(), inc)
            }
        };

        let target = em.cx.target;
        b.emit_indent();
        target.emit_table_lookup(b, &self.name, &key, &value);
        b.end_of_statement(true);

        b.emit_indent();
        b.append_fmt(format_args!("if ({} != NULL)", value));
        b.newline();
        b.increase_indent();
        b.statement(&format!("__sync_fetch_and_add({}, {})", value, delta));
        b.decrease_indent();

        b.emit_indent();
        b.append_line("else");
        b.increase_indent();
        b.emit_indent();
        target.emit_table_update(b, &self.name, &key, &init);
        b.newline();
        b.decrease_indent();
        Ok(())
    }
}
