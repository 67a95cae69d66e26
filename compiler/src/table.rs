// table.rs — Table descriptor and its emission passes
//
// A `TableDescriptor` is built once per table: key layout, value layout,
// storage kind, capacity, the resolved default action, and literal entries.
// The emission passes (types, instance, key, dispatch, apply, initializer)
// read it without mutating it.
//
// Preconditions: the program is type-checked; action calls name actions.
// Postconditions: a descriptor built without error diagnostics has a kind
//   and a capacity whenever the table has a key.
// Failure modes: configuration problems become diagnostics (E02xx, E03xx,
//   E04xx, E0501); unresolvable action calls are InternalErrors.
// Side effects: appends to the diagnostics Vec; allocates fresh names.

use tracing::debug;

use crate::builder::{CodeBuilder, Target};
use crate::diag::{codes, Diagnostic, InternalError};
use crate::emit::{payload_field, ActionScope, ExprEmitter};
use crate::ir::{argument, DeclId, Expr, ExprKind, Program, PropertyValue, Span, Table};
use crate::key_layout::{KeyLayout, MatchKind};
use crate::model::{
    ARRAY_INDEX_TYPE, ARRAY_TABLE, HASH_TABLE, TABLE_IMPL_PROPERTY, TABLE_SIZE_PARAM, ZERO_KEY,
};
use crate::table_kind::{select_table_kind, KindError, TableKind};
use crate::types::TypeFactory;
use crate::value_layout::{ActionVariant, ValueLayout};

/// Read a map capacity from a constructor argument. Diagnostics name the
/// owning table or extern and the property carrying the capacity.
pub fn constant_capacity(
    expr: &Expr,
    owner: &str,
    property: &str,
    diags: &mut Vec<Diagnostic>,
) -> Option<u32> {
    let ExprKind::Constant { value } = expr.kind else {
        diags.push(Diagnostic::error(
            codes::E0400,
            expr.span,
            format!("{}: {}: expected an integer argument, got {}", owner, property, expr),
        ));
        return None;
    };
    if value > i32::MAX as i64 {
        diags.push(Diagnostic::error(
            codes::E0501,
            expr.span,
            format!("{}: {}: size {} too large", owner, property, value),
        ));
        return None;
    }
    if value <= 0 {
        diags.push(Diagnostic::error(
            codes::E0402,
            expr.span,
            format!("{}: {}: size must be positive, got {}", owner, property, value),
        ));
        return None;
    }
    Some(value as u32)
}

/// An action call with its arguments matched to the action's parameters.
#[derive(Debug, Clone)]
pub struct BoundCall {
    pub action: DeclId,
    /// `(parameter, argument)` in parameter order.
    pub args: Vec<(String, Expr)>,
    pub span: Span,
}

impl BoundCall {
    pub fn resolve(call: &Expr, program: &Program) -> Result<BoundCall, InternalError> {
        let not_an_action = || InternalError::NotAnActionCall {
            construct: call.to_string(),
        };
        let ExprKind::Call { target, args } = &call.kind else {
            return Err(not_an_action());
        };
        let ExprKind::Path { decl, .. } = &target.kind else {
            return Err(not_an_action());
        };
        let action = program.action(*decl).ok_or_else(not_an_action)?;

        let mut bound = Vec::with_capacity(action.params.len());
        for (i, p) in action.params.iter().enumerate() {
            let arg = argument(args, &p.name, i).ok_or_else(|| InternalError::MissingArgument {
                call: call.to_string(),
                param: p.name.clone(),
            })?;
            bound.push((p.name.clone(), arg.clone()));
        }
        Ok(BoundCall {
            action: action.decl,
            args: bound,
            span: call.span,
        })
    }
}

#[derive(Debug, Clone)]
pub struct LiteralEntry {
    /// Key values in declaration order.
    pub keys: Vec<Expr>,
    pub call: BoundCall,
}

#[derive(Debug)]
pub struct TableDescriptor {
    pub name: String,
    pub decl: DeclId,
    pub key_type: String,
    pub value_type: String,
    pub default_map: String,
    pub key: KeyLayout,
    has_key: bool,
    pub value: ValueLayout,
    pub kind: Option<TableKind>,
    pub capacity: Option<u32>,
    pub default_action: BoundCall,
    pub entries: Vec<LiteralEntry>,
}

impl TableDescriptor {
    pub fn build(
        table: &Table,
        program: &Program,
        types: &TypeFactory,
        diags: &mut Vec<Diagnostic>,
    ) -> Result<TableDescriptor, InternalError> {
        let elements = table.key.as_deref().unwrap_or(&[]);
        KeyLayout::validate(elements, diags);
        let key = KeyLayout::build(elements, types, diags)?;
        let value = ValueLayout::build(&table.name, &table.actions, program, types, diags)?;

        let (kind, capacity) = match table.key {
            Some(_) => match Self::storage(table, &key, diags) {
                Some((kind, capacity)) => (Some(kind), Some(capacity)),
                None => (None, None),
            },
            None => (None, None),
        };

        let default_action = BoundCall::resolve(&table.default_action, program)?;
        Self::check_listed(table, &value, &default_action)?;

        let mut entries = Vec::new();
        match (&table.entries, &table.key) {
            (Some(list), None) if !list.is_empty() => {
                diags.push(Diagnostic::error(
                    codes::E0207,
                    list[0].span,
                    format!("{}: literal entries require a key", table.name),
                ));
            }
            (Some(list), Some(_)) => {
                for entry in list {
                    if entry.keys.len() != elements.len() {
                        return Err(InternalError::EntryArity {
                            table: table.name.clone(),
                            expected: elements.len(),
                            got: entry.keys.len(),
                        });
                    }
                    Self::check_entry_keys(&key, &entry.keys, diags);
                    let call = BoundCall::resolve(&entry.action, program)?;
                    Self::check_listed(table, &value, &call)?;
                    entries.push(LiteralEntry {
                        keys: entry.keys.clone(),
                        call,
                    });
                }
            }
            _ => {}
        }

        debug!(
            table = %table.name,
            kind = ?kind,
            capacity = ?capacity,
            fields = key.fields.len(),
            actions = value.variants.len(),
            entries = entries.len(),
            "table descriptor"
        );

        Ok(TableDescriptor {
            name: table.name.clone(),
            decl: table.decl,
            key_type: format!("{}_key", table.name),
            value_type: format!("{}_value", table.name),
            default_map: format!("{}_defaultAction", table.name),
            key,
            has_key: table.key.is_some(),
            value,
            kind,
            capacity,
            default_action,
            entries,
        })
    }

    /// Storage kind and capacity from the `implementation` property.
    fn storage(
        table: &Table,
        key: &KeyLayout,
        diags: &mut Vec<Diagnostic>,
    ) -> Option<(TableKind, u32)> {
        let Some(prop) = table.property(TABLE_IMPL_PROPERTY) else {
            diags.push(
                Diagnostic::error(
                    codes::E0300,
                    table.span,
                    format!(
                        "{}: table does not have an {} property",
                        table.name, TABLE_IMPL_PROPERTY
                    ),
                )
                .with_hint(format!(
                    "add `{} = {}(<size>)`",
                    TABLE_IMPL_PROPERTY, HASH_TABLE
                )),
            );
            return None;
        };
        let ctor = match &prop.value {
            PropertyValue::Expression { expr } => match &expr.kind {
                ExprKind::Constructor { extern_type, args } => Some((extern_type, args)),
                _ => None,
            },
            _ => None,
        };
        let Some((extern_type, args)) = ctor else {
            diags.push(Diagnostic::error(
                codes::E0301,
                prop.span,
                format!("{}: expected property to be an extern block", prop.name),
            ));
            return None;
        };
        let declared = match extern_type.as_str() {
            ARRAY_TABLE => TableKind::Array,
            HASH_TABLE => TableKind::Hash,
            other => {
                diags.push(Diagnostic::error(
                    codes::E0302,
                    prop.span,
                    format!(
                        "{}: implementation must be one of {} or {}, got {}",
                        prop.name, ARRAY_TABLE, HASH_TABLE, other
                    ),
                ));
                return None;
            }
        };

        let kind = match select_table_kind(declared, key.key_shape()) {
            Ok(kind) => kind,
            Err(KindError::MultipleLpm) => {
                let lpm: Vec<_> = table
                    .key
                    .iter()
                    .flatten()
                    .filter(|e| MatchKind::from_name(&e.match_kind) == MatchKind::Lpm)
                    .collect();
                let mut d = Diagnostic::error(
                    codes::E0201,
                    lpm.get(1).map(|e| e.span).unwrap_or(table.span),
                    format!("{}: only one lpm field allowed", table.name),
                );
                if let Some(first) = lpm.first() {
                    d = d.with_related(first.span, "first lpm field here");
                }
                diags.push(d);
                return None;
            }
        };

        let Some(size) = argument(args, TABLE_SIZE_PARAM, 0) else {
            diags.push(Diagnostic::error(
                codes::E0400,
                prop.span,
                format!("{}: expected an integer argument", extern_type),
            ));
            return None;
        };
        let capacity = constant_capacity(size, &table.name, TABLE_IMPL_PROPERTY, diags)?;
        debug!(table = %table.name, %declared, %kind, "table kind");
        Some((kind, capacity))
    }

    fn check_entry_keys(key: &KeyLayout, values: &[Expr], diags: &mut Vec<Diagnostic>) {
        for (i, v) in values.iter().enumerate() {
            let partial = matches!(
                v.kind,
                ExprKind::Mask { .. } | ExprKind::Range { .. } | ExprKind::DontCare
            );
            let block = key.field_at(i).is_some_and(|f| !f.ty.generates_scalar());
            if partial || block {
                diags.push(Diagnostic::error(
                    codes::E0206,
                    v.span,
                    format!(
                        "{}: only fully specified scalar values are supported in literal entries",
                        v
                    ),
                ));
            }
        }
    }

    fn check_listed(
        table: &Table,
        value: &ValueLayout,
        call: &BoundCall,
    ) -> Result<(), InternalError> {
        match value.variant_for(call.action) {
            Some(_) => Ok(()),
            None => Err(InternalError::UnknownDecl {
                construct: format!("{}: action outside the table's action list", table.name),
                id: call.action.0,
            }),
        }
    }

    pub fn has_key(&self) -> bool {
        self.has_key
    }

    fn variant(&self, call: &BoundCall) -> Result<&ActionVariant, InternalError> {
        self.value
            .variant_for(call.action)
            .ok_or_else(|| InternalError::UnknownDecl {
                construct: self.name.clone(),
                id: call.action.0,
            })
    }

    // ── Types and instances ─────────────────────────────────────────────

    pub fn emit_types(&self, b: &mut CodeBuilder, diags: &mut Vec<Diagnostic>) {
        self.key.emit_key_type(b, &self.key_type, diags);
        self.value.emit_value_type(b, &self.value_type);
    }

    pub fn emit_instance(&self, b: &mut CodeBuilder, target: &dyn Target) {
        if let (true, Some(kind), Some(capacity)) = (self.has_key, self.kind, self.capacity) {
            target.emit_table_decl(
                b,
                &self.name,
                kind,
                &format!("struct {}", self.key_type),
                &format!("struct {}", self.value_type),
                capacity,
            );
        }
        target.emit_table_decl(
            b,
            &self.default_map,
            TableKind::Array,
            ARRAY_INDEX_TYPE,
            &format!("struct {}", self.value_type),
            1,
        );
    }

    // ── Packet path ─────────────────────────────────────────────────────

    pub fn emit_key(
        &self,
        b: &mut CodeBuilder,
        em: &mut ExprEmitter<'_>,
        key_name: &str,
    ) -> Result<(), InternalError> {
        if !self.has_key {
            return Ok(());
        }
        self.key.emit_key(b, em, key_name)
    }

    /// Switch on the discriminant of `value_name`, running the bound action.
    pub fn emit_action(
        &self,
        b: &mut CodeBuilder,
        em: &mut ExprEmitter<'_>,
        value_name: &str,
        action_run: Option<&str>,
    ) -> Result<(), InternalError> {
        let target = em.cx.target;
        let program = em.cx.program;

        b.emit_indent();
        b.append_fmt(format_args!("switch ({}->action) ", value_name));
        b.block_start();

        for v in &self.value.variants {
            let action = program
                .action(v.action)
                .ok_or_else(|| InternalError::UnknownDecl {
                    construct: self.name.clone(),
                    id: v.action.0,
                })?;

            b.emit_indent();
            b.append_fmt(format_args!("case {}:", v.id_name));
            b.newline();
            b.increase_indent();

            target.emit_trace_message(
                b,
                &format!("Control: executing action {}", v.action_name),
                &[],
            );
            for p in &v.params {
                if p.ty.generates_scalar() {
                    let arg = format!(
                        "(unsigned long long) ({})",
                        payload_field(value_name, &v.variant, &p.name)
                    );
                    target.emit_trace_message(
                        b,
                        &format!("Control: param {}=0x%llx ({} bits)", p.name, p.width),
                        &[&arg],
                    );
                } else {
                    target.emit_trace_message(
                        b,
                        &format!("Control: param {} ({} bits)", p.name, p.width),
                        &[],
                    );
                }
            }

            b.emit_indent();
            b.block_start();
            let scope = ActionScope::new(value_name, &v.variant, action);
            em.with_scope(scope, |em| em.emit_stmts(b, &action.body))?;
            b.block_end(true);
            b.statement("break");
            b.decrease_indent();
        }

        b.emit_indent();
        b.append_line("default:");
        b.increase_indent();
        target.emit_trace_message(b, "Control: Invalid action type, aborting", &[]);
        b.statement(&format!("return {}", target.abort_return_code()));
        b.decrease_indent();
        b.block_end(true);

        if let Some(run) = action_run {
            b.statement(&format!("{} = {}->action", run, value_name));
        }
        Ok(())
    }

    /// Look up the table (falling back to the default action) and dispatch.
    ///
    /// `hit` and `action_run` name caller-declared variables that receive
    /// whether the data map matched and the discriminant taken.
    pub fn emit_apply(
        &self,
        b: &mut CodeBuilder,
        em: &mut ExprEmitter<'_>,
        hit: Option<&str>,
        action_run: Option<&str>,
    ) -> Result<(), InternalError> {
        let target = em.cx.target;
        let value = em.names.new_name("value");

        b.emit_indent();
        b.block_start();
        if let Some(hit) = hit {
            b.statement(&format!("{} = 0", hit));
        }

        let key = if self.has_key {
            let key = em.names.new_name("key");
            b.statement(&format!("struct {} {} = {{}}", self.key_type, key));
            self.emit_key(b, em, &key)?;
            Some(key)
        } else {
            None
        };

        b.statement(&format!("struct {} *{} = NULL", self.value_type, value));
        match key {
            Some(key) => {
                b.emit_indent();
                target.emit_table_lookup(b, &self.name, &key, &value);
                b.end_of_statement(true);

                b.emit_indent();
                b.append_fmt(format_args!("if ({} == NULL) ", value));
                b.block_start();
                self.emit_default_lookup(b, target, &value);
                match hit {
                    Some(hit) => {
                        b.block_end(false);
                        b.append(" else ");
                        b.block_start();
                        b.statement(&format!("{} = 1", hit));
                        b.block_end(true);
                    }
                    None => b.block_end(true),
                }
            }
            None => self.emit_default_lookup(b, target, &value),
        }

        b.emit_indent();
        b.append_fmt(format_args!("if ({} == NULL) ", value));
        b.block_start();
        target.emit_trace_message(
            b,
            &format!("Control: {} has no default action, aborting", self.name),
            &[],
        );
        b.statement(&format!("return {}", target.abort_return_code()));
        b.block_end(true);

        self.emit_action(b, em, &value, action_run)?;
        b.block_end(true);
        Ok(())
    }

    fn emit_default_lookup(&self, b: &mut CodeBuilder, target: &dyn Target, value: &str) {
        target.emit_trace_message(
            b,
            &format!("Control: {} miss, using default action", self.name),
            &[],
        );
        b.emit_indent();
        target.emit_table_lookup(b, &self.default_map, ZERO_KEY, value);
        b.end_of_statement(true);
    }

    // ── User space ──────────────────────────────────────────────────────

    /// Load-time code writing the default action and the literal entries.
    pub fn emit_initializer(
        &self,
        b: &mut CodeBuilder,
        em: &mut ExprEmitter<'_>,
    ) -> Result<(), InternalError> {
        let target = em.cx.target;
        let names = UserTemps {
            fd: em.names.new_name("tableFileDescriptor"),
            value: em.names.new_name("value"),
            ok: em.names.new_name("ok"),
        };

        b.emit_indent();
        b.block_start();
        self.emit_map_open(b, target, &names.fd, &self.default_map);
        self.emit_value_literal(b, em, &names.value, &self.default_action)?;
        names.emit_checked_update(b, target, ZERO_KEY, &self.default_map);
        b.block_end(true);

        if self.entries.is_empty() {
            return Ok(());
        }

        let key = em.names.new_name("key");
        b.emit_indent();
        b.block_start();
        self.emit_map_open(b, target, &names.fd, &self.name);
        for entry in &self.entries {
            b.emit_indent();
            b.block_start();
            b.emit_indent();
            b.append_fmt(format_args!("struct {} {} = ", self.key_type, key));
            self.key.emit_literal(b, em, &self.key_type, &entry.keys)?;
            b.end_of_statement(true);
            self.emit_value_literal(b, em, &names.value, &entry.call)?;
            names.emit_checked_update(b, target, &key, &self.name);
            b.block_end(true);
        }
        b.block_end(true);
        Ok(())
    }

    fn emit_map_open(&self, b: &mut CodeBuilder, target: &dyn Target, fd: &str, map: &str) {
        b.statement(&format!("int {} = {}", fd, target.user_map_open(map)));
        b.emit_indent();
        b.append_fmt(format_args!(
            "if ({} < 0) {{ fprintf(stderr, \"map {} not loaded\\n\"); exit(1); }}",
            fd, map
        ));
        b.newline();
    }

    fn emit_value_literal(
        &self,
        b: &mut CodeBuilder,
        em: &mut ExprEmitter<'_>,
        value_name: &str,
        call: &BoundCall,
    ) -> Result<(), InternalError> {
        let v = self.variant(call)?;
        b.emit_indent();
        b.append_fmt(format_args!("struct {} {} = ", self.value_type, value_name));
        b.block_start();
        b.emit_indent();
        b.append_fmt(format_args!(".action = {},", v.id_name));
        b.newline();
        b.emit_indent();
        b.append_fmt(format_args!(".u = {{.{} = {{", v.variant));
        for (param, arg) in &call.args {
            let arg = em.expr_string(arg)?;
            b.append_fmt(format_args!(".{} = {}, ", param, arg));
        }
        b.append("}},");
        b.newline();
        b.block_end(false);
        b.end_of_statement(true);
        Ok(())
    }
}

/// Fresh names of the user-space temporaries of one table's initializer.
struct UserTemps {
    fd: String,
    value: String,
    ok: String,
}

impl UserTemps {
    fn emit_checked_update(&self, b: &mut CodeBuilder, target: &dyn Target, key: &str, map: &str) {
        b.emit_indent();
        b.append_fmt(format_args!("int {} = ", self.ok));
        target.emit_user_table_update(b, &self.fd, key, &self.value);
        b.newline();
        b.emit_indent();
        b.append_fmt(format_args!(
            "if ({} != 0) {{ perror(\"Could not write in {}\"); exit(1); }}",
            self.ok, map
        ));
        b.newline();
    }
}
