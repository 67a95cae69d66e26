// value_layout.rs — Tagged-union layout of a table's value
//
// A value is an unsigned discriminant selecting one action plus a union of
// per-action payload structs holding that action's bound parameters.
//
// Preconditions: every action reference resolves to a declared action.
// Postconditions: the no-op action has id 0; every other listed action gets
//   ids 1..N in list order; the no-op payload is always the first union
//   member; no payload field is wider than 64 bits.
// Failure modes: parameter without width → E0101; too wide → E0204
//   (collected). Unknown action reference → InternalError.
// Side effects: appends to the diagnostics Vec.

use tracing::debug;

use crate::builder::CodeBuilder;
use crate::diag::{codes, Diagnostic, InternalError};
use crate::ir::{ActionRef, DeclId, Program, Span};
use crate::model::{DISCRIMINANT_FIELD, MAX_FIELD_WIDTH, NO_ACTION, NO_ACTION_VARIANT};
use crate::types::{PhysicalType, TypeFactory};

#[derive(Debug)]
pub struct ActionParam {
    pub name: String,
    pub decl: DeclId,
    pub ty: Box<dyn PhysicalType>,
    pub width: u32,
}

#[derive(Debug)]
pub struct ActionVariant {
    pub id: u32,
    pub action: DeclId,
    pub action_name: String,
    /// Union member name.
    pub variant: String,
    /// C expression naming the discriminant (`<TABLE>_ACT_<ACTION>` or `0`).
    pub id_name: String,
    pub params: Vec<ActionParam>,
    pub span: Span,
}

impl ActionVariant {
    pub fn is_no_action(&self) -> bool {
        self.id == 0
    }
}

/// Name of the constant holding `action`'s discriminant in `table`.
pub fn action_id_name(table: &str, action: &str) -> String {
    if action == NO_ACTION {
        return "0".to_string();
    }
    format!("{}_ACT_{}", table.to_uppercase(), action.to_uppercase())
}

#[derive(Debug)]
pub struct ValueLayout {
    /// Listed actions in declaration order, the no-op action included.
    pub variants: Vec<ActionVariant>,
}

impl ValueLayout {
    pub fn build(
        table: &str,
        actions: &[ActionRef],
        program: &Program,
        types: &TypeFactory,
        diags: &mut Vec<Diagnostic>,
    ) -> Result<ValueLayout, InternalError> {
        let mut variants = Vec::with_capacity(actions.len());
        let mut next_id = 1u32;
        for aref in actions {
            let action = program.action(aref.decl).ok_or_else(|| InternalError::UnknownDecl {
                construct: format!("{}: action {}", table, aref.name),
                id: aref.decl.0,
            })?;

            let (id, variant) = if action.name == NO_ACTION {
                (0, NO_ACTION_VARIANT.to_string())
            } else {
                let id = next_id;
                next_id += 1;
                (id, action.name.clone())
            };

            let mut params = Vec::with_capacity(action.params.len());
            for p in &action.params {
                let ty = types.create(&p.ty);
                let Some(width) = ty.has_width().map(|w| w.width_in_bits()) else {
                    diags.push(Diagnostic::error(
                        codes::E0101,
                        p.span,
                        format!("{}: illegal type {} for action parameter", p.name, p.ty),
                    ));
                    continue;
                };
                if width > MAX_FIELD_WIDTH {
                    diags.push(Diagnostic::error(
                        codes::E0204,
                        p.span,
                        format!(
                            "{}.{}: action parameters wider than {} bits are not supported ({} bits)",
                            action.name, p.name, MAX_FIELD_WIDTH, width
                        ),
                    ));
                    continue;
                }
                params.push(ActionParam {
                    name: p.name.clone(),
                    decl: p.decl,
                    ty,
                    width,
                });
            }

            debug!(table, action = %action.name, id, "action id");
            variants.push(ActionVariant {
                id,
                action: action.decl,
                action_name: action.name.clone(),
                variant,
                id_name: action_id_name(table, &action.name),
                params,
                span: aref.span,
            });
        }
        Ok(ValueLayout { variants })
    }

    pub fn variant_for(&self, action: DeclId) -> Option<&ActionVariant> {
        self.variants.iter().find(|v| v.action == action)
    }

    /// The `#define`s for every action except the no-op one, then the value
    /// struct.
    pub fn emit_value_type(&self, b: &mut CodeBuilder, type_name: &str) {
        for v in self.variants.iter().filter(|v| !v.is_no_action()) {
            b.emit_indent();
            b.append_fmt(format_args!("#define {} {}", v.id_name, v.id));
            b.newline();
        }

        b.emit_indent();
        b.append_fmt(format_args!("struct {} ", type_name));
        b.block_start();
        b.statement(&format!("unsigned int {}", DISCRIMINANT_FIELD));

        b.emit_indent();
        b.append("union ");
        b.block_start();

        b.emit_indent();
        b.append("struct ");
        b.block_start();
        b.block_end(false);
        b.append_fmt(format_args!(" {}", NO_ACTION_VARIANT));
        b.end_of_statement(true);

        for v in self.variants.iter().filter(|v| !v.is_no_action()) {
            b.emit_indent();
            b.append("struct ");
            b.block_start();
            for p in &v.params {
                b.emit_indent();
                p.ty.declare(b, &p.name, false);
                b.end_of_statement(true);
            }
            b.block_end(false);
            b.spc();
            b.append(&v.variant);
            b.end_of_statement(true);
        }

        b.block_end(false);
        b.append(" u");
        b.end_of_statement(true);

        b.block_end(false);
        b.end_of_statement(true);
    }
}
