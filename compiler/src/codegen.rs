// codegen.rs — Table and counter lowering to C for the map-based runtime
//
// Builds one descriptor per table and per counter instance, then renders
// the sections of the two generated files: the kernel program (types, map
// declarations, one apply function per table) and the user-space loader
// (types, `init_tables`).
//
// Preconditions: the program is type-checked and its DeclIds are unique.
// Postconditions: each section function returns the text of its section
//   only; callers check diagnostics before using any of it.
// Failure modes: user errors become diagnostics; broken contracts are
//   returned as InternalError.
// Side effects: none beyond the diagnostics Vec and the NameGen.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::builder::{BccTarget, CodeBuilder, KernelTarget, Target};
use crate::counter::CounterTable;
use crate::diag::{Diagnostic, InternalError};
use crate::emit::{EmitContext, ExprEmitter};
use crate::ir::{DeclId, Program};
use crate::model::{ARRAY_INDEX_TYPE, COUNTER_ARRAY, ZERO_KEY};
use crate::names::{NameGen, RefMap};
use crate::table::TableDescriptor;
use crate::types::TypeFactory;

// ── Public types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TargetKind {
    /// Kernel samples style (`REGISTER_TABLE`, `BPF_MAP_*` helpers).
    #[default]
    Kernel,
    /// BCC style (`BPF_TABLE`, method-call helpers).
    Bcc,
}

#[derive(Debug, Clone, Default)]
pub struct CodegenOptions {
    pub target: TargetKind,
    pub emit_trace_messages: bool,
}

impl CodegenOptions {
    pub fn make_target(&self) -> Box<dyn Target> {
        match self.target {
            TargetKind::Kernel => Box::new(KernelTarget {
                emit_trace_messages: self.emit_trace_messages,
            }),
            TargetKind::Bcc => Box::new(BccTarget {
                emit_trace_messages: self.emit_trace_messages,
            }),
        }
    }
}

/// Output of the build pass.
#[derive(Debug)]
pub struct Lowering {
    pub refs: RefMap,
    pub tables: Vec<TableDescriptor>,
    pub counters: BTreeMap<DeclId, CounterTable>,
}

#[derive(Debug, Default)]
pub struct GeneratedCode {
    pub kernel_source: Option<String>,
    pub user_source: Option<String>,
    pub types: Option<String>,
}

// ── Build ───────────────────────────────────────────────────────────────────

pub fn build_descriptors(
    program: &Program,
    diags: &mut Vec<Diagnostic>,
) -> Result<Lowering, InternalError> {
    let refs = RefMap::new(program)?;
    let types = TypeFactory;

    let mut counters = BTreeMap::new();
    for ext in &program.externs {
        if ext.type_name != COUNTER_ARRAY {
            warn!(instance = %ext.name, type_name = %ext.type_name, "extern has no lowering, skipped");
            continue;
        }
        if let Some(counter) = CounterTable::build(ext, diags) {
            counters.insert(counter.decl, counter);
        }
    }

    let mut tables = Vec::with_capacity(program.tables.len());
    for table in &program.tables {
        tables.push(TableDescriptor::build(table, program, &types, diags)?);
    }

    debug!(
        tables = tables.len(),
        counters = counters.len(),
        "descriptors built"
    );
    Ok(Lowering {
        refs,
        tables,
        counters,
    })
}

/// Fresh-name allocator for one compilation, seeded with program names.
pub fn name_gen(program: &Program) -> NameGen {
    let mut names = NameGen::for_program(program);
    names.reserve(ZERO_KEY);
    names
}

// ── Sections ────────────────────────────────────────────────────────────────

/// Key and value structs of every table, counter typedefs.
pub fn emit_types(lowering: &Lowering, diags: &mut Vec<Diagnostic>) -> String {
    let mut b = CodeBuilder::new();
    for table in &lowering.tables {
        table.emit_types(&mut b, diags);
        b.newline();
    }
    if !lowering.counters.is_empty() {
        for counter in lowering.counters.values() {
            counter.emit_types(&mut b);
        }
        b.newline();
    }
    b.into_string()
}

/// Map declarations.
pub fn emit_instances(
    program: &Program,
    lowering: &Lowering,
    options: &CodegenOptions,
    names: &mut NameGen,
    diags: &mut Vec<Diagnostic>,
) -> String {
    let target = options.make_target();
    let cx = EmitContext::new(program, &lowering.refs, target.as_ref(), &lowering.counters);
    let em = ExprEmitter::new(&cx, names, diags);
    let mut b = CodeBuilder::new();
    for table in &lowering.tables {
        table.emit_instance(&mut b, target.as_ref());
    }
    for counter in lowering.counters.values() {
        counter.emit_instance(&mut b, &em);
    }
    b.into_string()
}

/// `static __always_inline int apply_<table>(...)` for every table.
pub fn emit_apply_functions(
    program: &Program,
    lowering: &Lowering,
    options: &CodegenOptions,
    names: &mut NameGen,
    diags: &mut Vec<Diagnostic>,
) -> Result<String, InternalError> {
    let target = options.make_target();
    let cx = EmitContext::new(program, &lowering.refs, target.as_ref(), &lowering.counters);
    let mut em = ExprEmitter::new(&cx, names, diags);
    let params = program
        .context
        .iter()
        .map(|p| declarator(&p.c_type, &p.name))
        .collect::<Vec<_>>()
        .join(", ");

    let mut b = CodeBuilder::new();
    for table in &lowering.tables {
        b.append_fmt(format_args!(
            "static __always_inline int apply_{}({}) ",
            table.name,
            if params.is_empty() { "void" } else { params.as_str() }
        ));
        b.block_start();
        b.statement(&format!("{} {} = 0", ARRAY_INDEX_TYPE, ZERO_KEY));
        table.emit_apply(&mut b, &mut em, None, None)?;
        b.statement("return 0");
        b.block_end(true);
        b.newline();
    }
    Ok(b.into_string())
}

/// `void init_tables(void)` writing default actions and literal entries.
pub fn emit_init_function(
    program: &Program,
    lowering: &Lowering,
    options: &CodegenOptions,
    names: &mut NameGen,
    diags: &mut Vec<Diagnostic>,
) -> Result<String, InternalError> {
    let target = options.make_target();
    let cx = EmitContext::new(program, &lowering.refs, target.as_ref(), &lowering.counters);
    let mut em = ExprEmitter::new(&cx, names, diags);

    let mut b = CodeBuilder::new();
    b.append("void init_tables(void) ");
    b.block_start();
    b.statement(&format!("{} {} = 0", ARRAY_INDEX_TYPE, ZERO_KEY));
    for table in &lowering.tables {
        table.emit_initializer(&mut b, &mut em)?;
    }
    b.block_end(true);
    Ok(b.into_string())
}

/// `struct headers *` + `hdr` → `struct headers *hdr`.
fn declarator(c_type: &str, name: &str) -> String {
    if c_type.ends_with('*') {
        format!("{}{}", c_type, name)
    } else {
        format!("{} {}", c_type, name)
    }
}

// ── Files ───────────────────────────────────────────────────────────────────

pub fn assemble_kernel(
    header: &str,
    options: &CodegenOptions,
    types: &str,
    instances: &str,
    apply: &str,
) -> String {
    let mut b = CodeBuilder::new();
    b.append(header);
    options.make_target().emit_includes(&mut b);
    b.newline();
    b.append(types);
    b.append(instances);
    b.newline();
    b.append(apply);
    b.into_string()
}

pub fn assemble_user(header: &str, types: &str, init: &str) -> String {
    let mut b = CodeBuilder::new();
    b.append(header);
    b.append_line("#include <stdio.h>");
    b.append_line("#include <stdlib.h>");
    b.append_line("#include \"ebpf_user.h\"");
    b.newline();
    b.append(types);
    b.append(init);
    b.into_string()
}
