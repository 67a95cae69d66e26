// builder.rs — Indentation-aware text buffer and target primitives
//
// `CodeBuilder` is the append-only output buffer every emission pass writes
// into. `Target` abstracts the runtime-specific spelling of map declarations,
// lookups, updates, trace messages, and the abort exit code.
//
// Preconditions: none.
// Postconditions: emitted text is the concatenation of appends, in order.
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::table_kind::TableKind;

const INDENT_WIDTH: usize = 4;

#[derive(Debug, Default)]
pub struct CodeBuilder {
    out: String,
    indent: usize,
}

impl CodeBuilder {
    pub fn new() -> Self {
        CodeBuilder {
            out: String::with_capacity(4096),
            indent: 0,
        }
    }

    pub fn append(&mut self, s: &str) {
        self.out.push_str(s);
    }

    pub fn append_fmt(&mut self, args: fmt::Arguments<'_>) {
        use std::fmt::Write as _;
        let _ = self.out.write_fmt(args);
    }

    pub fn append_line(&mut self, s: &str) {
        self.out.push_str(s);
        self.out.push('\n');
    }

    pub fn newline(&mut self) {
        self.out.push('\n');
    }

    pub fn spc(&mut self) {
        self.out.push(' ');
    }

    pub fn emit_indent(&mut self) {
        for _ in 0..self.indent * INDENT_WIDTH {
            self.out.push(' ');
        }
    }

    pub fn increase_indent(&mut self) {
        self.indent += 1;
    }

    pub fn decrease_indent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    /// `{` + newline, then indent.
    pub fn block_start(&mut self) {
        self.append("{");
        self.newline();
        self.increase_indent();
    }

    /// Dedent, then an indented `}`.
    pub fn block_end(&mut self, newline: bool) {
        self.decrease_indent();
        self.emit_indent();
        self.append("}");
        if newline {
            self.newline();
        }
    }

    pub fn end_of_statement(&mut self, newline: bool) {
        self.append(";");
        if newline {
            self.newline();
        }
    }

    /// An indented line terminated by `;`.
    pub fn statement(&mut self, s: &str) {
        self.emit_indent();
        self.append(s);
        self.end_of_statement(true);
    }

    pub fn as_str(&self) -> &str {
        &self.out
    }

    pub fn into_string(self) -> String {
        self.out
    }
}

/// Runtime-specific spelling of the primitives table lowering relies on.
///
/// The lookup and update primitives never indent. A lookup is an assignment
/// expression without terminator; updates are complete statements.
pub trait Target {
    fn name(&self) -> &'static str;

    fn emit_includes(&self, b: &mut CodeBuilder);

    fn emit_table_decl(
        &self,
        b: &mut CodeBuilder,
        name: &str,
        kind: TableKind,
        key_type: &str,
        value_type: &str,
        size: u32,
    );

    fn emit_table_lookup(&self, b: &mut CodeBuilder, table: &str, key: &str, value: &str);

    fn emit_table_update(&self, b: &mut CodeBuilder, table: &str, key: &str, value: &str);

    fn emit_user_table_update(&self, b: &mut CodeBuilder, fd: &str, key: &str, value: &str);

    /// Expression opening a pinned map from user space.
    fn user_map_open(&self, map: &str) -> String {
        format!("BPF_OBJ_GET(MAP_PATH \"/{}\")", map)
    }

    /// Emit one trace statement. `args` are C expressions matching the
    /// conversions in `format`.
    fn emit_trace_message(&self, b: &mut CodeBuilder, format: &str, args: &[&str]);

    fn abort_return_code(&self) -> &'static str;
}

/// Make arbitrary text safe to embed in a trace format string.
pub fn escape_trace_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '%' => out.push_str("%%"),
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out
}

fn trace_literal(format: &str) -> String {
    if format.ends_with("\\n") {
        format!("\"{}\"", format)
    } else {
        format!("\"{}\\n\"", format)
    }
}

/// Kernel-samples style target: maps via `REGISTER_TABLE`, helpers via the
/// `BPF_MAP_*` macros, tracing via `bpf_trace_message`.
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelTarget {
    pub emit_trace_messages: bool,
}

impl KernelTarget {
    fn map_type(kind: TableKind) -> &'static str {
        match kind {
            TableKind::Array => "BPF_MAP_TYPE_ARRAY",
            TableKind::Hash => "BPF_MAP_TYPE_HASH",
            TableKind::LpmTrie => "BPF_MAP_TYPE_LPM_TRIE",
        }
    }
}

impl Target for KernelTarget {
    fn name(&self) -> &'static str {
        "kernel"
    }

    fn emit_includes(&self, b: &mut CodeBuilder) {
        b.append_line("#include \"ebpf_kernel.h\"");
    }

    fn emit_table_decl(
        &self,
        b: &mut CodeBuilder,
        name: &str,
        kind: TableKind,
        key_type: &str,
        value_type: &str,
        size: u32,
    ) {
        b.emit_indent();
        if kind == TableKind::LpmTrie {
            b.append_fmt(format_args!(
                "REGISTER_TABLE_FLAGS({}, {}, {}, {}, {}, BPF_F_NO_PREALLOC)",
                name,
                Self::map_type(kind),
                key_type,
                value_type,
                size
            ));
        } else {
            b.append_fmt(format_args!(
                "REGISTER_TABLE({}, {}, {}, {}, {})",
                name,
                Self::map_type(kind),
                key_type,
                value_type,
                size
            ));
        }
        b.newline();
    }

    fn emit_table_lookup(&self, b: &mut CodeBuilder, table: &str, key: &str, value: &str) {
        b.append_fmt(format_args!(
            "{} = BPF_MAP_LOOKUP_ELEM({}, &{})",
            value, table, key
        ));
    }

    fn emit_table_update(&self, b: &mut CodeBuilder, table: &str, key: &str, value: &str) {
        b.append_fmt(format_args!(
            "BPF_MAP_UPDATE_ELEM({}, &{}, &{}, BPF_ANY);",
            table, key, value
        ));
    }

    fn emit_user_table_update(&self, b: &mut CodeBuilder, fd: &str, key: &str, value: &str) {
        b.append_fmt(format_args!(
            "BPF_USER_MAP_UPDATE_ELEM({}, &{}, &{}, BPF_ANY);",
            fd, key, value
        ));
    }

    fn emit_trace_message(&self, b: &mut CodeBuilder, format: &str, args: &[&str]) {
        if !self.emit_trace_messages {
            return;
        }
        let mut msg = trace_literal(format);
        for arg in args {
            msg.push_str(", ");
            msg.push_str(arg);
        }
        b.emit_indent();
        b.append_fmt(format_args!("bpf_trace_message({})", msg));
        b.end_of_statement(true);
    }

    fn abort_return_code(&self) -> &'static str {
        "TC_ACT_SHOT"
    }
}

/// BCC style target: maps via `BPF_TABLE`, method-style helpers.
#[derive(Debug, Clone, Copy, Default)]
pub struct BccTarget {
    pub emit_trace_messages: bool,
}

impl Target for BccTarget {
    fn name(&self) -> &'static str {
        "bcc"
    }

    fn emit_includes(&self, b: &mut CodeBuilder) {
        b.append_line("#include <uapi/linux/bpf.h>");
        b.append_line("#include <uapi/linux/if_ether.h>");
    }

    fn emit_table_decl(
        &self,
        b: &mut CodeBuilder,
        name: &str,
        kind: TableKind,
        key_type: &str,
        value_type: &str,
        size: u32,
    ) {
        let kind = match kind {
            TableKind::Array => "array",
            TableKind::Hash => "hash",
            TableKind::LpmTrie => "lpm_trie",
        };
        b.emit_indent();
        b.append_fmt(format_args!(
            "BPF_TABLE(\"{}\", {}, {}, {}, {});",
            kind, key_type, value_type, name, size
        ));
        b.newline();
    }

    fn emit_table_lookup(&self, b: &mut CodeBuilder, table: &str, key: &str, value: &str) {
        b.append_fmt(format_args!("{} = {}.lookup(&{})", value, table, key));
    }

    fn emit_table_update(&self, b: &mut CodeBuilder, table: &str, key: &str, value: &str) {
        b.append_fmt(format_args!("{}.update(&{}, &{});", table, key, value));
    }

    fn emit_user_table_update(&self, b: &mut CodeBuilder, fd: &str, key: &str, value: &str) {
        b.append_fmt(format_args!(
            "bpf_update_elem({}, &{}, &{}, BPF_ANY);",
            fd, key, value
        ));
    }

    fn emit_trace_message(&self, b: &mut CodeBuilder, format: &str, args: &[&str]) {
        if !self.emit_trace_messages {
            return;
        }
        let mut msg = trace_literal(format);
        for arg in args {
            msg.push_str(", ");
            msg.push_str(arg);
        }
        b.emit_indent();
        b.append_fmt(format_args!("bpf_trace_printk({})", msg));
        b.end_of_statement(true);
    }

    fn abort_return_code(&self) -> &'static str {
        "1"
    }
}
