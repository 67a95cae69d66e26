// key_layout.rs — Physical layout of a table's match key
//
// Turns the ordered key elements of a table into numbered struct fields,
// checks lpm placement, and emits the key struct, the code that fills a key
// from packet data, and designated initializers for literal entries.
//
// Preconditions: every key expression carries its semantic type.
// Postconditions: field names follow declaration order (`field<i>`), also
//   across rejected elements; no field is wider than 64 bits.
// Failure modes: missing width → E0100; too wide → E0203; lpm not last →
//   E0202; unknown match kind → E0200 (at emission). All are collected.
// Side effects: appends to the diagnostics Vec and the CodeBuilder.

use tracing::trace;

use crate::builder::{escape_trace_text, CodeBuilder};
use crate::diag::{codes, Diagnostic, InternalError};
use crate::emit::ExprEmitter;
use crate::ir::{Expr, KeyElement, Span};
use crate::model::{
    DUMMY_KEY_FIELD, EXACT_MATCH, KEY_ALIGNMENT, LPM_MATCH, MAX_FIELD_WIDTH, PREFIX_FIELD,
    PREFIX_FIELD_WIDTH, SELECTOR_MATCH, TERNARY_MATCH,
};
use crate::table_kind::KeyShape;
use crate::types::{PhysicalType, ScalarType, TypeFactory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Ternary,
    Lpm,
    Selector,
    Unsupported,
}

impl MatchKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            EXACT_MATCH => MatchKind::Exact,
            TERNARY_MATCH => MatchKind::Ternary,
            LPM_MATCH => MatchKind::Lpm,
            SELECTOR_MATCH => MatchKind::Selector,
            _ => MatchKind::Unsupported,
        }
    }
}

#[derive(Debug)]
pub struct MatchField {
    /// Position in the declared key.
    pub index: usize,
    pub name: String,
    pub expr: Expr,
    pub kind: MatchKind,
    pub kind_name: String,
    pub ty: Box<dyn PhysicalType>,
    pub width: u32,
    pub span: Span,
}

impl MatchField {
    fn implementation_width(&self) -> u32 {
        self.ty
            .has_width()
            .map(|w| w.implementation_width_in_bits())
            .unwrap_or(self.width)
    }
}

/// Network-order conversion for a scalar of the given storage width.
pub fn byte_swap(implementation_width: u32) -> Option<&'static str> {
    match implementation_width {
        0..=8 => None,
        9..=16 => Some("bpf_htons"),
        17..=32 => Some("bpf_htonl"),
        _ => Some("bpf_htonll"),
    }
}

#[derive(Debug)]
pub struct KeyLayout {
    pub fields: Vec<MatchField>,
    shape: KeyShape,
}

impl KeyLayout {
    pub fn build(
        elements: &[KeyElement],
        types: &TypeFactory,
        diags: &mut Vec<Diagnostic>,
    ) -> Result<KeyLayout, InternalError> {
        let mut fields = Vec::with_capacity(elements.len());
        for (index, el) in elements.iter().enumerate() {
            let sem = el.expr.ty.as_ref().ok_or_else(|| InternalError::MissingType {
                construct: el.expr.to_string(),
            })?;
            let ty = types.create(sem);
            let Some(width) = ty.has_width().map(|w| w.width_in_bits()) else {
                diags.push(Diagnostic::error(
                    codes::E0100,
                    el.span,
                    format!("{}: illegal type {} for key field", el.expr, sem),
                ));
                continue;
            };
            if width > MAX_FIELD_WIDTH {
                diags.push(
                    Diagnostic::error(
                        codes::E0203,
                        el.span,
                        format!(
                            "{}: fields wider than {} bits are not supported ({} bits)",
                            el.expr, MAX_FIELD_WIDTH, width
                        ),
                    )
                    .with_hint("split the field into several key elements"),
                );
                continue;
            }
            let name = format!("field{}", index);
            trace!(field = %name, expr = %el.expr, width, "key field");
            fields.push(MatchField {
                index,
                name,
                expr: el.expr.clone(),
                kind: MatchKind::from_name(&el.match_kind),
                kind_name: el.match_kind.clone(),
                ty,
                width,
                span: el.span,
            });
        }
        Ok(KeyLayout {
            fields,
            shape: Self::shape(elements),
        })
    }

    /// Match-kind census over the declared elements, rejected ones included.
    pub fn shape(elements: &[KeyElement]) -> KeyShape {
        let kinds = elements.iter().map(|e| MatchKind::from_name(&e.match_kind));
        KeyShape {
            lpm_fields: kinds.clone().filter(|k| *k == MatchKind::Lpm).count(),
            has_ternary: kinds.clone().any(|k| k == MatchKind::Ternary),
        }
    }

    /// An lpm element must be the last element that is not a selector.
    pub fn validate(elements: &[KeyElement], diags: &mut Vec<Diagnostic>) {
        let last = elements
            .iter()
            .rposition(|e| MatchKind::from_name(&e.match_kind) != MatchKind::Selector);
        for (i, el) in elements.iter().enumerate() {
            if MatchKind::from_name(&el.match_kind) == MatchKind::Lpm && Some(i) != last {
                let mut d = Diagnostic::error(
                    codes::E0202,
                    el.span,
                    format!("{}: lpm field key must be at the end of whole key", el.expr),
                );
                if let Some(last) = last {
                    d = d.with_related(elements[last].span, "last key field here");
                }
                diags.push(d);
            }
        }
    }

    pub fn key_shape(&self) -> KeyShape {
        self.shape
    }

    /// True when the key is stored in an lpm trie: exactly one lpm field and
    /// no ternary field. Such keys carry a leading prefix-length field.
    pub fn is_lpm_trie(&self) -> bool {
        self.shape.lpm_fields == 1 && !self.shape.has_ternary
    }

    pub fn field_at(&self, index: usize) -> Option<&MatchField> {
        self.fields.iter().find(|f| f.index == index)
    }

    fn is_network_order(&self, field: &MatchField) -> bool {
        self.is_lpm_trie() && field.kind == MatchKind::Lpm
    }

    // ── Emission ────────────────────────────────────────────────────────

    pub fn emit_key_type(&self, b: &mut CodeBuilder, type_name: &str, diags: &mut Vec<Diagnostic>) {
        b.emit_indent();
        b.append_fmt(format_args!("struct {} ", type_name));
        b.block_start();

        if self.is_lpm_trie() {
            b.emit_indent();
            ScalarType::new(PREFIX_FIELD_WIDTH, false).declare(b, PREFIX_FIELD, false);
            b.end_of_statement(true);
        }

        for field in &self.fields {
            if field.kind == MatchKind::Unsupported {
                diags.push(Diagnostic::error(
                    codes::E0200,
                    field.span,
                    format!("{}: match of type {} not supported", field.expr, field.kind_name),
                ));
            }
            b.emit_indent();
            field.ty.declare(b, &field.name, false);
            b.append_fmt(format_args!("; /* {} */", field.expr));
            b.newline();
        }

        // A hash map cannot have a zero-length key.
        if self.fields.is_empty() {
            b.emit_indent();
            b.append_line(&format!("u8 {};", DUMMY_KEY_FIELD));
        }

        b.block_end(false);
        b.append_fmt(format_args!(" __attribute__((aligned({})))", KEY_ALIGNMENT));
        b.end_of_statement(true);
    }

    /// Fill `key_name` from the key expressions.
    pub fn emit_key(
        &self,
        b: &mut CodeBuilder,
        em: &mut ExprEmitter<'_>,
        key_name: &str,
    ) -> Result<(), InternalError> {
        if self.is_lpm_trie() {
            b.emit_indent();
            b.append_fmt(format_args!(
                "{}.{} = sizeof({})*8 - {}",
                key_name, PREFIX_FIELD, key_name, PREFIX_FIELD_WIDTH
            ));
            b.end_of_statement(true);
        }

        let target = em.cx.target;
        for field in &self.fields {
            let value = em.expr_string(&field.expr)?;
            let network_order = self.is_network_order(field);

            if field.ty.generates_scalar() {
                b.emit_indent();
                match byte_swap(field.implementation_width()).filter(|_| network_order) {
                    Some(swap) => b.append_fmt(format_args!(
                        "{}.{} = {}({})",
                        key_name, field.name, swap, value
                    )),
                    None => b.append_fmt(format_args!("{}.{} = {}", key_name, field.name, value)),
                }
                b.end_of_statement(true);

                let arg = format!("(unsigned long long) {}.{}", key_name, field.name);
                target.emit_trace_message(
                    b,
                    &format!(
                        "Control: key {}=0x%llx",
                        escape_trace_text(&field.expr.to_string())
                    ),
                    &[&arg],
                );
            } else {
                let bytes = field.ty.bytes_required();
                if network_order {
                    // Assumes a little-endian host.
                    for byte in 0..bytes {
                        b.emit_indent();
                        b.append_fmt(format_args!(
                            "((u8*)&{}.{})[{}] = ((u8*)&{})[{}]",
                            key_name,
                            field.name,
                            byte,
                            value,
                            bytes - byte - 1
                        ));
                        b.end_of_statement(true);
                    }
                } else {
                    b.emit_indent();
                    b.append_fmt(format_args!(
                        "memcpy(&{}.{}, &{}, {})",
                        key_name, field.name, value, bytes
                    ));
                    b.end_of_statement(true);
                }
                target.emit_trace_message(
                    b,
                    &format!("Control: key {}", escape_trace_text(&field.expr.to_string())),
                    &[],
                );
            }
        }
        Ok(())
    }

    /// Designated initializer for a literal entry key; `values` are indexed
    /// by declaration position.
    pub fn emit_literal(
        &self,
        b: &mut CodeBuilder,
        em: &mut ExprEmitter<'_>,
        type_name: &str,
        values: &[Expr],
    ) -> Result<(), InternalError> {
        b.append("{");
        if self.is_lpm_trie() {
            b.append_fmt(format_args!(
                ".{} = sizeof(struct {})*8 - {}, ",
                PREFIX_FIELD, type_name, PREFIX_FIELD_WIDTH
            ));
        }
        for field in &self.fields {
            let Some(value) = values.get(field.index) else {
                continue;
            };
            let value = em.expr_string(value)?;
            match byte_swap(field.implementation_width()).filter(|_| self.is_network_order(field)) {
                Some(swap) => b.append_fmt(format_args!(".{} = {}({}), ", field.name, swap, value)),
                None => b.append_fmt(format_args!(".{} = {}, ", field.name, value)),
            }
        }
        b.append("}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, DeclId, Program, SemType, StructField};
    use crate::test_support::*;

    fn build(elements: &[KeyElement]) -> (KeyLayout, Vec<Diagnostic>) {
        let mut diags = Vec::new();
        let layout = KeyLayout::build(elements, &TypeFactory, &mut diags).unwrap();
        (layout, diags)
    }

    fn key_type(layout: &KeyLayout) -> String {
        let mut b = CodeBuilder::new();
        let mut diags = Vec::new();
        layout.emit_key_type(&mut b, "t_key", &mut diags);
        b.into_string()
    }

    fn harness() -> Harness {
        Harness::new(Program {
            context: context(),
            ..Program::default()
        })
    }

    #[test]
    fn fields_are_numbered_in_declaration_order() {
        let (layout, diags) = build(&[
            key_element(hdr_field("eth", "type", 16), "exact"),
            key_element(hdr_field("ipv4", "proto", 8), "ternary"),
        ]);
        assert!(diags.is_empty());
        assert_eq!(
            key_type(&layout),
            "struct t_key {\n    u16 field0; /* hdr.eth.type */\n    u8 field1; /* hdr.ipv4.proto */\n} __attribute__((aligned(4)));\n"
        );
    }

    #[test]
    fn keyless_layout_gets_dummy_field() {
        let (layout, _) = build(&[]);
        assert_eq!(
            key_type(&layout),
            "struct t_key {\n    u8 __dummy_table_key;\n} __attribute__((aligned(4)));\n"
        );
    }

    #[test]
    fn lpm_trie_key_leads_with_prefix_length() {
        let (layout, _) = build(&[key_element(hdr_field("ipv4", "dst", 32), "lpm")]);
        assert!(layout.is_lpm_trie());
        assert!(key_type(&layout).starts_with("struct t_key {\n    u32 prefixlen;\n    u32 field0;"));
    }

    #[test]
    fn errors_are_collected_and_numbering_kept() {
        let opaque = Expr::path("opts", DeclId(5), Some(SemType::Varbit { max_width: 320 }));
        let (layout, diags) = build(&[
            key_element(opaque, "exact"),
            key_element(hdr_field("ipv6", "dst", 128), "exact"),
            key_element(hdr_field("eth", "type", 16), "exact"),
        ]);
        let got: Vec<_> = diags.iter().filter_map(|d| d.code).collect();
        assert_eq!(got, vec![codes::E0100, codes::E0203]);
        assert_eq!(layout.fields.len(), 1);
        assert_eq!(layout.fields[0].name, "field2");
    }

    #[test]
    fn missing_type_is_internal() {
        let untyped = Expr::path("x", DeclId(1), None);
        let mut diags = Vec::new();
        let err = KeyLayout::build(&[key_element(untyped, "exact")], &TypeFactory, &mut diags);
        assert!(matches!(err, Err(InternalError::MissingType { .. })));
    }

    #[test]
    fn lpm_must_be_last_ignoring_selectors() {
        let ok = [
            key_element(hdr_field("eth", "type", 16), "exact"),
            key_element(hdr_field("ipv4", "dst", 32), "lpm"),
            key_element(hdr_field("ipv4", "src", 32), "selector"),
        ];
        let mut diags = Vec::new();
        KeyLayout::validate(&ok, &mut diags);
        assert!(diags.is_empty());

        let bad = [
            key_element(hdr_field("ipv4", "dst", 32), "lpm"),
            key_element(hdr_field("eth", "type", 16), "exact"),
        ];
        KeyLayout::validate(&bad, &mut diags);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, Some(codes::E0202));
        assert_eq!(diags[0].related_spans.len(), 1);
    }

    #[test]
    fn unsupported_match_kind_reported_at_emission() {
        let (layout, diags) = build(&[key_element(hdr_field("eth", "type", 16), "range")]);
        assert!(diags.is_empty());
        let mut b = CodeBuilder::new();
        let mut diags = Vec::new();
        layout.emit_key_type(&mut b, "t_key", &mut diags);
        assert_eq!(diags[0].code, Some(codes::E0200));
    }

    #[test]
    fn ternary_suppresses_trie_and_byte_swap() {
        let (layout, _) = build(&[
            key_element(hdr_field("ipv4", "proto", 8), "ternary"),
            key_element(hdr_field("ipv4", "dst", 32), "lpm"),
        ]);
        assert!(!layout.is_lpm_trie());
        let out = harness().emit(|em, b| layout.emit_key(b, em, "key"));
        assert_eq!(
            out,
            "key.field0 = hdr->ipv4.proto;\nkey.field1 = hdr->ipv4.dst;\n"
        );
    }

    #[test]
    fn lpm_values_are_swapped_by_width() {
        assert_eq!(byte_swap(8), None);
        assert_eq!(byte_swap(16), Some("bpf_htons"));
        assert_eq!(byte_swap(24), Some("bpf_htonl"));
        assert_eq!(byte_swap(64), Some("bpf_htonll"));

        let (layout, _) = build(&[
            key_element(hdr_field("eth", "type", 16), "exact"),
            key_element(hdr_field("ipv4", "dst", 32), "lpm"),
        ]);
        let out = harness().traced().emit(|em, b| layout.emit_key(b, em, "key"));
        assert_eq!(
            out,
            "key.prefixlen = sizeof(key)*8 - 32;\n\
             key.field0 = hdr->eth.type;\n\
             bpf_trace_message(\"Control: key hdr.eth.type=0x%llx\\n\", (unsigned long long) key.field0);\n\
             key.field1 = bpf_htonl(hdr->ipv4.dst);\n\
             bpf_trace_message(\"Control: key hdr.ipv4.dst=0x%llx\\n\", (unsigned long long) key.field1);\n"
        );
    }

    #[test]
    fn key_trace_escapes_percent_in_expression() {
        let masked = Expr::binary(
            BinOp::Mod,
            hdr_field("h", "x", 8),
            Expr::constant(4, None),
            Some(SemType::bits(8)),
        );
        let (layout, _) = build(&[key_element(masked, "exact")]);
        let out = harness().traced().emit(|em, b| layout.emit_key(b, em, "key"));
        assert_eq!(
            out,
            "key.field0 = (hdr->h.x % 4);\n\
             bpf_trace_message(\"Control: key (hdr.h.x %% 4)=0x%llx\\n\", (unsigned long long) key.field0);\n"
        );
    }

    #[test]
    fn struct_fields_are_block_copied() {
        let pair = SemType::Struct {
            name: "pair".into(),
            fields: vec![
                StructField {
                    name: "a".into(),
                    ty: SemType::bits(16),
                },
                StructField {
                    name: "b".into(),
                    ty: SemType::bits(16),
                },
            ],
        };
        let exact = Expr::path("meta", DeclId(7), Some(pair.clone()));
        let (layout, _) = build(&[key_element(exact, "exact")]);
        let out = harness().traced().emit(|em, b| layout.emit_key(b, em, "key"));
        assert_eq!(
            out,
            "memcpy(&key.field0, &meta, 4);\nbpf_trace_message(\"Control: key meta\\n\");\n"
        );

        let lpm = Expr::path("meta", DeclId(7), Some(pair));
        let (layout, _) = build(&[key_element(lpm, "lpm")]);
        let out = harness().emit(|em, b| layout.emit_key(b, em, "k"));
        assert_eq!(
            out,
            "k.prefixlen = sizeof(k)*8 - 32;\n\
             ((u8*)&k.field0)[0] = ((u8*)&meta)[3];\n\
             ((u8*)&k.field0)[1] = ((u8*)&meta)[2];\n\
             ((u8*)&k.field0)[2] = ((u8*)&meta)[1];\n\
             ((u8*)&k.field0)[3] = ((u8*)&meta)[0];\n"
        );
    }

    #[test]
    fn literal_keys_use_designated_initializers() {
        let (layout, _) = build(&[
            key_element(hdr_field("eth", "type", 16), "exact"),
            key_element(hdr_field("ipv4", "dst", 32), "lpm"),
        ]);
        let values = [Expr::constant(2048, None), Expr::constant(167772160, None)];
        let out = harness().emit(|em, b| layout.emit_literal(b, em, "t_key", &values));
        assert_eq!(
            out,
            "{.prefixlen = sizeof(struct t_key)*8 - 32, .field0 = 2048, .field1 = bpf_htonl(167772160), }"
        );
    }
}
