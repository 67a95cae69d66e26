// types.rs — Physical-type factory
//
// Translates semantic types into declarable C types. Only some physical
// types can report a bit width; callers query the `HasWidth` capability at
// run time and report a type error when it is missing.
//
// Preconditions: none.
// Postconditions: `generates_scalar` is the single native-register threshold
//   used by key materialization.
// Failure modes: none (absent capability is a value, not an error).
// Side effects: none.

use std::fmt;

use crate::builder::CodeBuilder;
use crate::ir::SemType;

/// Widest value that still lives in a native scalar register.
pub const MAX_SCALAR_WIDTH: u32 = 64;

/// Capability: the type has a fixed size in bits.
pub trait HasWidth {
    /// Declared width.
    fn width_in_bits(&self) -> u32;
    /// Width of the storage actually allocated (whole bytes).
    fn implementation_width_in_bits(&self) -> u32;
}

pub trait PhysicalType: fmt::Debug {
    /// Append the type's C spelling.
    fn emit(&self, b: &mut CodeBuilder);

    /// Append a declaration of `id` with this type.
    fn declare(&self, b: &mut CodeBuilder, id: &str, as_pointer: bool) {
        self.emit(b);
        if as_pointer {
            b.append("*");
        }
        b.spc();
        b.append(id);
    }

    fn has_width(&self) -> Option<&dyn HasWidth> {
        None
    }

    /// True if a value of this type is assigned directly rather than copied
    /// byte-wise.
    fn generates_scalar(&self) -> bool {
        false
    }

    fn bytes_required(&self) -> u32 {
        self.has_width()
            .map(|w| w.implementation_width_in_bits().div_ceil(8))
            .unwrap_or(0)
    }

    fn type_name(&self) -> String {
        let mut b = CodeBuilder::new();
        self.emit(&mut b);
        b.into_string()
    }
}

// ── Scalars ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalarType {
    pub width: u32,
    pub signed: bool,
}

impl ScalarType {
    pub fn new(width: u32, signed: bool) -> Self {
        ScalarType { width, signed }
    }

    pub fn fits_scalar(width: u32) -> bool {
        width <= MAX_SCALAR_WIDTH
    }
}

impl HasWidth for ScalarType {
    fn width_in_bits(&self) -> u32 {
        self.width
    }

    fn implementation_width_in_bits(&self) -> u32 {
        self.width.div_ceil(8) * 8
    }
}

impl PhysicalType for ScalarType {
    fn emit(&self, b: &mut CodeBuilder) {
        let prefix = if self.signed { "i" } else { "u" };
        let bits = match self.width {
            0..=8 => 8,
            9..=16 => 16,
            17..=32 => 32,
            33..=64 => 64,
            _ => {
                b.append("u8*");
                return;
            }
        };
        b.append_fmt(format_args!("{}{}", prefix, bits));
    }

    fn declare(&self, b: &mut CodeBuilder, id: &str, as_pointer: bool) {
        if Self::fits_scalar(self.width) {
            self.emit(b);
            if as_pointer {
                b.append("*");
            }
            b.spc();
            b.append(id);
        } else if as_pointer {
            b.append_fmt(format_args!("u8* {}", id));
        } else {
            b.append_fmt(format_args!("u8 {}[{}]", id, self.bytes_required()));
        }
    }

    fn has_width(&self) -> Option<&dyn HasWidth> {
        Some(self)
    }

    fn generates_scalar(&self) -> bool {
        Self::fits_scalar(self.width)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoolType;

impl HasWidth for BoolType {
    fn width_in_bits(&self) -> u32 {
        1
    }

    fn implementation_width_in_bits(&self) -> u32 {
        8
    }
}

impl PhysicalType for BoolType {
    fn emit(&self, b: &mut CodeBuilder) {
        b.append("u8");
    }

    fn has_width(&self) -> Option<&dyn HasWidth> {
        Some(self)
    }

    fn generates_scalar(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    pub name: String,
}

impl HasWidth for EnumType {
    fn width_in_bits(&self) -> u32 {
        32
    }

    fn implementation_width_in_bits(&self) -> u32 {
        32
    }
}

impl PhysicalType for EnumType {
    fn emit(&self, b: &mut CodeBuilder) {
        b.append_fmt(format_args!("enum {}", self.name));
    }

    fn has_width(&self) -> Option<&dyn HasWidth> {
        Some(self)
    }

    fn generates_scalar(&self) -> bool {
        true
    }
}

// ── Aggregates ──────────────────────────────────────────────────────────────

/// A struct; sized only when every field is.
#[derive(Debug)]
pub struct StructType {
    pub name: String,
    pub fields: Vec<(String, Box<dyn PhysicalType>)>,
    widths: Option<(u32, u32)>,
}

impl StructType {
    pub fn new(name: &str, fields: Vec<(String, Box<dyn PhysicalType>)>) -> Self {
        let widths = fields.iter().try_fold((0u32, 0u32), |(w, iw), (_, ty)| {
            ty.has_width().map(|hw| {
                (
                    w + hw.width_in_bits(),
                    iw + hw.implementation_width_in_bits(),
                )
            })
        });
        StructType {
            name: name.to_string(),
            fields,
            widths,
        }
    }
}

impl HasWidth for StructType {
    fn width_in_bits(&self) -> u32 {
        self.widths.map(|(w, _)| w).unwrap_or(0)
    }

    fn implementation_width_in_bits(&self) -> u32 {
        self.widths.map(|(_, iw)| iw).unwrap_or(0)
    }
}

impl PhysicalType for StructType {
    fn emit(&self, b: &mut CodeBuilder) {
        b.append_fmt(format_args!("struct {}", self.name));
    }

    fn has_width(&self) -> Option<&dyn HasWidth> {
        self.widths.map(|_| self as &dyn HasWidth)
    }
}

/// Types with no fixed size (varbit, error, extern objects).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueType {
    pub name: String,
}

impl PhysicalType for OpaqueType {
    fn emit(&self, b: &mut CodeBuilder) {
        b.append(&self.name);
    }
}

// ── Factory ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct TypeFactory;

impl TypeFactory {
    pub fn create(&self, ty: &SemType) -> Box<dyn PhysicalType> {
        match ty {
            SemType::Bits { width, signed } => Box::new(ScalarType::new(*width, *signed)),
            SemType::Bool => Box::new(BoolType),
            SemType::Enum { name, .. } => Box::new(EnumType { name: name.clone() }),
            SemType::Struct { name, fields } => Box::new(StructType::new(
                name,
                fields
                    .iter()
                    .map(|f| (f.name.clone(), self.create(&f.ty)))
                    .collect(),
            )),
            SemType::Error => Box::new(OpaqueType {
                name: "ParserError_t".to_string(),
            }),
            SemType::Varbit { max_width } => Box::new(OpaqueType {
                name: format!("varbit<{}>", max_width),
            }),
            SemType::Extern { name } => Box::new(OpaqueType { name: name.clone() }),
        }
    }
}
