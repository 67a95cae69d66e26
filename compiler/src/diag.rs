// diag.rs — Unified diagnostics model
//
// Provides the shared diagnostic types used by table and counter lowering.
// User-facing problems become `Diagnostic` values collected in a Vec; broken
// collaborator contracts become `InternalError` and stop compilation.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::ir::Span;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0201`).
///
/// Codes are `&'static str` constants defined in the `codes` module. The
/// hundreds digit selects the classification reported to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl DiagCode {
    pub fn class(&self) -> ErrorClass {
        match self.0.get(1..3) {
            Some("01") => ErrorClass::Type,
            Some("02") => ErrorClass::Unsupported,
            Some("03") => ErrorClass::Expected,
            Some("04") => ErrorClass::Invalid,
            Some("05") => ErrorClass::Overlimit,
            _ => ErrorClass::Unsupported,
        }
    }
}

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Classification of a user-facing error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Type,
    Unsupported,
    Expected,
    Invalid,
    Overlimit,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorClass::Type => "type error",
            ErrorClass::Unsupported => "unsupported",
            ErrorClass::Expected => "expected",
            ErrorClass::Invalid => "invalid",
            ErrorClass::Overlimit => "overlimit",
        };
        f.write_str(s)
    }
}

/// Stable diagnostic codes. Never reuse a retired code.
pub mod codes {
    use super::DiagCode;

    // type
    pub const E0100: DiagCode = DiagCode("E0100"); // key field has no width
    pub const E0101: DiagCode = DiagCode("E0101"); // action parameter has no width

    // unsupported
    pub const E0200: DiagCode = DiagCode("E0200"); // match kind
    pub const E0201: DiagCode = DiagCode("E0201"); // more than one lpm field
    pub const E0202: DiagCode = DiagCode("E0202"); // lpm field not last
    pub const E0203: DiagCode = DiagCode("E0203"); // key field wider than 64 bits
    pub const E0204: DiagCode = DiagCode("E0204"); // action parameter wider than 64 bits
    pub const E0205: DiagCode = DiagCode("E0205"); // counter method
    pub const E0206: DiagCode = DiagCode("E0206"); // partial literal entry key
    pub const E0207: DiagCode = DiagCode("E0207"); // literal entries without a key

    // expected
    pub const E0300: DiagCode = DiagCode("E0300"); // missing implementation property
    pub const E0301: DiagCode = DiagCode("E0301"); // implementation not an extern block
    pub const E0302: DiagCode = DiagCode("E0302"); // unknown implementation extern

    // invalid
    pub const E0400: DiagCode = DiagCode("E0400"); // constructor argument shape
    pub const E0402: DiagCode = DiagCode("E0402"); // non-positive capacity

    // overlimit
    pub const E0501: DiagCode = DiagCode("E0501"); // capacity too large
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Related span ─────────────────────────────────────────────────────────

/// A secondary source location providing context for a diagnostic.
#[derive(Debug, Clone)]
pub struct RelatedSpan {
    pub span: Span,
    pub label: String,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A lowering diagnostic attached to the offending source construct.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub span: Span,
    pub message: String,
    pub hint: Option<String>,
    pub related_spans: Vec<RelatedSpan>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, hint, or related spans.
    pub fn new(level: DiagLevel, span: Span, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            span,
            message: message.into(),
            hint: None,
            related_spans: Vec::new(),
        }
    }

    /// Shorthand for an error-level diagnostic with a code.
    pub fn error(code: DiagCode, span: Span, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, span, message).with_code(code)
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attach a related span.
    pub fn with_related(mut self, span: Span, label: impl Into<String>) -> Self {
        self.related_spans.push(RelatedSpan {
            span,
            label: label.into(),
        });
        self
    }

    pub fn class(&self) -> Option<ErrorClass> {
        self.code.map(|c| c.class())
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}: {}", level, code, code.class(), self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        write!(f, " (at {}..{})", self.span.start, self.span.end)?;
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

/// True if any diagnostic in `diags` is an error.
pub fn has_errors(diags: &[Diagnostic]) -> bool {
    diags.iter().any(|d| d.level == DiagLevel::Error)
}

// ── Internal errors ──────────────────────────────────────────────────────

/// A broken contract with an upstream collaborator. Not user input; halts
/// compilation immediately.
#[derive(Debug, thiserror::Error)]
pub enum InternalError {
    #[error("{construct}: expected an action call")]
    NotAnActionCall { construct: String },
    #[error("{construct}: expression has no type annotation")]
    MissingType { construct: String },
    #[error("declaration id {id} is used by both `{first}` and `{second}`")]
    DuplicateDecl {
        id: u32,
        first: String,
        second: String,
    },
    #[error("{construct}: unknown declaration id {id}")]
    UnknownDecl { construct: String, id: u32 },
    #[error("{table}: entry has {got} key values, table key has {expected}")]
    EntryArity {
        table: String,
        expected: usize,
        got: usize,
    },
    #[error("{call}: no argument for parameter `{param}`")]
    MissingArgument { call: String, param: String },
    #[error("{construct}: expression cannot appear in generated code")]
    UnexpectedExpr { construct: String },
    #[error("{construct}: expected {expected} argument(s), got {got}")]
    MethodArity {
        construct: String,
        expected: usize,
        got: usize,
    },
}
