// ir.rs — Type-checked program representation consumed by table lowering
//
// The front end and type checker live outside this crate. They hand over a
// resolved program in which every path carries the DeclId it resolves to and
// every expression that matters to layout carries its semantic type. The
// model is plain serde data so it can be dumped and reloaded as JSON.
//
// Preconditions: produced by a type checker; DeclIds are unique.
// Postconditions: none (data-only module).
// Failure modes: `Program::load`/`from_json` report I/O and JSON errors.
// Side effects: `Program::load` reads a file.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Byte-offset span into the original source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }
}

/// Identity of a declaration, assigned by name resolution.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct DeclId(pub u32);

// ── Semantic types ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SemType {
    Bits { width: u32, signed: bool },
    Bool,
    Struct { name: String, fields: Vec<StructField> },
    Enum { name: String, members: Vec<String> },
    Error,
    Varbit { max_width: u32 },
    Extern { name: String },
}

impl SemType {
    pub fn bits(width: u32) -> Self {
        SemType::Bits {
            width,
            signed: false,
        }
    }
}

impl fmt::Display for SemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemType::Bits { width, signed: false } => write!(f, "bit<{}>", width),
            SemType::Bits { width, signed: true } => write!(f, "int<{}>", width),
            SemType::Bool => f.write_str("bool"),
            SemType::Struct { name, .. } | SemType::Enum { name, .. } => f.write_str(name),
            SemType::Error => f.write_str("error"),
            SemType::Varbit { max_width } => write!(f, "varbit<{}>", max_width),
            SemType::Extern { name } => write!(f, "extern {}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    pub ty: SemType,
}

// ── Expressions ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<SemType>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "expr", rename_all = "snake_case")]
pub enum ExprKind {
    Path {
        name: String,
        decl: DeclId,
    },
    Member {
        base: Box<Expr>,
        member: String,
    },
    Constant {
        value: i64,
    },
    Bool {
        value: bool,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Cast {
        to: SemType,
        #[serde(rename = "operand")]
        expr: Box<Expr>,
    },
    Call {
        target: Box<Expr>,
        #[serde(default)]
        args: Vec<Argument>,
    },
    /// An extern constructor invocation, already evaluated to constant
    /// arguments (e.g. `hash_table(1024)`).
    Constructor {
        extern_type: String,
        #[serde(default)]
        args: Vec<Argument>,
    },
    Mask {
        value: Box<Expr>,
        mask: Box<Expr>,
    },
    Range {
        low: Box<Expr>,
        high: Box<Expr>,
    },
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    pub fn c_symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

/// A call or constructor argument, optionally named.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub expr: Expr,
}

impl Argument {
    pub fn positional(expr: Expr) -> Self {
        Argument { name: None, expr }
    }

    pub fn named(name: &str, expr: Expr) -> Self {
        Argument {
            name: Some(name.to_string()),
            expr,
        }
    }
}

/// The argument bound to parameter `name`: by name when the call names its
/// arguments, otherwise by `position`.
pub fn argument<'a>(args: &'a [Argument], name: &str, position: usize) -> Option<&'a Expr> {
    if args.iter().any(|a| a.name.is_some()) {
        args.iter()
            .find(|a| a.name.as_deref() == Some(name))
            .map(|a| &a.expr)
    } else {
        args.get(position).map(|a| &a.expr)
    }
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Option<SemType>) -> Self {
        Expr {
            kind,
            ty,
            span: Span::default(),
        }
    }

    pub fn path(name: &str, decl: DeclId, ty: Option<SemType>) -> Self {
        Expr::new(
            ExprKind::Path {
                name: name.to_string(),
                decl,
            },
            ty,
        )
    }

    pub fn member(base: Expr, member: &str, ty: Option<SemType>) -> Self {
        Expr::new(
            ExprKind::Member {
                base: Box::new(base),
                member: member.to_string(),
            },
            ty,
        )
    }

    pub fn constant(value: i64, ty: Option<SemType>) -> Self {
        Expr::new(ExprKind::Constant { value }, ty)
    }

    pub fn boolean(value: bool) -> Self {
        Expr::new(ExprKind::Bool { value }, Some(SemType::Bool))
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr, ty: Option<SemType>) -> Self {
        Expr::new(
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty,
        )
    }

    pub fn call(target: Expr, args: Vec<Argument>) -> Self {
        Expr::new(
            ExprKind::Call {
                target: Box::new(target),
                args,
            },
            None,
        )
    }

    pub fn constructor(extern_type: &str, args: Vec<Argument>) -> Self {
        Expr::new(
            ExprKind::Constructor {
                extern_type: extern_type.to_string(),
                args,
            },
            None,
        )
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Path { name, .. } => f.write_str(name),
            ExprKind::Member { base, member } => write!(f, "{}.{}", base, member),
            ExprKind::Constant { value } => write!(f, "{}", value),
            ExprKind::Bool { value } => write!(f, "{}", value),
            ExprKind::Unary { op, operand } => {
                let sym = match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Not => "!",
                    UnaryOp::BitNot => "~",
                };
                write!(f, "{}{}", sym, operand)
            }
            ExprKind::Binary { op, left, right } => {
                write!(f, "({} {} {})", left, op.c_symbol(), right)
            }
            ExprKind::Cast { to, expr } => write!(f, "({}){}", to, expr),
            ExprKind::Call { target, args } => {
                write!(f, "{}(", target)?;
                write_args(f, args)?;
                f.write_str(")")
            }
            ExprKind::Constructor { extern_type, args } => {
                write!(f, "{}(", extern_type)?;
                write_args(f, args)?;
                f.write_str(")")
            }
            ExprKind::Mask { value, mask } => write!(f, "{} &&& {}", value, mask),
            ExprKind::Range { low, high } => write!(f, "{} .. {}", low, high),
            ExprKind::DontCare => f.write_str("_"),
        }
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Argument]) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        if let Some(name) = &arg.name {
            write!(f, "{} = ", name)?;
        }
        write!(f, "{}", arg.expr)?;
    }
    Ok(())
}

// ── Statements ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stmt", rename_all = "snake_case")]
pub enum StmtKind {
    Assign {
        lhs: Expr,
        rhs: Expr,
    },
    Call {
        call: Expr,
    },
    If {
        cond: Expr,
        then: Box<Stmt>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        otherwise: Option<Box<Stmt>>,
    },
    Block {
        stmts: Vec<Stmt>,
    },
    VarDecl {
        name: String,
        decl: DeclId,
        ty: SemType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        init: Option<Expr>,
    },
    Return,
    Exit,
    Empty,
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Stmt {
            kind,
            span: Span::default(),
        }
    }

    pub fn assign(lhs: Expr, rhs: Expr) -> Self {
        Stmt::new(StmtKind::Assign { lhs, rhs })
    }

    pub fn call(call: Expr) -> Self {
        Stmt::new(StmtKind::Call { call })
    }
}

// ── Declarations ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub decl: DeclId,
    pub ty: SemType,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    pub decl: DeclId,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub body: Vec<Stmt>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyElement {
    pub expr: Expr,
    /// Name of the match_kind declaration the element resolves to.
    pub match_kind: String,
    #[serde(default)]
    pub span: Span,
}

/// Reference to an action in a table's `actions` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRef {
    pub name: String,
    pub decl: DeclId,
    #[serde(default)]
    pub span: Span,
}

/// A constant table entry: key values and the bound action call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub keys: Vec<Expr>,
    pub action: Expr,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Expression { expr: Expr },
    ExpressionList { exprs: Vec<Expr> },
    Absent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: PropertyValue,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub decl: DeclId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Vec<KeyElement>>,
    pub actions: Vec<ActionRef>,
    pub default_action: Expr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries: Option<Vec<Entry>>,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub span: Span,
}

impl Table {
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// An instantiated extern object (e.g. a counter array).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternInstance {
    pub name: String,
    pub decl: DeclId,
    pub type_name: String,
    #[serde(default)]
    pub args: Vec<Argument>,
    #[serde(default)]
    pub span: Span,
}

/// Any other named declaration a path may resolve to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    pub name: String,
    pub decl: DeclId,
    #[serde(default)]
    pub kind: DeclKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclKind {
    ControlParam,
    Local,
    Constant,
    #[default]
    Other,
}

/// A parameter of the generated apply functions (e.g. `struct headers *hdr`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextParam {
    pub c_type: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub externs: Vec<ExternInstance>,
    #[serde(default)]
    pub declarations: Vec<Declaration>,
    #[serde(default)]
    pub context: Vec<ContextParam>,
}

#[derive(Debug, thiserror::Error)]
pub enum IrError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed program: {0}")]
    Json(#[from] serde_json::Error),
}

impl Program {
    pub fn from_json(text: &str) -> Result<Program, IrError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Program, IrError> {
        let text = std::fs::read_to_string(path).map_err(|source| IrError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Program::from_json(&text)
    }

    /// Compact JSON with fields in declaration order; stable for hashing.
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn action(&self, decl: DeclId) -> Option<&Action> {
        self.actions.iter().find(|a| a.decl == decl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expr_display_renders_source_form() {
        let hdr = Expr::path("hdr", DeclId(1), None);
        let dst = Expr::member(Expr::member(hdr, "ipv4", None), "dst", Some(SemType::bits(32)));
        assert_eq!(dst.to_string(), "hdr.ipv4.dst");

        let call = Expr::call(
            Expr::path("forward", DeclId(2), None),
            vec![Argument::positional(Expr::constant(3, None))],
        );
        assert_eq!(call.to_string(), "forward(3)");
    }

    #[test]
    fn program_json_roundtrip_keeps_defaults() {
        let text = r#"{
            "actions": [{"name": "NoAction", "decl": 1}],
            "tables": [{
                "name": "t",
                "decl": 2,
                "actions": [{"name": "NoAction", "decl": 1}],
                "default_action": {"kind": {"expr": "call", "target": {"kind": {"expr": "path", "name": "NoAction", "decl": 1}}}}
            }]
        }"#;
        let program = Program::from_json(text).unwrap();
        assert_eq!(program.tables.len(), 1);
        assert!(program.tables[0].key.is_none());
        assert!(program.actions[0].params.is_empty());

        let again = Program::from_json(&program.canonical_json()).unwrap();
        assert_eq!(again, program);
    }

    #[test]
    fn arguments_bind_by_name_or_position() {
        let positional = [
            Argument::positional(Expr::constant(8, None)),
            Argument::positional(Expr::boolean(true)),
        ];
        assert_eq!(argument(&positional, "sparse", 1), Some(&positional[1].expr));
        assert_eq!(argument(&positional, "other", 2), None);

        let named = [
            Argument::named("sparse", Expr::boolean(false)),
            Argument::named("max_index", Expr::constant(8, None)),
        ];
        assert_eq!(argument(&named, "max_index", 0), Some(&named[1].expr));
    }

    #[test]
    fn cast_round_trips_through_json() {
        let cast = Expr::new(
            ExprKind::Cast {
                to: SemType::bits(16),
                expr: Box::new(Expr::constant(7, Some(SemType::bits(8)))),
            },
            Some(SemType::bits(16)),
        );
        let text = serde_json::to_string(&cast).unwrap();
        assert!(text.contains("\"expr\":\"cast\""));
        assert!(text.contains("\"operand\":"));
        let back: Expr = serde_json::from_str(&text).unwrap();
        assert_eq!(back, cast);
    }

    #[test]
    fn malformed_json_is_reported() {
        let err = Program::from_json("{\"tables\": 3}").unwrap_err();
        assert!(err.to_string().starts_with("malformed program"));
    }
}
