//! Expression and unit-source syntax trees.
//!
//! The surface AST ([`Expr`]) comes out of the dialect parsers; the typed
//! AST ([`TypedExpr`]) comes out of analysis with every node annotated with
//! its computed [`DataType`] and all implicit widenings made explicit.

use flowscope_core::DataType;

/// A literal value in source text.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Literal {
    Str(String),
    I64(i64),
    F64(f64),
    Bool(bool),
}

impl Literal {
    pub(crate) fn data_type(&self) -> DataType {
        match self {
            Literal::Str(_) => DataType::String,
            Literal::I64(_) => DataType::I64,
            Literal::F64(_) => DataType::F64,
            Literal::Bool(_) => DataType::Bool,
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    /// Logical negation (`!` / `Not`).
    Not,
    /// Arithmetic negation.
    Neg,
}

/// Binary operators, post-dialect: both surface dialects map onto this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    /// String concatenation. Surfaced as `&` in the basic-like dialect; the
    /// analyzer also rewrites c-like `+` over strings to this.
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Surface expression.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Literal),
    Identifier(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        /// Explicit namespace qualifier, if written (`Text.Len(x)`).
        namespace: Option<String>,
        name: String,
        args: Vec<Expr>,
    },
}

/// A parsed `unit` block from ahead-of-time source.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct UnitDecl {
    pub name: String,
    /// 1-indexed source line of the declaration.
    pub line: u32,
    pub members: Vec<MemberDecl>,
}

/// A parsed `member` declaration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MemberDecl {
    pub name: String,
    pub line: u32,
    pub params: Vec<(String, DataType)>,
    pub return_type: DataType,
    pub body: Expr,
}

/// Type-annotated expression produced by analysis.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TypedExpr {
    pub kind: TypedExprKind,
    pub ty: DataType,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TypedExprKind {
    Literal(Literal),
    /// A member parameter, by position.
    Param(u16),
    /// A workflow location, resolved by name at evaluation time.
    Location(String),
    Unary {
        op: UnaryOp,
        operand: Box<TypedExpr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<TypedExpr>,
        rhs: Box<TypedExpr>,
    },
    /// Implicit `i64` to `f64` widening made explicit.
    Widen(Box<TypedExpr>),
    Call {
        namespace: String,
        name: String,
        args: Vec<TypedExpr>,
    },
}

impl TypedExpr {
    pub(crate) fn new(kind: TypedExprKind, ty: DataType) -> Self {
        TypedExpr { kind, ty }
    }

    /// Wrap in a widening node, producing `f64`.
    pub(crate) fn widened(self) -> Self {
        TypedExpr {
            kind: TypedExprKind::Widen(Box::new(self)),
            ty: DataType::F64,
        }
    }
}
