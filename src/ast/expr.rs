//! Expression AST nodes.

use crate::ast::stmt::Stmt;
use crate::span::Span;

/// An expression in the AST.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Whether evaluating this expression can produce several values.
    pub fn is_call(&self) -> bool {
        matches!(self.kind, ExprKind::Call { .. })
    }
}

/// A compile-time constant usable as a map key or parameter default.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

/// All expression variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    IntLiteral(i64),
    FloatLiteral(f64),
    StringLiteral(String),
    BoolLiteral(bool),
    Nil,

    /// Variable reference: foo
    Variable(String),

    /// Binary operation: a + b
    Binary {
        left: Box<Expr>,
        operator: BinaryOp,
        right: Box<Expr>,
    },

    /// Unary operation: -x, ~x, !x
    Unary {
        operator: UnaryOp,
        operand: Box<Expr>,
    },

    /// Attribute or element access: obj.name, obj[key]
    Index { object: Box<Expr>, key: Box<Expr> },

    /// Function call: f(a, b)
    Call {
        callee: Box<Expr>,
        arguments: Vec<Expr>,
    },

    /// cond ? a : b
    Ternary {
        condition: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },

    /// Array literal: [a, b]
    Array(Vec<Expr>),

    /// Map literal: {a: 1, "b": 2}
    Map(Vec<(Literal, Expr)>),

    /// Anonymous function: func(a) { ... }
    Function(FunctionLiteral),

    /// Class instantiation: new Point(1, 2)
    New { class: String, arguments: Vec<Expr> },

    /// ++x, x++, --x, x--
    Increment {
        target: Box<Expr>,
        delta: i64,
        prefix: bool,
    },
}

/// Binary operators, in the order of their opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    BitAnd,
    BitXor,
    BitOr,
    IntDivide,
    ShiftRight,
    ShiftLeft,
    LessEqual,
    GreaterEqual,
    Less,
    Greater,
    Equal,
    NotEqual,
    And,
    Or,
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitXor => "^",
            BinaryOp::BitOr => "|",
            BinaryOp::IntDivide => "//",
            BinaryOp::ShiftRight => ">>",
            BinaryOp::ShiftLeft => "<<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::Less => "<",
            BinaryOp::Greater => ">",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        write!(f, "{}", s)
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `~x`
    BitNot,
    /// `-x`
    Negate,
    /// `!x`
    Not,
}

/// A function parameter. Defaults are restricted to literals.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub default: Option<Literal>,
    pub span: Span,
}

/// A function body with its parameter list.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionLiteral {
    pub params: Vec<Parameter>,
    /// Name bound to the array of extra arguments: `...rest`.
    pub variadic: Option<String>,
    pub body: Vec<Stmt>,
    pub span: Span,
}
