//! Statement AST nodes.

use crate::ast::expr::{BinaryOp, Expr, FunctionLiteral};
use crate::span::Span;

/// A statement in the AST.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Statement variants.
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Call or increment used as a statement; its values are discarded.
    Expression(Expr),

    /// Variable declaration: let a, b = x, y
    Let { names: Vec<String>, values: Vec<Expr> },

    /// Assignment: a, b.c = x, y  or  a += 1
    Assign {
        targets: Vec<Expr>,
        operator: AssignOp,
        values: Vec<Expr>,
    },

    /// Block: { statements }
    Block(Vec<Stmt>),

    /// if (c) .. elif (c) .. else ..; `else` is stored as a final `true` branch.
    If { branches: Vec<(Expr, Vec<Stmt>)> },

    /// while (cond) body
    While { condition: Expr, body: Vec<Stmt> },

    /// for (init; cond; post) body
    For {
        init: Option<Box<Stmt>>,
        condition: Option<Expr>,
        post: Option<Box<Stmt>>,
        body: Vec<Stmt>,
    },

    /// loop (let k, v : iterable) body
    Loop {
        key: Option<String>,
        value: String,
        iterable: Expr,
        body: Vec<Stmt>,
    },

    /// switch (value) { case a, b: .. default: .. }
    Switch {
        value: Expr,
        cases: Vec<SwitchCase>,
        default: Option<Vec<Stmt>>,
    },

    Label(String),
    Goto(String),
    Break,
    Continue,
    Fallthrough,

    /// return a, b
    Return(Vec<Expr>),

    /// try { .. } catch (e) { .. }
    Try {
        body: Vec<Stmt>,
        catch_var: Option<String>,
        catch_body: Vec<Stmt>,
    },
}

/// Assignment operators. Compound forms map onto a binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    BitAnd,
    BitXor,
    BitOr,
}

impl AssignOp {
    pub fn binary_op(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Subtract => Some(BinaryOp::Subtract),
            AssignOp::Multiply => Some(BinaryOp::Multiply),
            AssignOp::Divide => Some(BinaryOp::Divide),
            AssignOp::Modulo => Some(BinaryOp::Modulo),
            AssignOp::BitAnd => Some(BinaryOp::BitAnd),
            AssignOp::BitXor => Some(BinaryOp::BitXor),
            AssignOp::BitOr => Some(BinaryOp::BitOr),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub values: Vec<Expr>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// Named top-level function: func name(params) { body }
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub func: FunctionLiteral,
    pub span: Span,
}

/// class Name { attr = exp; method(args) { .. }; __self(args) { .. } }
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    pub fields: Vec<(String, Expr)>,
    pub constructor: Option<FunctionLiteral>,
    pub span: Span,
}

/// enum { A, B = 5, C }
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDecl {
    pub variants: Vec<(String, i64)>,
    pub span: Span,
}

/// Where an import comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportSource {
    /// `import fs`
    Stdlib(String),
    /// `import "./lib/util"`
    File(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub source: ImportSource,
    pub alias: String,
    pub span: Span,
}

/// A parsed source file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub imports: Vec<ImportDecl>,
    pub statements: Vec<Stmt>,
    pub functions: Vec<FunctionDecl>,
    pub classes: Vec<ClassDecl>,
    pub enums: Vec<EnumDecl>,
    pub export: Option<Expr>,
}
