//! Abstract Syntax Tree for gscript.

pub mod expr;
pub mod stmt;

pub use expr::{BinaryOp, Expr, ExprKind, FunctionLiteral, Literal, Parameter, UnaryOp};
pub use stmt::{
    AssignOp, ClassDecl, EnumDecl, FunctionDecl, ImportDecl, ImportSource, Program, Stmt,
    StmtKind, SwitchCase,
};
