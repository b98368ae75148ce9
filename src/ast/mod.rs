//! Abstract Syntax Tree consumed by the bytecode compiler.
//!
//! The tree is produced by an external front end; the constructors on
//! [`Expr`] and [`Stmt`] let hosts and tests build programs directly.

pub mod expr;
pub mod stmt;

pub use expr::{
    BinaryOp, Callee, Comprehension, ComprehensionClause, ComprehensionElement,
    ComprehensionKind, Expr, ExprKind, UnaryOp,
};
pub use stmt::{FunctionDecl, Program, Stmt, StmtKind};
