//! Statement AST nodes.

use crate::ast::expr::Expr;
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

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn expr(expr: Expr) -> Self {
        Self::new(StmtKind::Expression(expr), Span::default())
    }

    pub fn let_(name: impl Into<String>, initializer: Expr) -> Self {
        Self::new(
            StmtKind::Let {
                name: name.into(),
                initializer,
            },
            Span::default(),
        )
    }

    pub fn print(expr: Expr) -> Self {
        Self::new(StmtKind::Print(expr), Span::default())
    }

    pub fn func(name: impl Into<String>, params: &[&str], body: Vec<Stmt>) -> Self {
        Self::new(
            StmtKind::Function(FunctionDecl::new(Some(name.into()), params, body)),
            Span::default(),
        )
    }

    pub fn ret(expr: Expr) -> Self {
        Self::new(StmtKind::Return(expr), Span::default())
    }

    pub fn if_(condition: Expr, then_branch: Vec<Stmt>, else_branch: Option<Vec<Stmt>>) -> Self {
        Self::new(
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
            Span::default(),
        )
    }

    pub fn for_in(variable: impl Into<String>, iterable: Expr, body: Vec<Stmt>) -> Self {
        Self::new(
            StmtKind::For {
                variable: variable.into(),
                iterable,
                body,
            },
            Span::default(),
        )
    }

    pub fn halt() -> Self {
        Self::new(StmtKind::Halt, Span::default())
    }
}

/// Statement variants.
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Expression statement; the value is discarded.
    Expression(Expr),

    /// Variable declaration: let x = expr
    Let { name: String, initializer: Expr },

    /// Print statement: Print [expr]
    Print(Expr),

    /// Named function definition: Func name(a, b) { ... }
    Function(FunctionDecl),

    /// Return statement: return expr
    Return(Expr),

    /// If statement: if cond { ... } else { ... }
    If {
        condition: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
    },

    /// For loop: for x in iter { ... }
    For {
        variable: String,
        iterable: Expr,
        body: Vec<Stmt>,
    },

    /// `end` / `run`: stop the whole program.
    Halt,
}

/// A function or lambda definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    /// `None` for lambdas.
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

impl FunctionDecl {
    pub fn new(name: Option<String>, params: &[&str], body: Vec<Stmt>) -> Self {
        Self {
            name,
            params: params.iter().map(|p| p.to_string()).collect(),
            body,
            span: Span::default(),
        }
    }
}

/// A complete program.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

impl Program {
    pub fn new(statements: Vec<Stmt>) -> Self {
        Self { statements }
    }
}
