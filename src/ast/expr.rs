//! Expression AST nodes.

use crate::ast::stmt::FunctionDecl;
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

    /// Attach a source location to a hand-built node.
    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    // --- Constructors for trees built without a parser ---

    pub fn int(value: i64) -> Self {
        Self::new(ExprKind::Int(value), Span::default())
    }

    pub fn float(value: f64) -> Self {
        Self::new(ExprKind::Float(value), Span::default())
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::new(ExprKind::Text(value.into()), Span::default())
    }

    pub fn bool(value: bool) -> Self {
        Self::new(ExprKind::Bool(value), Span::default())
    }

    pub fn var(name: impl Into<String>) -> Self {
        Self::new(ExprKind::Variable(name.into()), Span::default())
    }

    pub fn binary(left: Expr, operator: BinaryOp, right: Expr) -> Self {
        Self::new(
            ExprKind::Binary {
                left: Box::new(left),
                operator,
                right: Box::new(right),
            },
            Span::default(),
        )
    }

    pub fn negate(operand: Expr) -> Self {
        Self::new(
            ExprKind::Unary {
                operator: UnaryOp::Negate,
                operand: Box::new(operand),
            },
            Span::default(),
        )
    }

    /// Call a function by name: `name(args...)`.
    pub fn call(name: impl Into<String>, arguments: Vec<Expr>) -> Self {
        Self::new(
            ExprKind::Call {
                callee: Callee::Named(name.into()),
                arguments,
            },
            Span::default(),
        )
    }

    /// Call the value of an arbitrary expression: `(expr)(args...)`.
    pub fn call_expr(callee: Expr, arguments: Vec<Expr>) -> Self {
        Self::new(
            ExprKind::Call {
                callee: Callee::Expr(Box::new(callee)),
                arguments,
            },
            Span::default(),
        )
    }

    pub fn lambda(params: &[&str], body: Vec<crate::ast::Stmt>) -> Self {
        Self::new(
            ExprKind::Lambda(FunctionDecl::new(None, params, body)),
            Span::default(),
        )
    }

    pub fn list(elements: Vec<Expr>) -> Self {
        Self::new(ExprKind::List(elements), Span::default())
    }

    pub fn set(elements: Vec<Expr>) -> Self {
        Self::new(ExprKind::Set(elements), Span::default())
    }

    pub fn tuple(elements: Vec<Expr>) -> Self {
        Self::new(ExprKind::Tuple(elements), Span::default())
    }

    pub fn mapping(pairs: Vec<(Expr, Expr)>) -> Self {
        Self::new(ExprKind::Mapping(pairs), Span::default())
    }

    pub fn comprehension(comprehension: Comprehension) -> Self {
        Self::new(ExprKind::Comprehension(comprehension), Span::default())
    }
}

/// All expression variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Integer literal: 42
    Int(i64),
    /// Float literal: 3.5
    Float(f64),
    /// Text literal: "hello"
    Text(String),
    /// Boolean literal: true, false
    Bool(bool),

    /// Variable reference: foo
    Variable(String),

    /// Binary operation: a + b
    Binary {
        left: Box<Expr>,
        operator: BinaryOp,
        right: Box<Expr>,
    },

    /// Unary operation: -x
    Unary {
        operator: UnaryOp,
        operand: Box<Expr>,
    },

    /// Function call: foo(a, b) or (expr)(a, b)
    Call {
        callee: Callee,
        arguments: Vec<Expr>,
    },

    /// Anonymous function: Func (a, b) { ... }
    Lambda(FunctionDecl),

    /// List literal: [a, b]
    List(Vec<Expr>),
    /// Set literal: {a, b}
    Set(Vec<Expr>),
    /// Tuple literal: (a, b)
    Tuple(Vec<Expr>),
    /// Mapping literal: {k: v}
    Mapping(Vec<(Expr, Expr)>),

    /// List/set/mapping comprehension or generator expression.
    Comprehension(Comprehension),
}

/// What a call expression calls.
#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    /// Resolved by name at run time (function table first, then variables).
    Named(String),
    /// Any expression producing a function value.
    Expr(Box<Expr>),
}

/// The collection a comprehension produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComprehensionKind {
    List,
    Set,
    Mapping,
    Generator,
}

impl std::fmt::Display for ComprehensionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComprehensionKind::List => write!(f, "list"),
            ComprehensionKind::Set => write!(f, "set"),
            ComprehensionKind::Mapping => write!(f, "mapping"),
            ComprehensionKind::Generator => write!(f, "generator"),
        }
    }
}

/// The per-element expression of a comprehension.
#[derive(Debug, Clone, PartialEq)]
pub enum ComprehensionElement {
    /// `[expr for ...]`, `{expr for ...}`, `(expr for ...)`
    Single(Box<Expr>),
    /// `{key: value for ...}`
    Pair(Box<Expr>, Box<Expr>),
}

/// One `for variable in source` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct ComprehensionClause {
    pub variable: String,
    pub source: Expr,
    pub span: Span,
}

impl ComprehensionClause {
    pub fn new(variable: impl Into<String>, source: Expr) -> Self {
        Self {
            variable: variable.into(),
            source,
            span: Span::default(),
        }
    }
}

/// `[element for v1 in s1 for v2 in s2 ... if filter]`
#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
    pub kind: ComprehensionKind,
    pub element: ComprehensionElement,
    pub clauses: Vec<ComprehensionClause>,
    pub filter: Option<Box<Expr>>,
}

impl Comprehension {
    fn with_element(
        kind: ComprehensionKind,
        element: ComprehensionElement,
        clauses: Vec<ComprehensionClause>,
    ) -> Self {
        Self {
            kind,
            element,
            clauses,
            filter: None,
        }
    }

    pub fn list(element: Expr, clauses: Vec<ComprehensionClause>) -> Self {
        Self::with_element(
            ComprehensionKind::List,
            ComprehensionElement::Single(Box::new(element)),
            clauses,
        )
    }

    pub fn set(element: Expr, clauses: Vec<ComprehensionClause>) -> Self {
        Self::with_element(
            ComprehensionKind::Set,
            ComprehensionElement::Single(Box::new(element)),
            clauses,
        )
    }

    pub fn generator(element: Expr, clauses: Vec<ComprehensionClause>) -> Self {
        Self::with_element(
            ComprehensionKind::Generator,
            ComprehensionElement::Single(Box::new(element)),
            clauses,
        )
    }

    pub fn mapping(key: Expr, value: Expr, clauses: Vec<ComprehensionClause>) -> Self {
        Self::with_element(
            ComprehensionKind::Mapping,
            ComprehensionElement::Pair(Box::new(key), Box::new(value)),
            clauses,
        )
    }

    pub fn filter(mut self, predicate: Expr) -> Self {
        self.filter = Some(Box::new(predicate));
        self
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl BinaryOp {
    /// The operator token as written in source.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
        }
    }

    /// Parse an operator token.
    pub fn from_token(token: &str) -> Option<BinaryOp> {
        let op = match token {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Subtract,
            "*" => BinaryOp::Multiply,
            "/" => BinaryOp::Divide,
            "%" => BinaryOp::Modulo,
            "==" => BinaryOp::Equal,
            "!=" => BinaryOp::NotEqual,
            "<" => BinaryOp::Less,
            "<=" => BinaryOp::LessEqual,
            ">" => BinaryOp::Greater,
            ">=" => BinaryOp::GreaterEqual,
            _ => return None,
        };
        Some(op)
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::Less
                | BinaryOp::LessEqual
                | BinaryOp::Greater
                | BinaryOp::GreaterEqual
        )
    }
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
}

impl std::fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnaryOp::Negate => write!(f, "-"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_tokens_roundtrip() {
        for token in ["+", "-", "*", "/", "%", "==", "!=", "<", "<=", ">", ">="] {
            let op = BinaryOp::from_token(token).expect("known operator");
            assert_eq!(op.symbol(), token);
        }
        assert_eq!(BinaryOp::from_token("**"), None);
    }

    #[test]
    fn test_comparison_classification() {
        assert!(BinaryOp::LessEqual.is_comparison());
        assert!(!BinaryOp::Modulo.is_comparison());
    }
}
