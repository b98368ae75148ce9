//! Error types for compilation and execution.

use crate::span::Span;
use thiserror::Error;

/// Lowering errors: the AST handed to the compiler breaks its contract.
#[derive(Debug, Error, PartialEq)]
pub enum CompileError {
    #[error("Empty {what} name at {span}")]
    EmptyName { what: &'static str, span: Span },

    #[error("Duplicate parameter '{name}' in function '{function}' at {span}")]
    DuplicateParameter {
        function: String,
        name: String,
        span: Span,
    },

    #[error("'return' outside of a function body at {0}")]
    ReturnOutsideFunction(Span),

    #[error("{message} at {span}")]
    MalformedComprehension { message: String, span: Span },

    #[error("Too many {what} (limit {limit}) at {span}")]
    TooMany {
        what: &'static str,
        limit: usize,
        span: Span,
    },

    #[error("{message} at {span}")]
    General { message: String, span: Span },
}

impl CompileError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self::General {
            message: message.into(),
            span,
        }
    }

    pub fn malformed_comprehension(message: impl Into<String>, span: Span) -> Self {
        Self::MalformedComprehension {
            message: message.into(),
            span,
        }
    }

    pub fn too_many(what: &'static str, limit: usize, span: Span) -> Self {
        Self::TooMany { what, limit, span }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::EmptyName { span, .. } => *span,
            Self::DuplicateParameter { span, .. } => *span,
            Self::ReturnOutsideFunction(span) => *span,
            Self::MalformedComprehension { span, .. } => *span,
            Self::TooMany { span, .. } => *span,
            Self::General { span, .. } => *span,
        }
    }
}

/// Runtime faults. Every fault aborts the current program run.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Undefined variable '{0}'")]
    UndefinedVariable(String),

    #[error("Undefined function '{0}'")]
    UndefinedFunction(String),

    #[error("Cannot call non-function value of type {0}")]
    NotCallable(&'static str),

    #[error("Function '{name}' expected {expected} arguments, got {got}")]
    WrongArity {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("Type error: {0}")]
    TypeError(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Cannot iterate over {0}")]
    NotIterable(&'static str),

    #[error("Unhashable type: {0}")]
    Unhashable(&'static str),

    #[error("Native function '{name}' failed: {message}")]
    Host { name: String, message: String },

    #[error("Maximum call depth of {0} exceeded")]
    CallDepthExceeded(usize),

    #[error("Maximum native re-entry depth of {0} exceeded")]
    NativeDepthExceeded(usize),

    #[error("{0}")]
    General(String),

    /// A fault annotated with the instruction that raised it.
    #[error("{error} [at {offset:04} {instruction}, {span}]")]
    Fault {
        error: Box<RuntimeError>,
        offset: usize,
        instruction: String,
        span: Span,
    },

    /// Unwinding signal for a halt reached inside a nested call. The engine
    /// turns it into a normal stop; `Vm::execute` never returns it.
    #[error("Program halted")]
    Halted,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::General(message.into())
    }

    pub fn undefined_variable(name: impl Into<String>) -> Self {
        Self::UndefinedVariable(name.into())
    }

    pub fn undefined_function(name: impl Into<String>) -> Self {
        Self::UndefinedFunction(name.into())
    }

    pub fn wrong_arity(name: impl Into<String>, expected: usize, got: usize) -> Self {
        Self::WrongArity {
            name: name.into(),
            expected,
            got,
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::TypeError(message.into())
    }

    pub fn host(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Host {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Attach instruction context. Already-annotated faults and the halt
    /// signal pass through untouched so the innermost location wins.
    pub fn at(self, offset: usize, instruction: impl Into<String>, span: Span) -> Self {
        match self {
            Self::Fault { .. } | Self::Halted => self,
            error => Self::Fault {
                error: Box::new(error),
                offset,
                instruction: instruction.into(),
                span,
            },
        }
    }

    /// The underlying fault without instruction context.
    pub fn root(&self) -> &RuntimeError {
        match self {
            Self::Fault { error, .. } => error.root(),
            other => other,
        }
    }

    /// Offset of the failing instruction, when known.
    pub fn offset(&self) -> Option<usize> {
        match self {
            Self::Fault { offset, .. } => Some(*offset),
            _ => None,
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Fault { span, .. } => Some(*span),
            _ => None,
        }
    }

    pub fn is_halt(&self) -> bool {
        matches!(self, Self::Halted)
    }
}

/// A unified error type for compile-and-run entry points.
#[derive(Debug, Error)]
pub enum PlasmaError {
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_wraps_once() {
        let err = RuntimeError::undefined_variable("x")
            .at(3, "LOAD_VAR x", Span::line(2))
            .at(9, "CALL f 0", Span::line(7));
        assert_eq!(err.offset(), Some(3));
        assert!(matches!(err.root(), RuntimeError::UndefinedVariable(name) if name == "x"));
        assert_eq!(
            err.to_string(),
            "Undefined variable 'x' [at 0003 LOAD_VAR x, line 2, column 0]"
        );
    }

    #[test]
    fn test_halt_is_never_annotated() {
        let err = RuntimeError::Halted.at(1, "HALT", Span::default());
        assert!(err.is_halt());
    }

    #[test]
    fn test_unified_error_display() {
        let err: PlasmaError = CompileError::ReturnOutsideFunction(Span::line(4)).into();
        assert_eq!(
            err.to_string(),
            "Compile error: 'return' outside of a function body at line 4, column 0"
        );
    }
}
