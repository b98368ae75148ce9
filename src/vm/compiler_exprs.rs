//! Expression compilation: AST expressions to bytecode.

use crate::ast::{
    Callee, Comprehension, ComprehensionElement, ComprehensionKind, Expr, ExprKind, UnaryOp,
};
use crate::error::CompileError;
use crate::span::Span;

use super::chunk::{ComprehensionProto, Constant, MAX_TABLE_LEN};
use super::compiler::{CompileResult, Compiler, MAX_CALL_ARGS};
use super::opcode::Op;

impl Compiler {
    /// Compile an expression, leaving its result on the stack.
    pub fn compile_expr(&mut self, expr: &Expr) -> CompileResult<()> {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Int(n) => self.emit_constant(Constant::Int(*n), span)?,
            ExprKind::Float(x) => self.emit_constant(Constant::Float(*x), span)?,
            ExprKind::Text(s) => self.emit_constant(Constant::Text(s.clone()), span)?,
            ExprKind::Bool(b) => self.emit_constant(Constant::Bool(*b), span)?,
            ExprKind::Variable(name) => {
                let idx = self.name_index(name, "variable", span)?;
                self.emit(Op::LoadVar(idx), span);
            }
            ExprKind::Binary {
                left,
                operator,
                right,
            } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.emit(Op::Binary(*operator), span);
            }
            ExprKind::Unary { operator, operand } => {
                self.compile_expr(operand)?;
                match operator {
                    UnaryOp::Negate => self.emit(Op::Negate, span),
                };
            }
            ExprKind::Call { callee, arguments } => {
                self.compile_call(callee, arguments, span)?;
            }
            ExprKind::Lambda(decl) => {
                self.compile_function(decl, span)?;
            }
            ExprKind::List(elements) => {
                let n = self.compile_elements(elements, span)?;
                self.emit(Op::BuildList(n), span);
            }
            ExprKind::Set(elements) => {
                let n = self.compile_elements(elements, span)?;
                self.emit(Op::BuildSet(n), span);
            }
            ExprKind::Tuple(elements) => {
                let n = self.compile_elements(elements, span)?;
                self.emit(Op::BuildTuple(n), span);
            }
            ExprKind::Mapping(pairs) => {
                let n = self.element_count(pairs.len(), span)?;
                for (key, value) in pairs {
                    self.compile_expr(key)?;
                    self.compile_expr(value)?;
                }
                self.emit(Op::BuildMapping(n), span);
            }
            ExprKind::Comprehension(comprehension) => {
                self.compile_comprehension(comprehension, span)?;
            }
        }
        Ok(())
    }

    fn compile_elements(&mut self, elements: &[Expr], span: Span) -> CompileResult<u16> {
        let n = self.element_count(elements.len(), span)?;
        for element in elements {
            self.compile_expr(element)?;
        }
        Ok(n)
    }

    fn compile_call(&mut self, callee: &Callee, arguments: &[Expr], span: Span) -> CompileResult<()> {
        let argc = u8::try_from(arguments.len())
            .map_err(|_| CompileError::too_many("call arguments", MAX_CALL_ARGS, span))?;

        let name = match callee {
            Callee::Named(name) => Some(self.name_index(name, "function", span)?),
            Callee::Expr(expr) => {
                self.compile_expr(expr)?;
                None
            }
        };

        for arg in arguments {
            self.compile_expr(arg)?;
        }

        self.emit(Op::Call { name, argc }, span);
        Ok(())
    }

    /// Push every clause source, then emit the element/value/filter regions
    /// behind a jump. The engine drives the iteration.
    fn compile_comprehension(
        &mut self,
        comprehension: &Comprehension,
        span: Span,
    ) -> CompileResult<()> {
        if comprehension.clauses.is_empty() {
            return Err(CompileError::malformed_comprehension(
                format!("A {} comprehension needs at least one 'for' clause", comprehension.kind),
                span,
            ));
        }
        let pair_expected = comprehension.kind == ComprehensionKind::Mapping;
        let has_pair = matches!(comprehension.element, ComprehensionElement::Pair(..));
        if pair_expected != has_pair {
            let message = if pair_expected {
                "A mapping comprehension needs a key: value element".to_string()
            } else {
                format!(
                    "A {} comprehension cannot have a key: value element",
                    comprehension.kind
                )
            };
            return Err(CompileError::malformed_comprehension(message, span));
        }

        let mut variables = Vec::with_capacity(comprehension.clauses.len());
        for clause in &comprehension.clauses {
            let clause_span = if clause.span.is_unknown() {
                span
            } else {
                clause.span
            };
            if clause.variable.is_empty() {
                return Err(CompileError::EmptyName {
                    what: "comprehension variable",
                    span: clause_span,
                });
            }
            self.compile_expr(&clause.source)?;
            variables.push(clause.variable.clone());
        }

        let skip = self.emit_jump(Op::Jump(usize::MAX), span);

        let (element, value) = match &comprehension.element {
            ComprehensionElement::Single(expr) => (self.compile_region(expr)?, None),
            ComprehensionElement::Pair(key, value) => {
                let key_start = self.compile_region(key)?;
                let value_start = self.compile_region(value)?;
                (key_start, Some(value_start))
            }
        };
        let filter = match &comprehension.filter {
            Some(predicate) => Some(self.compile_region(predicate)?),
            None => None,
        };

        self.patch_jump(skip);

        let idx = self
            .chunk
            .add_comprehension(ComprehensionProto {
                kind: comprehension.kind,
                variables,
                element,
                value,
                filter,
            })
            .ok_or_else(|| CompileError::too_many("comprehensions", MAX_TABLE_LEN, span))?;
        self.emit(Op::Comprehension(idx), span);
        Ok(())
    }

    /// A sub-expression evaluated in its own frame; returns its start offset.
    fn compile_region(&mut self, expr: &Expr) -> CompileResult<usize> {
        let start = self.current_offset();
        self.compile_expr(expr)?;
        self.emit(Op::Return, expr.span);
        Ok(start)
    }
}
