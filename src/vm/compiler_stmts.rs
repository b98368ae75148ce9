//! Statement compilation: AST statements to bytecode.

use crate::ast::{Expr, FunctionDecl, Stmt, StmtKind};
use crate::error::CompileError;
use crate::span::Span;

use super::compiler::{CompileResult, Compiler};
use super::opcode::Op;

impl Compiler {
    /// Compile a statement.
    pub fn compile_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        let span = stmt.span;
        match &stmt.kind {
            StmtKind::Expression(expr) => {
                self.compile_expr(expr)?;
                self.emit(Op::Pop, span);
            }
            StmtKind::Let { name, initializer } => {
                self.compile_let(name, initializer, span)?;
            }
            StmtKind::Print(expr) => {
                self.compile_expr(expr)?;
                self.emit(Op::Print, span);
            }
            StmtKind::Function(decl) => {
                self.compile_function_decl(decl, span)?;
            }
            StmtKind::Return(expr) => {
                if self.function_depth == 0 {
                    return Err(CompileError::ReturnOutsideFunction(span));
                }
                self.compile_expr(expr)?;
                self.emit(Op::Return, span);
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.compile_if_stmt(condition, then_branch, else_branch.as_deref(), span)?;
            }
            StmtKind::For {
                variable,
                iterable,
                body,
            } => {
                self.compile_for(variable, iterable, body, span)?;
            }
            StmtKind::Halt => {
                self.emit(Op::Halt, span);
            }
        }
        Ok(())
    }

    fn compile_block(&mut self, stmts: &[Stmt]) -> CompileResult<()> {
        for stmt in stmts {
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    fn compile_let(&mut self, name: &str, initializer: &Expr, span: Span) -> CompileResult<()> {
        let idx = self.name_index(name, "variable", span)?;
        self.compile_expr(initializer)?;
        self.emit(Op::StoreVar(idx), span);
        Ok(())
    }

    fn compile_function_decl(&mut self, decl: &FunctionDecl, span: Span) -> CompileResult<()> {
        let name = match decl.name.as_deref() {
            Some(name) => name,
            None => {
                return Err(CompileError::new(
                    "Function statement without a name",
                    span,
                ))
            }
        };
        let idx = self.name_index(name, "function", span)?;
        self.compile_function(decl, span)?;
        self.emit(Op::StoreVar(idx), span);
        Ok(())
    }

    fn compile_if_stmt(
        &mut self,
        condition: &Expr,
        then_branch: &[Stmt],
        else_branch: Option<&[Stmt]>,
        span: Span,
    ) -> CompileResult<()> {
        self.compile_expr(condition)?;
        let then_jump = self.emit_jump(Op::JumpIfFalse(usize::MAX), span);

        self.compile_block(then_branch)?;

        if let Some(else_stmts) = else_branch {
            let else_jump = self.emit_jump(Op::Jump(usize::MAX), span);
            self.patch_jump(then_jump);
            self.compile_block(else_stmts)?;
            self.patch_jump(else_jump);
        } else {
            self.patch_jump(then_jump);
        }
        Ok(())
    }

    fn compile_for(
        &mut self,
        variable: &str,
        iterable: &Expr,
        body: &[Stmt],
        span: Span,
    ) -> CompileResult<()> {
        let var_idx = self.name_index(variable, "loop variable", span)?;

        self.compile_expr(iterable)?;
        self.emit(Op::GetIter, span);

        let loop_start = self.current_offset();
        let exit_jump = self.emit_jump(Op::ForIter(usize::MAX), span);
        self.emit(Op::StoreVar(var_idx), span);

        self.compile_block(body)?;

        self.emit(Op::Jump(loop_start), span);
        self.patch_jump(exit_jump);
        Ok(())
    }
}
