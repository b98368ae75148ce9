//! AST-to-bytecode compiler.
//!
//! Single-pass compilation: walks the AST once, emitting bytecode into one
//! `Chunk`. Names are not resolved here; every variable and callee is looked
//! up by name at run time. Function bodies and comprehension regions are
//! emitted inline behind a forward jump so that straight-line execution
//! never falls into them.

use crate::ast::{FunctionDecl, Program};
use crate::error::CompileError;
use crate::span::Span;

use super::chunk::{Chunk, CompiledModule, Constant, FunctionProto, MAX_TABLE_LEN};
use super::opcode::Op;

/// Result type for compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// Most arguments a single call can pass.
pub const MAX_CALL_ARGS: usize = u8::MAX as usize;

/// The compiler: transforms AST into bytecode.
#[derive(Debug, Default)]
pub struct Compiler {
    /// The chunk being built.
    pub chunk: Chunk,
    /// How many function bodies enclose the code being compiled.
    pub function_depth: usize,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile a full program.
    pub fn compile(program: &Program) -> CompileResult<CompiledModule> {
        let mut compiler = Compiler::new();
        for stmt in &program.statements {
            compiler.compile_stmt(stmt)?;
        }
        Ok(CompiledModule::new(compiler.chunk))
    }

    // --- Chunk helpers ---

    pub fn emit(&mut self, op: Op, span: Span) -> usize {
        self.chunk.emit(op, span)
    }

    pub fn emit_constant(&mut self, constant: Constant, span: Span) -> CompileResult<()> {
        let idx = self
            .chunk
            .add_constant(constant)
            .ok_or_else(|| CompileError::too_many("constants", MAX_TABLE_LEN, span))?;
        self.emit(Op::LoadConst(idx), span);
        Ok(())
    }

    pub fn current_offset(&self) -> usize {
        self.chunk.len()
    }

    /// Emit a jump with a placeholder target; resolve it with `patch_jump`.
    pub fn emit_jump(&mut self, op: Op, span: Span) -> usize {
        self.emit(op, span)
    }

    pub fn patch_jump(&mut self, offset: usize) {
        self.chunk.patch_jump(offset);
    }

    /// Intern an identifier, rejecting empty ones.
    pub fn name_index(&mut self, name: &str, what: &'static str, span: Span) -> CompileResult<u16> {
        if name.is_empty() {
            return Err(CompileError::EmptyName { what, span });
        }
        self.chunk
            .add_name(name)
            .ok_or_else(|| CompileError::too_many("names", MAX_TABLE_LEN, span))
    }

    /// Element count operand for the collection-building instructions.
    pub fn element_count(&self, count: usize, span: Span) -> CompileResult<u16> {
        u16::try_from(count)
            .map_err(|_| CompileError::too_many("collection elements", u16::MAX as usize, span))
    }

    // --- Function compilation ---

    /// Emit a function body behind a jump, then the `FUNC_DEF` that creates
    /// the function value. Leaves the new function on the stack.
    pub fn compile_function(&mut self, decl: &FunctionDecl, span: Span) -> CompileResult<()> {
        let label = decl.name.as_deref().unwrap_or("<lambda>");
        if decl.name.as_deref() == Some("") {
            return Err(CompileError::EmptyName {
                what: "function",
                span,
            });
        }
        for (i, param) in decl.params.iter().enumerate() {
            if param.is_empty() {
                return Err(CompileError::EmptyName {
                    what: "parameter",
                    span,
                });
            }
            if decl.params[..i].contains(param) {
                return Err(CompileError::DuplicateParameter {
                    function: label.to_string(),
                    name: param.clone(),
                    span,
                });
            }
        }

        let skip = self.emit_jump(Op::Jump(usize::MAX), span);
        let start = self.current_offset();

        self.function_depth += 1;
        for stmt in &decl.body {
            self.compile_stmt(stmt)?;
        }
        self.function_depth -= 1;

        // Falling off the end returns Absent.
        self.emit(Op::Return, span);
        self.patch_jump(skip);

        let idx = self
            .chunk
            .add_function(FunctionProto {
                name: decl.name.clone(),
                params: decl.params.clone(),
                start,
            })
            .ok_or_else(|| CompileError::too_many("functions", MAX_TABLE_LEN, span))?;
        self.emit(Op::FuncDef(idx), span);
        Ok(())
    }
}
