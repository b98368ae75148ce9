//! Bytecode opcodes for the Plasma VM.

use crate::ast::BinaryOp;

/// A single bytecode instruction.
///
/// Operands index into the tables of the owning [`Chunk`](super::chunk::Chunk):
/// the constant pool, the name table, and the function/comprehension
/// descriptor tables. Jump targets are absolute instruction indices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    // --- Constants & stack ---
    /// Push a constant from the constant pool onto the stack.
    LoadConst(u16),
    /// Pop the top value off the stack.
    Pop,

    // --- Variables ---
    /// Push the value bound to a name (locals, captured, globals).
    LoadVar(u16),
    /// Pop and bind to a name in the current scope.
    StoreVar(u16),

    // --- Operators ---
    /// Pop right then left, push `left <op> right`.
    Binary(BinaryOp),
    /// Numeric negation of the top of the stack.
    Negate,

    // --- Control flow ---
    /// Unconditional jump to an absolute instruction index.
    Jump(usize),
    /// Pop the condition; jump when it is falsy.
    JumpIfFalse(usize),
    /// Stop the whole program.
    Halt,

    // --- Functions ---
    /// Create a function value from a function descriptor.
    FuncDef(u16),
    /// Call with `argc` arguments. A named callee is resolved at run time;
    /// otherwise the callee sits on the stack below the arguments.
    Call { name: Option<u16>, argc: u8 },
    /// Return from the current frame.
    Return,

    // --- Collections ---
    /// Build a list from N elements on the stack.
    BuildList(u16),
    /// Build a set from N elements on the stack.
    BuildSet(u16),
    /// Build a tuple from N elements on the stack.
    BuildTuple(u16),
    /// Build a mapping from N key-value pairs on the stack (2*N values).
    BuildMapping(u16),
    /// Evaluate a comprehension; its clause sources are on the stack.
    Comprehension(u16),

    // --- Iterators ---
    /// Pop an iterable, push iterator state.
    GetIter,
    /// Push the next element, or drop the iterator and jump when exhausted.
    ForIter(usize),

    // --- I/O ---
    /// Pop and print one value.
    Print,
}

impl Op {
    /// Upper-case mnemonic used by the disassembler and fault reports.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Op::LoadConst(_) => "LOAD_CONST",
            Op::Pop => "POP",
            Op::LoadVar(_) => "LOAD_VAR",
            Op::StoreVar(_) => "STORE_VAR",
            Op::Binary(_) => "BINARY_OP",
            Op::Negate => "NEGATE",
            Op::Jump(_) => "JUMP",
            Op::JumpIfFalse(_) => "JUMP_IF_FALSE",
            Op::Halt => "HALT",
            Op::FuncDef(_) => "FUNC_DEF",
            Op::Call { .. } => "CALL",
            Op::Return => "RETURN",
            Op::BuildList(_) => "BUILD_LIST",
            Op::BuildSet(_) => "BUILD_SET",
            Op::BuildTuple(_) => "BUILD_TUPLE",
            Op::BuildMapping(_) => "BUILD_MAPPING",
            Op::Comprehension(_) => "COMPREHENSION",
            Op::GetIter => "GET_ITER",
            Op::ForIter(_) => "FOR_ITER",
            Op::Print => "PRINT",
        }
    }

    /// Jump target, for instructions that have one.
    pub fn jump_target(&self) -> Option<usize> {
        match self {
            Op::Jump(target) | Op::JumpIfFalse(target) | Op::ForIter(target) => Some(*target),
            _ => None,
        }
    }
}
