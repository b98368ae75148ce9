//! Bytecode chunk, constant pool, and descriptor tables.

use std::rc::Rc;

use crate::ast::ComprehensionKind;
use crate::span::Span;

use super::opcode::Op;

/// Largest index an instruction operand can address.
pub const MAX_TABLE_LEN: usize = u16::MAX as usize + 1;

/// A literal value stored in the constant pool.
#[derive(Debug, Clone)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Constant::Int(a), Constant::Int(b)) => a == b,
            // Bitwise so that pool lookups and chunk comparisons are total.
            (Constant::Float(a), Constant::Float(b)) => a.to_bits() == b.to_bits(),
            (Constant::Text(a), Constant::Text(b)) => a == b,
            (Constant::Bool(a), Constant::Bool(b)) => a == b,
            _ => false,
        }
    }
}

/// Descriptor recorded by `FUNC_DEF`: everything needed to create a function
/// value except the environment, which is captured at run time.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionProto {
    /// `None` for lambdas.
    pub name: Option<String>,
    pub params: Vec<String>,
    /// Index of the first body instruction.
    pub start: usize,
}

impl FunctionProto {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<lambda>")
    }
}

/// Descriptor recorded by `COMPREHENSION`.
///
/// `element`, `value` and `filter` are start offsets of code regions that
/// evaluate one expression and end in `RETURN`.
#[derive(Debug, Clone, PartialEq)]
pub struct ComprehensionProto {
    pub kind: ComprehensionKind,
    /// Loop variables, outermost clause first.
    pub variables: Vec<String>,
    /// Element region (the key region for mappings).
    pub element: usize,
    /// Value region, mappings only.
    pub value: Option<usize>,
    pub filter: Option<usize>,
}

/// A flat instruction stream plus the tables its operands index into.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Chunk {
    /// The bytecode instructions.
    pub code: Vec<Op>,
    /// Source spans, parallel to `code`.
    pub spans: Vec<Span>,
    /// Constant pool.
    pub constants: Vec<Constant>,
    /// Identifier table for variable and callee names.
    pub names: Vec<String>,
    /// Function descriptors for `FUNC_DEF`.
    pub functions: Vec<FunctionProto>,
    /// Comprehension descriptors for `COMPREHENSION`.
    pub comprehensions: Vec<ComprehensionProto>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit an instruction and record its source span.
    pub fn emit(&mut self, op: Op, span: Span) -> usize {
        let offset = self.code.len();
        self.code.push(op);
        self.spans.push(span);
        offset
    }

    /// Add a constant to the pool, reusing an equal entry.
    /// Returns `None` once the pool is full.
    pub fn add_constant(&mut self, constant: Constant) -> Option<u16> {
        if let Some(i) = self.constants.iter().position(|c| c == &constant) {
            return Some(i as u16);
        }
        push_indexed(&mut self.constants, constant)
    }

    /// Intern an identifier.
    pub fn add_name(&mut self, name: &str) -> Option<u16> {
        if let Some(i) = self.names.iter().position(|n| n == name) {
            return Some(i as u16);
        }
        push_indexed(&mut self.names, name.to_string())
    }

    pub fn add_function(&mut self, proto: FunctionProto) -> Option<u16> {
        push_indexed(&mut self.functions, proto)
    }

    pub fn add_comprehension(&mut self, proto: ComprehensionProto) -> Option<u16> {
        push_indexed(&mut self.comprehensions, proto)
    }

    pub fn name(&self, idx: u16) -> &str {
        self.names.get(idx as usize).map(String::as_str).unwrap_or("?")
    }

    /// Get the current offset (next instruction index).
    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn span_at(&self, offset: usize) -> Span {
        self.spans.get(offset).copied().unwrap_or_default()
    }

    /// Point the jump at `offset` to the next instruction to be emitted.
    pub fn patch_jump(&mut self, offset: usize) {
        let here = self.code.len();
        match &mut self.code[offset] {
            Op::Jump(target) | Op::JumpIfFalse(target) | Op::ForIter(target) => {
                *target = here;
            }
            _ => panic!("Tried to patch non-jump instruction at offset {}", offset),
        }
    }
}

fn push_indexed<T>(table: &mut Vec<T>, item: T) -> Option<u16> {
    let idx = table.len();
    if idx >= MAX_TABLE_LEN {
        return None;
    }
    table.push(item);
    Some(idx as u16)
}

/// A compiled program: one chunk holding the top-level code and every
/// nested function body and comprehension region.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledModule {
    pub chunk: Rc<Chunk>,
}

impl CompiledModule {
    pub fn new(chunk: Chunk) -> Self {
        Self {
            chunk: Rc::new(chunk),
        }
    }

    pub fn constants(&self) -> &[Constant] {
        &self.chunk.constants
    }

    pub fn instructions(&self) -> &[Op] {
        &self.chunk.code
    }
}
