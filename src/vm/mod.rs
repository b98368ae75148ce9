//! Bytecode VM for PlasmaScript: compiles the AST to a flat instruction
//! stream and executes it on a stack machine.

pub mod chunk;
pub mod compiler;
pub mod compiler_exprs;
pub mod compiler_stmts;
pub mod comprehension;
pub mod config;
pub mod disassembler;
pub mod env;
pub mod natives;
pub mod opcode;
pub mod value;
#[allow(clippy::module_inception)]
pub mod vm;
pub mod vm_calls;

#[cfg(test)]
mod tests;

pub use chunk::{Chunk, CompiledModule, ComprehensionProto, Constant, FunctionProto};
pub use compiler::Compiler;
pub use config::VmConfig;
pub use disassembler::disassemble;
pub use env::{Bindings, CapturedEnv};
pub use opcode::Op;
pub use value::{Function, HashKey, NativeFunction, Value};
pub use vm::{Output, Vm};
