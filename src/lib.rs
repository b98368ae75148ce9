//! PlasmaScript: a small dynamically-typed scripting language.
//!
//! This is the library root. Programs arrive as an already-built AST
//! ([`ast::Program`]), are lowered to a flat bytecode module and executed on
//! a stack VM.
//!
//! # Execution
//!
//! - [`compile`] lowers a program; it is pure and deterministic.
//! - [`execute`] runs a compiled module on a fresh engine.
//! - [`run`] does both, with configuration taken from the environment.

#![allow(clippy::result_large_err)]
#![allow(clippy::new_without_default)]
#![allow(clippy::too_many_arguments)]

pub mod ast;
pub mod error;
pub mod span;
pub mod vm;

use error::{CompileError, PlasmaError, RuntimeError};
use vm::{CompiledModule, Compiler, Vm, VmConfig};

/// Lower a program to a compiled module.
pub fn compile(program: &ast::Program) -> Result<CompiledModule, CompileError> {
    Compiler::compile(program)
}

/// Execute a compiled module on a fresh engine configured from the
/// environment.
pub fn execute(module: &CompiledModule) -> Result<(), RuntimeError> {
    Vm::with_config(VmConfig::from_env()).execute(module)
}

/// Compile and run a program, configured from the environment.
pub fn run(program: &ast::Program) -> Result<(), PlasmaError> {
    run_with_config(program, VmConfig::from_env())
}

/// Compile and run a program with an explicit engine configuration.
pub fn run_with_config(program: &ast::Program, config: VmConfig) -> Result<(), PlasmaError> {
    let module = compile(program)?;
    let mut vm = Vm::with_config(config);
    vm.execute(&module)?;
    Ok(())
}

/// Render a compiled module as a human-readable listing.
pub fn disassemble(module: &CompiledModule) -> String {
    vm::disassemble(module)
}
