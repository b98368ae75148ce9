//! Bytecode disassembler for debug output.

use super::chunk::{Chunk, CompiledModule, Constant};
use super::opcode::Op;
use super::value::format_float;

/// Disassemble a compiled module to a human-readable string.
pub fn disassemble(module: &CompiledModule) -> String {
    let chunk = &module.chunk;
    let mut out = String::new();
    out.push_str(&format!(
        "== module (code={}, constants={}, names={}) ==\n",
        chunk.len(),
        chunk.constants.len(),
        chunk.names.len()
    ));
    disassemble_chunk(chunk, &mut out);

    if !chunk.functions.is_empty() {
        out.push_str("\n== functions ==\n");
        for (idx, proto) in chunk.functions.iter().enumerate() {
            out.push_str(&format!(
                "{:>5} {}({}) @{:04}\n",
                idx,
                proto.display_name(),
                proto.params.join(", "),
                proto.start
            ));
        }
    }
    if !chunk.comprehensions.is_empty() {
        out.push_str("\n== comprehensions ==\n");
        for (idx, proto) in chunk.comprehensions.iter().enumerate() {
            out.push_str(&format!(
                "{:>5} {} [{}] element @{:04}",
                idx,
                proto.kind,
                proto.variables.join(", "),
                proto.element
            ));
            if let Some(value) = proto.value {
                out.push_str(&format!(" value @{:04}", value));
            }
            if let Some(filter) = proto.filter {
                out.push_str(&format!(" filter @{:04}", filter));
            }
            out.push('\n');
        }
    }
    out
}

fn disassemble_chunk(chunk: &Chunk, out: &mut String) {
    for (offset, op) in chunk.code.iter().enumerate() {
        let line = chunk.span_at(offset).line;
        let line_str = if offset > 0 && chunk.span_at(offset - 1).line == line {
            "   |".to_string()
        } else {
            format!("{:4}", line)
        };
        out.push_str(&format!("{:04} {} {}\n", offset, line_str, describe_op(op, chunk)));
    }
}

/// One instruction with its operands resolved against the chunk tables.
pub fn describe_op(op: &Op, chunk: &Chunk) -> String {
    let mnemonic = op.mnemonic();
    match op {
        Op::LoadConst(idx) => {
            let val = chunk.constants.get(*idx as usize);
            format!("{} {}", mnemonic, format_constant(val))
        }
        Op::LoadVar(idx) | Op::StoreVar(idx) => format!("{} {}", mnemonic, chunk.name(*idx)),
        Op::Binary(operator) => format!("{} {}", mnemonic, operator),
        Op::Jump(target) | Op::JumpIfFalse(target) | Op::ForIter(target) => {
            format!("{} -> {:04}", mnemonic, target)
        }
        Op::FuncDef(idx) => match chunk.functions.get(*idx as usize) {
            Some(proto) => format!(
                "{} {}({}) @{:04}",
                mnemonic,
                proto.display_name(),
                proto.params.join(", "),
                proto.start
            ),
            None => format!("{} ?{}", mnemonic, idx),
        },
        Op::Call { name, argc } => match name {
            Some(idx) => format!("{} {} {}", mnemonic, chunk.name(*idx), argc),
            None => format!("{} <stack> {}", mnemonic, argc),
        },
        Op::BuildList(n) | Op::BuildSet(n) | Op::BuildTuple(n) | Op::BuildMapping(n) => {
            format!("{} {}", mnemonic, n)
        }
        Op::Comprehension(idx) => match chunk.comprehensions.get(*idx as usize) {
            Some(proto) => format!("{} {} [{}]", mnemonic, proto.kind, proto.variables.join(", ")),
            None => format!("{} ?{}", mnemonic, idx),
        },
        Op::Pop | Op::Negate | Op::Halt | Op::Return | Op::GetIter | Op::Print => {
            mnemonic.to_string()
        }
    }
}

fn format_constant(val: Option<&Constant>) -> String {
    match val {
        Some(Constant::Int(n)) => itoa::Buffer::new().format(*n).to_string(),
        Some(Constant::Float(x)) => format_float(*x),
        Some(Constant::Text(s)) => format!("{:?}", s),
        Some(Constant::Bool(b)) => format!("{}", b),
        None => "???".to_string(),
    }
}
