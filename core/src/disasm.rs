//! Human-readable listing of a compiled chunk, for `--debug-print`.

use crate::chunk::{Chunk, FunctionProto};
use crate::opcode::Opcode;
use crate::pool::{ConstantPool, StringPool};

/// Renders every function's chunk as a labeled instruction listing.
pub fn disassemble_program(functions: &[FunctionProto], constants: &ConstantPool, strings: &StringPool) -> String {
    let mut out = String::new();
    for (idx, proto) in functions.iter().enumerate() {
        let label = if proto.name.is_empty() { "<script>".to_string() } else { proto.name.clone() };
        out.push_str(&format!("==<{idx}: {label}>==\n"));
        disassemble_chunk(&proto.chunk, constants, strings, &mut out);
    }
    out
}

fn disassemble_chunk(chunk: &Chunk, constants: &ConstantPool, strings: &StringPool, out: &mut String) {
    let mut offset = 0;
    while offset < chunk.code.len() {
        offset = disassemble_instruction(chunk, constants, strings, offset, out);
    }
}

fn disassemble_instruction(
    chunk: &Chunk,
    constants: &ConstantPool,
    strings: &StringPool,
    offset: usize,
    out: &mut String,
) -> usize {
    out.push_str(&format!("{offset:04} "));
    if offset > 0 && chunk.lines[offset] == chunk.lines[offset - 1] {
        out.push_str("   | ");
    } else {
        out.push_str(&format!("{:4} ", chunk.lines[offset]));
    }

    let byte = chunk.code[offset];
    let Ok(op) = Opcode::try_from(byte) else {
        out.push_str(&format!("unknown opcode {byte}\n"));
        return offset + 1;
    };

    match op {
        Opcode::Constant => constant_instruction("CONSTANT", chunk, constants, offset, out),
        Opcode::String => string_instruction("STRING", chunk, strings, offset, out),
        Opcode::Call => function_instruction("CALL", chunk, offset, out),
        Opcode::Jump => jump_instruction("JUMP", 1, chunk, offset, out),
        Opcode::JumpIfFalse => jump_instruction("JUMP_IF_FALSE", 1, chunk, offset, out),
        Opcode::Loop => jump_instruction("LOOP", -1, chunk, offset, out),
        Opcode::PopN
        | Opcode::GetLocal
        | Opcode::SetLocal
        | Opcode::AddAssign
        | Opcode::SubtractAssign
        | Opcode::MultiplyAssign
        | Opcode::DivideAssign
        | Opcode::ModuloAssign
        | Opcode::CallNative => byte_instruction(opcode_name(op), chunk, offset, out),
        _ => simple_instruction(opcode_name(op), offset, out),
    }
}

fn opcode_name(op: Opcode) -> &'static str {
    match op {
        Opcode::Constant => "CONSTANT",
        Opcode::String => "STRING",
        Opcode::Nil => "NIL",
        Opcode::True => "TRUE",
        Opcode::False => "FALSE",
        Opcode::Pop => "POP",
        Opcode::PopN => "POP_N",
        Opcode::GetLocal => "GET_LOCAL",
        Opcode::SetLocal => "SET_LOCAL",
        Opcode::Equal => "EQUAL",
        Opcode::NotEqual => "NOT_EQUAL",
        Opcode::Greater => "GREATER",
        Opcode::GreaterEqual => "GREATER_EQUAL",
        Opcode::Less => "LESS",
        Opcode::LessEqual => "LESS_EQUAL",
        Opcode::Add => "ADD",
        Opcode::AddAssign => "ADD_ASSIGN",
        Opcode::Subtract => "SUBTRACT",
        Opcode::SubtractAssign => "SUBTRACT_ASSIGN",
        Opcode::Multiply => "MULTIPLY",
        Opcode::MultiplyAssign => "MULTIPLY_ASSIGN",
        Opcode::Divide => "DIVIDE",
        Opcode::DivideAssign => "DIVIDE_ASSIGN",
        Opcode::Modulo => "MODULO",
        Opcode::ModuloAssign => "MODULO_ASSIGN",
        Opcode::Not => "NOT",
        Opcode::Negate => "NEGATE",
        Opcode::Print => "PRINT",
        Opcode::Jump => "JUMP",
        Opcode::JumpIfFalse => "JUMP_IF_FALSE",
        Opcode::Loop => "LOOP",
        Opcode::Call => "CALL",
        Opcode::CallNative => "CALL_NATIVE",
        Opcode::Return => "RETURN",
    }
}

fn simple_instruction(name: &str, offset: usize, out: &mut String) -> usize {
    out.push_str(&format!("{name}\n"));
    offset + 1
}

fn byte_instruction(name: &str, chunk: &Chunk, offset: usize, out: &mut String) -> usize {
    let slot = chunk.code[offset + 1];
    out.push_str(&format!("{name:<16} {slot:4}\n"));
    offset + 2
}

fn constant_instruction(name: &str, chunk: &Chunk, constants: &ConstantPool, offset: usize, out: &mut String) -> usize {
    let index = chunk.code[offset + 1];
    let value = constants.get(index);
    out.push_str(&format!("{name:<16} {index:4} '{value:?}'\n"));
    offset + 2
}

fn string_instruction(name: &str, chunk: &Chunk, strings: &StringPool, offset: usize, out: &mut String) -> usize {
    let index = chunk.code[offset + 1] as u32;
    let text = String::from_utf8_lossy(strings.get(index));
    out.push_str(&format!("{name:<16} {index:4} '{text}'\n"));
    offset + 2
}

fn function_instruction(name: &str, chunk: &Chunk, offset: usize, out: &mut String) -> usize {
    let index = chunk.code[offset + 1];
    out.push_str(&format!("{name:<16} {index:4}\n"));
    offset + 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::NativeRegistry;
    use crate::compiler::compile;
    use lumen_syntax::parse_source;

    #[test]
    fn listing_includes_every_function_label() {
        let stmts = parse_source("fun add(a, b)\n  return a + b\n\nprint add(1, 2)\n").unwrap();
        let file = compile(&stmts, NativeRegistry::with_standard_library()).unwrap();
        let listing = disassemble_program(&file.functions, &file.constants, &file.strings);
        assert!(listing.contains("<script>"));
        assert!(listing.contains("add"));
        assert!(listing.contains("RETURN"));
    }
}
