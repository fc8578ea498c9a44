//! Value model, bytecode format, compiler, and virtual machine for Lumen.

pub mod bytefile;
pub mod chunk;
pub mod compiler;
pub mod diag;
pub mod disasm;
pub mod opcode;
pub mod pool;
pub mod value;
pub mod vm;

pub use bytefile::{BytecodeFile, BytecodeFileError};
pub use chunk::{Chunk, FunctionProto, NativeFunction, NativeRegistry};
pub use compiler::CompileError;
pub use diag::{Diagnostic, Severity};
pub use disasm::disassemble_program;
pub use opcode::Opcode;
pub use pool::{ConstantPool, StringPool};
pub use value::{FunctionKind, Value};
pub use vm::{RuntimeError, Vm};

/// Compile source text and run it to completion against a fresh VM with the
/// standard native library, the shape the CLI drives directly.
pub fn run_source(source: &str) -> Result<(), RunError> {
    let stmts = lumen_syntax::parse_source(source)?;
    let file = compiler::compile(&stmts, NativeRegistry::with_standard_library())?;
    let mut vm = Vm::new(file, NativeRegistry::with_standard_library());
    vm.run()?;
    Ok(())
}

/// Any failure from any phase, for callers that just want one error type and
/// a line number to report.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Source(#[from] lumen_syntax::SourceError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
