//! Per-function chunks, the user-function table, and the native-function
//! registry.

use serde::{Deserialize, Serialize};

use crate::value::Value;
use crate::vm::RuntimeError;

/// A function's instruction stream plus its parallel line table.
///
/// Invariant: `code.len() == lines.len()` always.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Chunk {
    pub code: Vec<u8>,
    pub lines: Vec<i32>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, byte: u8, line: i32) {
        self.code.push(byte);
        self.lines.push(line);
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

/// A compiled user-defined function. The top-level script is function 0,
/// with an empty name and arity 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionProto {
    pub name: String,
    pub arity: u8,
    pub chunk: Chunk,
}

impl FunctionProto {
    pub fn script() -> Self {
        Self { name: String::new(), arity: 0, chunk: Chunk::new() }
    }
}

/// A host-provided callable invoked via `CALL_NATIVE`.
///
/// The function pointer is never persisted to the bytecode file — natives
/// are re-registered by the host before the VM loads the file, in the same
/// order the compiler saw them, so `CALL_NATIVE`'s index operand still
/// resolves correctly.
pub type NativeCallable = fn(args: &[Value]) -> Result<Value, RuntimeError>;

#[derive(Clone)]
pub struct NativeFunction {
    pub name: String,
    pub arity: u8,
    pub callable: NativeCallable,
}

impl std::fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// The registry of native functions, populated by the host before
/// compilation begins.
#[derive(Debug, Clone, Default)]
pub struct NativeRegistry {
    functions: Vec<NativeFunction>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard registry: just `clock()`, the only native the spec
    /// requires.
    pub fn with_standard_library() -> Self {
        let mut registry = Self::new();
        registry.define("clock", 0, native_clock);
        registry
    }

    pub fn define(&mut self, name: &str, arity: u8, callable: NativeCallable) {
        self.functions.push(NativeFunction { name: name.to_string(), arity, callable });
    }

    pub fn find(&self, name: &str) -> Option<(u8, &NativeFunction)> {
        self.functions
            .iter()
            .enumerate()
            .rev()
            .find(|(_, f)| f.name == name)
            .map(|(i, f)| (i as u8, f))
    }

    pub fn get(&self, idx: u8) -> Option<&NativeFunction> {
        self.functions.get(idx as usize)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

static PROCESS_START: once_cell::sync::Lazy<std::time::Instant> =
    once_cell::sync::Lazy::new(std::time::Instant::now);

/// Seconds elapsed since the process started.
fn native_clock(_args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Number(PROCESS_START.elapsed().as_secs_f64()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_keeps_code_and_lines_parallel() {
        let mut chunk = Chunk::new();
        chunk.write(1, 10);
        chunk.write(2, 10);
        assert_eq!(chunk.code.len(), chunk.lines.len());
    }

    #[test]
    fn standard_library_defines_clock() {
        let registry = NativeRegistry::with_standard_library();
        let (idx, native) = registry.find("clock").unwrap();
        assert_eq!(idx, 0);
        assert_eq!(native.arity, 0);
        let result = (native.callable)(&[]).unwrap();
        assert!(matches!(result, Value::Number(n) if n >= 0.0));
    }
}
