//! The persisted binary bytecode file bridging the compiler and the VM.
//!
//! Encoded with `serde` + `postcard`: an explicit, host-independent byte
//! layout rather than a raw dump of in-memory structs, so a file written on
//! one machine loads correctly on another regardless of pointer width or
//! endianness.

use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chunk::FunctionProto;
use crate::pool::{ConstantPool, StringPool};

#[derive(Debug, Serialize, Deserialize)]
pub struct BytecodeFile {
    pub functions: Vec<FunctionProto>,
    pub constants: ConstantPool,
    pub strings: StringPool,
}

#[derive(Debug, Error)]
pub enum BytecodeFileError {
    #[error("could not read bytecode file: {0}")]
    Io(#[from] io::Error),
    #[error("could not decode bytecode file: {0}")]
    Decode(#[from] postcard::Error),
}

impl BytecodeFile {
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), BytecodeFileError> {
        let bytes = postcard::to_allocvec(self).map_err(BytecodeFileError::Decode)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn read_from(path: impl AsRef<Path>) -> Result<Self, BytecodeFileError> {
        let bytes = std::fs::read(path)?;
        let mut file: BytecodeFile = postcard::from_bytes(&bytes)?;
        file.constants.rebuild_index();
        file.strings.rebuild_index();
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::opcode::Opcode;
    use crate::value::Value;

    #[test]
    fn round_trips_through_a_tempfile() {
        let mut constants = ConstantPool::new();
        constants.intern(Value::Number(42.0)).unwrap();
        let mut strings = StringPool::new();
        strings.intern(b"hi");

        let file = BytecodeFile { functions: vec![FunctionProto::script()], constants, strings };

        let dir = std::env::temp_dir();
        let path = dir.join(format!("lumen-bytefile-test-{}.dat", std::process::id()));
        file.write_to(&path).unwrap();
        let restored = BytecodeFile::read_from(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(restored.functions.len(), 1);
        assert_eq!(restored.constants.get(0), Some(Value::Number(42.0)));
        assert_eq!(restored.strings.get(0), b"hi");
    }

    #[test]
    fn round_trip_preserves_a_full_chunk_byte_for_byte() {
        let mut functions = vec![FunctionProto::script()];
        functions[0].chunk.write(Opcode::Constant as u8, 1);
        functions[0].chunk.write(0, 1);
        functions[0].chunk.write(Opcode::Print as u8, 1);
        functions[0].chunk.write(Opcode::Nil as u8, 2);
        functions[0].chunk.write(Opcode::Return as u8, 2);

        let mut constants = ConstantPool::new();
        constants.intern(Value::Number(7.0)).unwrap();

        let file = BytecodeFile { functions, constants, strings: StringPool::new() };

        let dir = std::env::temp_dir();
        let path = dir.join(format!("lumen-bytefile-chunk-test-{}.dat", std::process::id()));
        file.write_to(&path).unwrap();
        let restored = BytecodeFile::read_from(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(restored.functions[0].chunk.code, file.functions[0].chunk.code);
        assert_eq!(restored.functions[0].chunk.lines, file.functions[0].chunk.lines);
    }
}
