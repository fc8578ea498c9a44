//! The constant pool and the string pool.
//!
//! Both are produced once by the compiler and thereafter read-only; the VM
//! consumes the copies restored from the bytecode file bit-identically (see
//! [`crate::bytefile`]).

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::value::{ConstKey, Value};

/// Maximum number of entries addressable by the single-byte `CONSTANT`
/// operand.
pub const MAX_CONSTANTS: usize = 256;

/// Maximum number of fresh string-literal interning anchors addressable by
/// the single-byte `STRING` operand. The pool itself can grow past this via
/// runtime concatenation; only a literal's own anchor offset must fit in a
/// `u8`.
pub const MAX_STRING_ANCHORS: usize = 256;

/// A deduplicated, indexable array of compile-time constant values.
///
/// Bools are never interned here — the compiler emits dedicated `TRUE`/
/// `FALSE` opcodes for those instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConstantPool {
    values: Vec<Value>,
    #[serde(skip)]
    index: HashMap<ConstKey, u8>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `value`, returning its index. Returns `None` once the pool
    /// would grow past [`MAX_CONSTANTS`].
    pub fn intern(&mut self, value: Value) -> Option<u8> {
        let key = ConstKey(value);
        if let Some(&idx) = self.index.get(&key) {
            return Some(idx);
        }
        if self.values.len() >= MAX_CONSTANTS {
            return None;
        }
        let idx = self.values.len() as u8;
        self.values.push(value);
        self.index.insert(key, idx);
        Some(idx)
    }

    pub fn get(&self, idx: u8) -> Option<Value> {
        self.values.get(idx as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.values
    }

    /// Rebuild the interning index after deserializing `values` from the
    /// bytecode file (the index itself is never persisted).
    pub(crate) fn rebuild_index(&mut self) {
        self.index.clear();
        for (i, &v) in self.values.iter().enumerate() {
            self.index.insert(ConstKey(v), i as u8);
        }
    }
}

/// A single contiguous buffer of NUL-terminated interned strings, addressed
/// by byte offset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StringPool {
    bytes: Vec<u8>,
    #[serde(skip)]
    index: HashMap<Vec<u8>, u32>,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `content` by value, returning its starting offset. Repeated
    /// content (from identical literals or runtime concatenation) reuses
    /// the existing offset.
    pub fn intern(&mut self, content: &[u8]) -> u32 {
        if let Some(&offset) = self.index.get(content) {
            return offset;
        }
        let offset = self.bytes.len() as u32;
        self.bytes.extend_from_slice(content);
        self.bytes.push(0);
        self.index.insert(content.to_vec(), offset);
        offset
    }

    /// The NUL-terminated byte slice starting at `offset`, without the
    /// trailing NUL.
    pub fn get(&self, offset: u32) -> &[u8] {
        let start = offset as usize;
        let end = self.bytes[start..]
            .iter()
            .position(|&b| b == 0)
            .map(|i| start + i)
            .unwrap_or(self.bytes.len());
        &self.bytes[start..end]
    }

    pub fn get_str(&self, offset: u32) -> &str {
        std::str::from_utf8(self.get(offset)).expect("string pool holds valid UTF-8")
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn rebuild_index(&mut self) {
        self.index.clear();
        let mut offset = 0usize;
        while offset < self.bytes.len() {
            let end = self.bytes[offset..]
                .iter()
                .position(|&b| b == 0)
                .map(|i| offset + i)
                .unwrap_or(self.bytes.len());
            self.index
                .insert(self.bytes[offset..end].to_vec(), offset as u32);
            offset = end + 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_pool_dedups() {
        let mut pool = ConstantPool::new();
        let a = pool.intern(Value::Number(1.0)).unwrap();
        let b = pool.intern(Value::Number(2.0)).unwrap();
        let c = pool.intern(Value::Number(1.0)).unwrap();
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn constant_pool_overflow() {
        let mut pool = ConstantPool::new();
        for i in 0..MAX_CONSTANTS {
            assert!(pool.intern(Value::Number(i as f64)).is_some());
        }
        assert!(pool.intern(Value::Number(9999.0)).is_none());
    }

    #[test]
    fn string_pool_interns_by_content() {
        let mut pool = StringPool::new();
        let a = pool.intern(b"hi");
        let b = pool.intern(b"there");
        let c = pool.intern(b"hi");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(pool.get(a), b"hi");
        assert_eq!(pool.get(b), b"there");
    }

    #[test]
    fn string_pool_rebuild_index_after_deserialize() {
        let mut pool = StringPool::new();
        pool.intern(b"foo");
        pool.intern(b"bar");

        let mut restored = StringPool {
            bytes: pool.bytes.clone(),
            index: HashMap::new(),
        };
        restored.rebuild_index();
        assert_eq!(restored.intern(b"foo"), 0);
        assert_eq!(restored.intern(b"bar"), 4);
    }
}
