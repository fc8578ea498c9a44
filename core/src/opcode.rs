//! The instruction set: one-byte tagged opcodes with 0–2 operand bytes.
//!
//! Encoding is a safe, explicit alternative to a host-native struct layout:
//! a plain tag byte decoded through `TryFrom`, rather than an unsafe
//! fixed-width struct transmute.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown opcode byte {0:#04x}")]
pub struct UnknownOpcode(pub u8);

/// A single bytecode instruction tag. Operand widths (in bytes, following
/// the tag) are documented per variant; jump offsets are 16-bit big-endian.
///
/// There are no global-variable opcodes: every binding in this language is a
/// local, including the top-level script's (see the "Global vs local"
/// design note).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Push `constants[operand]`. 1 operand byte.
    Constant = 0,
    /// Push (interning) `strings[operand]`. 1 operand byte.
    String = 1,
    /// Push `Nil`. No operand.
    Nil = 2,
    /// Push `true`. No operand.
    True = 3,
    /// Push `false`. No operand.
    False = 4,
    /// Pop one value. No operand.
    Pop = 5,
    /// Pop `operand` values. 1 operand byte.
    PopN = 6,
    /// Push `stack[frame_base + operand]`. 1 operand byte.
    GetLocal = 7,
    /// `stack[frame_base + operand] = peek(0)`, without popping. 1 operand byte.
    SetLocal = 8,
    Equal = 9,
    NotEqual = 10,
    Greater = 11,
    GreaterEqual = 12,
    Less = 13,
    LessEqual = 14,
    Add = 15,
    /// `stack[frame_base + operand] += peek(0)`, without popping. 1 operand byte.
    AddAssign = 16,
    Subtract = 17,
    /// 1 operand byte, without popping.
    SubtractAssign = 18,
    Multiply = 19,
    /// 1 operand byte, without popping.
    MultiplyAssign = 20,
    Divide = 21,
    /// 1 operand byte, without popping.
    DivideAssign = 22,
    Modulo = 23,
    /// 1 operand byte, without popping.
    ModuloAssign = 24,
    Not = 25,
    Negate = 26,
    Print = 27,
    /// Unconditional relative jump forward. 2 operand bytes (u16 big-endian).
    Jump = 28,
    /// Relative jump forward if `peek(0)` is falsey; does not pop. 2 operand bytes.
    JumpIfFalse = 29,
    /// Relative jump backward. 2 operand bytes (u16 big-endian).
    Loop = 30,
    /// Call user function `functions[operand]`. 1 operand byte.
    Call = 31,
    /// Call native function `natives[operand]`. 1 operand byte.
    CallNative = 32,
    /// Pop the return value, unwind the current frame. No operand.
    Return = 33,
}

impl Opcode {
    /// Number of operand bytes following the tag byte.
    pub fn operand_len(self) -> usize {
        use Opcode::*;
        match self {
            Nil | True | False | Pop | Equal | NotEqual | Greater | GreaterEqual | Less
            | LessEqual | Add | Subtract | Multiply | Divide | Modulo | Not | Negate | Print
            | Return => 0,
            Constant | String | PopN | GetLocal | SetLocal | AddAssign | SubtractAssign
            | MultiplyAssign | DivideAssign | ModuloAssign | Call | CallNative => 1,
            Jump | JumpIfFalse | Loop => 2,
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = UnknownOpcode;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        use Opcode::*;
        Ok(match byte {
            0 => Constant,
            1 => String,
            2 => Nil,
            3 => True,
            4 => False,
            5 => Pop,
            6 => PopN,
            7 => GetLocal,
            8 => SetLocal,
            9 => Equal,
            10 => NotEqual,
            11 => Greater,
            12 => GreaterEqual,
            13 => Less,
            14 => LessEqual,
            15 => Add,
            16 => AddAssign,
            17 => Subtract,
            18 => SubtractAssign,
            19 => Multiply,
            20 => MultiplyAssign,
            21 => Divide,
            22 => DivideAssign,
            23 => Modulo,
            24 => ModuloAssign,
            25 => Not,
            26 => Negate,
            27 => Print,
            28 => Jump,
            29 => JumpIfFalse,
            30 => Loop,
            31 => Call,
            32 => CallNative,
            33 => Return,
            other => return Err(UnknownOpcode(other)),
        })
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> u8 {
        op as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_discriminant() {
        for byte in 0u8..=33 {
            let op = Opcode::try_from(byte).unwrap();
            assert_eq!(u8::from(op), byte);
        }
    }

    #[test]
    fn rejects_unknown_byte() {
        assert_eq!(Opcode::try_from(34), Err(UnknownOpcode(34)));
        assert_eq!(Opcode::try_from(255), Err(UnknownOpcode(255)));
    }

    #[test]
    fn operand_widths_match_jump_and_local_forms() {
        assert_eq!(Opcode::Jump.operand_len(), 2);
        assert_eq!(Opcode::JumpIfFalse.operand_len(), 2);
        assert_eq!(Opcode::GetLocal.operand_len(), 1);
        assert_eq!(Opcode::Return.operand_len(), 0);
    }
}
