use thiserror::Error;

/// A failure raised while executing bytecode.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error("operands must be two numbers or two strings")]
    AddTypeMismatch { line: i32 },

    #[error("operands must be numbers")]
    OperandsMustBeNumbers { line: i32 },

    #[error("operand must be a number")]
    NegateTypeMismatch { line: i32 },

    #[error("modulo operands must be finite numbers")]
    ModuloOperandNotFinite { line: i32 },

    #[error("modulo by zero")]
    ModuloByZero { line: i32 },

    #[error("value stack underflow")]
    StackUnderflow,

    #[error("unknown opcode byte {0:#04x}")]
    UnknownOpcode(u8),

    #[error("no constant at index {0}")]
    MissingConstant(u8),

    #[error("no function at index {0}")]
    MissingFunction(u8),

    #[error("no native function at index {0}")]
    MissingNative(u8),

    #[error("a native function call failed: {0}")]
    Native(String),
}

impl RuntimeError {
    /// The source line the error occurred on, when one is known.
    pub fn line(&self) -> Option<u32> {
        match self {
            RuntimeError::AddTypeMismatch { line }
            | RuntimeError::OperandsMustBeNumbers { line }
            | RuntimeError::NegateTypeMismatch { line }
            | RuntimeError::ModuloOperandNotFinite { line }
            | RuntimeError::ModuloByZero { line } => Some(*line as u32),
            RuntimeError::StackUnderflow
            | RuntimeError::UnknownOpcode(_)
            | RuntimeError::MissingConstant(_)
            | RuntimeError::MissingFunction(_)
            | RuntimeError::MissingNative(_)
            | RuntimeError::Native(_) => None,
        }
    }
}
