use thiserror::Error;

/// A failure discovered while lowering the AST to bytecode.
#[derive(Debug, Clone, Error)]
pub enum CompileError {
    #[error("undeclared name '{name}'")]
    UndeclaredName { name: String, line: u32 },

    #[error("variable '{name}' already declared in this scope")]
    DuplicateVariable { name: String, line: u32 },

    #[error("function '{name}' already declared")]
    DuplicateFunction { name: String, line: u32 },

    #[error("can't read local variable '{name}' in its own initializer")]
    UninitializedLocal { name: String, line: u32 },

    #[error("too many constants in one chunk")]
    TooManyConstants { line: u32 },

    #[error("string literal's pool offset doesn't fit in one byte")]
    TooManyStrings { line: u32 },

    #[error("too many locals in one function")]
    TooManyLocals { line: u32 },

    #[error("too many functions declared")]
    TooManyFunctions { line: u32 },

    #[error("jump distance too large to encode")]
    JumpTooLarge { line: u32 },
}

impl CompileError {
    pub fn line(&self) -> u32 {
        match self {
            CompileError::UndeclaredName { line, .. }
            | CompileError::DuplicateVariable { line, .. }
            | CompileError::DuplicateFunction { line, .. }
            | CompileError::UninitializedLocal { line, .. }
            | CompileError::TooManyConstants { line }
            | CompileError::TooManyStrings { line }
            | CompileError::TooManyLocals { line }
            | CompileError::TooManyFunctions { line }
            | CompileError::JumpTooLarge { line } => *line,
        }
    }
}
