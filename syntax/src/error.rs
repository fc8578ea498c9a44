use thiserror::Error;

use crate::token::Span;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LexError {
    #[error("unexpected character '{ch}'")]
    UnexpectedCharacter { ch: char, line: u32, span: Span },
    #[error("unterminated string")]
    UnterminatedString { line: u32, span: Span },
    #[error("unterminated block comment")]
    UnterminatedBlockComment { line: u32, span: Span },
}

impl LexError {
    pub fn line(&self) -> u32 {
        match self {
            LexError::UnexpectedCharacter { line, .. }
            | LexError::UnterminatedString { line, .. }
            | LexError::UnterminatedBlockComment { line, .. } => *line,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            LexError::UnexpectedCharacter { span, .. }
            | LexError::UnterminatedString { span, .. }
            | LexError::UnterminatedBlockComment { span, .. } => *span,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("[line {line}] Error{}: {message}", at.as_ref().map(|s| format!(" at '{s}'")).unwrap_or_default())]
    UnexpectedToken {
        line: u32,
        at: Option<String>,
        message: String,
        span: Span,
    },
    #[error("[line {line}] Error: too many {what} (limit 255)")]
    TooMany {
        line: u32,
        what: &'static str,
        span: Span,
    },
}

impl ParseError {
    pub fn line(&self) -> u32 {
        match self {
            ParseError::UnexpectedToken { line, .. } => *line,
            ParseError::TooMany { line, .. } => *line,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            ParseError::UnexpectedToken { span, .. } => *span,
            ParseError::TooMany { span, .. } => *span,
        }
    }
}
