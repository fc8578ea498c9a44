//! Lexer and parser for Lumen: source text to the statement AST consumed
//! by `lumen_core`'s compiler.

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::{AssignOp, BinaryOp, Expr, Literal, LogicalOp, Name, Stmt, UnaryOp};
pub use error::{LexError, ParseError};
pub use token::{Span, Token, TokenKind};

use tracing::debug;

/// Lex and parse `source` into the statement sequence the compiler expects.
pub fn parse_source(source: &str) -> Result<Vec<Stmt>, SourceError> {
    let tokens = lexer::tokenize(source).map_err(SourceError::Lex)?;
    debug!(token_count = tokens.len(), "lexed source");
    let stmts = parser::parse(tokens).map_err(SourceError::Parse)?;
    debug!(stmt_count = stmts.len(), "parsed source");
    Ok(stmts)
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl SourceError {
    pub fn line(&self) -> u32 {
        match self {
            SourceError::Lex(e) => e.line(),
            SourceError::Parse(e) => e.line(),
        }
    }

    pub fn span(&self) -> Span {
        match self {
            SourceError::Lex(e) => e.span(),
            SourceError::Parse(e) => e.span(),
        }
    }
}
