//! Indentation-sensitive scanner: source text to a flat token stream with
//! synthetic [`TokenKind::Indent`]/[`TokenKind::Dedent`] tokens marking
//! off-side-rule block boundaries.
//!
//! Every line's leading run of whitespace is measured against the current
//! depth (`{`, `}`, and `;` are accepted as further no-op whitespace, since
//! this language uses indentation instead of braces to delimit blocks). A
//! deeper run pushes one `Indent`; a shallower run pops however many
//! `Dedent`s are needed to get back to (or below) that depth.

use std::collections::HashMap;

use crate::error::LexError;
use crate::token::{Span, Token, TokenKind};

pub struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    start: usize,
    current: usize,
    line: u32,
    column: u32,
    indent_depth: usize,
    indents: Vec<usize>,
    keywords: HashMap<&'static str, TokenKind>,
    tokens: Vec<Token>,
}

/// Scan `source` into a complete token stream terminated by [`TokenKind::Eof`].
///
/// Stops at the first lexical error; there is no panic-mode recovery.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).scan_tokens()
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        let keywords = HashMap::from([
            ("else", TokenKind::Else),
            ("false", TokenKind::False),
            ("fun", TokenKind::Fun),
            ("if", TokenKind::If),
            ("nil", TokenKind::Nil),
            ("print", TokenKind::Print),
            ("return", TokenKind::Return),
            ("true", TokenKind::True),
            ("let", TokenKind::Let),
            ("while", TokenKind::While),
        ]);
        Self {
            source,
            bytes: source.as_bytes(),
            start: 0,
            current: 0,
            line: 1,
            column: 0,
            indent_depth: 0,
            indents: Vec::new(),
            keywords,
            tokens: Vec::new(),
        }
    }

    pub fn scan_tokens(mut self) -> Result<Vec<Token>, LexError> {
        while !self.is_at_end() {
            self.start = self.current;
            self.scan_token()?;
        }
        self.add_token(TokenKind::Eof);
        Ok(self.tokens)
    }

    fn scan_token(&mut self) -> Result<(), LexError> {
        let c = self.advance();
        match c {
            b'(' => self.add_token(TokenKind::LeftParen),
            b')' => self.add_token(TokenKind::RightParen),
            b',' => self.add_token(TokenKind::Comma),
            b'-' => {
                let kind = if self.match_byte(b'=') { TokenKind::MinusEqual } else { TokenKind::Minus };
                self.add_token(kind);
            }
            b'+' => {
                let kind = if self.match_byte(b'=') { TokenKind::PlusEqual } else { TokenKind::Plus };
                self.add_token(kind);
            }
            b'*' => {
                let kind = if self.match_byte(b'=') { TokenKind::StarEqual } else { TokenKind::Star };
                self.add_token(kind);
            }
            b'%' => {
                let kind = if self.match_byte(b'=') { TokenKind::PercentEqual } else { TokenKind::Percent };
                self.add_token(kind);
            }
            b'!' => {
                let kind = if self.match_byte(b'=') { TokenKind::BangEqual } else { TokenKind::Bang };
                self.add_token(kind);
            }
            b'=' => {
                let kind = if self.match_byte(b'=') { TokenKind::EqualEqual } else { TokenKind::Equal };
                self.add_token(kind);
            }
            b'<' => {
                let kind = if self.match_byte(b'=') { TokenKind::LessEqual } else { TokenKind::Less };
                self.add_token(kind);
            }
            b'>' => {
                let kind = if self.match_byte(b'=') { TokenKind::GreaterEqual } else { TokenKind::Greater };
                self.add_token(kind);
            }
            b'|' if self.match_byte(b'|') => self.add_token(TokenKind::PipePipe),
            b'&' if self.match_byte(b'&') => self.add_token(TokenKind::AmpAmp),
            b'"' => self.string()?,
            b'/' => {
                if self.match_byte(b'/') {
                    while self.peek() != b'\n' && !self.is_at_end() {
                        self.advance();
                    }
                } else if self.match_byte(b'*') {
                    self.block_comment()?;
                } else {
                    let kind = if self.match_byte(b'=') { TokenKind::SlashEqual } else { TokenKind::Slash };
                    self.add_token(kind);
                }
            }
            b' ' | b'\r' | b'\t' | b'{' | b'}' | b';' => {}
            b'\n' => self.new_line(),
            _ => {
                if c.is_ascii_alphabetic() || c == b'_' {
                    self.identifier();
                } else if c.is_ascii_digit() {
                    self.number();
                } else {
                    return Err(LexError::UnexpectedCharacter {
                        ch: c as char,
                        line: self.line,
                        span: self.span(),
                    });
                }
            }
        }
        Ok(())
    }

    fn string(&mut self) -> Result<(), LexError> {
        while self.peek() != b'"' && !self.is_at_end() {
            if self.peek() == b'\n' {
                self.line += 1;
            }
            self.advance();
        }
        if self.is_at_end() {
            return Err(LexError::UnterminatedString {
                line: self.line,
                span: self.span(),
            });
        }
        self.advance(); // closing quote
        self.add_token(TokenKind::String);
        Ok(())
    }

    fn block_comment(&mut self) -> Result<(), LexError> {
        while !self.is_at_end() {
            if self.peek() == b'*' && self.peek_next() == b'/' {
                self.advance();
                self.advance();
                return Ok(());
            }
            if self.peek() == b'\n' {
                self.line += 1;
            }
            self.advance();
        }
        Err(LexError::UnterminatedBlockComment {
            line: self.line,
            span: self.span(),
        })
    }

    /// Off-side rule: measure the indentation of the line just started and
    /// emit `Indent`/`Dedent` tokens relative to the current depth. Lines
    /// that are blank (or whose only content is the brace/semicolon
    /// no-op whitespace) never reach the `default` arm below, so they do
    /// not affect indentation tracking.
    fn new_line(&mut self) {
        self.line += 1;
        self.column = 0;
        let mut whitespace = 0usize;
        loop {
            match self.peek() {
                b' ' | b'\r' | b'\t' | b'{' | b'}' | b';' => {
                    self.advance();
                    whitespace += 1;
                }
                b'\n' => return,
                _ => {
                    if self.is_at_end() {
                        return;
                    }
                    if whitespace > self.indent_depth {
                        let sum: usize = self.indents.iter().sum();
                        self.indents.push(whitespace - sum);
                        self.add_token(TokenKind::Indent);
                    } else if whitespace < self.indent_depth {
                        let mut difference = self.indent_depth - whitespace;
                        while let Some(&top) = self.indents.last() {
                            if difference < top {
                                break;
                            }
                            difference -= top;
                            self.indents.pop();
                            self.add_token(TokenKind::Dedent);
                        }
                    }
                    self.indent_depth = whitespace;
                    return;
                }
            }
        }
    }

    fn identifier(&mut self) {
        while self.peek().is_ascii_alphanumeric() || self.peek() == b'_' {
            self.advance();
        }
        let lexeme = &self.source[self.start..self.current];
        let kind = self.keywords.get(lexeme).copied().unwrap_or(TokenKind::Identifier);
        self.add_token(kind);
    }

    fn number(&mut self) {
        while self.peek().is_ascii_digit() {
            self.advance();
        }
        if self.peek() == b'.' && self.peek_next().is_ascii_digit() {
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }
        self.add_token(TokenKind::Number);
    }

    fn advance(&mut self) -> u8 {
        let c = self.bytes[self.current];
        self.current += 1;
        self.column += 1;
        c
    }

    fn peek(&self) -> u8 {
        if self.is_at_end() { b'\0' } else { self.bytes[self.current] }
    }

    fn peek_next(&self) -> u8 {
        if self.current + 1 >= self.bytes.len() { b'\0' } else { self.bytes[self.current + 1] }
    }

    fn match_byte(&mut self, expected: u8) -> bool {
        if self.is_at_end() || self.bytes[self.current] != expected {
            return false;
        }
        self.current += 1;
        self.column += 1;
        true
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.bytes.len()
    }

    fn span(&self) -> Span {
        Span::new(self.start, self.current)
    }

    fn add_token(&mut self, kind: TokenKind) {
        let (lexeme, column) = match kind {
            TokenKind::Indent | TokenKind::Dedent | TokenKind::Eof => (String::new(), 0),
            _ => (
                self.source[self.start..self.current].to_string(),
                self.column - (self.current - self.start) as u32 + 1,
            ),
        };
        self.tokens.push(Token {
            kind,
            lexeme,
            line: self.line,
            column,
            span: self.span(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn simple_expression() {
        assert_eq!(
            kinds("1 + 2"),
            vec![TokenKind::Number, TokenKind::Plus, TokenKind::Number, TokenKind::Eof]
        );
    }

    #[test]
    fn indent_dedent_around_block() {
        let src = "if true\n    print 1\nprint 2";
        assert_eq!(
            kinds(src),
            vec![
                TokenKind::If,
                TokenKind::True,
                TokenKind::Indent,
                TokenKind::Print,
                TokenKind::Number,
                TokenKind::Dedent,
                TokenKind::Print,
                TokenKind::Number,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn compound_assign_operators() {
        assert_eq!(
            kinds("n += 1"),
            vec![TokenKind::Identifier, TokenKind::PlusEqual, TokenKind::Number, TokenKind::Eof]
        );
    }

    #[test]
    fn line_and_block_comments_are_discarded() {
        assert_eq!(
            kinds("1 // comment\n/* block\ncomment */ 2"),
            vec![TokenKind::Number, TokenKind::Number, TokenKind::Eof]
        );
    }

    #[test]
    fn unterminated_string_errors() {
        assert!(matches!(tokenize("\"abc"), Err(LexError::UnterminatedString { .. })));
    }

    #[test]
    fn unexpected_character_errors() {
        assert!(matches!(tokenize("@"), Err(LexError::UnexpectedCharacter { ch: '@', .. })));
    }
}
