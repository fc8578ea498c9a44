//! Recursive-descent, precedence-climbing parser producing the AST
//! consumed by the compiler.
//!
//! Precedence ladder, loosest to tightest: assignment, or, and, equality,
//! comparison, term, factor, unary, call, primary. Only a bare variable name
//! may appear as a call's callee.

use crate::ast::{AssignOp, BinaryOp, Expr, Literal, LogicalOp, Name, Stmt, UnaryOp};
use crate::error::ParseError;
use crate::token::{Token, TokenKind};

const MAX_PARAMS: usize = 255;

pub fn parse(tokens: Vec<Token>) -> Result<Vec<Stmt>, ParseError> {
    Parser::new(tokens).parse_program()
}

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, current: 0 }
    }

    pub fn parse_program(mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        while !self.is_at_end() {
            stmts.push(self.declaration()?);
        }
        Ok(stmts)
    }

    fn declaration(&mut self) -> Result<Stmt, ParseError> {
        if self.match_kind(TokenKind::Fun) {
            self.fun_declaration()
        } else if self.match_kind(TokenKind::Let) {
            self.let_declaration()
        } else {
            self.statement()
        }
    }

    fn fun_declaration(&mut self) -> Result<Stmt, ParseError> {
        let name = self.consume_name("expect function name")?;
        self.consume(TokenKind::LeftParen, "expect '(' after function name")?;
        let mut parameters = Vec::new();
        if self.check(TokenKind::Identifier) {
            loop {
                if parameters.len() >= MAX_PARAMS {
                    return Err(self.error_at_current("too many", "parameters"));
                }
                parameters.push(self.consume_name("expect parameter name")?);
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "expect ')' after parameters")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::FunStmt { name, parameters, body })
    }

    fn let_declaration(&mut self) -> Result<Stmt, ParseError> {
        let name = self.consume_name("expect variable name")?;
        let initializer = if self.match_kind(TokenKind::Equal) {
            self.expression()?
        } else {
            Expr::Literal(Literal::Nil)
        };
        Ok(Stmt::Let { name, initializer })
    }

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        if self.match_kind(TokenKind::If) {
            self.if_statement()
        } else if self.match_kind(TokenKind::Indent) {
            self.block_statement()
        } else if self.match_kind(TokenKind::Print) {
            let line = self.previous().line;
            let value = self.expression()?;
            Ok(Stmt::Print { value, line })
        } else if self.match_kind(TokenKind::Return) {
            let line = self.previous().line;
            let value = self.expression()?;
            Ok(Stmt::Return { value, line })
        } else if self.match_kind(TokenKind::While) {
            self.while_statement()
        } else {
            Ok(Stmt::ExprStmt(self.expression()?))
        }
    }

    fn if_statement(&mut self) -> Result<Stmt, ParseError> {
        let condition = self.expression()?;
        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.match_kind(TokenKind::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt::If { condition, then_branch, else_branch })
    }

    fn while_statement(&mut self) -> Result<Stmt, ParseError> {
        let condition = self.expression()?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::While { condition, body })
    }

    fn block_statement(&mut self) -> Result<Stmt, ParseError> {
        let mut stmts = Vec::new();
        while !self.check(TokenKind::Dedent) && !self.is_at_end() {
            stmts.push(self.declaration()?);
        }
        if !self.is_at_end() {
            self.consume(TokenKind::Dedent, "expect dedent at end of block")?;
        }
        Ok(Stmt::Block(stmts))
    }

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, ParseError> {
        let expr = self.or()?;

        if self.match_kind(TokenKind::Equal) {
            if let Expr::Variable(name) = expr {
                let value = Box::new(self.assignment()?);
                return Ok(Expr::Assign { name, value });
            }
            return Ok(expr);
        }

        let op = match self.peek().kind {
            TokenKind::PlusEqual => Some(AssignOp::Add),
            TokenKind::MinusEqual => Some(AssignOp::Subtract),
            TokenKind::StarEqual => Some(AssignOp::Multiply),
            TokenKind::SlashEqual => Some(AssignOp::Divide),
            TokenKind::PercentEqual => Some(AssignOp::Modulo),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            if let Expr::Variable(name) = expr {
                let value = Box::new(self.assignment()?);
                return Ok(Expr::CompoundAssign { name, op, value });
            }
            return Ok(expr);
        }

        Ok(expr)
    }

    fn or(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.and()?;
        while self.match_kind(TokenKind::PipePipe) {
            let right = Box::new(self.and()?);
            expr = Expr::Logical { left: Box::new(expr), op: LogicalOp::Or, right };
        }
        Ok(expr)
    }

    fn and(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.equality()?;
        while self.match_kind(TokenKind::AmpAmp) {
            let right = Box::new(self.equality()?);
            expr = Expr::Logical { left: Box::new(expr), op: LogicalOp::And, right };
        }
        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.comparison()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::BangEqual => BinaryOp::NotEqual,
                TokenKind::EqualEqual => BinaryOp::Equal,
                _ => break,
            };
            self.advance();
            let right = Box::new(self.comparison()?);
            expr = Expr::Binary { left: Box::new(expr), op, right };
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.term()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Less => BinaryOp::Less,
                TokenKind::LessEqual => BinaryOp::LessEqual,
                TokenKind::Greater => BinaryOp::Greater,
                TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
                _ => break,
            };
            self.advance();
            let right = Box::new(self.term()?);
            expr = Expr::Binary { left: Box::new(expr), op, right };
        }
        Ok(expr)
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.factor()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Minus => BinaryOp::Subtract,
                TokenKind::Plus => BinaryOp::Add,
                _ => break,
            };
            self.advance();
            let right = Box::new(self.factor()?);
            expr = Expr::Binary { left: Box::new(expr), op, right };
        }
        Ok(expr)
    }

    fn factor(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Multiply,
                TokenKind::Slash => BinaryOp::Divide,
                TokenKind::Percent => BinaryOp::Modulo,
                _ => break,
            };
            self.advance();
            let right = Box::new(self.unary()?);
            expr = Expr::Binary { left: Box::new(expr), op, right };
        }
        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek().kind {
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Minus => Some(UnaryOp::Negate),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let right = Box::new(self.call()?);
            return Ok(Expr::Unary { op, right });
        }
        self.call()
    }

    fn call(&mut self) -> Result<Expr, ParseError> {
        let expr = self.primary()?;

        if self.match_kind(TokenKind::LeftParen) {
            let mut args = Vec::new();
            if !self.check(TokenKind::RightParen) {
                loop {
                    if args.len() >= MAX_PARAMS {
                        return Err(self.error_at_current("too many", "arguments"));
                    }
                    args.push(self.expression()?);
                    if !self.match_kind(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.consume(TokenKind::RightParen, "expect ')' after call")?;
            let Expr::Variable(callee) = expr else {
                return Err(self.error_at_current("invalid", "callee"));
            };
            return Ok(Expr::Call { callee, args });
        }

        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        if self.match_kind(TokenKind::Nil) {
            return Ok(Expr::Literal(Literal::Nil));
        }
        if self.match_kind(TokenKind::Number) {
            let lexeme = &self.previous().lexeme;
            let n: f64 = lexeme.parse().expect("lexer only emits well-formed numbers");
            return Ok(Expr::Literal(Literal::Number(n)));
        }
        if self.match_kind(TokenKind::String) {
            let lexeme = &self.previous().lexeme;
            let content = &lexeme[1..lexeme.len() - 1];
            return Ok(Expr::Literal(Literal::Str(content.to_string())));
        }
        if self.match_kind(TokenKind::True) {
            return Ok(Expr::Literal(Literal::Bool(true)));
        }
        if self.match_kind(TokenKind::False) {
            return Ok(Expr::Literal(Literal::Bool(false)));
        }
        if self.match_kind(TokenKind::Identifier) {
            let t = self.previous();
            return Ok(Expr::Variable(Name { text: t.lexeme.clone(), line: t.line }));
        }
        if self.match_kind(TokenKind::LeftParen) {
            let expr = self.expression()?;
            self.consume(TokenKind::RightParen, "expect ')' after expression")?;
            return Ok(expr);
        }
        Err(self.error_at_current("expected expression", ""))
    }

    fn consume_name(&mut self, message: &str) -> Result<Name, ParseError> {
        self.consume(TokenKind::Identifier, message)?;
        let t = self.previous();
        Ok(Name { text: t.lexeme.clone(), line: t.line })
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> Result<&Token, ParseError> {
        if self.check(kind) {
            self.advance();
            Ok(self.previous())
        } else {
            Err(self.error_at_current(message, ""))
        }
    }

    fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn error_at_current(&self, message: &str, what: &'static str) -> ParseError {
        let token = self.peek();
        if !what.is_empty() {
            return ParseError::TooMany { line: token.line, what, span: token.span };
        }
        let at = if token.kind == TokenKind::Eof {
            None
        } else {
            Some(token.lexeme.clone())
        };
        ParseError::UnexpectedToken {
            line: token.line,
            at,
            message: message.to_string(),
            span: token.span,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_src(src: &str) -> Vec<Stmt> {
        parse(tokenize(src).unwrap()).unwrap()
    }

    #[test]
    fn parses_print_of_arithmetic() {
        let stmts = parse_src("print 1 + 2 * 3");
        assert_eq!(stmts.len(), 1);
        assert!(matches!(stmts[0], Stmt::Print { .. }));
    }

    #[test]
    fn parses_while_with_compound_assign() {
        let stmts = parse_src("let n = 0\nwhile n < 3\n    print n\n    n += 1\n");
        assert_eq!(stmts.len(), 2);
        assert!(matches!(stmts[1], Stmt::While { .. }));
    }

    #[test]
    fn parses_function_and_call() {
        let stmts = parse_src("fun add(a, b)\n    return a + b\nprint add(2, 40)\n");
        assert_eq!(stmts.len(), 2);
        assert!(matches!(stmts[0], Stmt::FunStmt { .. }));
    }

    #[test]
    fn rejects_call_on_non_variable_callee() {
        let tokens = tokenize("(1)(2)").unwrap();
        assert!(parse(tokens).is_err());
    }
}
