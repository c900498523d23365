//! Core parser struct and helper methods.

use crate::ast::*;
use crate::error::ParserError;
use crate::lexer::{Token, TokenKind};
use crate::span::Span;

pub type ParseResult<T> = Result<T, ParserError>;

/// The parser for gscript.
///
/// Named functions, classes and enums are hoisted out of the statement
/// stream into the matching `Program` tables as they are parsed.
pub struct Parser {
    pub(crate) tokens: Vec<Token>,
    pub(crate) current: usize,
    pub(crate) functions: Vec<FunctionDecl>,
    pub(crate) classes: Vec<ClassDecl>,
    pub(crate) enums: Vec<EnumDecl>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            functions: Vec::new(),
            classes: Vec::new(),
            enums: Vec::new(),
        }
    }

    /// Parse a complete program: imports, statements, then an optional export.
    pub fn parse(&mut self) -> ParseResult<Program> {
        let imports = self.imports()?;
        let statements = self.statement_list(true)?;

        let export = if self.match_token(&TokenKind::Export) {
            let value = self.expression()?;
            self.skip_semicolons();
            Some(value)
        } else {
            None
        };

        if !self.is_at_end() {
            return Err(ParserError::general(
                "statement after export is not allowed",
                self.current_span(),
            ));
        }

        Ok(Program {
            imports,
            statements,
            functions: std::mem::take(&mut self.functions),
            classes: std::mem::take(&mut self.classes),
            enums: std::mem::take(&mut self.enums),
            export,
        })
    }

    // ===== Token manipulation =====

    pub(crate) fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.tokens[self.current - 1].clone()
    }

    pub(crate) fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    pub(crate) fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    pub(crate) fn peek_nth(&self, n: usize) -> &Token {
        let index = if self.current + n < self.tokens.len() {
            self.current + n
        } else {
            self.tokens.len() - 1
        };
        &self.tokens[index]
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        if self.is_at_end() {
            false
        } else {
            std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
        }
    }

    pub(crate) fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: &TokenKind) -> ParseResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else if self.is_at_end() {
            Err(ParserError::unexpected_eof(self.current_span()))
        } else {
            Err(ParserError::unexpected_token(
                format!("{}", kind),
                format!("{}", self.peek().kind),
                self.current_span(),
            ))
        }
    }

    pub(crate) fn expect_identifier(&mut self) -> ParseResult<String> {
        match &self.peek().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(ParserError::unexpected_token(
                "identifier",
                format!("{}", self.peek().kind),
                self.current_span(),
            )),
        }
    }

    /// Skips automatically inserted or explicit semicolons.
    pub(crate) fn skip_semicolons(&mut self) {
        while self.match_token(&TokenKind::Semicolon) {}
    }

    /// True when the next non-semicolon token has the given kind. Used to
    /// join `}` and a following `else`/`elif`/`catch` across a newline.
    pub(crate) fn check_after_semicolons(&self, kind: &TokenKind) -> bool {
        let mut n = 0;
        while self.peek_nth(n).kind == TokenKind::Semicolon {
            n += 1;
        }
        std::mem::discriminant(&self.peek_nth(n).kind) == std::mem::discriminant(kind)
    }

    pub(crate) fn current_span(&self) -> Span {
        self.peek().span
    }

    pub(crate) fn previous_span(&self) -> Span {
        self.previous().span
    }
}
