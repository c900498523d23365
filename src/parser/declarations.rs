//! Declaration parsing: let, functions, classes, enums and imports.

use crate::ast::*;
use crate::error::ParserError;
use crate::lexer::TokenKind;

use super::core::{ParseResult, Parser};

impl Parser {
    /// `import fs, "./util" as f, u`
    pub(crate) fn imports(&mut self) -> ParseResult<Vec<ImportDecl>> {
        let mut imports = Vec::new();
        self.skip_semicolons();
        while self.check(&TokenKind::Import) {
            let start_span = self.advance().span;
            let mut group = Vec::new();
            loop {
                let token = self.advance();
                let source = match token.kind {
                    TokenKind::Identifier(name) => ImportSource::Stdlib(name),
                    TokenKind::StringLiteral(path) => ImportSource::File(path),
                    other => {
                        return Err(ParserError::unexpected_token(
                            "module name or path",
                            format!("{}", other),
                            token.span,
                        ))
                    }
                };
                let alias = default_alias(&source);
                group.push(ImportDecl {
                    source,
                    alias,
                    span: token.span,
                });
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }

            if self.match_token(&TokenKind::As) {
                for (i, import) in group.iter_mut().enumerate() {
                    if i > 0 && !self.match_token(&TokenKind::Comma) {
                        break;
                    }
                    import.alias = self.expect_identifier()?;
                }
                if self.check(&TokenKind::Comma) {
                    return Err(ParserError::general(
                        "more aliases than imported modules",
                        start_span,
                    ));
                }
            }

            imports.extend(group);
            self.skip_semicolons();
        }
        Ok(imports)
    }

    /// `let a, b = x, y`
    pub(crate) fn let_declaration(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::Let)?;

        let mut names = vec![self.expect_identifier()?];
        while self.match_token(&TokenKind::Comma) {
            names.push(self.expect_identifier()?);
        }

        let values = if self.match_token(&TokenKind::Equal) {
            self.expression_list()?
        } else {
            Vec::new()
        };
        self.check_arity(names.len(), &values, true, start_span)?;

        Ok(Stmt::new(
            StmtKind::Let { names, values },
            start_span.merge(&self.previous_span()),
        ))
    }

    /// `func name(..) {..}` or an immediately called `func(..) {..}(..)`.
    /// A named function below the top level becomes `let name = func..`.
    pub(crate) fn func_statement(&mut self, at_top: bool) -> ParseResult<Option<Stmt>> {
        let start_span = self.current_span();

        if let TokenKind::Identifier(_) = self.peek_nth(1).kind {
            self.expect(&TokenKind::Func)?;
            let name = self.expect_identifier()?;
            let func = self.function_literal()?;
            let span = start_span.merge(&self.previous_span());

            if at_top {
                self.functions.push(FunctionDecl { name, func, span });
                return Ok(None);
            }
            let value = Expr::new(ExprKind::Function(func), span);
            return Ok(Some(Stmt::new(
                StmtKind::Let {
                    names: vec![name],
                    values: vec![value],
                },
                span,
            )));
        }

        let expr = self.postfix_chain()?;
        if !expr.is_call() {
            return Err(ParserError::general(
                "anonymous function statement must be called",
                start_span,
            ));
        }
        Ok(Some(Stmt::new(StmtKind::Expression(expr), start_span)))
    }

    /// `(a, b = 1, ...rest) { body }`, the part after `func`.
    pub(crate) fn function_literal(&mut self) -> ParseResult<FunctionLiteral> {
        let start_span = self.current_span();
        self.expect(&TokenKind::LeftParen)?;

        let mut params = Vec::new();
        let mut seen_default = false;
        while let TokenKind::Identifier(name) = &self.peek().kind {
            let name = name.clone();
            let span = self.advance().span;
            let default = if self.match_token(&TokenKind::Equal) {
                seen_default = true;
                Some(self.default_value(&name)?)
            } else {
                if seen_default {
                    return Err(ParserError::general(
                        format!(
                            "parameter '{}' without default value can not follow parameters with defaults",
                            name
                        ),
                        span,
                    ));
                }
                None
            };
            params.push(Parameter {
                name,
                default,
                span,
            });
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }

        let variadic = if self.match_token(&TokenKind::Ellipsis) {
            let span = self.current_span();
            let name = self.expect_identifier()?;
            if seen_default {
                return Err(ParserError::general(
                    format!(
                        "variadic parameter '{}' can not follow parameters with defaults",
                        name
                    ),
                    span,
                ));
            }
            Some(name)
        } else {
            None
        };
        self.expect(&TokenKind::RightParen)?;

        self.skip_semicolons();
        let body = self.block()?;
        Ok(FunctionLiteral {
            params,
            variadic,
            body,
            span: start_span.merge(&self.previous_span()),
        })
    }

    fn default_value(&mut self, param: &str) -> ParseResult<Literal> {
        let token = self.advance();
        let literal = match token.kind {
            TokenKind::True => Literal::Bool(true),
            TokenKind::False => Literal::Bool(false),
            TokenKind::Nil => Literal::Nil,
            TokenKind::StringLiteral(s) => Literal::String(s),
            TokenKind::IntLiteral(n) => Literal::Int(n),
            TokenKind::FloatLiteral(n) => Literal::Float(n),
            TokenKind::Minus => match self.advance().kind {
                TokenKind::IntLiteral(n) => Literal::Int(n.wrapping_neg()),
                TokenKind::FloatLiteral(n) => Literal::Float(-n),
                other => {
                    return Err(ParserError::general(
                        format!("invalid default value '-{}' for parameter '{}'", other, param),
                        token.span,
                    ))
                }
            },
            other => {
                return Err(ParserError::general(
                    format!("invalid default value '{}' for parameter '{}'", other, param),
                    token.span,
                ))
            }
        };
        Ok(literal)
    }

    /// `class Name { attr = exp; method(args) {..}; __self(args) {..} }`
    pub(crate) fn class_declaration(&mut self) -> ParseResult<()> {
        let start_span = self.current_span();
        self.expect(&TokenKind::Class)?;
        let name = self.expect_identifier()?;
        self.skip_semicolons();
        self.expect(&TokenKind::LeftBrace)?;

        let mut fields = Vec::new();
        let mut constructor = None;
        loop {
            self.skip_semicolons();
            while self.match_token(&TokenKind::Comma) {}
            if !self.check(&TokenKind::Identifier(String::new())) {
                break;
            }
            let attr_span = self.current_span();
            let attr = self.expect_identifier()?;

            let value = if self.check(&TokenKind::LeftParen) {
                let func = self.function_literal()?;
                Some(Expr::new(ExprKind::Function(func), attr_span))
            } else if self.match_token(&TokenKind::Equal) {
                Some(self.expression()?)
            } else {
                None
            };

            if attr == "__self" {
                match value {
                    Some(Expr {
                        kind: ExprKind::Function(func),
                        ..
                    }) => constructor = Some(func),
                    _ => {
                        return Err(ParserError::general(
                            format!("__self of class '{}' should be a method", name),
                            attr_span,
                        ))
                    }
                }
            } else if let Some(value) = value {
                fields.push((attr, value));
            }
        }
        self.expect(&TokenKind::RightBrace)?;

        self.classes.push(ClassDecl {
            name,
            fields,
            constructor,
            span: start_span.merge(&self.previous_span()),
        });
        Ok(())
    }

    /// `enum { A, B = 5, C }`; values auto-increment from the last one.
    pub(crate) fn enum_declaration(&mut self) -> ParseResult<()> {
        let start_span = self.current_span();
        self.expect(&TokenKind::Enum)?;
        self.skip_semicolons();
        self.expect(&TokenKind::LeftBrace)?;

        let mut variants = Vec::new();
        let mut next = 0i64;
        loop {
            self.skip_semicolons();
            while self.match_token(&TokenKind::Comma) {}
            self.skip_semicolons();
            if self.match_token(&TokenKind::RightBrace) {
                break;
            }
            let name = self.expect_identifier()?;
            if self.match_token(&TokenKind::Equal) {
                let negative = self.match_token(&TokenKind::Minus);
                let token = self.advance();
                next = match token.kind {
                    TokenKind::IntLiteral(n) if negative => n.wrapping_neg(),
                    TokenKind::IntLiteral(n) => n,
                    other => {
                        return Err(ParserError::general(
                            format!("expect enum value after '=', but got '{}'", other),
                            token.span,
                        ))
                    }
                };
            }
            variants.push((name, next));
            next = next.wrapping_add(1);
        }

        self.enums.push(EnumDecl {
            variants,
            span: start_span.merge(&self.previous_span()),
        });
        Ok(())
    }
}

/// `fs` for `import fs`, `util` for `import "./lib/util"`.
fn default_alias(source: &ImportSource) -> String {
    match source {
        ImportSource::Stdlib(name) => name.clone(),
        ImportSource::File(path) => {
            let base = path.rsplit('/').next().unwrap_or(path);
            base.strip_suffix(".gs").unwrap_or(base).to_string()
        }
    }
}
