//! Expression parsing by precedence climbing.

use crate::ast::*;
use crate::error::ParserError;
use crate::lexer::TokenKind;

use super::core::{ParseResult, Parser};

impl Parser {
    pub(crate) fn expression(&mut self) -> ParseResult<Expr> {
        self.ternary()
    }

    /// `exp {, exp}`
    pub(crate) fn expression_list(&mut self) -> ParseResult<Vec<Expr>> {
        let mut exprs = vec![self.expression()?];
        while self.match_token(&TokenKind::Comma) {
            exprs.push(self.expression()?);
        }
        Ok(exprs)
    }

    /// `cond ? a : b`; the branches may not themselves be ternaries
    /// without parentheses.
    fn ternary(&mut self) -> ParseResult<Expr> {
        let condition = self.logical_or()?;
        if !self.match_token(&TokenKind::Question) {
            return Ok(condition);
        }
        let then_expr = self.logical_or()?;
        self.expect(&TokenKind::Colon)?;
        let else_expr = self.logical_or()?;
        let span = condition.span.merge(&else_expr.span);
        Ok(Expr::new(
            ExprKind::Ternary {
                condition: Box::new(condition),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
            span,
        ))
    }

    fn logical_or(&mut self) -> ParseResult<Expr> {
        self.binary_level(&[(TokenKind::OrOr, BinaryOp::Or)], Self::logical_and)
    }

    fn logical_and(&mut self) -> ParseResult<Expr> {
        self.binary_level(&[(TokenKind::AndAnd, BinaryOp::And)], Self::bit_or)
    }

    fn bit_or(&mut self) -> ParseResult<Expr> {
        self.binary_level(&[(TokenKind::Pipe, BinaryOp::BitOr)], Self::bit_xor)
    }

    fn bit_xor(&mut self) -> ParseResult<Expr> {
        self.binary_level(&[(TokenKind::Caret, BinaryOp::BitXor)], Self::bit_and)
    }

    fn bit_and(&mut self) -> ParseResult<Expr> {
        self.binary_level(&[(TokenKind::Amp, BinaryOp::BitAnd)], Self::equality)
    }

    fn equality(&mut self) -> ParseResult<Expr> {
        self.binary_level(
            &[
                (TokenKind::EqualEqual, BinaryOp::Equal),
                (TokenKind::BangEqual, BinaryOp::NotEqual),
            ],
            Self::comparison,
        )
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        self.binary_level(
            &[
                (TokenKind::LessEqual, BinaryOp::LessEqual),
                (TokenKind::GreaterEqual, BinaryOp::GreaterEqual),
                (TokenKind::Less, BinaryOp::Less),
                (TokenKind::Greater, BinaryOp::Greater),
            ],
            Self::shift,
        )
    }

    fn shift(&mut self) -> ParseResult<Expr> {
        self.binary_level(
            &[
                (TokenKind::ShiftLeft, BinaryOp::ShiftLeft),
                (TokenKind::ShiftRight, BinaryOp::ShiftRight),
            ],
            Self::term,
        )
    }

    fn term(&mut self) -> ParseResult<Expr> {
        self.binary_level(
            &[
                (TokenKind::Plus, BinaryOp::Add),
                (TokenKind::Minus, BinaryOp::Subtract),
            ],
            Self::factor,
        )
    }

    fn factor(&mut self) -> ParseResult<Expr> {
        self.binary_level(
            &[
                (TokenKind::Star, BinaryOp::Multiply),
                (TokenKind::Slash, BinaryOp::Divide),
                (TokenKind::Percent, BinaryOp::Modulo),
                (TokenKind::SlashSlash, BinaryOp::IntDivide),
            ],
            Self::unary,
        )
    }

    /// One left-associative precedence level.
    fn binary_level(
        &mut self,
        operators: &[(TokenKind, BinaryOp)],
        next: fn(&mut Self) -> ParseResult<Expr>,
    ) -> ParseResult<Expr> {
        let mut expr = next(self)?;
        'outer: loop {
            for (kind, operator) in operators {
                if self.check(kind) {
                    self.advance();
                    let right = next(self)?;
                    let span = expr.span.merge(&right.span);
                    expr = Expr::new(
                        ExprKind::Binary {
                            left: Box::new(expr),
                            operator: *operator,
                            right: Box::new(right),
                        },
                        span,
                    );
                    continue 'outer;
                }
            }
            return Ok(expr);
        }
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        let operator = match self.peek().kind {
            TokenKind::Minus => UnaryOp::Negate,
            TokenKind::Tilde => UnaryOp::BitNot,
            TokenKind::Bang => UnaryOp::Not,
            _ => return self.increment(),
        };
        let span = self.advance().span;
        let operand = self.unary()?;
        let span = span.merge(&operand.span);
        Ok(Expr::new(
            ExprKind::Unary {
                operator,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    /// `++x`, `--x`, `x++`, `x--`
    fn increment(&mut self) -> ParseResult<Expr> {
        let start_span = self.current_span();
        if self.check(&TokenKind::PlusPlus) || self.check(&TokenKind::MinusMinus) {
            let delta = if self.advance().kind == TokenKind::PlusPlus { 1 } else { -1 };
            let target = self.postfix_chain()?;
            self.validate_target(&target)?;
            return Ok(Expr::new(
                ExprKind::Increment {
                    target: Box::new(target),
                    delta,
                    prefix: true,
                },
                start_span,
            ));
        }

        let expr = self.postfix_chain()?;
        if self.check(&TokenKind::PlusPlus) || self.check(&TokenKind::MinusMinus) {
            let delta = if self.advance().kind == TokenKind::PlusPlus { 1 } else { -1 };
            self.validate_target(&expr)?;
            return Ok(Expr::new(
                ExprKind::Increment {
                    target: Box::new(expr),
                    delta,
                    prefix: false,
                },
                start_span,
            ));
        }
        Ok(expr)
    }

    /// A primary expression followed by `.name`, `[key]` and `(args)` tails.
    pub(crate) fn postfix_chain(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.match_token(&TokenKind::Dot) {
                let key_span = self.current_span();
                let name = self.expect_identifier()?;
                let span = expr.span.merge(&key_span);
                expr = Expr::new(
                    ExprKind::Index {
                        object: Box::new(expr),
                        key: Box::new(Expr::new(ExprKind::StringLiteral(name), key_span)),
                    },
                    span,
                );
            } else if self.match_token(&TokenKind::LeftBracket) {
                let key = self.expression()?;
                self.expect(&TokenKind::RightBracket)?;
                let span = expr.span.merge(&self.previous_span());
                expr = Expr::new(
                    ExprKind::Index {
                        object: Box::new(expr),
                        key: Box::new(key),
                    },
                    span,
                );
            } else if self.check(&TokenKind::LeftParen) {
                let arguments = self.arguments()?;
                let span = expr.span.merge(&self.previous_span());
                expr = Expr::new(
                    ExprKind::Call {
                        callee: Box::new(expr),
                        arguments,
                    },
                    span,
                );
            } else {
                return Ok(expr);
            }
        }
    }

    /// `( [exp {, exp}] )`
    fn arguments(&mut self) -> ParseResult<Vec<Expr>> {
        self.expect(&TokenKind::LeftParen)?;
        let mut arguments = Vec::new();
        self.skip_semicolons();
        while !self.check(&TokenKind::RightParen) {
            arguments.push(self.expression()?);
            self.skip_semicolons();
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
            self.skip_semicolons();
        }
        self.skip_semicolons();
        self.expect(&TokenKind::RightParen)?;
        Ok(arguments)
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        if self.is_at_end() {
            return Err(ParserError::unexpected_eof(self.current_span()));
        }
        let token = self.advance();
        let span = token.span;
        let kind = match token.kind {
            TokenKind::IntLiteral(n) => ExprKind::IntLiteral(n),
            TokenKind::FloatLiteral(n) => ExprKind::FloatLiteral(n),
            TokenKind::StringLiteral(s) => ExprKind::StringLiteral(s),
            TokenKind::True => ExprKind::BoolLiteral(true),
            TokenKind::False => ExprKind::BoolLiteral(false),
            TokenKind::Nil => ExprKind::Nil,
            TokenKind::Identifier(name) => ExprKind::Variable(name),
            TokenKind::LeftParen => {
                let expr = self.expression()?;
                self.expect(&TokenKind::RightParen)?;
                return Ok(expr);
            }
            TokenKind::LeftBracket => return self.array_literal(span),
            TokenKind::LeftBrace => return self.map_literal(span),
            TokenKind::Func => {
                let func = self.function_literal()?;
                let span = span.merge(&func.span);
                return Ok(Expr::new(ExprKind::Function(func), span));
            }
            TokenKind::New => {
                let class = self.expect_identifier()?;
                let arguments = if self.check(&TokenKind::LeftParen) {
                    self.arguments()?
                } else {
                    Vec::new()
                };
                ExprKind::New { class, arguments }
            }
            other => {
                return Err(ParserError::unexpected_token(
                    "expression",
                    format!("{}", other),
                    span,
                ))
            }
        };
        Ok(Expr::new(kind, span.merge(&self.previous_span())))
    }

    fn array_literal(&mut self, start_span: crate::span::Span) -> ParseResult<Expr> {
        let mut values = Vec::new();
        loop {
            self.skip_semicolons();
            if self.match_token(&TokenKind::RightBracket) {
                break;
            }
            values.push(self.expression()?);
            self.skip_semicolons();
            if !self.match_token(&TokenKind::Comma) {
                self.skip_semicolons();
                self.expect(&TokenKind::RightBracket)?;
                break;
            }
        }
        Ok(Expr::new(
            ExprKind::Array(values),
            start_span.merge(&self.previous_span()),
        ))
    }

    /// `{ key: value, ... }` where keys are names, strings, numbers or bools.
    fn map_literal(&mut self, start_span: crate::span::Span) -> ParseResult<Expr> {
        let mut entries = Vec::new();
        loop {
            self.skip_semicolons();
            if self.match_token(&TokenKind::RightBrace) {
                break;
            }
            let token = self.advance();
            let key = match token.kind {
                TokenKind::Identifier(name) | TokenKind::StringLiteral(name) => {
                    Literal::String(name)
                }
                TokenKind::IntLiteral(n) => Literal::Int(n),
                TokenKind::FloatLiteral(n) => Literal::Float(n),
                TokenKind::True => Literal::Bool(true),
                TokenKind::False => Literal::Bool(false),
                other => {
                    return Err(ParserError::unexpected_token(
                        "map key",
                        format!("{}", other),
                        token.span,
                    ))
                }
            };
            self.expect(&TokenKind::Colon)?;
            let value = self.expression()?;
            entries.push((key, value));
            self.skip_semicolons();
            if !self.match_token(&TokenKind::Comma) {
                self.skip_semicolons();
                self.expect(&TokenKind::RightBrace)?;
                break;
            }
        }
        Ok(Expr::new(
            ExprKind::Map(entries),
            start_span.merge(&self.previous_span()),
        ))
    }
}
