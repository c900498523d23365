//! Statement parsing: control flow, assignments, calls and blocks.

use crate::ast::*;
use crate::error::ParserError;
use crate::lexer::TokenKind;

use super::core::{ParseResult, Parser};

impl Parser {
    /// Parses statements until a token that closes the enclosing construct.
    /// Hoisted declarations produce no statement.
    pub(crate) fn statement_list(&mut self, at_top: bool) -> ParseResult<Vec<Stmt>> {
        let mut statements = Vec::new();
        loop {
            self.skip_semicolons();
            if self.is_at_end()
                || self.check(&TokenKind::RightBrace)
                || self.check(&TokenKind::Case)
                || self.check(&TokenKind::Default)
                || self.check(&TokenKind::Export)
            {
                return Ok(statements);
            }
            if let Some(stmt) = self.statement(at_top)? {
                statements.push(stmt);
            }
        }
    }

    pub(crate) fn statement(&mut self, at_top: bool) -> ParseResult<Option<Stmt>> {
        let stmt = match &self.peek().kind {
            TokenKind::Let => self.let_declaration()?,
            TokenKind::Identifier(_) => {
                if self.peek_nth(1).kind == TokenKind::Colon {
                    self.label_statement()?
                } else {
                    self.simple_statement()?
                }
            }
            TokenKind::PlusPlus | TokenKind::MinusMinus => self.simple_statement()?,
            TokenKind::Func => match self.func_statement(at_top)? {
                Some(stmt) => stmt,
                None => return Ok(None),
            },
            TokenKind::Class => {
                self.class_declaration()?;
                return Ok(None);
            }
            TokenKind::Enum => {
                self.enum_declaration()?;
                return Ok(None);
            }
            TokenKind::Break => self.keyword_statement(StmtKind::Break),
            TokenKind::Continue => self.keyword_statement(StmtKind::Continue),
            TokenKind::Fallthrough => self.keyword_statement(StmtKind::Fallthrough),
            TokenKind::Return => self.return_statement()?,
            TokenKind::Goto => self.goto_statement()?,
            TokenKind::If => self.if_statement()?,
            TokenKind::While => self.while_statement()?,
            TokenKind::For => self.for_statement()?,
            TokenKind::Loop => self.loop_statement()?,
            TokenKind::Switch => self.switch_statement()?,
            TokenKind::Try => self.try_statement()?,
            TokenKind::LeftBrace => {
                let start_span = self.current_span();
                let body = self.block()?;
                Stmt::new(
                    StmtKind::Block(body),
                    start_span.merge(&self.previous_span()),
                )
            }
            other => {
                return Err(ParserError::unexpected_token(
                    "statement",
                    format!("{}", other),
                    self.current_span(),
                ))
            }
        };
        self.match_token(&TokenKind::Semicolon);
        Ok(Some(stmt))
    }

    /// `{ statements }`
    pub(crate) fn block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect(&TokenKind::LeftBrace)?;
        let statements = self.statement_list(false)?;
        self.expect(&TokenKind::RightBrace)?;
        Ok(statements)
    }

    /// A braced block, or a single statement treated as one.
    fn block_or_statement(&mut self) -> ParseResult<Vec<Stmt>> {
        self.skip_semicolons();
        if self.check(&TokenKind::LeftBrace) {
            return self.block();
        }
        Ok(self.statement(false)?.into_iter().collect())
    }

    fn keyword_statement(&mut self, kind: StmtKind) -> Stmt {
        let token = self.advance();
        Stmt::new(kind, token.span)
    }

    fn label_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::Colon)?;
        Ok(Stmt::new(StmtKind::Label(name), start_span))
    }

    fn goto_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::Goto)?;
        let label = self.expect_identifier()?;
        Ok(Stmt::new(StmtKind::Goto(label), start_span))
    }

    fn return_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::Return)?;
        let values = if self.check(&TokenKind::Semicolon)
            || self.check(&TokenKind::RightBrace)
            || self.is_at_end()
        {
            Vec::new()
        } else {
            self.expression_list()?
        };
        Ok(Stmt::new(
            StmtKind::Return(values),
            start_span.merge(&self.previous_span()),
        ))
    }

    /// Statements starting with a name or `++`/`--`: calls, increments and
    /// assignments. Also used for `for` headers.
    pub(crate) fn simple_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();

        if self.check(&TokenKind::PlusPlus) || self.check(&TokenKind::MinusMinus) {
            let delta = if self.advance().kind == TokenKind::PlusPlus { 1 } else { -1 };
            let target = self.postfix_chain()?;
            self.validate_target(&target)?;
            let expr = Expr::new(
                ExprKind::Increment {
                    target: Box::new(target),
                    delta,
                    prefix: true,
                },
                start_span,
            );
            return Ok(Stmt::new(StmtKind::Expression(expr), start_span));
        }

        let first = self.postfix_chain()?;

        if self.check(&TokenKind::PlusPlus) || self.check(&TokenKind::MinusMinus) {
            let delta = if self.advance().kind == TokenKind::PlusPlus { 1 } else { -1 };
            self.validate_target(&first)?;
            let expr = Expr::new(
                ExprKind::Increment {
                    target: Box::new(first),
                    delta,
                    prefix: false,
                },
                start_span,
            );
            return Ok(Stmt::new(StmtKind::Expression(expr), start_span));
        }

        if first.is_call() && !self.check(&TokenKind::Comma) && self.assign_op().is_none() {
            return Ok(Stmt::new(StmtKind::Expression(first), start_span));
        }

        self.assignment(first, start_span)
    }

    fn assignment(&mut self, first: Expr, start_span: crate::span::Span) -> ParseResult<Stmt> {
        let mut targets = vec![first];
        while self.match_token(&TokenKind::Comma) {
            targets.push(self.postfix_chain()?);
        }
        for target in &targets {
            self.validate_target(target)?;
        }

        let Some(operator) = self.assign_op() else {
            return Err(ParserError::unexpected_token(
                "assignment operator",
                format!("{}", self.peek().kind),
                self.current_span(),
            ));
        };
        self.advance();

        let values = self.expression_list()?;
        self.check_arity(targets.len(), &values, false, start_span)?;

        Ok(Stmt::new(
            StmtKind::Assign {
                targets,
                operator,
                values,
            },
            start_span.merge(&self.previous_span()),
        ))
    }

    /// More values than names is always an error. Fewer is allowed when the
    /// last value is a call (its extra results fill the rest), and for `let`,
    /// where missing values default to nil.
    pub(crate) fn check_arity(
        &self,
        names: usize,
        values: &[Expr],
        is_declaration: bool,
        span: crate::span::Span,
    ) -> ParseResult<()> {
        let fills_rest = values.last().is_some_and(|v| v.is_call());
        if values.len() > names || (values.len() < names && !fills_rest && !is_declaration) {
            return Err(ParserError::general(
                format!(
                    "assignment mismatch: {} variables but {} values",
                    names,
                    values.len()
                ),
                span,
            ));
        }
        Ok(())
    }

    fn assign_op(&self) -> Option<AssignOp> {
        match self.peek().kind {
            TokenKind::Equal => Some(AssignOp::Assign),
            TokenKind::PlusEqual => Some(AssignOp::Add),
            TokenKind::MinusEqual => Some(AssignOp::Subtract),
            TokenKind::StarEqual => Some(AssignOp::Multiply),
            TokenKind::SlashEqual => Some(AssignOp::Divide),
            TokenKind::PercentEqual => Some(AssignOp::Modulo),
            TokenKind::AmpEqual => Some(AssignOp::BitAnd),
            TokenKind::CaretEqual => Some(AssignOp::BitXor),
            TokenKind::PipeEqual => Some(AssignOp::BitOr),
            _ => None,
        }
    }

    /// Only names and attribute paths rooted at a name can be assigned.
    pub(crate) fn validate_target(&self, target: &Expr) -> ParseResult<()> {
        match &target.kind {
            ExprKind::Variable(_) => Ok(()),
            ExprKind::Index { object, .. } => self.validate_target(object),
            _ => Err(ParserError::invalid_assignment_target(target.span)),
        }
    }

    fn if_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::If)?;

        let mut branches = Vec::new();
        let condition = self.paren_expression()?;
        branches.push((condition, self.block_or_statement()?));

        while self.check_after_semicolons(&TokenKind::Elif) {
            self.skip_semicolons();
            self.advance();
            let condition = self.paren_expression()?;
            branches.push((condition, self.block_or_statement()?));
        }

        if self.check_after_semicolons(&TokenKind::Else) {
            self.skip_semicolons();
            let else_span = self.advance().span;
            let always = Expr::new(ExprKind::BoolLiteral(true), else_span);
            branches.push((always, self.block_or_statement()?));
        }

        Ok(Stmt::new(
            StmtKind::If { branches },
            start_span.merge(&self.previous_span()),
        ))
    }

    fn while_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::While)?;
        let condition = self.paren_expression()?;
        let body = self.block_or_statement()?;
        Ok(Stmt::new(
            StmtKind::While { condition, body },
            start_span.merge(&self.previous_span()),
        ))
    }

    fn for_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::For)?;
        self.expect(&TokenKind::LeftParen)?;

        let init = match &self.peek().kind {
            TokenKind::Let => Some(Box::new(self.let_declaration()?)),
            TokenKind::Identifier(_) => Some(Box::new(self.simple_statement()?)),
            TokenKind::Semicolon => None,
            other => {
                return Err(ParserError::unexpected_token(
                    "for initializer",
                    format!("{}", other),
                    self.current_span(),
                ))
            }
        };
        self.expect(&TokenKind::Semicolon)?;

        let condition = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(&TokenKind::Semicolon)?;

        let post = if self.check(&TokenKind::RightParen) {
            None
        } else {
            Some(Box::new(self.simple_statement()?))
        };
        self.expect(&TokenKind::RightParen)?;

        let body = self.block_or_statement()?;
        Ok(Stmt::new(
            StmtKind::For {
                init,
                condition,
                post,
                body,
            },
            start_span.merge(&self.previous_span()),
        ))
    }

    fn loop_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::Loop)?;
        self.expect(&TokenKind::LeftParen)?;
        self.expect(&TokenKind::Let)?;

        let first = self.expect_identifier()?;
        let (key, value) = if self.match_token(&TokenKind::Comma) {
            (Some(first), self.expect_identifier()?)
        } else {
            (None, first)
        };
        self.expect(&TokenKind::Colon)?;
        let iterable = self.expression()?;
        self.expect(&TokenKind::RightParen)?;

        let body = self.block_or_statement()?;
        Ok(Stmt::new(
            StmtKind::Loop {
                key,
                value,
                iterable,
                body,
            },
            start_span.merge(&self.previous_span()),
        ))
    }

    fn switch_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::Switch)?;
        let value = self.paren_expression()?;
        self.skip_semicolons();
        self.expect(&TokenKind::LeftBrace)?;
        self.skip_semicolons();

        let mut cases = Vec::new();
        while self.check(&TokenKind::Case) {
            let case_span = self.advance().span;
            let values = self.expression_list()?;
            self.expect(&TokenKind::Colon)?;
            let body = self.statement_list(false)?;
            cases.push(SwitchCase {
                values,
                body,
                span: case_span,
            });
        }

        let default = if self.match_token(&TokenKind::Default) {
            self.expect(&TokenKind::Colon)?;
            Some(self.statement_list(false)?)
        } else {
            None
        };
        self.expect(&TokenKind::RightBrace)?;

        Ok(Stmt::new(
            StmtKind::Switch {
                value,
                cases,
                default,
            },
            start_span.merge(&self.previous_span()),
        ))
    }

    fn try_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::Try)?;
        self.skip_semicolons();
        let body = self.block()?;

        self.skip_semicolons();
        self.expect(&TokenKind::Catch)?;
        let catch_var = if self.match_token(&TokenKind::LeftParen) {
            let name = if self.check(&TokenKind::Identifier(String::new())) {
                Some(self.expect_identifier()?)
            } else {
                None
            };
            self.expect(&TokenKind::RightParen)?;
            name
        } else {
            None
        };
        self.skip_semicolons();
        let catch_body = self.block()?;

        Ok(Stmt::new(
            StmtKind::Try {
                body,
                catch_var,
                catch_body,
            },
            start_span.merge(&self.previous_span()),
        ))
    }

    /// `( expression )`
    fn paren_expression(&mut self) -> ParseResult<Expr> {
        self.expect(&TokenKind::LeftParen)?;
        let expr = self.expression()?;
        self.expect(&TokenKind::RightParen)?;
        Ok(expr)
    }
}
