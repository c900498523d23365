//! Statement compilation.

use std::collections::HashMap;

use crate::ast::{AssignOp, Expr, ExprKind, Stmt, StmtKind, SwitchCase};
use crate::span::Span;

use super::compiler::{
    Breakable, CompileResult, Compiler, Label, LoopBlock, PendingGoto, SwitchBlock,
};
use super::opcode::Opcode;

impl Compiler {
    /// Compile a statement list. Labels declared here stay visible to nested
    /// lists until this one ends; gotos that no visible label satisfies are
    /// handed to the enclosing list.
    pub fn compile_statements(&mut self, stmts: &[Stmt]) -> CompileResult<()> {
        let pending = self.compile_statement_list(stmts)?;
        if let Some(goto) = pending.first() {
            return Err(self.error(format!("invalid goto label '{}'", goto.label), goto.span));
        }
        Ok(())
    }

    fn compile_statement_list(&mut self, stmts: &[Stmt]) -> CompileResult<Vec<PendingGoto>> {
        self.frame.labels.push(HashMap::new());
        let mut gotos = Vec::new();
        for stmt in stmts {
            match &stmt.kind {
                StmtKind::Label(name) => self.define_label(name, stmt.span)?,
                StmtKind::Goto(label) => gotos.push(self.compile_goto(label, stmt.span)?),
                _ => gotos.extend(self.compile_stmt(stmt)?),
            }
        }
        let unresolved = self.resolve_gotos(gotos)?;
        self.frame.labels.pop();
        Ok(unresolved)
    }

    /// A statement list in its own scope.
    fn compile_scoped(&mut self, stmts: &[Stmt]) -> CompileResult<Vec<PendingGoto>> {
        let size = self.enter_block();
        let gotos = self.compile_statement_list(stmts)?;
        self.leave_block(size);
        Ok(gotos)
    }

    /// Compile one statement; returns gotos its nested lists left unresolved.
    pub fn compile_stmt(&mut self, stmt: &Stmt) -> CompileResult<Vec<PendingGoto>> {
        match &stmt.kind {
            StmtKind::Expression(expr) => self.compile_expression_stmt(expr)?,
            StmtKind::Let { names, values } => self.compile_let(names, values, stmt.span)?,
            StmtKind::Assign {
                targets,
                operator,
                values,
            } => self.compile_assign(targets, *operator, values, stmt.span)?,
            StmtKind::Block(body) => return self.compile_scoped(body),
            StmtKind::If { branches } => return self.compile_if(branches),
            StmtKind::While { condition, body } => {
                return self.compile_for(None, Some(condition), None, body, stmt.span)
            }
            StmtKind::For {
                init,
                condition,
                post,
                body,
            } => {
                return self.compile_for(
                    init.as_deref(),
                    condition.as_ref(),
                    post.as_deref(),
                    body,
                    stmt.span,
                )
            }
            StmtKind::Loop { .. } => {
                return Err(self.error("loop statement is not supported", stmt.span))
            }
            StmtKind::Switch {
                value,
                cases,
                default,
            } => return self.compile_switch(value, cases, default.as_deref(), stmt.span),
            StmtKind::Break => self.compile_break(stmt.span)?,
            StmtKind::Continue => self.compile_continue(stmt.span)?,
            StmtKind::Fallthrough => self.compile_fallthrough(stmt.span)?,
            StmtKind::Return(values) => self.compile_return(values)?,
            StmtKind::Try {
                body,
                catch_var,
                catch_body,
            } => return self.compile_try(body, catch_var.as_deref(), catch_body, stmt.span),
            StmtKind::Label(name) => self.define_label(name, stmt.span)?,
            StmtKind::Goto(label) => return Ok(vec![self.compile_goto(label, stmt.span)?]),
        }
        Ok(Vec::new())
    }

    fn compile_expression_stmt(&mut self, expr: &Expr) -> CompileResult<()> {
        match &expr.kind {
            ExprKind::Call { .. } => self.compile_expr(expr, 0),
            ExprKind::Increment { target, delta, .. } => self.compile_increment(target, *delta),
            _ => {
                self.compile_expr(expr, 1)?;
                self.emit(Opcode::PopTop);
                Ok(())
            }
        }
    }

    /// `let a, b = x, y`: values first, then names bound right to left.
    pub fn compile_let(&mut self, names: &[String], values: &[Expr], span: Span) -> CompileResult<()> {
        self.compile_exprs(values, names.len(), span)?;
        for name in names.iter().rev() {
            self.bind_let(name, span)?;
        }
        Ok(())
    }

    pub fn compile_assign(
        &mut self,
        targets: &[Expr],
        operator: AssignOp,
        values: &[Expr],
        span: Span,
    ) -> CompileResult<()> {
        self.compile_exprs(values, targets.len(), span)?;
        for target in targets.iter().rev() {
            self.assign_top(target, operator)?;
        }
        Ok(())
    }

    /// Assign the value on top of the stack to `target`.
    pub fn assign_top(&mut self, target: &Expr, operator: AssignOp) -> CompileResult<()> {
        let (root, keys) = flatten_target(target)
            .ok_or_else(|| self.error("invalid assignment target", target.span))?;

        let Some((last, path)) = keys.split_last() else {
            if let Some(op) = operator.binary_op() {
                self.load_name(root, target.span)?;
                // Non-commutative operators need the stored value on the left.
                if matches!(
                    operator,
                    AssignOp::Add | AssignOp::Subtract | AssignOp::Divide | AssignOp::Modulo
                ) {
                    self.emit(Opcode::RotTwo);
                }
                self.emit(binary_opcode(op));
            }
            return self.store_name(root, target.span);
        };

        self.compile_expr(last, 1)?;
        self.load_name(root, target.span)?;
        for key in path {
            self.compile_expr(key, 1)?;
            self.emit(Opcode::BinaryAttr);
        }
        self.emit(attr_assign_opcode(operator));
        Ok(())
    }

    /// `x++` and friends as a statement: just the compound assignment.
    pub fn compile_increment(&mut self, target: &Expr, delta: i64) -> CompileResult<()> {
        let (operator, amount) = if delta < 0 {
            (AssignOp::Subtract, delta.wrapping_neg())
        } else {
            (AssignOp::Add, delta)
        };
        self.emit_constant(super::proto::Constant::Int(amount));
        self.assign_top(target, operator)
    }

    /// ```text
    ///     cond0; JUMP_IF b0
    ///     cond1; JUMP_IF b1
    ///     JUMP end
    /// b0: block0; JUMP end
    /// b1: block1
    /// end:
    /// ```
    fn compile_if(&mut self, branches: &[(Expr, Vec<Stmt>)]) -> CompileResult<Vec<PendingGoto>> {
        let mut entries = Vec::with_capacity(branches.len());
        for (condition, _) in branches {
            self.compile_expr(condition, 1)?;
            entries.push(self.emit_jump(Opcode::JumpIf));
        }
        let mut exits = vec![self.emit_jump(Opcode::JumpRel)];

        let mut gotos = Vec::new();
        let last = branches.len().saturating_sub(1);
        for (i, ((_, body), entry)) in branches.iter().zip(entries).enumerate() {
            self.patch_jump(entry);
            gotos.extend(self.compile_scoped(body)?);
            if i != last {
                exits.push(self.emit_jump(Opcode::JumpRel));
            }
        }
        for exit in exits {
            self.patch_jump(exit);
        }
        Ok(gotos)
    }

    /// ```text
    ///        init
    /// top:   cond; JUMP_IF body; JUMP exit
    /// body:  block
    /// tail:  RESIZE n; post; JUMP top
    /// exit:
    /// ```
    /// `continue` jumps to `tail`, `break` to `exit`.
    fn compile_for(
        &mut self,
        init: Option<&Stmt>,
        condition: Option<&Expr>,
        post: Option<&Stmt>,
        body: &[Stmt],
        span: Span,
    ) -> CompileResult<Vec<PendingGoto>> {
        let start_size = self.enter_block();
        let mut gotos = Vec::new();
        if let Some(init) = init {
            gotos.extend(self.compile_stmt(init)?);
        }
        let name_count = self.frame.slot_count;
        self.frame.blocks.push(Breakable::Loop(LoopBlock {
            name_count,
            try_level: self.frame.try_level,
            breaks: Vec::new(),
            continues: Vec::new(),
        }));

        let top = self.current_offset();
        match condition {
            Some(condition) => self.compile_expr(condition, 1)?,
            None => self.emit_constant(super::proto::Constant::Bool(true)),
        }
        let enter = self.emit_jump(Opcode::JumpIf);
        let exit = self.emit_jump(Opcode::JumpRel);
        self.patch_jump(enter);

        let body_size = self.enter_block();
        gotos.extend(self.compile_statement_list(body)?);
        self.pop_scope(body_size);

        let tail = self.current_offset();
        self.emit_u32(Opcode::ResizeNametable, name_count);
        if let Some(post) = post {
            gotos.extend(self.compile_stmt(post)?);
        }
        self.emit_jump_to(Opcode::JumpRel, top);
        let end = self.current_offset();
        self.patch_jump_to(exit, end);

        let Some(Breakable::Loop(block)) = self.frame.blocks.pop() else {
            return Err(self.error("loop bookkeeping out of order", span));
        };
        for at in block.breaks {
            self.patch_jump_to(at, end);
        }
        for at in block.continues {
            self.patch_jump_to(at, tail);
        }
        self.leave_block(start_size);
        Ok(gotos)
    }

    /// ```text
    ///     value
    ///     case0; JUMP_CASE b0
    ///     case1; JUMP_CASE b1
    ///     JUMP default (or end)
    /// b0: block0; JUMP end
    /// b1: block1; JUMP end
    /// default: block
    /// end: POP_TOP
    /// ```
    fn compile_switch(
        &mut self,
        value: &Expr,
        cases: &[SwitchCase],
        default: Option<&[Stmt]>,
        span: Span,
    ) -> CompileResult<Vec<PendingGoto>> {
        self.frame.blocks.push(Breakable::Switch(SwitchBlock {
            name_count: self.frame.slot_count,
            try_level: self.frame.try_level,
            breaks: Vec::new(),
            fallthroughs: Vec::new(),
        }));

        self.compile_expr(value, 1)?;
        let mut entries = Vec::with_capacity(cases.len());
        for case in cases {
            let mut jumps = Vec::with_capacity(case.values.len());
            for value in &case.values {
                self.compile_expr(value, 1)?;
                jumps.push(self.emit_jump(Opcode::JumpCase));
            }
            entries.push(jumps);
        }
        let no_match = self.emit_jump(Opcode::JumpRel);

        let mut gotos = Vec::new();
        let mut exits = Vec::new();
        let last = cases.len().saturating_sub(1);
        for (i, (case, jumps)) in cases.iter().zip(entries).enumerate() {
            self.patch_fallthroughs();
            for at in jumps {
                self.patch_jump(at);
            }
            gotos.extend(self.compile_scoped(&case.body)?);
            if default.is_some() || i != last {
                exits.push(self.emit_jump(Opcode::JumpRel));
            }
        }

        match default {
            Some(body) => {
                self.patch_fallthroughs();
                self.patch_jump(no_match);
                gotos.extend(self.compile_scoped(body)?);
            }
            None => exits.push(no_match),
        }

        let Some(Breakable::Switch(block)) = self.frame.blocks.pop() else {
            return Err(self.error("switch bookkeeping out of order", span));
        };
        if !block.fallthroughs.is_empty() {
            return Err(self.error(
                "fallthrough should not appear at last case",
                span,
            ));
        }

        let end = self.current_offset();
        for at in exits.into_iter().chain(block.breaks) {
            self.patch_jump_to(at, end);
        }
        self.emit(Opcode::PopTop);
        Ok(gotos)
    }

    fn patch_fallthroughs(&mut self) {
        let pending = match self.frame.blocks.last_mut() {
            Some(Breakable::Switch(block)) => std::mem::take(&mut block.fallthroughs),
            _ => Vec::new(),
        };
        for at in pending {
            self.patch_jump(at);
        }
    }

    fn emit_end_tries(&mut self, outer_level: usize) {
        for _ in outer_level..self.frame.try_level {
            self.emit(Opcode::EndTry);
        }
    }

    /// Leaves the innermost loop or switch, restoring its slot count.
    fn compile_break(&mut self, span: Span) -> CompileResult<()> {
        let (name_count, try_level) = match self.frame.blocks.last() {
            Some(Breakable::Loop(b)) => (b.name_count, b.try_level),
            Some(Breakable::Switch(b)) => (b.name_count, b.try_level),
            None => {
                return Err(self.error(
                    "found no matched switch or loop statement for break",
                    span,
                ))
            }
        };
        self.emit_u32(Opcode::ResizeNametable, name_count);
        self.emit_end_tries(try_level);
        let at = self.emit_jump(Opcode::JumpRel);
        match self.frame.blocks.last_mut() {
            Some(Breakable::Loop(b)) => b.breaks.push(at),
            Some(Breakable::Switch(b)) => b.breaks.push(at),
            None => {}
        }
        Ok(())
    }

    /// Jumps to the loop tail. Every switch between here and the loop has
    /// its value dropped first.
    fn compile_continue(&mut self, span: Span) -> CompileResult<()> {
        let Some(pos) = self
            .frame
            .blocks
            .iter()
            .rposition(|b| matches!(b, Breakable::Loop(_)))
        else {
            return Err(self.error("found no matched loop statement for continue", span));
        };
        let exited_switches = self.frame.blocks.len() - pos - 1;
        let try_level = match &self.frame.blocks[pos] {
            Breakable::Loop(b) => b.try_level,
            Breakable::Switch(b) => b.try_level,
        };
        for _ in 0..exited_switches {
            self.emit(Opcode::PopTop);
        }
        self.emit_end_tries(try_level);
        let at = self.emit_jump(Opcode::JumpRel);
        if let Breakable::Loop(b) = &mut self.frame.blocks[pos] {
            b.continues.push(at);
        }
        Ok(())
    }

    fn compile_fallthrough(&mut self, span: Span) -> CompileResult<()> {
        let Some(Breakable::Switch(block)) = self.frame.blocks.last() else {
            return Err(self.error(
                "found no matched switch statement for fallthrough",
                span,
            ));
        };
        let (name_count, try_level) = (block.name_count, block.try_level);
        self.emit_u32(Opcode::ResizeNametable, name_count);
        self.emit_end_tries(try_level);
        let at = self.emit_jump(Opcode::JumpRel);
        if let Some(Breakable::Switch(block)) = self.frame.blocks.last_mut() {
            block.fallthroughs.push(at);
        }
        Ok(())
    }

    pub fn compile_return(&mut self, values: &[Expr]) -> CompileResult<()> {
        for value in values {
            self.compile_expr(value, 1)?;
        }
        self.emit_u32(Opcode::Return, values.len() as u32);
        Ok(())
    }

    /// ```text
    ///        TRY catch
    ///        body
    ///        END_TRY; JUMP done
    /// catch: PUSH_NAME e | POP_TOP
    ///        catch body
    /// done:
    /// ```
    fn compile_try(
        &mut self,
        body: &[Stmt],
        catch_var: Option<&str>,
        catch_body: &[Stmt],
        span: Span,
    ) -> CompileResult<Vec<PendingGoto>> {
        self.frame.try_level += 1;
        let catch = self.emit_jump(Opcode::Try);
        let mut gotos = self.compile_scoped(body)?;
        self.emit(Opcode::EndTry);
        let done = self.emit_jump(Opcode::JumpRel);
        self.frame.try_level -= 1;

        self.patch_jump(catch);
        let size = self.enter_block();
        match catch_var {
            Some(name) => self.push_name(name, span)?,
            None => {
                self.emit(Opcode::PopTop);
            }
        }
        gotos.extend(self.compile_statement_list(catch_body)?);
        self.leave_block(size);
        self.patch_jump(done);
        Ok(gotos)
    }

    fn define_label(&mut self, name: &str, span: Span) -> CompileResult<()> {
        if let Some(existing) = self
            .frame
            .labels
            .iter()
            .find_map(|labels| labels.get(name))
        {
            return Err(self.error(
                format!(
                    "label '{}' is already declared at line {}",
                    name, existing.span.line
                ),
                span,
            ));
        }
        let label = Label {
            addr: self.current_offset(),
            name_count: self.frame.slot_count,
            switch_depth: self.frame.switch_depth(),
            span,
        };
        if let Some(labels) = self.frame.labels.last_mut() {
            labels.insert(name.to_string(), label);
        }
        Ok(())
    }

    /// `RESIZE_NAMETABLE ?; JUMP ?`, both patched once the label is known.
    fn compile_goto(&mut self, label: &str, span: Span) -> CompileResult<PendingGoto> {
        if self.frame.try_level != 0 {
            return Err(self.error("goto statement in try block is not allowed", span));
        }
        let resize_at = self.emit_u32(Opcode::ResizeNametable, 0);
        let jump_at = self.emit_jump(Opcode::JumpRel);
        Ok(PendingGoto {
            label: label.to_string(),
            resize_at,
            jump_at,
            switch_depth: self.frame.switch_depth(),
            span,
        })
    }

    fn resolve_gotos(&mut self, gotos: Vec<PendingGoto>) -> CompileResult<Vec<PendingGoto>> {
        let mut unresolved = Vec::new();
        for goto in gotos {
            let found = self
                .frame
                .labels
                .iter()
                .rev()
                .find_map(|labels| labels.get(&goto.label).copied());
            let Some(label) = found else {
                unresolved.push(goto);
                continue;
            };
            if label.switch_depth != goto.switch_depth {
                return Err(self.error(
                    format!("goto '{}' can not cross a switch statement", goto.label),
                    goto.span,
                ));
            }
            self.frame.chunk.patch_u32(goto.resize_at, label.name_count);
            self.patch_jump_to(goto.jump_at, label.addr);
        }
        Ok(unresolved)
    }
}

/// Split `a.b[c]` into the root name and the key expressions, outermost
/// first.
fn flatten_target(target: &Expr) -> Option<(&str, Vec<&Expr>)> {
    match &target.kind {
        ExprKind::Variable(name) => Some((name, Vec::new())),
        ExprKind::Index { object, key } => {
            let (root, mut keys) = flatten_target(object)?;
            keys.push(key);
            Some((root, keys))
        }
        _ => None,
    }
}

pub fn binary_opcode(op: crate::ast::BinaryOp) -> Opcode {
    use crate::ast::BinaryOp::*;
    match op {
        Add => Opcode::BinaryAdd,
        Subtract => Opcode::BinarySub,
        Multiply => Opcode::BinaryMul,
        Divide => Opcode::BinaryDiv,
        Modulo => Opcode::BinaryMod,
        BitAnd => Opcode::BinaryAnd,
        BitXor => Opcode::BinaryXor,
        BitOr => Opcode::BinaryOr,
        IntDivide => Opcode::BinaryIdiv,
        ShiftRight => Opcode::BinaryShr,
        ShiftLeft => Opcode::BinaryShl,
        LessEqual => Opcode::BinaryLe,
        GreaterEqual => Opcode::BinaryGe,
        Less => Opcode::BinaryLt,
        Greater => Opcode::BinaryGt,
        Equal => Opcode::BinaryEq,
        NotEqual => Opcode::BinaryNe,
        And => Opcode::BinaryLand,
        Or => Opcode::BinaryLor,
    }
}

fn attr_assign_opcode(op: AssignOp) -> Opcode {
    match op {
        AssignOp::Assign => Opcode::AttrAssign,
        AssignOp::Add => Opcode::AttrAssignAddeq,
        AssignOp::Subtract => Opcode::AttrAssignSubeq,
        AssignOp::Multiply => Opcode::AttrAssignMuleq,
        AssignOp::Divide => Opcode::AttrAssignDiveq,
        AssignOp::Modulo => Opcode::AttrAssignModeq,
        AssignOp::BitAnd => Opcode::AttrAssignAndeq,
        AssignOp::BitXor => Opcode::AttrAssignXoreq,
        AssignOp::BitOr => Opcode::AttrAssignOreq,
    }
}
