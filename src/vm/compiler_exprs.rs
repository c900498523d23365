//! Expression compilation.

use crate::ast::{BinaryOp, Expr, ExprKind, FunctionLiteral, Stmt, StmtKind, UnaryOp};
use crate::span::Span;

use super::compiler::{literal_constant, CompileResult, Compiler, FrameState, Upvalue};
use super::compiler_stmts::binary_opcode;
use super::opcode::Opcode;
use super::proto::{AnonymousFuncProto, Constant, UpvaluePtr};

impl Compiler {
    /// Compile an expression list so that exactly `want` values end up on
    /// the stack. Every expression but the last yields one value; a trailing
    /// call yields whatever is left.
    pub fn compile_exprs(&mut self, values: &[Expr], want: usize, span: Span) -> CompileResult<()> {
        let Some((last, init)) = values.split_last() else {
            for _ in 0..want {
                self.emit(Opcode::LoadNil);
            }
            return Ok(());
        };
        let mismatch = if last.is_call() {
            init.len() > want
        } else {
            values.len() != want
        };
        if mismatch {
            return Err(self.error(
                format!(
                    "assignment mismatch: {} variables but {} values",
                    want,
                    values.len()
                ),
                span,
            ));
        }
        for value in init {
            self.compile_expr(value, 1)?;
        }
        self.compile_expr(last, want - init.len())
    }

    /// Compile `expr` leaving `want` values on the stack. Calls request that
    /// many results from the callee; anything else yields one value that is
    /// dropped or padded with nils.
    pub fn compile_expr(&mut self, expr: &Expr, want: usize) -> CompileResult<()> {
        match &expr.kind {
            ExprKind::Call { callee, arguments } => {
                self.compile_exprs(arguments, arguments.len(), expr.span)?;
                self.compile_expr(callee, 1)?;
                return self.emit_call(want, arguments.len(), expr.span);
            }
            ExprKind::IntLiteral(n) => self.emit_constant(Constant::Int(*n)),
            ExprKind::FloatLiteral(n) => self.emit_constant(Constant::Float(*n)),
            ExprKind::StringLiteral(s) => self.emit_constant(Constant::String(s.clone())),
            ExprKind::BoolLiteral(b) => self.emit_constant(Constant::Bool(*b)),
            ExprKind::Nil => {
                self.emit(Opcode::LoadNil);
            }
            ExprKind::Variable(name) => self.load_name(name, expr.span)?,
            ExprKind::Binary {
                left,
                operator,
                right,
            } => self.compile_binary(left, *operator, right)?,
            ExprKind::Unary { operator, operand } => {
                self.compile_expr(operand, 1)?;
                self.emit(match operator {
                    UnaryOp::BitNot => Opcode::UnaryNot,
                    UnaryOp::Negate => Opcode::UnaryNeg,
                    UnaryOp::Not => Opcode::UnaryLnot,
                });
            }
            ExprKind::Index { object, key } => {
                self.compile_expr(object, 1)?;
                self.compile_expr(key, 1)?;
                self.emit(Opcode::BinaryAttr);
            }
            ExprKind::Ternary {
                condition,
                then_expr,
                else_expr,
            } => {
                self.compile_expr(condition, 1)?;
                let then_jump = self.emit_jump(Opcode::JumpIf);
                self.compile_expr(else_expr, 1)?;
                let end_jump = self.emit_jump(Opcode::JumpRel);
                self.patch_jump(then_jump);
                self.compile_expr(then_expr, 1)?;
                self.patch_jump(end_jump);
            }
            ExprKind::Array(elements) => {
                for element in elements {
                    self.compile_expr(element, 1)?;
                }
                self.emit_u32(Opcode::SliceNew, elements.len() as u32);
            }
            ExprKind::Map(entries) => {
                for (key, value) in entries {
                    self.emit_constant(literal_constant(key));
                    self.compile_expr(value, 1)?;
                }
                self.emit_u32(Opcode::NewMap, entries.len() as u32);
            }
            ExprKind::Function(func) => self.compile_function_literal(func)?,
            ExprKind::New { class, arguments } => {
                let Some(&idx) = self.classes.get(class) else {
                    return Err(self.error(format!("undefined class '{}'", class), expr.span));
                };
                self.emit(Opcode::NewEmptyMap);
                self.compile_exprs(arguments, arguments.len(), expr.span)?;
                self.emit_load_anonymous(idx);
                // The constructor leaves the object below its frame.
                self.emit_call(0, arguments.len(), expr.span)?;
            }
            ExprKind::Increment {
                target,
                delta,
                prefix,
            } => {
                if *prefix {
                    self.compile_increment(target, *delta)?;
                    self.compile_expr(target, 1)?;
                } else {
                    self.compile_expr(target, 1)?;
                    self.compile_increment(target, *delta)?;
                }
            }
        }

        match want {
            0 => {
                self.emit(Opcode::PopTop);
            }
            1 => {}
            n => {
                for _ in 1..n {
                    self.emit(Opcode::LoadNil);
                }
            }
        }
        Ok(())
    }

    /// `&&` and `||` short-circuit: the left value is kept when it decides
    /// the result.
    fn compile_binary(&mut self, left: &Expr, op: BinaryOp, right: &Expr) -> CompileResult<()> {
        self.compile_expr(left, 1)?;
        match op {
            BinaryOp::And | BinaryOp::Or => {
                let jump_op = if op == BinaryOp::And {
                    Opcode::JumpLand
                } else {
                    Opcode::JumpLor
                };
                let at = self.emit_jump(jump_op);
                self.compile_expr(right, 1)?;
                self.patch_jump(at);
            }
            _ => {
                self.compile_expr(right, 1)?;
                self.emit(binary_opcode(op));
            }
        }
        Ok(())
    }

    /// Reserve an anonymous slot, emit the closure load, then compile the
    /// body in a nested frame.
    fn compile_function_literal(&mut self, func: &FunctionLiteral) -> CompileResult<()> {
        let idx = self.anonymous_funcs.len() as u32;
        self.anonymous_funcs.push(None);
        self.emit_load_anonymous(idx);

        let frame = self.compile_function_frame(func)?;
        let upvalues = frame
            .upvalues
            .iter()
            .map(|uv| self.bind_upvalue(uv))
            .collect();
        let info = self.function_info(&func.params, func.variadic.is_some(), frame.chunk.code);
        self.anonymous_funcs[idx as usize] = Some(AnonymousFuncProto { upvalues, info });
        Ok(())
    }

    /// Compile a function body in a fresh frame nested in the current one
    /// and hand back the finished frame.
    pub fn compile_function_frame(&mut self, func: &FunctionLiteral) -> CompileResult<FrameState> {
        self.push_frame();
        let result = self.compile_function_body(func);
        let frame = self.pop_frame();
        result.map(|_| frame)
    }

    fn compile_function_body(&mut self, func: &FunctionLiteral) -> CompileResult<()> {
        self.collect_args(func)?;
        self.compile_statements(&func.body)?;
        self.emit_implicit_return(&func.body);
        Ok(())
    }

    /// Parameters arrive on the stack left to right with the variadic array
    /// on top, so they are bound in reverse.
    pub fn collect_args(&mut self, func: &FunctionLiteral) -> CompileResult<()> {
        if let Some(rest) = &func.variadic {
            self.push_name(rest, func.span)?;
        }
        for param in func.params.iter().rev() {
            self.push_name(&param.name, param.span)?;
        }
        Ok(())
    }

    pub fn emit_implicit_return(&mut self, body: &[Stmt]) {
        if !matches!(body.last(), Some(Stmt { kind: StmtKind::Return(_), .. })) {
            self.emit_u32(Opcode::Return, 0);
        }
    }

    /// Turn an upvalue of a just-finished child frame into a pointer the VM
    /// follows when the closure is created. Anything deeper than the current
    /// frame is forwarded through an upvalue of this frame.
    fn bind_upvalue(&mut self, upvalue: &Upvalue) -> UpvaluePtr {
        if upvalue.level == 0 {
            return UpvaluePtr {
                direct: true,
                index: upvalue.slot,
            };
        }
        let index = self.frame.add_upvalue(Upvalue {
            name: upvalue.name.clone(),
            level: upvalue.level - 1,
            slot: upvalue.slot,
        });
        UpvaluePtr {
            direct: false,
            index,
        }
    }
}
