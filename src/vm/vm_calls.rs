//! Calls, returns and module entry/exit.

use std::rc::Rc;

use crate::error::RuntimeError;
use crate::value::Value;

use super::builtins::{self, NativeError};
use super::compiler::UnitId;
use super::upvalue::Closure;
use super::vm::{CallFrame, ModuleContext, Vm, VmResult};

/// Pad with nils or drop extras so exactly `want` values remain.
fn reconcile(mut values: Vec<Value>, want: usize) -> Vec<Value> {
    values.resize(want, Value::Nil);
    values
}

impl Vm {
    /// `CALL want argc`: the callee sits on top of its arguments.
    pub(crate) fn call_value(&mut self, want: usize, argc: usize) -> VmResult<()> {
        match self.pop()? {
            Value::Closure(closure) => self.call_closure(closure, want, argc),
            Value::Builtin(idx) => self.call_builtin(idx, want, argc),
            other => Err(RuntimeError::NotCallable(other.type_name())),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, want: usize, argc: usize) -> VmResult<()> {
        let depth: usize = self.contexts.iter().map(|ctx| ctx.frames.len()).sum();
        if depth >= self.max_call_depth {
            return Err(RuntimeError::CallDepthExceeded(self.max_call_depth));
        }

        let info = &closure.info;
        let ctx = self.context()?;
        if ctx.stack.len() < argc {
            return Err(RuntimeError::StackUnderflow);
        }
        let base = ctx.stack.len() - argc;
        let nparams = info.params.len();

        if argc < nparams {
            ctx.stack
                .extend(info.params[argc..].iter().map(|p| Value::from(&p.default)));
        }
        if info.variadic {
            let extra = if argc > nparams {
                ctx.stack.split_off(base + nparams)
            } else {
                Vec::new()
            };
            ctx.stack.push(Value::array(extra));
        } else if argc > nparams {
            ctx.stack.truncate(base + nparams);
        }

        ctx.frames.push(CallFrame::new(
            info.text.clone(),
            closure.upvalues.clone(),
            want,
            base,
        ));
        Ok(())
    }

    fn call_builtin(&mut self, idx: u32, want: usize, argc: usize) -> VmResult<()> {
        let builtin = builtins::get(idx)
            .ok_or_else(|| RuntimeError::invalid_bytecode(format!("no builtin {}", idx)))?;
        let args = self.pop_n(argc)?;
        match (builtin.func)(self, args) {
            Ok(results) => {
                self.context()?.stack.extend(reconcile(results, want));
                Ok(())
            }
            Err(NativeError::Throw(value)) => self.throw(value),
            Err(NativeError::Fatal(message)) => Err(RuntimeError::new(message)),
        }
    }

    /// `RETURN n`: drop the frame's leftovers and hand `want` values to the
    /// caller. Returning from a module's top frame stops the VM.
    pub(crate) fn return_values(&mut self, n: usize) -> VmResult<()> {
        let values = self.pop_n(n)?;
        let ctx = self.context()?;
        let frame = ctx
            .frames
            .pop()
            .ok_or_else(|| RuntimeError::new("return outside of a call frame"))?;
        if ctx.frames.is_empty() {
            self.exit_module_frame(frame);
            self.stop();
            return Ok(());
        }
        ctx.stack.truncate(frame.stack_base);
        ctx.stack.extend(reconcile(values, frame.want));
        Ok(())
    }

    /// Push a context running `unit`'s top-level code.
    pub(crate) fn enter_module(&mut self, unit: UnitId) {
        let Some(proto) = self.proto(unit).cloned() else {
            return;
        };
        tracing::debug!(file = %proto.file_path, ?unit, "entering module");
        self.contexts.push(ModuleContext {
            unit,
            stack: Vec::new(),
            frames: vec![CallFrame::new(proto.text.clone(), Vec::new(), 1, 0)],
        });
    }

    /// `LOAD_PROTO` / `LOAD_STDLIB`: run the module once and push its export.
    pub(crate) fn import(&mut self, unit: UnitId) -> VmResult<()> {
        if let Some(value) = self.exports.get(&unit).cloned() {
            return self.push(value);
        }
        if self.proto(unit).is_none() {
            return Err(RuntimeError::invalid_bytecode(format!(
                "unknown module {:?}",
                unit
            )));
        }
        if self.contexts.iter().any(|ctx| ctx.unit == unit) {
            return Err(RuntimeError::new(format!(
                "module {:?} imports itself while loading",
                unit
            )));
        }
        self.enter_module(unit);
        Ok(())
    }

    /// `EXPORT`: leave the module and give its value to the importer.
    pub(crate) fn export(&mut self) -> VmResult<()> {
        let mut ctx = self
            .contexts
            .pop()
            .ok_or_else(|| RuntimeError::new("export outside of a module"))?;
        let value = ctx.stack.pop().unwrap_or(Value::Nil);
        if let Some(top) = ctx.frames.drain(..).next() {
            self.module_symbols.insert(ctx.unit, top.symbols);
        }
        tracing::debug!(unit = ?ctx.unit, "module exported");
        self.exports.insert(ctx.unit, value.clone());

        if self.contexts.is_empty() {
            self.stop();
            return Ok(());
        }
        self.push(value)
    }

    fn exit_module_frame(&mut self, frame: CallFrame) {
        if let Some(unit) = self.contexts.last().map(|ctx| ctx.unit) {
            self.module_symbols.insert(unit, frame.symbols);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reconcile_pads_and_truncates() {
        let values = vec![Value::Int(1), Value::Int(2)];
        assert_eq!(reconcile(values.clone(), 0).len(), 0);
        let padded = reconcile(values.clone(), 3);
        assert!(matches!(padded[..], [Value::Int(1), Value::Int(2), Value::Nil]));
        let cut = reconcile(values, 1);
        assert!(matches!(cut[..], [Value::Int(1)]));
    }
}
