//! Exception propagation.

use crate::error::RuntimeError;
use crate::value::Value;

use super::vm::{Vm, VmResult};

impl Vm {
    /// Route a thrown value to the nearest `try` handler of the current
    /// module, popping call frames that have none. With no handler left the
    /// exception is fatal.
    pub(crate) fn throw(&mut self, value: Value) -> VmResult<()> {
        let ctx = self.context()?;
        while let Some(frame) = ctx.frames.last_mut() {
            if let Some(handler) = frame.handlers.pop() {
                frame.symbols.truncate(handler.symtab_len);
                frame.pc = handler.catch_pc;
                ctx.stack.truncate(handler.stack_len);
                ctx.stack.push(value);
                return Ok(());
            }
            ctx.frames.pop();
        }
        tracing::warn!(exception = %value, "uncaught exception");
        Err(RuntimeError::UncaughtException(value.to_string()))
    }
}
