//! Bytecode VM for gscript: compiles the AST to bytecode and executes it on a
//! stack-based VM.
//!
//! Compiled modules can be saved in the binary proto format (`format`) and
//! inspected with the disassembler or the interactive debugger.

pub mod builtins;
pub mod chunk;
pub mod compiler;
pub mod compiler_decls;
pub mod compiler_exprs;
pub mod compiler_stmts;
pub mod debugger;
pub mod disassembler;
pub mod format;
pub mod opcode;
pub mod proto;
pub mod upvalue;
#[allow(clippy::module_inception)]
pub mod vm;
pub mod vm_calls;
pub mod vm_exceptions;
pub mod vm_ops;

pub use compiler::{Compiler, UnitId};
pub use debugger::Debugger;
pub use disassembler::disassemble;
pub use opcode::Opcode;
pub use proto::Proto;
pub use upvalue::Closure;
pub use vm::Vm;
