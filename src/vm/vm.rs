//! The bytecode virtual machine: stack-based execution engine.
//!
//! Execution is organised as a stack of module contexts. Importing a module
//! pushes a context that runs the module's top-level code until `EXPORT`
//! hands its value back to the importer. Each context owns a value stack and
//! a stack of call frames; every frame owns its symbol table.

use std::collections::HashMap;
use std::rc::Rc;

use crate::config::Config;
use crate::error::RuntimeError;
use crate::value::{HashKey, Object, Value};

use super::builtins;
use super::chunk::{jump_target, read_u32, read_u8};
use super::compiler::UnitId;
use super::opcode::Opcode;
use super::proto::Proto;
use super::upvalue::{new_cell, Cell, Closure};
use super::vm_ops::{attr_assign_op, binary_op, get_attr, set_attr, unary_op, values_equal};

pub type VmResult<T> = Result<T, RuntimeError>;

/// An active `try` region.
#[derive(Debug, Clone, Copy)]
pub struct TryHandler {
    pub catch_pc: usize,
    pub symtab_len: usize,
    pub stack_len: usize,
}

/// A call frame. Module top-level code runs in a frame too.
#[derive(Debug, Clone)]
pub struct CallFrame {
    pub text: Rc<[u8]>,
    pub pc: usize,
    pub symbols: Vec<Cell>,
    pub upvalues: Vec<Cell>,
    pub handlers: Vec<TryHandler>,
    /// Number of results the caller asked for.
    pub want: usize,
    /// Value-stack length when the frame's arguments start.
    pub stack_base: usize,
}

impl CallFrame {
    pub fn new(text: Rc<[u8]>, upvalues: Vec<Cell>, want: usize, stack_base: usize) -> Self {
        Self {
            text,
            pc: 0,
            symbols: Vec::new(),
            upvalues,
            handlers: Vec::new(),
            want,
            stack_base,
        }
    }
}

/// One executing module.
#[derive(Debug)]
pub struct ModuleContext {
    pub unit: UnitId,
    pub stack: Vec<Value>,
    pub frames: Vec<CallFrame>,
}

/// The bytecode VM.
pub struct Vm {
    pub(crate) protos: Vec<Rc<Proto>>,
    pub(crate) stdlibs: Vec<Rc<Proto>>,
    pub(crate) contexts: Vec<ModuleContext>,
    /// Top-level symbol tables of modules that already exported.
    pub(crate) module_symbols: HashMap<UnitId, Vec<Cell>>,
    /// Export value per module; a module body runs at most once.
    pub(crate) exports: HashMap<UnitId, Value>,
    pub(crate) max_call_depth: usize,
    pub(crate) max_buffer_size: usize,
    stopped: bool,
    exit_code: Option<i32>,
    /// Captured `print` output, when capturing.
    output: Option<Vec<String>>,
}

impl Vm {
    /// A VM ready to run `protos[0]` as the main module.
    pub fn new(protos: Vec<Proto>, stdlibs: Vec<Proto>, config: &Config) -> Self {
        let mut vm = Self {
            protos: protos.into_iter().map(Rc::new).collect(),
            stdlibs: stdlibs.into_iter().map(Rc::new).collect(),
            contexts: Vec::new(),
            module_symbols: HashMap::new(),
            exports: HashMap::new(),
            max_call_depth: config.max_call_depth,
            max_buffer_size: config.max_buffer_size,
            stopped: false,
            exit_code: None,
            output: None,
        };
        if !vm.protos.is_empty() {
            vm.enter_module(UnitId::User(0));
        }
        vm
    }

    /// Collect `print` output instead of writing it to stdout.
    pub fn capture_output(&mut self) {
        self.output = Some(Vec::new());
    }

    pub fn take_output(&mut self) -> Vec<String> {
        self.output.as_mut().map(std::mem::take).unwrap_or_default()
    }

    pub fn write_line(&mut self, line: String) {
        match &mut self.output {
            Some(lines) => lines.push(line),
            None => println!("{}", line),
        }
    }

    pub(crate) fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn exit(&mut self, code: i32) {
        self.exit_code = Some(code);
        self.stopped = true;
    }

    /// The code passed to `__exit`, if the script called it.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped || self.contexts.is_empty()
    }

    pub fn contexts(&self) -> &[ModuleContext] {
        &self.contexts
    }

    pub fn proto(&self, unit: UnitId) -> Option<&Rc<Proto>> {
        match unit {
            UnitId::User(n) => self.protos.get(n as usize),
            UnitId::Stdlib(n) => self.stdlibs.get(n as usize),
        }
    }

    pub fn protos(&self) -> &[Rc<Proto>] {
        &self.protos
    }

    /// Run until `STOP`, `__exit` or a fatal error.
    pub fn run(&mut self) -> VmResult<()> {
        while !self.is_stopped() {
            self.step()?;
        }
        Ok(())
    }

    /// Execute one instruction. Errors carry the path of the module whose
    /// code was executing.
    pub fn step(&mut self) -> VmResult<()> {
        let result = self.execute_one();
        result.map_err(|err| {
            let file = self
                .contexts
                .last()
                .and_then(|ctx| self.proto(ctx.unit))
                .map_or_else(String::new, |p| p.file_path.clone());
            err.in_module(file)
        })
    }

    // --- Context and stack access ---

    pub(crate) fn context(&mut self) -> VmResult<&mut ModuleContext> {
        self.contexts
            .last_mut()
            .ok_or_else(|| RuntimeError::new("no module is executing"))
    }

    pub(crate) fn frame(&mut self) -> VmResult<&mut CallFrame> {
        self.context()?
            .frames
            .last_mut()
            .ok_or_else(|| RuntimeError::new("no active call frame"))
    }

    pub(crate) fn push(&mut self, value: Value) -> VmResult<()> {
        self.context()?.stack.push(value);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> VmResult<Value> {
        self.context()?.stack.pop().ok_or(RuntimeError::StackUnderflow)
    }

    pub(crate) fn peek(&mut self) -> VmResult<&Value> {
        self.context()?.stack.last().ok_or(RuntimeError::StackUnderflow)
    }

    /// Remove and return the top `n` values, oldest first.
    pub(crate) fn pop_n(&mut self, n: usize) -> VmResult<Vec<Value>> {
        let stack = &mut self.context()?.stack;
        if stack.len() < n {
            return Err(RuntimeError::StackUnderflow);
        }
        let at = stack.len() - n;
        Ok(stack.split_off(at))
    }

    fn read_u32(&mut self) -> VmResult<u32> {
        let frame = self.frame()?;
        read_u32(&frame.text, &mut frame.pc)
    }

    fn read_u8(&mut self) -> VmResult<u8> {
        let frame = self.frame()?;
        read_u8(&frame.text, &mut frame.pc)
    }

    fn jump_relative(&mut self, displacement: u32) -> VmResult<()> {
        let frame = self.frame()?;
        frame.pc = jump_target(frame.pc, displacement);
        Ok(())
    }

    fn symbol(&mut self, slot: u32) -> VmResult<Cell> {
        self.frame()?
            .symbols
            .get(slot as usize)
            .cloned()
            .ok_or_else(|| RuntimeError::invalid_bytecode(format!("no symbol slot {}", slot)))
    }

    fn upvalue(&mut self, idx: u32) -> VmResult<Cell> {
        self.frame()?
            .upvalues
            .get(idx as usize)
            .cloned()
            .ok_or_else(|| RuntimeError::invalid_bytecode(format!("no upvalue {}", idx)))
    }

    fn unit_proto(&self, unit: UnitId) -> VmResult<Rc<Proto>> {
        self.proto(unit)
            .cloned()
            .ok_or_else(|| RuntimeError::invalid_bytecode(format!("unknown module {:?}", unit)))
    }

    // --- Dispatch ---

    fn execute_one(&mut self) -> VmResult<()> {
        let byte = self.read_u8()?;
        let op = Opcode::from_byte(byte)
            .ok_or_else(|| RuntimeError::invalid_bytecode(format!("unknown opcode {}", byte)))?;

        match op {
            Opcode::UnaryNot | Opcode::UnaryNeg | Opcode::UnaryLnot => {
                let value = self.pop()?;
                self.push(unary_op(op, value)?)?;
            }
            Opcode::BinaryAdd
            | Opcode::BinarySub
            | Opcode::BinaryMul
            | Opcode::BinaryDiv
            | Opcode::BinaryMod
            | Opcode::BinaryAnd
            | Opcode::BinaryXor
            | Opcode::BinaryOr
            | Opcode::BinaryIdiv
            | Opcode::BinaryShr
            | Opcode::BinaryShl
            | Opcode::BinaryLe
            | Opcode::BinaryGe
            | Opcode::BinaryLt
            | Opcode::BinaryGt
            | Opcode::BinaryEq
            | Opcode::BinaryNe
            | Opcode::BinaryLand
            | Opcode::BinaryLor => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(binary_op(op, a, b)?)?;
            }
            Opcode::BinaryAttr => {
                let key = self.pop()?;
                let obj = self.pop()?;
                self.push(get_attr(&obj, &key)?)?;
            }

            Opcode::LoadNil => self.push(Value::Nil)?,
            Opcode::LoadConst | Opcode::LoadStdConst => {
                let module = self.read_u32()?;
                let idx = self.read_u32()?;
                let unit = unit_of(op == Opcode::LoadStdConst, module);
                let proto = self.unit_proto(unit)?;
                let constant = proto.consts.get(idx as usize).ok_or_else(|| {
                    RuntimeError::invalid_bytecode(format!("no constant {} in {:?}", idx, unit))
                })?;
                self.push(Value::from(constant))?;
            }
            Opcode::LoadName => {
                let slot = self.read_u32()?;
                let value = self.symbol(slot)?.borrow().clone();
                self.push(value)?;
            }
            Opcode::LoadFunc | Opcode::LoadStdFunc => {
                let module = self.read_u32()?;
                let idx = self.read_u32()?;
                let closure = self.named_closure(unit_of(op == Opcode::LoadStdFunc, module), idx)?;
                self.push(Value::Closure(Rc::new(closure)))?;
            }
            Opcode::LoadBuiltin => {
                let idx = self.read_u32()?;
                if builtins::get(idx).is_none() {
                    return Err(RuntimeError::invalid_bytecode(format!("no builtin {}", idx)));
                }
                self.push(Value::Builtin(idx))?;
            }
            Opcode::LoadAnonymous | Opcode::LoadStdAnonymous => {
                let module = self.read_u32()?;
                let idx = self.read_u32()?;
                let unit = unit_of(op == Opcode::LoadStdAnonymous, module);
                let closure = self.anonymous_closure(unit, idx)?;
                self.push(Value::Closure(Rc::new(closure)))?;
            }
            Opcode::LoadUpvalue => {
                let idx = self.read_u32()?;
                let value = self.upvalue(idx)?.borrow().clone();
                self.push(value)?;
            }
            Opcode::LoadProto => {
                let module = self.read_u32()?;
                self.import(UnitId::User(module))?;
            }
            Opcode::LoadStdlib => {
                let lib = self.read_u32()?;
                self.import(UnitId::Stdlib(lib))?;
            }

            Opcode::StoreName => {
                let slot = self.read_u32()?;
                let value = self.pop()?;
                *self.symbol(slot)?.borrow_mut() = value;
            }
            Opcode::StoreUpvalue => {
                let idx = self.read_u32()?;
                let value = self.pop()?;
                *self.upvalue(idx)?.borrow_mut() = value;
            }
            Opcode::StoreKv => {
                let value = self.pop()?;
                let key = self.pop()?;
                let target = self
                    .frame()?
                    .symbols
                    .last()
                    .cloned()
                    .ok_or_else(|| RuntimeError::invalid_bytecode("STORE_KV with empty symbol table"))?;
                let target = target.borrow().clone();
                set_attr(&target, key, value, None)?;
            }
            Opcode::PushNameNil => self.frame()?.symbols.push(new_cell(Value::Nil)),
            Opcode::PushName => {
                let value = self.pop()?;
                self.frame()?.symbols.push(new_cell(value));
            }
            Opcode::CopyName => {
                let value = self.peek()?.clone();
                self.frame()?.symbols.push(new_cell(value));
            }
            Opcode::ResizeNametable => {
                let size = self.read_u32()? as usize;
                let symbols = &mut self.frame()?.symbols;
                if size <= symbols.len() {
                    symbols.truncate(size);
                } else {
                    symbols.resize_with(size, || new_cell(Value::Nil));
                }
            }

            Opcode::PopTop => {
                self.pop()?;
            }
            Opcode::Dup => {
                let value = self.peek()?.clone();
                self.push(value)?;
            }
            Opcode::RotTwo => {
                let stack = &mut self.context()?.stack;
                let len = stack.len();
                if len < 2 {
                    return Err(RuntimeError::StackUnderflow);
                }
                stack.swap(len - 1, len - 2);
            }
            Opcode::Stop => self.stopped = true,

            Opcode::SliceNew => {
                let n = self.read_u32()? as usize;
                let values = self.pop_n(n)?;
                self.push(Value::array(values))?;
            }
            Opcode::NewMap => {
                let n = self.read_u32()? as usize;
                let flat = self.pop_n(n * 2)?;
                let mut object = Object::with_capacity(n);
                let mut iter = flat.into_iter();
                while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
                    let key = HashKey::from_value(&key).ok_or_else(|| {
                        RuntimeError::type_error(format!("invalid map key type {}", key.type_name()))
                    })?;
                    object.set(key, value);
                }
                self.push(Value::object(object))?;
            }
            Opcode::NewEmptyMap => self.push(Value::object(Object::new()))?,

            Opcode::AttrAssign
            | Opcode::AttrAssignAddeq
            | Opcode::AttrAssignSubeq
            | Opcode::AttrAssignMuleq
            | Opcode::AttrAssignDiveq
            | Opcode::AttrAssignModeq
            | Opcode::AttrAssignAndeq
            | Opcode::AttrAssignXoreq
            | Opcode::AttrAssignOreq => {
                let obj = self.pop()?;
                let key = self.pop()?;
                let value = self.pop()?;
                set_attr(&obj, key, value, attr_assign_op(op))?;
            }
            Opcode::AttrAccess => {
                let obj = self.pop()?;
                let key = self.pop()?;
                self.push(get_attr(&obj, &key)?)?;
            }

            Opcode::JumpRel => {
                let disp = self.read_u32()?;
                self.jump_relative(disp)?;
            }
            Opcode::JumpAbs => {
                let addr = self.read_u32()?;
                self.frame()?.pc = addr as usize;
            }
            Opcode::JumpIf => {
                let disp = self.read_u32()?;
                if self.pop()?.is_truthy() {
                    self.jump_relative(disp)?;
                }
            }
            Opcode::JumpLand => {
                let disp = self.read_u32()?;
                if self.peek()?.is_truthy() {
                    self.pop()?;
                } else {
                    self.jump_relative(disp)?;
                }
            }
            Opcode::JumpLor => {
                let disp = self.read_u32()?;
                if self.peek()?.is_truthy() {
                    self.jump_relative(disp)?;
                } else {
                    self.pop()?;
                }
            }
            Opcode::JumpCase => {
                let disp = self.read_u32()?;
                let case = self.pop()?;
                if values_equal(self.peek()?, &case) {
                    self.jump_relative(disp)?;
                }
            }

            Opcode::Call => {
                let want = self.read_u8()? as usize;
                let argc = self.read_u8()? as usize;
                self.call_value(want, argc)?;
            }
            Opcode::Return => {
                let n = self.read_u32()? as usize;
                self.return_values(n)?;
            }
            Opcode::Export => self.export()?,

            Opcode::Try => {
                let disp = self.read_u32()?;
                let stack_len = self.context()?.stack.len();
                let frame = self.frame()?;
                let handler = TryHandler {
                    catch_pc: jump_target(frame.pc, disp),
                    symtab_len: frame.symbols.len(),
                    stack_len,
                };
                frame.handlers.push(handler);
            }
            Opcode::EndTry => {
                self.frame()?
                    .handlers
                    .pop()
                    .ok_or_else(|| RuntimeError::invalid_bytecode("END_TRY without TRY"))?;
            }
        }
        Ok(())
    }

    /// Named functions capture cells of their module's top-level table.
    fn named_closure(&mut self, unit: UnitId, idx: u32) -> VmResult<Closure> {
        let proto = self.unit_proto(unit)?;
        let func = proto.funcs.get(idx as usize).ok_or_else(|| {
            RuntimeError::invalid_bytecode(format!("no function {} in {:?}", idx, unit))
        })?;
        let table = self.module_table(unit)?;
        let upvalues = func
            .upvalues
            .iter()
            .map(|&slot| {
                table.get(slot as usize).cloned().ok_or_else(|| {
                    RuntimeError::new(format!(
                        "function '{}' refers to a top-level name that is not defined yet",
                        func.name
                    ))
                })
            })
            .collect::<VmResult<Vec<_>>>()?;
        Ok(Closure::new(func.info.clone(), upvalues))
    }

    fn anonymous_closure(&mut self, unit: UnitId, idx: u32) -> VmResult<Closure> {
        let proto = self.unit_proto(unit)?;
        let func = proto.anonymous_funcs.get(idx as usize).ok_or_else(|| {
            RuntimeError::invalid_bytecode(format!("no anonymous function {} in {:?}", idx, unit))
        })?;
        let frame = self.frame()?;
        let upvalues = func
            .upvalues
            .iter()
            .map(|ptr| {
                let source = if ptr.direct {
                    &frame.symbols
                } else {
                    &frame.upvalues
                };
                source.get(ptr.index as usize).cloned().ok_or_else(|| {
                    RuntimeError::invalid_bytecode(format!("bad upvalue pointer {:?}", ptr))
                })
            })
            .collect::<VmResult<Vec<_>>>()?;
        Ok(Closure::new(func.info.clone(), upvalues))
    }

    /// The top-level symbol table of `unit`: live while the module runs,
    /// saved once it has exported.
    fn module_table(&self, unit: UnitId) -> VmResult<&[Cell]> {
        if let Some(ctx) = self.contexts.iter().rev().find(|ctx| ctx.unit == unit) {
            if let Some(top) = ctx.frames.first() {
                return Ok(&top.symbols);
            }
        }
        self.module_symbols
            .get(&unit)
            .map(Vec::as_slice)
            .ok_or_else(|| RuntimeError::new(format!("module {:?} has not been loaded", unit)))
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new(), &Config::default())
    }
}

fn unit_of(stdlib: bool, idx: u32) -> UnitId {
    if stdlib {
        UnitId::Stdlib(idx)
    } else {
        UnitId::User(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{compile_file, compile_source};
    use crate::stdlib;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn execute(protos: Vec<Proto>, config: &Config) -> VmResult<Vec<String>> {
        let mut vm = Vm::new(protos, stdlib::compile_all().unwrap(), config);
        vm.capture_output();
        vm.run()?;
        Ok(vm.take_output())
    }

    fn run(source: &str) -> VmResult<Vec<String>> {
        let config = Config::default();
        execute(compile_source(source, "main.gs", &config).unwrap(), &config)
    }

    fn output(source: &str) -> Vec<String> {
        run(source).unwrap()
    }

    #[test]
    fn test_named_function_updates_top_level() {
        let source = "\
let count = 0
func inc() {
  count++
  return count
}
let a = inc()
let b = inc()
print(a, b, count)
";
        assert_eq!(output(source), vec!["1 2 2"]);
    }

    #[test]
    fn test_closure_keeps_its_counter() {
        let source = "\
func counter() {
  let n = 0
  return func() {
    n++
    return n
  }
}
let c = counter()
c()
print(c())
";
        assert_eq!(output(source), vec!["2"]);
    }

    #[test]
    fn test_upvalue_two_levels_out() {
        let source = "\
func outer() {
  let x = 1
  let mid = func() {
    let inner = func() {
      x = x + 10
      return x
    }
    return inner()
  }
  return mid(), x
}
let r, x = outer()
print(r, x)
";
        assert_eq!(output(source), vec!["11 11"]);
    }

    #[test]
    fn test_switch_fallthrough_runs_default_once() {
        let source = "\
switch (2) {
case 1:
  print(\"one\")
case 2, 3:
  print(\"two\")
  fallthrough
default:
  print(\"default\")
}
print(\"done\")
";
        assert_eq!(output(source), vec!["two", "default", "done"]);
    }

    #[test]
    fn test_switch_without_match_or_default() {
        let source = "\
switch (\"x\") {
case \"y\":
  print(\"y\")
}
print(\"after\")
";
        assert_eq!(output(source), vec!["after"]);
    }

    #[test]
    fn test_call_arity_defaults_variadic_and_truncation() {
        let source = "\
func f(a, b = 2, ...rest) {
  return a + b, len(rest)
}
let x, y = f(1)
print(x, y)
let p, q = f(1, 5, 7, 8)
print(p, q)
let only = f(3)
print(only)
let u, v, w = f(1)
print(w)
";
        assert_eq!(output(source), vec!["3 0", "6 2", "5", "nil"]);
    }

    #[test]
    fn test_throw_unwinds_through_frames() {
        let source = "\
func fail(v) {
  throw(\"bad \" + v)
}
func middle() {
  try {
    fail(1)
  }
  catch (e) {
    throw(e + \"!\")
  }
}
try {
  middle()
  print(\"unreachable\")
}
catch (e) {
  print(e)
}
print(\"after\")
";
        assert_eq!(output(source), vec!["bad 1!", "after"]);
    }

    #[test]
    fn test_break_out_of_try_closes_handler() {
        let source = "\
let i = 0
while (true) {
  try {
    i++
    if (i == 3) {
      break
    }
  }
  catch (e) {
    print(\"loop caught\", e)
  }
}
try {
  throw(\"late\")
}
catch (e) {
  print(e, i)
}
";
        assert_eq!(output(source), vec!["late 3"]);
    }

    #[test]
    fn test_block_scope_is_truncated() {
        let source = "\
let a = 1
if (true) {
  let b = 2
  a = a + b
}
let c = 10
print(a, c)
";
        assert_eq!(output(source), vec!["3 10"]);
    }

    #[test]
    fn test_for_continue_and_goto() {
        let source = "\
let total = 0
for (let i = 0; i < 5; i++) {
  if (i == 2) {
    continue
  }
  total += i
}
let n = 0
top:
n++
if (n < 3) {
  goto top
}
print(total, n)
";
        assert_eq!(output(source), vec!["8 3"]);
    }

    #[test]
    fn test_class_fields_constructor_and_methods() {
        let source = "\
class Point {
  x = 0
  y = 0
  __self(x, y) {
    this.x = x
    this.y = y
  }
  sum() {
    return this.x + this.y
  }
}
let p = new Point(3, 4)
p.x += 1
print(p.sum(), p.x)
";
        assert_eq!(output(source), vec!["8 4"]);
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(
            output("print(\"a\" + 1, 1 + \"b\", \"x\" + 2.5)"),
            vec!["a1 1b x2.5"]
        );
    }

    #[test]
    fn test_uncaught_throw_is_fatal() {
        let err = run("print(\"before\")\nthrow(\"boom\")\nprint(\"never\")").unwrap_err();
        assert!(matches!(err.root(), RuntimeError::UncaughtException(msg) if msg == "boom"));
        assert!(err.to_string().contains("main.gs"));
    }

    #[test]
    fn test_call_depth_limit() {
        let config = Config {
            max_call_depth: 50,
            ..Config::default()
        };
        let protos = compile_source("func f() {\n  return f()\n}\nf()\n", "main.gs", &config).unwrap();
        let err = execute(protos, &config).unwrap_err();
        assert!(matches!(err.root(), RuntimeError::CallDepthExceeded(50)));
    }

    #[test]
    fn test_stdlib_buffer_and_os() {
        let source = "\
import Buffer, os
let b = Buffer.alloc(4)
b.write(0, \"u32\", 258)
print(b.len(), b.read(0, \"u32\"), b.read(0, \"u8\"))
os.setenv(\"GSC_VM_TEST_VALUE\", \"yes\")
print(os.getenv(\"GSC_VM_TEST_VALUE\"))
";
        assert_eq!(output(source), vec!["4 258 2", "yes"]);
    }

    #[test]
    fn test_exit_stops_the_vm() {
        let config = Config::default();
        let protos = compile_source("print(1)\n__exit(3)\nprint(2)\n", "main.gs", &config).unwrap();
        let mut vm = Vm::new(protos, stdlib::compile_all().unwrap(), &config);
        vm.capture_output();
        vm.run().unwrap();
        assert_eq!(vm.exit_code(), Some(3));
        assert_eq!(vm.take_output(), vec!["1"]);
    }

    #[test]
    fn test_module_body_runs_once() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("main.gs"),
            "import \"./counter\", \"./counter\" as a, b\na.n = 5\nprint(b.n)\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("counter.gs"),
            "print(\"loading\")\nexport {n: 1}\n",
        )
        .unwrap();

        let config = Config::default();
        let protos = compile_file(&dir.path().join("main.gs"), &config).unwrap();
        assert_eq!(execute(protos, &config).unwrap(), vec!["loading", "5"]);
    }

    #[test]
    fn test_named_function_sees_its_own_top_level_slot() {
        let source = "\
func f() {
  return y
}
if (true) {
  let tmp = 5
  print(f())
}
let y = 2
print(f())
";
        assert_eq!(output(source), vec!["nil", "2"]);
    }

    #[test]
    fn test_zero_returns_fill_with_nil() {
        let source = "\
func nothing() {
  let unused = 1
}
let a, b = nothing()
print(a, b)
";
        assert_eq!(output(source), vec!["nil nil"]);
    }

    #[test]
    fn test_sibling_closures_share_a_cell() {
        let source = "\
func pair() {
  let n = 0
  let inc = func() {
    n++
  }
  let get = func() {
    return n
  }
  return inc, get
}
let inc, get = pair()
inc()
inc()
print(get())
";
        assert_eq!(output(source), vec!["2"]);
    }

    #[test]
    fn test_break_closes_every_try_it_leaves() {
        let source = "\
let i = 0
try {
  while (true) {
    try {
      try {
        i++
        break
      }
      catch (e) {
        print(\"inner\", e)
      }
    }
    catch (e) {
      print(\"middle\", e)
    }
  }
  throw(\"kept\")
}
catch (e) {
  print(\"outer\", e, i)
}
";
        assert_eq!(output(source), vec!["outer kept 1"]);
    }

    #[test]
    fn test_symbol_table_matches_slot_count_after_blocks() {
        let source = "\
let a = 1
for (let i = 0; i < 3; i++) {
  let t = i
  if (t == 1) {
    break
  }
}
while (true) {
  let w = 1
  break
}
again:
if (a < 3) {
  let inner = a
  a++
  goto again
}
let last = 0
print(a, last)
";
        let config = Config::default();
        let protos = compile_source(source, "main.gs", &config).unwrap();
        let mut vm = Vm::new(protos, stdlib::compile_all().unwrap(), &config);
        vm.capture_output();

        // `print` is the only builtin load; stop just before it.
        let mut at_print = None;
        while !vm.is_stopped() {
            let frame = vm.contexts().last().and_then(|ctx| ctx.frames.last()).unwrap();
            if Opcode::from_byte(frame.text[frame.pc]) == Some(Opcode::LoadBuiltin) {
                at_print = Some(frame.symbols.len());
            }
            vm.step().unwrap();
        }
        // Only `a` and `last` live at top level.
        assert_eq!(at_print, Some(2));
        assert_eq!(vm.take_output(), vec!["3 0"]);
    }

    #[test]
    fn test_self_referencing_array_prints() {
        let source = "\
let a = [1]
append(a, a)
print(len(a))
print(a)
";
        assert_eq!(output(source), vec!["2", "[1, [...]]"]);
    }

    #[test]
    fn test_oversized_buffer_is_catchable() {
        let source = "\
try {
  __buffer_new(4611686018427387904)
}
catch (e) {
  print(\"caught\")
}
";
        assert_eq!(output(source), vec!["caught"]);

        let config = Config {
            max_buffer_size: 16,
            ..Config::default()
        };
        let source = "\
import Buffer
try {
  Buffer.alloc(17)
}
catch (e) {
  print(e)
}
print(Buffer.alloc(16).len())
";
        let protos = compile_source(source, "main.gs", &config).unwrap();
        assert_eq!(
            execute(protos, &config).unwrap(),
            vec!["buffer of 17 bytes exceeds the limit of 16 bytes", "16"]
        );
    }
}
