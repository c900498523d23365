//! AST-to-bytecode compiler.
//!
//! A single walk over the AST emits instructions into one [`Chunk`] per
//! function body. Names resolve at compile time to symbol-table slots,
//! upvalues, named functions, enum constants or builtins. The slot counter
//! of a frame is shared by all of its nested scopes and reset on block exit;
//! the VM mirrors that with `RESIZE_NAMETABLE`.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{Literal, Parameter as AstParameter, Program, Stmt, StmtKind};
use crate::error::CompileError;
use crate::span::Span;

use super::builtins;
use super::chunk::Chunk;
use super::opcode::Opcode;
use super::proto::{AnonymousFuncProto, Constant, FuncProto, FunctionInfo, Parameter, Proto};

/// Result type for compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// A compiled unit: a user module or a standard-library module. The two
/// live in separate tables and use separate load opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitId {
    User(u32),
    Stdlib(u32),
}

impl UnitId {
    pub fn index(self) -> u32 {
        match self {
            UnitId::User(n) | UnitId::Stdlib(n) => n,
        }
    }

    pub fn is_stdlib(self) -> bool {
        matches!(self, UnitId::Stdlib(_))
    }
}

/// An import already resolved to a unit.
#[derive(Debug, Clone)]
pub struct ImportBinding {
    pub unit: UnitId,
    pub alias: String,
    pub span: Span,
}

/// A captured variable of the frame being compiled. `level` counts frames
/// above the parent: 0 means the variable is a slot of the parent frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upvalue {
    pub name: String,
    pub level: u32,
    pub slot: u32,
}

#[derive(Debug, Clone)]
pub struct LoopBlock {
    /// Slot count inside the loop header, restored on break and continue.
    pub name_count: u32,
    pub try_level: usize,
    pub breaks: Vec<usize>,
    pub continues: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct SwitchBlock {
    pub name_count: u32,
    pub try_level: usize,
    pub breaks: Vec<usize>,
    pub fallthroughs: Vec<usize>,
}

/// Statements that `break` can leave.
#[derive(Debug, Clone)]
pub enum Breakable {
    Loop(LoopBlock),
    Switch(SwitchBlock),
}

#[derive(Debug, Clone, Copy)]
pub struct Label {
    pub addr: usize,
    pub name_count: u32,
    pub switch_depth: usize,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct PendingGoto {
    pub label: String,
    pub resize_at: usize,
    pub jump_at: usize,
    pub switch_depth: usize,
    pub span: Span,
}

/// Per-function compilation state.
#[derive(Debug, Default)]
pub struct FrameState {
    pub chunk: Chunk,
    /// Scope chain, innermost last.
    pub scopes: Vec<HashMap<String, u32>>,
    pub slot_count: u32,
    pub upvalues: Vec<Upvalue>,
    pub blocks: Vec<Breakable>,
    /// Labels per statement list, innermost last.
    pub labels: Vec<HashMap<String, Label>>,
    /// Slots fixed for top-level `let` names before the body runs.
    pub reserved: HashMap<String, u32>,
    pub try_level: usize,
    pub enclosing: Option<Box<FrameState>>,
}

impl FrameState {
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
            ..Default::default()
        }
    }

    fn lookup(&self, name: &str) -> Option<u32> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn find_upvalue(&self, name: &str) -> Option<u32> {
        self.upvalues
            .iter()
            .position(|uv| uv.name == name)
            .map(|i| i as u32)
    }

    /// Register an upvalue, reusing an identical entry.
    pub fn add_upvalue(&mut self, upvalue: Upvalue) -> u32 {
        if let Some(i) = self.upvalues.iter().position(|uv| *uv == upvalue) {
            return i as u32;
        }
        self.upvalues.push(upvalue);
        (self.upvalues.len() - 1) as u32
    }

    pub(crate) fn switch_depth(&self) -> usize {
        self.blocks
            .iter()
            .filter(|b| matches!(b, Breakable::Switch(_)))
            .count()
    }
}

/// Constant-pool key; floats by bits so the pool can be deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstKey {
    Nil,
    Bool(bool),
    Int(i64),
    Float(u64),
    String(String),
}

impl From<&Constant> for ConstKey {
    fn from(c: &Constant) -> Self {
        match c {
            Constant::Nil => ConstKey::Nil,
            Constant::Bool(b) => ConstKey::Bool(*b),
            Constant::Int(n) => ConstKey::Int(*n),
            Constant::Float(n) => ConstKey::Float(n.to_bits()),
            Constant::String(s) => ConstKey::String(s.clone()),
        }
    }
}

/// How a name resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum NameAccess {
    Local(u32),
    Upvalue(u32),
    Func(u32),
    Enum(u32),
    Builtin(u32),
}

/// The compiler for one unit.
pub struct Compiler {
    pub file: String,
    pub unit: UnitId,
    consts: Vec<Constant>,
    const_index: HashMap<ConstKey, u32>,
    enums: HashMap<String, u32>,
    /// Named functions: name to index, filled in declaration order.
    func_index: HashMap<String, u32>,
    pub(crate) funcs: Vec<Option<FuncProto>>,
    pub(crate) anonymous_funcs: Vec<Option<AnonymousFuncProto>>,
    pub(crate) classes: HashMap<String, u32>,
    pub frame: FrameState,
}

impl Compiler {
    pub fn new(file: impl Into<String>, unit: UnitId) -> Self {
        Self {
            file: file.into(),
            unit,
            consts: Vec::new(),
            const_index: HashMap::new(),
            enums: HashMap::new(),
            func_index: HashMap::new(),
            funcs: Vec::new(),
            anonymous_funcs: Vec::new(),
            classes: HashMap::new(),
            frame: FrameState::new(),
        }
    }

    /// Compile a parsed module. The main module ends with `STOP`, every other
    /// unit with `EXPORT`.
    pub fn compile(
        program: &Program,
        imports: &[ImportBinding],
        unit: UnitId,
        file: &str,
    ) -> CompileResult<Proto> {
        let mut compiler = Compiler::new(file, unit);
        tracing::debug!(file, ?unit, "compiling module");

        for (i, func) in program.functions.iter().enumerate() {
            if compiler
                .func_index
                .insert(func.name.clone(), i as u32)
                .is_some()
            {
                return Err(compiler.error(
                    format!("function '{}' is already declared", func.name),
                    func.span,
                ));
            }
            compiler.funcs.push(None);
        }

        compiler.compile_enums(&program.enums)?;
        compiler.compile_classes(&program.classes)?;
        compiler.compile_imports(imports)?;
        compiler.reserve_top_level(&program.statements);
        compiler.compile_statements(&program.statements)?;

        if unit == UnitId::User(0) {
            compiler.emit(Opcode::Stop);
        } else {
            match &program.export {
                Some(expr) => compiler.compile_expr(expr, 1)?,
                None => {
                    compiler.emit(Opcode::LoadNil);
                }
            }
            compiler.emit(Opcode::Export);
        }

        for (i, func) in program.functions.iter().enumerate() {
            compiler.compile_named_function(i, &func.name, &func.func)?;
        }

        let proto = compiler.finish()?;
        tracing::debug!(
            file,
            consts = proto.consts.len(),
            funcs = proto.funcs.len(),
            anonymous = proto.anonymous_funcs.len(),
            "compiled module"
        );
        Ok(proto)
    }

    fn finish(self) -> CompileResult<Proto> {
        let missing = || CompileError::new("function body was never compiled", &self.file, Span::default());
        let funcs = self
            .funcs
            .iter()
            .cloned()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(missing)?;
        let anonymous_funcs = self
            .anonymous_funcs
            .iter()
            .cloned()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(missing)?;
        Ok(Proto {
            file_path: self.file.clone(),
            consts: self.consts.clone(),
            funcs,
            anonymous_funcs,
            text: self.frame.chunk.code.clone().into(),
        })
    }

    pub fn error(&self, message: impl Into<String>, span: Span) -> CompileError {
        CompileError::new(message, &self.file, span)
    }

    // --- Emit helpers ---

    pub fn emit(&mut self, op: Opcode) -> usize {
        self.frame.chunk.emit(op)
    }

    pub fn emit_u32(&mut self, op: Opcode, operand: u32) -> usize {
        self.frame.chunk.emit_u32(op, operand)
    }

    pub fn emit_jump(&mut self, op: Opcode) -> usize {
        self.frame.chunk.emit_jump(op)
    }

    pub fn emit_jump_to(&mut self, op: Opcode, target: usize) {
        self.frame.chunk.emit_jump_to(op, target)
    }

    pub fn patch_jump(&mut self, at: usize) {
        self.frame.chunk.patch_jump(at)
    }

    pub fn patch_jump_to(&mut self, at: usize, target: usize) {
        self.frame.chunk.patch_jump_to(at, target)
    }

    pub fn current_offset(&self) -> usize {
        self.frame.chunk.len()
    }

    pub fn emit_call(&mut self, want: usize, argc: usize, span: Span) -> CompileResult<()> {
        let want = u8::try_from(want)
            .map_err(|_| self.error("too many return values requested", span))?;
        let argc =
            u8::try_from(argc).map_err(|_| self.error("too many call arguments (max 255)", span))?;
        self.frame.chunk.emit_call(want, argc);
        Ok(())
    }

    /// Pick the user or stdlib flavour of a unit-qualified load.
    fn unit_op(&self, user: Opcode, stdlib: Opcode) -> Opcode {
        if self.unit.is_stdlib() {
            stdlib
        } else {
            user
        }
    }

    pub fn add_constant(&mut self, constant: Constant) -> u32 {
        let key = ConstKey::from(&constant);
        if let Some(&idx) = self.const_index.get(&key) {
            return idx;
        }
        let idx = self.consts.len() as u32;
        self.consts.push(constant);
        self.const_index.insert(key, idx);
        idx
    }

    pub fn emit_constant(&mut self, constant: Constant) {
        let idx = self.add_constant(constant);
        self.emit_const_index(idx);
    }

    fn emit_const_index(&mut self, idx: u32) {
        let op = self.unit_op(Opcode::LoadConst, Opcode::LoadStdConst);
        let unit = self.unit.index();
        self.frame.chunk.emit_u32_pair(op, unit, idx);
    }

    pub fn emit_load_anonymous(&mut self, idx: u32) {
        let op = self.unit_op(Opcode::LoadAnonymous, Opcode::LoadStdAnonymous);
        let unit = self.unit.index();
        self.frame.chunk.emit_u32_pair(op, unit, idx);
    }

    /// Enum values get their own pool entries, outside deduplication.
    pub fn save_enum(&mut self, name: &str, value: i64, span: Span) -> CompileResult<()> {
        if self.enums.contains_key(name) {
            return Err(self.error(format!("enum '{}' is already declared", name), span));
        }
        self.enums.insert(name.to_string(), self.consts.len() as u32);
        self.consts.push(Constant::Int(value));
        Ok(())
    }

    // --- Scope management ---

    pub fn enter_block(&mut self) -> u32 {
        self.frame.scopes.push(HashMap::new());
        self.frame.slot_count
    }

    /// Pop the innermost scope and reset the slot counter. Returns whether the
    /// scope declared any names.
    pub fn pop_scope(&mut self, size: u32) -> bool {
        self.frame.scopes.pop();
        let declared = self.frame.slot_count > size;
        self.frame.slot_count = size;
        declared
    }

    pub fn leave_block(&mut self, size: u32) {
        if self.pop_scope(size) {
            self.emit_u32(Opcode::ResizeNametable, size);
        }
    }

    /// Bind `name` to the next slot of the innermost scope.
    pub fn declare(&mut self, name: &str, span: Span) -> CompileResult<u32> {
        let slot = self.frame.slot_count;
        self.bind(name, slot, span)?;
        self.frame.slot_count += 1;
        Ok(slot)
    }

    fn bind(&mut self, name: &str, slot: u32, span: Span) -> CompileResult<()> {
        let scope = self
            .frame
            .scopes
            .last_mut()
            .ok_or_else(|| CompileError::new("no open scope", &self.file, span))?;
        if scope.contains_key(name) {
            return Err(self.error(
                format!("variable '{}' is already declared in this scope", name),
                span,
            ));
        }
        scope.insert(name.to_string(), slot);
        Ok(())
    }

    /// Named functions capture top-level cells by slot, so every top-level
    /// `let` name gets its slot before the body runs. Block locals always
    /// land above this range.
    pub fn reserve_top_level(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            let StmtKind::Let { names, .. } = &stmt.kind else {
                continue;
            };
            for name in names {
                if self.frame.reserved.contains_key(name) {
                    continue;
                }
                let slot = self.frame.slot_count;
                self.frame.reserved.insert(name.clone(), slot);
                self.frame.slot_count += 1;
                self.emit(Opcode::PushNameNil);
            }
        }
    }

    /// Bind a `let` name: top-level names store into their reserved slot,
    /// everything else pushes a new one.
    pub fn bind_let(&mut self, name: &str, span: Span) -> CompileResult<()> {
        let reserved = match self.frame.scopes.len() {
            1 => self.frame.reserved.get(name).copied(),
            _ => None,
        };
        match reserved {
            Some(slot) => {
                self.bind(name, slot, span)?;
                self.emit_u32(Opcode::StoreName, slot);
                Ok(())
            }
            None => self.push_name(name, span),
        }
    }

    /// `PUSH_NAME` and bind.
    pub fn push_name(&mut self, name: &str, span: Span) -> CompileResult<()> {
        self.emit(Opcode::PushName);
        self.declare(name, span)?;
        Ok(())
    }

    // --- Name resolution ---

    /// Look `name` up in the enclosing frames and register it as an upvalue
    /// of the current frame.
    fn resolve_upvalue(&mut self, name: &str) -> Option<u32> {
        if let Some(idx) = self.frame.find_upvalue(name) {
            return Some(idx);
        }
        let mut level = 0;
        let mut ancestor = self.frame.enclosing.as_deref();
        while let Some(frame) = ancestor {
            if let Some(slot) = frame.lookup(name) {
                return Some(self.frame.add_upvalue(Upvalue {
                    name: name.to_string(),
                    level,
                    slot,
                }));
            }
            level += 1;
            ancestor = frame.enclosing.as_deref();
        }
        None
    }

    pub fn resolve_name(&mut self, name: &str) -> Option<NameAccess> {
        if let Some(slot) = self.frame.lookup(name) {
            return Some(NameAccess::Local(slot));
        }
        if let Some(idx) = self.resolve_upvalue(name) {
            return Some(NameAccess::Upvalue(idx));
        }
        if let Some(&idx) = self.func_index.get(name) {
            return Some(NameAccess::Func(idx));
        }
        if let Some(&idx) = self.enums.get(name) {
            return Some(NameAccess::Enum(idx));
        }
        builtins::index_of(name).map(NameAccess::Builtin)
    }

    pub fn load_name(&mut self, name: &str, span: Span) -> CompileResult<()> {
        match self.resolve_name(name) {
            Some(NameAccess::Local(slot)) => {
                self.emit_u32(Opcode::LoadName, slot);
            }
            Some(NameAccess::Upvalue(idx)) => {
                self.emit_u32(Opcode::LoadUpvalue, idx);
            }
            Some(NameAccess::Func(idx)) => {
                let op = self.unit_op(Opcode::LoadFunc, Opcode::LoadStdFunc);
                let unit = self.unit.index();
                self.frame.chunk.emit_u32_pair(op, unit, idx);
            }
            Some(NameAccess::Enum(idx)) => self.emit_const_index(idx),
            Some(NameAccess::Builtin(idx)) => {
                self.emit_u32(Opcode::LoadBuiltin, idx);
            }
            None => return Err(self.error(format!("undefined name '{}'", name), span)),
        }
        Ok(())
    }

    pub fn store_name(&mut self, name: &str, span: Span) -> CompileResult<()> {
        if let Some(slot) = self.frame.lookup(name) {
            self.emit_u32(Opcode::StoreName, slot);
            return Ok(());
        }
        if let Some(idx) = self.resolve_upvalue(name) {
            self.emit_u32(Opcode::StoreUpvalue, idx);
            return Ok(());
        }
        match self.resolve_name(name) {
            Some(_) => Err(self.error(format!("can not assign to '{}'", name), span)),
            None => Err(self.error(format!("undefined name '{}'", name), span)),
        }
    }

    // --- Frames ---

    pub fn push_frame(&mut self) {
        let parent = std::mem::replace(&mut self.frame, FrameState::new());
        self.frame.enclosing = Some(Box::new(parent));
    }

    /// Restore the enclosing frame and return the finished one.
    pub fn pop_frame(&mut self) -> FrameState {
        let parent = self.frame.enclosing.take().map(|b| *b).unwrap_or_default();
        std::mem::replace(&mut self.frame, parent)
    }

    pub fn function_info(
        &self,
        params: &[AstParameter],
        variadic: bool,
        text: Vec<u8>,
    ) -> Rc<FunctionInfo> {
        Rc::new(FunctionInfo {
            params: params
                .iter()
                .map(|p| Parameter {
                    name: p.name.clone(),
                    default: p.default.as_ref().map_or(Constant::Nil, literal_constant),
                })
                .collect(),
            variadic,
            text: text.into(),
        })
    }
}

pub fn literal_constant(literal: &Literal) -> Constant {
    match literal {
        Literal::Nil => Constant::Nil,
        Literal::Bool(b) => Constant::Bool(*b),
        Literal::Int(n) => Constant::Int(*n),
        Literal::Float(n) => Constant::Float(*n),
        Literal::String(s) => Constant::String(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Scanner;
    use crate::parser::Parser;
    use crate::vm::proto::UpvaluePtr;
    use pretty_assertions::assert_eq;

    fn compile(source: &str) -> CompileResult<Proto> {
        let tokens = Scanner::new(source).scan_tokens().unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        Compiler::compile(&program, &[], UnitId::User(0), "main.gs")
    }

    fn compile_err(source: &str) -> String {
        compile(source).unwrap_err().to_string()
    }

    #[test]
    fn test_let_and_call_bytecode() {
        let proto = compile("let a = 40\nprint(a)").unwrap();

        let mut expected = vec![Opcode::PushNameNil as u8, Opcode::LoadConst as u8];
        expected.extend(0u32.to_le_bytes());
        expected.extend(0u32.to_le_bytes());
        expected.push(Opcode::StoreName as u8);
        expected.extend(0u32.to_le_bytes());
        expected.push(Opcode::LoadName as u8);
        expected.extend(0u32.to_le_bytes());
        expected.push(Opcode::LoadBuiltin as u8);
        expected.extend(0u32.to_le_bytes());
        expected.extend([Opcode::Call as u8, 0, 1, Opcode::Stop as u8]);

        assert_eq!(&proto.text[..], &expected[..]);
        assert_eq!(proto.consts, vec![Constant::Int(40)]);
    }

    #[test]
    fn test_constants_are_deduplicated() {
        let proto = compile("let a = \"x\"\nlet b = \"x\"\nlet c = 1\nlet d = 1.0").unwrap();
        assert_eq!(
            proto.consts,
            vec![
                Constant::String("x".to_string()),
                Constant::Int(1),
                Constant::Float(1.0)
            ]
        );
    }

    #[test]
    fn test_imported_module_ends_with_export() {
        let tokens = Scanner::new("export 1").scan_tokens().unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        let proto = Compiler::compile(&program, &[], UnitId::User(1), "lib.gs").unwrap();
        assert_eq!(proto.text.last(), Some(&(Opcode::Export as u8)));
    }

    #[test]
    fn test_undefined_name() {
        assert!(compile_err("print(nope)").contains("undefined name 'nope'"));
    }

    #[test]
    fn test_duplicate_declarations() {
        assert!(compile_err("let a = 1\nlet a = 2").contains("variable 'a' is already declared"));
        assert!(compile_err("func f() {}\nfunc f() {}").contains("function 'f' is already declared"));
        assert!(compile_err("enum {\n  A\n}\nenum {\n  A\n}").contains("enum 'A' is already declared"));
    }

    #[test]
    fn test_shadowing_in_nested_block_is_allowed() {
        assert!(compile("let a = 1\nif (a) {\n  let a = 2\n  print(a)\n}").is_ok());
    }

    #[test]
    fn test_goto_rules() {
        assert!(compile_err("goto nowhere").contains("invalid goto label 'nowhere'"));
        assert!(compile_err("x:\ntry {\n  goto x\n}\ncatch (e) {\n}")
            .contains("goto statement in try block is not allowed"));
        assert!(compile_err("top:\nswitch (1) {\ncase 1:\n  goto top\n}")
            .contains("can not cross a switch statement"));
        assert!(compile_err("top:\nprint(1)\ntop:\nprint(2)").contains("label 'top' is already declared"));
    }

    #[test]
    fn test_misplaced_control_flow() {
        assert!(compile_err("break").contains("no matched switch or loop statement for break"));
        assert!(compile_err("continue").contains("no matched loop statement for continue"));
        assert!(compile_err("switch (1) {\ncase 1:\n  fallthrough\n}")
            .contains("fallthrough should not appear at last case"));
    }

    #[test]
    fn test_loop_statement_is_rejected() {
        assert!(compile_err("let obj = {}\nloop (let k, v : obj) {\n  print(k)\n}")
            .contains("loop statement is not supported"));
    }

    #[test]
    fn test_class_body_cannot_see_top_level_locals() {
        let err = compile_err("let x = 1\nclass A {\n  get() {\n    return x\n  }\n}");
        assert!(err.contains("undefined name 'x'"));
        assert!(compile("func helper() {\n  return 1\n}\nclass A {\n  get() {\n    return helper()\n  }\n}").is_ok());
    }

    #[test]
    fn test_upvalue_pointers() {
        let proto = compile(
            "func outer() {\n  let x = 1\n  return func() {\n    return func() {\n      return x\n    }\n  }\n}",
        )
        .unwrap();
        let ptrs: Vec<Vec<UpvaluePtr>> = proto
            .anonymous_funcs
            .iter()
            .map(|f| f.upvalues.clone())
            .collect();
        // The outer literal is reserved first; it forwards `x` as its own upvalue 0.
        assert_eq!(
            ptrs,
            vec![
                vec![UpvaluePtr { direct: true, index: 0 }],
                vec![UpvaluePtr { direct: false, index: 0 }],
            ]
        );
    }
}
