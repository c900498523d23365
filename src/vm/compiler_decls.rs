//! Declarations hoisted out of the statement stream: enums, classes,
//! imports and named functions.

use std::mem;

use crate::ast::{ClassDecl, EnumDecl, FunctionLiteral};

use super::compiler::{CompileResult, Compiler, FrameState, ImportBinding, UnitId};
use super::opcode::Opcode;
use super::proto::{AnonymousFuncProto, Constant, FuncProto};

impl Compiler {
    pub fn compile_enums(&mut self, enums: &[EnumDecl]) -> CompileResult<()> {
        for decl in enums {
            for (name, value) in &decl.variants {
                self.save_enum(name, *value, decl.span)?;
            }
        }
        Ok(())
    }

    /// Classes take the first anonymous-function slots, in declaration
    /// order, so `new` can refer to any class before its body is compiled.
    pub fn compile_classes(&mut self, classes: &[ClassDecl]) -> CompileResult<()> {
        for (i, class) in classes.iter().enumerate() {
            if self.classes.insert(class.name.clone(), i as u32).is_some() {
                return Err(self.error(
                    format!("class '{}' is already declared", class.name),
                    class.span,
                ));
            }
            self.anonymous_funcs.push(None);
        }
        for (i, class) in classes.iter().enumerate() {
            self.compile_class(i, class)?;
        }
        Ok(())
    }

    /// A class compiles to a constructor closure run against a fresh object:
    /// bind the arguments, bind `this`, store every field, then run the
    /// `__self` body. Class bodies see no enclosing locals.
    fn compile_class(&mut self, idx: usize, class: &ClassDecl) -> CompileResult<()> {
        let outer = mem::replace(&mut self.frame, FrameState::new());
        let result = self.compile_class_body(class);
        let frame = mem::replace(&mut self.frame, outer);
        result?;

        let (params, variadic) = match &class.constructor {
            Some(ctor) => (ctor.params.as_slice(), ctor.variadic.is_some()),
            None => (&[][..], false),
        };
        let info = self.function_info(params, variadic, frame.chunk.code);
        self.anonymous_funcs[idx] = Some(AnonymousFuncProto {
            upvalues: Vec::new(),
            info,
        });
        Ok(())
    }

    fn compile_class_body(&mut self, class: &ClassDecl) -> CompileResult<()> {
        if let Some(ctor) = &class.constructor {
            self.collect_args(ctor)?;
        }
        self.emit(Opcode::CopyName);
        self.declare("this", class.span)?;

        for (name, value) in &class.fields {
            self.emit_constant(Constant::String(name.clone()));
            self.compile_expr(value, 1)?;
            self.emit(Opcode::StoreKv);
        }

        match &class.constructor {
            Some(ctor) => {
                self.compile_statements(&ctor.body)?;
                self.emit_implicit_return(&ctor.body);
            }
            None => {
                self.emit_u32(Opcode::Return, 0);
            }
        }
        Ok(())
    }

    /// Each import runs its unit and binds the exported value to the alias.
    pub fn compile_imports(&mut self, imports: &[ImportBinding]) -> CompileResult<()> {
        for import in imports {
            match import.unit {
                UnitId::User(n) => self.emit_u32(Opcode::LoadProto, n),
                UnitId::Stdlib(n) => self.emit_u32(Opcode::LoadStdlib, n),
            };
            self.push_name(&import.alias, import.span)?;
        }
        Ok(())
    }

    /// Named functions are compiled after the module body, nested in the
    /// top-level frame. All of their upvalues are top-level slots.
    pub fn compile_named_function(
        &mut self,
        idx: usize,
        name: &str,
        func: &FunctionLiteral,
    ) -> CompileResult<()> {
        let frame = self.compile_function_frame(func)?;
        let upvalues = frame.upvalues.iter().map(|uv| uv.slot).collect();
        let info = self.function_info(&func.params, func.variadic.is_some(), frame.chunk.code);
        self.funcs[idx] = Some(FuncProto {
            name: name.to_string(),
            upvalues,
            info,
        });
        Ok(())
    }
}
