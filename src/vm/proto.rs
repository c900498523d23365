//! Compiled units: constants, function descriptors and module protos.

use std::fmt;
use std::rc::Rc;

/// A constant-pool entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Nil => write!(f, "nil"),
            Constant::Bool(b) => write!(f, "{}", b),
            Constant::Int(n) => write!(f, "{}", n),
            Constant::Float(n) => write!(f, "{}", n),
            Constant::String(s) => write!(f, "{:?}", s),
        }
    }
}

/// A declared parameter and the value used when the caller omits it.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub default: Constant,
}

/// What every function body carries regardless of how it is referenced.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionInfo {
    pub params: Vec<Parameter>,
    pub variadic: bool,
    pub text: Rc<[u8]>,
}

/// A named top-level function. Its upvalues are slots of the defining
/// module's top-level symbol table.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncProto {
    pub name: String,
    pub upvalues: Vec<u32>,
    pub info: Rc<FunctionInfo>,
}

/// Where an anonymous function's upvalue comes from when the closure is
/// created: a slot of the creating frame (`direct`) or one of the creating
/// closure's own upvalues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpvaluePtr {
    pub direct: bool,
    pub index: u32,
}

/// A function literal or class constructor.
#[derive(Debug, Clone, PartialEq)]
pub struct AnonymousFuncProto {
    pub upvalues: Vec<UpvaluePtr>,
    pub info: Rc<FunctionInfo>,
}

/// A compiled module.
#[derive(Debug, Clone, PartialEq)]
pub struct Proto {
    pub file_path: String,
    pub consts: Vec<Constant>,
    pub funcs: Vec<FuncProto>,
    pub anonymous_funcs: Vec<AnonymousFuncProto>,
    pub text: Rc<[u8]>,
}
