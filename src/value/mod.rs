//! Runtime values.

mod buffer;
mod object;

use std::cell::RefCell;
use std::fmt;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

pub use buffer::{copy_within, Buffer, NumberKind};
pub use object::Object;

use crate::vm::builtins;
use crate::vm::proto::Constant;
use crate::vm::upvalue::Closure;

/// A dynamically typed value.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Rc<RefCell<Vec<Value>>>),
    Object(Rc<RefCell<Object>>),
    Buffer(Rc<RefCell<Buffer>>),
    Closure(Rc<Closure>),
    /// Index into the builtin table.
    Builtin(u32),
    File(Rc<RefCell<FileHandle>>),
}

impl Value {
    pub fn array(values: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(values)))
    }

    pub fn object(object: Object) -> Value {
        Value::Object(Rc::new(RefCell::new(object)))
    }

    pub fn buffer(buffer: Buffer) -> Value {
        Value::Buffer(Rc::new(RefCell::new(buffer)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Buffer(_) => "buffer",
            Value::Closure(_) => "closure",
            Value::Builtin(_) => "builtin",
            Value::File(_) => "file",
        }
    }

    /// Nil and zero are false, every other value is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            _ => true,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Identity comparison for reference values.
    pub fn same_reference(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Buffer(a), Value::Buffer(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::File(a), Value::File(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&Constant> for Value {
    fn from(constant: &Constant) -> Self {
        match constant {
            Constant::Nil => Value::Nil,
            Constant::Bool(b) => Value::Bool(*b),
            Constant::Int(n) => Value::Int(*n),
            Constant::Float(n) => Value::Float(*n),
            Constant::String(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(self, f, &mut Vec::new())
    }
}

/// `open` holds the containers being printed further up, so a container
/// that reaches itself prints as `[...]` or `{...}`.
fn write_value(value: &Value, f: &mut fmt::Formatter<'_>, open: &mut Vec<*const ()>) -> fmt::Result {
    match value {
        Value::Array(arr) => {
            let ptr = Rc::as_ptr(arr) as *const ();
            if open.contains(&ptr) {
                return write!(f, "[...]");
            }
            open.push(ptr);
            write!(f, "[")?;
            for (i, val) in arr.borrow().iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write_value(val, f, open)?;
            }
            open.pop();
            write!(f, "]")
        }
        Value::Object(obj) => {
            let ptr = Rc::as_ptr(obj) as *const ();
            if open.contains(&ptr) {
                return write!(f, "{{...}}");
            }
            open.push(ptr);
            write!(f, "{{")?;
            for (i, (key, val)) in obj.borrow().iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: ", key)?;
                write_value(val, f, open)?;
            }
            open.pop();
            write!(f, "}}")
        }
        Value::Nil => write!(f, "nil"),
        Value::Bool(b) => write!(f, "{}", b),
        Value::Int(n) => write!(f, "{}", n),
        Value::Float(n) => write!(f, "{}", n),
        Value::String(s) => write!(f, "{}", s),
        Value::Buffer(buf) => write!(f, "<buffer {}>", buf.borrow().len()),
        Value::Closure(_) => write!(f, "<closure>"),
        Value::Builtin(idx) => write!(f, "<builtin:\"{}\">", builtins::name(*idx)),
        Value::File(file) => write!(f, "<file {}>", file.borrow().path),
    }
}

/// A key usable in an [`Object`]. Nil and reference values are not keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashKey {
    Int(i64),
    /// Stored as bits so the key is `Eq`; `-0.0` is folded into `0.0`.
    Float(u64),
    String(String),
    Bool(bool),
}

impl Hash for HashKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            HashKey::Int(n) => n.hash(state),
            HashKey::Float(bits) => bits.hash(state),
            HashKey::String(s) => s.hash(state),
            HashKey::Bool(b) => b.hash(state),
        }
    }
}

impl HashKey {
    pub fn from_value(value: &Value) -> Option<HashKey> {
        match value {
            Value::Int(n) => Some(HashKey::Int(*n)),
            Value::Float(n) if *n == 0.0 => Some(HashKey::Float(0f64.to_bits())),
            Value::Float(n) => Some(HashKey::Float(n.to_bits())),
            Value::String(s) => Some(HashKey::String(s.clone())),
            Value::Bool(b) => Some(HashKey::Bool(*b)),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            HashKey::Int(n) => Value::Int(*n),
            HashKey::Float(bits) => Value::Float(f64::from_bits(*bits)),
            HashKey::String(s) => Value::String(s.clone()),
            HashKey::Bool(b) => Value::Bool(*b),
        }
    }
}

impl From<&str> for HashKey {
    fn from(s: &str) -> Self {
        HashKey::String(s.to_string())
    }
}

impl fmt::Display for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashKey::Int(n) => write!(f, "{}", n),
            HashKey::Float(bits) => write!(f, "{}", f64::from_bits(*bits)),
            HashKey::String(s) => write!(f, "{}", s),
            HashKey::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// An open (or closed) file. Dropping the last reference closes it.
#[derive(Debug)]
pub struct FileHandle {
    pub path: String,
    pub file: Option<File>,
}

impl FileHandle {
    pub fn new(path: impl Into<String>, file: File) -> Self {
        Self {
            path: path.into(),
            file: Some(file),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::String(String::new()).is_truthy());
        assert!(Value::array(Vec::new()).is_truthy());
        assert!(Value::Int(-1).is_truthy());
    }

    #[test]
    fn test_display_nested() {
        let value = Value::array(vec![
            Value::Int(1),
            Value::Float(2.5),
            Value::String("x".to_string()),
            Value::Nil,
        ]);
        assert_eq!(value.to_string(), "[1, 2.5, x, nil]");
    }

    #[test]
    fn test_display_self_reference() {
        let arr = Value::array(vec![Value::Int(1)]);
        if let Value::Array(inner) = &arr {
            inner.borrow_mut().push(arr.clone());
        }
        assert_eq!(arr.to_string(), "[1, [...]]");

        let mut object = Object::new();
        object.set(HashKey::from("list"), arr.clone());
        let obj = Value::object(object);
        if let Value::Object(inner) = &obj {
            inner.borrow_mut().set(HashKey::from("me"), obj.clone());
        }
        assert_eq!(obj.to_string(), "{list: [1, [...]], me: {...}}");

        // Shared but acyclic values print in full each time.
        let shared = Value::array(vec![Value::Int(2)]);
        let twice = Value::array(vec![shared.clone(), shared]);
        assert_eq!(twice.to_string(), "[[2], [2]]");
    }

    #[test]
    fn test_hash_key_rules() {
        assert!(HashKey::from_value(&Value::Nil).is_none());
        assert!(HashKey::from_value(&Value::array(Vec::new())).is_none());
        assert_eq!(
            HashKey::from_value(&Value::Float(-0.0)),
            HashKey::from_value(&Value::Float(0.0))
        );
        assert_ne!(
            HashKey::from_value(&Value::Int(1)),
            HashKey::from_value(&Value::Float(1.0))
        );
    }

    #[test]
    fn test_reference_identity() {
        let a = Value::array(Vec::new());
        let b = a.clone();
        assert!(a.same_reference(&b));
        assert!(!a.same_reference(&Value::array(Vec::new())));
    }
}
