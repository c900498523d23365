//! Host functions callable from scripts.
//!
//! The table order is part of the bytecode format: `LOAD_BUILTIN n` refers
//! to the n-th entry, so new builtins are only ever appended.

mod buffer;
mod basic;
mod fs;
mod os;

use crate::value::Value;

use super::vm::Vm;

/// How a builtin can fail. `Throw` is catchable by the script, `Fatal`
/// stops the VM.
#[derive(Debug)]
pub enum NativeError {
    Throw(Value),
    Fatal(String),
}

impl NativeError {
    pub fn throw(message: impl Into<String>) -> Self {
        NativeError::Throw(Value::String(message.into()))
    }
}

impl From<std::io::Error> for NativeError {
    fn from(err: std::io::Error) -> Self {
        NativeError::throw(err.to_string())
    }
}

pub type NativeResult = Result<Vec<Value>, NativeError>;

pub type BuiltinFn = fn(&mut Vm, Vec<Value>) -> NativeResult;

pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

macro_rules! builtin_table {
    ($( $name:literal => $func:path, )*) => {
        pub static BUILTINS: &[Builtin] = &[
            $( Builtin { name: $name, func: $func }, )*
        ];
    };
}

builtin_table! {
    "print" => basic::print,
    "len" => basic::len,
    "append" => basic::append,
    "sub" => basic::sub,
    "type" => basic::type_of,
    "delete" => basic::delete,
    "clone" => basic::clone,
    "__buffer_new" => buffer::new,
    "__buffer_readNumber" => buffer::read_number,
    "__buffer_writeNumber" => buffer::write_number,
    "__buffer_toString" => buffer::to_string,
    "__buffer_slice" => buffer::slice,
    "__buffer_concat" => buffer::concat,
    "__buffer_copy" => buffer::copy,
    "__buffer_from" => buffer::from,
    "__open" => fs::open,
    "__read" => fs::read,
    "__write" => fs::write,
    "__close" => fs::close,
    "__seek" => fs::seek,
    "__remove" => fs::remove,
    "__fchmod" => fs::fchmod,
    "__chmod" => fs::chmod,
    "__fchown" => fs::fchown,
    "__chown" => fs::chown,
    "__fchdir" => fs::fchdir,
    "__chdir" => fs::chdir,
    "__fstat" => fs::fstat,
    "__stat" => fs::stat,
    "__rename" => fs::rename,
    "__mkdir" => fs::mkdir,
    "__exit" => os::exit,
    "__getenv" => os::getenv,
    "__setenv" => os::setenv,
    "__readdir" => fs::readdir,
    "__freaddir" => fs::freaddir,
    "throw" => basic::throw,
}

pub fn get(idx: u32) -> Option<&'static Builtin> {
    BUILTINS.get(idx as usize)
}

pub fn name(idx: u32) -> &'static str {
    get(idx).map_or("?", |b| b.name)
}

pub fn index_of(name: &str) -> Option<u32> {
    BUILTINS
        .iter()
        .position(|b| b.name == name)
        .map(|i| i as u32)
}

// --- Argument helpers shared by the builtin modules ---

pub(crate) fn fatal(func: &str, expected: &str) -> NativeError {
    NativeError::Fatal(format!(
        "call builtin function '{}' failed: expected {}",
        func, expected
    ))
}

/// A non-negative int argument usable as an offset or size.
pub(crate) fn to_index(value: &Value, func: &str) -> Result<usize, NativeError> {
    match value {
        Value::Int(n) if *n >= 0 => Ok(*n as usize),
        _ => Err(fatal(func, "a non-negative int")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_indices_are_stable() {
        assert_eq!(index_of("print"), Some(0));
        assert_eq!(index_of("len"), Some(1));
        assert_eq!(index_of("__buffer_new"), Some(7));
        assert_eq!(index_of("__open"), Some(15));
        assert_eq!(index_of("__exit"), Some(31));
        assert_eq!(index_of("throw"), Some(36));
        assert_eq!(BUILTINS.len(), 37);
        assert_eq!(index_of("nope"), None);
        assert_eq!(name(4), "type");
    }
}
