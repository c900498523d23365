//! Buffer primitives behind the `Buffer` stdlib module.

use std::rc::Rc;

use crate::value::{copy_within, Buffer, NumberKind, Value};
use crate::vm::vm::Vm;

use super::{fatal, to_index, NativeError, NativeResult};

fn kind_arg(value: &Value, func: &str) -> Result<NumberKind, NativeError> {
    match value {
        Value::String(name) => NumberKind::parse(name)
            .ok_or_else(|| fatal(func, "one of i8 u8 i16 u16 i32 u32 i64 u64 f32 f64")),
        _ => Err(fatal(func, "a number kind string")),
    }
}

/// Endianness flag; little endian unless a falsy value is passed.
fn little_arg(value: Option<&Value>) -> bool {
    value.map_or(true, Value::is_truthy)
}

pub fn new(vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    match args.first() {
        Some(size) => {
            let size = to_index(size, "__buffer_new")?;
            if size > vm.max_buffer_size {
                return Err(NativeError::throw(format!(
                    "buffer of {} bytes exceeds the limit of {} bytes",
                    size, vm.max_buffer_size
                )));
            }
            let buffer = Buffer::try_new(size).map_err(NativeError::throw)?;
            Ok(vec![Value::buffer(buffer)])
        }
        None => Err(fatal("__buffer_new", "a size")),
    }
}

pub fn read_number(_vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    let [Value::Buffer(buf), offset, kind, rest @ ..] = &args[..] else {
        return Err(fatal("__buffer_readNumber", "(buffer, offset, kind[, little])"));
    };
    let offset = to_index(offset, "__buffer_readNumber")?;
    let kind = kind_arg(kind, "__buffer_readNumber")?;
    let value = buf
        .borrow()
        .read_number(offset, kind, little_arg(rest.first()))
        .map_err(NativeError::throw)?;
    Ok(vec![value])
}

pub fn write_number(_vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    let [Value::Buffer(buf), offset, kind, value, rest @ ..] = &args[..] else {
        return Err(fatal(
            "__buffer_writeNumber",
            "(buffer, offset, kind, value[, little])",
        ));
    };
    let offset = to_index(offset, "__buffer_writeNumber")?;
    let kind = kind_arg(kind, "__buffer_writeNumber")?;
    buf.borrow_mut()
        .write_number(offset, kind, value, little_arg(rest.first()))
        .map_err(NativeError::throw)?;
    Ok(Vec::new())
}

pub fn to_string(_vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    let (buf, start, end) = match &args[..] {
        [Value::Buffer(buf)] => {
            let len = buf.borrow().len();
            (buf, 0, len)
        }
        [Value::Buffer(buf), start, end] => (
            buf,
            to_index(start, "__buffer_toString")?,
            to_index(end, "__buffer_toString")?,
        ),
        _ => return Err(fatal("__buffer_toString", "(buffer[, start, end])")),
    };
    let text = buf
        .borrow()
        .to_string_range(start, end)
        .map_err(NativeError::throw)?;
    Ok(vec![Value::String(text)])
}

pub fn slice(_vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    let [Value::Buffer(buf), start, end] = &args[..] else {
        return Err(fatal("__buffer_slice", "(buffer, start, end)"));
    };
    let start = to_index(start, "__buffer_slice")?;
    let end = to_index(end, "__buffer_slice")?;
    let sliced = buf.borrow().slice(start, end).map_err(NativeError::throw)?;
    Ok(vec![Value::buffer(sliced)])
}

pub fn concat(_vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    let [Value::Buffer(a), Value::Buffer(b)] = &args[..] else {
        return Err(fatal("__buffer_concat", "(buffer, buffer)"));
    };
    let joined = a.borrow().concat(&b.borrow());
    Ok(vec![Value::buffer(joined)])
}

/// `__buffer_copy(dst, src, dstStart, srcStart, srcEnd)`; overlapping
/// copies within one buffer behave like memmove.
pub fn copy(_vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    let [Value::Buffer(dst), Value::Buffer(src), dst_start, src_start, src_end] = &args[..] else {
        return Err(fatal(
            "__buffer_copy",
            "(buffer, buffer, dstStart, srcStart, srcEnd)",
        ));
    };
    let dst_start = to_index(dst_start, "__buffer_copy")?;
    let src_start = to_index(src_start, "__buffer_copy")?;
    let src_end = to_index(src_end, "__buffer_copy")?;

    let copied = if Rc::ptr_eq(dst, src) {
        copy_within(&mut dst.borrow_mut().data, None, dst_start, src_start, src_end)
    } else {
        let src = src.borrow();
        copy_within(
            &mut dst.borrow_mut().data,
            Some(&src.data),
            dst_start,
            src_start,
            src_end,
        )
    }
    .map_err(NativeError::throw)?;
    Ok(vec![Value::Int(copied as i64)])
}

/// Build a buffer from a string's bytes or an array of byte-sized ints.
pub fn from(_vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    let data = match args.first() {
        Some(Value::String(s)) => s.as_bytes().to_vec(),
        Some(Value::Array(arr)) => arr
            .borrow()
            .iter()
            .map(|v| match v {
                Value::Int(n) => Ok(*n as u8),
                _ => Err(fatal("__buffer_from", "an array of ints")),
            })
            .collect::<Result<Vec<u8>, NativeError>>()?,
        _ => return Err(fatal("__buffer_from", "a string or array")),
    };
    Ok(vec![Value::buffer(Buffer::from_bytes(data))])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn s(text: &str) -> Value {
        Value::String(text.to_string())
    }

    #[test]
    fn test_read_write_round_trip() {
        let mut vm = Vm::default();
        let buf = new(&mut vm, vec![Value::Int(8)]).unwrap().remove(0);
        write_number(
            &mut vm,
            vec![buf.clone(), Value::Int(0), s("i32"), Value::Int(-5), Value::Bool(false)],
        )
        .unwrap();
        let out = read_number(
            &mut vm,
            vec![buf.clone(), Value::Int(0), s("i32"), Value::Bool(false)],
        )
        .unwrap();
        assert!(matches!(out[..], [Value::Int(-5)]));

        let err = read_number(&mut vm, vec![buf, Value::Int(6), s("u32")]);
        assert!(matches!(err, Err(NativeError::Throw(_))));
    }

    #[test]
    fn test_copy_within_same_buffer() {
        let mut vm = Vm::default();
        let buf = from(&mut vm, vec![s("abcdef")]).unwrap().remove(0);
        let out = copy(
            &mut vm,
            vec![buf.clone(), buf.clone(), Value::Int(1), Value::Int(0), Value::Int(3)],
        )
        .unwrap();
        assert!(matches!(out[..], [Value::Int(3)]));
        let text = to_string(&mut vm, vec![buf]).unwrap();
        assert_eq!(text[0].to_string(), "aabcef");
    }

    #[test]
    fn test_unknown_kind_is_fatal() {
        let mut vm = Vm::default();
        let buf = new(&mut vm, vec![Value::Int(4)]).unwrap().remove(0);
        let err = read_number(&mut vm, vec![buf, Value::Int(0), s("i128")]);
        assert!(matches!(err, Err(NativeError::Fatal(_))));
    }
}
