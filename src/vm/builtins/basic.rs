//! Core builtins: printing, collections, type inspection and `throw`.

use crate::value::{HashKey, Value};
use crate::vm::vm::Vm;

use super::{fatal, to_index, NativeError, NativeResult};

pub fn print(vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    let line = args
        .iter()
        .map(|arg| arg.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    vm.write_line(line);
    Ok(Vec::new())
}

pub fn len(_vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    let n = match args.first() {
        Some(Value::String(s)) => s.len(),
        Some(Value::Array(arr)) => arr.borrow().len(),
        Some(Value::Object(obj)) => obj.borrow().len(),
        Some(Value::Buffer(buf)) => buf.borrow().len(),
        _ => return Err(fatal("len", "a string, array, object or buffer")),
    };
    Ok(vec![Value::Int(n as i64)])
}

pub fn append(_vm: &mut Vm, mut args: Vec<Value>) -> NativeResult {
    if args.is_empty() {
        return Err(fatal("append", "an array"));
    }
    let rest = args.split_off(1);
    match args.pop() {
        Some(Value::Array(arr)) => {
            arr.borrow_mut().extend(rest);
            Ok(vec![Value::Array(arr)])
        }
        _ => Err(fatal("append", "an array")),
    }
}

/// `sub(x, start[, end])` on strings (by byte), arrays and buffers.
pub fn sub(_vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    let (target, start, end) = match &args[..] {
        [target, start] => (target, to_index(start, "sub")?, None),
        [target, start, end] => (target, to_index(start, "sub")?, Some(to_index(end, "sub")?)),
        _ => return Err(fatal("sub", "(value, start[, end])")),
    };
    let len = match target {
        Value::String(s) => s.len(),
        Value::Array(arr) => arr.borrow().len(),
        Value::Buffer(buf) => buf.borrow().len(),
        _ => return Err(fatal("sub", "a string, array or buffer")),
    };
    let end = end.unwrap_or(len);
    if start > end || end > len {
        return Err(fatal("sub", &format!("a range within 0..{}", len)));
    }
    let value = match target {
        Value::String(s) => {
            Value::String(String::from_utf8_lossy(&s.as_bytes()[start..end]).into_owned())
        }
        Value::Array(arr) => Value::array(arr.borrow()[start..end].to_vec()),
        Value::Buffer(buf) => {
            let sliced = buf.borrow().slice(start, end).map_err(NativeError::Fatal)?;
            Value::buffer(sliced)
        }
        _ => Value::Nil,
    };
    Ok(vec![value])
}

pub fn type_of(_vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    let name = args.first().map_or("nil", Value::type_name);
    Ok(vec![Value::String(name.to_string())])
}

pub fn delete(_vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    match &args[..] {
        [Value::Object(obj), key] => {
            let key = HashKey::from_value(key)
                .ok_or_else(|| fatal("delete", "a non-nil scalar key"))?;
            obj.borrow_mut().remove(&key);
            Ok(Vec::new())
        }
        _ => Err(fatal("delete", "(object, key)")),
    }
}

/// Shallow copy: containers are duplicated, their elements shared.
pub fn clone(_vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    let value = match args.into_iter().next() {
        Some(Value::Array(arr)) => Value::array(arr.borrow().clone()),
        Some(Value::Object(obj)) => Value::object(obj.borrow().clone()),
        Some(Value::Buffer(buf)) => Value::buffer(buf.borrow().clone()),
        Some(other) => other,
        None => Value::Nil,
    };
    Ok(vec![value])
}

pub fn throw(_vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    Err(NativeError::Throw(
        args.into_iter().next().unwrap_or(Value::Nil),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn call(f: super::super::BuiltinFn, args: Vec<Value>) -> NativeResult {
        let mut vm = Vm::default();
        f(&mut vm, args)
    }

    #[test]
    fn test_len_counts_bytes() {
        let out = call(len, vec![Value::String("héllo".to_string())]).unwrap();
        assert!(matches!(out[..], [Value::Int(6)]));
        assert!(matches!(
            call(len, vec![Value::Int(1)]),
            Err(NativeError::Fatal(_))
        ));
    }

    #[test]
    fn test_append_in_place() {
        let arr = Value::array(vec![Value::Int(1)]);
        let out = call(append, vec![arr.clone(), Value::Int(2), Value::Int(3)]).unwrap();
        assert!(out[0].same_reference(&arr));
        assert_eq!(arr.to_string(), "[1, 2, 3]");
    }

    #[test]
    fn test_sub_variants() {
        let out = call(
            sub,
            vec![Value::String("abcdef".to_string()), Value::Int(1), Value::Int(3)],
        )
        .unwrap();
        assert_eq!(out[0].to_string(), "bc");

        let arr = Value::array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let out = call(sub, vec![arr, Value::Int(1)]).unwrap();
        assert_eq!(out[0].to_string(), "[2, 3]");

        assert!(call(sub, vec![Value::String("ab".to_string()), Value::Int(3)]).is_err());
    }

    #[test]
    fn test_clone_is_shallow() {
        let inner = Value::array(Vec::new());
        let outer = Value::array(vec![inner.clone()]);
        let out = call(clone, vec![outer.clone()]).unwrap();
        assert!(!out[0].same_reference(&outer));
        match &out[0] {
            Value::Array(arr) => assert!(arr.borrow()[0].same_reference(&inner)),
            other => panic!("Expected array, got {:?}", other),
        }
    }

    #[test]
    fn test_throw_carries_value() {
        match call(throw, vec![Value::Int(7)]) {
            Err(NativeError::Throw(Value::Int(7))) => {}
            other => panic!("Expected throw, got {:?}", other),
        }
    }
}
