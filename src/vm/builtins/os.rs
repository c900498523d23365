//! Process builtins.

use crate::value::Value;
use crate::vm::vm::Vm;

use super::{fatal, NativeResult};

/// Stops the VM; the exit code is reported by [`Vm::exit_code`].
pub fn exit(vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    let code = match args.first() {
        Some(Value::Int(n)) => *n as i32,
        None | Some(Value::Nil) => 0,
        _ => return Err(fatal("__exit", "an int exit code")),
    };
    vm.exit(code);
    Ok(Vec::new())
}

pub fn getenv(_vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    let Some(Value::String(key)) = args.first() else {
        return Err(fatal("__getenv", "a variable name"));
    };
    let value = std::env::var(key).map_or(Value::Nil, Value::String);
    Ok(vec![value])
}

pub fn setenv(_vm: &mut Vm, args: Vec<Value>) -> NativeResult {
    let [Value::String(key), value] = &args[..] else {
        return Err(fatal("__setenv", "(name, value)"));
    };
    std::env::set_var(key, value.to_string());
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_round_trip() {
        let mut vm = Vm::default();
        let key = Value::String("GSC_BUILTIN_TEST_VAR".to_string());
        setenv(&mut vm, vec![key.clone(), Value::Int(42)]).unwrap();
        let out = getenv(&mut vm, vec![key]).unwrap();
        assert_eq!(out[0].to_string(), "42");

        let missing = getenv(&mut vm, vec![Value::String("GSC_SURELY_UNSET_VAR".to_string())]);
        assert!(matches!(missing.unwrap()[..], [Value::Nil]));
    }

    #[test]
    fn test_exit_stops_vm() {
        let mut vm = Vm::default();
        exit(&mut vm, vec![Value::Int(3)]).unwrap();
        assert_eq!(vm.exit_code(), Some(3));
    }
}
