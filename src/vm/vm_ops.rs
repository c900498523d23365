//! Operator semantics: arithmetic, comparison, equality and attribute
//! access. Every function is total over value pairs; unsupported pairs are
//! type errors.

use std::cmp::Ordering;

use crate::error::RuntimeError;
use crate::value::{HashKey, Value};

use super::opcode::Opcode;
use super::vm::VmResult;

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn float(self) -> f64 {
        match self {
            Num::Int(n) => n as f64,
            Num::Float(n) => n,
        }
    }
}

/// Numeric view of a value; bools count as 0 and 1.
fn as_num(value: &Value) -> Option<Num> {
    match value {
        Value::Int(n) => Some(Num::Int(*n)),
        Value::Float(n) => Some(Num::Float(*n)),
        Value::Bool(b) => Some(Num::Int(*b as i64)),
        _ => None,
    }
}

fn as_int(value: &Value) -> Option<i64> {
    match as_num(value)? {
        Num::Int(n) => Some(n),
        Num::Float(_) => None,
    }
}

fn unsupported(op: Opcode, a: &Value, b: &Value) -> RuntimeError {
    RuntimeError::type_error(format!(
        "unsupported operand types for {}: {} and {}",
        op.name(),
        a.type_name(),
        b.type_name()
    ))
}

/// Integer and float versions of an arithmetic operator.
fn arith(
    op: Opcode,
    a: &Value,
    b: &Value,
    int: impl FnOnce(i64, i64) -> VmResult<i64>,
    float: impl FnOnce(f64, f64) -> VmResult<f64>,
) -> VmResult<Value> {
    match (as_num(a), as_num(b)) {
        (Some(Num::Int(x)), Some(Num::Int(y))) => Ok(Value::Int(int(x, y)?)),
        (Some(x), Some(y)) => Ok(Value::Float(float(x.float(), y.float())?)),
        _ => Err(unsupported(op, a, b)),
    }
}

fn floor_div(x: i64, y: i64) -> VmResult<i64> {
    if y == 0 {
        return Err(RuntimeError::DivisionByZero);
    }
    let q = x.wrapping_div(y);
    if x.wrapping_rem(y) != 0 && ((x < 0) != (y < 0)) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

/// `None` when either side is NaN.
fn compare(op: Opcode, a: &Value, b: &Value) -> VmResult<Option<Ordering>> {
    Ok(match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => match (as_num(a), as_num(b)) {
            (Some(Num::Int(x)), Some(Num::Int(y))) => Some(x.cmp(&y)),
            (Some(x), Some(y)) => x.float().partial_cmp(&y.float()),
            _ => return Err(unsupported(op, a, b)),
        },
    })
}

/// `==` semantics: numbers across types, nil only with nil, references by
/// identity.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Nil, Value::Nil) => true,
        (Value::Nil, _) | (_, Value::Nil) => false,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        _ => match (as_num(a), as_num(b)) {
            (Some(Num::Int(x)), Some(Num::Int(y))) => x == y,
            (Some(x), Some(y)) => x.float() == y.float(),
            _ => a.same_reference(b),
        },
    }
}

pub fn binary_op(op: Opcode, a: Value, b: Value) -> VmResult<Value> {
    let (a, b) = (&a, &b);
    match op {
        Opcode::BinaryAdd => {
            if matches!(a, Value::String(_)) || matches!(b, Value::String(_)) {
                return Ok(Value::String(format!("{}{}", a, b)));
            }
            arith(op, a, b, |x, y| Ok(x.wrapping_add(y)), |x, y| Ok(x + y))
        }
        Opcode::BinarySub => arith(op, a, b, |x, y| Ok(x.wrapping_sub(y)), |x, y| Ok(x - y)),
        Opcode::BinaryMul => arith(op, a, b, |x, y| Ok(x.wrapping_mul(y)), |x, y| Ok(x * y)),
        Opcode::BinaryDiv => match (as_num(a), as_num(b)) {
            (Some(x), Some(y)) => Ok(Value::Float(x.float() / y.float())),
            _ => Err(unsupported(op, a, b)),
        },
        Opcode::BinaryIdiv => arith(op, a, b, floor_div, |x, y| Ok((x / y).floor())),
        Opcode::BinaryMod => arith(
            op,
            a,
            b,
            |x, y| {
                if y == 0 {
                    Err(RuntimeError::DivisionByZero)
                } else {
                    Ok(x.wrapping_rem(y))
                }
            },
            |x, y| {
                if y == 0.0 {
                    Err(RuntimeError::DivisionByZero)
                } else {
                    Ok(x % y)
                }
            },
        ),
        Opcode::BinaryAnd | Opcode::BinaryXor | Opcode::BinaryOr => {
            let (Some(x), Some(y)) = (as_int(a), as_int(b)) else {
                return Err(unsupported(op, a, b));
            };
            Ok(Value::Int(match op {
                Opcode::BinaryAnd => x & y,
                Opcode::BinaryXor => x ^ y,
                _ => x | y,
            }))
        }
        Opcode::BinaryShl | Opcode::BinaryShr => {
            let (Some(x), Some(y)) = (as_int(a), as_int(b)) else {
                return Err(unsupported(op, a, b));
            };
            if y < 0 {
                return Err(RuntimeError::type_error(format!("negative shift count {}", y)));
            }
            let shifted = match (op, y) {
                (Opcode::BinaryShl, 64..) => 0,
                (Opcode::BinaryShl, _) => x << y,
                (_, 64..) => x >> 63,
                _ => x >> y,
            };
            Ok(Value::Int(shifted))
        }
        Opcode::BinaryLt => Ok(Value::Bool(matches!(compare(op, a, b)?, Some(Ordering::Less)))),
        Opcode::BinaryLe => Ok(Value::Bool(matches!(
            compare(op, a, b)?,
            Some(Ordering::Less | Ordering::Equal)
        ))),
        Opcode::BinaryGt => Ok(Value::Bool(matches!(compare(op, a, b)?, Some(Ordering::Greater)))),
        Opcode::BinaryGe => Ok(Value::Bool(matches!(
            compare(op, a, b)?,
            Some(Ordering::Greater | Ordering::Equal)
        ))),
        Opcode::BinaryEq => Ok(Value::Bool(values_equal(a, b))),
        Opcode::BinaryNe => Ok(Value::Bool(!values_equal(a, b))),
        Opcode::BinaryLand => Ok(if a.is_truthy() { b.clone() } else { a.clone() }),
        Opcode::BinaryLor => Ok(if a.is_truthy() { a.clone() } else { b.clone() }),
        other => Err(RuntimeError::invalid_bytecode(format!(
            "{} is not a binary operator",
            other.name()
        ))),
    }
}

pub fn unary_op(op: Opcode, value: Value) -> VmResult<Value> {
    match (op, as_num(&value)) {
        (Opcode::UnaryLnot, _) => Ok(Value::Bool(!value.is_truthy())),
        (Opcode::UnaryNot, Some(Num::Int(n))) => Ok(Value::Int(!n)),
        (Opcode::UnaryNeg, Some(Num::Int(n))) => Ok(Value::Int(n.wrapping_neg())),
        (Opcode::UnaryNeg, Some(Num::Float(n))) => Ok(Value::Float(-n)),
        _ => Err(RuntimeError::type_error(format!(
            "unsupported operand type for {}: {}",
            op.name(),
            value.type_name()
        ))),
    }
}

/// The binary operator behind a compound attribute assignment.
pub fn attr_assign_op(op: Opcode) -> Option<Opcode> {
    match op {
        Opcode::AttrAssignAddeq => Some(Opcode::BinaryAdd),
        Opcode::AttrAssignSubeq => Some(Opcode::BinarySub),
        Opcode::AttrAssignMuleq => Some(Opcode::BinaryMul),
        Opcode::AttrAssignDiveq => Some(Opcode::BinaryDiv),
        Opcode::AttrAssignModeq => Some(Opcode::BinaryMod),
        Opcode::AttrAssignAndeq => Some(Opcode::BinaryAnd),
        Opcode::AttrAssignXoreq => Some(Opcode::BinaryXor),
        Opcode::AttrAssignOreq => Some(Opcode::BinaryOr),
        _ => None,
    }
}

fn array_index(key: &Value, length: usize) -> VmResult<usize> {
    match key {
        Value::Int(i) if *i >= 0 && (*i as usize) < length => Ok(*i as usize),
        Value::Int(i) => Err(RuntimeError::index_out_of_bounds(*i, length)),
        other => Err(RuntimeError::type_error(format!(
            "index must be an int, not {}",
            other.type_name()
        ))),
    }
}

fn object_key(key: &Value) -> VmResult<HashKey> {
    HashKey::from_value(key).ok_or_else(|| {
        RuntimeError::type_error(format!("invalid object key type {}", key.type_name()))
    })
}

/// `obj[key]`.
pub fn get_attr(obj: &Value, key: &Value) -> VmResult<Value> {
    match obj {
        Value::Array(arr) => {
            let arr = arr.borrow();
            let idx = array_index(key, arr.len())?;
            Ok(arr[idx].clone())
        }
        Value::String(s) => {
            let idx = array_index(key, s.len())?;
            Ok(Value::Int(s.as_bytes()[idx] as i64))
        }
        Value::Object(o) => {
            let key = object_key(key)?;
            Ok(o.borrow().get(&key).cloned().unwrap_or(Value::Nil))
        }
        other => Err(RuntimeError::type_error(format!(
            "can not index a value of type {}",
            other.type_name()
        ))),
    }
}

/// `obj[key] = value`, or `obj[key] op= value` when `op` is given.
pub fn set_attr(obj: &Value, key: Value, value: Value, op: Option<Opcode>) -> VmResult<()> {
    let combine = |orig: Value| match op {
        Some(op) => binary_op(op, orig, value),
        None => Ok(value),
    };
    match obj {
        Value::Array(arr) => {
            let idx = array_index(&key, arr.borrow().len())?;
            let orig = arr.borrow()[idx].clone();
            let new = combine(orig)?;
            arr.borrow_mut()[idx] = new;
            Ok(())
        }
        Value::Object(o) => {
            let key = object_key(&key)?;
            let orig = o.borrow().get(&key).cloned().unwrap_or(Value::Nil);
            let new = combine(orig)?;
            o.borrow_mut().set(key, new);
            Ok(())
        }
        Value::String(_) => Err(RuntimeError::type_error("strings are immutable")),
        other => Err(RuntimeError::type_error(format!(
            "can not assign into a value of type {}",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn bin(op: Opcode, a: Value, b: Value) -> Value {
        binary_op(op, a, b).unwrap()
    }

    #[test]
    fn test_int_arithmetic_wraps() {
        assert!(matches!(
            bin(Opcode::BinaryAdd, Value::Int(i64::MAX), Value::Int(1)),
            Value::Int(i64::MIN)
        ));
        assert!(matches!(
            bin(Opcode::BinaryMul, Value::Int(3), Value::Bool(true)),
            Value::Int(3)
        ));
    }

    #[test]
    fn test_division_flavours() {
        assert!(matches!(bin(Opcode::BinaryDiv, Value::Int(7), Value::Int(2)), Value::Float(f) if f == 3.5));
        assert!(matches!(bin(Opcode::BinaryIdiv, Value::Int(-7), Value::Int(2)), Value::Int(-4)));
        assert!(matches!(bin(Opcode::BinaryIdiv, Value::Float(7.5), Value::Int(2)), Value::Float(f) if f == 3.0));
        assert!(matches!(
            binary_op(Opcode::BinaryIdiv, Value::Int(1), Value::Int(0)),
            Err(RuntimeError::DivisionByZero)
        ));
    }

    #[test]
    fn test_modulo_follows_dividend() {
        assert!(matches!(bin(Opcode::BinaryMod, Value::Int(-7), Value::Int(3)), Value::Int(-1)));
        assert!(matches!(bin(Opcode::BinaryMod, Value::Int(7), Value::Int(-3)), Value::Int(1)));
        assert!(matches!(bin(Opcode::BinaryMod, Value::Float(5.5), Value::Int(2)), Value::Float(f) if f == 1.5));
        assert!(binary_op(Opcode::BinaryMod, Value::Int(1), Value::Int(0)).is_err());
    }

    #[test]
    fn test_string_concat_either_side() {
        assert_eq!(
            bin(Opcode::BinaryAdd, Value::String("n=".into()), Value::Int(3)).to_string(),
            "n=3"
        );
        assert_eq!(
            bin(Opcode::BinaryAdd, Value::Float(1.5), Value::String("x".into())).to_string(),
            "1.5x"
        );
    }

    #[test]
    fn test_bitwise_or_is_integer() {
        assert!(matches!(bin(Opcode::BinaryOr, Value::Int(4), Value::Int(1)), Value::Int(5)));
        assert!(binary_op(Opcode::BinaryOr, Value::Float(1.0), Value::Int(1)).is_err());
    }

    #[test]
    fn test_shifts() {
        assert!(matches!(bin(Opcode::BinaryShl, Value::Int(1), Value::Int(4)), Value::Int(16)));
        assert!(matches!(bin(Opcode::BinaryShl, Value::Int(1), Value::Int(70)), Value::Int(0)));
        assert!(matches!(bin(Opcode::BinaryShr, Value::Int(-8), Value::Int(80)), Value::Int(-1)));
        assert!(binary_op(Opcode::BinaryShr, Value::Int(1), Value::Int(-1)).is_err());
    }

    #[test]
    fn test_equality_rules() {
        assert!(values_equal(&Value::Int(1), &Value::Float(1.0)));
        assert!(values_equal(&Value::Bool(true), &Value::Int(1)));
        assert!(!values_equal(&Value::Nil, &Value::Int(0)));
        assert!(!values_equal(&Value::String("1".into()), &Value::Int(1)));
        let arr = Value::array(Vec::new());
        assert!(values_equal(&arr, &arr.clone()));
        assert!(!values_equal(&arr, &Value::array(Vec::new())));
    }

    #[test]
    fn test_comparisons() {
        assert!(matches!(bin(Opcode::BinaryLt, Value::Int(1), Value::Float(1.5)), Value::Bool(true)));
        assert!(matches!(
            bin(Opcode::BinaryGe, Value::String("b".into()), Value::String("a".into())),
            Value::Bool(true)
        ));
        assert!(matches!(bin(Opcode::BinaryLt, Value::Bool(false), Value::Bool(true)), Value::Bool(true)));
        assert!(binary_op(Opcode::BinaryLt, Value::Nil, Value::Int(1)).is_err());
    }

    #[test]
    fn test_attribute_rules() {
        let arr = Value::array(vec![Value::Int(10)]);
        assert!(matches!(get_attr(&arr, &Value::Int(0)).unwrap(), Value::Int(10)));
        assert!(matches!(
            get_attr(&arr, &Value::Int(1)),
            Err(RuntimeError::IndexOutOfBounds { index: 1, length: 1 })
        ));
        assert!(matches!(
            get_attr(&Value::String("A".into()), &Value::Int(0)).unwrap(),
            Value::Int(65)
        ));

        let obj = Value::object(Default::default());
        assert!(get_attr(&obj, &Value::String("missing".into())).unwrap().is_nil());
        assert!(get_attr(&obj, &Value::Nil).is_err());

        set_attr(&obj, Value::String("n".into()), Value::Int(2), None).unwrap();
        set_attr(&obj, Value::String("n".into()), Value::Int(3), Some(Opcode::BinaryMul)).unwrap();
        assert!(matches!(get_attr(&obj, &Value::String("n".into())).unwrap(), Value::Int(6)));

        assert!(set_attr(&Value::String("s".into()), Value::Int(0), Value::Int(1), None).is_err());
    }
}
