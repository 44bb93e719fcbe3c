//! Arithmetic, subscript and comparison operators

use std::cmp::Ordering;

use crate::code::CmpOp;
use crate::error::{ExecError, ExecResult};
use crate::object::Slice;
use crate::value::Value;

fn unsupported(op: &str, lhs: &Value, rhs: &Value) -> ExecError {
    ExecError::type_error(format!(
        "unsupported operand type(s) for {op}: '{}' and '{}'",
        lhs.type_name(),
        rhs.type_name()
    ))
}

fn overflow() -> ExecError {
    ExecError::Overflow("integer result out of range".to_string())
}

fn as_float(v: &Value) -> Option<f64> {
    match v {
        Value::Float(f) => Some(*f),
        Value::Int(_) | Value::Bool(_) => v.as_int().map(|i| i as f64),
        _ => None,
    }
}

fn is_number(v: &Value) -> bool {
    matches!(v, Value::Int(_) | Value::Bool(_) | Value::Float(_))
}

pub fn add(lhs: &Value, rhs: &Value) -> ExecResult<Value> {
    match (lhs, rhs) {
        (Value::Int(_) | Value::Bool(_), Value::Int(_) | Value::Bool(_)) => {
            let (a, b) = (lhs.as_int().unwrap_or(0), rhs.as_int().unwrap_or(0));
            a.checked_add(b).map(Value::Int).ok_or_else(overflow)
        }
        _ if is_number(lhs) && is_number(rhs) => Ok(Value::Float(
            as_float(lhs).unwrap_or(0.0) + as_float(rhs).unwrap_or(0.0),
        )),
        (Value::Str(a), Value::Str(b)) => Ok(Value::str(&format!("{a}{b}"))),
        (Value::Bytes(a), Value::Bytes(b)) => Ok(Value::Bytes([&a[..], &b[..]].concat().into())),
        (Value::Tuple(a), Value::Tuple(b)) => Ok(Value::tuple([&a[..], &b[..]].concat())),
        (Value::List(a), Value::List(b)) => {
            let joined = [&a.borrow()[..], &b.borrow()[..]].concat();
            Ok(Value::list(joined))
        }
        _ => Err(unsupported("+", lhs, rhs)),
    }
}

pub fn sub(lhs: &Value, rhs: &Value) -> ExecResult<Value> {
    match (lhs, rhs) {
        (Value::Int(_) | Value::Bool(_), Value::Int(_) | Value::Bool(_)) => {
            let (a, b) = (lhs.as_int().unwrap_or(0), rhs.as_int().unwrap_or(0));
            a.checked_sub(b).map(Value::Int).ok_or_else(overflow)
        }
        _ if is_number(lhs) && is_number(rhs) => Ok(Value::Float(
            as_float(lhs).unwrap_or(0.0) - as_float(rhs).unwrap_or(0.0),
        )),
        _ => Err(unsupported("-", lhs, rhs)),
    }
}

pub fn mul(lhs: &Value, rhs: &Value) -> ExecResult<Value> {
    match (lhs, rhs) {
        (Value::Int(_) | Value::Bool(_), Value::Int(_) | Value::Bool(_)) => {
            let (a, b) = (lhs.as_int().unwrap_or(0), rhs.as_int().unwrap_or(0));
            a.checked_mul(b).map(Value::Int).ok_or_else(overflow)
        }
        _ if is_number(lhs) && is_number(rhs) => Ok(Value::Float(
            as_float(lhs).unwrap_or(0.0) * as_float(rhs).unwrap_or(0.0),
        )),
        (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) => {
            Ok(Value::str(&s.repeat((*n).max(0) as usize)))
        }
        (Value::Tuple(t), Value::Int(n)) | (Value::Int(n), Value::Tuple(t)) => {
            Ok(Value::tuple(repeat(t, *n)))
        }
        (Value::List(l), Value::Int(n)) | (Value::Int(n), Value::List(l)) => {
            Ok(Value::list(repeat(&l.borrow(), *n)))
        }
        _ => Err(unsupported("*", lhs, rhs)),
    }
}

fn repeat(items: &[Value], n: i64) -> Vec<Value> {
    let n = n.max(0) as usize;
    items.iter().cloned().cycle().take(items.len() * n).collect()
}

/// Positions selected by `slice` over a sequence of `len` items
pub fn slice_indices(len: usize, slice: &Slice) -> ExecResult<Vec<usize>> {
    let bound = |v: &Value| -> ExecResult<Option<i64>> {
        match v {
            Value::None => Ok(None),
            other => other.as_int().map(Some).ok_or_else(|| {
                ExecError::type_error("slice indices must be integers or None")
            }),
        }
    };
    let step = bound(&slice.step)?.unwrap_or(1);
    if step == 0 {
        return Err(ExecError::Value("slice step cannot be zero".to_string()));
    }
    let len = len as i64;
    let clamp = |i: i64| {
        let i = if i < 0 { i + len } else { i };
        if step > 0 {
            i.clamp(0, len)
        } else {
            i.clamp(-1, len - 1)
        }
    };
    let (default_start, default_stop) = if step > 0 { (0, len) } else { (len - 1, -1) };
    let start = bound(&slice.start)?.map_or(default_start, clamp);
    let stop = bound(&slice.stop)?.map_or(default_stop, clamp);

    let mut out = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        out.push(i as usize);
        i += step;
    }
    Ok(out)
}

fn index(len: usize, key: &Value, kind: &str) -> ExecResult<usize> {
    let i = key.as_int().ok_or_else(|| {
        ExecError::type_error(format!(
            "{kind} indices must be integers or slices, not {}",
            key.type_name()
        ))
    })?;
    let resolved = if i < 0 { i + len as i64 } else { i };
    if resolved < 0 || resolved >= len as i64 {
        return Err(ExecError::Index(format!("{kind} index out of range")));
    }
    Ok(resolved as usize)
}

fn select<T: Clone>(items: &[T], key: &Value, kind: &str) -> ExecResult<Result<Vec<T>, T>> {
    match key {
        Value::Slice(s) => Ok(Ok(slice_indices(items.len(), s)?
            .into_iter()
            .map(|i| items[i].clone())
            .collect())),
        _ => Ok(Err(items[index(items.len(), key, kind)?].clone())),
    }
}

/// `container[key]`; a slice key yields a new sequence
pub fn getitem(container: &Value, key: &Value) -> ExecResult<Value> {
    match container {
        Value::Tuple(t) => Ok(match select(t, key, "tuple")? {
            Ok(items) => Value::tuple(items),
            Err(item) => item,
        }),
        Value::List(l) => {
            let items = l.borrow();
            Ok(match select(&items, key, "list")? {
                Ok(items) => Value::list(items),
                Err(item) => item,
            })
        }
        Value::Bytes(b) => Ok(match select(b, key, "bytes")? {
            Ok(bytes) => Value::Bytes(bytes.into()),
            Err(byte) => Value::Int(i64::from(byte)),
        }),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(match select(&chars, key, "string")? {
                Ok(chars) => Value::str(&chars.into_iter().collect::<String>()),
                Err(c) => Value::str(c.encode_utf8(&mut [0u8; 4])),
            })
        }
        Value::Dict(d) => d
            .borrow()
            .get(key)?
            .ok_or_else(|| ExecError::Key(format!("{key:?}"))),
        other => Err(ExecError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn order(lhs: &Value, rhs: &Value) -> ExecResult<Ordering> {
    let incomparable = || {
        ExecError::type_error(format!(
            "'<' not supported between instances of '{}' and '{}'",
            lhs.type_name(),
            rhs.type_name()
        ))
    };
    match (lhs, rhs) {
        (Value::Int(_) | Value::Bool(_), Value::Int(_) | Value::Bool(_)) => {
            Ok(lhs.as_int().cmp(&rhs.as_int()))
        }
        _ if is_number(lhs) && is_number(rhs) => as_float(lhs)
            .partial_cmp(&as_float(rhs))
            .ok_or_else(incomparable),
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        (Value::Bytes(a), Value::Bytes(b)) => Ok(a.cmp(b)),
        (Value::Tuple(a), Value::Tuple(b)) => order_seq(a, b),
        (Value::List(a), Value::List(b)) => order_seq(&a.borrow(), &b.borrow()),
        _ => Err(incomparable()),
    }
}

fn order_seq(a: &[Value], b: &[Value]) -> ExecResult<Ordering> {
    for (x, y) in a.iter().zip(b) {
        if !x.py_eq(y) {
            return order(x, y);
        }
    }
    Ok(a.len().cmp(&b.len()))
}

pub fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> ExecResult<bool> {
    Ok(match op {
        CmpOp::Eq => lhs.py_eq(rhs),
        CmpOp::Ne => !lhs.py_eq(rhs),
        CmpOp::Lt => order(lhs, rhs)? == Ordering::Less,
        CmpOp::Le => order(lhs, rhs)? != Ordering::Greater,
        CmpOp::Gt => order(lhs, rhs)? == Ordering::Greater,
        CmpOp::Ge => order(lhs, rhs)? != Ordering::Less,
    })
}
