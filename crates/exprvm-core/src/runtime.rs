//! Runtime value model
//!
//! Polymorphic operations the dispatch loop applies to values: keyed and
//! indexed access, slicing, callable resolution, membership, length,
//! negation, and numeric coercion. Every operation classifies the value
//! first and faults on shapes it does not support. References are
//! dereferenced and the operation retried.

use std::borrow::Cow;

use crate::error::{VmError, VmResult};
use crate::function::Function;
use crate::operators::values_equal;
use crate::record::NativeMethod;
use crate::value::Value;

/// Numeric view of a value, used for coercion and arithmetic
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Number {
    Int(i64),
    Uint(u64),
    Float(f64),
}

impl Number {
    /// Classify `value`, if it is numeric
    pub(crate) fn of(value: &Value) -> Option<Self> {
        Some(match *value {
            Value::Int(i) | Value::Int64(i) => Self::Int(i),
            Value::Int8(i) => Self::Int(i64::from(i)),
            Value::Int16(i) => Self::Int(i64::from(i)),
            Value::Int32(i) => Self::Int(i64::from(i)),
            Value::Uint(u) | Value::Uint64(u) => Self::Uint(u),
            Value::Uint8(u) => Self::Uint(u64::from(u)),
            Value::Uint16(u) => Self::Uint(u64::from(u)),
            Value::Uint32(u) => Self::Uint(u64::from(u)),
            Value::Float32(f) => Self::Float(f64::from(f)),
            Value::Float64(f) => Self::Float(f),
            _ => return None,
        })
    }

    /// Truncating conversion to a signed integer
    pub(crate) fn to_i64(self) -> i64 {
        match self {
            Self::Int(i) => i,
            Self::Uint(u) => u as i64,
            Self::Float(f) => f as i64,
        }
    }

    /// Conversion to a 64-bit float
    pub(crate) fn to_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Uint(u) => u as f64,
            Self::Float(f) => f,
        }
    }

    pub(crate) fn is_float(self) -> bool {
        matches!(self, Self::Float(_))
    }

    /// Ordering across signedness and widths
    pub(crate) fn compare(self, other: Self) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(&b)),
            (Self::Uint(a), Self::Uint(b)) => Some(a.cmp(&b)),
            (Self::Int(a), Self::Uint(b)) => Some(i128::from(a).cmp(&i128::from(b))),
            (Self::Uint(a), Self::Int(b)) => Some(i128::from(a).cmp(&i128::from(b))),
            (a, b) => a.to_f64().partial_cmp(&b.to_f64()),
        }
    }
}

/// Longest chain of references `resolve` follows before giving up
const MAX_REF_DEPTH: usize = 64;

/// Follow references until a non-reference value is reached
///
/// A chain longer than `MAX_REF_DEPTH` is treated as a cycle and faults.
pub(crate) fn resolve(value: &Value) -> VmResult<Cow<'_, Value>> {
    let Value::Ref(cell) = value else {
        return Ok(Cow::Borrowed(value));
    };
    let mut current = cell.get();
    for _ in 0..MAX_REF_DEPTH {
        match current {
            Value::Ref(next) => current = next.get(),
            other => return Ok(Cow::Owned(other)),
        }
    }
    Err(VmError::type_error("reference cycle"))
}

/// Read `key` out of `from`
///
/// Arrays and strings take an integer index (a string yields the byte at
/// that index). Maps take a string key and yield nil for a missing key.
/// Records take a field name.
pub fn fetch(from: &Value, key: &Value) -> VmResult<Value> {
    match from {
        Value::Array(items) => {
            let index = checked_index(to_int(key)?, items.len())?;
            return Ok(items[index].clone());
        }
        Value::String(s) => {
            let index = checked_index(to_int(key)?, s.len())?;
            return Ok(Value::Uint8(s.as_bytes()[index]));
        }
        Value::Map(map) => {
            let Value::String(name) = key else {
                return Err(VmError::type_error(format!(
                    "cannot use {} as key of map",
                    key.type_name()
                )));
            };
            return Ok(map.get(&**name).cloned().unwrap_or_default());
        }
        Value::Record(record) => {
            if let Some(value) = key.as_str().and_then(|name| record.field(name)) {
                return Ok(value.clone());
            }
        }
        Value::Ref(_) => return fetch(&*resolve(from)?, key),
        _ => {}
    }
    Err(VmError::type_error(format!("{from} does not contain {key}")))
}

fn checked_index(index: i64, len: usize) -> VmResult<usize> {
    usize::try_from(index)
        .ok()
        .filter(|&i| i < len)
        .ok_or_else(|| {
            VmError::range_error(format!("index out of range [{index}] with length {len}"))
        })
}

/// Half-open sub-range `[from, to)` of an array or string
pub fn slice(array: &Value, from: &Value, to: &Value) -> VmResult<Value> {
    match array {
        Value::Array(items) => {
            let range = checked_bounds(to_int(from)?, to_int(to)?, items.len())?;
            Ok(Value::array(items[range].to_vec()))
        }
        Value::String(s) => {
            let range = checked_bounds(to_int(from)?, to_int(to)?, s.len())?;
            let (start, end) = (range.start, range.end);
            s.get(range).map(Value::string).ok_or_else(|| {
                VmError::range_error(format!("slice [{start}:{end}] splits a character"))
            })
        }
        Value::Ref(_) => slice(&*resolve(array)?, from, to),
        other => Err(VmError::type_error(format!(
            "cannot slice {}",
            other.type_name()
        ))),
    }
}

fn checked_bounds(from: i64, to: i64, len: usize) -> VmResult<std::ops::Range<usize>> {
    match (usize::try_from(from), usize::try_from(to)) {
        (Ok(start), Ok(end)) if start <= end && end <= len => Ok(start..end),
        _ => Err(VmError::range_error(format!(
            "slice bounds out of range [{from}:{to}] with length {len}"
        ))),
    }
}

/// Resolve the callable `name` on `receiver`
///
/// Methods win over same-named map entries and fields. A method found on a
/// record is returned with the record bound as its receiver.
pub fn fetch_callable(receiver: &Value, name: &str) -> VmResult<Function> {
    if let Value::Record(record) = receiver
        && let Some(method) = record.method(name)
    {
        return Ok(bind(receiver.clone(), record.type_name(), name, method));
    }

    let target = match receiver {
        Value::Ref(_) => {
            let inner = resolve(receiver)?.into_owned();
            if let Value::Record(record) = &inner
                && let Some(method) = record.method(name)
            {
                return Ok(bind(inner.clone(), record.type_name(), name, method));
            }
            inner
        }
        other => other.clone(),
    };

    let entry = match &target {
        Value::Map(map) => map.get(name),
        Value::Record(record) => record.field(name),
        _ => None,
    };

    match entry {
        Some(Value::Function(func)) => Ok(func.clone()),
        Some(other) => Err(VmError::type_error(format!(
            "cannot call {name} of type {}",
            other.type_name()
        ))),
        None => Err(VmError::Unresolved {
            name: name.to_string(),
            receiver: receiver.type_name(),
        }),
    }
}

fn bind(receiver: Value, type_name: &str, name: &str, method: &NativeMethod) -> Function {
    let method = method.clone();
    Function::new(format!("{type_name}.{name}"), move |args| {
        method(&receiver, args)
    })
}

/// Whether `needle` is in `haystack`
///
/// Arrays are scanned for an equal element, maps tested for the key,
/// records for a field name. A nil haystack contains nothing.
pub fn membership(needle: &Value, haystack: &Value) -> VmResult<bool> {
    match haystack {
        Value::Nil => Ok(false),
        Value::Array(items) => Ok(items.iter().any(|item| values_equal(item, needle))),
        Value::Map(map) => match needle {
            Value::String(key) => Ok(map.contains_key(&**key)),
            _ => Err(VmError::type_error(format!(
                "cannot use {} as index to map",
                needle.type_name()
            ))),
        },
        Value::Record(record) => match needle {
            Value::String(name) => Ok(record.has_field(name)),
            _ => Err(VmError::type_error(format!(
                "cannot use {} as field name of {}",
                needle.type_name(),
                record.type_name()
            ))),
        },
        Value::Ref(_) => membership(needle, &*resolve(haystack)?),
        other => Err(VmError::type_error(format!(
            "operator \"in\" not defined on {}",
            other.type_name()
        ))),
    }
}

/// Length of an array, or byte length of a string
///
/// Maps and records have no length.
pub fn length(value: &Value) -> VmResult<Value> {
    let len = match &*resolve(value)? {
        Value::Array(items) => items.len(),
        Value::String(s) => s.len(),
        other => {
            return Err(VmError::type_error(format!(
                "invalid argument for len (type {})",
                other.type_name()
            )));
        }
    };
    Ok(Value::Int(len as i64))
}

/// Arithmetic negation, preserving the operand's width
pub fn negate(value: &Value) -> VmResult<Value> {
    Ok(match *resolve(value)? {
        Value::Int(i) => Value::Int(i.wrapping_neg()),
        Value::Int8(i) => Value::Int8(i.wrapping_neg()),
        Value::Int16(i) => Value::Int16(i.wrapping_neg()),
        Value::Int32(i) => Value::Int32(i.wrapping_neg()),
        Value::Int64(i) => Value::Int64(i.wrapping_neg()),
        Value::Uint(u) => Value::Uint(u.wrapping_neg()),
        Value::Uint8(u) => Value::Uint8(u.wrapping_neg()),
        Value::Uint16(u) => Value::Uint16(u.wrapping_neg()),
        Value::Uint32(u) => Value::Uint32(u.wrapping_neg()),
        Value::Uint64(u) => Value::Uint64(u.wrapping_neg()),
        Value::Float32(f) => Value::Float32(-f),
        Value::Float64(f) => Value::Float64(-f),
        ref other => {
            return Err(VmError::type_error(format!(
                "invalid operation: - {}",
                other.type_name()
            )));
        }
    })
}

/// `a` raised to the power `b`, as 64-bit floats
pub fn exponent(a: &Value, b: &Value) -> VmResult<Value> {
    Ok(Value::Float64(to_float64(a)?.powf(to_float64(b)?)))
}

/// Inclusive ascending range `[a, a+1, ..., b]`; empty when `b < a`
pub fn make_range(a: &Value, b: &Value) -> VmResult<Value> {
    let min = to_int(a)?;
    let max = to_int(b)?;
    let span = i128::from(max) - i128::from(min) + 1;
    if span <= 0 {
        return Ok(Value::array(Vec::new()));
    }
    let too_large = || VmError::range_error(format!("range {min}..{max} is too large"));
    let len = usize::try_from(span).map_err(|_| too_large())?;
    let mut items: Vec<Value> = Vec::new();
    items.try_reserve_exact(len).map_err(|_| too_large())?;
    items.extend((min..=max).map(Value::Int));
    Ok(Value::array(items))
}

fn coerce(value: &Value, target: &str) -> VmResult<Number> {
    let value = resolve(value)?;
    Number::of(&value).ok_or_else(|| {
        VmError::type_error(format!(
            "invalid operation: {target}({})",
            value.type_name()
        ))
    })
}

/// Convert any numeric value to the native integer, truncating floats
pub fn to_int(value: &Value) -> VmResult<i64> {
    coerce(value, "int").map(Number::to_i64)
}

/// Convert any numeric value to a 64-bit integer, truncating floats
pub fn to_int64(value: &Value) -> VmResult<i64> {
    coerce(value, "int64").map(Number::to_i64)
}

/// Convert any numeric value to a 64-bit float
pub fn to_float64(value: &Value) -> VmResult<f64> {
    coerce(value, "float64").map(Number::to_f64)
}
