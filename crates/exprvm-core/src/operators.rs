//! Comparison and arithmetic operators
//!
//! Binary functions over two values. Integers of any width combine as 64-bit
//! integers and produce the native `Int`; a float on either side makes the
//! result a `Float64`. Shapes an operator does not define fault with
//! `invalid operation: <T> <op> <T>`.

use std::cmp::Ordering;

use crate::error::{VmError, VmResult};
use crate::runtime::{Number, resolve};
use crate::value::Value;

fn invalid(a: &Value, op: &str, b: &Value) -> VmError {
    VmError::type_error(format!(
        "invalid operation: {} {op} {}",
        a.type_name(),
        b.type_name()
    ))
}

/// Value equality used by `equal` and `in`
///
/// Numbers compare by value across widths; everything else compares
/// structurally. Mismatched shapes are unequal. A reference cycle equals
/// only the same cell.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (Number::of(a), Number::of(b)) {
        return x.compare(y) == Some(Ordering::Equal);
    }
    match (a, b) {
        (Value::Ref(_), _) | (_, Value::Ref(_)) => match (resolve(a), resolve(b)) {
            (Ok(x), Ok(y)) => values_equal(&x, &y),
            _ => matches!((a, b), (Value::Ref(x), Value::Ref(y)) if x.ptr_eq(y)),
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys.iter()).all(|(x, y)| values_equal(x, y))
        }
        (Value::Map(xs), Value::Map(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        (Value::Record(xs), Value::Record(ys)) => {
            xs.type_name() == ys.type_name()
                && xs.fields().count() == ys.fields().count()
                && xs
                    .fields()
                    .all(|(k, x)| ys.field(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// `a == b`
pub fn equal(a: &Value, b: &Value) -> VmResult<Value> {
    Ok(Value::Bool(values_equal(a, b)))
}

fn ordering(a: &Value, op: &str, b: &Value) -> VmResult<Option<Ordering>> {
    let (left, right) = (resolve(a)?, resolve(b)?);
    if let (Some(x), Some(y)) = (Number::of(&left), Number::of(&right)) {
        return Ok(x.compare(y));
    }
    match (&*left, &*right) {
        (Value::String(x), Value::String(y)) => Ok(Some(x.cmp(y))),
        _ => Err(invalid(a, op, b)),
    }
}

/// `a < b`
pub fn less(a: &Value, b: &Value) -> VmResult<Value> {
    let ord = ordering(a, "<", b)?;
    Ok(Value::Bool(ord == Some(Ordering::Less)))
}

/// `a > b`
pub fn more(a: &Value, b: &Value) -> VmResult<Value> {
    let ord = ordering(a, ">", b)?;
    Ok(Value::Bool(ord == Some(Ordering::Greater)))
}

/// `a <= b`
pub fn less_or_equal(a: &Value, b: &Value) -> VmResult<Value> {
    let ord = ordering(a, "<=", b)?;
    Ok(Value::Bool(matches!(
        ord,
        Some(Ordering::Less | Ordering::Equal)
    )))
}

/// `a >= b`
pub fn more_or_equal(a: &Value, b: &Value) -> VmResult<Value> {
    let ord = ordering(a, ">=", b)?;
    Ok(Value::Bool(matches!(
        ord,
        Some(Ordering::Greater | Ordering::Equal)
    )))
}

fn arithmetic(
    a: &Value,
    op: &str,
    b: &Value,
    int: fn(i64, i64) -> i64,
    float: fn(f64, f64) -> f64,
) -> VmResult<Value> {
    let (left, right) = (resolve(a)?, resolve(b)?);
    match (Number::of(&left), Number::of(&right)) {
        (Some(x), Some(y)) if x.is_float() || y.is_float() => {
            Ok(Value::Float64(float(x.to_f64(), y.to_f64())))
        }
        (Some(x), Some(y)) => Ok(Value::Int(int(x.to_i64(), y.to_i64()))),
        _ => Err(invalid(a, op, b)),
    }
}

/// `a + b`; also concatenates strings
pub fn add(a: &Value, b: &Value) -> VmResult<Value> {
    if let (Value::String(x), Value::String(y)) = (&*resolve(a)?, &*resolve(b)?) {
        let mut out = String::with_capacity(x.len() + y.len());
        out.push_str(x);
        out.push_str(y);
        return Ok(Value::string(out));
    }
    arithmetic(a, "+", b, i64::wrapping_add, |x, y| x + y)
}

/// `a - b`
pub fn subtract(a: &Value, b: &Value) -> VmResult<Value> {
    arithmetic(a, "-", b, i64::wrapping_sub, |x, y| x - y)
}

/// `a * b`
pub fn multiply(a: &Value, b: &Value) -> VmResult<Value> {
    arithmetic(a, "*", b, i64::wrapping_mul, |x, y| x * y)
}

/// `a / b`, always as 64-bit floats
pub fn divide(a: &Value, b: &Value) -> VmResult<Value> {
    let (left, right) = (resolve(a)?, resolve(b)?);
    match (Number::of(&left), Number::of(&right)) {
        (Some(x), Some(y)) => Ok(Value::Float64(x.to_f64() / y.to_f64())),
        _ => Err(invalid(a, "/", b)),
    }
}

/// `a % b` over integers
pub fn modulo(a: &Value, b: &Value) -> VmResult<Value> {
    let (left, right) = (resolve(a)?, resolve(b)?);
    match (Number::of(&left), Number::of(&right)) {
        (Some(x), Some(y)) if !x.is_float() && !y.is_float() => {
            let divisor = y.to_i64();
            if divisor == 0 {
                return Err(VmError::range_error("integer divide by zero"));
            }
            Ok(Value::Int(x.to_i64().wrapping_rem(divisor)))
        }
        _ => Err(invalid(a, "%", b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::Function;
    use crate::record::Record;
    use crate::value::ValueCell;

    #[test]
    fn test_equal_across_widths() {
        assert_eq!(equal(&Value::Int(1), &Value::Uint8(1)).unwrap(), Value::Bool(true));
        assert_eq!(equal(&Value::Int64(2), &Value::Float32(2.0)).unwrap(), Value::Bool(true));
        assert_eq!(equal(&Value::Int(-1), &Value::Uint64(u64::MAX)).unwrap(), Value::Bool(false));
        assert_eq!(equal(&Value::Float64(f64::NAN), &Value::Float64(f64::NAN)).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_equal_is_total() {
        assert_eq!(equal(&Value::Nil, &Value::Nil).unwrap(), Value::Bool(true));
        assert_eq!(equal(&Value::from("1"), &Value::Int(1)).unwrap(), Value::Bool(false));
        assert_eq!(equal(&Value::Nil, &Value::Bool(false)).unwrap(), Value::Bool(false));

        let f = Function::new("f", |_| Ok(Value::Nil));
        assert!(values_equal(&Value::from(f.clone()), &Value::from(f)));
    }

    #[test]
    fn test_equal_structural() {
        let a = Value::array(vec![Value::Int(1), Value::map_from([("k", Value::Int8(2))])]);
        let b = Value::array(vec![Value::Uint(1), Value::map_from([("k", Value::Float64(2.0))])]);
        assert!(values_equal(&a, &b));
        assert!(values_equal(&Value::reference(a.clone()), &b));
        assert!(!values_equal(&a, &Value::array(vec![Value::Int(1)])));

        let r1 = Value::record(Record::builder("P").field("x", 1i64).build());
        let r2 = Value::record(Record::builder("P").field("x", 1.0f64).build());
        let r3 = Value::record(Record::builder("Q").field("x", 1i64).build());
        assert!(values_equal(&r1, &r2));
        assert!(!values_equal(&r1, &r3));
    }

    #[test]
    fn test_ordering() {
        assert_eq!(less(&Value::Int(1), &Value::Float64(1.5)).unwrap(), Value::Bool(true));
        assert_eq!(more(&Value::Uint8(3), &Value::Int(-3)).unwrap(), Value::Bool(true));
        assert_eq!(less_or_equal(&Value::Int(2), &Value::Int32(2)).unwrap(), Value::Bool(true));
        assert_eq!(more_or_equal(&Value::Int(1), &Value::Int(2)).unwrap(), Value::Bool(false));
        assert_eq!(less(&Value::from("a"), &Value::from("b")).unwrap(), Value::Bool(true));
        assert_eq!(less(&Value::Float64(f64::NAN), &Value::Int(1)).unwrap(), Value::Bool(false));

        let err = less(&Value::from("a"), &Value::Int(1)).unwrap_err();
        assert_eq!(err.to_string(), "invalid operation: string < int");
    }

    #[test]
    fn test_arithmetic_promotion() {
        assert_eq!(add(&Value::Int(1), &Value::Uint8(2)).unwrap(), Value::Int(3));
        assert_eq!(add(&Value::Int(1), &Value::Float32(0.5)).unwrap(), Value::Float64(1.5));
        assert_eq!(subtract(&Value::Int(1), &Value::Int(3)).unwrap(), Value::Int(-2));
        assert_eq!(multiply(&Value::Int16(4), &Value::Int(5)).unwrap(), Value::Int(20));
        assert_eq!(add(&Value::Int(i64::MAX), &Value::Int(1)).unwrap(), Value::Int(i64::MIN));
        assert_eq!(
            add(&Value::from("foo"), &Value::from("bar")).unwrap(),
            Value::from("foobar")
        );
        assert_eq!(
            add(&Value::from("foo"), &Value::Int(1)).unwrap_err().to_string(),
            "invalid operation: string + int"
        );
    }

    #[test]
    fn test_divide_is_float() {
        assert_eq!(divide(&Value::Int(7), &Value::Int(2)).unwrap(), Value::Float64(3.5));
        assert_eq!(
            divide(&Value::Int(1), &Value::Int(0)).unwrap(),
            Value::Float64(f64::INFINITY)
        );
        assert!(divide(&Value::Nil, &Value::Int(1)).is_err());
    }

    #[test]
    fn test_modulo() {
        assert_eq!(modulo(&Value::Int(7), &Value::Int(3)).unwrap(), Value::Int(1));
        assert_eq!(modulo(&Value::Int(-7), &Value::Uint8(3)).unwrap(), Value::Int(-1));
        assert_eq!(
            modulo(&Value::Int(7), &Value::Int(0)).unwrap_err().to_string(),
            "integer divide by zero"
        );
        assert!(modulo(&Value::Float64(7.0), &Value::Int(2)).is_err());
    }

    #[test]
    fn test_reference_cycle() {
        let cell = ValueCell::new(Value::Nil);
        let cyclic = Value::Ref(cell.clone());
        cell.set(cyclic.clone());

        assert!(values_equal(&cyclic, &cyclic));
        assert!(!values_equal(&cyclic, &Value::reference(Value::Nil)));
        assert!(!values_equal(&cyclic, &Value::Int(1)));
        assert_eq!(
            add(&cyclic, &Value::Int(1)).unwrap_err().to_string(),
            "reference cycle"
        );
        assert!(less(&Value::Int(1), &cyclic).is_err());
        assert!(modulo(&cyclic, &Value::Int(2)).is_err());

        cell.set(Value::Nil);
    }
}
