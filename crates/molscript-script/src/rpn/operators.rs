//! Operator semantics

use lin_alg::f64::Vec3;
use molscript_select::CompareOp;

use crate::error::{ErrorKind, ScriptError, ScriptResult};
use crate::token::Operator;
use crate::value::Value;

fn number(value: &Value) -> ScriptResult<f64> {
    value
        .as_f64()
        .ok_or_else(|| ScriptError::new(ErrorKind::NumberExpected, &[&value.to_string()]))
}

fn scale(p: Vec3, k: f64) -> Vec3 {
    Vec3::new(p.x * k, p.y * k, p.z * k)
}

/// Apply a binary operator
pub(super) fn binary(op: Operator, lhs: Value, rhs: Value) -> ScriptResult<Value> {
    if let Some(cmp) = op.comparison() {
        return Ok(Value::Boolean(compare(cmp, &lhs, &rhs)));
    }
    match op {
        Operator::And | Operator::Or | Operator::Xor => Ok(logical(op, lhs, rhs)),
        Operator::Plus => plus(lhs, rhs),
        Operator::Minus => minus(lhs, rhs),
        Operator::Times => times(lhs, rhs),
        Operator::Divide => divide(lhs, rhs),
        Operator::IntDivide => {
            let (a, b) = (number(&lhs)?, number(&rhs)?);
            let quotient = (a / b).trunc();
            if quotient.is_finite() && quotient.abs() <= i32::MAX as f64 {
                Ok(Value::Integer(quotient as i32))
            } else {
                Ok(Value::Float(f64::NAN))
            }
        }
        Operator::Modulo => match (&lhs, &rhs) {
            (Value::Integer(a), Value::Integer(b)) => Ok(match a.checked_rem(*b) {
                Some(r) => Value::Integer(r),
                None => Value::Float(f64::NAN),
            }),
            _ => Ok(Value::Float(number(&lhs)? % number(&rhs)?)),
        },
        Operator::Power => {
            if let (Value::Integer(a), Value::Integer(b)) = (&lhs, &rhs) {
                if let Some(p) = u32::try_from(*b).ok().and_then(|e| a.checked_pow(e)) {
                    return Ok(Value::Integer(p));
                }
            }
            Ok(Value::Float(number(&lhs)?.powf(number(&rhs)?)))
        }
        _ => Err(ScriptError::of(ErrorKind::UnrecognizedExpression)),
    }
}

/// `and`/`or`/`xor`: set algebra on selections, truth values otherwise
fn logical(op: Operator, lhs: Value, rhs: Value) -> Value {
    if let (Value::Selection(a), Value::Selection(b)) = (&lhs, &rhs) {
        return Value::Selection(match op {
            Operator::And => a.intersection(b),
            Operator::Or => a.union(b),
            _ => a.symmetric_difference(b),
        });
    }
    let (a, b) = (lhs.is_truthy(), rhs.is_truthy());
    Value::Boolean(match op {
        Operator::And => a && b,
        Operator::Or => a || b,
        _ => a != b,
    })
}

/// Unary `not`; complement for selections
pub(super) fn not(value: Value) -> Value {
    match value {
        Value::Selection(sel) => Value::Selection(sel.complement()),
        other => Value::Boolean(!other.is_truthy()),
    }
}

/// Unary minus
pub(super) fn negate(value: Value) -> ScriptResult<Value> {
    Ok(match value {
        Value::Integer(i) => match i.checked_neg() {
            Some(n) => Value::Integer(n),
            None => Value::Float(-(i as f64)),
        },
        Value::Point3(p) => Value::Point3(scale(p, -1.0)),
        other => Value::Float(-number(&other)?),
    })
}

/// Compare two values; mixed non-numeric types are never equal
pub(crate) fn compare(op: CompareOp, lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::String(a), Value::String(b)) => op.compare_str(a, b),
        (Value::String(_), other) | (other, Value::String(_))
            if other.as_f64().is_some() && !matches!(other, Value::Selection(_)) =>
        {
            match (lhs.as_f64(), rhs.as_f64()) {
                (Some(a), Some(b)) => op.compare_f64(a, b),
                _ => op == CompareOp::Ne,
            }
        }
        (Value::Selection(a), Value::Selection(b)) => match op {
            CompareOp::Eq => a == b,
            CompareOp::Ne => a != b,
            _ => op.compare_f64(a.count() as f64, b.count() as f64),
        },
        (Value::Integer(a), Value::Integer(b)) => op.compare_i32(*a, *b),
        (a, b) if a.is_numeric() || matches!(a, Value::Boolean(_)) => {
            match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) if !matches!(b, Value::Selection(_)) => op.compare_f64(x, y),
                _ => op == CompareOp::Ne,
            }
        }
        (a, b) => match op {
            CompareOp::Eq => a == b,
            CompareOp::Ne => a != b,
            _ => false,
        },
    }
}

fn plus(lhs: Value, rhs: Value) -> ScriptResult<Value> {
    Ok(match (lhs, rhs) {
        (Value::List(mut a), Value::List(b)) => {
            a.extend(b);
            Value::List(a)
        }
        (Value::List(mut a), other) => {
            a.push(other.to_string());
            Value::List(a)
        }
        (a @ Value::String(_), b) | (a, b @ Value::String(_)) => {
            Value::String(format!("{}{}", a, b))
        }
        (Value::Selection(a), Value::Selection(b)) => Value::Selection(a.union(&b)),
        (Value::Point3(a), Value::Point3(b)) => Value::Point3(Vec3::new(a.x + b.x, a.y + b.y, a.z + b.z)),
        (Value::Integer(a), Value::Integer(b)) => match a.checked_add(b) {
            Some(sum) => Value::Integer(sum),
            None => Value::Float(a as f64 + b as f64),
        },
        (a, b) => Value::Float(number(&a)? + number(&b)?),
    })
}

fn minus(lhs: Value, rhs: Value) -> ScriptResult<Value> {
    Ok(match (lhs, rhs) {
        (Value::Selection(a), Value::Selection(b)) => Value::Selection(a.difference(&b)),
        (Value::Point3(a), Value::Point3(b)) => Value::Point3(Vec3::new(a.x - b.x, a.y - b.y, a.z - b.z)),
        (Value::Integer(a), Value::Integer(b)) => match a.checked_sub(b) {
            Some(d) => Value::Integer(d),
            None => Value::Float(a as f64 - b as f64),
        },
        (a, b) => Value::Float(number(&a)? - number(&b)?),
    })
}

fn times(lhs: Value, rhs: Value) -> ScriptResult<Value> {
    Ok(match (lhs, rhs) {
        // dot product
        (Value::Point3(a), Value::Point3(b)) => Value::Float(a.x * b.x + a.y * b.y + a.z * b.z),
        (Value::Point3(p), k) | (k, Value::Point3(p)) => Value::Point3(scale(p, number(&k)?)),
        (Value::Integer(a), Value::Integer(b)) => match a.checked_mul(b) {
            Some(p) => Value::Integer(p),
            None => Value::Float(a as f64 * b as f64),
        },
        (a, b) => Value::Float(number(&a)? * number(&b)?),
    })
}

fn divide(lhs: Value, rhs: Value) -> ScriptResult<Value> {
    Ok(match (lhs, rhs) {
        (Value::Point3(p), k) => Value::Point3(scale(p, 1.0 / number(&k)?)),
        (a, b) => Value::Float(number(&a)? / number(&b)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use molscript_select::Selection;

    #[test]
    fn test_selection_algebra() {
        let a = Selection::from_indices(5, [0, 1, 2]);
        let b = Selection::from_indices(5, [2, 3]);
        let and = binary(Operator::And, a.clone().into(), b.clone().into()).unwrap();
        assert_eq!(and, Value::Selection(Selection::from_indices(5, [2])));
        let or = binary(Operator::Or, a.clone().into(), b.into()).unwrap();
        assert_eq!(or.as_selection().map(|s| s.count()), Some(4));
        assert_eq!(not(a.into()).as_selection().map(|s| s.count()), Some(2));
    }

    #[test]
    fn test_mixed_type_equality() {
        assert!(!compare(CompareOp::Eq, &Value::Point3(Vec3::new(0.0, 0.0, 0.0)), &Value::Integer(0)));
        assert!(compare(CompareOp::Ne, &Value::Point3(Vec3::new(0.0, 0.0, 0.0)), &Value::Integer(0)));
        assert!(compare(CompareOp::Eq, &Value::String("2".into()), &Value::Integer(2)));
        assert!(!compare(CompareOp::Eq, &Value::String("two".into()), &Value::Integer(2)));
    }

    #[test]
    fn test_integer_overflow_promotes() {
        let sum = binary(Operator::Plus, Value::Integer(i32::MAX), Value::Integer(1)).unwrap();
        assert_eq!(sum, Value::Float(i32::MAX as f64 + 1.0));
    }

    #[test]
    fn test_point_arithmetic() {
        let p = Value::Point3(Vec3::new(1.0, 2.0, 3.0));
        let doubled = binary(Operator::Times, p.clone(), Value::Integer(2)).unwrap();
        assert_eq!(doubled, Value::Point3(Vec3::new(2.0, 4.0, 6.0)));
        let dot = binary(Operator::Times, p.clone(), p).unwrap();
        assert_eq!(dot, Value::Float(14.0));
    }
}
