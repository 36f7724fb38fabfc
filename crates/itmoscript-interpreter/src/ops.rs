//! Operator and type-conversion registries (spec.md §4.4), expressed as a
//! match ladder rather than a runtime-mutable table: a sum-type target makes
//! the ladder equivalent to the registry and faster, since no built-in
//! operator needs to be added at runtime.

use itmoscript_ast::{BinaryOp, UnaryOp, Value};
use itmoscript_errors::{RuntimeError, RuntimeResult};
use itmoscript_span::Span;
use std::cmp::Ordering;

pub fn apply_unary(op: UnaryOp, operand: Value, span: Span) -> RuntimeResult<Value> {
    match (op, &operand) {
        (UnaryOp::Not, _) => Ok(Value::Bool(!operand.is_truthy())),
        (UnaryOp::Neg, Value::Int(i)) => Ok(Value::Int(i.wrapping_neg())),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Plus, Value::Int(_) | Value::Float(_)) => Ok(operand),
        _ => Err(RuntimeError::OperatorType { op: op.to_string(), left: operand.type_name().to_string(), right: String::new(), span }),
    }
}

/// The normative binary dispatch algorithm: a direct handler, or numeric
/// promotion to a common type and a retry, or (for `==`/`!=` only) a `false`
/// fallback rather than an error.
pub fn apply_binary(op: BinaryOp, left: Value, right: Value, span: Span) -> RuntimeResult<Value> {
    if let Some(result) = try_direct(op, &left, &right, span) {
        return result;
    }
    if let Some((pl, pr)) = promote_pair(&left, &right) {
        if let Some(result) = try_direct(op, &pl, &pr, span) {
            return result;
        }
    }
    match op {
        BinaryOp::Eq => Ok(Value::Bool(false)),
        BinaryOp::NotEq => Ok(Value::Bool(true)),
        _ => Err(RuntimeError::OperatorType { op: op.to_string(), left: left.type_name().to_string(), right: right.type_name().to_string(), span }),
    }
}

/// The common-type priority list from spec §4.4: `[Float, Int]`.
fn promote_pair(left: &Value, right: &Value) -> Option<(Value, Value)> {
    match (left, right) {
        (Value::Int(a), Value::Float(b)) => Some((Value::Float(*a as f64), Value::Float(*b))),
        (Value::Float(a), Value::Int(b)) => Some((Value::Float(*a), Value::Float(*b as f64))),
        _ => None,
    }
}

fn try_direct(op: BinaryOp, left: &Value, right: &Value, span: Span) -> Option<RuntimeResult<Value>> {
    use Value::*;
    match op {
        BinaryOp::Add => match (left, right) {
            (Int(a), Int(b)) => Some(Ok(Int(a.wrapping_add(*b)))),
            (Float(a), Float(b)) => Some(Ok(Float(a + b))),
            (String(a), String(b)) => Some(Ok(Value::string(format!("{a}{b}")))),
            _ => None,
        },
        BinaryOp::Sub => match (left, right) {
            (Int(a), Int(b)) => Some(Ok(Int(a.wrapping_sub(*b)))),
            (Float(a), Float(b)) => Some(Ok(Float(a - b))),
            (String(a), String(b)) => Some(Ok(Value::string(a.strip_suffix(b.as_ref()).unwrap_or(a).to_string()))),
            _ => None,
        },
        BinaryOp::Mul => match (left, right) {
            (Int(a), Int(b)) => Some(Ok(Int(a.wrapping_mul(*b)))),
            (Float(a), Float(b)) => Some(Ok(Float(a * b))),
            (String(s), Int(n)) | (Int(n), String(s)) => Some(repeat_string(s, *n as f64, span)),
            (String(s), Float(n)) | (Float(n), String(s)) => Some(repeat_string(s, *n, span)),
            (List(l), Int(n)) | (Int(n), List(l)) => Some(repeat_list(l, *n as f64, span)),
            (List(l), Float(n)) | (Float(n), List(l)) => Some(repeat_list(l, *n, span)),
            _ => None,
        },
        BinaryOp::Div => match (left, right) {
            (Int(a), Int(b)) => Some(if *b == 0 { Err(RuntimeError::ZeroDivision { span }) } else { Ok(Int(a / b)) }),
            (Float(a), Float(b)) => Some(if *b == 0.0 { Err(RuntimeError::ZeroDivision { span }) } else { Ok(Float(a / b)) }),
            _ => None,
        },
        BinaryOp::Mod => match (left, right) {
            (Int(a), Int(b)) => Some(if *b == 0 { Err(RuntimeError::ZeroDivision { span }) } else { Ok(Int(a % b)) }),
            _ => None,
        },
        BinaryOp::Pow => match (left, right) {
            (Int(a), Int(b)) => Some(Ok(pow_int(*a, *b))),
            (Float(a), Float(b)) => Some(Ok(Float(a.powf(*b)))),
            _ => None,
        },
        BinaryOp::Eq | BinaryOp::NotEq => {
            let eligible = matches!(
                (left, right),
                (Nil, _) | (_, Nil) | (Int(_), Int(_)) | (Float(_), Float(_)) | (Bool(_), Bool(_)) | (String(_), String(_)) | (List(_), List(_)) | (Function(_), Function(_))
            );
            if !eligible {
                return None;
            }
            let eq = left.structural_eq(right);
            Some(Ok(Bool(if op == BinaryOp::Eq { eq } else { !eq })))
        }
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::LtEq | BinaryOp::GtEq => match (left, right) {
            (Int(a), Int(b)) => Some(Ok(Bool(compare_op(op, a.cmp(b))))),
            (Float(a), Float(b)) => Some(Ok(Bool(compare_op(op, a.partial_cmp(b).unwrap_or(Ordering::Equal))))),
            (String(a), String(b)) => Some(Ok(Bool(compare_op(op, a.as_ref().cmp(b.as_ref()))))),
            (List(a), List(b)) => match list_order(&a.borrow(), &b.borrow(), span) {
                Ok(ordering) => Some(Ok(Bool(compare_op(op, ordering)))),
                Err(e) => Some(Err(e)),
            },
            _ => None,
        },
        BinaryOp::And | BinaryOp::Or => {
            // Short-circuit evaluation requires the right operand to stay
            // unevaluated until it's known to matter; the evaluator never
            // calls into apply_binary for these.
            unreachable!("and/or are short-circuited by the evaluator before reaching apply_binary")
        }
    }
}

fn compare_op(op: BinaryOp, ordering: Ordering) -> bool {
    match op {
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::LtEq => ordering != Ordering::Greater,
        BinaryOp::GtEq => ordering != Ordering::Less,
        _ => unreachable!("compare_op is only called with ordering operators"),
    }
}

/// Lexicographic comparison of two lists: the first differing pair decides,
/// recursing through the same operator dispatch element-wise; equal-prefix
/// lists fall back to comparing lengths.
fn list_order(left: &[Value], right: &[Value], span: Span) -> RuntimeResult<Ordering> {
    for (a, b) in left.iter().zip(right.iter()) {
        if a.structural_eq(b) {
            continue;
        }
        let less = apply_binary(BinaryOp::Lt, a.clone(), b.clone(), span)?;
        return Ok(if less.is_truthy() { Ordering::Less } else { Ordering::Greater });
    }
    Ok(left.len().cmp(&right.len()))
}

/// Fast exponentiation for integer powers; a negative exponent promotes the
/// result to Float (spec §4.4).
fn pow_int(base: i64, exp: i64) -> Value {
    if exp < 0 {
        return Value::Float((base as f64).powf(exp as f64));
    }
    let (mut result, mut b, mut e) = (1i64, base, exp);
    while e > 0 {
        if e & 1 == 1 {
            result = result.wrapping_mul(b);
        }
        b = b.wrapping_mul(b);
        e >>= 1;
    }
    Value::Int(result)
}

/// `s * factor`: the first `floor(len(s) * factor)` characters of `s`
/// repeated end-to-end (spec §4.4, truncating not rounding).
fn repeat_string(s: &std::rc::Rc<str>, factor: f64, span: Span) -> RuntimeResult<Value> {
    if factor < 0.0 {
        return Err(RuntimeError::SequenceMultiplication { span });
    }
    if s.is_empty() {
        return Ok(Value::string(""));
    }
    let total = (s.chars().count() as f64 * factor).floor() as usize;
    Ok(Value::string(s.chars().cycle().take(total).collect::<String>()))
}

fn repeat_list(list: &itmoscript_ast::ListHandle, factor: f64, span: Span) -> RuntimeResult<Value> {
    if factor < 0.0 {
        return Err(RuntimeError::SequenceMultiplication { span });
    }
    let items = list.borrow();
    if items.is_empty() {
        return Ok(Value::list(Vec::new()));
    }
    let total = (items.len() as f64 * factor).floor() as usize;
    let out: Vec<Value> = (0..total).map(|i| items[i % items.len()].clone()).collect();
    Ok(Value::list(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use itmoscript_span::Position;

    fn span() -> Span {
        Span::new(Position::new(1, 1))
    }

    #[test]
    fn int_and_float_promote_through_common_type() {
        let result = apply_binary(BinaryOp::Add, Value::Int(2), Value::Float(0.5), span()).unwrap();
        assert!(matches!(result, Value::Float(f) if f == 2.5));
    }

    #[test]
    fn division_by_zero_errors() {
        let err = apply_binary(BinaryOp::Div, Value::Int(1), Value::Int(0), span()).unwrap_err();
        assert!(matches!(err, RuntimeError::ZeroDivision { .. }));
    }

    #[test]
    fn mismatched_tags_equal_to_false_without_promotion() {
        let result = apply_binary(BinaryOp::Eq, Value::Int(5), Value::Bool(true), span()).unwrap();
        assert!(matches!(result, Value::Bool(false)));
    }

    #[test]
    fn mismatched_tags_error_for_ordering() {
        let err = apply_binary(BinaryOp::Lt, Value::Int(5), Value::Bool(true), span()).unwrap_err();
        assert!(matches!(err, RuntimeError::OperatorType { .. }));
    }

    #[test]
    fn negative_power_promotes_to_float() {
        let result = apply_binary(BinaryOp::Pow, Value::Int(2), Value::Int(-1), span()).unwrap();
        assert!(matches!(result, Value::Float(f) if f == 0.5));
    }

    #[test]
    fn string_multiplication_truncates_fractional_factor() {
        let result = apply_binary(BinaryOp::Mul, Value::string("ab"), Value::Float(1.5), span()).unwrap();
        assert!(matches!(result, Value::String(ref s) if s.as_ref() == "aba"));
    }

    #[test]
    fn negative_sequence_factor_errors() {
        let err = apply_binary(BinaryOp::Mul, Value::string("ab"), Value::Int(-1), span()).unwrap_err();
        assert!(matches!(err, RuntimeError::SequenceMultiplication { .. }));
    }

    #[test]
    fn string_subtraction_strips_suffix() {
        let result = apply_binary(BinaryOp::Sub, Value::string("hello.txt"), Value::string(".txt"), span()).unwrap();
        assert!(matches!(result, Value::String(ref s) if s.as_ref() == "hello"));
    }

    #[test]
    fn list_ordering_is_lexicographic() {
        let a = Value::list(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::list(vec![Value::Int(1), Value::Int(3)]);
        let result = apply_binary(BinaryOp::Lt, a, b, span()).unwrap();
        assert!(result.is_truthy());
    }
}
