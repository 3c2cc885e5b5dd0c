use crate::error::EvalErrorKind;
use crate::template::ast::{BinaryOp, UnaryOp};
use crate::value::Value;
use std::cmp::Ordering;

pub(crate) fn unary(op: UnaryOp, operand: Value) -> Result<Value, EvalErrorKind> {
    match op {
        UnaryOp::Not => Ok(Value::Boolean(!operand.is_truthy())),
        UnaryOp::TypeOf => Ok(Value::from(operand.type_name())),
        UnaryOp::Negate => match operand {
            Value::Integer(i) => Ok(i
                .checked_neg()
                .map(Value::Integer)
                .unwrap_or(Value::Decimal(-(i as f64)))),
            Value::Decimal(d) => Ok(Value::Decimal(-d)),
            other => Err(EvalErrorKind::Type(format!(
                "The - operator requires a number (got {}).",
                other.type_name()
            ))),
        },
    }
}

pub(crate) fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, EvalErrorKind> {
    match op {
        BinaryOp::Equal => Ok(Value::Boolean(left == right)),
        BinaryOp::NotEqual => Ok(Value::Boolean(left != right)),
        BinaryOp::Contains => contains(left, right),
        BinaryOp::Add => add(left, right),
        BinaryOp::Greater | BinaryOp::GreaterOrEqual | BinaryOp::Less | BinaryOp::LessOrEqual => {
            compare(op, left, right)
        }
        BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => {
            arithmetic(op, left, right)
        }
    }
}

fn numbers(left: &Value, right: &Value) -> Option<(f64, f64)> {
    Some((left.as_f64()?, right.as_f64()?))
}

fn numbers_required(op: BinaryOp, left: &Value, right: &Value) -> EvalErrorKind {
    EvalErrorKind::Type(format!(
        "Both terms need to be numbers for {op} operator (got {} and {}).",
        left.type_name(),
        right.type_name()
    ))
}

fn add(left: Value, right: Value) -> Result<Value, EvalErrorKind> {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => Ok(a
            .checked_add(b)
            .map(Value::Integer)
            .unwrap_or(Value::Decimal(a as f64 + b as f64))),
        (Value::Array(mut a), Value::Array(b)) => {
            a.extend(b);
            Ok(Value::Array(a))
        }
        (Value::String(mut a), Value::String(b)) => {
            a.push_str(&b);
            Ok(Value::String(a))
        }
        (left, right) => match numbers(&left, &right) {
            Some((a, b)) => Ok(Value::Decimal(a + b)),
            None => Err(EvalErrorKind::Type(format!(
                "Both terms need to be either arrays, strings or numbers for + operator (got {} and {}).",
                left.type_name(),
                right.type_name()
            ))),
        },
    }
}

fn compare(op: BinaryOp, left: Value, right: Value) -> Result<Value, EvalErrorKind> {
    let Some((a, b)) = numbers(&left, &right) else {
        return Err(numbers_required(op, &left, &right));
    };

    let ordering = a.partial_cmp(&b);
    let result = match op {
        BinaryOp::Greater => ordering == Some(Ordering::Greater),
        BinaryOp::GreaterOrEqual => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        BinaryOp::Less => ordering == Some(Ordering::Less),
        BinaryOp::LessOrEqual => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        _ => return Err(numbers_required(op, &left, &right)),
    };
    Ok(Value::Boolean(result))
}

fn division_by_zero(op: BinaryOp) -> EvalErrorKind {
    EvalErrorKind::Type(format!("Division by zero in {op} operation."))
}

fn arithmetic(op: BinaryOp, left: Value, right: Value) -> Result<Value, EvalErrorKind> {
    if let (Value::Integer(a), Value::Integer(b)) = (&left, &right) {
        let (a, b) = (*a, *b);
        let exact = match op {
            BinaryOp::Subtract => a.checked_sub(b),
            BinaryOp::Multiply => a.checked_mul(b),
            BinaryOp::Divide if b == 0 => return Err(division_by_zero(op)),
            BinaryOp::Divide => match a.checked_rem(b) {
                Some(0) => a.checked_div(b),
                _ => None,
            },
            BinaryOp::Modulo if b == 0 => return Err(division_by_zero(op)),
            BinaryOp::Modulo => a.checked_rem(b),
            _ => None,
        };
        if let Some(result) = exact {
            return Ok(Value::Integer(result));
        }
    }

    let Some((a, b)) = numbers(&left, &right) else {
        return Err(numbers_required(op, &left, &right));
    };

    let result = match op {
        BinaryOp::Subtract => a - b,
        BinaryOp::Multiply => a * b,
        BinaryOp::Divide | BinaryOp::Modulo if b == 0.0 => return Err(division_by_zero(op)),
        BinaryOp::Divide => a / b,
        BinaryOp::Modulo => a % b,
        _ => return Err(numbers_required(op, &left, &right)),
    };
    Ok(Value::Decimal(result))
}

fn contains(left: Value, right: Value) -> Result<Value, EvalErrorKind> {
    if !right.is_primitive() {
        return Err(EvalErrorKind::Type(format!(
            "The right-hand side of a contains operator must be a string, number, boolean or null (got {}).",
            right.type_name()
        )));
    }

    match left {
        Value::String(haystack) => {
            let needle = right.to_template_string().unwrap_or_default();
            Ok(Value::Boolean(haystack.contains(&needle)))
        }
        Value::Array(items) => Ok(Value::Boolean(items.contains(&right))),
        Value::Object(object) => {
            let key = right.to_template_string().unwrap_or_default();
            Ok(Value::Boolean(object.contains_key(&key)))
        }
        other => Err(EvalErrorKind::Type(format!(
            "The left-hand side of a contains operator must be a string, array or object (got {}).",
            other.type_name()
        ))),
    }
}
