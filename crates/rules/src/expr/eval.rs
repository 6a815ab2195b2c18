//! Tree-walking evaluator over JSON values.

use std::cmp::Ordering;

use conform_core::path::scalar_text;
use serde_json::{Number, Value};

use super::ast::{BinaryOp, Expr, Pattern};
use super::error::EvalError;
use super::methods::call_method;
use super::parser::compile_pattern;

/// Groovy truth: `null`, `false`, zero, and empty strings/lists/maps are false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

pub(crate) fn evaluate(expr: &Expr, args: &[Value]) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Param(i) => Ok(args.get(*i).cloned().unwrap_or(Value::Null)),
        Expr::List(items) => items
            .iter()
            .map(|item| evaluate(item, args))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Expr::Not(inner) => Ok(Value::Bool(!truthy(&evaluate(inner, args)?))),
        Expr::Negate(inner) => negate(evaluate(inner, args)?),
        Expr::Binary { left, op, right } => match op {
            BinaryOp::And => {
                let ok = truthy(&evaluate(left, args)?) && truthy(&evaluate(right, args)?);
                Ok(Value::Bool(ok))
            }
            BinaryOp::Or => {
                let ok = truthy(&evaluate(left, args)?) || truthy(&evaluate(right, args)?);
                Ok(Value::Bool(ok))
            }
            _ => binary(*op, evaluate(left, args)?, evaluate(right, args)?),
        },
        Expr::Match {
            subject,
            pattern,
            full,
        } => {
            let subject = evaluate(subject, args)?;
            regex_match(&subject, pattern, *full, args)
        }
        Expr::Conditional {
            condition,
            then_expr,
            else_expr,
        } => {
            if truthy(&evaluate(condition, args)?) {
                evaluate(then_expr, args)
            } else {
                evaluate(else_expr, args)
            }
        }
        Expr::Elvis { value, fallback } => {
            let v = evaluate(value, args)?;
            if truthy(&v) {
                Ok(v)
            } else {
                evaluate(fallback, args)
            }
        }
        Expr::Property {
            object,
            name,
            null_safe,
        } => {
            let receiver = evaluate(object, args)?;
            if receiver.is_null() && *null_safe {
                return Ok(Value::Null);
            }
            property(receiver, name)
        }
        Expr::MethodCall {
            object,
            method,
            args: call_args,
            null_safe,
        } => {
            let receiver = evaluate(object, args)?;
            if receiver.is_null() && *null_safe {
                return Ok(Value::Null);
            }
            let call_args = call_args
                .iter()
                .map(|a| evaluate(a, args))
                .collect::<Result<Vec<_>, _>>()?;
            call_method(receiver, method, call_args)
        }
        Expr::Index { object, index } => {
            let receiver = evaluate(object, args)?;
            let index = evaluate(index, args)?;
            index_value(receiver, &index)
        }
    }
}

// ── Numbers ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn of(value: &Value) -> Option<Num> {
        let Value::Number(n) = value else {
            return None;
        };
        n.as_i64()
            .map(Num::Int)
            .or_else(|| n.as_f64().map(Num::Float))
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    fn into_value(self) -> Result<Value, EvalError> {
        match self {
            Num::Int(i) => Ok(Value::from(i)),
            Num::Float(f) => Number::from_f64(f)
                .map(Value::Number)
                .ok_or_else(|| EvalError::Arithmetic(format!("non-finite result {f}"))),
        }
    }
}

fn overflow(op: BinaryOp) -> EvalError {
    EvalError::Arithmetic(format!("integer overflow in '{}'", op.symbol()))
}

fn not_arithmetic(op: BinaryOp) -> EvalError {
    EvalError::Arithmetic(format!("'{}' is not an arithmetic operator", op.symbol()))
}

fn arithmetic(op: BinaryOp, a: Num, b: Num) -> Result<Value, EvalError> {
    let result = match (a, b) {
        (Num::Int(x), Num::Int(y)) => match op {
            BinaryOp::Add => Num::Int(x.checked_add(y).ok_or_else(|| overflow(op))?),
            BinaryOp::Subtract => Num::Int(x.checked_sub(y).ok_or_else(|| overflow(op))?),
            BinaryOp::Multiply => Num::Int(x.checked_mul(y).ok_or_else(|| overflow(op))?),
            BinaryOp::Divide => {
                if y == 0 {
                    return Err(EvalError::DivisionByZero);
                }
                if x.checked_rem(y) == Some(0) {
                    Num::Int(x.checked_div(y).ok_or_else(|| overflow(op))?)
                } else {
                    Num::Float(x as f64 / y as f64)
                }
            }
            BinaryOp::Modulo => {
                if y == 0 {
                    return Err(EvalError::DivisionByZero);
                }
                Num::Int(x.checked_rem(y).ok_or_else(|| overflow(op))?)
            }
            other => return Err(not_arithmetic(other)),
        },
        (a, b) => {
            let (x, y) = (a.as_f64(), b.as_f64());
            match op {
                BinaryOp::Add => Num::Float(x + y),
                BinaryOp::Subtract => Num::Float(x - y),
                BinaryOp::Multiply => Num::Float(x * y),
                BinaryOp::Divide if y == 0.0 => return Err(EvalError::DivisionByZero),
                BinaryOp::Divide => Num::Float(x / y),
                BinaryOp::Modulo if y == 0.0 => return Err(EvalError::DivisionByZero),
                BinaryOp::Modulo => Num::Float(x % y),
                other => return Err(not_arithmetic(other)),
            }
        }
    };
    result.into_value()
}

fn negate(value: Value) -> Result<Value, EvalError> {
    match Num::of(&value) {
        Some(Num::Int(i)) => i
            .checked_neg()
            .map(Value::from)
            .ok_or_else(|| EvalError::Arithmetic("integer overflow in unary '-'".to_string())),
        Some(Num::Float(f)) => Num::Float(-f).into_value(),
        None => Err(EvalError::TypeMismatch {
            op: "unary -",
            left: type_name(&value),
            right: "nothing",
        }),
    }
}

// ── Equality and ordering ───────────────────────────────────────────

/// Structural equality where `1 == 1.0`. Strings never equal numbers.
pub(crate) fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => match (Num::of(a), Num::of(b)) {
            (Some(Num::Int(x)), Some(Num::Int(y))) => x == y,
            (Some(x), Some(y)) => x.as_f64() == y.as_f64(),
            _ => false,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| loose_eq(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| loose_eq(x, y)))
        }
        _ => a == b,
    }
}

/// Order two values. `null` sorts before everything; a string compared with
/// a number is read as a number when it parses as one.
fn compare(op: BinaryOp, a: &Value, b: &Value) -> Result<Ordering, EvalError> {
    let mismatch = || EvalError::TypeMismatch {
        op: op.symbol(),
        left: type_name(a),
        right: type_name(b),
    };

    match (a, b) {
        (Value::Null, Value::Null) => Ok(Ordering::Equal),
        (Value::Null, _) => Ok(Ordering::Less),
        (_, Value::Null) => Ok(Ordering::Greater),
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Ok(x.cmp(y)),
        (Value::Number(_), Value::Number(_)) => {
            let (x, y) = (Num::of(a).ok_or_else(mismatch)?, Num::of(b).ok_or_else(mismatch)?);
            match (x, y) {
                (Num::Int(x), Num::Int(y)) => Ok(x.cmp(&y)),
                (x, y) => x.as_f64().partial_cmp(&y.as_f64()).ok_or_else(mismatch),
            }
        }
        (Value::String(s), Value::Number(_)) => {
            let x: f64 = s.trim().parse().map_err(|_| mismatch())?;
            let y = Num::of(b).ok_or_else(mismatch)?.as_f64();
            x.partial_cmp(&y).ok_or_else(mismatch)
        }
        (Value::Number(_), Value::String(s)) => {
            let x = Num::of(a).ok_or_else(mismatch)?.as_f64();
            let y: f64 = s.trim().parse().map_err(|_| mismatch())?;
            x.partial_cmp(&y).ok_or_else(mismatch)
        }
        _ => Err(mismatch()),
    }
}

// ── Operators ───────────────────────────────────────────────────────

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, EvalError> {
    let mismatch = |l: &Value, r: &Value| EvalError::TypeMismatch {
        op: op.symbol(),
        left: type_name(l),
        right: type_name(r),
    };

    match op {
        BinaryOp::Equal => Ok(Value::Bool(loose_eq(&left, &right))),
        BinaryOp::NotEqual => Ok(Value::Bool(!loose_eq(&left, &right))),
        BinaryOp::LessThan => Ok(Value::Bool(compare(op, &left, &right)?.is_lt())),
        BinaryOp::LessEqual => Ok(Value::Bool(compare(op, &left, &right)?.is_le())),
        BinaryOp::GreaterThan => Ok(Value::Bool(compare(op, &left, &right)?.is_gt())),
        BinaryOp::GreaterEqual => Ok(Value::Bool(compare(op, &left, &right)?.is_ge())),
        BinaryOp::In => membership(&left, &right).map(Value::Bool),

        BinaryOp::Add => match (left, right) {
            (Value::String(mut s), r) => {
                s.push_str(&scalar_text(&r));
                Ok(Value::String(s))
            }
            (l, Value::String(s)) => Ok(Value::String(format!("{}{s}", scalar_text(&l)))),
            (Value::Array(mut xs), Value::Array(ys)) => {
                xs.extend(ys);
                Ok(Value::Array(xs))
            }
            (Value::Array(mut xs), r) => {
                xs.push(r);
                Ok(Value::Array(xs))
            }
            (l, r) => match (Num::of(&l), Num::of(&r)) {
                (Some(a), Some(b)) => arithmetic(op, a, b),
                _ => Err(mismatch(&l, &r)),
            },
        },

        BinaryOp::Subtract => match (left, right) {
            (Value::Array(xs), Value::Array(ys)) => Ok(Value::Array(
                xs.into_iter()
                    .filter(|x| !ys.iter().any(|y| loose_eq(x, y)))
                    .collect(),
            )),
            (l, r) => match (Num::of(&l), Num::of(&r)) {
                (Some(a), Some(b)) => arithmetic(op, a, b),
                _ => Err(mismatch(&l, &r)),
            },
        },

        BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => {
            match (Num::of(&left), Num::of(&right)) {
                (Some(a), Some(b)) => arithmetic(op, a, b),
                _ => Err(mismatch(&left, &right)),
            }
        }

        BinaryOp::And | BinaryOp::Or => {
            // Short-circuited by the caller.
            Ok(Value::Bool(match op {
                BinaryOp::And => truthy(&left) && truthy(&right),
                _ => truthy(&left) || truthy(&right),
            }))
        }
    }
}

/// `x in collection`: list membership, map key, or substring.
fn membership(item: &Value, collection: &Value) -> Result<bool, EvalError> {
    match collection {
        Value::Null => Ok(false),
        Value::Array(items) => Ok(items.iter().any(|v| loose_eq(item, v))),
        Value::Object(map) => Ok(map.contains_key(&scalar_text(item))),
        Value::String(s) => Ok(!item.is_null() && s.contains(&scalar_text(item))),
        other => Err(EvalError::TypeMismatch {
            op: "in",
            left: type_name(item),
            right: type_name(other),
        }),
    }
}

fn regex_match(
    subject: &Value,
    pattern: &Pattern,
    full: bool,
    args: &[Value],
) -> Result<Value, EvalError> {
    if subject.is_null() {
        return Ok(Value::Bool(false));
    }
    let text = scalar_text(subject);
    let matched = match pattern {
        Pattern::Static(re) => re.is_match(&text),
        Pattern::Dynamic(expr) => {
            let source = scalar_text(&evaluate(expr, args)?);
            let re = compile_pattern(&source, full).map_err(|reason| EvalError::InvalidRegex {
                pattern: source.clone(),
                reason,
            })?;
            re.is_match(&text)
        }
    };
    Ok(Value::Bool(matched))
}

/// `receiver.name`. Lists spread the access over their map elements.
fn property(receiver: Value, name: &str) -> Result<Value, EvalError> {
    match receiver {
        Value::Null => Err(EvalError::NullReference(format!(
            "cannot read property '{name}' of null"
        ))),
        Value::Object(mut map) => Ok(map.remove(name).unwrap_or(Value::Null)),
        Value::Array(items) => items
            .into_iter()
            .map(|item| property(item, name))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Err(EvalError::NoSuchProperty {
            property: name.to_string(),
            receiver: type_name(&other),
        }),
    }
}

/// `receiver[index]`. Negative list indices count from the end; a list index
/// past either end yields `null`.
fn index_value(receiver: Value, index: &Value) -> Result<Value, EvalError> {
    match (receiver, index) {
        (Value::Null, _) => Err(EvalError::NullReference(format!(
            "cannot index null with {}",
            scalar_text(index)
        ))),
        (Value::Array(mut items), Value::Number(n)) => {
            let Some(i) = n.as_i64() else {
                return Err(EvalError::Conversion(format!("list index {n} is not an integer")));
            };
            let len = items.len() as i64;
            let position = if i < 0 { len + i } else { i };
            if position < 0 || position >= len {
                return Ok(Value::Null);
            }
            Ok(items.swap_remove(position as usize))
        }
        (Value::Object(mut map), key) => Ok(map.remove(&scalar_text(key)).unwrap_or(Value::Null)),
        (Value::String(s), Value::Number(n)) => {
            let chars: Vec<char> = s.chars().collect();
            let i = n.as_i64().unwrap_or(i64::MAX);
            let len = chars.len();
            let position = if i < 0 { len as i64 + i } else { i };
            chars
                .get(usize::try_from(position).unwrap_or(usize::MAX))
                .map(|c| Value::String(c.to_string()))
                .ok_or(EvalError::IndexOutOfRange { index: i, len })
        }
        (receiver, index) => Err(EvalError::TypeMismatch {
            op: "[]",
            left: type_name(&receiver),
            right: type_name(index),
        }),
    }
}
