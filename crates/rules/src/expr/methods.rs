//! Built-in methods callable on values (`name.size()`, `list.join(',')`, ...).

use conform_core::path::scalar_text;
use serde_json::Value;

use super::error::EvalError;
use super::eval::{loose_eq, type_name};
use super::parser::compile_pattern;

pub(crate) fn call_method(
    receiver: Value,
    method: &str,
    args: Vec<Value>,
) -> Result<Value, EvalError> {
    if receiver.is_null() {
        if method == "toString" && args.is_empty() {
            return Ok(Value::String("null".to_string()));
        }
        return Err(EvalError::NullReference(format!(
            "cannot invoke '{method}' on null"
        )));
    }

    let receiver_type = type_name(&receiver);
    let arity = args.len();
    let no_such_method = || EvalError::NoSuchMethod {
        method: method.to_string(),
        receiver: receiver_type,
        arity,
    };

    match (method, &receiver, args.as_slice()) {
        ("size" | "length", Value::String(s), []) => Ok(Value::from(s.chars().count())),
        ("size" | "length", Value::Array(items), []) => Ok(Value::from(items.len())),
        ("size", Value::Object(map), []) => Ok(Value::from(map.len())),

        ("isEmpty", Value::String(s), []) => Ok(Value::Bool(s.is_empty())),
        ("isEmpty", Value::Array(items), []) => Ok(Value::Bool(items.is_empty())),
        ("isEmpty", Value::Object(map), []) => Ok(Value::Bool(map.is_empty())),

        ("contains", Value::String(s), [needle]) => {
            Ok(Value::Bool(!needle.is_null() && s.contains(&scalar_text(needle))))
        }
        ("contains", Value::Array(items), [needle]) => {
            Ok(Value::Bool(items.iter().any(|v| loose_eq(v, needle))))
        }
        ("containsKey", Value::Object(map), [key]) => {
            Ok(Value::Bool(map.contains_key(&scalar_text(key))))
        }

        ("startsWith", Value::String(s), [prefix]) => {
            Ok(Value::Bool(s.starts_with(&scalar_text(prefix))))
        }
        ("endsWith", Value::String(s), [suffix]) => {
            Ok(Value::Bool(s.ends_with(&scalar_text(suffix))))
        }
        ("matches", Value::String(s), [pattern]) => {
            let source = scalar_text(pattern);
            let re = compile_pattern(&source, true).map_err(|reason| EvalError::InvalidRegex {
                pattern: source.clone(),
                reason,
            })?;
            Ok(Value::Bool(re.is_match(s)))
        }

        ("toLowerCase", Value::String(s), []) => Ok(Value::String(s.to_lowercase())),
        ("toUpperCase", Value::String(s), []) => Ok(Value::String(s.to_uppercase())),
        ("trim", Value::String(s), []) => Ok(Value::String(s.trim().to_string())),

        ("toInteger", Value::String(s), []) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| EvalError::Conversion(format!("'{s}' is not an integer"))),
        ("toInteger", Value::Number(n), []) => match n.as_i64() {
            Some(i) => Ok(Value::from(i)),
            None => {
                let f = n.as_f64().unwrap_or(f64::NAN);
                if f.is_finite() && f.abs() < i64::MAX as f64 {
                    Ok(Value::from(f.trunc() as i64))
                } else {
                    Err(EvalError::Conversion(format!("{n} does not fit an integer")))
                }
            }
        },
        ("toString", value, []) => Ok(Value::String(scalar_text(value))),

        ("split", Value::String(s), []) => Ok(Value::Array(
            s.split_whitespace()
                .map(|part| Value::String(part.to_string()))
                .collect(),
        )),
        ("split", Value::String(s), [separator]) => {
            let separator = scalar_text(separator);
            if separator.is_empty() {
                return Err(EvalError::Conversion("empty split separator".to_string()));
            }
            Ok(Value::Array(
                s.split(separator.as_str())
                    .map(|part| Value::String(part.to_string()))
                    .collect(),
            ))
        }

        ("first", Value::Array(items), []) => Ok(items.first().cloned().unwrap_or(Value::Null)),
        ("last", Value::Array(items), []) => Ok(items.last().cloned().unwrap_or(Value::Null)),
        ("unique", Value::Array(items), []) => {
            let mut unique: Vec<Value> = Vec::with_capacity(items.len());
            for item in items {
                if !unique.iter().any(|u| loose_eq(u, item)) {
                    unique.push(item.clone());
                }
            }
            Ok(Value::Array(unique))
        }
        ("join", Value::Array(items), []) => Ok(Value::String(join(items, ""))),
        ("join", Value::Array(items), [separator]) => {
            Ok(Value::String(join(items, &scalar_text(separator))))
        }
        ("count", Value::Array(items), [needle]) => Ok(Value::from(
            items.iter().filter(|v| loose_eq(v, needle)).count(),
        )),
        ("count", Value::String(s), [needle]) => {
            let needle = scalar_text(needle);
            if needle.is_empty() {
                return Ok(Value::from(0));
            }
            Ok(Value::from(s.matches(needle.as_str()).count()))
        }

        _ => Err(no_such_method()),
    }
}

fn join(items: &[Value], separator: &str) -> String {
    items
        .iter()
        .map(scalar_text)
        .collect::<Vec<_>>()
        .join(separator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(receiver: Value, method: &str, args: Vec<Value>) -> Result<Value, EvalError> {
        call_method(receiver, method, args)
    }

    #[test]
    fn string_methods() {
        assert_eq!(call(json!("héllo"), "size", vec![]).unwrap(), json!(5));
        assert_eq!(call(json!(" Ab "), "trim", vec![]).unwrap(), json!("Ab"));
        assert_eq!(call(json!("Ab"), "toLowerCase", vec![]).unwrap(), json!("ab"));
        assert_eq!(call(json!("vm-01"), "startsWith", vec![json!("vm")]).unwrap(), json!(true));
        assert_eq!(call(json!("a,b,,c"), "split", vec![json!(",")]).unwrap(), json!(["a", "b", "", "c"]));
        assert_eq!(call(json!("abc"), "matches", vec![json!("[a-c]+")]).unwrap(), json!(true));
        assert_eq!(call(json!("abcd"), "matches", vec![json!("[a-c]+")]).unwrap(), json!(false));
        assert_eq!(call(json!(" 42 "), "toInteger", vec![]).unwrap(), json!(42));
    }

    #[test]
    fn list_methods() {
        let list = json!(["a", "b", "a"]);
        assert_eq!(call(list.clone(), "unique", vec![]).unwrap(), json!(["a", "b"]));
        assert_eq!(call(list.clone(), "count", vec![json!("a")]).unwrap(), json!(2));
        assert_eq!(call(list.clone(), "join", vec![json!("-")]).unwrap(), json!("a-b-a"));
        assert_eq!(call(list.clone(), "last", vec![]).unwrap(), json!("a"));
        assert_eq!(call(json!([]), "first", vec![]).unwrap(), Value::Null);
        assert_eq!(call(json!([1, 2]), "contains", vec![json!(2.0)]).unwrap(), json!(true));
    }

    #[test]
    fn unknown_method_is_a_missing_member() {
        let err = call(json!("1"), "keySet", vec![]).unwrap_err();
        assert!(err.is_missing_member());
        // Wrong arity is also a missing method.
        let err = call(json!("1"), "startsWith", vec![]).unwrap_err();
        assert!(err.is_missing_member());
    }

    #[test]
    fn null_receiver() {
        assert_eq!(call(Value::Null, "toString", vec![]).unwrap(), json!("null"));
        let err = call(Value::Null, "size", vec![]).unwrap_err();
        assert!(matches!(err, EvalError::NullReference(_)));
        assert!(!err.is_missing_member());
    }

    #[test]
    fn conversion_failure_is_not_a_missing_member() {
        let err = call(json!("abc"), "toInteger", vec![]).unwrap_err();
        assert!(matches!(err, EvalError::Conversion(_)));
    }
}
