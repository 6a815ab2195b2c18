//! Rule predicate expression language.
//!
//! A small Groovy-flavoured language evaluated over JSON values:
//!
//! - literals: integers, floats, `'single'` / `"double"` quoted strings,
//!   `true`, `false`, `null`, list literals `[a, b]`
//! - operators, loosest first: `?:` and `c ? a : b`, `||`, `&&`,
//!   `== != =~ ==~`, `< <= > >= in`, `+ -`, `* / %`, unary `! -`
//! - postfix: `.property`, `?.property`, `.method(args)`, `[index]`
//!
//! Free variables are resolved to positional parameters at compile time, so
//! an unknown name is a compile error rather than an evaluation failure.
//! Literal patterns on the right of `=~` / `==~` (quoted or `/slashy/`) are
//! compiled once with the expression.

mod ast;
mod error;
mod eval;
mod lexer;
mod methods;
mod parser;

use serde_json::Value;

pub use ast::{BinaryOp, Expr, Pattern};
pub use error::{EvalError, ExprError};
pub use eval::truthy;

use lexer::Lexer;
use parser::Parser;

/// A compiled expression over a fixed number of positional parameters.
#[derive(Debug, Clone)]
pub struct Program {
    root: Expr,
    params: usize,
}

impl Program {
    /// Compile `source`; `params` names the variables it may reference, in
    /// the order their values will be supplied.
    pub fn compile(source: &str, params: &[String]) -> Result<Self, ExprError> {
        let tokens = Lexer::new(source).tokenize()?;
        let root = Parser::new(tokens, params).parse()?;
        Ok(Self {
            root,
            params: params.len(),
        })
    }

    pub fn root(&self) -> &Expr {
        &self.root
    }

    pub fn evaluate(&self, args: &[Value]) -> Result<Value, EvalError> {
        if args.len() != self.params {
            return Err(EvalError::Arity {
                expected: self.params,
                actual: args.len(),
            });
        }
        eval::evaluate(&self.root, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval_with(source: &str, args: &[Value]) -> Result<Value, EvalError> {
        let params: Vec<String> = (0..args.len()).map(|i| format!("x{i}")).collect();
        Program::compile(source, &params).unwrap().evaluate(args)
    }

    fn eval(source: &str) -> Value {
        eval_with(source, &[]).unwrap()
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(eval("1 + 2 * 3"), json!(7));
        assert_eq!(eval("(1 + 2) * 3"), json!(9));
        assert_eq!(eval("7 % 4"), json!(3));
        assert_eq!(eval("6 / 3"), json!(2));
        assert_eq!(eval("7 / 2"), json!(3.5));
        assert_eq!(eval("-3 + 1"), json!(-2));
        assert_eq!(eval("'ab' + 1"), json!("ab1"));
        assert_eq!(eval("[1] + [2, 3]"), json!([1, 2, 3]));
        assert_eq!(eval("[1, 2, 3] - [2]"), json!([1, 3]));
    }

    #[test]
    fn division_by_zero() {
        assert_eq!(eval_with("1 / 0", &[]), Err(EvalError::DivisionByZero));
        assert_eq!(eval_with("1.5 % 0", &[]), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn equality_is_numeric_across_int_and_float() {
        assert_eq!(eval("1 == 1.0"), json!(true));
        assert_eq!(eval("'1' == 1"), json!(false));
        assert_eq!(eval("[1, 'a'] == [1.0, 'a']"), json!(true));
        assert_eq!(eval("null == null"), json!(true));
    }

    #[test]
    fn ordering_coerces_numeric_strings() {
        assert_eq!(eval_with("x0 > 10", &[json!("44")]).unwrap(), json!(true));
        assert!(matches!(
            eval_with("x0 > 10", &[json!("abc")]),
            Err(EvalError::TypeMismatch { op: ">", .. })
        ));
        assert_eq!(eval("null < 0"), json!(true));
        assert_eq!(eval("'abc' < 'abd'"), json!(true));
    }

    #[test]
    fn logical_operators_short_circuit() {
        // The right-hand side would fail on null if evaluated.
        assert_eq!(
            eval_with("x0 != null && x0.size() > 0", &[Value::Null]).unwrap(),
            json!(false)
        );
        assert_eq!(
            eval_with("x0 == null || x0.size() > 0", &[Value::Null]).unwrap(),
            json!(true)
        );
    }

    #[test]
    fn truthiness() {
        for falsy in ["null", "false", "0", "0.0", "''", "[]"] {
            assert_eq!(eval(&format!("!{falsy}")), json!(true), "{falsy}");
        }
        assert_eq!(eval("!'x'"), json!(false));
    }

    #[test]
    fn ternary_and_elvis() {
        assert_eq!(eval("1 > 2 ? 'a' : 'b'"), json!("b"));
        assert_eq!(eval_with("x0 ?: 'dflt'", &[Value::Null]).unwrap(), json!("dflt"));
        assert_eq!(eval_with("x0 ?: 'dflt'", &[json!("v")]).unwrap(), json!("v"));
    }

    #[test]
    fn regex_operators() {
        assert_eq!(eval_with("x0 =~ '\\d+'", &[json!("abc12")]).unwrap(), json!(true));
        assert_eq!(eval_with("x0 ==~ '\\d+'", &[json!("abc12")]).unwrap(), json!(false));
        assert_eq!(eval_with("x0 ==~ /[a-z]+\\d+/", &[json!("abc12")]).unwrap(), json!(true));
        assert_eq!(eval_with("x0 =~ x1", &[json!("abc"), json!("^a")]).unwrap(), json!(true));
        assert_eq!(eval_with("x0 =~ 'a'", &[Value::Null]).unwrap(), json!(false));
    }

    #[test]
    fn membership() {
        assert_eq!(eval("'b' in ['a', 'b']"), json!(true));
        assert_eq!(eval("2 in [1.0, 2.0]"), json!(true));
        assert_eq!(eval("'ell' in 'hello'"), json!(true));
        assert_eq!(eval_with("'k' in x0", &[json!({"k": 1})]).unwrap(), json!(true));
    }

    #[test]
    fn property_and_index_access() {
        let obj = json!({"items": [{"id": "a"}, {"id": "b"}], "name": "n"});
        assert_eq!(eval_with("x0.name", &[obj.clone()]).unwrap(), json!("n"));
        assert_eq!(eval_with("x0.items[1].id", &[obj.clone()]).unwrap(), json!("b"));
        assert_eq!(eval_with("x0.items[-1].id", &[obj.clone()]).unwrap(), json!("b"));
        assert_eq!(eval_with("x0.items[9]", &[obj.clone()]).unwrap(), Value::Null);
        assert_eq!(eval_with("x0.items.id", &[obj.clone()]).unwrap(), json!(["a", "b"]));
        assert_eq!(eval_with("x0.missing", &[obj]).unwrap(), Value::Null);
    }

    #[test]
    fn null_safe_navigation() {
        assert_eq!(eval_with("x0?.name", &[Value::Null]).unwrap(), Value::Null);
        assert_eq!(eval_with("x0?.size()", &[Value::Null]).unwrap(), Value::Null);
        assert!(matches!(
            eval_with("x0.name", &[Value::Null]),
            Err(EvalError::NullReference(_))
        ));
    }

    #[test]
    fn missing_members_are_distinguishable() {
        let err = eval_with("x0.name", &[json!("1")]).unwrap_err();
        assert!(err.is_missing_member());
        let err = eval_with("x0.keySet()", &[json!("1")]).unwrap_err();
        assert!(err.is_missing_member());
    }

    #[test]
    fn arity_is_checked() {
        let program = Program::compile("x0", &["x0".to_string()]).unwrap();
        assert_eq!(
            program.evaluate(&[]),
            Err(EvalError::Arity { expected: 1, actual: 0 })
        );
    }

    #[test]
    fn compile_errors() {
        assert!(matches!(
            Program::compile("y > 1", &["x".to_string()]),
            Err(ExprError::UnknownVariable(v)) if v == "y"
        ));
        assert!(matches!(Program::compile("x >", &["x".to_string()]), Err(ExprError::Parse(_))));
    }

    #[test]
    fn list_literal_root() {
        let program = Program::compile("[x0 > 1, [x0]]", &["x0".to_string()]).unwrap();
        assert_eq!(program.root().as_list_literal().map(<[Expr]>::len), Some(2));
        assert_eq!(program.evaluate(&[json!(5)]).unwrap(), json!([true, [5]]));
    }
}
