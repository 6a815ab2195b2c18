//! Rule compilation, self-test and execution.
//!
//! Compiling a rule:
//! 1. every declared attribute name is checked against a whitelist; a bad
//!    name marks the rule invalid;
//! 2. each name is rewritten to a positional parameter `_p0`, `_p1`, ...
//!    inside the expression text;
//! 3. the rewritten text is compiled into a [`Program`] (errors are fatal);
//! 4. the rule is run once on placeholder values. A missing method or
//!    property, or arithmetic on a string placeholder, is tolerated; any
//!    other failure marks the rule invalid.

use conform_core::path::scalar_text;
use conform_core::{
    AttributePath, AttributeValues, Entity, Violation, ViolationBuilder, ViolationType,
};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Result, RuleError};
use crate::expr::{truthy, Program};
use crate::schema::RuleConfig;

/// How a rule's return value is interpreted, decided when it is compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    /// Boolean (or number, non-zero is success).
    Flag,
    /// `[success, [message args...]]`
    WithArgs,
}

/// Outcome of one rule evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleResult {
    success: bool,
    args: Vec<String>,
}

impl RuleResult {
    fn from_value(shape: ResultShape, value: &Value) -> Self {
        match (shape, value) {
            (ResultShape::WithArgs, Value::Array(pair)) if pair.len() == 2 => Self {
                success: flag(&pair[0]),
                args: match &pair[1] {
                    Value::Array(items) => items.iter().map(scalar_text).collect(),
                    Value::Null => Vec::new(),
                    other => vec![scalar_text(other)],
                },
            },
            _ => Self {
                success: flag(value),
                args: Vec::new(),
            },
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

fn flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        other => truthy(other),
    }
}

/// A compiled rule bound to concrete attribute paths.
#[derive(Debug, Clone)]
pub struct RuleDef {
    name: String,
    category: String,
    severity: String,
    attributes: Vec<AttributePath>,
    message_template: String,
    program: Option<Program>,
    shape: ResultShape,
    valid: bool,
}

impl RuleDef {
    /// Compile `rule` with its variables bound to `attributes` (the rule's
    /// own names when `None`).
    ///
    /// Returns `Err` for configuration errors. A rule that fails name
    /// validation or its self-test is returned with [`is_valid`](Self::is_valid)
    /// false.
    pub fn compile(rule: &RuleConfig, attributes: Option<&[String]>) -> Result<Self> {
        let mut def = Self {
            name: rule.name.clone(),
            category: rule.category.clone(),
            severity: rule.severity.clone(),
            attributes: Vec::new(),
            message_template: rule.message_template().to_string(),
            program: None,
            shape: ResultShape::Flag,
            valid: false,
        };

        if let Some(bad) = rule.attributes.iter().find(|n| !is_valid_attribute_name(n)) {
            warn!(rule = %rule.name, attribute = %bad, "invalid attribute name, rule disabled");
            return Ok(def);
        }

        let paths = attributes.unwrap_or(&rule.attributes);
        if paths.len() != rule.attributes.len() {
            return Err(RuleError::Config(format!(
                "rule '{}' declares {} attribute(s) but is bound to {}",
                rule.name,
                rule.attributes.len(),
                paths.len()
            )));
        }
        def.attributes = paths
            .iter()
            .map(|p| {
                AttributePath::parse(p).map_err(|e| {
                    RuleError::Config(format!("rule '{}': {e}", rule.name))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let params: Vec<String> = (0..rule.attributes.len()).map(|i| format!("_p{i}")).collect();
        let source = rewrite_params(&rule.validate, &rule.attributes);
        let program = Program::compile(&source, &params).map_err(|source| RuleError::Compile {
            rule: rule.name.clone(),
            source,
        })?;

        def.shape = match program.root().as_list_literal() {
            Some(items) if items.len() == 2 => ResultShape::WithArgs,
            _ => ResultShape::Flag,
        };
        def.program = Some(program);
        def.valid = def.self_test();
        Ok(def)
    }

    /// Run the rule on placeholder values: `["1"]` for wildcard paths, `"1"`
    /// otherwise.
    fn self_test(&self) -> bool {
        let Some(program) = &self.program else {
            return false;
        };
        let placeholders: Vec<Value> = self
            .attributes
            .iter()
            .map(|p| {
                if p.has_wildcard() {
                    Value::Array(vec![Value::from("1")])
                } else {
                    Value::from("1")
                }
            })
            .collect();

        match program.evaluate(&placeholders) {
            Ok(_) => true,
            Err(e) if e.is_placeholder_artifact() => {
                debug!(rule = %self.name, error = %e, "self-test failure tolerated on placeholder values");
                true
            }
            Err(e) => {
                warn!(rule = %self.name, error = %e, "rule self-test failed, rule disabled");
                false
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn severity(&self) -> &str {
        &self.severity
    }

    pub fn attributes(&self) -> &[AttributePath] {
        &self.attributes
    }

    pub fn shape(&self) -> ResultShape {
        self.shape
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Evaluate against one entity's extracted values.
    pub fn execute(&self, values: &AttributeValues) -> Result<RuleResult> {
        let program = match &self.program {
            Some(program) if self.valid => program,
            _ => return Err(RuleError::InvalidRule(self.name.clone())),
        };

        let args: Vec<Value> = self
            .attributes
            .iter()
            .map(|p| {
                values.get(p.as_str()).cloned().unwrap_or_else(|| {
                    if p.has_wildcard() {
                        Value::Array(Vec::new())
                    } else {
                        Value::Null
                    }
                })
            })
            .collect();

        let value = program
            .evaluate(&args)
            .map_err(|source| RuleError::Execution {
                rule: self.name.clone(),
                source,
            })?;
        Ok(RuleResult::from_value(self.shape, &value))
    }

    /// Expand the message template. Arguments come from the rule result, or
    /// from the attribute values in declared order when it returned none.
    pub fn message(&self, result: &RuleResult, values: &AttributeValues) -> String {
        if !result.args().is_empty() {
            return expand_message(&self.message_template, result.args());
        }
        let args: Vec<String> = self
            .attributes
            .iter()
            .map(|p| values.get(p.as_str()).map(scalar_text).unwrap_or_else(|| "null".to_string()))
            .collect();
        expand_message(&self.message_template, &args)
    }

    /// Build the `RULE` violation for a failed result.
    pub fn violation(&self, entity: &Entity, values: &AttributeValues, result: &RuleResult) -> Violation {
        let mut builder = ViolationBuilder::for_entity(entity)
            .category(&self.category)
            .severity(&self.severity)
            .violation_type(ViolationType::Rule)
            .validation_rule(&self.name)
            .message(self.message(result, values));
        for path in &self.attributes {
            let value = values.get(path.as_str()).cloned().unwrap_or(Value::Null);
            builder = builder.detail(path.as_str(), value);
        }
        builder.build()
    }
}

// ── Attribute names ─────────────────────────────────────────────────

/// Names may use letters, digits, `-`, `_`, `.`, `*`, `[` and `]`. Empty
/// names, `null`, and pure integers are rejected.
pub fn is_valid_attribute_name(name: &str) -> bool {
    !name.is_empty()
        && name != "null"
        && !name.chars().all(|c| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '*' | '[' | ']'))
}

/// Replace each attribute name in `expression` with `_p<index>`.
///
/// Longer names are substituted first so that a name that is a prefix of
/// another is not matched inside it. Matches must stand alone: not inside a
/// quoted string, not preceded by a word character or `.`, and not followed
/// by a word character or `(`.
pub fn rewrite_params(expression: &str, names: &[String]) -> String {
    let mut order: Vec<usize> = (0..names.len()).collect();
    order.sort_by(|&a, &b| names[b].len().cmp(&names[a].len()));

    let mut text = expression.to_string();
    for i in order {
        text = substitute(&text, &names[i], &format!("_p{i}"));
    }
    text
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn substitute(text: &str, name: &str, replacement: &str) -> String {
    if name.is_empty() {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let mut prev: Option<char> = None;
    let mut i = 0;

    while let Some(c) = text[i..].chars().next() {
        if let Some(q) = quote {
            out.push(c);
            i += c.len_utf8();
            if c == '\\' {
                if let Some(escaped) = text[i..].chars().next() {
                    out.push(escaped);
                    i += escaped.len_utf8();
                }
            } else if c == q {
                quote = None;
            }
            prev = Some(c);
            continue;
        }

        if c == '\'' || c == '"' {
            quote = Some(c);
            out.push(c);
            i += 1;
            prev = Some(c);
            continue;
        }

        let stands_alone = text[i..].starts_with(name)
            && !prev.is_some_and(|p| is_word_char(p) || p == '.')
            && !text[i + name.len()..]
                .chars()
                .next()
                .is_some_and(|n| is_word_char(n) || n == '(');

        if stands_alone {
            out.push_str(replacement);
            i += name.len();
            prev = replacement.chars().last();
        } else {
            out.push(c);
            i += c.len_utf8();
            prev = Some(c);
        }
    }

    out
}

/// Replace `{N}` placeholders with `args[N]`; unknown indices are left as is.
pub fn expand_message(template: &str, args: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replaced = after.find('}').and_then(|close| {
            let index: usize = after[..close].parse().ok()?;
            let arg = args.get(index)?;
            Some((arg, close))
        });
        match replaced {
            Some((arg, close)) => {
                out.push_str(arg);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(attributes: &[&str], validate: &str) -> RuleConfig {
        RuleConfig {
            name: "test-rule".to_string(),
            category: "INVALID_VALUE".to_string(),
            description: "test rule".to_string(),
            severity: "MINOR".to_string(),
            attributes: attributes.iter().map(|s| s.to_string()).collect(),
            error_message: Some("bad value {0}".to_string()),
            validate: validate.to_string(),
        }
    }

    fn values(pairs: &[(&str, Value)]) -> AttributeValues {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn compiles_and_executes_simple_rule() {
        let def = RuleDef::compile(&rule(&["i"], "i == 44"), None).unwrap();
        assert!(def.is_valid());
        assert_eq!(def.shape(), ResultShape::Flag);
        assert!(def.execute(&values(&[("i", json!(44))])).unwrap().success());
        assert!(!def.execute(&values(&[("i", json!(5))])).unwrap().success());
    }

    #[test]
    fn arithmetic_rules_survive_the_self_test() {
        let cases = [
            ("vcpus / 2 <= 8", true),
            ("vcpus * 2 <= 64", true),
            ("vcpus % 2 == 0", true),
            ("-vcpus < 0", true),
            ("vcpus - 1 >= 0", true),
        ];
        for (expression, expected) in cases {
            let def = RuleDef::compile(&rule(&["vcpus"], expression), None).unwrap();
            assert!(def.is_valid(), "{expression} was disabled");
            let result = def.execute(&values(&[("vcpus", json!(4))])).unwrap();
            assert_eq!(result.success(), expected, "{expression}");
        }
    }

    #[test]
    fn arithmetic_on_strings_still_fails_when_live() {
        let def = RuleDef::compile(&rule(&["vcpus"], "vcpus * 2 <= 64"), None).unwrap();
        assert!(matches!(
            def.execute(&values(&[("vcpus", json!("four"))])),
            Err(RuleError::Execution { .. })
        ));
    }

    #[test]
    fn comparison_type_errors_still_disable_the_rule() {
        let def = RuleDef::compile(&rule(&["name"], "name in 5"), None).unwrap();
        assert!(!def.is_valid());
    }

    #[test]
    fn integer_attribute_name_disables_rule() {
        let def = RuleDef::compile(&rule(&["8"], "true"), None).unwrap();
        assert!(!def.is_valid());
        assert!(matches!(
            def.execute(&AttributeValues::new()),
            Err(RuleError::InvalidRule(_))
        ));
    }

    #[test]
    fn attribute_name_whitelist() {
        for ok in ["name", "vserver-name", "a.b", "list[*].id", "x_1"] {
            assert!(is_valid_attribute_name(ok), "{ok}");
        }
        for bad in ["", "null", "8", "123", "a b", "a$b", "a(b)"] {
            assert!(!is_valid_attribute_name(bad), "{bad}");
        }
    }

    #[test]
    fn rewrite_prefers_longer_names_and_respects_boundaries() {
        let names = vec!["name".to_string(), "vserver-name".to_string()];
        assert_eq!(
            rewrite_params("vserver-name != name && name.size() > 0", &names),
            "_p1 != _p0 && _p0.size() > 0"
        );
        // Quoted text, member names and method calls are not parameters.
        assert_eq!(
            rewrite_params("name == 'name' && x.name == name()", &names),
            "_p0 == 'name' && x.name == name()"
        );
        let names = vec!["x".to_string()];
        assert_eq!(rewrite_params("x-1 > xx", &names), "_p0-1 > xx");
    }

    #[test]
    fn hyphenated_path_names_compile() {
        let def = RuleDef::compile(
            &rule(&["prov-status"], "prov-status in ['ACTIVE', 'PROV']"),
            None,
        )
        .unwrap();
        assert!(def.is_valid());
        assert!(def.execute(&values(&[("prov-status", json!("PROV"))])).unwrap().success());
    }

    #[test]
    fn unknown_variable_is_a_compile_error() {
        let err = RuleDef::compile(&rule(&["a"], "a == b"), None).unwrap_err();
        assert!(matches!(err, RuleError::Compile { .. }));
    }

    #[test]
    fn syntax_error_is_a_compile_error() {
        let err = RuleDef::compile(&rule(&["a"], "a =="), None).unwrap_err();
        assert!(matches!(err, RuleError::Compile { .. }));
    }

    #[test]
    fn missing_member_during_self_test_is_tolerated() {
        // "1".keySet() does not exist, but real values may be maps.
        let def = RuleDef::compile(&rule(&["a"], "a.keySet() != null"), None).unwrap();
        assert!(def.is_valid());
    }

    #[test]
    fn other_self_test_failures_disable_rule() {
        let def = RuleDef::compile(&rule(&["a"], "a.toInteger() / 0 == 1"), None).unwrap();
        assert!(!def.is_valid());
    }

    #[test]
    fn wildcard_paths_get_list_placeholders() {
        // List subtraction fails on a scalar placeholder.
        let def = RuleDef::compile(
            &rule(&["rels"], "(rels - ['x']).size() > 0"),
            Some(&["relationship-list.relationship[*].related-to".to_string()]),
        )
        .unwrap();
        assert!(def.is_valid());
        assert!(def.attributes()[0].has_wildcard());
    }

    #[test]
    fn entity_binding_must_match_arity() {
        let err = RuleDef::compile(&rule(&["a", "b"], "a == b"), Some(&["x".to_string()])).unwrap_err();
        assert!(matches!(err, RuleError::Config(_)));
    }

    #[test]
    fn with_args_shape_supplies_message_arguments() {
        let def = RuleDef::compile(&rule(&["n"], "[n.size() < 5, [n, n.size()]]"), None).unwrap();
        assert_eq!(def.shape(), ResultShape::WithArgs);

        let vals = values(&[("n", json!("toolong"))]);
        let result = def.execute(&vals).unwrap();
        assert!(!result.success());
        assert_eq!(result.args(), ["toolong", "7"]);
        assert_eq!(def.message(&result, &vals), "bad value toolong");
    }

    #[test]
    fn flag_message_uses_attribute_values() {
        let def = RuleDef::compile(&rule(&["n"], "n != null"), None).unwrap();
        let vals = values(&[("n", Value::Null)]);
        let result = def.execute(&vals).unwrap();
        assert!(!result.success());
        assert_eq!(def.message(&result, &vals), "bad value null");
    }

    #[test]
    fn numeric_results_are_flags() {
        let def = RuleDef::compile(&rule(&["n"], "n.size()"), None).unwrap();
        assert!(def.execute(&values(&[("n", json!("ab"))])).unwrap().success());
        assert!(!def.execute(&values(&[("n", json!(""))])).unwrap().success());
    }

    #[test]
    fn live_execution_error_is_returned() {
        let def = RuleDef::compile(&rule(&["n"], "n.size() > 0"), None).unwrap();
        let err = def.execute(&values(&[("n", Value::Null)])).unwrap_err();
        assert!(matches!(err, RuleError::Execution { .. }));
    }

    #[test]
    fn message_expansion() {
        let args = vec!["a".to_string(), "b".to_string()];
        assert_eq!(expand_message("{1}-{0}", &args), "b-a");
        assert_eq!(expand_message("{2} {x} {", &args), "{2} {x} {");
        assert_eq!(expand_message("no placeholders", &args), "no placeholders");
    }

    #[test]
    fn violation_carries_rule_fields() {
        let entity = Entity::new("vserver", json!({"vserver-id": "v1"})).with_key("vserver-id", "v1");
        let def = RuleDef::compile(&rule(&["n"], "n != null"), None).unwrap();
        let vals = values(&[("n", Value::Null)]);
        let result = def.execute(&vals).unwrap();
        let v = def.violation(&entity, &vals, &result);
        assert_eq!(v.violation_type(), ViolationType::Rule);
        assert_eq!(v.validation_rule(), Some("test-rule"));
        assert_eq!(v.category(), "INVALID_VALUE");
        assert_eq!(v.violation_details().get("n"), Some(&Value::Null));
    }
}
