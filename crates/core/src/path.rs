//! Dotted attribute paths over JSON payloads.
//!
//! A path is a `.`-separated list of segments:
//! - `name` selects an object member (fanning out over arrays)
//! - `name[N]` selects the member, then its N-th element
//! - `name[*]` selects the member, then every element
//! - `*` selects every value of an object or array
//!
//! `[*]` and `*` are wildcard segments: a wildcard path is expected to yield
//! a list of values rather than a single scalar.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Segment {
    Field(String),
    Index(String, usize),
    Each(String),
    Any,
}

/// A parsed attribute path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AttributePath {
    raw: String,
    segments: Vec<Segment>,
}

impl AttributePath {
    /// Parse a path, rejecting empty or malformed segments.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidPath {
                path: raw.to_string(),
                reason: "empty path".to_string(),
            });
        }

        let segments = trimmed
            .split('.')
            .map(parse_segment)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|reason| CoreError::InvalidPath {
                path: raw.to_string(),
                reason,
            })?;

        Ok(Self {
            raw: trimmed.to_string(),
            segments,
        })
    }

    /// Build a path of plain member segments. Used for built-in defaults.
    pub fn from_fields(fields: &[&str]) -> Self {
        Self {
            raw: fields.join("."),
            segments: fields
                .iter()
                .map(|f| Segment::Field((*f).to_string()))
                .collect(),
        }
    }

    /// The path as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether any segment can yield more than one value.
    pub fn has_wildcard(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Each(_) | Segment::Any))
    }

    /// Resolve every value the path reaches from `root`.
    ///
    /// JSON `null` is treated as absent.
    pub fn resolve<'a>(&self, root: &'a Value) -> Vec<&'a Value> {
        let mut current = vec![root];
        for segment in &self.segments {
            let mut next = Vec::new();
            for value in current {
                step(value, segment, &mut next);
            }
            if next.is_empty() {
                return next;
            }
            current = next;
        }
        current
    }

    /// Resolve the first value the path reaches, if any.
    pub fn first<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.resolve(root).into_iter().next()
    }

    /// Resolve every reachable value rendered as text.
    pub fn texts(&self, root: &Value) -> Vec<String> {
        self.resolve(root).into_iter().map(scalar_text).collect()
    }
}

fn parse_segment(part: &str) -> Result<Segment, String> {
    if part.is_empty() {
        return Err("empty segment".to_string());
    }
    if part == "*" {
        return Ok(Segment::Any);
    }

    let Some(open) = part.find('[') else {
        if part.contains(']') {
            return Err(format!("unbalanced ']' in '{part}'"));
        }
        return Ok(Segment::Field(part.to_string()));
    };

    let name = &part[..open];
    if name.is_empty() {
        return Err(format!("missing member name before '[' in '{part}'"));
    }
    let inner = part[open + 1..]
        .strip_suffix(']')
        .ok_or_else(|| format!("unterminated index in '{part}'"))?;

    if inner == "*" {
        Ok(Segment::Each(name.to_string()))
    } else {
        inner
            .parse::<usize>()
            .map(|i| Segment::Index(name.to_string(), i))
            .map_err(|_| format!("index must be '*' or a number in '{part}'"))
    }
}

fn member<'a>(value: &'a Value, name: &str, out: &mut Vec<&'a Value>) {
    match value {
        Value::Object(map) => {
            if let Some(v) = map.get(name) {
                if !v.is_null() {
                    out.push(v);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                member(item, name, out);
            }
        }
        _ => {}
    }
}

fn step<'a>(value: &'a Value, segment: &Segment, out: &mut Vec<&'a Value>) {
    match segment {
        Segment::Field(name) => member(value, name, out),
        Segment::Index(name, index) => {
            let mut found = Vec::new();
            member(value, name, &mut found);
            for v in found {
                if let Some(item) = v.as_array().and_then(|a| a.get(*index)) {
                    if !item.is_null() {
                        out.push(item);
                    }
                }
            }
        }
        Segment::Each(name) => {
            let mut found = Vec::new();
            member(value, name, &mut found);
            for v in found {
                match v {
                    Value::Array(items) => out.extend(items.iter().filter(|i| !i.is_null())),
                    // A lone object where a list was expected counts as one element.
                    other => out.push(other),
                }
            }
        }
        Segment::Any => match value {
            Value::Object(map) => out.extend(map.values().filter(|v| !v.is_null())),
            Value::Array(items) => out.extend(items.iter().filter(|v| !v.is_null())),
            _ => {}
        },
    }
}

/// Render a JSON value as plain text: strings without quotes, everything else
/// in its JSON form.
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for AttributePath {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AttributePath {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<AttributePath> for String {
    fn from(p: AttributePath) -> Self {
        p.raw
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(s: &str) -> AttributePath {
        AttributePath::parse(s).unwrap()
    }

    #[test]
    fn resolves_nested_members() {
        let doc = json!({"event-header": {"entity-type": "vserver"}});
        let found = path("event-header.entity-type").resolve(&doc);
        assert_eq!(found, vec![&json!("vserver")]);
    }

    #[test]
    fn wildcard_collects_every_element() {
        let doc = json!({
            "relationship-list": {"relationship": [
                {"related-to": "flavor"},
                {"related-to": "image"}
            ]}
        });
        let p = path("relationship-list.relationship[*].related-to");
        assert!(p.has_wildcard());
        assert_eq!(p.texts(&doc), vec!["flavor", "image"]);
    }

    #[test]
    fn index_selects_single_element() {
        let doc = json!({"items": [{"n": 1}, {"n": 2}]});
        assert_eq!(path("items[1].n").resolve(&doc), vec![&json!(2)]);
        assert!(path("items[5].n").resolve(&doc).is_empty());
        assert!(!path("items[1].n").has_wildcard());
    }

    #[test]
    fn star_selects_object_values() {
        let doc = json!({"a": {"x": 1, "y": 2}});
        assert_eq!(path("a.*").resolve(&doc).len(), 2);
    }

    #[test]
    fn nulls_are_absent() {
        let doc = json!({"a": null});
        assert!(path("a").resolve(&doc).is_empty());
    }

    #[test]
    fn rejects_malformed_paths() {
        assert!(AttributePath::parse("").is_err());
        assert!(AttributePath::parse("a..b").is_err());
        assert!(AttributePath::parse("a[x]").is_err());
        assert!(AttributePath::parse("[*]").is_err());
        assert!(AttributePath::parse("a[1").is_err());
    }

    #[test]
    fn deserializes_from_string() {
        let p: AttributePath = serde_json::from_str("\"a.b[*]\"").unwrap();
        assert_eq!(p.as_str(), "a.b[*]");
        assert!(serde_json::from_str::<AttributePath>("\"a..b\"").is_err());
    }
}
