//! Minimal JSONPath evaluator over [`serde_json::Value`].
//!
//! Supported syntax:
//! - `$` root (mandatory prefix);
//! - `.name` and `['name']` / `["name"]` child access;
//! - `[n]` array index, negative values count from the end;
//! - `.*` and `[*]` wildcards over object values / array items.
//!
//! A path that resolves to nothing yields [`JsonPathError::NotFound`], which callers
//! treat either as a non-match (rule matching) or as a hard error (env resolution).
use std::{fmt, str::FromStr};

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JsonPathError {
    #[error("invalid jsonpath '{path}': {reason}")]
    Syntax { path: String, reason: String },

    #[error("jsonpath '{0}' did not match any value")]
    NotFound(String),
}

impl JsonPathError {
    /// Returns `true` for the "nothing selected" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, JsonPathError::NotFound(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(i64),
    Wildcard,
}

/// Compiled JSONPath expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    raw: String,
    segments: Vec<Segment>,
}

impl JsonPath {
    /// Compile a path expression.
    pub fn parse(path: &str) -> Result<Self, JsonPathError> {
        let raw = path.trim();
        let syntax = |reason: &str| JsonPathError::Syntax {
            path: raw.to_string(),
            reason: reason.to_string(),
        };

        let rest = raw
            .strip_prefix('$')
            .ok_or_else(|| syntax("expression must start with '$'"))?;
        let chars: Vec<char> = rest.chars().collect();
        let mut segments = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            match chars[i] {
                '.' => {
                    i += 1;
                    let start = i;
                    while i < chars.len() && chars[i] != '.' && chars[i] != '[' {
                        i += 1;
                    }
                    let name: String = chars[start..i].iter().collect();
                    match name.as_str() {
                        "" => return Err(syntax("empty member name")),
                        "*" => segments.push(Segment::Wildcard),
                        _ => segments.push(Segment::Key(name)),
                    }
                }
                '[' => {
                    let close =
                        bracket_end(&chars, i).ok_or_else(|| syntax("unterminated '['"))?;
                    let inner: String = chars[i + 1..close].iter().collect();
                    segments.push(parse_bracket(inner.trim()).ok_or_else(|| {
                        syntax(&format!("unsupported bracket expression '[{inner}]'"))
                    })?);
                    i = close + 1;
                }
                other => return Err(syntax(&format!("unexpected character '{other}'"))),
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// Original expression text.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Evaluate against `root`.
    ///
    /// Paths without wildcards return the single selected value. Wildcard paths
    /// return every selected value collected into an array.
    pub fn select(&self, root: &Value) -> Result<Value, JsonPathError> {
        let mut nodes = vec![root];
        let mut fan_out = false;

        for segment in &self.segments {
            let mut next = Vec::with_capacity(nodes.len());
            for node in nodes {
                match (segment, node) {
                    (Segment::Key(key), Value::Object(map)) => next.extend(map.get(key)),
                    (Segment::Index(idx), Value::Array(items)) => {
                        let len = items.len() as i64;
                        let pos = if *idx < 0 { len + idx } else { *idx };
                        if (0..len).contains(&pos) {
                            next.push(&items[pos as usize]);
                        }
                    }
                    (Segment::Wildcard, Value::Object(map)) => next.extend(map.values()),
                    (Segment::Wildcard, Value::Array(items)) => next.extend(items.iter()),
                    _ => {}
                }
            }
            if matches!(segment, Segment::Wildcard) {
                fan_out = true;
            }
            if next.is_empty() {
                return Err(JsonPathError::NotFound(self.raw.clone()));
            }
            nodes = next;
        }

        if fan_out {
            Ok(Value::Array(nodes.into_iter().cloned().collect()))
        } else {
            Ok(nodes[0].clone())
        }
    }

    /// Evaluate and render the result as a plain string (see [`stringify`]).
    pub fn select_string(&self, root: &Value) -> Result<String, JsonPathError> {
        self.select(root).map(|v| stringify(&v))
    }
}

impl FromStr for JsonPath {
    type Err = JsonPathError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Convenience: compile `path` and evaluate it against `root` as a string.
pub fn select_string(path: &str, root: &Value) -> Result<String, JsonPathError> {
    JsonPath::parse(path)?.select_string(root)
}

/// Render a JSON value for use as a match operand or environment value.
///
/// Strings are returned verbatim (without quotes); everything else is compact JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Index of the `]` closing the bracket opened at `open`, skipping quoted keys.
fn bracket_end(chars: &[char], open: usize) -> Option<usize> {
    let mut quote = None;
    for (i, &c) in chars.iter().enumerate().skip(open + 1) {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, ']') => return Some(i),
            _ => {}
        }
    }
    None
}

fn parse_bracket(inner: &str) -> Option<Segment> {
    if inner == "*" {
        return Some(Segment::Wildcard);
    }
    for quote in ['\'', '"'] {
        if let Some(key) = inner
            .strip_prefix(quote)
            .and_then(|s| s.strip_suffix(quote))
        {
            return Some(Segment::Key(key.to_string()));
        }
    }
    inner.parse::<i64>().ok().map(Segment::Index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> Value {
        json!({
            "type": "sh.keptn.event.deployment.triggered",
            "data": {
                "project": "sockshop",
                "deployment": { "url": "https://x", "replicas": 3 },
                "labels": { "team.name": "core" },
                "targets": ["a", "b", "c"]
            }
        })
    }

    #[test]
    fn selects_nested_member() {
        let v = select_string("$.data.deployment.url", &payload()).unwrap();
        assert_eq!(v, "https://x");
    }

    #[test]
    fn non_string_values_are_rendered_as_json() {
        assert_eq!(
            select_string("$.data.deployment.replicas", &payload()).unwrap(),
            "3"
        );
        let rendered = select_string("$.data.deployment", &payload()).unwrap();
        let back: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(back, json!({ "url": "https://x", "replicas": 3 }));
    }

    #[test]
    fn bracket_keys_allow_dots_in_names() {
        let v = select_string("$.data.labels['team.name']", &payload()).unwrap();
        assert_eq!(v, "core");
    }

    #[test]
    fn quoted_keys_may_contain_brackets() {
        let doc = json!({ "data": { "a]b": "x", "c[d": { "e": "y" } } });
        assert_eq!(select_string("$.data['a]b']", &doc).unwrap(), "x");
        assert_eq!(select_string("$.data[\"c[d\"].e", &doc).unwrap(), "y");
        assert!(JsonPath::parse("$.data['a]").is_err());
    }

    #[test]
    fn indexes_including_negative() {
        assert_eq!(select_string("$.data.targets[0]", &payload()).unwrap(), "a");
        assert_eq!(select_string("$.data.targets[-1]", &payload()).unwrap(), "c");
        assert!(
            select_string("$.data.targets[3]", &payload())
                .unwrap_err()
                .is_not_found()
        );
    }

    #[test]
    fn wildcard_collects_into_array() {
        let path = JsonPath::parse("$.data.targets[*]").unwrap();
        assert_eq!(path.select(&payload()).unwrap(), json!(["a", "b", "c"]));
    }

    #[test]
    fn missing_member_is_not_found() {
        let err = select_string("$.data.nope.deeper", &payload()).unwrap_err();
        assert_eq!(err, JsonPathError::NotFound("$.data.nope.deeper".into()));
    }

    #[test]
    fn root_selects_whole_document() {
        let path = JsonPath::parse("$").unwrap();
        assert_eq!(path.select(&payload()).unwrap(), payload());
    }

    #[test]
    fn rejects_malformed_expressions() {
        for bad in ["data.project", "$..x", "$.data[", "$.data[abc]", "$ .x"] {
            let err = JsonPath::parse(bad).unwrap_err();
            assert!(!err.is_not_found(), "expected syntax error for {bad:?}");
        }
    }
}
