// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Path expressions over Kubernetes records.
//!
//! A path is compiled once when the catalog is loaded and then evaluated
//! against every record a table sees. Evaluation returns every matched value,
//! so a path such as `spec.containers[*].image` yields one match per
//! container, which is what later drives row expansion.
//!
//! # Syntax
//!
//! - `$` - optional root marker: `$.metadata.name`
//! - `.field` - object field access: `metadata.name`
//! - `['a.b/c']`, `."a.b/c"` - quoted keys for names with dots or slashes
//! - `[n]` - array index, negative counts from the end: `status.conditions[-1]`
//! - `[*]`, `[]`, `.*` - every array item or object value
//! - `[a,b]`, `['a','b']`, `[0,2]` - union of keys or indices
//! - `..field` - recursive descent
//! - `[?(@.type == 'Ready')]`, `[?type = "Ready"]` - filter items by a
//!   relative path compared with `==`/`=`, `!=` or `=~` (regex); a bare
//!   `[?(@.field)]` keeps items where the field exists

use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::iter::Peekable;
use std::str::Chars;
use thiserror::Error;

/// Characters that end an unquoted field name
const FIELD_DELIMITERS: &[char] = &[
    '.', '[', ']', '(', ')', '=', '!', '~', '<', '>', ',', '\'', '"',
];

/// A compiled path expression
#[derive(Clone)]
pub struct JsonPath {
    source: String,
    segments: Vec<PathSegment>,
}

impl fmt::Debug for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("JsonPath").field(&self.source).finish()
    }
}

impl PartialEq for JsonPath {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// Error raised when a path string cannot be compiled
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid path '{path}': {reason}")]
pub struct PathError {
    pub path: String,
    pub reason: SyntaxError,
}

/// What is wrong with a path string
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyntaxError {
    #[error("empty path")]
    Empty,
    #[error("unexpected character '{0}'")]
    Trailing(char),
    #[error("expected a field name")]
    ExpectedField,
    #[error("expected a field name after '.'")]
    ExpectedFieldAfterDot,
    #[error("unterminated escape")]
    UnterminatedEscape,
    #[error("unterminated quoted key")]
    UnterminatedQuote,
    #[error("invalid index '{0}'")]
    InvalidIndex(String),
    #[error("expected a key or index inside brackets")]
    ExpectedKey,
    #[error("unterminated '['")]
    UnterminatedBracket,
    #[error("unexpected '{0}' inside brackets")]
    UnexpectedInBrackets(char),
    #[error("expected '{expected}', found '{found}'")]
    Mismatch { expected: char, found: char },
    #[error("expected '{0}'")]
    Missing(char),
    #[error("unterminated filter")]
    UnterminatedFilter,
    #[error("filter needs a path")]
    FilterWithoutPath,
    #[error("unsupported filter expression '{0}'")]
    UnsupportedFilter(String),
    #[error("filter comparison needs a value")]
    MissingValue,
    #[error("invalid regex '{pattern}': {source}")]
    Regex {
        pattern: String,
        source: regex::Error,
    },
}

/// Parsed segment of a path
#[derive(Debug, Clone)]
enum PathSegment {
    Field(String),
    Index(i64),
    Wildcard,
    Union(Vec<Key>),
    /// The node itself and every node below it, in document order
    Descendants,
    Filter(Box<Filter>),
}

#[derive(Debug, Clone)]
enum Key {
    Name(String),
    Index(i64),
}

#[derive(Debug, Clone)]
struct Filter {
    path: Vec<PathSegment>,
    test: Option<(CompareOp, Literal)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CompareOp {
    Eq,
    Ne,
    Matches,
}

#[derive(Debug, Clone)]
enum Literal {
    Value(Value),
    Pattern(Regex),
}

impl JsonPath {
    /// Compile a path string
    pub fn compile(path: &str) -> Result<Self, PathError> {
        let source = path.trim().to_string();
        let err = |reason: SyntaxError| PathError {
            path: source.clone(),
            reason,
        };

        if source.is_empty() {
            return Err(err(SyntaxError::Empty));
        }

        let mut chars = source.chars().peekable();
        if chars.peek() == Some(&'$') {
            chars.next();
        }

        let segments = parse_segments(&mut chars, true).map_err(err)?;
        if let Some(c) = chars.next() {
            return Err(err(SyntaxError::Trailing(c)));
        }

        Ok(Self { source, segments })
    }

    /// The path string this was compiled from
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Evaluate against a record, returning every matched value
    pub fn find<'a>(&self, record: &'a Value) -> Vec<&'a Value> {
        apply_segments(&self.segments, vec![record])
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn apply_segments<'a>(segments: &[PathSegment], mut current: Vec<&'a Value>) -> Vec<&'a Value> {
    for segment in segments {
        if current.is_empty() {
            break;
        }
        current = current
            .into_iter()
            .flat_map(|node| segment.apply(node))
            .collect();
    }
    current
}

impl PathSegment {
    fn apply<'a>(&self, node: &'a Value) -> Vec<&'a Value> {
        match self {
            PathSegment::Field(name) => node.get(name.as_str()).into_iter().collect(),
            PathSegment::Index(idx) => index_array(node, *idx).into_iter().collect(),
            PathSegment::Wildcard => match node {
                Value::Array(items) => items.iter().collect(),
                Value::Object(map) => map.values().collect(),
                _ => vec![],
            },
            PathSegment::Union(keys) => keys
                .iter()
                .filter_map(|key| match key {
                    Key::Name(name) => node.get(name.as_str()),
                    Key::Index(idx) => index_array(node, *idx),
                })
                .collect(),
            PathSegment::Descendants => {
                let mut out = Vec::new();
                collect_descendants(node, &mut out);
                out
            }
            PathSegment::Filter(filter) => match node {
                Value::Array(items) => items.iter().filter(|item| filter.test(item)).collect(),
                other if filter.test(other) => vec![other],
                _ => vec![],
            },
        }
    }
}

fn index_array(node: &Value, idx: i64) -> Option<&Value> {
    let items = node.as_array()?;
    let resolved = if idx < 0 {
        items.len().checked_sub(idx.unsigned_abs() as usize)?
    } else {
        idx as usize
    };
    items.get(resolved)
}

fn collect_descendants<'a>(node: &'a Value, out: &mut Vec<&'a Value>) {
    out.push(node);
    match node {
        Value::Array(items) => items.iter().for_each(|v| collect_descendants(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_descendants(v, out)),
        _ => {}
    }
}

impl Filter {
    fn test(&self, item: &Value) -> bool {
        let matches = apply_segments(&self.path, vec![item]);
        match &self.test {
            None => !matches.is_empty(),
            Some((CompareOp::Eq, literal)) => matches.iter().any(|m| literal.equals(m)),
            Some((CompareOp::Ne, literal)) => {
                !matches.is_empty() && !matches.iter().any(|m| literal.equals(m))
            }
            Some((CompareOp::Matches, literal)) => matches.iter().any(|m| literal.matches(m)),
        }
    }
}

impl Literal {
    fn equals(&self, value: &Value) -> bool {
        match self {
            Literal::Value(expected) => {
                expected == value || scalar_text(expected) == scalar_text(value)
            }
            Literal::Pattern(re) => re.is_match(&scalar_text(value)),
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            Literal::Pattern(re) => re.is_match(&scalar_text(value)),
            Literal::Value(expected) => scalar_text(expected) == scalar_text(value),
        }
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse segments until the input is exhausted or a character that cannot
/// start a segment is reached. `leading` allows a bare first field name
/// (`metadata.name` as well as `.metadata.name`).
fn parse_segments(
    chars: &mut Peekable<Chars>,
    leading: bool,
) -> Result<Vec<PathSegment>, SyntaxError> {
    let mut segments = Vec::new();

    if leading {
        match chars.peek() {
            Some('.') | Some('[') | None => {}
            Some('*') => {
                chars.next();
                segments.push(PathSegment::Wildcard);
            }
            Some(_) => {
                let field = consume_field_name(chars);
                if field.is_empty() {
                    return Err(SyntaxError::ExpectedField);
                }
                segments.push(PathSegment::Field(field));
            }
        }
    }

    while let Some(&c) = chars.peek() {
        match c {
            '.' => {
                chars.next();
                if chars.peek() == Some(&'.') {
                    chars.next();
                    segments.push(PathSegment::Descendants);
                    if chars.peek() == Some(&'[') {
                        continue;
                    }
                }
                segments.push(parse_dot_selector(chars)?);
            }
            '[' => {
                chars.next();
                segments.push(parse_bracket_segment(chars)?);
            }
            _ => break,
        }
    }

    Ok(segments)
}

/// Parse what follows a `.`: a field name, a quoted key, or `*`
fn parse_dot_selector(chars: &mut Peekable<Chars>) -> Result<PathSegment, SyntaxError> {
    match chars.peek() {
        Some('*') => {
            chars.next();
            Ok(PathSegment::Wildcard)
        }
        Some(&q) if q == '\'' || q == '"' => {
            chars.next();
            Ok(PathSegment::Field(consume_quoted(chars, q)?))
        }
        _ => {
            let field = consume_field_name(chars);
            if field.is_empty() {
                Err(SyntaxError::ExpectedFieldAfterDot)
            } else {
                Ok(PathSegment::Field(field))
            }
        }
    }
}

/// Consume a field name up to the next delimiter or whitespace
fn consume_field_name(chars: &mut Peekable<Chars>) -> String {
    let mut field = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() || FIELD_DELIMITERS.contains(&c) {
            break;
        }
        field.push(c);
        chars.next();
    }
    field
}

/// Consume a quoted string; the opening quote has already been consumed
fn consume_quoted(chars: &mut Peekable<Chars>, quote: char) -> Result<String, SyntaxError> {
    let mut out = String::new();
    loop {
        match chars.next() {
            Some('\\') => match chars.next() {
                Some(escaped) => out.push(escaped),
                None => return Err(SyntaxError::UnterminatedEscape),
            },
            Some(c) if c == quote => return Ok(out),
            Some(c) => out.push(c),
            None => return Err(SyntaxError::UnterminatedQuote),
        }
    }
}

fn skip_whitespace(chars: &mut Peekable<Chars>) {
    while chars.peek().is_some_and(|c| c.is_whitespace()) {
        chars.next();
    }
}

/// Parse a bracket segment and consume the closing bracket; the opening
/// bracket has already been consumed
fn parse_bracket_segment(chars: &mut Peekable<Chars>) -> Result<PathSegment, SyntaxError> {
    skip_whitespace(chars);

    match chars.peek() {
        Some(']') => {
            chars.next();
            return Ok(PathSegment::Wildcard);
        }
        Some('*') => {
            chars.next();
            skip_whitespace(chars);
            expect_char(chars, ']')?;
            return Ok(PathSegment::Wildcard);
        }
        Some('?') => {
            chars.next();
            let body = consume_filter_body(chars)?;
            return Ok(PathSegment::Filter(Box::new(parse_filter(&body)?)));
        }
        _ => {}
    }

    let mut keys = Vec::new();
    loop {
        skip_whitespace(chars);
        match chars.peek() {
            Some(&q) if q == '\'' || q == '"' => {
                chars.next();
                keys.push(Key::Name(consume_quoted(chars, q)?));
            }
            Some(&c) if c == '-' || c.is_ascii_digit() => {
                let mut digits = String::new();
                while let Some(&d) = chars.peek() {
                    if d == '-' || d.is_ascii_digit() {
                        digits.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let idx = digits
                    .parse::<i64>()
                    .map_err(|_| SyntaxError::InvalidIndex(digits.clone()))?;
                keys.push(Key::Index(idx));
            }
            Some(_) => {
                let name = consume_field_name(chars);
                if name.is_empty() {
                    return Err(SyntaxError::ExpectedKey);
                }
                keys.push(Key::Name(name));
            }
            None => return Err(SyntaxError::UnterminatedBracket),
        }
        skip_whitespace(chars);
        match chars.next() {
            Some(',') => continue,
            Some(']') => break,
            Some(c) => return Err(SyntaxError::UnexpectedInBrackets(c)),
            None => return Err(SyntaxError::UnterminatedBracket),
        }
    }

    Ok(match keys.as_slice() {
        [Key::Name(name)] => PathSegment::Field(name.clone()),
        [Key::Index(idx)] => PathSegment::Index(*idx),
        _ => PathSegment::Union(keys),
    })
}

fn expect_char(chars: &mut Peekable<Chars>, expected: char) -> Result<(), SyntaxError> {
    match chars.next() {
        Some(c) if c == expected => Ok(()),
        Some(found) => Err(SyntaxError::Mismatch { expected, found }),
        None => Err(SyntaxError::Missing(expected)),
    }
}

/// Collect the text of a filter up to its closing bracket, honouring quotes
/// and nested brackets
fn consume_filter_body(chars: &mut Peekable<Chars>) -> Result<String, SyntaxError> {
    let mut body = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for c in chars.by_ref() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                body.push(c);
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    body.push(c);
                }
                '[' => {
                    depth += 1;
                    body.push(c);
                }
                ']' if depth == 0 => return Ok(body),
                ']' => {
                    depth -= 1;
                    body.push(c);
                }
                _ => body.push(c),
            },
        }
    }

    Err(SyntaxError::UnterminatedFilter)
}

/// Parse a filter body such as `(@.type == 'Ready')` or `type = "Ready"`
fn parse_filter(body: &str) -> Result<Filter, SyntaxError> {
    let mut body = body.trim();
    if let Some(inner) = body.strip_prefix('(').and_then(|b| b.strip_suffix(')')) {
        body = inner.trim();
    }
    let body = body.strip_prefix('@').unwrap_or(body);

    let mut chars = body.chars().peekable();
    let path = parse_segments(&mut chars, true)?;
    if path.is_empty() {
        return Err(SyntaxError::FilterWithoutPath);
    }
    skip_whitespace(&mut chars);

    let rest: String = chars.collect();
    let rest = rest.trim();
    if rest.is_empty() {
        return Ok(Filter { path, test: None });
    }

    let (op, literal) = if let Some(lit) = rest.strip_prefix("==") {
        (CompareOp::Eq, lit)
    } else if let Some(lit) = rest.strip_prefix("!=") {
        (CompareOp::Ne, lit)
    } else if let Some(lit) = rest.strip_prefix("=~") {
        (CompareOp::Matches, lit)
    } else if let Some(lit) = rest.strip_prefix('=') {
        (CompareOp::Eq, lit)
    } else {
        return Err(SyntaxError::UnsupportedFilter(rest.to_string()));
    };

    let literal = parse_literal(literal.trim(), op)?;
    Ok(Filter {
        path,
        test: Some((op, literal)),
    })
}

fn parse_literal(text: &str, op: CompareOp) -> Result<Literal, SyntaxError> {
    let unquoted = ['\'', '"']
        .iter()
        .find_map(|&q| text.strip_prefix(q).and_then(|t| t.strip_suffix(q)));

    if op == CompareOp::Matches {
        let pattern = unquoted.unwrap_or(text);
        let pattern = pattern
            .strip_prefix('/')
            .and_then(|p| p.strip_suffix('/'))
            .unwrap_or(pattern);
        return Regex::new(pattern)
            .map(Literal::Pattern)
            .map_err(|source| SyntaxError::Regex {
                pattern: pattern.to_string(),
                source,
            });
    }

    if let Some(s) = unquoted {
        return Ok(Literal::Value(Value::String(s.to_string())));
    }
    if text.is_empty() {
        return Err(SyntaxError::MissingValue);
    }
    // Numbers, booleans and null; anything else is taken as a bare string
    Ok(Literal::Value(
        serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pod() -> Value {
        json!({
            "metadata": {
                "name": "nginx-7c5b",
                "namespace": "web",
                "labels": {"app.kubernetes.io/name": "nginx", "tier": "frontend"}
            },
            "spec": {
                "nodeName": "node-1",
                "containers": [
                    {"name": "nginx", "image": "nginx:1.25", "ports": [{"containerPort": 80}]},
                    {"name": "sidecar", "image": "envoy:v1", "ports": [{"containerPort": 9901}]}
                ]
            },
            "status": {
                "conditions": [
                    {"type": "Initialized", "status": "True"},
                    {"type": "Ready", "status": "False"}
                ]
            }
        })
    }

    fn find(path: &str, value: &Value) -> Vec<Value> {
        JsonPath::compile(path)
            .unwrap()
            .find(value)
            .into_iter()
            .cloned()
            .collect()
    }

    #[test]
    fn test_simple_field_access() {
        let pod = pod();
        assert_eq!(find("metadata.name", &pod), vec![json!("nginx-7c5b")]);
        assert_eq!(find("$.metadata.namespace", &pod), vec![json!("web")]);
        assert_eq!(find(".spec.nodeName", &pod), vec![json!("node-1")]);
    }

    #[test]
    fn test_missing_field_yields_nothing() {
        assert!(find("metadata.uid", &pod()).is_empty());
        assert!(find("spec.nodeName.deeper", &pod()).is_empty());
    }

    #[test]
    fn test_quoted_keys() {
        let pod = pod();
        assert_eq!(
            find("metadata.labels['app.kubernetes.io/name']", &pod),
            vec![json!("nginx")]
        );
        assert_eq!(
            find("metadata.labels.\"app.kubernetes.io/name\"", &pod),
            vec![json!("nginx")]
        );
    }

    #[test]
    fn test_array_index() {
        let pod = pod();
        assert_eq!(find("spec.containers[0].name", &pod), vec![json!("nginx")]);
        assert_eq!(
            find("status.conditions[-1].type", &pod),
            vec![json!("Ready")]
        );
        assert!(find("spec.containers[5].name", &pod).is_empty());
        assert!(find("spec.containers[-5].name", &pod).is_empty());
    }

    #[test]
    fn test_wildcards() {
        let pod = pod();
        let expected = vec![json!("nginx:1.25"), json!("envoy:v1")];
        assert_eq!(find("spec.containers[*].image", &pod), expected);
        assert_eq!(find("spec.containers[].image", &pod), expected);
        assert_eq!(find("spec.containers.*.image", &pod), expected);
        assert_eq!(find("metadata.labels.*", &pod).len(), 2);
    }

    #[test]
    fn test_union() {
        let pod = pod();
        assert_eq!(
            find("metadata['name','namespace']", &pod),
            vec![json!("nginx-7c5b"), json!("web")]
        );
        assert_eq!(
            find("spec.containers[0,1].name", &pod),
            vec![json!("nginx"), json!("sidecar")]
        );
    }

    #[test]
    fn test_recursive_descent() {
        let pod = pod();
        assert_eq!(find("$..containerPort", &pod), vec![json!(80), json!(9901)]);
        assert_eq!(find("spec..name", &pod), vec![json!("nginx"), json!("sidecar")]);
    }

    #[test]
    fn test_filter_equality() {
        let pod = pod();
        assert_eq!(
            find("status.conditions[?(@.type == 'Ready')].status", &pod),
            vec![json!("False")]
        );
        assert_eq!(
            find("status.conditions[?type = \"Initialized\"].status", &pod),
            vec![json!("True")]
        );
    }

    #[test]
    fn test_filter_not_equal_and_regex() {
        let pod = pod();
        assert_eq!(
            find("status.conditions[?(@.type != 'Ready')].type", &pod),
            vec![json!("Initialized")]
        );
        assert_eq!(
            find("spec.containers[?(@.image =~ '^envoy')].name", &pod),
            vec![json!("sidecar")]
        );
    }

    #[test]
    fn test_filter_existence_and_numbers() {
        let value = json!({"items": [{"a": 1}, {"b": 2}, {"a": 3}]});
        assert_eq!(find("items[?(@.a)].a", &value), vec![json!(1), json!(3)]);
        assert_eq!(find("items[?(@.a == 3)].a", &value), vec![json!(3)]);
        assert_eq!(find("items[?(@.a == '1')].a", &value), vec![json!(1)]);
    }

    #[test]
    fn test_root_only() {
        let value = json!({"a": 1});
        assert_eq!(find("$", &value), vec![value.clone()]);
    }

    #[test]
    fn test_compile_errors() {
        assert!(JsonPath::compile("").is_err());
        assert!(JsonPath::compile("metadata.").is_err());
        assert!(JsonPath::compile("spec.containers[0").is_err());
        assert!(JsonPath::compile("metadata['name").is_err());
        assert!(JsonPath::compile("items[?(@.a =~ '(')]").is_err());
        assert!(JsonPath::compile("metadata name").is_err());
    }

    #[test]
    fn test_compile_error_reasons() {
        let err = JsonPath::compile("spec.containers[0").unwrap_err();
        assert_eq!(err.path, "spec.containers[0");
        assert_eq!(err.reason, SyntaxError::UnterminatedBracket);

        let err = JsonPath::compile("metadata name").unwrap_err();
        assert_eq!(err.reason, SyntaxError::Trailing(' '));
        assert_eq!(err.to_string(), "invalid path 'metadata name': unexpected character ' '");

        let err = JsonPath::compile("items[?(@.a =~ '(')]").unwrap_err();
        assert!(matches!(err.reason, SyntaxError::Regex { ref pattern, .. } if pattern == "("));
    }

    #[test]
    fn test_display_and_equality() {
        let a = JsonPath::compile(" metadata.name ").unwrap();
        let b = JsonPath::compile("metadata.name").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "metadata.name");
    }
}
