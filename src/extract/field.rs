// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Field specifications and per-record extraction
//!
//! A field is declared in the catalog in one of three shapes:
//!
//! ```yaml
//! fields:
//!   name: metadata.name                       # simple path
//!   addresses: [spec.range, unrange]          # path + transform chain
//!   limits:                                   # sub-field map
//!     cpu: spec.containers[*].resources.limits.cpu
//!     mem: spec.containers[*].resources.limits.memory
//! ```
//!
//! Each shape is parsed once into [`FieldSpec`] and evaluated per record by
//! [`FieldSpec::extract`], producing the candidate values for the column.

use serde_json::Value;
use serde_yaml::Value as YamlValue;
use thiserror::Error;

use super::path::{JsonPath, PathError};
use super::transform::{Transform, TransformError};

/// Placeholder for a path that matched nothing
pub const PLACEHOLDER: &str = "<none>";

/// A field declaration that cannot be parsed, or a transform that failed
#[derive(Debug, Error)]
pub enum FieldError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("first element must be a path")]
    ChainWithoutPath,
    #[error("empty transform chain")]
    EmptyChain,
    #[error("transform names must be strings, got {0}")]
    TransformName(String),
    #[error("sub-fields must map names to path strings")]
    SubFieldShape,
    #[error("empty sub-field map")]
    EmptySubFields,
    #[error("unsupported field declaration {0}")]
    Unsupported(String),
}

/// How one column is derived from a record
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSpec {
    Simple(JsonPath),
    TransformChain {
        path: JsonPath,
        transforms: Vec<Transform>,
    },
    /// Sub-field name to path, in declaration order
    SubFields(Vec<(String, JsonPath)>),
}

/// Candidate values a field produced for one record
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Flat(Vec<String>),
    /// Zipped sub-field records, each contributing extra columns
    Records(Vec<Vec<(String, String)>>),
}

impl ColumnValue {
    pub fn len(&self) -> usize {
        match self {
            ColumnValue::Flat(values) => values.len(),
            ColumnValue::Records(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FieldSpec {
    /// Parse the YAML form of a field declaration
    pub fn from_yaml(value: &YamlValue) -> Result<Self, FieldError> {
        match value {
            YamlValue::String(path) => Ok(FieldSpec::Simple(JsonPath::compile(path)?)),
            YamlValue::Sequence(items) => {
                let mut items = items.iter();
                let path = match items.next() {
                    Some(YamlValue::String(path)) => JsonPath::compile(path)?,
                    Some(_) => return Err(FieldError::ChainWithoutPath),
                    None => return Err(FieldError::EmptyChain),
                };
                let transforms = items
                    .map(|item| match item {
                        YamlValue::String(name) => Ok(name.parse::<Transform>()?),
                        other => Err(FieldError::TransformName(format!("{:?}", other))),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(FieldSpec::TransformChain { path, transforms })
            }
            YamlValue::Mapping(map) => {
                let mut subfields = Vec::with_capacity(map.len());
                for (key, path) in map {
                    let (Some(key), Some(path)) = (key.as_str(), path.as_str()) else {
                        return Err(FieldError::SubFieldShape);
                    };
                    subfields.push((key.to_string(), JsonPath::compile(path)?));
                }
                if subfields.is_empty() {
                    return Err(FieldError::EmptySubFields);
                }
                Ok(FieldSpec::SubFields(subfields))
            }
            other => Err(FieldError::Unsupported(format!("{:?}", other))),
        }
    }

    /// Column names this field contributes to a row
    pub fn column_names<'a>(&'a self, field: &'a str) -> Vec<&'a str> {
        match self {
            FieldSpec::SubFields(subfields) => {
                subfields.iter().map(|(name, _)| name.as_str()).collect()
            }
            _ => vec![field],
        }
    }

    /// Evaluate against one record
    ///
    /// Paths that match nothing yield the placeholder. Only the `unroll` and
    /// `unrange` directives of a transform chain may leave the list empty.
    pub fn extract(&self, record: &Value) -> Result<ColumnValue, FieldError> {
        match self {
            FieldSpec::Simple(path) => Ok(ColumnValue::Flat(find_strings(path, record))),
            FieldSpec::TransformChain { path, transforms } => {
                let matches: Vec<Value> = path.find(record).into_iter().cloned().collect();
                if matches.is_empty() {
                    return Ok(ColumnValue::Flat(vec![PLACEHOLDER.to_string()]));
                }
                let values = transforms
                    .iter()
                    .try_fold(matches, |values, transform| transform.apply(values))?;
                Ok(ColumnValue::Flat(values.iter().map(format_value).collect()))
            }
            FieldSpec::SubFields(subfields) => {
                let columns: Vec<(&str, Vec<String>)> = subfields
                    .iter()
                    .map(|(name, path)| (name.as_str(), find_strings(path, record)))
                    .collect();
                let shortest = columns.iter().map(|(_, v)| v.len()).min().unwrap_or(0);
                let records = (0..shortest)
                    .map(|i| {
                        columns
                            .iter()
                            .map(|(name, values)| (name.to_string(), values[i].clone()))
                            .collect()
                    })
                    .collect();
                Ok(ColumnValue::Records(records))
            }
        }
    }
}

fn find_strings(path: &JsonPath, record: &Value) -> Vec<String> {
    let values: Vec<String> = path.find(record).into_iter().map(format_value).collect();
    if values.is_empty() {
        vec![PLACEHOLDER.to_string()]
    } else {
        values
    }
}

/// Display form of a matched value
///
/// Node selector terms render as `key = a,b` / `key != a,b` / `key exists`
/// joined with ` & `, taints as `key=value:effect`; other structures render
/// as compact JSON and scalars as their text.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => PLACEHOLDER.to_string(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Object(map) => {
            for key in ["matchExpressions", "matchFields"] {
                if let Some(Value::Array(exprs)) = map.get(key)
                    && !exprs.is_empty()
                {
                    return exprs
                        .iter()
                        .map(format_match_expression)
                        .collect::<Vec<_>>()
                        .join(" & ");
                }
            }
            if let Some(effect) = map.get("effect").and_then(Value::as_str) {
                let key = map.get("key").map(format_value).unwrap_or_default();
                return match map.get("value") {
                    Some(v) if !v.is_null() => format!("{}={}:{}", key, format_value(v), effect),
                    _ => format!("{}:{}", key, effect),
                };
            }
            value.to_string()
        }
        Value::Array(_) => value.to_string(),
    }
}

fn format_match_expression(expr: &Value) -> String {
    let key = expr.get("key").map(format_value).unwrap_or_default();
    let operator = expr.get("operator").and_then(Value::as_str).unwrap_or("");
    let values = || match expr.get("values") {
        Some(Value::Array(items)) => items.iter().map(format_value).collect::<Vec<_>>().join(","),
        Some(other) => format_value(other),
        None => String::new(),
    };
    match operator {
        "In" => format!("{} = {}", key, values()),
        "NotIn" => format!("{} != {}", key, values()),
        other => format!("{} {}", key, other.to_lowercase()),
    }
}
