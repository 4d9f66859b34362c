// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Named value transforms for field pipelines
//!
//! Transforms are resolved by name when the catalog is loaded; an unknown
//! name is a configuration error for the table that uses it. Two names are
//! reserved for directives that reshape the whole list of matches instead of
//! mapping each value: `unroll` and `unrange`.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::net::{AddrParseError, Ipv4Addr};
use std::str::FromStr;
use thiserror::Error;

use super::field::format_value;

/// Largest range or network we are willing to enumerate
const MAX_RANGE_ADDRESSES: u64 = 1 << 16;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("unknown transform '{0}' (known: {known})", known = TRANSFORM_NAMES.join(", "))]
    Unknown(String),
    #[error("cannot parse range descriptor '{text}': {source}")]
    Descriptor {
        text: String,
        source: serde_yaml::Error,
    },
    #[error("invalid IPv4 address '{text}': {source}")]
    Address {
        text: String,
        source: AddrParseError,
    },
    #[error("range {start}-{stop} is too large to expand")]
    RangeTooLarge { start: String, stop: String },
    #[error("invalid CIDR '{0}': missing prefix length")]
    MissingPrefix(String),
    #[error("invalid CIDR '{0}': bad prefix length")]
    BadPrefix(String),
    #[error("network {0} is too large to expand")]
    NetworkTooLarge(String),
}

/// One step of a transform chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Flatten a list holding exactly one list into that list
    Unroll,
    /// Expand a `{start, stop}` or `{cidr}` descriptor into addresses
    Unrange,
    Join,
    Lower,
    Upper,
    Trim,
    Basename,
    ImageTag,
    Json,
    Keys,
    Length,
    Age,
}

/// Every transform name the registry knows about
pub const TRANSFORM_NAMES: &[&str] = &[
    "unroll", "unrange", "join", "lower", "upper", "trim", "basename", "image-tag", "json",
    "keys", "length", "age",
];

impl FromStr for Transform {
    type Err = TransformError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Ok(match name.trim() {
            "unroll" => Transform::Unroll,
            "unrange" => Transform::Unrange,
            "join" => Transform::Join,
            "lower" => Transform::Lower,
            "upper" => Transform::Upper,
            "trim" => Transform::Trim,
            "basename" => Transform::Basename,
            "image-tag" => Transform::ImageTag,
            "json" => Transform::Json,
            "keys" => Transform::Keys,
            "length" => Transform::Length,
            "age" => Transform::Age,
            other => return Err(TransformError::Unknown(other.to_string())),
        })
    }
}

impl Transform {
    /// Apply this step to the current list of values
    pub fn apply(self, values: Vec<Value>) -> Result<Vec<Value>, TransformError> {
        match self {
            Transform::Unroll => Ok(unroll(values)),
            Transform::Unrange => unrange(values),
            elementwise => Ok(values.iter().map(|v| elementwise.map_value(v)).collect()),
        }
    }

    fn map_value(self, value: &Value) -> Value {
        match self {
            Transform::Join => match value {
                Value::Array(items) => Value::String(
                    items.iter().map(format_value).collect::<Vec<_>>().join(","),
                ),
                other => other.clone(),
            },
            Transform::Lower => map_text(value, |s| s.to_lowercase()),
            Transform::Upper => map_text(value, |s| s.to_uppercase()),
            Transform::Trim => map_text(value, |s| s.trim().to_string()),
            Transform::Basename => {
                map_text(value, |s| s.rsplit('/').next().unwrap_or(s).to_string())
            }
            Transform::ImageTag => map_text(value, image_tag),
            Transform::Json => Value::String(value.to_string()),
            Transform::Keys => match value {
                Value::Object(map) => {
                    Value::String(map.keys().cloned().collect::<Vec<_>>().join(","))
                }
                other => other.clone(),
            },
            Transform::Length => match value {
                Value::Array(items) => Value::from(items.len()),
                Value::Object(map) => Value::from(map.len()),
                Value::String(s) => Value::from(s.chars().count()),
                _ => Value::from(0),
            },
            Transform::Age => match value.as_str().map(DateTime::parse_from_rfc3339) {
                Some(Ok(ts)) => Value::String(format_age(Utc::now() - ts.with_timezone(&Utc))),
                _ => value.clone(),
            },
            Transform::Unroll | Transform::Unrange => value.clone(),
        }
    }
}

fn map_text(value: &Value, f: impl Fn(&str) -> String) -> Value {
    match value {
        Value::String(s) => Value::String(f(s)),
        Value::Null => Value::Null,
        other => Value::String(f(&format_value(other))),
    }
}

/// Tag part of an image reference, ignoring a registry port
fn image_tag(image: &str) -> String {
    let image = image.split('@').next().unwrap_or(image);
    let last = image.rsplit('/').next().unwrap_or(image);
    match last.rsplit_once(':') {
        Some((_, tag)) if !tag.is_empty() => tag.to_string(),
        _ => "latest".to_string(),
    }
}

/// Compact age such as `3d4h`, `12m`, `40s`
fn format_age(age: chrono::Duration) -> String {
    let secs = age.num_seconds().max(0);
    let (days, hours, minutes) = (secs / 86_400, (secs % 86_400) / 3600, (secs % 3600) / 60);
    if days > 0 {
        if hours > 0 {
            format!("{}d{}h", days, hours)
        } else {
            format!("{}d", days)
        }
    } else if hours > 0 {
        format!("{}h{}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        format!("{}s", secs)
    }
}

/// `[[a, b]]` becomes `[a, b]`; anything else is left alone
fn unroll(values: Vec<Value>) -> Vec<Value> {
    match <[Value; 1]>::try_from(values) {
        Ok([Value::Array(inner)]) => inner,
        Ok([single]) => vec![single],
        Err(values) => values,
    }
}

/// Expand a range or network descriptor into the addresses it covers.
///
/// The descriptor is the single value in the list, either as a mapping or as
/// a flow-style string (`{start: 10.0.0.1, stop: 10.0.0.9}`,
/// `{cidr: 10.0.0.0/29}`). Values that are not mappings pass through.
fn unrange(values: Vec<Value>) -> Result<Vec<Value>, TransformError> {
    let descriptor = match <[Value; 1]>::try_from(values) {
        Ok([single]) => single,
        Err(values) => return Ok(values),
    };

    let descriptor = match descriptor {
        Value::String(text) => match serde_yaml::from_str::<Value>(&text) {
            Ok(parsed) => parsed,
            Err(source) => return Err(TransformError::Descriptor { text, source }),
        },
        other => other,
    };

    let Value::Object(map) = &descriptor else {
        return Ok(vec![descriptor]);
    };

    let addresses = if let (Some(start), Some(stop)) = (map.get("start"), map.get("stop")) {
        expand_range(&format_value(start), &format_value(stop))?
    } else if let Some(cidr) = map.get("cidr") {
        expand_cidr(&format_value(cidr))?
    } else {
        return Ok(vec![descriptor]);
    };

    Ok(addresses
        .into_iter()
        .map(|addr| Value::String(addr.to_string()))
        .collect())
}

fn parse_addr(text: &str) -> Result<Ipv4Addr, TransformError> {
    text.trim()
        .parse::<Ipv4Addr>()
        .map_err(|source| TransformError::Address {
            text: text.to_string(),
            source,
        })
}

/// Every address from `start` to `stop`, inclusive on both ends
pub fn expand_range(start: &str, stop: &str) -> Result<Vec<Ipv4Addr>, TransformError> {
    let (first, last) = (u32::from(parse_addr(start)?), u32::from(parse_addr(stop)?));
    if first > last {
        return Ok(vec![]);
    }
    if u64::from(last - first) >= MAX_RANGE_ADDRESSES {
        return Err(TransformError::RangeTooLarge {
            start: start.to_string(),
            stop: stop.to_string(),
        });
    }
    Ok((first..=last).map(Ipv4Addr::from).collect())
}

/// Host addresses of a network; network and broadcast addresses are left
/// out except for /31 and /32. Host bits in the address are masked off.
pub fn expand_cidr(cidr: &str) -> Result<Vec<Ipv4Addr>, TransformError> {
    let (addr, prefix) = cidr
        .trim()
        .split_once('/')
        .ok_or_else(|| TransformError::MissingPrefix(cidr.to_string()))?;
    let prefix: u32 = prefix
        .parse()
        .ok()
        .filter(|p| *p <= 32)
        .ok_or_else(|| TransformError::BadPrefix(cidr.to_string()))?;

    let size = 1u64 << (32 - prefix);
    if size > MAX_RANGE_ADDRESSES {
        return Err(TransformError::NetworkTooLarge(cidr.to_string()));
    }

    let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
    let network = u64::from(u32::from(parse_addr(addr)?) & mask);
    let (first, last) = if prefix >= 31 {
        (network, network + size - 1)
    } else {
        (network + 1, network + size - 2)
    };

    Ok((first..=last).map(|a| Ipv4Addr::from(a as u32)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_known_names_resolve() {
        for name in TRANSFORM_NAMES {
            assert!(name.parse::<Transform>().is_ok(), "{} should resolve", name);
        }
    }

    #[test]
    fn test_unknown_name_rejected() {
        let err = "lambda x: x".parse::<Transform>().unwrap_err();
        assert!(matches!(err, TransformError::Unknown(ref name) if name == "lambda x: x"));
        assert!(err.to_string().contains("known: unroll, unrange"));
    }

    #[test]
    fn test_unroll_singleton_nesting() {
        let out = Transform::Unroll
            .apply(vec![json!(["x", "y"])])
            .unwrap();
        assert_eq!(out, vec![json!("x"), json!("y")]);
    }

    #[test]
    fn test_unroll_leaves_other_shapes() {
        let values = vec![json!("a"), json!("b")];
        assert_eq!(Transform::Unroll.apply(values.clone()).unwrap(), values);
        assert_eq!(
            Transform::Unroll.apply(vec![json!("a")]).unwrap(),
            vec![json!("a")]
        );
        assert!(Transform::Unroll.apply(vec![json!([])]).unwrap().is_empty());
    }

    #[test]
    fn test_unrange_start_stop_inclusive() {
        let out = Transform::Unrange
            .apply(vec![json!({"start": "10.0.0.1", "stop": "10.0.0.3"})])
            .unwrap();
        assert_eq!(out, vec![json!("10.0.0.1"), json!("10.0.0.2"), json!("10.0.0.3")]);
    }

    #[test]
    fn test_unrange_from_flow_string() {
        let out = Transform::Unrange
            .apply(vec![json!("{start: 10.0.0.254, stop: 10.0.1.1}")])
            .unwrap();
        assert_eq!(
            out,
            vec![
                json!("10.0.0.254"),
                json!("10.0.0.255"),
                json!("10.0.1.0"),
                json!("10.0.1.1")
            ]
        );
    }

    #[test]
    fn test_unrange_cidr_hosts() {
        let out = Transform::Unrange
            .apply(vec![json!({"cidr": "192.168.1.0/30"})])
            .unwrap();
        assert_eq!(out, vec![json!("192.168.1.1"), json!("192.168.1.2")]);

        let single = expand_cidr("10.1.2.3/32").unwrap();
        assert_eq!(single, vec![Ipv4Addr::new(10, 1, 2, 3)]);

        let pair = expand_cidr("10.1.2.4/31").unwrap();
        assert_eq!(pair.len(), 2);
    }

    #[test]
    fn test_unrange_masks_host_bits() {
        let out = expand_cidr("192.168.1.7/30").unwrap();
        assert_eq!(out, vec![Ipv4Addr::new(192, 168, 1, 5), Ipv4Addr::new(192, 168, 1, 6)]);
    }

    #[test]
    fn test_unrange_passes_through_non_descriptors() {
        assert_eq!(
            Transform::Unrange.apply(vec![json!("10.0.0.1")]).unwrap(),
            vec![json!("10.0.0.1")]
        );
        let many = vec![json!("a"), json!("b")];
        assert_eq!(Transform::Unrange.apply(many.clone()).unwrap(), many);
    }

    #[test]
    fn test_unrange_errors() {
        assert!(Transform::Unrange
            .apply(vec![json!({"start": "10.0.0.1", "stop": "nope"})])
            .is_err());
        assert!(Transform::Unrange.apply(vec![json!("{start: [")]).is_err());
        assert!(matches!(expand_cidr("10.0.0.0"), Err(TransformError::MissingPrefix(_))));
        assert!(matches!(expand_cidr("10.0.0.0/33"), Err(TransformError::BadPrefix(_))));
        assert!(matches!(expand_cidr("10.0.0.0/8"), Err(TransformError::NetworkTooLarge(_))));
    }

    #[test]
    fn test_reversed_range_is_empty() {
        assert!(expand_range("10.0.0.5", "10.0.0.1").unwrap().is_empty());
    }

    #[test]
    fn test_elementwise_transforms() {
        let apply = |t: Transform, v: Value| t.apply(vec![v]).unwrap().remove(0);

        assert_eq!(apply(Transform::Join, json!(["a", "b", 3])), json!("a,b,3"));
        assert_eq!(apply(Transform::Lower, json!("Ready")), json!("ready"));
        assert_eq!(apply(Transform::Upper, json!("ready")), json!("READY"));
        assert_eq!(apply(Transform::Trim, json!("  x ")), json!("x"));
        assert_eq!(
            apply(Transform::Basename, json!("kubernetes.io/hostname")),
            json!("hostname")
        );
        assert_eq!(apply(Transform::Keys, json!({"a": 2, "b": 1})), json!("a,b"));
        assert_eq!(apply(Transform::Length, json!([1, 2, 3])), json!(3));
        assert_eq!(apply(Transform::Json, json!({"a": 1})), json!("{\"a\":1}"));
    }

    #[test]
    fn test_image_tag() {
        assert_eq!(image_tag("nginx:1.25"), "1.25");
        assert_eq!(image_tag("nginx"), "latest");
        assert_eq!(image_tag("registry:5000/team/app"), "latest");
        assert_eq!(image_tag("registry:5000/team/app:v2"), "v2");
        assert_eq!(image_tag("app:v3@sha256:abcd"), "v3");
    }

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(chrono::Duration::seconds(42)), "42s");
        assert_eq!(format_age(chrono::Duration::minutes(5)), "5m");
        assert_eq!(format_age(chrono::Duration::minutes(125)), "2h5m");
        assert_eq!(format_age(chrono::Duration::hours(50)), "2d2h");
        assert_eq!(format_age(chrono::Duration::days(3)), "3d");
        assert_eq!(format_age(chrono::Duration::seconds(-10)), "0s");
    }

    #[test]
    fn test_age_leaves_non_timestamps() {
        let out = Transform::Age.apply(vec![json!("yesterday")]).unwrap();
        assert_eq!(out, vec![json!("yesterday")]);
    }
}
