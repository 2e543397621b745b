//! Canonical cache keys derived from a namespace and a filter record.
//!
//! Filters go through serde into a JSON tree, get normalized, and are written
//! back out as compact JSON with object keys sorted at every level. The
//! dashboard treats "no filter" and `"All"` identically, so `null`, an absent
//! field, the string `"All"`, and an empty list all collapse to the same key:
//!
//! ```text
//! summary-metrics:{"brand":"Amul","platform":"Zepto"}
//! ```
//!
//! Array element order is kept as given.

use crate::cache::error::KeyEncodingError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// Filter value that means "do not filter on this field".
pub const ALL_SENTINEL: &str = "All";

/// Separates the namespace from the serialized filters.
const NAMESPACE_DELIMITER: char = ':';

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build the canonical key for `filters` under `namespace`.
    ///
    /// `filters` must serialize to a map (a struct, `HashMap`, `json!({..})`)
    /// or to `null`/unit, which is treated as "no filters".
    pub fn new<F>(namespace: &str, filters: &F) -> Result<Self, KeyEncodingError>
    where
        F: Serialize + ?Sized,
    {
        if namespace.trim().is_empty() || namespace.contains(NAMESPACE_DELIMITER) {
            return Err(KeyEncodingError::InvalidNamespace(namespace.to_owned()));
        }

        let tree = serde_json::to_value(filters)
            .map_err(|e| KeyEncodingError::Unserializable(e.to_string()))?;
        let fields = match tree {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => return Err(KeyEncodingError::NotAnObject(kind(&other))),
        };

        let mut key = String::with_capacity(namespace.len() + 64);
        key.push_str(namespace);
        key.push(NAMESPACE_DELIMITER);
        write_object(&mut key, &fields);
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The namespace portion of the key.
    pub fn namespace(&self) -> &str {
        self.0
            .split_once(NAMESPACE_DELIMITER)
            .map_or(self.0.as_str(), |(namespace, _)| namespace)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// True when the value carries no filtering information at all.
fn is_unfiltered(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s == ALL_SENTINEL,
        Value::Array(items) => items.iter().all(is_unfiltered),
        Value::Object(map) => map.values().all(is_unfiltered),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn write_object(out: &mut String, map: &Map<String, Value>) {
    let mut fields: Vec<(&String, &Value)> = map
        .iter()
        .filter(|(_, value)| !is_unfiltered(value))
        .collect();
    fields.sort_unstable_by(|a, b| a.0.cmp(b.0));

    out.push('{');
    for (i, (name, value)) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_string(out, name);
        out.push(':');
        write_value(out, value);
    }
    out.push('}');
}

fn write_value(out: &mut String, value: &Value) {
    // Only reachable for array elements; object fields were filtered out.
    if is_unfiltered(value) {
        out.push_str("null");
        return;
    }
    match value {
        Value::Object(map) => write_object(out, map),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::String(s) => write_string(out, s),
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_string(out: &mut String, s: &str) {
    // serde_json's Display for a string value is its escaped JSON literal.
    out.push_str(&Value::from(s).to_string());
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
