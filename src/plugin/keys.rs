//! Key normalization for metadata crossing the subsystem boundary.
//!
//! Plugin authors write `info.json` by hand and the hosted content API speaks
//! snake_case, so map keys are folded to camelCase before deserialization and
//! before a snapshot is handed to the presentation layer.

use serde_json::Value;

/// Convert a `snake_case` or `kebab-case` key to `camelCase`.
///
/// Keys that are already camelCase pass through unchanged.
pub fn to_camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;

    for ch in key.chars() {
        if ch == '_' || ch == '-' {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }

    out
}

/// Recursively rewrite every object key in a JSON document to camelCase.
///
/// Arrays are walked element-wise; scalars are returned untouched.
pub fn normalize_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (to_camel_case(&key), normalize_keys(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_keys).collect()),
        other => other,
    }
}
