//! Conversion between JSON values and `yrs::Any`

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Number, Value};
use yrs::{Any, Out};

/// Convert a JSON value for storage in the replicated document
///
/// Integers that fit `i64` are stored exactly. Larger unsigned integers are
/// stored as `f64`, the number type Yjs peers share, and read back as that
/// float.
pub fn json_to_any(value: &Value) -> Any {
    match value {
        Value::Null => Any::Null,
        Value::Bool(b) => Any::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Any::BigInt(i),
            None => Any::Number(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => Any::String(Arc::from(s.as_str())),
        Value::Array(items) => Any::Array(items.iter().map(json_to_any).collect()),
        Value::Object(map) => object_to_any(map),
    }
}

pub fn object_to_any(map: &Map<String, Value>) -> Any {
    let entries: HashMap<String, Any> = map
        .iter()
        .map(|(key, value)| (key.clone(), json_to_any(value)))
        .collect();
    Any::Map(Arc::new(entries))
}

pub fn any_to_json(any: &Any) -> Value {
    match any {
        Any::Null | Any::Undefined => Value::Null,
        Any::Bool(b) => Value::Bool(*b),
        Any::Number(n) => Number::from_f64(*n).map_or(Value::Null, Value::Number),
        Any::BigInt(i) => Value::from(*i),
        Any::String(s) => Value::String(s.to_string()),
        Any::Buffer(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
        Any::Array(items) => Value::Array(items.iter().map(any_to_json).collect()),
        Any::Map(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), any_to_json(value)))
                .collect(),
        ),
    }
}

/// JSON object view of a map value; anything else becomes empty
pub fn any_to_object(any: &Any) -> Map<String, Value> {
    match any_to_json(any) {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Primitive value stored in a map entry, if any
pub fn out_any(out: Option<Out>) -> Option<Any> {
    match out {
        Some(Out::Any(any)) => Some(any),
        _ => None,
    }
}

pub fn any_str(any: &Any) -> Option<&str> {
    match any {
        Any::String(s) => Some(&**s),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
pub fn any_i64(any: &Any) -> Option<i64> {
    match any {
        Any::BigInt(i) => Some(*i),
        Any::Number(n) if n.is_finite() => Some(*n as i64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_values_roundtrip() {
        let value = json!({
            "content": "Hello",
            "level": 2,
            "ratio": 0.5,
            "negative": -7,
            "flags": [true, false, null],
            "nested": { "url": "https://example.com", "ids": [1, 2, 3] }
        });
        assert_eq!(any_to_json(&json_to_any(&value)), value);
    }

    #[test]
    fn integers_are_bigints() {
        assert_eq!(json_to_any(&json!(42)), Any::BigInt(42));
        assert_eq!(json_to_any(&json!(1.5)), Any::Number(1.5));
    }

    #[test]
    fn integers_beyond_i64_become_floats() {
        let stored = json_to_any(&json!(u64::MAX));
        assert_eq!(stored, Any::Number(18_446_744_073_709_551_616.0));
        assert_eq!(any_to_json(&stored), json!(18_446_744_073_709_551_616.0));
        assert_eq!(json_to_any(&json!(i64::MAX)), Any::BigInt(i64::MAX));
    }

    #[test]
    fn non_object_is_empty_attributes() {
        assert!(any_to_object(&Any::Bool(true)).is_empty());
    }

    #[test]
    fn numeric_accessors() {
        assert_eq!(any_i64(&Any::BigInt(5)), Some(5));
        assert_eq!(any_i64(&Any::Number(5.0)), Some(5));
        assert_eq!(any_i64(&Any::Number(f64::NAN)), None);
        assert_eq!(any_str(&Any::String("x".into())), Some("x"));
    }
}
