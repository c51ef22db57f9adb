//! Dotted-path extraction over a JSON tree.

use serde_json::Value;

/// Follow `path` ("a.b.c") through nested objects. Missing intermediate keys
/// or non-object intermediates resolve to `None`; this never panics.
pub fn extract<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        match current {
            Value::Object(map) => current = map.get(segment)?,
            _ => return None,
        }
    }
    Some(current)
}
