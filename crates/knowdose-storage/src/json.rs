//! JSON helpers shared by the repositories and the storage backends.

use serde_json::{Map, Value};

/// Removes `null` members from objects, recursively.
///
/// Array elements are kept (a `null` element is data), but objects inside
/// arrays are cleaned too.
pub fn strip_nulls(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k, strip_value(v)))
        .collect()
}

fn strip_value(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(strip_nulls(map)),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_value).collect()),
        other => other,
    }
}

/// Merges `patch` into `target`: objects present on both sides merge key by
/// key, everything else in `patch` replaces the target value.
pub fn deep_merge(target: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (key, incoming) in patch {
        match (target.get_mut(&key), incoming) {
            (Some(Value::Object(existing)), Value::Object(nested)) => deep_merge(existing, nested),
            (_, incoming) => {
                target.insert(key, incoming);
            }
        }
    }
}
