use serde_json::{Map, Value};

/// Open key-value map used for checker configuration, issue details, result
/// summaries and context metadata. Keys are kept sorted so that serialized
/// output is stable across runs.
pub type ValueMap = Map<String, Value>;

/// Appends `value` under `key` without ever discarding what is already there.
///
/// A missing key is inserted, an existing array grows by one element, and an
/// existing scalar is promoted to a two-element array.
pub fn append_value(map: &mut ValueMap, key: &str, value: Value) {
    match map.get_mut(key) {
        None => {
            map.insert(key.to_string(), value);
        }
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let previous = existing.take();
            *existing = Value::Array(vec![previous, value]);
        }
    }
}
