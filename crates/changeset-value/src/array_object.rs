//! Conversions between sequences and index-keyed objects.
//!
//! Buffered edits to array elements are stored under decimal keys
//! (`{"0": ..., "3": ...}`); merging them into an array goes through these.

use crate::{parse_index, Map, Value};

/// Whether every key of `map` is an array index (see [`parse_index`]).
/// Vacuously true when empty.
pub fn is_array_object(map: &Map) -> bool {
    map.keys().all(|key| parse_index(key).is_ok())
}

/// `[a, b]` → `{"0": a, "1": b}`.
pub fn array_to_object(array: &[Value]) -> Map {
    array
        .iter()
        .enumerate()
        .map(|(index, item)| (index.to_string(), item.clone()))
        .collect()
}

/// `{"0": a, "2": c}` → `[a, undefined, c]`.
///
/// Keys that are not array indices have no slot in a sequence and are
/// dropped.
pub fn object_to_array(map: Map) -> Vec<Value> {
    let mut result = Vec::new();
    for (key, value) in map {
        let Ok(index) = parse_index(&key) else {
            continue;
        };
        if index >= result.len() {
            result.resize(index + 1, Value::Undefined);
        }
        result[index] = value;
    }
    result
}
