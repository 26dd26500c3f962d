//! Applying a change tree onto plain content.

use changeset_value::{
    array_to_object, is_valid_key, object_to_array, parse_index, set_deep, Map, Value,
};

use crate::change::{normalize_node, ChangeNode, ChangeTree};
use crate::tree::Node;

/// Merges `source` onto `target` and returns the result.
///
/// - An array target merges index-keyed sources element-wise; any other
///   source, including one with indices past
///   [`MAX_INDEX`](changeset_value::MAX_INDEX), replaces it.
/// - A `null`, `undefined` or scalar target is replaced by the source.
/// - For objects, a marker overwrites the key, a branch over an existing
///   object or array recurses, and a branch over anything else is written
///   in plain form. Keys that would address prototype machinery are never
///   written directly; the markers below them are re-applied through
///   [`set_deep`], which drops the reserved segments.
///
/// The result never contains markers.
pub fn merge_deep(target: Value, source: &ChangeTree) -> Value {
    match target {
        Value::Array(items) => {
            if source.keys().all(|key| parse_index(key).is_ok()) {
                let mut merged = Value::Object(array_to_object(&items));
                merge_into(&mut merged, source);
                match merged {
                    Value::Object(map) => Value::Array(object_to_array(map)),
                    other => other,
                }
            } else {
                source.normalize()
            }
        }
        Value::Object(map) => {
            let mut merged = Value::Object(map);
            merge_into(&mut merged, source);
            merged
        }
        _ => source.normalize(),
    }
}

/// Whether writing `key` onto `target` would address inherited state
/// rather than an own property.
pub fn property_is_unsafe(target: &Map, key: &str) -> bool {
    !is_valid_key(key) && !target.contains_key(key)
}

fn merge_into(target: &mut Value, source: &ChangeTree) {
    let mut recovered = Vec::new();
    if let Value::Object(map) = target {
        for (key, node) in source.iter() {
            if property_is_unsafe(map, key) {
                collect_marker_paths(node, key.clone(), &mut recovered);
                continue;
            }
            match node {
                Node::Leaf(change) => {
                    map.insert(key.clone(), change.value().clone());
                }
                Node::Branch(branch) => match map.get_mut(key.as_str()) {
                    Some(existing) if existing.is_container() => {
                        let current = std::mem::take(existing);
                        *existing = merge_deep(current, branch);
                    }
                    _ => {
                        map.insert(key.clone(), normalize_node(node));
                    }
                },
            }
        }
    }
    for (path, value) in recovered {
        if let Err(error) = set_deep(target, &path, value) {
            tracing::warn!(%path, %error, "skipped unwritable path during merge");
        }
    }
}

fn collect_marker_paths(node: &ChangeNode, prefix: String, out: &mut Vec<(String, Value)>) {
    match node {
        Node::Leaf(change) => out.push((prefix, change.value().clone())),
        Node::Branch(tree) => {
            for (key, child) in tree.iter() {
                collect_marker_paths(child, format!("{prefix}.{key}"), out);
            }
        }
    }
}
