//! Dotted key paths (`"person.address.city"`) over nested values.

use crate::{PathError, Value};

/// Segments that are never written: they would address prototype machinery
/// in hosts that have it, and are dropped from every write path.
pub const RESERVED_KEYS: [&str; 3] = ["__proto__", "constructor", "prototype"];

/// Whether `key` may appear in a write path.
pub fn is_valid_key(key: &str) -> bool {
    !RESERVED_KEYS.contains(&key)
}

/// Splits a dotted path into its segments.
///
/// # Example
///
/// ```
/// use changeset_value::split_path;
///
/// assert_eq!(split_path("a.b.c"), vec!["a", "b", "c"]);
/// assert_eq!(split_path("a"), vec!["a"]);
/// ```
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('.').collect()
}

/// Joins segments back into a dotted path.
pub fn join_path<S: AsRef<str>>(segments: &[S]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            out.push('.');
        }
        out.push_str(segment.as_ref());
    }
    out
}

/// Reads the value at a dotted path.
///
/// Returns `None` as soon as an intermediate value is missing, `null`,
/// `undefined` or a scalar. A path without separators is a single lookup.
///
/// # Example
///
/// ```
/// use changeset_value::{get_deep, Value};
/// use serde_json::json;
///
/// let doc = Value::from(json!({"person": {"name": "Jim"}}));
/// assert_eq!(get_deep(&doc, "person.name"), Some(&Value::from("Jim")));
/// assert_eq!(get_deep(&doc, "person.age"), None);
/// assert_eq!(get_deep(&doc, "person.name.first"), None);
/// ```
pub fn get_deep<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if !path.contains('.') {
        return root.get(path);
    }
    get_deep_keys(root, &split_path(path))
}

/// [`get_deep`] over pre-split segments. An empty path yields the root.
pub fn get_deep_keys<'a, S: AsRef<str>>(root: &'a Value, keys: &[S]) -> Option<&'a Value> {
    let mut current = root;
    for key in keys {
        if current.is_nullish() {
            return None;
        }
        current = current.get(key.as_ref())?;
    }
    Some(current)
}

/// Mutable counterpart of [`get_deep`].
pub fn get_deep_mut<'a>(root: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    let mut current = root;
    for key in path.split('.') {
        current = current.get_mut(key)?;
    }
    Some(current)
}

/// Writes `value` at a dotted path, creating intermediate objects as needed.
///
/// Any segment that does not currently hold an object or array is replaced
/// by an empty object. Reserved segments are dropped before walking.
///
/// # Errors
///
/// - `PathError::NegativeIndex` when a negative index addresses an array.
/// - `PathError::InvalidIndex` when a non-numeric segment, or one above
///   [`MAX_INDEX`], addresses an array.
///
/// # Example
///
/// ```
/// use changeset_value::{set_deep, Value, PathError};
/// use serde_json::json;
///
/// let mut doc = Value::object();
/// set_deep(&mut doc, "a.b.c", Value::from(1)).unwrap();
/// assert_eq!(doc.to_json(), json!({"a": {"b": {"c": 1}}}));
///
/// let mut list = Value::Array(vec![]);
/// assert_eq!(
///     set_deep(&mut list, "-1", Value::from(1)),
///     Err(PathError::NegativeIndex { index: -1 })
/// );
/// ```
pub fn set_deep(target: &mut Value, path: &str, value: Value) -> Result<(), PathError> {
    let keys: Vec<&str> = split_path(path).into_iter().filter(|k| is_valid_key(k)).collect();
    set_deep_keys(target, &keys, value)
}

/// [`set_deep`] over pre-split segments. Reserved segments are not filtered
/// here; an empty path writes nothing.
pub fn set_deep_keys<S: AsRef<str>>(
    target: &mut Value,
    keys: &[S],
    value: Value,
) -> Result<(), PathError> {
    let Some((last, parents)) = keys.split_last() else {
        return Ok(());
    };
    let mut current = target;
    for key in parents {
        let slot = slot_mut(current, key.as_ref())?;
        if !slot.is_container() {
            *slot = Value::object();
        }
        current = slot;
    }
    *slot_mut(current, last.as_ref())? = value;
    Ok(())
}

/// Removes the value at a dotted path and returns it.
///
/// Array elements are cleared to `Undefined` rather than shifted, so sibling
/// indices keep their meaning.
pub fn remove_deep(root: &mut Value, path: &str) -> Option<Value> {
    let keys = split_path(path);
    let (last, parents) = keys.split_last()?;
    let mut current = root;
    for key in parents {
        current = current.get_mut(key)?;
    }
    match current {
        Value::Object(map) => map.shift_remove(*last),
        Value::Array(arr) => {
            let index: usize = last.parse().ok()?;
            arr.get_mut(index).map(std::mem::take)
        }
        _ => None,
    }
}

/// Largest array index a path may address.
///
/// Arrays are stored densely, so writing index `n` allocates `n + 1` slots.
pub const MAX_INDEX: usize = (1 << 20) - 1;

/// Parses an array index segment.
///
/// Indices above [`MAX_INDEX`] are `InvalidIndex`.
pub fn parse_index(key: &str) -> Result<usize, PathError> {
    match key.parse::<i64>() {
        Ok(index) if index < 0 => Err(PathError::NegativeIndex { index }),
        Ok(index) => usize::try_from(index)
            .ok()
            .filter(|index| *index <= MAX_INDEX)
            .ok_or_else(|| PathError::InvalidIndex(key.to_string())),
        Err(_) => Err(PathError::InvalidIndex(key.to_string())),
    }
}

/// Returns the slot for `key` inside `container`, creating it if absent.
fn slot_mut<'a>(container: &'a mut Value, key: &str) -> Result<&'a mut Value, PathError> {
    if !container.is_container() {
        *container = Value::object();
    }
    match container {
        Value::Array(arr) => {
            let index = parse_index(key)?;
            if index >= arr.len() {
                arr.resize(index + 1, Value::Undefined);
            }
            Ok(&mut arr[index])
        }
        Value::Object(map) => Ok(map.entry(key.to_string()).or_insert(Value::Undefined)),
        _ => Err(PathError::InvalidIndex(key.to_string())),
    }
}
