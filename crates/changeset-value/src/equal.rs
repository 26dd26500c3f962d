use crate::Value;

/// Equality used to decide whether a `set` is a real change.
///
/// Dates compare by instant and numbers by numeric value (`1 == 1.0`);
/// everything else compares structurally.
///
/// # Examples
///
/// ```
/// use changeset_value::{is_equal, Value};
/// use serde_json::json;
///
/// assert!(is_equal(&Value::from(1), &Value::from(1.0)));
/// assert!(is_equal(&Value::from(json!({"a": [1]})), &Value::from(json!({"a": [1]}))));
/// assert!(!is_equal(&Value::Null, &Value::Undefined));
/// ```
pub fn is_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Date(x), Value::Date(y)) => x.timestamp_millis() == y.timestamp_millis(),
        (Value::Number(x), Value::Number(y)) => {
            x == y || matches!((x.as_f64(), y.as_f64()), (Some(p), Some(q)) if p == q)
        }
        _ => a == b,
    }
}
