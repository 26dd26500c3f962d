//! Dynamic values and dotted-path utilities.
//!
//! This crate holds the marker-free half of buffered editing: the [`Value`]
//! model edited by a changeset and the path helpers that read and write into
//! it.
//!
//! # Example
//!
//! ```
//! use changeset_value::{get_deep, set_deep, Value};
//! use serde_json::json;
//!
//! let mut doc = Value::from(json!({"person": {"name": "Jim"}}));
//! set_deep(&mut doc, "person.age", Value::from(30)).unwrap();
//!
//! assert_eq!(get_deep(&doc, "person.age"), Some(&Value::from(30)));
//! assert_eq!(doc.to_json(), json!({"person": {"name": "Jim", "age": 30}}));
//! ```

use thiserror::Error;

pub mod array_object;
pub mod equal;
pub mod path;
pub mod value;

pub use array_object::{array_to_object, is_array_object, object_to_array};
pub use equal::is_equal;
pub use path::{
    get_deep, get_deep_keys, get_deep_mut, is_valid_key, join_path, parse_index, remove_deep,
    set_deep, set_deep_keys, split_path, MAX_INDEX, RESERVED_KEYS,
};
pub use value::{Map, Value};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    /// Arrays do not serialize values at negative indices.
    #[error("NEGATIVE_INDEX: {index}")]
    NegativeIndex { index: i64 },
    #[error("INVALID_INDEX: {0}")]
    InvalidIndex(String),
}
