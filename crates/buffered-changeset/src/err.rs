use changeset_value::{Map, Value};

use crate::tree::{Leaf, Node, Tree};

/// Validation message(s) attached to an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    One(Value),
    Many(Vec<Value>),
}

impl Validation {
    pub fn into_vec(self) -> Vec<Value> {
        match self {
            Validation::One(message) => vec![message],
            Validation::Many(messages) => messages,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Validation::One(message) => message.clone(),
            Validation::Many(messages) => Value::Array(messages.clone()),
        }
    }

    /// Arrays read back as `Many`, anything else as `One`.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Array(messages) => Validation::Many(messages),
            other => Validation::One(other),
        }
    }
}

impl From<&str> for Validation {
    fn from(message: &str) -> Self {
        Validation::One(Value::from(message))
    }
}

impl From<String> for Validation {
    fn from(message: String) -> Self {
        Validation::One(Value::from(message))
    }
}

impl From<Vec<Value>> for Validation {
    fn from(messages: Vec<Value>) -> Self {
        Validation::Many(messages)
    }
}

impl From<Vec<&str>> for Validation {
    fn from(messages: Vec<&str>) -> Self {
        Validation::Many(messages.into_iter().map(Value::from).collect())
    }
}

/// A failed validation: the offending value and why it failed.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEntry {
    pub value: Value,
    pub validation: Validation,
}

impl ErrorEntry {
    pub fn new(value: impl Into<Value>, validation: impl Into<Validation>) -> Self {
        Self {
            value: value.into(),
            validation: validation.into(),
        }
    }
}

impl Leaf for ErrorEntry {}

pub type ErrorTree = Tree<ErrorEntry>;

/// One flattened error, as listed by `errors()`.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyError {
    pub key: String,
    pub value: Value,
    pub validation: Validation,
}

const VALUE: &str = "value";
const VALIDATION: &str = "validation";

impl Tree<ErrorEntry> {
    pub fn key_errors(&self) -> Vec<KeyError> {
        self.leaves()
            .into_iter()
            .map(|(key, entry)| KeyError {
                key,
                value: entry.value.clone(),
                validation: entry.validation.clone(),
            })
            .collect()
    }

    /// Plain form: branches as objects, entries as
    /// `{"value": ..., "validation": ...}`.
    pub fn to_plain(&self) -> Value {
        let map: Map = self
            .iter()
            .map(|(key, node)| {
                let item = match node {
                    Node::Leaf(entry) => {
                        let mut record = Map::new();
                        record.insert(VALUE.into(), entry.value.clone());
                        record.insert(VALIDATION.into(), entry.validation.to_value());
                        Value::Object(record)
                    }
                    Node::Branch(tree) => tree.to_plain(),
                };
                (key.clone(), item)
            })
            .collect();
        Value::Object(map)
    }

    /// Inverse of [`to_plain`](Self::to_plain).
    ///
    /// An object whose keys are `validation` and optionally `value` is read
    /// as an entry; other objects are branches; everything else is skipped.
    pub fn from_plain(value: &Value) -> Self {
        let mut tree = Self::new();
        let Value::Object(map) = value else {
            return tree;
        };
        for (key, item) in map {
            let Value::Object(fields) = item else {
                continue;
            };
            if is_error_record(fields) {
                let entry = ErrorEntry {
                    value: fields.get(VALUE).cloned().unwrap_or_default(),
                    validation: Validation::from_value(
                        fields.get(VALIDATION).cloned().unwrap_or_default(),
                    ),
                };
                tree.insert_entry(key.clone(), Node::Leaf(entry));
            } else {
                tree.insert_entry(key.clone(), Node::Branch(Self::from_plain(item)));
            }
        }
        tree
    }
}

fn is_error_record(fields: &Map) -> bool {
    fields.contains_key(VALIDATION) && fields.keys().all(|k| k == VALUE || k == VALIDATION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validation_from_value() {
        assert_eq!(
            Validation::from_value(Value::from(json!(["a", "b"]))),
            Validation::from(vec!["a", "b"])
        );
        assert_eq!(
            Validation::from_value(Value::from("bad")),
            Validation::from("bad")
        );
    }

    #[test]
    fn test_key_errors() {
        let mut errors = ErrorTree::new();
        errors
            .insert("person.name", ErrorEntry::new("", "required"))
            .unwrap();
        let listed = errors.key_errors();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, "person.name");
        assert_eq!(listed[0].validation, Validation::from("required"));
    }

    #[test]
    fn test_plain_roundtrip() {
        let mut errors = ErrorTree::new();
        errors.insert("name", ErrorEntry::new("", "required")).unwrap();
        errors
            .insert("address.zip", ErrorEntry::new("x", vec!["too short", "digits only"]))
            .unwrap();

        let plain = errors.to_plain();
        assert_eq!(
            plain.to_json(),
            json!({
                "name": {"value": "", "validation": "required"},
                "address": {"zip": {"value": "x", "validation": ["too short", "digits only"]}}
            })
        );
        assert_eq!(ErrorTree::from_plain(&plain), errors);
    }
}
