use changeset_value::{get_deep_keys, set_deep_keys, split_path, Map, PathError, Value};

use crate::tree::{Leaf, Node, Tree};

/// A buffered value: "this path was explicitly assigned this value".
///
/// Wrapping distinguishes an assignment of a plain object from a branch of
/// nested assignments: a marker replaces whatever lies below it.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    value: Value,
}

impl Change {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

impl Leaf for Change {
    /// Writing below a marker that wraps an object or array keeps the
    /// marker and edits its wrapped value, so the other fields survive.
    fn specialize(&self, rest: &[&str], leaf: &Self) -> Result<Option<Self>, PathError> {
        if !self.value.is_container() {
            return Ok(None);
        }
        let mut value = self.value.clone();
        set_deep_keys(&mut value, rest, leaf.value.clone())?;
        Ok(Some(Change::new(value)))
    }
}

pub type ChangeTree = Tree<Change>;
pub type ChangeNode = Node<Change>;

/// One flattened change, as listed by `changes()`.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyChange {
    pub key: String,
    pub value: Value,
}

impl Tree<Change> {
    /// The tree with every marker replaced by its wrapped value.
    pub fn normalize(&self) -> Value {
        let map: Map = self
            .iter()
            .map(|(key, node)| (key.clone(), normalize_node(node)))
            .collect();
        Value::Object(map)
    }

    /// Reads a plain (marker-free) nested object back into a change tree.
    ///
    /// Objects become branches; everything else, arrays and dates included,
    /// becomes a marker. A non-object yields an empty tree.
    pub fn from_plain(value: &Value) -> Self {
        let mut tree = Self::new();
        if let Value::Object(map) = value {
            for (key, item) in map {
                let node = match item {
                    Value::Object(_) => Node::Branch(Self::from_plain(item)),
                    other => Node::Leaf(Change::new(other.clone())),
                };
                tree.insert_entry(key.clone(), node);
            }
        }
        tree
    }

    /// Plain value at a dotted path, reading through markers.
    ///
    /// A branch yields its plain form; a path below a marker continues
    /// inside the marker's wrapped value.
    pub fn get_sub_object(&self, path: &str) -> Option<Value> {
        let keys = split_path(path);
        let mut tree = self;
        for (i, key) in keys.iter().enumerate() {
            match tree.entry(key)? {
                Node::Branch(branch) if i + 1 == keys.len() => return Some(branch.normalize()),
                Node::Branch(branch) => tree = branch,
                Node::Leaf(change) => {
                    return get_deep_keys(change.value(), &keys[i + 1..]).cloned();
                }
            }
        }
        None
    }

    /// Whether a marker sits strictly above `path`.
    pub fn is_shadowed(&self, path: &str) -> bool {
        let keys = split_path(path);
        let mut tree = self;
        for key in &keys[..keys.len().saturating_sub(1)] {
            match tree.entry(key) {
                Some(Node::Branch(branch)) => tree = branch,
                Some(Node::Leaf(_)) => return true,
                None => return false,
            }
        }
        false
    }

    /// Every marker as a dotted key with its value.
    pub fn key_changes(&self) -> Vec<KeyChange> {
        self.leaves()
            .into_iter()
            .map(|(key, change)| KeyChange {
                key,
                value: change.value().clone(),
            })
            .collect()
    }
}

pub fn normalize_node(node: &ChangeNode) -> Value {
    match node {
        Node::Leaf(change) => change.value().clone(),
        Node::Branch(tree) => tree.normalize(),
    }
}
