//! Lazy read/write views over content with buffered changes layered on top.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use changeset_value::{get_deep, get_deep_keys, join_path, split_path, Map, PathError, Value};

use crate::change::{Change, ChangeTree};
use crate::merge::merge_deep;
use crate::tree::Node;

// ── Path resolution ────────────────────────────────────────────────────────

/// Where a path lands inside the change tree.
enum Hit<'t> {
    /// Exactly on a marker.
    Marker(&'t Value),
    /// Below a marker, inside its wrapped value.
    Inside {
        value: Option<&'t Value>,
        /// Whether the final key is literally present in the wrapped value.
        present: bool,
    },
    /// On a branch of nested changes.
    Branch(&'t ChangeTree),
    Miss,
}

fn locate<'t, S: AsRef<str>>(changes: &'t ChangeTree, path: &[S]) -> Hit<'t> {
    let mut tree = changes;
    for (i, key) in path.iter().enumerate() {
        let is_last = i + 1 == path.len();
        match tree.entry(key.as_ref()) {
            None => return Hit::Miss,
            Some(Node::Branch(branch)) if is_last => return Hit::Branch(branch),
            Some(Node::Branch(branch)) => tree = branch,
            Some(Node::Leaf(change)) if is_last => return Hit::Marker(change.value()),
            Some(Node::Leaf(change)) => {
                let rest = &path[i + 1..];
                let value = get_deep_keys(change.value(), rest);
                let present = match rest.split_last() {
                    Some((last, parents)) => get_deep_keys(change.value(), parents)
                        .and_then(|parent| parent.get(last.as_ref()))
                        .is_some(),
                    None => false,
                };
                return Hit::Inside { value, present };
            }
        }
    }
    Hit::Miss
}

pub(crate) enum Resolution {
    Value(Value),
    /// The path holds an object to be wrapped in a [`TreeNode`].
    Node,
}

/// Reads `path` the way both top-level `get` and node `get` do.
pub(crate) fn resolve<S: AsRef<str>>(
    changes: &ChangeTree,
    content: &Value,
    path: &[S],
) -> Resolution {
    match locate(changes, path) {
        Hit::Marker(value) => return Resolution::Value(value.clone()),
        Hit::Inside {
            value: Some(value), ..
        } if value.is_defined() => {
            return if value.is_object() {
                Resolution::Node
            } else {
                Resolution::Value(value.clone())
            };
        }
        // Cleared by an enclosing marker that lacks the key.
        Hit::Inside { present: false, .. } => return Resolution::Value(Value::Undefined),
        Hit::Inside { present: true, .. } => {}
        Hit::Branch(branch) => {
            return match get_deep_keys(content, path) {
                Some(Value::Array(items)) => {
                    Resolution::Value(merge_deep(Value::Array(items.clone()), branch))
                }
                _ => Resolution::Node,
            };
        }
        Hit::Miss => {}
    }
    match get_deep_keys(content, path) {
        Some(Value::Object(_)) => Resolution::Node,
        Some(value) => Resolution::Value(value.clone()),
        None => Resolution::Value(Value::Undefined),
    }
}

/// Content at `path` with the changes below it applied.
fn unwrap_at(changes: &ChangeTree, content: &Value, path: &[String]) -> Value {
    let below = get_deep_keys(content, path).cloned().unwrap_or_default();
    let patch = match locate(changes, path) {
        Hit::Marker(value) => return value.clone(),
        Hit::Inside {
            value: Some(value), ..
        } if value.is_defined() => return value.clone(),
        Hit::Inside { present: true, .. } => return below,
        Hit::Inside { .. } => return Value::Undefined,
        Hit::Branch(branch) => branch,
        Hit::Miss => return below,
    };
    if below.is_container() || !patch.is_empty() {
        merge_deep(below, patch)
    } else {
        below
    }
}

// ── Accessor nodes ─────────────────────────────────────────────────────────

/// Result of a `get`: a plain value, or a node for an object.
#[derive(Debug, Clone)]
pub enum Lookup<'a> {
    Value(Value),
    Node(Rc<TreeNode<'a>>),
}

impl<'a> Lookup<'a> {
    /// The plain value, unwrapping nodes.
    pub fn into_value(self) -> Value {
        match self {
            Lookup::Value(value) => value,
            Lookup::Node(node) => node.unwrap(),
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Lookup::Value(value) => Some(value),
            Lookup::Node(_) => None,
        }
    }

    pub fn as_node(&self) -> Option<&Rc<TreeNode<'a>>> {
        match self {
            Lookup::Node(node) => Some(node),
            Lookup::Value(_) => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Lookup::Value(Value::Undefined))
    }
}

/// A lazily materialized object at some path.
///
/// Reads layer the buffered changes over the content; writes go straight
/// into the owning change tree and bypass validation. Child nodes are
/// memoized, so reading the same key twice yields the same node.
pub struct TreeNode<'a> {
    changes: &'a RefCell<ChangeTree>,
    content: &'a RefCell<Value>,
    path: Vec<String>,
    children: RefCell<HashMap<String, Rc<TreeNode<'a>>>>,
    local: RefCell<Map>,
}

impl std::fmt::Debug for TreeNode<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeNode")
            .field("path", &self.path())
            .finish_non_exhaustive()
    }
}

impl<'a> TreeNode<'a> {
    pub(crate) fn new(
        changes: &'a RefCell<ChangeTree>,
        content: &'a RefCell<Value>,
        path: Vec<String>,
    ) -> Self {
        Self {
            changes,
            content,
            path,
            children: RefCell::new(HashMap::new()),
            local: RefCell::new(Map::new()),
        }
    }

    /// Dotted path of this node from the root.
    pub fn path(&self) -> String {
        join_path(&self.path)
    }

    /// Reads `key` relative to this node. Dotted keys walk child nodes.
    pub fn get(&self, key: &str) -> Lookup<'a> {
        let Some((head, rest)) = key.split_once('.') else {
            return self.get_child(key);
        };
        match self.get_child(head) {
            Lookup::Node(node) => node.get(rest),
            Lookup::Value(value) => Lookup::Value(get_deep(&value, rest).cloned().unwrap_or_default()),
        }
    }

    fn get_child(&self, key: &str) -> Lookup<'a> {
        let mut path = self.path.clone();
        path.push(key.to_string());
        let resolution = resolve(&self.changes.borrow(), &self.content.borrow(), &path);
        match resolution {
            Resolution::Node => {
                let mut children = self.children.borrow_mut();
                let node = children
                    .entry(key.to_string())
                    .or_insert_with(|| Rc::new(TreeNode::new(self.changes, self.content, path)));
                Lookup::Node(Rc::clone(node))
            }
            Resolution::Value(Value::Undefined) => Lookup::Value(
                self.local.borrow().get(key).cloned().unwrap_or_default(),
            ),
            Resolution::Value(value) => Lookup::Value(value),
        }
    }

    /// Buffers `value` at `key` relative to this node.
    ///
    /// Keys starting with `_` are kept on the node itself and never become
    /// changes.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<(), PathError> {
        let value = value.into();
        if key.starts_with('_') {
            self.local.borrow_mut().insert(key.to_string(), value);
            return Ok(());
        }
        let mut path = self.path.clone();
        path.extend(split_path(key).into_iter().map(String::from));
        tracing::trace!(path = %join_path(&path), "buffering write through node");
        self.changes
            .borrow_mut()
            .insert(&join_path(&path), Change::new(value))
    }

    /// Keys this node has buffered changes for.
    pub fn keys(&self) -> Vec<String> {
        let changes = self.changes.borrow();
        match locate(&changes, &self.path) {
            Hit::Branch(branch) => branch.keys().cloned().collect(),
            Hit::Inside {
                value: Some(Value::Object(map)),
                ..
            } => map.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Plain value of this node: content with the changes below it merged in.
    pub fn unwrap(&self) -> Value {
        unwrap_at(&self.changes.borrow(), &self.content.borrow(), &self.path)
    }
}
