//! Path-addressed trees of leaves.
//!
//! Both the change tree (leaves are [`Change`](crate::Change) markers) and
//! the error tree (leaves are [`ErrorEntry`](crate::ErrorEntry) records) are
//! a [`Tree`]: plain branches keyed by path segment, terminated by leaves.

use changeset_value::{is_valid_key, split_path, PathError};
use indexmap::IndexMap;

/// Hook for leaves that can absorb a write addressed *through* them.
pub trait Leaf: Clone {
    /// Called when `insert` reaches `self` at an intermediate segment with
    /// `rest` segments still to go. Returning `Some` replaces `self` with
    /// the returned leaf and ends the insert; `None` turns the position into
    /// an empty branch and the walk continues.
    fn specialize(&self, rest: &[&str], leaf: &Self) -> Result<Option<Self>, PathError> {
        let _ = (rest, leaf);
        Ok(None)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node<L> {
    Leaf(L),
    Branch(Tree<L>),
}

impl<L> Node<L> {
    pub fn as_leaf(&self) -> Option<&L> {
        match self {
            Node::Leaf(leaf) => Some(leaf),
            Node::Branch(_) => None,
        }
    }

    pub fn as_branch(&self) -> Option<&Tree<L>> {
        match self {
            Node::Branch(tree) => Some(tree),
            Node::Leaf(_) => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tree<L> {
    entries: IndexMap<String, Node<L>>,
}

impl<L> Default for Tree<L> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<L> Tree<L> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Top-level keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Node<L>)> {
        self.entries.iter()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Top-level entry, without interpreting `key` as a path.
    pub fn entry(&self, key: &str) -> Option<&Node<L>> {
        self.entries.get(key)
    }

    /// Sets a top-level entry, without interpreting `key` as a path.
    pub fn insert_entry(&mut self, key: impl Into<String>, node: Node<L>) {
        self.entries.insert(key.into(), node);
    }

    /// Node at a dotted path. Walking through a leaf yields `None`.
    pub fn get(&self, path: &str) -> Option<&Node<L>> {
        self.get_keys(&split_path(path))
    }

    pub fn get_keys<S: AsRef<str>>(&self, keys: &[S]) -> Option<&Node<L>> {
        let (last, parents) = keys.split_last()?;
        let mut current = self;
        for key in parents {
            match current.entries.get(key.as_ref())? {
                Node::Branch(tree) => current = tree,
                Node::Leaf(_) => return None,
            }
        }
        current.entries.get(last.as_ref())
    }

    pub fn leaf(&self, path: &str) -> Option<&L> {
        self.get(path).and_then(Node::as_leaf)
    }

    /// Removes the node at `path`, or the first leaf found along it.
    ///
    /// Emptied parent branches are left in place.
    pub fn remove(&mut self, path: &str) -> Option<Node<L>> {
        self.remove_keys(&split_path(path))
    }

    fn remove_keys(&mut self, keys: &[&str]) -> Option<Node<L>> {
        let (first, rest) = keys.split_first()?;
        if rest.is_empty() || matches!(self.entries.get(*first), Some(Node::Leaf(_))) {
            return self.entries.shift_remove(*first);
        }
        match self.entries.get_mut(*first)? {
            Node::Branch(tree) => tree.remove_keys(rest),
            Node::Leaf(_) => None,
        }
    }

    /// Every leaf with its full dotted path, depth first in insertion order.
    pub fn leaves(&self) -> Vec<(String, &L)> {
        let mut out = Vec::new();
        self.collect_leaves(String::new(), &mut out);
        out
    }

    fn collect_leaves<'t>(&'t self, prefix: String, out: &mut Vec<(String, &'t L)>) {
        for (key, node) in &self.entries {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };
            match node {
                Node::Leaf(leaf) => out.push((path, leaf)),
                Node::Branch(tree) => tree.collect_leaves(path, out),
            }
        }
    }

    /// Whether any leaf exists at any depth.
    pub fn has_leaves(&self) -> bool {
        self.entries.values().any(|node| match node {
            Node::Leaf(_) => true,
            Node::Branch(tree) => tree.has_leaves(),
        })
    }
}

impl<L: Clone> Tree<L> {
    /// Copy restricted to the top-level `keys`.
    pub fn take<S: AsRef<str>>(&self, keys: &[S]) -> Self {
        let entries = self
            .entries
            .iter()
            .filter(|(key, _)| keys.iter().any(|k| k.as_ref() == key.as_str()))
            .map(|(key, node)| (key.clone(), node.clone()))
            .collect();
        Self { entries }
    }

    /// Copy without the top-level `keys`.
    pub fn without<S: AsRef<str>>(&self, keys: &[S]) -> Self {
        let entries = self
            .entries
            .iter()
            .filter(|(key, _)| !keys.iter().any(|k| k.as_ref() == key.as_str()))
            .map(|(key, node)| (key.clone(), node.clone()))
            .collect();
        Self { entries }
    }

    /// Top-level union; entries of `other` win.
    pub fn union(&self, other: &Self) -> Self {
        let mut out = self.clone();
        for (key, node) in &other.entries {
            out.entries.insert(key.clone(), node.clone());
        }
        out
    }
}

impl<L: Leaf> Tree<L> {
    /// Places `leaf` at a dotted path.
    ///
    /// Reserved segments are dropped first. Intermediate leaves either absorb
    /// the write through [`Leaf::specialize`] or are replaced by branches.
    pub fn insert(&mut self, path: &str, leaf: L) -> Result<(), PathError> {
        let keys: Vec<&str> = split_path(path)
            .into_iter()
            .filter(|key| is_valid_key(key))
            .collect();
        self.insert_keys(&keys, leaf)
    }

    fn insert_keys(&mut self, keys: &[&str], leaf: L) -> Result<(), PathError> {
        let Some((last, parents)) = keys.split_last() else {
            return Ok(());
        };
        let mut current = self;
        for (i, key) in parents.iter().enumerate() {
            let node = current
                .entries
                .entry((*key).to_string())
                .or_insert_with(|| Node::Branch(Tree::new()));
            if let Node::Leaf(existing) = &*node {
                if let Some(specialized) = existing.specialize(&keys[i + 1..], &leaf)? {
                    *node = Node::Leaf(specialized);
                    return Ok(());
                }
                *node = Node::Branch(Tree::new());
            }
            let Node::Branch(next) = node else {
                return Ok(());
            };
            current = next;
        }
        current.entries.insert((*last).to_string(), Node::Leaf(leaf));
        Ok(())
    }

    /// Builds a tree from `(dotted path, leaf)` pairs.
    pub fn from_leaves<I, S>(leaves: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = (S, L)>,
        S: AsRef<str>,
    {
        let mut tree = Self::new();
        for (path, leaf) in leaves {
            tree.insert(path.as_ref(), leaf)?;
        }
        Ok(tree)
    }
}
