//! State and operations shared by [`Changeset`](crate::Changeset) and
//! [`ValidatedChangeset`](crate::ValidatedChangeset).

use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use changeset_value::{get_deep, is_equal, parse_index, split_path, Map, PathError, Value};
use tracing::debug;

use crate::change::{Change, ChangeTree, KeyChange};
use crate::config::{Config, KeyFilter};
use crate::content::Content;
use crate::err::{ErrorEntry, ErrorTree, KeyError, Validation};
use crate::error::{ChangesetError, ChangesetResult};
use crate::merge::merge_deep;
use crate::node::{resolve, Lookup, Resolution, TreeNode};
use crate::notifier::{Event, EventKind, Notifier};
use crate::snapshot::Snapshot;

/// Buffered writes, recorded errors and lifecycle over one content object.
///
/// Writes land in a change tree and leave the content untouched until
/// [`execute`](Self::execute). A buffer never validates on its own; the
/// front ends decide when validators run.
pub struct ChangeBuffer {
    pub(crate) content: Content,
    pub(crate) previous: Option<ChangeTree>,
    pub(crate) changes: RefCell<ChangeTree>,
    pub(crate) errors: ErrorTree,
    pub(crate) errors_cache: ErrorTree,
    pub(crate) config: Config,
    keys: KeyFilter,
    pub(crate) notifier: Notifier,
}

impl fmt::Debug for ChangeBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeBuffer")
            .field("content", &self.content)
            .field("changes", &self.changes.borrow())
            .field("errors", &self.errors)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// `changeset:<content as JSON>`
impl fmt::Display for ChangeBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "changeset:{}", self.content.borrow().to_json())
    }
}

impl ChangeBuffer {
    pub fn new(content: impl Into<Content>, config: Config) -> Self {
        let keys = KeyFilter::new(&config);
        Self {
            content: content.into(),
            previous: None,
            changes: RefCell::new(ChangeTree::new()),
            errors: ErrorTree::new(),
            errors_cache: ErrorTree::new(),
            config,
            keys,
            notifier: Notifier::default(),
        }
    }

    // ── Reads ──────────────────────────────────────────────────────────────

    pub fn content(&self) -> &Content {
        &self.content
    }

    /// Copy of the content, without pending changes.
    pub fn data(&self) -> Value {
        self.content.get()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Reads a dotted key with pending changes layered over the content.
    pub fn get(&self, key: &str) -> Lookup<'_> {
        let path: Vec<String> = split_path(key).into_iter().map(String::from).collect();
        let resolution = resolve(&self.changes.borrow(), &self.content.borrow(), &path);
        match resolution {
            Resolution::Value(value) => Lookup::Value(value),
            Resolution::Node => Lookup::Node(Rc::new(TreeNode::new(
                &self.changes,
                self.content.cell(),
                path,
            ))),
        }
    }

    /// Root accessor node: reads and writes relative to the whole object.
    pub fn root(&self) -> TreeNode<'_> {
        TreeNode::new(&self.changes, self.content.cell(), Vec::new())
    }

    /// Pending changes in plain form.
    pub fn change(&self) -> Value {
        self.changes.borrow().normalize()
    }

    /// Pending changes as dotted keys.
    pub fn changes(&self) -> Vec<KeyChange> {
        self.changes.borrow().key_changes()
    }

    pub fn change_tree(&self) -> Ref<'_, ChangeTree> {
        self.changes.borrow()
    }

    /// Errors in plain form.
    pub fn error(&self) -> Value {
        self.errors.to_plain()
    }

    /// Errors as dotted keys.
    pub fn errors(&self) -> Vec<KeyError> {
        self.errors.key_errors()
    }

    pub fn error_tree(&self) -> &ErrorTree {
        &self.errors
    }

    /// No change is pending under an allowed top-level key.
    ///
    /// With an allow-list, changes under other keys are disregarded here
    /// only if no allowed key has changes at all.
    pub fn is_pristine(&self) -> bool {
        let changes = self.changes.borrow();
        let mut keys: Vec<&String> = changes.keys().collect();
        if let Some(allowed) = self.config.allowed_keys() {
            keys.retain(|key| allowed.iter().any(|a| a == *key));
        }
        keys.is_empty() || !changes.has_leaves()
    }

    pub fn is_dirty(&self) -> bool {
        !self.is_pristine()
    }

    pub fn is_valid(&self) -> bool {
        !self.errors.has_leaves()
    }

    pub fn is_invalid(&self) -> bool {
        !self.is_valid()
    }

    // ── Writes ─────────────────────────────────────────────────────────────

    /// Buffers a write without validating it. Keys rejected by the
    /// allow-list are ignored.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> ChangesetResult<()> {
        if !self.accepts(key) {
            debug!(key, "ignoring write outside allow-list");
            return Ok(());
        }
        self.set_property(key, value.into())
    }

    pub(crate) fn accepts(&self, key: &str) -> bool {
        self.keys.accepts(key)
    }

    /// Records `value` unless it equals the content, in which case any
    /// pending change for `key` is dropped instead. Below a marker the
    /// write is always recorded, since the marker hides the content.
    pub(crate) fn set_property(&mut self, key: &str, value: Value) -> ChangesetResult<()> {
        check_indices(&self.content.borrow(), key)?;
        let old = get_deep(&self.content.borrow(), key).cloned().unwrap_or_default();
        let changes = self.changes.get_mut();
        if old.is_undefined() || !is_equal(&value, &old) || changes.is_shadowed(key) {
            debug!(key, "buffered change");
            changes.insert(key, Change::new(value))?;
        } else if changes.get(key).is_some() {
            debug!(key, "value matches content, dropping change");
            changes.remove(key);
        }
        Ok(())
    }

    /// Applies pending changes to the content if valid and dirty, then
    /// clears them.
    ///
    /// Does not wait for validations still in flight.
    pub fn execute(&mut self) -> &mut Self {
        let mut previous = None;
        if self.is_valid() && self.is_dirty() {
            let changes = self.changes.take();
            let mut old = ChangeTree::new();
            {
                let content = self.content.borrow();
                for (key, _) in changes.leaves() {
                    let value = get_deep(&content, &key).cloned().unwrap_or_default();
                    if let Err(error) = old.insert(&key, Change::new(value)) {
                        tracing::warn!(%key, %error, "cannot record previous value");
                    }
                }
            }
            let merged = merge_deep(self.content.take(), &changes);
            self.content.replace(merged);
            debug!(count = changes.leaves().len(), "executed changes");
            previous = Some(old);
        }
        self.notifier.trigger(&Event::Execute);
        *self.changes.get_mut() = ChangeTree::new();
        self.previous = previous;
        self
    }

    /// Restores the values the last effective `execute` overwrote.
    pub fn unexecute(&mut self) -> &mut Self {
        if let Some(previous) = &self.previous {
            let restored = merge_deep(self.content.take(), previous);
            self.content.replace(restored);
            debug!("restored previous content");
        }
        self
    }

    /// Drops every pending change and error.
    pub fn rollback(&mut self) -> &mut Self {
        *self.changes.get_mut() = ChangeTree::new();
        self.errors = ErrorTree::new();
        self.errors_cache = ErrorTree::new();
        self.notifier.trigger(&Event::AfterRollback);
        debug!("rolled back");
        self
    }

    /// Drops errors, and the changes that caused them.
    ///
    /// With a key, only that key is cleared; without, every errored key is.
    pub fn rollback_invalid(&mut self, key: Option<&str>) -> &mut Self {
        let errored: Vec<String> = self.errors.leaves().into_iter().map(|(k, _)| k).collect();
        let changes = self.changes.get_mut();
        match key {
            Some(key) => {
                self.errors.remove(key);
                if errored.iter().any(|k| k == key) {
                    changes.remove(key);
                }
            }
            None => {
                self.errors = ErrorTree::new();
                for key in &errored {
                    changes.remove(key);
                }
            }
        }
        self.errors_cache = self.errors.clone();
        self
    }

    /// Drops the pending change and error at `key`.
    pub fn rollback_property(&mut self, key: &str) -> &mut Self {
        self.changes.get_mut().remove(key);
        self.errors.remove(key);
        self.errors_cache = self.errors.clone();
        self
    }

    /// Keeps only changes under the given top-level keys. An empty list
    /// keeps everything.
    pub fn cast<S: AsRef<str>>(&mut self, allowed: &[S]) -> &mut Self {
        if allowed.is_empty() {
            return self;
        }
        let changes = self.changes.get_mut();
        *changes = changes.take(allowed);
        debug!(kept = changes.len(), "cast changes");
        self
    }

    /// Replaces the pending changes with the output of `f`, which receives
    /// them as a flat map of dotted keys.
    ///
    /// # Errors
    ///
    /// `PrepareNotObject` when `f` returns anything but an object.
    pub fn prepare<F>(&mut self, f: F) -> ChangesetResult<&mut Self>
    where
        F: FnOnce(Map) -> Value,
    {
        let bare: Map = self
            .changes()
            .into_iter()
            .map(|change| (change.key, change.value))
            .collect();
        let Value::Object(prepared) = f(bare) else {
            return Err(ChangesetError::PrepareNotObject);
        };
        let mut changes = ChangeTree::new();
        for (key, value) in prepared {
            changes.insert(&key, Change::new(value))?;
        }
        *self.changes.get_mut() = changes;
        Ok(self)
    }

    // ── Errors ─────────────────────────────────────────────────────────────

    /// Records an error at `key` for its current value.
    pub fn add_error(
        &mut self,
        key: &str,
        validation: impl Into<Validation>,
    ) -> ChangesetResult<ErrorEntry> {
        let value = self.get(key).into_value();
        self.add_error_entry(key, ErrorEntry::new(value, validation))
    }

    /// Records an error at `key` with an explicit value.
    pub fn add_error_entry(&mut self, key: &str, entry: ErrorEntry) -> ChangesetResult<ErrorEntry> {
        self.errors.insert(key, entry.clone())?;
        self.errors_cache = self.errors.clone();
        Ok(entry)
    }

    /// Appends messages to the error at `key`, creating it if needed.
    pub fn push_errors<I, M>(&mut self, key: &str, messages: I) -> ChangesetResult<ErrorEntry>
    where
        I: IntoIterator<Item = M>,
        M: Into<Value>,
    {
        let mut validation = self
            .errors
            .leaf(key)
            .map(|entry| entry.validation.clone().into_vec())
            .unwrap_or_default();
        validation.extend(messages.into_iter().map(Into::into));
        let value = self.get(key).into_value();
        self.add_error_entry(key, ErrorEntry::new(value, Validation::Many(validation)))
    }

    pub fn remove_error(&mut self, key: &str) -> &mut Self {
        self.errors.remove(key);
        self.errors_cache = self.errors.clone();
        self
    }

    pub fn remove_errors(&mut self) -> &mut Self {
        self.errors = ErrorTree::new();
        self.errors_cache = ErrorTree::new();
        self
    }

    // ── Snapshots ──────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.changes.borrow(), &self.errors)
    }

    pub fn restore(&mut self, snapshot: &Snapshot) -> &mut Self {
        *self.changes.get_mut() = snapshot.change_tree();
        self.errors = snapshot.error_tree();
        self.errors_cache = self.errors.clone();
        debug!("restored snapshot");
        self
    }

    // ── Events ─────────────────────────────────────────────────────────────

    pub fn on<F>(&mut self, kind: EventKind, listener: F) -> u64
    where
        F: FnMut(&Event) + 'static,
    {
        self.notifier.on(kind, listener)
    }

    pub fn off(&mut self, kind: EventKind, listener_id: u64) -> bool {
        self.notifier.off(kind, listener_id)
    }

    // ── Merging ────────────────────────────────────────────────────────────

    /// Combines two buffers over the same content; `other` wins.
    ///
    /// Errors of `self` are dropped where `other` has changes, and changes
    /// of `self` are dropped where `other` has errors. When both are
    /// pristine the result is a copy of `self`.
    pub(crate) fn merged_with(&self, other: &ChangeBuffer) -> ChangesetResult<ChangeBuffer> {
        if !self.content.ptr_eq(&other.content) {
            return Err(ChangesetError::ContentMismatch);
        }
        if self.is_pristine() && other.is_pristine() {
            return Ok(self.duplicate());
        }
        let mine = self.changes.borrow();
        let theirs = other.changes.borrow();
        let their_change_keys: Vec<&String> = theirs.keys().collect();
        let their_error_keys: Vec<&String> = other.errors.keys().collect();

        let errors = self.errors.without(&their_change_keys).union(&other.errors);
        let changes = mine.without(&their_error_keys).union(&theirs);

        debug!(
            changes = changes.len(),
            errors = errors.len(),
            "merged changesets"
        );
        let mut merged = ChangeBuffer::new(self.content.clone(), self.config.clone());
        *merged.changes.get_mut() = changes;
        merged.errors_cache = errors.clone();
        merged.errors = errors;
        Ok(merged)
    }

    fn duplicate(&self) -> ChangeBuffer {
        let mut copy = ChangeBuffer::new(self.content.clone(), self.config.clone());
        *copy.changes.get_mut() = self.changes.borrow().clone();
        copy.errors = self.errors.clone();
        copy.errors_cache = self.errors_cache.clone();
        copy
    }
}

/// Rejects numeric segments that address arrays in the content but are
/// negative or past [`MAX_INDEX`](changeset_value::MAX_INDEX).
fn check_indices(content: &Value, key: &str) -> Result<(), PathError> {
    let mut current = Some(content);
    for segment in split_path(key) {
        let Some(value) = current else {
            break;
        };
        if value.is_array() && is_numeric(segment) {
            parse_index(segment)?;
        }
        current = value.get(segment);
    }
    Ok(())
}

fn is_numeric(segment: &str) -> bool {
    let digits = segment.strip_prefix('-').unwrap_or(segment);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn buffer(content: serde_json::Value) -> ChangeBuffer {
        ChangeBuffer::new(content, Config::default())
    }

    #[test]
    fn test_set_buffers_without_touching_content() {
        let mut b = buffer(json!({"name": "Jim"}));
        b.set("name", "Bob").unwrap();
        assert_eq!(b.get("name").into_value(), Value::from("Bob"));
        assert_eq!(b.data().to_json(), json!({"name": "Jim"}));
        assert!(b.is_dirty());
    }

    #[test]
    fn test_set_back_to_original_drops_change() {
        let mut b = buffer(json!({"name": "Jim"}));
        b.set("name", "Bob").unwrap();
        b.set("name", "Jim").unwrap();
        assert!(b.changes().is_empty());
        assert!(b.is_pristine());
    }

    #[test]
    fn test_set_equal_object_is_not_a_change() {
        let mut b = buffer(json!({"person": {"name": "Jim", "tags": [1, 2]}}));
        b.set("person", Value::from(json!({"name": "Jim", "tags": [1, 2]})))
            .unwrap();
        assert!(b.changes().is_empty());
        assert!(b.is_pristine());
    }

    #[test]
    fn test_set_back_to_original_below_marker() {
        let mut b = buffer(json!({"person": {"name": "Jim", "age": 30}}));
        b.set("person", Value::from(json!({"name": "Bob", "age": 31}))).unwrap();
        b.set("person.name", "Jim").unwrap();
        assert_eq!(b.get("person.name").into_value(), Value::from("Jim"));
        assert_eq!(b.get("person.age").into_value(), Value::from(31));
    }

    #[test]
    fn test_execute_and_unexecute() {
        let mut b = buffer(json!({"name": "Jim", "age": 30}));
        b.set("name", "Bob").unwrap();
        b.execute();
        assert_eq!(b.data().to_json(), json!({"name": "Bob", "age": 30}));
        assert!(b.changes().is_empty());

        b.unexecute();
        assert_eq!(b.data().to_json(), json!({"name": "Jim", "age": 30}));
    }

    #[test]
    fn test_execute_skipped_when_invalid() {
        let mut b = buffer(json!({"name": "Jim"}));
        b.set("name", "").unwrap();
        b.add_error("name", "required").unwrap();
        b.execute();
        assert_eq!(b.data().to_json(), json!({"name": "Jim"}));
        assert!(b.changes().is_empty());
        assert!(b.is_invalid());
    }

    #[test]
    fn test_rollback_invalid_for_one_key() {
        let mut b = buffer(json!({}));
        b.set("name", "").unwrap();
        b.set("email", "x").unwrap();
        b.add_error("name", "required").unwrap();
        b.add_error("email", "invalid").unwrap();

        b.rollback_invalid(Some("name"));
        let keys: Vec<String> = b.changes().into_iter().map(|c| c.key).collect();
        assert_eq!(keys, vec!["email"]);
        assert_eq!(b.errors().len(), 1);

        b.rollback_invalid(None);
        assert!(b.changes().is_empty());
        assert!(b.is_valid());
    }

    #[test]
    fn test_push_errors() {
        let mut b = buffer(json!({"name": "x"}));
        b.add_error("name", "too short").unwrap();
        let entry = b.push_errors("name", ["no digits"]).unwrap();
        assert_eq!(entry.value, Value::from("x"));
        assert_eq!(entry.validation, Validation::from(vec!["too short", "no digits"]));
    }

    #[test]
    fn test_prepare() {
        let mut b = buffer(json!({}));
        b.set("first", "a").unwrap();
        b.set("person.name", "b").unwrap();
        b.prepare(|bare| {
            let mut out = Map::new();
            for (key, value) in bare {
                out.insert(key.to_uppercase(), value);
            }
            Value::Object(out)
        })
        .unwrap();
        assert_eq!(b.change().to_json(), json!({"FIRST": "a", "PERSON": {"NAME": "b"}}));

        assert!(matches!(
            b.prepare(|_| Value::from(1)),
            Err(ChangesetError::PrepareNotObject)
        ));
    }

    #[test]
    fn test_display() {
        let b = buffer(json!({"a": 1}));
        assert_eq!(b.to_string(), r#"changeset:{"a":1}"#);
    }
}
