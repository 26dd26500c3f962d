use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use changeset_value::Value;
use futures::future::LocalBoxFuture;

/// Shared handle to the object a changeset edits.
///
/// Clones share the same underlying value: `execute` writes through to
/// every holder, and two changesets merge only when their handles point at
/// the same value.
#[derive(Clone, Default)]
pub struct Content(Rc<RefCell<Value>>);

impl Content {
    pub fn new(value: impl Into<Value>) -> Self {
        Self(Rc::new(RefCell::new(value.into())))
    }

    /// Copy of the current value.
    pub fn get(&self) -> Value {
        self.0.borrow().clone()
    }

    pub fn borrow(&self) -> Ref<'_, Value> {
        self.0.borrow()
    }

    /// Whether both handles share one value.
    pub fn ptr_eq(&self, other: &Content) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn cell(&self) -> &RefCell<Value> {
        &self.0
    }

    pub(crate) fn take(&self) -> Value {
        self.0.take()
    }

    pub(crate) fn replace(&self, value: Value) {
        *self.0.borrow_mut() = value;
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Content").field(&*self.0.borrow()).finish()
    }
}

impl From<Value> for Content {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

impl From<serde_json::Value> for Content {
    fn from(value: serde_json::Value) -> Self {
        Self::new(value)
    }
}

/// Destination for `save`.
pub trait Persist {
    type Output;
    type Error: std::error::Error + 'static;

    fn save<'a>(&'a self, content: &'a Value)
        -> LocalBoxFuture<'a, Result<Self::Output, Self::Error>>;
}
