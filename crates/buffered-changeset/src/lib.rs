//! Buffered, validated editing of nested objects.
//!
//! A [`Changeset`] wraps a content object and records writes by dotted key
//! (`"person.address.city"`) in a change tree instead of applying them.
//! Reads see the pending writes layered over the content. Writes are
//! validated as they happen; failures land in an error tree. The content is
//! only touched by [`Changeset::execute`], and only when nothing is invalid.
//!
//! [`ValidatedChangeset`] is the same buffer without per-write validation:
//! the whole merged object is checked on demand instead.
//!
//! # Example
//!
//! ```
//! use buffered_changeset::{validator, Changeset, ValidationContext, ValidatorMap, ValidatorOutput};
//! use serde_json::json;
//!
//! let required = validator(|ctx: &ValidationContext<'_>| match ctx.new_value.as_str() {
//!     Some(s) if !s.is_empty() => ValidatorOutput::valid(),
//!     _ => ValidatorOutput::ready("required"),
//! });
//! let mut cs = Changeset::with_validations(
//!     json!({"person": {"name": "Jim", "age": 30}}),
//!     ValidatorMap::new().with("person.name", required),
//! );
//!
//! cs.set("person.name", "").unwrap();
//! assert!(cs.is_invalid());
//! cs.execute();
//! assert_eq!(cs.data().to_json(), json!({"person": {"name": "Jim", "age": 30}}));
//!
//! cs.set("person.name", "Bob").unwrap();
//! assert!(cs.is_valid());
//! cs.execute();
//! assert_eq!(cs.data().to_json(), json!({"person": {"name": "Bob", "age": 30}}));
//! ```

pub mod buffer;
pub mod change;
pub mod changeset;
pub mod config;
pub mod content;
pub mod err;
pub mod error;
pub mod merge;
pub mod node;
pub mod notifier;
mod running;
pub mod snapshot;
pub mod tree;
pub mod validated;
pub mod validation;

pub use buffer::ChangeBuffer;
pub use change::{Change, ChangeNode, ChangeTree, KeyChange};
pub use changeset::Changeset;
pub use config::Config;
pub use content::{Content, Persist};
pub use err::{ErrorEntry, ErrorTree, KeyError, Validation};
pub use error::{ChangesetError, ChangesetResult, ValidatorError};
pub use merge::{merge_deep, property_is_unsafe};
pub use node::{Lookup, TreeNode};
pub use notifier::{Event, EventKind, Notifier};
pub use snapshot::Snapshot;
pub use tree::{Leaf, Node, Tree};
pub use validated::ValidatedChangeset;
pub use validation::{
    validate_all, validator, PendingVerdict, ValidationContext, Validator, ValidatorEntry,
    ValidatorMap, ValidatorOutput, Verdict,
};

pub use changeset_value::{self as value, Map, PathError, Value};
