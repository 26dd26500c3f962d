use changeset_value::Value;
use serde::{Deserialize, Serialize};

use crate::change::ChangeTree;
use crate::err::ErrorTree;

/// Plain copy of a changeset's buffered state.
///
/// `changes` is the change tree in plain form; `errors` nests
/// `{"value": ..., "validation": ...}` records by path.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub changes: Value,
    pub errors: Value,
}

impl Snapshot {
    pub(crate) fn capture(changes: &ChangeTree, errors: &ErrorTree) -> Self {
        Self {
            changes: changes.normalize(),
            errors: errors.to_plain(),
        }
    }

    pub(crate) fn change_tree(&self) -> ChangeTree {
        ChangeTree::from_plain(&self.changes)
    }

    pub(crate) fn error_tree(&self) -> ErrorTree {
        ErrorTree::from_plain(&self.errors)
    }
}
