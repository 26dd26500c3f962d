use std::fmt;
use std::ops::{Deref, DerefMut};

use changeset_value::Value;

use crate::buffer::ChangeBuffer;
use crate::config::Config;
use crate::content::Content;
use crate::error::ChangesetResult;
use crate::merge::merge_deep;

/// A buffer validated as a whole, on demand.
///
/// Writes never run validators; [`validate`](Self::validate) hands the
/// merged object to a callback instead, for schema-style checks. All other
/// operations are those of [`ChangeBuffer`].
#[derive(Debug)]
pub struct ValidatedChangeset {
    buffer: ChangeBuffer,
}

impl fmt::Display for ValidatedChangeset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.buffer, f)
    }
}

impl Deref for ValidatedChangeset {
    type Target = ChangeBuffer;

    fn deref(&self) -> &ChangeBuffer {
        &self.buffer
    }
}

impl DerefMut for ValidatedChangeset {
    fn deref_mut(&mut self) -> &mut ChangeBuffer {
        &mut self.buffer
    }
}

impl ValidatedChangeset {
    pub fn new(content: impl Into<Content>) -> Self {
        Self::with_config(content, Config::default())
    }

    pub fn with_config(content: impl Into<Content>, config: Config) -> Self {
        Self {
            buffer: ChangeBuffer::new(content, config),
        }
    }

    /// Calls `f` with a copy of the content with pending changes applied.
    ///
    /// The content itself is not touched. Return a future from `f` for
    /// asynchronous checks.
    pub fn validate<F, T>(&self, f: F) -> T
    where
        F: FnOnce(Value) -> T,
    {
        let merged = {
            let changes = self.buffer.changes.borrow();
            merge_deep(self.buffer.content.get(), &changes)
        };
        f(merged)
    }

    /// A new changeset combining both; `other` wins.
    pub fn merge(&self, other: &ValidatedChangeset) -> ChangesetResult<ValidatedChangeset> {
        Ok(Self {
            buffer: self.buffer.merged_with(&other.buffer)?,
        })
    }
}
