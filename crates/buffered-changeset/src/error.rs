use changeset_value::PathError;
use thiserror::Error;

/// Errors raised by changeset operations.
///
/// Validation failures are not errors: they are recorded in the error tree
/// and queried through `is_valid`/`errors`.
#[derive(Debug, Error)]
pub enum ChangesetError {
    /// A write addressed an array with a negative or non-numeric index.
    #[error(transparent)]
    Path(#[from] PathError),
    /// `merge` was called with a changeset over a different content object.
    #[error("cannot merge with a changeset of different content")]
    ContentMismatch,
    /// The `prepare` callback returned something other than an object.
    #[error("callback to `prepare` must return an object")]
    PrepareNotObject,
    /// A pending validator resolved to an error.
    #[error(transparent)]
    Validator(#[from] ValidatorError),
    /// The persistence collaborator passed to `save` failed.
    #[error("save failed: {0}")]
    Save(#[source] Box<dyn std::error::Error>),
}

/// Error a pending validator may resolve to.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidatorError {
    message: String,
}

impl ValidatorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub type ChangesetResult<T> = Result<T, ChangesetError>;
