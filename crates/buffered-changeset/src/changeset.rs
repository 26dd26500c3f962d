use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use changeset_value::{get_deep, Map, Value};
use futures::future::join_all;
use tracing::{debug, trace};

use crate::buffer::ChangeBuffer;
use crate::config::Config;
use crate::content::{Content, Persist};
use crate::err::{ErrorEntry, Validation};
use crate::error::{ChangesetError, ChangesetResult};
use crate::notifier::{Event, EventKind};
use crate::running::RunningValidations;
use crate::snapshot::Snapshot;
use crate::validation::{ValidationContext, Validator, ValidatorMap, ValidatorOutput, Verdict};

/// A buffer that validates every write.
///
/// Reads (`get`, `changes`, `is_valid`, ...) come from the underlying
/// [`ChangeBuffer`] through `Deref`.
pub struct Changeset {
    buffer: ChangeBuffer,
    validator: Option<Rc<dyn Validator>>,
    validations: ValidatorMap,
    running: RunningValidations,
}

impl fmt::Debug for Changeset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Changeset")
            .field("buffer", &self.buffer)
            .field("validations", &self.validations)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Changeset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.buffer, f)
    }
}

impl Deref for Changeset {
    type Target = ChangeBuffer;

    fn deref(&self) -> &ChangeBuffer {
        &self.buffer
    }
}

impl Changeset {
    /// A changeset without validators.
    pub fn new(content: impl Into<Content>) -> Self {
        Self::with_options(content, None, ValidatorMap::new(), Config::default())
    }

    /// A changeset validated by `validations`.
    pub fn with_validations(content: impl Into<Content>, validations: ValidatorMap) -> Self {
        let validator: Rc<dyn Validator> = Rc::new(validations.clone());
        Self::with_options(content, Some(validator), validations, Config::default())
    }

    /// Full constructor.
    ///
    /// `validator` runs on writes; `validations` lists the fields `validate`
    /// checks when called without keys. With `init_validate`, every listed
    /// field is checked against the content right away; only verdicts that
    /// are ready immediately are recorded.
    pub fn with_options(
        content: impl Into<Content>,
        validator: Option<Rc<dyn Validator>>,
        validations: ValidatorMap,
        config: Config,
    ) -> Self {
        let init_validate = config.init_validate;
        let mut changeset = Self {
            buffer: ChangeBuffer::new(content, config),
            validator,
            validations,
            running: RunningValidations::default(),
        };
        if init_validate {
            changeset.collect_initial_errors();
        }
        changeset
    }

    fn collect_initial_errors(&mut self) {
        for key in self.validations.keys() {
            let value = get_deep(&self.buffer.content.borrow(), &key)
                .cloned()
                .unwrap_or_default();
            let output = self.run_validator(&key, &value, &Value::Null);
            if let ValidatorOutput::Ready(Verdict::Invalid(validation)) = output {
                if let Err(error) = self
                    .buffer
                    .add_error_entry(&key, ErrorEntry { value, validation })
                {
                    tracing::warn!(%key, %error, "cannot record initial error");
                }
            }
        }
    }

    pub fn buffer(&self) -> &ChangeBuffer {
        &self.buffer
    }

    // ── Validation ─────────────────────────────────────────────────────────

    /// Buffers a write and validates it.
    ///
    /// Ready verdicts apply immediately. Pending ones are parked until
    /// [`settle`](Self::settle).
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> ChangesetResult<()> {
        if !self.buffer.accepts(key) {
            debug!(key, "ignoring write outside allow-list");
            return Ok(());
        }
        let value = value.into();
        self.buffer.set_property(key, value.clone())?;
        if self.buffer.config.skip_validate {
            self.apply_verdict(key, value, Verdict::Valid);
            return Ok(());
        }
        self.validate_key(key, value);
        Ok(())
    }

    /// Validates `keys`, or every field of the validator map when empty,
    /// and waits for all pending validations.
    pub async fn validate(&mut self, keys: &[&str]) -> ChangesetResult<()> {
        let keys: Vec<String> = if keys.is_empty() {
            self.validations.keys()
        } else {
            keys.iter().map(|key| key.to_string()).collect()
        };
        for key in &keys {
            let value = self.buffer.get(key).into_value();
            self.validate_key(key, value);
        }
        self.settle().await
    }

    /// Waits for every parked validation and applies the verdicts in the
    /// order the writes happened.
    ///
    /// # Errors
    ///
    /// The first error a pending validator resolved to. Verdicts of the
    /// other validations are still applied.
    pub async fn settle(&mut self) -> ChangesetResult<()> {
        let batch = self.running.take();
        if batch.is_empty() {
            return Ok(());
        }
        trace!(count = batch.len(), "settling validations");
        let (entries, futures): (Vec<_>, Vec<_>) = batch
            .into_iter()
            .map(|pending| ((pending.key, pending.value), pending.verdict))
            .unzip();
        let results = join_all(futures).await;

        let mut first_error = None;
        for ((key, value), result) in entries.into_iter().zip(results) {
            match result {
                Ok(verdict) => {
                    self.apply_verdict(&key, value, verdict);
                    self.buffer
                        .notifier
                        .trigger(&Event::AfterValidation { key });
                }
                Err(error) => {
                    debug!(%key, %error, "validator failed");
                    first_error.get_or_insert(error);
                }
            }
        }
        match first_error {
            Some(error) => Err(ChangesetError::Validator(error)),
            None => Ok(()),
        }
    }

    /// Whether `key` (or any key) has a validation in flight.
    pub fn is_validating(&self, key: Option<&str>) -> bool {
        self.running.is_validating(key)
    }

    fn validate_key(&mut self, key: &str, value: Value) {
        let old = get_deep(&self.buffer.content.borrow(), key)
            .cloned()
            .unwrap_or_default();
        let output = self.run_validator(key, &value, &old);
        self.buffer.notifier.trigger(&Event::BeforeValidation {
            key: key.to_string(),
        });
        match output {
            ValidatorOutput::Ready(verdict) => {
                self.apply_verdict(key, value, verdict);
                self.buffer.notifier.trigger(&Event::AfterValidation {
                    key: key.to_string(),
                });
            }
            ValidatorOutput::Pending(verdict) => {
                trace!(key, "validation pending");
                self.running.register(key, value, verdict);
            }
        }
    }

    fn run_validator(&self, key: &str, new_value: &Value, old_value: &Value) -> ValidatorOutput {
        let Some(validator) = &self.validator else {
            return ValidatorOutput::valid();
        };
        let changes = self.buffer.change();
        let content = self.buffer.content.borrow();
        validator.validate(&ValidationContext {
            key,
            new_value,
            old_value,
            changes: &changes,
            content: &content,
        })
    }

    /// Clears the previous error at `key` and records a new one if invalid.
    fn apply_verdict(&mut self, key: &str, value: Value, verdict: Verdict) {
        let mut errors = self.buffer.errors_cache.clone();
        errors.remove(key);
        self.buffer.errors = errors.clone();
        self.buffer.errors_cache = errors;
        if let Verdict::Invalid(validation) = verdict {
            if let Err(error) = self
                .buffer
                .add_error_entry(key, ErrorEntry { value, validation })
            {
                tracing::warn!(key, %error, "cannot record error");
            }
        }
    }

    // ── Lifecycle ──────────────────────────────────────────────────────────

    /// See [`ChangeBuffer::execute`]. Validations still in flight are not
    /// awaited.
    pub fn execute(&mut self) -> &mut Self {
        self.buffer.execute();
        self
    }

    pub fn unexecute(&mut self) -> &mut Self {
        self.buffer.unexecute();
        self
    }

    /// Executes, hands the content to `store`, and rolls back once the
    /// store succeeds.
    ///
    /// # Errors
    ///
    /// `Save` wrapping the store's error. Changes were already committed to
    /// the content by then.
    pub async fn save<P: Persist>(&mut self, store: &P) -> ChangesetResult<P::Output> {
        self.buffer.execute();
        let content = self.buffer.content.get();
        match store.save(&content).await {
            Ok(output) => {
                self.buffer.rollback();
                Ok(output)
            }
            Err(error) => Err(ChangesetError::Save(Box::new(error))),
        }
    }

    pub fn rollback(&mut self) -> &mut Self {
        self.buffer.rollback();
        self
    }

    pub fn rollback_invalid(&mut self, key: Option<&str>) -> &mut Self {
        self.buffer.rollback_invalid(key);
        self
    }

    pub fn rollback_property(&mut self, key: &str) -> &mut Self {
        self.buffer.rollback_property(key);
        self
    }

    pub fn cast<S: AsRef<str>>(&mut self, allowed: &[S]) -> &mut Self {
        self.buffer.cast(allowed);
        self
    }

    pub fn prepare<F>(&mut self, f: F) -> ChangesetResult<&mut Self>
    where
        F: FnOnce(Map) -> Value,
    {
        self.buffer.prepare(f)?;
        Ok(self)
    }

    pub fn restore(&mut self, snapshot: &Snapshot) -> &mut Self {
        self.buffer.restore(snapshot);
        self
    }

    /// A new changeset combining both; see [`ChangeBuffer::merged_with`].
    ///
    /// # Errors
    ///
    /// `ContentMismatch` when `other` edits a different content object.
    pub fn merge(&self, other: &Changeset) -> ChangesetResult<Changeset> {
        Ok(Self {
            buffer: self.buffer.merged_with(&other.buffer)?,
            validator: self.validator.clone(),
            validations: self.validations.clone(),
            running: RunningValidations::default(),
        })
    }

    // ── Errors ─────────────────────────────────────────────────────────────

    pub fn add_error(
        &mut self,
        key: &str,
        validation: impl Into<Validation>,
    ) -> ChangesetResult<ErrorEntry> {
        self.buffer.add_error(key, validation)
    }

    pub fn add_error_entry(&mut self, key: &str, entry: ErrorEntry) -> ChangesetResult<ErrorEntry> {
        self.buffer.add_error_entry(key, entry)
    }

    pub fn push_errors<I, M>(&mut self, key: &str, messages: I) -> ChangesetResult<ErrorEntry>
    where
        I: IntoIterator<Item = M>,
        M: Into<Value>,
    {
        self.buffer.push_errors(key, messages)
    }

    pub fn remove_error(&mut self, key: &str) -> &mut Self {
        self.buffer.remove_error(key);
        self
    }

    pub fn remove_errors(&mut self) -> &mut Self {
        self.buffer.remove_errors();
        self
    }

    // ── Events ─────────────────────────────────────────────────────────────

    pub fn on<F>(&mut self, kind: EventKind, listener: F) -> u64
    where
        F: FnMut(&Event) + 'static,
    {
        self.buffer.on(kind, listener)
    }

    pub fn off(&mut self, kind: EventKind, listener_id: u64) -> bool {
        self.buffer.off(kind, listener_id)
    }
}
