//! Validators and their results.
//!
//! A validator sees the key being written, the new and old values, the
//! current (normalized) changes and the content, and answers with a
//! [`Verdict`] either immediately or through a future.

use std::fmt;
use std::future::Future;
use std::rc::Rc;

use changeset_value::{split_path, Value};
use futures::future::{join_all, ready, FutureExt, LocalBoxFuture};
use indexmap::IndexMap;

use crate::err::Validation;
use crate::error::ValidatorError;

// ── Results ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Valid,
    Invalid(Validation),
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid)
    }
}

/// Exactly `true` or `[true]` is valid; anything else is the failure message.
impl From<Value> for Verdict {
    fn from(value: Value) -> Self {
        match value {
            Value::Bool(true) => Verdict::Valid,
            Value::Array(items) if items == [Value::Bool(true)] => Verdict::Valid,
            other => Verdict::Invalid(Validation::from_value(other)),
        }
    }
}

impl From<bool> for Verdict {
    fn from(valid: bool) -> Self {
        Verdict::from(Value::Bool(valid))
    }
}

impl From<&str> for Verdict {
    fn from(message: &str) -> Self {
        Verdict::Invalid(Validation::from(message))
    }
}

impl From<String> for Verdict {
    fn from(message: String) -> Self {
        Verdict::Invalid(Validation::from(message))
    }
}

impl From<Validation> for Verdict {
    fn from(validation: Validation) -> Self {
        Verdict::Invalid(validation)
    }
}

pub type PendingVerdict = LocalBoxFuture<'static, Result<Verdict, ValidatorError>>;

pub enum ValidatorOutput {
    Ready(Verdict),
    Pending(PendingVerdict),
}

impl ValidatorOutput {
    pub fn ready(verdict: impl Into<Verdict>) -> Self {
        ValidatorOutput::Ready(verdict.into())
    }

    pub fn valid() -> Self {
        ValidatorOutput::Ready(Verdict::Valid)
    }

    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Result<Verdict, ValidatorError>> + 'static,
    {
        ValidatorOutput::Pending(future.boxed_local())
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ValidatorOutput::Pending(_))
    }
}

impl fmt::Debug for ValidatorOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidatorOutput::Ready(verdict) => f.debug_tuple("Ready").field(verdict).finish(),
            ValidatorOutput::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

// ── Validators ─────────────────────────────────────────────────────────────

/// What a validator is told about the write being checked.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'c> {
    pub key: &'c str,
    pub new_value: &'c Value,
    pub old_value: &'c Value,
    /// Buffered changes in plain form.
    pub changes: &'c Value,
    pub content: &'c Value,
}

pub trait Validator {
    fn validate(&self, ctx: &ValidationContext<'_>) -> ValidatorOutput;
}

impl<F> Validator for F
where
    F: Fn(&ValidationContext<'_>) -> ValidatorOutput,
{
    fn validate(&self, ctx: &ValidationContext<'_>) -> ValidatorOutput {
        self(ctx)
    }
}

/// Boxes a closure as a shareable validator.
pub fn validator<F>(f: F) -> Rc<dyn Validator>
where
    F: Fn(&ValidationContext<'_>) -> ValidatorOutput + 'static,
{
    Rc::new(f)
}

#[derive(Clone)]
pub enum ValidatorEntry {
    One(Rc<dyn Validator>),
    Many(Vec<Rc<dyn Validator>>),
    Nested(ValidatorMap),
}

impl fmt::Debug for ValidatorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidatorEntry::One(_) => f.write_str("One(..)"),
            ValidatorEntry::Many(list) => write!(f, "Many({})", list.len()),
            ValidatorEntry::Nested(map) => f.debug_tuple("Nested").field(map).finish(),
        }
    }
}

impl From<Rc<dyn Validator>> for ValidatorEntry {
    fn from(validator: Rc<dyn Validator>) -> Self {
        ValidatorEntry::One(validator)
    }
}

impl From<Vec<Rc<dyn Validator>>> for ValidatorEntry {
    fn from(validators: Vec<Rc<dyn Validator>>) -> Self {
        ValidatorEntry::Many(validators)
    }
}

impl From<ValidatorMap> for ValidatorEntry {
    fn from(map: ValidatorMap) -> Self {
        ValidatorEntry::Nested(map)
    }
}

/// Validators keyed by field, possibly nested and possibly several per key.
///
/// Keys may themselves be dotted (`"person.name"`) or nest through
/// [`ValidatorEntry::Nested`]; both address the same field.
#[derive(Clone, Default)]
pub struct ValidatorMap {
    entries: IndexMap<String, ValidatorEntry>,
}

impl fmt::Debug for ValidatorMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

impl ValidatorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, entry: impl Into<ValidatorEntry>) -> Self {
        self.insert(key, entry);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, entry: impl Into<ValidatorEntry>) {
        self.entries.insert(key.into(), entry.into());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dotted keys of every validated field, in declaration order.
    pub fn keys(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_keys("", &mut out);
        out
    }

    fn collect_keys(&self, prefix: &str, out: &mut Vec<String>) {
        for (key, entry) in &self.entries {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };
            match entry {
                ValidatorEntry::Nested(map) => map.collect_keys(&path, out),
                _ => out.push(path),
            }
        }
    }

    /// Validator(s) registered for a dotted key.
    pub fn lookup(&self, key: &str) -> Option<&ValidatorEntry> {
        let segments = split_path(key);
        self.lookup_segments(&segments)
    }

    fn lookup_segments(&self, segments: &[&str]) -> Option<&ValidatorEntry> {
        for split in (1..=segments.len()).rev() {
            let head = segments[..split].join(".");
            match self.entries.get(&head) {
                Some(ValidatorEntry::Nested(map)) if split < segments.len() => {
                    if let Some(found) = map.lookup_segments(&segments[split..]) {
                        return Some(found);
                    }
                }
                Some(entry @ (ValidatorEntry::One(_) | ValidatorEntry::Many(_)))
                    if split == segments.len() =>
                {
                    return Some(entry);
                }
                _ => {}
            }
        }
        None
    }
}

/// A map validates by dispatching on the key; unknown keys are valid.
impl Validator for ValidatorMap {
    fn validate(&self, ctx: &ValidationContext<'_>) -> ValidatorOutput {
        match self.lookup(ctx.key) {
            Some(ValidatorEntry::One(validator)) => validator.validate(ctx),
            Some(ValidatorEntry::Many(validators)) => validate_all(validators, ctx),
            Some(ValidatorEntry::Nested(_)) | None => ValidatorOutput::valid(),
        }
    }
}

/// Runs several validators for one key.
///
/// Failures are collected into one `Validation::Many`; with no failures the
/// key is valid. If any validator is pending the whole result is pending,
/// and resolves to the first error a pending validator fails with.
pub fn validate_all(validators: &[Rc<dyn Validator>], ctx: &ValidationContext<'_>) -> ValidatorOutput {
    let outputs: Vec<ValidatorOutput> = validators.iter().map(|v| v.validate(ctx)).collect();
    if !outputs.iter().any(ValidatorOutput::is_pending) {
        let verdicts = outputs.into_iter().filter_map(|output| match output {
            ValidatorOutput::Ready(verdict) => Some(verdict),
            ValidatorOutput::Pending(_) => None,
        });
        return ValidatorOutput::Ready(combine(verdicts));
    }
    let futures: Vec<PendingVerdict> = outputs
        .into_iter()
        .map(|output| match output {
            ValidatorOutput::Ready(verdict) => ready(Ok(verdict)).boxed_local(),
            ValidatorOutput::Pending(future) => future,
        })
        .collect();
    ValidatorOutput::pending(async move {
        let verdicts = join_all(futures)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;
        Ok(combine(verdicts.into_iter()))
    })
}

fn combine(verdicts: impl Iterator<Item = Verdict>) -> Verdict {
    let failures: Vec<Value> = verdicts
        .filter_map(|verdict| match verdict {
            Verdict::Valid => None,
            Verdict::Invalid(validation) => Some(validation.into_vec()),
        })
        .flatten()
        .collect();
    if failures.is_empty() {
        Verdict::Valid
    } else {
        Verdict::Invalid(Validation::Many(failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    fn ctx_for<'c>(key: &'c str, value: &'c Value, empty: &'c Value) -> ValidationContext<'c> {
        ValidationContext {
            key,
            new_value: value,
            old_value: empty,
            changes: empty,
            content: empty,
        }
    }

    fn present() -> Rc<dyn Validator> {
        validator(|ctx: &ValidationContext<'_>| {
            if ctx.new_value.as_str().map_or(false, |s| !s.is_empty()) {
                ValidatorOutput::valid()
            } else {
                ValidatorOutput::ready("can't be blank")
            }
        })
    }

    fn short() -> Rc<dyn Validator> {
        validator(|ctx: &ValidationContext<'_>| {
            if ctx.new_value.as_str().map_or(0, str::len) < 5 {
                ValidatorOutput::valid()
            } else {
                ValidatorOutput::ready("too long")
            }
        })
    }

    fn unwrap_ready(output: ValidatorOutput) -> Verdict {
        match output {
            ValidatorOutput::Ready(verdict) => verdict,
            ValidatorOutput::Pending(future) => block_on(future).unwrap(),
        }
    }

    #[test]
    fn test_verdict_from_value() {
        assert_eq!(Verdict::from(Value::Bool(true)), Verdict::Valid);
        assert_eq!(Verdict::from(Value::Array(vec![Value::Bool(true)])), Verdict::Valid);
        assert_eq!(
            Verdict::from(Value::Bool(false)),
            Verdict::Invalid(Validation::One(Value::Bool(false)))
        );
        assert_eq!(Verdict::from("bad"), Verdict::Invalid(Validation::from("bad")));
        assert!(!Verdict::from(Value::Array(vec![Value::Bool(true), Value::Bool(true)])).is_valid());
    }

    #[test]
    fn test_map_lookup() {
        let map = ValidatorMap::new()
            .with("name", present())
            .with("person", ValidatorMap::new().with("email", present()))
            .with("address.zip", vec![present(), short()]);

        assert!(matches!(map.lookup("name"), Some(ValidatorEntry::One(_))));
        assert!(matches!(map.lookup("person.email"), Some(ValidatorEntry::One(_))));
        assert!(matches!(map.lookup("address.zip"), Some(ValidatorEntry::Many(_))));
        assert!(map.lookup("person").is_none());
        assert!(map.lookup("other").is_none());
        assert_eq!(map.keys(), vec!["name", "person.email", "address.zip"]);
    }

    #[test]
    fn test_map_validates_by_key() {
        let map = ValidatorMap::new().with("name", present());
        let empty = Value::Undefined;
        let blank = Value::from("");
        assert_eq!(
            unwrap_ready(map.validate(&ctx_for("name", &blank, &empty))),
            Verdict::from("can't be blank")
        );
        assert_eq!(
            unwrap_ready(map.validate(&ctx_for("unknown", &blank, &empty))),
            Verdict::Valid
        );
    }

    #[test]
    fn test_validate_all_collects_failures() {
        let validators = vec![present(), short()];
        let empty = Value::Undefined;
        let ok = Value::from("Jim");
        assert_eq!(
            unwrap_ready(validate_all(&validators, &ctx_for("k", &ok, &empty))),
            Verdict::Valid
        );

        let long = Value::from("Jimothy");
        assert_eq!(
            unwrap_ready(validate_all(&validators, &ctx_for("k", &long, &empty))),
            Verdict::Invalid(Validation::from(vec!["too long"]))
        );
    }

    #[test]
    fn test_validate_all_pending() {
        let slow = validator(|_: &ValidationContext<'_>| {
            ValidatorOutput::pending(async { Ok(Verdict::from("slow says no")) })
        });
        let validators = vec![present(), slow];
        let empty = Value::Undefined;
        let blank = Value::from("");

        let output = validate_all(&validators, &ctx_for("k", &blank, &empty));
        assert!(output.is_pending());
        assert_eq!(
            unwrap_ready(output),
            Verdict::Invalid(Validation::from(vec!["can't be blank", "slow says no"]))
        );
    }

    #[test]
    fn test_validate_all_pending_error_propagates() {
        let broken = validator(|_: &ValidationContext<'_>| {
            ValidatorOutput::pending(async { Err(ValidatorError::new("lookup failed")) })
        });
        let validators = vec![present(), broken];
        let empty = Value::Undefined;
        let blank = Value::from("");

        let ValidatorOutput::Pending(future) =
            validate_all(&validators, &ctx_for("k", &blank, &empty))
        else {
            panic!("expected a pending output");
        };
        assert_eq!(block_on(future), Err(ValidatorError::new("lookup failed")));
    }
}
