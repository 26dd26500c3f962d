use std::fmt;

use changeset_value::Value;

use crate::validation::PendingVerdict;

/// A validation whose verdict has not resolved yet.
pub(crate) struct PendingValidation {
    pub key: String,
    pub value: Value,
    pub verdict: PendingVerdict,
}

/// In-flight validations, in registration order.
///
/// A key may be registered more than once; every registration is awaited
/// and applied in order, so the latest write's verdict wins.
#[derive(Default)]
pub(crate) struct RunningValidations {
    pending: Vec<PendingValidation>,
}

impl fmt::Debug for RunningValidations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.pending.iter().map(|p| p.key.as_str()))
            .finish()
    }
}

impl RunningValidations {
    pub fn register(&mut self, key: &str, value: Value, verdict: PendingVerdict) {
        self.pending.push(PendingValidation {
            key: key.to_string(),
            value,
            verdict,
        });
    }

    /// Whether `key` (or, without a key, anything) is still validating.
    pub fn is_validating(&self, key: Option<&str>) -> bool {
        match key {
            Some(key) => self.pending.iter().any(|p| p.key == key),
            None => !self.pending.is_empty(),
        }
    }

    pub fn take(&mut self) -> Vec<PendingValidation> {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::Verdict;
    use futures::FutureExt;

    #[test]
    fn test_register_and_take() {
        let mut running = RunningValidations::default();
        assert!(!running.is_validating(None));

        running.register("name", Value::from("x"), async { Ok(Verdict::Valid) }.boxed_local());
        running.register("name", Value::from("y"), async { Ok(Verdict::Valid) }.boxed_local());
        assert!(running.is_validating(None));
        assert!(running.is_validating(Some("name")));
        assert!(!running.is_validating(Some("email")));

        let batch = running.take();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1].value, Value::from("y"));
        assert!(!running.is_validating(None));
    }
}
