use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use buffered_changeset::{
    validator, Changeset, ChangesetError, Config, Event, EventKind, Persist, Validation,
    ValidationContext, Validator, ValidatorError, ValidatorMap, ValidatorOutput, Value, Verdict,
};
use futures::executor::block_on;
use futures::future::{FutureExt, LocalBoxFuture};
use serde_json::json;

fn required() -> Rc<dyn Validator> {
    validator(|ctx: &ValidationContext<'_>| match ctx.new_value.as_str() {
        Some(s) if !s.is_empty() => ValidatorOutput::valid(),
        _ => ValidatorOutput::ready("can't be blank"),
    })
}

fn max_len(limit: usize) -> Rc<dyn Validator> {
    validator(move |ctx: &ValidationContext<'_>| {
        if ctx.new_value.as_str().map_or(0, str::len) <= limit {
            ValidatorOutput::valid()
        } else {
            ValidatorOutput::ready(format!("at most {limit} characters"))
        }
    })
}

fn async_email() -> Rc<dyn Validator> {
    validator(|ctx: &ValidationContext<'_>| {
        let ok = ctx.new_value.as_str().map_or(false, |s| s.contains('@'));
        ValidatorOutput::pending(async move {
            Ok(if ok {
                Verdict::Valid
            } else {
                Verdict::from("must contain @")
            })
        })
    })
}

fn record_events(cs: &mut Changeset) -> Rc<RefCell<Vec<String>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    for kind in [
        EventKind::BeforeValidation,
        EventKind::AfterValidation,
        EventKind::AfterRollback,
        EventKind::Execute,
    ] {
        let log = Rc::clone(&log);
        cs.on(kind, move |event: &Event| {
            let entry = match event.key() {
                Some(key) => format!("{:?}:{key}", event.kind()),
                None => format!("{:?}", event.kind()),
            };
            log.borrow_mut().push(entry);
        });
    }
    log
}

#[test]
fn test_multiple_validators_per_key() {
    let map = ValidatorMap::new().with("name", vec![required(), max_len(3)]);
    let mut cs = Changeset::with_validations(json!({"name": "Jim"}), map);

    cs.set("name", "Jimothy").unwrap();
    assert_eq!(
        cs.errors()[0].validation,
        Validation::from(vec!["at most 3 characters"])
    );

    cs.set("name", "Bo").unwrap();
    assert!(cs.is_valid());
}

#[test]
fn test_nested_validator_map() {
    let map = ValidatorMap::new().with(
        "person",
        ValidatorMap::new().with("address", ValidatorMap::new().with("city", required())),
    );
    let mut cs = Changeset::with_validations(json!({"person": {"address": {"city": "A"}}}), map);
    cs.set("person.address.city", "").unwrap();
    assert_eq!(cs.errors()[0].key, "person.address.city");
    assert_eq!(
        cs.error().to_json(),
        json!({"person": {"address": {"city": {"value": "", "validation": "can't be blank"}}}})
    );
}

#[test]
fn test_validator_sees_context() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&seen);
    let spy = validator(move |ctx: &ValidationContext<'_>| {
        log.borrow_mut().push((
            ctx.key.to_string(),
            ctx.new_value.clone(),
            ctx.old_value.clone(),
            ctx.changes.to_json(),
        ));
        ValidatorOutput::valid()
    });
    let mut cs = Changeset::with_options(
        json!({"name": "Jim"}),
        Some(spy),
        ValidatorMap::new(),
        Config::default(),
    );
    cs.set("name", "Bob").unwrap();

    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "name");
    assert_eq!(seen[0].1, Value::from("Bob"));
    assert_eq!(seen[0].2, Value::from("Jim"));
    assert_eq!(seen[0].3, json!({"name": "Bob"}));
}

#[test]
fn test_async_validations_settle_as_batch() {
    let map = ValidatorMap::new()
        .with("email", async_email())
        .with("backup", async_email());
    let mut cs = Changeset::with_validations(json!({}), map);

    cs.set("email", "nope").unwrap();
    cs.set("backup", "ok@example.com").unwrap();
    assert!(cs.is_validating(None));
    assert!(cs.is_validating(Some("email")));
    assert!(cs.is_validating(Some("backup")));
    assert!(cs.is_valid());

    block_on(cs.settle()).unwrap();
    assert!(!cs.is_validating(None));
    let keys: Vec<String> = cs.errors().into_iter().map(|e| e.key).collect();
    assert_eq!(keys, vec!["email"]);
}

#[test]
fn test_latest_set_wins_after_settle() {
    let map = ValidatorMap::new().with("email", async_email());
    let mut cs = Changeset::with_validations(json!({}), map);

    cs.set("email", "nope").unwrap();
    cs.set("email", "yes@example.com").unwrap();
    block_on(cs.settle()).unwrap();
    assert!(cs.is_valid());
    assert_eq!(cs.get("email").into_value(), Value::from("yes@example.com"));
}

#[test]
fn test_validate_waits_for_everything() {
    let map = ValidatorMap::new()
        .with("name", required())
        .with("email", async_email());
    let mut cs = Changeset::with_validations(json!({"name": "", "email": "x"}), map);

    block_on(cs.validate(&[])).unwrap();
    assert!(!cs.is_validating(None));
    let keys: Vec<String> = cs.errors().into_iter().map(|e| e.key).collect();
    assert_eq!(keys, vec!["name", "email"]);

    cs.set("name", "Jim").unwrap();
    block_on(cs.validate(&["name"])).unwrap();
    assert_eq!(cs.errors().len(), 1);
}

#[test]
fn test_failing_async_validator_propagates() {
    let broken = validator(|_: &ValidationContext<'_>| {
        ValidatorOutput::pending(async { Err(ValidatorError::new("service down")) })
    });
    let map = ValidatorMap::new().with("email", broken);
    let mut cs = Changeset::with_validations(json!({}), map);

    cs.set("email", "a@b").unwrap();
    let result = block_on(cs.settle());
    assert!(matches!(
        result,
        Err(ChangesetError::Validator(ref e)) if e.message() == "service down"
    ));
    assert!(cs.is_valid());
    assert!(!cs.is_validating(None));
}

#[test]
fn test_failing_validator_in_list_propagates() {
    let broken = validator(|_: &ValidationContext<'_>| {
        ValidatorOutput::pending(async { Err(ValidatorError::new("service down")) })
    });
    let map = ValidatorMap::new().with("email", vec![broken, async_email()]);
    let mut cs = Changeset::with_validations(json!({}), map);

    cs.set("email", "a@b").unwrap();
    let result = block_on(cs.settle());
    assert!(matches!(
        result,
        Err(ChangesetError::Validator(ref e)) if e.message() == "service down"
    ));
    assert!(cs.is_valid());
    assert!(!cs.is_validating(None));

    let result = block_on(cs.validate(&["email"]));
    assert!(matches!(result, Err(ChangesetError::Validator(_))));
}

#[test]
fn test_execute_does_not_wait_for_pending_validation() {
    let map = ValidatorMap::new().with("email", async_email());
    let mut cs = Changeset::with_validations(json!({"email": "a@b"}), map);

    cs.set("email", "bad").unwrap();
    cs.execute();
    assert_eq!(cs.data().to_json(), json!({"email": "bad"}));

    block_on(cs.settle()).unwrap();
    assert!(cs.is_invalid());
}

#[test]
fn test_event_order() {
    let map = ValidatorMap::new()
        .with("name", required())
        .with("email", async_email());
    let mut cs = Changeset::with_validations(json!({}), map);
    let log = record_events(&mut cs);

    cs.set("name", "Jim").unwrap();
    cs.set("email", "a@b").unwrap();
    block_on(cs.settle()).unwrap();
    cs.execute();
    cs.rollback();

    assert_eq!(
        *log.borrow(),
        vec![
            "BeforeValidation:name",
            "AfterValidation:name",
            "BeforeValidation:email",
            "AfterValidation:email",
            "Execute",
            "AfterRollback",
        ]
    );
}

#[test]
fn test_off_stops_delivery() {
    let mut cs = Changeset::new(json!({}));
    let count = Rc::new(RefCell::new(0));
    let c = Rc::clone(&count);
    let id = cs.on(EventKind::Execute, move |_| *c.borrow_mut() += 1);

    cs.execute();
    assert!(cs.off(EventKind::Execute, id));
    cs.execute();
    assert_eq!(*count.borrow(), 1);
}

// ── Save ───────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct StoreDown;

impl fmt::Display for StoreDown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("store down")
    }
}

impl std::error::Error for StoreDown {}

struct MemoryStore {
    saved: RefCell<Vec<serde_json::Value>>,
    fail: bool,
}

impl Persist for MemoryStore {
    type Output = usize;
    type Error = StoreDown;

    fn save<'a>(&'a self, content: &'a Value) -> LocalBoxFuture<'a, Result<usize, StoreDown>> {
        async move {
            if self.fail {
                return Err(StoreDown);
            }
            self.saved.borrow_mut().push(content.to_json());
            Ok(self.saved.borrow().len())
        }
        .boxed_local()
    }
}

#[test]
fn test_save_executes_persists_and_clears() {
    let store = MemoryStore {
        saved: RefCell::new(Vec::new()),
        fail: false,
    };
    let mut cs = Changeset::new(json!({"name": "Jim"}));
    cs.set("name", "Bob").unwrap();
    cs.add_error("email", "required").unwrap();
    cs.remove_error("email");

    let count = block_on(cs.save(&store)).unwrap();
    assert_eq!(count, 1);
    assert_eq!(store.saved.borrow()[0], json!({"name": "Bob"}));
    assert!(cs.is_pristine());
    assert!(cs.is_valid());
}

#[test]
fn test_save_failure_propagates() {
    let store = MemoryStore {
        saved: RefCell::new(Vec::new()),
        fail: true,
    };
    let mut cs = Changeset::new(json!({"name": "Jim"}));
    cs.set("name", "Bob").unwrap();

    let result = block_on(cs.save(&store));
    assert!(matches!(result, Err(ChangesetError::Save(_))));
    assert_eq!(cs.data().to_json(), json!({"name": "Bob"}));
}
