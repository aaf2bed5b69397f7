//! Validator Node - One rule bound to one data path.
//!
//! The predicate runs inside a `Derived`, so it is only invoked when a result
//! is read after one of the store paths it read has changed. Deferred outcomes
//! are spawned on the configured executor; the node reports pending until the
//! settlement for the latest invocation arrives.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures::future::{abortable, AbortHandle};
use futures::task::LocalSpawnExt;
use serde_json::Value;
use spark_signals::{derived, signal, Derived, Signal};
use tracing::debug;

use super::builder::Wiring;
use super::location::Location;
use crate::error::ValidationError;
use crate::rules::{Context, DeferredCheck, Outcome, Rule};
use crate::store::Store;
use crate::types::Path;

// =============================================================================
// Evaluation State
// =============================================================================

/// Cached result of one predicate invocation.
#[derive(Debug, Clone, PartialEq)]
enum Evaluation {
    Settled(bool),
    /// Waiting for the settlement tagged with this generation.
    Deferred(u64),
    Failed(ValidationError),
}

/// Result of a deferred invocation, written on a later executor turn.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Settlement {
    generation: u64,
    passed: bool,
}

/// State shared between the node, its derived and its in-flight task.
struct Shared {
    name: String,
    rule: Rule,
    location: Rc<Location>,
    store: Store,
    wiring: Wiring,
    settled: Signal<Option<Settlement>>,
    latest: Cell<u64>,
    inflight: RefCell<Option<AbortHandle>>,
}

impl Shared {
    /// Forget any outstanding invocation.
    fn supersede(&self) -> u64 {
        let generation = self.latest.get() + 1;
        self.latest.set(generation);
        if let Some(task) = self.inflight.borrow_mut().take() {
            task.abort();
        }
        generation
    }

    fn evaluate(self: &Rc<Self>) -> Evaluation {
        let path = self.location.path();
        let value = self.store.get(&path).unwrap_or(Value::Null);
        let ctx = Context::new(&self.store, &path);
        debug!(rule = %self.name, path = %path, "evaluating rule");

        match self.rule.evaluate(&value, &ctx) {
            Ok(Outcome::Ready(passed)) => {
                self.supersede();
                Evaluation::Settled(passed)
            }
            Ok(Outcome::Deferred(check)) => self.schedule(check, &path),
            Err(err) => {
                self.supersede();
                Evaluation::Failed(ValidationError::Rule {
                    rule: self.name.clone(),
                    path: path.to_string(),
                    message: err.to_string(),
                })
            }
        }
    }

    fn schedule(self: &Rc<Self>, check: DeferredCheck, path: &Path) -> Evaluation {
        let Some(spawner) = self.wiring.config.spawner() else {
            return Evaluation::Failed(ValidationError::NoScheduler {
                rule: self.name.clone(),
                path: path.to_string(),
            });
        };

        let generation = self.supersede();
        let (check, handle) = abortable(check);
        let shared = Rc::downgrade(self);
        let label = path.to_string();

        let task = async move {
            // Aborted: superseded or torn down
            let Ok(result) = check.await else {
                return;
            };
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let passed = match result {
                Ok(passed) => passed,
                Err(err) => {
                    debug!(
                        rule = %shared.name,
                        path = %label,
                        error = %err,
                        "deferred rule rejected"
                    );
                    false
                }
            };
            if shared.latest.get() == generation {
                debug!(rule = %shared.name, path = %label, passed, "deferred rule settled");
                shared.settled.set(Some(Settlement { generation, passed }));
            }
        };

        match spawner.spawn_local(task) {
            Ok(()) => {
                *self.inflight.borrow_mut() = Some(handle);
                Evaluation::Deferred(generation)
            }
            Err(err) => Evaluation::Failed(ValidationError::Schedule {
                rule: self.name.clone(),
                path: path.to_string(),
                message: err.to_string(),
            }),
        }
    }
}

// =============================================================================
// Rule Node
// =============================================================================

/// A rule of a field, evaluated lazily against the field's current value.
pub struct RuleNode {
    shared: Rc<Shared>,
    evaluation: Derived<Evaluation>,
}

impl RuleNode {
    pub(crate) fn new(
        name: &str,
        rule: Rule,
        location: Rc<Location>,
        wiring: &Wiring,
    ) -> Rc<Self> {
        let shared = Rc::new(Shared {
            name: name.to_string(),
            rule,
            location,
            store: wiring.store.clone(),
            wiring: wiring.clone(),
            settled: signal(None),
            latest: Cell::new(0),
            inflight: RefCell::new(None),
        });

        let weak = Rc::downgrade(&shared);
        let evaluation = derived(move || match weak.upgrade() {
            Some(shared) => shared.evaluate(),
            None => Evaluation::Settled(true),
        });

        Rc::new(Self { shared, evaluation })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn rule(&self) -> &Rule {
        &self.shared.rule
    }

    /// Data path the rule currently validates.
    pub fn path(&self) -> Path {
        self.shared.location.path()
    }

    /// Parameter payload of the rule (see [`Rule::params`]).
    pub fn params(&self) -> Value {
        self.shared.rule.params()
    }

    /// Whether the check passes. Deferred checks pass until they settle.
    pub fn passed(&self) -> Result<bool, ValidationError> {
        match self.evaluation.get() {
            Evaluation::Settled(passed) => Ok(passed),
            Evaluation::Deferred(generation) => Ok(match self.shared.settled.get() {
                Some(settlement) if settlement.generation == generation => settlement.passed,
                _ => true,
            }),
            Evaluation::Failed(err) => Err(err),
        }
    }

    pub fn invalid(&self) -> Result<bool, ValidationError> {
        Ok(!self.passed()?)
    }

    /// Whether a deferred check of the latest invocation is outstanding.
    pub fn pending(&self) -> Result<bool, ValidationError> {
        match self.evaluation.get() {
            Evaluation::Settled(_) => Ok(false),
            Evaluation::Deferred(generation) => Ok(!matches!(
                self.shared.settled.get(),
                Some(settlement) if settlement.generation == generation
            )),
            Evaluation::Failed(err) => Err(err),
        }
    }

    /// Abort outstanding work. Later settlements are ignored.
    pub(crate) fn dispose(&self) {
        self.shared.supersede();
    }
}

impl Drop for RuleNode {
    fn drop(&mut self) {
        self.dispose();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidationConfig;
    use crate::error::RuleError;
    use futures::channel::oneshot;
    use futures::executor::LocalPool;
    use serde_json::json;
    use std::rc::Weak;

    fn wiring(store: &Store, config: ValidationConfig) -> Wiring {
        Wiring {
            store: store.clone(),
            config: Rc::new(config),
            root: Weak::new(),
        }
    }

    fn field(name: &str) -> Rc<Location> {
        Location::key(&Location::root(), name)
    }

    #[test]
    fn test_lazy_and_cached() {
        let store = Store::new(json!({ "age": 3 }));
        let calls = Rc::new(Cell::new(0));
        let rule = {
            let calls = calls.clone();
            Rule::check(move |value| {
                calls.set(calls.get() + 1);
                value.as_i64().is_some_and(|n| n % 2 == 0)
            })
        };
        let wired = wiring(&store, ValidationConfig::new());
        let node = RuleNode::new("isEven", rule, field("age"), &wired);

        assert_eq!(calls.get(), 0);
        assert_eq!(node.invalid(), Ok(true));
        assert_eq!(node.invalid(), Ok(true));
        assert_eq!(node.pending(), Ok(false));
        assert_eq!(calls.get(), 1);

        store.set(&Path::parse("age"), json!(4)).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(node.invalid(), Ok(false));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_sync_error_reaches_reader() {
        let store = Store::new(json!({ "age": 3 }));
        let rule = Rule::new(|_, _| Err(RuleError::new("boom")));
        let wired = wiring(&store, ValidationConfig::new());
        let node = RuleNode::new("explodes", rule, field("age"), &wired);

        assert_eq!(
            node.invalid(),
            Err(ValidationError::Rule {
                rule: "explodes".into(),
                path: "age".into(),
                message: "boom".into(),
            })
        );
    }

    #[test]
    fn test_deferred_without_scheduler() {
        let store = Store::new(json!({ "name": "x" }));
        let rule = Rule::new(|_, _| Ok(Outcome::deferred(async { Ok(true) })));
        let wired = wiring(&store, ValidationConfig::new());
        let node = RuleNode::new("remote", rule, field("name"), &wired);

        assert_eq!(
            node.pending(),
            Err(ValidationError::NoScheduler { rule: "remote".into(), path: "name".into() })
        );
    }

    #[test]
    fn test_only_latest_settlement_applies() {
        let mut pool = LocalPool::new();
        let store = Store::new(json!({ "name": "a" }));
        let senders: Rc<RefCell<Vec<oneshot::Sender<bool>>>> = Rc::new(RefCell::new(Vec::new()));

        let rule = {
            let senders = senders.clone();
            Rule::new(move |_, _| {
                let (tx, rx) = oneshot::channel();
                senders.borrow_mut().push(tx);
                Ok(Outcome::deferred(async move {
                    rx.await.map_err(|_| RuleError::new("dropped"))
                }))
            })
        };
        let config = ValidationConfig::new().with_spawner(pool.spawner());
        let node = RuleNode::new("remote", rule, field("name"), &wiring(&store, config));

        assert_eq!(node.pending(), Ok(true));
        store.set(&Path::parse("name"), json!("b")).unwrap();
        assert_eq!(node.pending(), Ok(true));

        // The first invocation was aborted, its answer goes nowhere
        let first = senders.borrow_mut().remove(0);
        let _ = first.send(false);
        pool.run_until_stalled();
        assert_eq!(node.pending(), Ok(true));
        assert_eq!(node.invalid(), Ok(false));

        let second = senders.borrow_mut().remove(0);
        second.send(false).unwrap();
        pool.run_until_stalled();
        assert_eq!(node.pending(), Ok(false));
        assert_eq!(node.invalid(), Ok(true));
    }

    #[test]
    fn test_dispose_ignores_late_settlement() {
        let mut pool = LocalPool::new();
        let store = Store::new(json!({ "name": "a" }));
        let (tx, rx) = oneshot::channel::<bool>();
        let rx = RefCell::new(Some(rx));
        let rule = Rule::new(move |_, _| {
            let rx = rx.borrow_mut().take();
            Ok(Outcome::deferred(async move {
                match rx {
                    Some(rx) => rx.await.map_err(|_| RuleError::new("dropped")),
                    None => Ok(true),
                }
            }))
        });
        let config = ValidationConfig::new().with_spawner(pool.spawner());
        let node = RuleNode::new("remote", rule, field("name"), &wiring(&store, config));

        assert_eq!(node.pending(), Ok(true));
        node.dispose();
        let _ = tx.send(false);
        pool.run_until_stalled();
        assert_eq!(node.pending(), Ok(true));
    }
}
