//! Rules - Predicates with parameter metadata.
//!
//! A [`Rule`] wraps a predicate `Fn(&Value, &Context) -> Result<Outcome, RuleError>`
//! together with its static parameters and, for composed rules, the rules it
//! was built from. The metadata is attached by wrapping, so `params()` can be
//! reported without evaluating anything.
//!
//! - [`builtin`] - `required`, `min_length`, `between`, `same_as`, ...
//! - [`compose`] - `and`, `or`, `not` (carry `$sub` params)
//!
//! # Example
//!
//! ```ignore
//! use serde_json::json;
//! use spark_validation::rules::{Outcome, Rule};
//!
//! let is_even = Rule::check(|v| v.as_i64().is_some_and(|n| n % 2 == 0))
//!     .with_params(json!({ "type": "isEven" }));
//!
//! let unique = Rule::new(|value, _ctx| {
//!     let name = value.as_str().unwrap_or_default().to_string();
//!     Ok(Outcome::deferred(async move { lookup_is_free(name).await }))
//! });
//! ```

mod builtin;
mod compose;

pub use builtin::*;
pub use compose::*;

use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures::future::{FutureExt, LocalBoxFuture};
use serde_json::{Map, Value};

use crate::error::RuleError;
use crate::store::Store;
use crate::types::Path;

// =============================================================================
// Outcome
// =============================================================================

/// Future produced by a deferred rule. `Err` counts as a failed check.
pub type DeferredCheck = LocalBoxFuture<'static, Result<bool, RuleError>>;

/// Result of invoking a predicate.
pub enum Outcome {
    /// Known synchronously.
    Ready(bool),
    /// Settles on a later scheduler turn; the rule is pending until then.
    Deferred(DeferredCheck),
}

impl Outcome {
    pub fn deferred(check: impl Future<Output = Result<bool, RuleError>> + 'static) -> Self {
        Outcome::Deferred(check.boxed_local())
    }
}

impl From<bool> for Outcome {
    fn from(passed: bool) -> Self {
        Outcome::Ready(passed)
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Ready(passed) => f.debug_tuple("Ready").field(passed).finish(),
            Outcome::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

// =============================================================================
// Context
// =============================================================================

/// What a predicate can see besides its own value.
///
/// Every accessor is a tracked store read, so a rule only depends on the data
/// it actually looks at.
pub struct Context<'a> {
    store: &'a Store,
    path: &'a Path,
}

impl<'a> Context<'a> {
    pub(crate) fn new(store: &'a Store, path: &'a Path) -> Self {
        Self { store, path }
    }

    /// Data path of the value under validation.
    pub fn path(&self) -> &Path {
        self.path
    }

    /// The model containing the value (the object for a field, the sequence
    /// for a collection element). `None` at the root.
    pub fn parent(&self) -> Option<Value> {
        self.store.get(&self.path.parent()?)
    }

    /// A field next to the value in its parent model.
    pub fn sibling(&self, key: &str) -> Option<Value> {
        self.store.get(&self.path.parent()?.join(key))
    }

    /// The whole data model.
    pub fn root(&self) -> Value {
        self.store.root()
    }

    /// Any value by absolute path.
    pub fn lookup(&self, path: &Path) -> Option<Value> {
        self.store.get(path)
    }
}

// =============================================================================
// Rule
// =============================================================================

/// Predicate signature accepted by [`Rule::new`].
pub type Predicate = Rc<dyn Fn(&Value, &Context<'_>) -> Result<Outcome, RuleError>>;

/// A predicate plus the metadata reported through `params`.
#[derive(Clone)]
pub struct Rule {
    predicate: Predicate,
    params: Option<Map<String, Value>>,
    sub: Vec<Rule>,
}

impl Rule {
    pub fn new(
        predicate: impl Fn(&Value, &Context<'_>) -> Result<Outcome, RuleError> + 'static,
    ) -> Self {
        Self {
            predicate: Rc::new(predicate),
            params: None,
            sub: Vec::new(),
        }
    }

    /// Infallible synchronous check on the value alone.
    pub fn check(check: impl Fn(&Value) -> bool + 'static) -> Self {
        Self::new(move |value, _| Ok(Outcome::Ready(check(value))))
    }

    /// Infallible synchronous check that may look at surrounding data.
    pub fn contextual(check: impl Fn(&Value, &Context<'_>) -> bool + 'static) -> Self {
        Self::new(move |value, ctx| Ok(Outcome::Ready(check(value, ctx))))
    }

    /// Attach static parameters. Object keys are merged into any existing
    /// params; non-object payloads carry no keys and are ignored.
    pub fn with_params(mut self, params: Value) -> Self {
        if let Value::Object(extra) = params {
            let merged = self.params.get_or_insert_with(Map::new);
            for (key, value) in extra {
                merged.insert(key, value);
            }
        }
        self
    }

    /// Record the rules this one was composed from.
    pub fn with_sub(mut self, sub: Vec<Rule>) -> Self {
        self.sub = sub;
        self
    }

    /// Invoke the predicate.
    pub fn evaluate(&self, value: &Value, ctx: &Context<'_>) -> Result<Outcome, RuleError> {
        (self.predicate)(value, ctx)
    }

    pub fn static_params(&self) -> Option<&Map<String, Value>> {
        self.params.as_ref()
    }

    pub fn sub_rules(&self) -> &[Rule] {
        &self.sub
    }

    /// Parameter payload: `null` without static params or sub-rules,
    /// otherwise the static params with `$sub` merged in for compositions.
    pub fn params(&self) -> Value {
        if self.params.is_none() && self.sub.is_empty() {
            return Value::Null;
        }
        let mut params = self.params.clone().unwrap_or_default();
        if !self.sub.is_empty() {
            params.insert(
                "$sub".to_string(),
                Value::Array(self.sub.iter().map(Rule::params).collect()),
            );
        }
        Value::Object(params)
    }

    /// True if both rules wrap the same predicate instance.
    pub fn same_predicate(&self, other: &Rule) -> bool {
        Rc::ptr_eq(&self.predicate, &other.predicate)
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("params", &self.params)
            .field("sub", &self.sub.len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
