//! Rule composition.
//!
//! Composed rules report their parts under `$sub` in `params`. Deferred parts
//! are joined, so a composition is deferred as soon as one part is.

use futures::future::join_all;
use serde_json::{json, Value};

use super::{Context, DeferredCheck, Outcome, Rule};
use crate::error::RuleError;

/// Split sub-rule outcomes into the synchronous verdicts and the deferred ones.
fn run_all(
    rules: &[Rule],
    value: &Value,
    ctx: &Context<'_>,
) -> Result<(Vec<bool>, Vec<DeferredCheck>), RuleError> {
    let mut ready = Vec::with_capacity(rules.len());
    let mut deferred = Vec::new();
    for rule in rules {
        match rule.evaluate(value, ctx)? {
            Outcome::Ready(passed) => ready.push(passed),
            Outcome::Deferred(check) => deferred.push(check),
        }
    }
    Ok((ready, deferred))
}

/// Passes when every rule passes.
pub fn and(rules: Vec<Rule>) -> Rule {
    let parts = rules.clone();
    Rule::new(move |value, ctx| {
        let (ready, deferred) = run_all(&parts, value, ctx)?;
        if ready.iter().any(|passed| !passed) {
            return Ok(Outcome::Ready(false));
        }
        if deferred.is_empty() {
            return Ok(Outcome::Ready(true));
        }
        Ok(Outcome::deferred(async move {
            let results = join_all(deferred).await;
            Ok(results.into_iter().all(|result| result.unwrap_or(false)))
        }))
    })
    .with_params(json!({ "type": "and" }))
    .with_sub(rules)
}

/// Passes when at least one rule passes.
pub fn or(rules: Vec<Rule>) -> Rule {
    let parts = rules.clone();
    Rule::new(move |value, ctx| {
        let (ready, deferred) = run_all(&parts, value, ctx)?;
        if ready.iter().any(|passed| *passed) {
            return Ok(Outcome::Ready(true));
        }
        if deferred.is_empty() {
            return Ok(Outcome::Ready(false));
        }
        Ok(Outcome::deferred(async move {
            let results = join_all(deferred).await;
            Ok(results.into_iter().any(|result| result.unwrap_or(false)))
        }))
    })
    .with_params(json!({ "type": "or" }))
    .with_sub(rules)
}

/// Passes when the rule fails. A rejected deferred check counts as failed,
/// so its negation passes.
pub fn not(rule: Rule) -> Rule {
    let inner = rule.clone();
    Rule::new(move |value, ctx| match inner.evaluate(value, ctx)? {
        Outcome::Ready(passed) => Ok(Outcome::Ready(!passed)),
        Outcome::Deferred(check) => Ok(Outcome::deferred(async move {
            Ok(!check.await.unwrap_or(false))
        })),
    })
    .with_params(json!({ "type": "not" }))
    .with_sub(vec![rule])
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{max_length, min_length, required};
    use crate::store::Store;
    use crate::types::Path;
    use futures::executor::block_on;

    fn outcome(rule: &Rule, value: Value) -> Outcome {
        let store = Store::new(json!({ "field": value.clone() }));
        let path = Path::parse("field");
        let ctx = Context::new(&store, &path);
        rule.evaluate(&value, &ctx).unwrap()
    }

    fn ready(rule: &Rule, value: Value) -> bool {
        match outcome(rule, value) {
            Outcome::Ready(passed) => passed,
            Outcome::Deferred(_) => panic!("expected a synchronous outcome"),
        }
    }

    fn settle(rule: &Rule, value: Value) -> Result<bool, RuleError> {
        match outcome(rule, value) {
            Outcome::Deferred(check) => block_on(check),
            Outcome::Ready(_) => panic!("expected a deferred outcome"),
        }
    }

    fn eventually(passed: bool) -> Rule {
        Rule::new(move |_, _| Ok(Outcome::deferred(async move { Ok(passed) })))
    }

    fn rejecting() -> Rule {
        Rule::new(|_, _| Ok(Outcome::deferred(async { Err(RuleError::new("offline")) })))
    }

    #[test]
    fn test_and_sync() {
        let rule = and(vec![required(), max_length(3)]);
        assert!(ready(&rule, json!("abc")));
        assert!(!ready(&rule, json!("abcd")));
        assert!(!ready(&rule, json!("")));
    }

    #[test]
    fn test_or_sync() {
        let rule = or(vec![min_length(5), max_length(1)]);
        assert!(ready(&rule, json!("a")));
        assert!(!ready(&rule, json!("abc")));
    }

    #[test]
    fn test_not_sync() {
        assert!(ready(&not(required()), json!("")));
        assert!(!ready(&not(required()), json!("x")));
    }

    #[test]
    fn test_and_short_circuits_before_deferring() {
        let rule = and(vec![required(), eventually(true)]);
        assert!(!ready(&rule, json!("")));
        assert_eq!(settle(&rule, json!("x")), Ok(true));
    }

    #[test]
    fn test_deferred_composition() {
        assert_eq!(settle(&and(vec![eventually(true), eventually(false)]), json!(1)), Ok(false));
        assert_eq!(settle(&or(vec![eventually(false), eventually(true)]), json!(1)), Ok(true));
        assert_eq!(settle(&or(vec![rejecting()]), json!(1)), Ok(false));
        assert_eq!(settle(&not(rejecting()), json!(1)), Ok(true));
    }

    #[test]
    fn test_sync_error_propagates() {
        let failing = Rule::new(|_, _| Err(RuleError::new("boom")));
        let rule = and(vec![failing]);
        let store = Store::new(json!({}));
        let path = Path::parse("field");
        let ctx = Context::new(&store, &path);
        assert_eq!(rule.evaluate(&json!(1), &ctx).unwrap_err(), RuleError::new("boom"));
    }

    #[test]
    fn test_composition_params() {
        let rule = and(vec![required(), min_length(2)]);
        assert_eq!(
            rule.params(),
            json!({
                "type": "and",
                "$sub": [{ "type": "required" }, { "type": "minLength", "min": 2 }]
            })
        );
    }
}
