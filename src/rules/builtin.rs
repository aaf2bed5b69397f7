//! Built-in rules.
//!
//! Every rule except `required` passes on empty values, so optional fields
//! only need `required` when they must be filled in.

use serde_json::{json, Value};

use super::Rule;

/// Whether a value counts as filled in.
///
/// `null`, whitespace-only strings, empty arrays and empty objects are empty.
/// `false` and `0` are present.
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(_) | Value::Number(_) => true,
        Value::String(text) => !text.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Length of strings (in chars), arrays and objects.
fn length_of(value: &Value) -> Option<usize> {
    match value {
        Value::String(text) => Some(text.chars().count()),
        Value::Array(items) => Some(items.len()),
        Value::Object(map) => Some(map.len()),
        _ => None,
    }
}

/// Numbers and numeric strings.
fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

pub fn required() -> Rule {
    Rule::check(is_present).with_params(json!({ "type": "required" }))
}

pub fn min_length(min: usize) -> Rule {
    Rule::check(move |value| {
        !is_present(value) || length_of(value).is_some_and(|len| len >= min)
    })
    .with_params(json!({ "type": "minLength", "min": min }))
}

pub fn max_length(max: usize) -> Rule {
    Rule::check(move |value| {
        !is_present(value) || length_of(value).is_some_and(|len| len <= max)
    })
    .with_params(json!({ "type": "maxLength", "max": max }))
}

pub fn min_value(min: f64) -> Rule {
    Rule::check(move |value| !is_present(value) || number_of(value).is_some_and(|n| n >= min))
        .with_params(json!({ "type": "minValue", "min": min }))
}

pub fn max_value(max: f64) -> Rule {
    Rule::check(move |value| !is_present(value) || number_of(value).is_some_and(|n| n <= max))
        .with_params(json!({ "type": "maxValue", "max": max }))
}

pub fn between(min: f64, max: f64) -> Rule {
    Rule::check(move |value| {
        !is_present(value) || number_of(value).is_some_and(|n| n >= min && n <= max)
    })
    .with_params(json!({ "type": "between", "min": min, "max": max }))
}

pub fn numeric() -> Rule {
    Rule::check(|value| !is_present(value) || number_of(value).is_some())
        .with_params(json!({ "type": "numeric" }))
}

/// Equal to the sibling field `key` in the same parent model.
pub fn same_as(key: &str) -> Rule {
    let sibling = key.to_string();
    Rule::contextual(move |value, ctx| ctx.sibling(&sibling).unwrap_or(Value::Null) == *value)
        .with_params(json!({ "type": "sameAs", "eq": key }))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Context, Outcome};
    use crate::store::Store;
    use crate::types::Path;

    fn run(rule: &Rule, value: Value) -> bool {
        let store = Store::new(json!({ "field": value.clone() }));
        let path = Path::parse("field");
        let ctx = Context::new(&store, &path);
        match rule.evaluate(&value, &ctx) {
            Ok(Outcome::Ready(passed)) => passed,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_is_present() {
        assert!(!is_present(&Value::Null));
        assert!(!is_present(&json!("   ")));
        assert!(!is_present(&json!([])));
        assert!(!is_present(&json!({})));
        assert!(is_present(&json!(false)));
        assert!(is_present(&json!(0)));
        assert!(is_present(&json!("a")));
    }

    #[test]
    fn test_required() {
        let rule = required();
        assert!(!run(&rule, json!("")));
        assert!(run(&rule, json!("x")));
        assert_eq!(rule.params(), json!({ "type": "required" }));
    }

    #[test]
    fn test_length_rules() {
        assert!(run(&min_length(3), json!("")));
        assert!(!run(&min_length(3), json!("ab")));
        assert!(run(&min_length(3), json!("abc")));
        assert!(!run(&max_length(1), json!([1, 2])));
        assert!(run(&max_length(2), json!([1, 2])));
        assert_eq!(min_length(3).params(), json!({ "type": "minLength", "min": 3 }));
    }

    #[test]
    fn test_value_rules() {
        assert!(run(&between(1.0, 5.0), json!(3)));
        assert!(run(&between(1.0, 5.0), json!("4.5")));
        assert!(!run(&between(1.0, 5.0), json!(6)));
        assert!(!run(&min_value(10.0), json!(9)));
        assert!(run(&max_value(10.0), json!(10)));
        assert!(!run(&numeric(), json!("abc")));
        assert!(run(&numeric(), json!(null)));
    }

    #[test]
    fn test_same_as_reads_sibling() {
        let store = Store::new(json!({ "password": "secret", "confirm": "secret" }));
        let path = Path::parse("confirm");
        let ctx = Context::new(&store, &path);
        let rule = same_as("password");

        assert!(matches!(rule.evaluate(&json!("secret"), &ctx), Ok(Outcome::Ready(true))));
        assert!(matches!(rule.evaluate(&json!("other"), &ctx), Ok(Outcome::Ready(false))));
    }
}
