//! Flattened rule parameters.

use serde::Serialize;
use serde_json::Value;

/// One rule of a subtree, as reported by `flatten_params`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatParam {
    /// Tree path from the node that was flattened to the rule's owner.
    pub path: Vec<String>,
    /// Rule name.
    pub name: String,
    pub params: Value,
}

/// Prepend `segment` to the path of every entry.
pub(crate) fn prefixed(segment: &str, params: Vec<FlatParam>) -> Vec<FlatParam> {
    params
        .into_iter()
        .map(|mut param| {
            param.path.insert(0, segment.to_string());
            param
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prefixed_prepends() {
        let flat = vec![FlatParam {
            path: vec!["bar".into()],
            name: "isEven".into(),
            params: Value::Null,
        }];
        let flat = prefixed("foo", flat);
        assert_eq!(flat[0].path, vec!["foo".to_string(), "bar".to_string()]);
    }

    #[test]
    fn test_serializes() {
        let param = FlatParam {
            path: vec!["age".into()],
            name: "min".into(),
            params: json!({ "type": "minValue", "min": 3 }),
        };
        assert_eq!(
            serde_json::to_value(&param).unwrap(),
            json!({ "path": ["age"], "name": "min", "params": { "type": "minValue", "min": 3 } })
        );
    }
}
