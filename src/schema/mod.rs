//! Schema - Declarative description of a validation tree.
//!
//! A [`GroupSchema`] is an ordered list of named entries. Each entry is a
//! rule applied to the group's own value, a nested group for a field, the
//! reserved `$each` collection, or a list of paths aggregated from elsewhere
//! in the tree.
//!
//! # Example
//!
//! ```ignore
//! use spark_validation::rules::{min_length, required};
//! use spark_validation::schema::{EachSchema, GroupSchema};
//!
//! let schema = GroupSchema::new()
//!     .field("name", GroupSchema::new().rule("required", required()))
//!     .field(
//!         "tasks",
//!         GroupSchema::new()
//!             .rule("minLength", min_length(1))
//!             .each(
//!                 EachSchema::new(
//!                     GroupSchema::new()
//!                         .field("title", GroupSchema::new().rule("required", required())),
//!                 )
//!                 .track_by_field("id"),
//!             ),
//!     )
//!     .paths("basics", ["name", "tasks"]);
//! ```

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::error::SchemaError;
use crate::rules::Rule;
use crate::types::Path;

/// Reserved entry name for collections.
pub const EACH_KEY: &str = "$each";

// =============================================================================
// Schema Entries
// =============================================================================

/// One named entry of a [`GroupSchema`].
#[derive(Clone, Debug)]
pub enum SchemaEntry {
    /// Rule evaluated against the group's own value.
    Rule(Rule),
    /// Nested field.
    Group(GroupSchema),
    /// Collection over the group's value (always named `$each`).
    Each(EachSchema),
    /// Aggregation over other nodes of the tree.
    Paths(Vec<Path>),
}

/// Ordered mapping of names to entries, plus optional static params.
#[derive(Clone, Debug, Default)]
pub struct GroupSchema {
    entries: Vec<(String, SchemaEntry)>,
    params: Option<Map<String, Value>>,
}

impl GroupSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule checked against this group's value.
    pub fn rule(mut self, name: impl Into<String>, rule: Rule) -> Self {
        self.entries.push((name.into(), SchemaEntry::Rule(rule)));
        self
    }

    /// Add a nested field.
    pub fn field(mut self, name: impl Into<String>, schema: GroupSchema) -> Self {
        self.entries.push((name.into(), SchemaEntry::Group(schema)));
        self
    }

    /// Validate every element of this group's value (`$each`).
    pub fn each(mut self, each: EachSchema) -> Self {
        self.entries.push((EACH_KEY.to_string(), SchemaEntry::Each(each)));
        self
    }

    /// Aggregate the nodes found at `paths` under `name`.
    pub fn paths<P: Into<Path>>(
        mut self,
        name: impl Into<String>,
        paths: impl IntoIterator<Item = P>,
    ) -> Self {
        let paths = paths.into_iter().map(Into::into).collect();
        self.entries.push((name.into(), SchemaEntry::Paths(paths)));
        self
    }

    /// Static params, reported by the parent under this field's name.
    pub fn with_params(mut self, params: Value) -> Self {
        if let Value::Object(extra) = params {
            let merged = self.params.get_or_insert_with(Map::new);
            for (key, value) in extra {
                merged.insert(key, value);
            }
        }
        self
    }

    pub fn entries(&self) -> &[(String, SchemaEntry)] {
        &self.entries
    }

    pub fn params(&self) -> Option<&Map<String, Value>> {
        self.params.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check for construction-time defects in this schema and every nested one.
    ///
    /// `location` names the group in error messages (empty for the root).
    pub fn validate(&self, location: &str) -> Result<(), SchemaError> {
        let group = if location.is_empty() { "<root>" } else { location };
        let mut seen = HashSet::new();

        for (name, entry) in &self.entries {
            if name.is_empty() {
                return Err(SchemaError::EmptyName {
                    group: group.to_string(),
                });
            }
            let is_each = matches!(entry, SchemaEntry::Each(_));
            if name.starts_with('$') && !(is_each && name == EACH_KEY) {
                return Err(SchemaError::ReservedName {
                    group: group.to_string(),
                    name: name.clone(),
                });
            }
            if !seen.insert(name.as_str()) {
                return Err(SchemaError::DuplicateEntry {
                    group: group.to_string(),
                    name: name.clone(),
                });
            }

            let nested = if location.is_empty() {
                name.clone()
            } else {
                format!("{location}.{name}")
            };
            match entry {
                SchemaEntry::Rule(_) => {}
                SchemaEntry::Group(schema) => schema.validate(&nested)?,
                SchemaEntry::Each(each) => {
                    if let TrackBy::Field(field) = &each.track_by {
                        if field.is_empty() {
                            return Err(SchemaError::EmptyTrackField {
                                group: group.to_string(),
                            });
                        }
                    }
                    each.item.validate(&nested)?;
                }
                SchemaEntry::Paths(paths) => {
                    if paths.iter().any(Path::is_empty) {
                        return Err(SchemaError::EmptyPath { field: nested });
                    }
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Collections
// =============================================================================

/// Identity policy for collection elements.
#[derive(Clone, Default)]
pub enum TrackBy {
    /// Identity is the position.
    #[default]
    Index,
    /// Identity is `element[field]`.
    Field(String),
    /// Identity is `key(element)`.
    Key(Rc<dyn Fn(&Value) -> Value>),
}

impl TrackBy {
    /// Tracking key of the element at `index`.
    pub fn key(&self, index: usize, element: &Value) -> TrackKey {
        match self {
            TrackBy::Index => TrackKey::Index(index),
            TrackBy::Field(field) => {
                TrackKey::Value(element.get(field).cloned().unwrap_or(Value::Null).to_string())
            }
            TrackBy::Key(key) => TrackKey::Value(key(element).to_string()),
        }
    }

    /// Whether two policies produce the same keys.
    pub fn same_as(&self, other: &TrackBy) -> bool {
        match (self, other) {
            (TrackBy::Index, TrackBy::Index) => true,
            (TrackBy::Field(a), TrackBy::Field(b)) => a == b,
            (TrackBy::Key(a), TrackBy::Key(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for TrackBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackBy::Index => f.write_str("Index"),
            TrackBy::Field(field) => f.debug_tuple("Field").field(field).finish(),
            TrackBy::Key(_) => f.write_str("Key(..)"),
        }
    }
}

/// Identity of a collection element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TrackKey {
    Index(usize),
    /// Compact JSON of the tracked value.
    Value(String),
}

/// Schema applied to every element of a sequence.
#[derive(Clone, Debug, Default)]
pub struct EachSchema {
    item: GroupSchema,
    track_by: TrackBy,
}

impl EachSchema {
    pub fn new(item: GroupSchema) -> Self {
        Self {
            item,
            track_by: TrackBy::Index,
        }
    }

    pub fn track_by(mut self, track_by: TrackBy) -> Self {
        self.track_by = track_by;
        self
    }

    /// Track elements by one of their fields (`$trackBy: "id"`).
    pub fn track_by_field(self, field: impl Into<String>) -> Self {
        self.track_by(TrackBy::Field(field.into()))
    }

    /// Track elements by a derived key.
    pub fn track_by_key(self, key: impl Fn(&Value) -> Value + 'static) -> Self {
        self.track_by(TrackBy::Key(Rc::new(key)))
    }

    pub fn item(&self) -> &GroupSchema {
        &self.item
    }

    pub fn tracking(&self) -> &TrackBy {
        &self.track_by
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::required;
    use serde_json::json;

    #[test]
    fn test_validate_accepts_nested_schema() {
        let schema = GroupSchema::new()
            .field("name", GroupSchema::new().rule("required", required()))
            .field(
                "items",
                GroupSchema::new()
                    .each(EachSchema::new(GroupSchema::new().rule("required", required()))),
            )
            .paths("group", ["name", "items"]);
        assert_eq!(schema.validate(""), Ok(()));
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let schema = GroupSchema::new()
            .field("name", GroupSchema::new())
            .rule("name", required());
        assert_eq!(
            schema.validate(""),
            Err(SchemaError::DuplicateEntry { group: "<root>".into(), name: "name".into() })
        );
    }

    #[test]
    fn test_validate_rejects_reserved_names() {
        let schema = GroupSchema::new()
            .field("outer", GroupSchema::new().field("$each", GroupSchema::new()));
        assert_eq!(
            schema.validate(""),
            Err(SchemaError::ReservedName { group: "outer".into(), name: "$each".into() })
        );
    }

    #[test]
    fn test_validate_rejects_empty_track_field() {
        let schema = GroupSchema::new().field(
            "items",
            GroupSchema::new().each(EachSchema::new(GroupSchema::new()).track_by_field("")),
        );
        assert_eq!(
            schema.validate(""),
            Err(SchemaError::EmptyTrackField { group: "items".into() })
        );
    }

    #[test]
    fn test_validate_rejects_empty_paths() {
        let schema = GroupSchema::new().paths("group", [""]);
        assert_eq!(schema.validate(""), Err(SchemaError::EmptyPath { field: "group".into() }));
    }

    #[test]
    fn test_track_keys() {
        let element = json!({ "id": 7, "name": "x" });
        assert_eq!(TrackBy::Index.key(3, &element), TrackKey::Index(3));
        assert_eq!(
            TrackBy::Field("id".into()).key(0, &element),
            TrackKey::Value("7".into())
        );
        assert_eq!(
            TrackBy::Field("missing".into()).key(0, &element),
            TrackKey::Value("null".into())
        );
        let by_name = TrackBy::Key(Rc::new(|element: &Value| element["name"].clone()));
        assert_eq!(by_name.key(0, &element), TrackKey::Value("\"x\"".into()));
    }

    #[test]
    fn test_group_params_merge() {
        let schema = GroupSchema::new()
            .with_params(json!({ "a": 1 }))
            .with_params(json!({ "b": 2 }));
        assert_eq!(Value::Object(schema.params().cloned().unwrap()), json!({ "a": 1, "b": 2 }));
    }
}
