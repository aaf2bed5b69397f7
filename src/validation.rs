//! Validation Handle - Host-facing root of one validation tree.
//!
//! ```ignore
//! use spark_validation::{GroupSchema, Store, Validation, ValidationConfig, ValidationState};
//! use spark_validation::rules::required;
//!
//! let store = Store::new(serde_json::json!({ "name": "" }));
//! let validation = Validation::new(
//!     store.clone(),
//!     GroupSchema::new().field("name", GroupSchema::new().rule("required", required())),
//!     ValidationConfig::new(),
//! )?;
//!
//! let root = validation.root()?;
//! assert!(root.invalid()?);
//!
//! // Tear down (aborts outstanding deferred rules)
//! validation.destroy();
//! ```
//!
//! A schema built from the data ([`Validation::dynamic`]) is re-run lazily:
//! any read of the root group (its attributes or its children) re-applies it
//! once the data it read has changed, so a root obtained earlier stays current.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use spark_signals::{derived, Derived};
use tracing::debug;

use crate::config::ValidationConfig;
use crate::error::{SchemaError, ValidationError};
use crate::schema::GroupSchema;
use crate::store::Store;
use crate::tree::{apply_group, build_root, GroupNode};

/// Schema function output, cached until a store path it read changes.
struct DynamicSchema {
    /// Bumped each time the schema function re-runs.
    generation: Derived<u64>,
    latest: Rc<RefCell<Option<GroupSchema>>>,
    applied: Cell<u64>,
    config: Rc<ValidationConfig>,
}

impl DynamicSchema {
    /// Apply the latest schema to `root` if it is newer than the applied one.
    /// An invalid schema leaves the tree as it was and keeps reporting its
    /// error until the data changes again.
    fn refresh(&self, root: &GroupNode) -> Result<bool, SchemaError> {
        let current = self.generation.get();
        if current == self.applied.get() {
            return Ok(false);
        }
        let schema = self.latest.borrow().clone().unwrap_or_default();
        schema.validate("")?;

        apply_group(root, &schema);
        self.applied.set(current);
        debug!(tree = %self.config.label(), generation = current, "schema refreshed");
        Ok(true)
    }
}

/// Owns a validation tree. Dropping it tears the tree down.
pub struct Validation {
    store: Store,
    config: Rc<ValidationConfig>,
    root: Rc<GroupNode>,
}

impl Validation {
    /// Build a tree from a fixed schema.
    pub fn new(
        store: Store,
        schema: GroupSchema,
        config: ValidationConfig,
    ) -> Result<Self, SchemaError> {
        schema.validate("")?;
        let config = Rc::new(config);
        let root = build_root(store.clone(), config.clone(), &schema);
        debug!(tree = %config.label(), entries = schema.entries().len(), "validation created");

        Ok(Self { store, config, root })
    }

    /// Build a tree from a schema computed from the data. The function
    /// re-runs when a store path it read changes.
    pub fn dynamic(
        store: Store,
        config: ValidationConfig,
        schema: impl Fn(&Store) -> GroupSchema + 'static,
    ) -> Result<Self, SchemaError> {
        let latest: Rc<RefCell<Option<GroupSchema>>> = Rc::new(RefCell::new(None));
        let runs = Rc::new(Cell::new(0u64));

        let generation = {
            let store = store.clone();
            let latest = latest.clone();
            derived(move || {
                *latest.borrow_mut() = Some(schema(&store));
                runs.set(runs.get() + 1);
                runs.get()
            })
        };

        let current = generation.get();
        let initial = latest.borrow().clone().unwrap_or_default();
        initial.validate("")?;

        let config = Rc::new(config);
        let root = build_root(store.clone(), config.clone(), &initial);
        let source = Rc::new(DynamicSchema {
            generation,
            latest,
            applied: Cell::new(current),
            config: config.clone(),
        });
        root.set_schema_hook(Some(Rc::new(move |root: &GroupNode| source.refresh(root))));
        debug!(
            tree = %config.label(),
            entries = initial.entries().len(),
            "dynamic validation created"
        );

        Ok(Self { store, config, root })
    }

    /// Re-apply a dynamic schema if the data it depends on changed.
    /// Returns whether the tree was reconciled; always false for a fixed schema.
    pub fn refresh(&self) -> Result<bool, SchemaError> {
        self.root.sync()
    }

    /// Root group, with a dynamic schema brought up to date first.
    pub fn root(&self) -> Result<Rc<GroupNode>, ValidationError> {
        self.refresh()?;
        Ok(self.root.clone())
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Tear the tree down, aborting outstanding deferred rules.
    pub fn destroy(self) {
        debug!(tree = %self.config.label(), "validation destroyed");
    }
}

impl Drop for Validation {
    fn drop(&mut self) {
        self.root.set_schema_hook(None);
        self.root.dispose();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{min_length, required};
    use crate::tree::ValidationState;
    use crate::types::Path;
    use serde_json::json;

    fn setup() -> Store {
        Store::new(json!({ "name": "", "mode": "short" }))
    }

    #[test]
    fn test_rejects_malformed_schema() {
        let schema = GroupSchema::new()
            .field("name", GroupSchema::new())
            .field("name", GroupSchema::new());
        let result = Validation::new(setup(), schema, ValidationConfig::new());
        assert!(matches!(result, Err(SchemaError::DuplicateEntry { .. })));
    }

    #[test]
    fn test_static_root() {
        let validation = Validation::new(
            setup(),
            GroupSchema::new().field("name", GroupSchema::new().rule("required", required())),
            ValidationConfig::new(),
        )
        .unwrap();
        let root = validation.root().unwrap();
        assert_eq!(root.invalid(), Ok(true));
        assert_eq!(validation.refresh(), Ok(false));
    }

    #[test]
    fn test_dynamic_schema_follows_data() {
        let store = setup();
        let required = required();
        let validation = Validation::dynamic(store.clone(), ValidationConfig::new(), move |store| {
            let mut name = GroupSchema::new().rule("required", required.clone());
            if store.get(&Path::parse("mode")) == Some(json!("long")) {
                name = name.rule("min", min_length(10));
            }
            GroupSchema::new().field("name", name)
        })
        .unwrap();

        let name = validation.root().unwrap().group("name").unwrap();
        name.touch();
        assert!(name.rule("min").is_none());

        store.set(&Path::parse("mode"), json!("long")).unwrap();
        let root = validation.root().unwrap();
        let again = root.group("name").unwrap();
        assert!(Rc::ptr_eq(&name, &again));
        assert!(again.dirty());
        assert!(again.rule("min").is_some());
    }

    #[test]
    fn test_held_root_follows_schema_changes() {
        let store = Store::new(json!({ "name": "", "strict": false }));
        let validation = Validation::dynamic(store.clone(), ValidationConfig::new(), |store| {
            if store.get(&Path::parse("strict")) == Some(json!(true)) {
                let name = GroupSchema::new().rule("required", required());
                return GroupSchema::new().field("name", name);
            }
            GroupSchema::new()
        })
        .unwrap();

        let root = validation.root().unwrap();
        assert_eq!(root.invalid(), Ok(false));

        store.set(&Path::parse("strict"), json!(true)).unwrap();
        assert_eq!(root.invalid(), Ok(true));
        assert!(root.group("name").is_some());

        store.set(&Path::parse("strict"), json!(false)).unwrap();
        assert!(root.children().is_empty());
        assert_eq!(root.invalid(), Ok(false));
    }

    #[test]
    fn test_held_root_reports_broken_schema() {
        let store = Store::new(json!({ "mode": "ok" }));
        let validation = Validation::dynamic(store.clone(), ValidationConfig::new(), |store| {
            let schema = GroupSchema::new().field("name", GroupSchema::new());
            if store.get(&Path::parse("mode")) == Some(json!("broken")) {
                return schema.field("name", GroupSchema::new());
            }
            schema
        })
        .unwrap();
        let root = validation.root().unwrap();

        store.set(&Path::parse("mode"), json!("broken")).unwrap();
        assert!(matches!(
            root.invalid(),
            Err(ValidationError::Schema(SchemaError::DuplicateEntry { .. }))
        ));
        // Shape is kept while the schema is broken
        assert!(root.group("name").is_some());
    }

    #[test]
    fn test_dynamic_schema_error_persists() {
        let store = setup();
        let validation = Validation::dynamic(store.clone(), ValidationConfig::new(), |store| {
            let schema = GroupSchema::new().field("name", GroupSchema::new());
            if store.get(&Path::parse("mode")) == Some(json!("broken")) {
                return schema.field("name", GroupSchema::new());
            }
            schema
        })
        .unwrap();

        store.set(&Path::parse("mode"), json!("broken")).unwrap();
        assert!(validation.root().is_err());
        assert!(validation.root().is_err());

        store.set(&Path::parse("mode"), json!("short")).unwrap();
        assert!(validation.root().is_ok());
    }
}
