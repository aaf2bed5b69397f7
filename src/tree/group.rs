//! Group Node - A field or object of the schema.
//!
//! A group holds its own rules (checked against the group's value) and its
//! named children in declaration order. A group with only rules is a leaf
//! field; the dirty flag and the model accessor live here.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{Map, Value};
use spark_signals::{signal, Signal};
use tracing::{debug, warn};

use super::builder::Wiring;
use super::location::Location;
use super::params::{prefixed, FlatParam};
use super::{CollectionNode, Node, RuleNode, ValidationState};
use crate::error::{SchemaError, StoreError, ValidationError};
use crate::schema::EACH_KEY;
use crate::types::Path;

/// Where a group sits in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    /// The tree root. Has no model.
    Root,
    /// A named field of a parent group.
    Field,
    /// One element of a collection.
    Element,
}

/// One declared entry of a group.
#[derive(Clone)]
pub enum Entry {
    Rule(Rc<RuleNode>),
    Child {
        name: String,
        node: Node,
        /// Static params of the child's schema.
        params: Option<Map<String, Value>>,
    },
}

/// Brings a root group up to date with a schema computed from the data.
/// Returns whether the tree was reconciled.
pub(crate) type SchemaHook = Rc<dyn Fn(&GroupNode) -> Result<bool, SchemaError>>;

pub struct GroupNode {
    pub(super) kind: GroupKind,
    pub(super) location: Rc<Location>,
    pub(super) wiring: Wiring,
    dirty: Signal<bool>,
    pub(super) entries: RefCell<Vec<Entry>>,
    schema_hook: RefCell<Option<SchemaHook>>,
}

impl GroupNode {
    pub(super) fn new(kind: GroupKind, location: Rc<Location>, wiring: Wiring) -> Self {
        Self {
            kind,
            location,
            wiring,
            dirty: signal(false),
            entries: RefCell::new(Vec::new()),
            schema_hook: RefCell::new(None),
        }
    }

    pub(crate) fn set_schema_hook(&self, hook: Option<SchemaHook>) {
        *self.schema_hook.borrow_mut() = hook;
    }

    /// Re-apply a dynamic schema whose inputs changed. Every read of a root
    /// goes through here, so a held root never shows a stale shape.
    pub(crate) fn sync(&self) -> Result<bool, SchemaError> {
        let hook = self.schema_hook.borrow().clone();
        match hook {
            Some(hook) => hook(self),
            None => Ok(false),
        }
    }

    /// [`sync`](Self::sync) for readers that cannot report an error.
    fn synced(&self) {
        if let Err(err) = self.sync() {
            warn!(path = %self.path(), error = %err, "schema refresh failed, keeping old tree");
        }
    }

    pub fn kind(&self) -> GroupKind {
        self.kind
    }

    /// Data path of the group's value.
    pub fn path(&self) -> Path {
        self.location.path()
    }

    // -------------------------------------------------------------------------
    // Navigation
    // -------------------------------------------------------------------------

    /// Entries in declaration order.
    pub fn entries(&self) -> Vec<Entry> {
        self.synced();
        self.entries.borrow().clone()
    }

    pub fn rules(&self) -> Vec<Rc<RuleNode>> {
        self.synced();
        self.entries
            .borrow()
            .iter()
            .filter_map(|entry| match entry {
                Entry::Rule(rule) => Some(rule.clone()),
                Entry::Child { .. } => None,
            })
            .collect()
    }

    pub fn rule(&self, name: &str) -> Option<Rc<RuleNode>> {
        self.rules().into_iter().find(|rule| rule.name() == name)
    }

    pub fn children(&self) -> Vec<(String, Node)> {
        self.synced();
        self.entries
            .borrow()
            .iter()
            .filter_map(|entry| match entry {
                Entry::Child { name, node, .. } => Some((name.clone(), node.clone())),
                Entry::Rule(_) => None,
            })
            .collect()
    }

    pub fn child(&self, name: &str) -> Option<Node> {
        self.synced();
        self.entries.borrow().iter().find_map(|entry| match entry {
            Entry::Child { name: child, node, .. } if child == name => Some(node.clone()),
            _ => None,
        })
    }

    /// Nested field group by name.
    pub fn group(&self, name: &str) -> Option<Rc<GroupNode>> {
        self.child(name).and_then(|node| node.as_group().cloned())
    }

    /// The `$each` collection of this field.
    pub fn collection(&self) -> Option<Rc<CollectionNode>> {
        self.child(EACH_KEY).and_then(|node| node.as_collection().cloned())
    }

    /// Follow a tree path (`"items.$each.0.value"`) from this group.
    pub fn resolve(&self, path: &Path) -> Option<Node> {
        let (first, rest) = path.segments().split_first()?;
        let mut node = self.child(&first.as_string())?;
        for segment in rest {
            node = node.child(segment)?;
        }
        Some(node)
    }

    fn child_nodes(&self) -> Vec<Node> {
        self.children().into_iter().map(|(_, node)| node).collect()
    }

    /// Abort outstanding rule work and drop every entry.
    pub(crate) fn dispose(&self) {
        let entries = self.entries.take();
        for entry in entries {
            match entry {
                Entry::Rule(rule) => rule.dispose(),
                Entry::Child { node, .. } => node.dispose(),
            }
        }
    }
}

impl ValidationState for GroupNode {
    fn invalid(&self) -> Result<bool, ValidationError> {
        self.sync()?;
        for entry in self.entries.borrow().clone() {
            let invalid = match &entry {
                Entry::Rule(rule) => rule.invalid()?,
                Entry::Child { node, .. } => node.invalid()?,
            };
            if invalid {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn pending(&self) -> Result<bool, ValidationError> {
        self.sync()?;
        for entry in self.entries.borrow().clone() {
            let pending = match &entry {
                Entry::Rule(rule) => rule.pending()?,
                Entry::Child { node, .. } => node.pending()?,
            };
            if pending {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn dirty(&self) -> bool {
        if self.dirty.get() {
            return true;
        }
        let children = self.child_nodes();
        !children.is_empty() && children.iter().all(|child| child.dirty())
    }

    fn any_dirty(&self) -> bool {
        if self.dirty.get() {
            return true;
        }
        self.child_nodes().iter().any(|child| child.any_dirty())
    }

    fn touch(&self) {
        self.dirty.set(true);
        for child in self.child_nodes() {
            child.touch();
        }
    }

    fn reset(&self) {
        self.dirty.set(false);
        for child in self.child_nodes() {
            child.reset();
        }
    }

    fn model(&self) -> Option<Value> {
        match self.kind {
            GroupKind::Root => None,
            GroupKind::Field | GroupKind::Element => self.wiring.store.get(&self.path()),
        }
    }

    fn set_model(&self, value: Value) -> Result<(), StoreError> {
        if self.kind == GroupKind::Root {
            debug!("ignoring model write at the root");
            return Ok(());
        }
        self.wiring.store.set(&self.path(), value)?;
        self.touch();
        Ok(())
    }

    fn params(&self) -> Value {
        let mut params = Map::new();
        for entry in self.entries() {
            match entry {
                Entry::Rule(rule) => {
                    params.insert(rule.name().to_string(), rule.params());
                }
                Entry::Child { name, params: own, .. } => {
                    params.insert(name, own.map(Value::Object).unwrap_or(Value::Null));
                }
            }
        }
        Value::Object(params)
    }

    fn flatten_params(&self) -> Vec<FlatParam> {
        let mut flat = Vec::new();
        for entry in self.entries() {
            match entry {
                Entry::Rule(rule) => flat.push(FlatParam {
                    path: Vec::new(),
                    name: rule.name().to_string(),
                    params: rule.params(),
                }),
                Entry::Child { name, node, .. } => {
                    flat.extend(prefixed(&name, node.flatten_params()));
                }
            }
        }
        flat
    }
}

impl std::fmt::Debug for GroupNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupNode")
            .field("kind", &self.kind)
            .field("path", &self.path().to_string())
            .field("entries", &self.entries.borrow().len())
            .finish()
    }
}
