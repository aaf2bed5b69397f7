//! Collection Node - `$each` validation over a sequence.
//!
//! One element node per tracking key. Every read reconciles the key map
//! against the current sequence:
//!
//! - Known keys: node reused, slot moved to the element's new position
//! - New keys: fresh node (clean)
//! - Vanished keys: node disposed
//!
//! Elements mapping to the same key share the node of the first occurrence.
//! A bound value that is not an array reads as an empty collection.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::{Map, Value};
use tracing::debug;

use super::builder::{apply_group, element, Wiring};
use super::group::GroupNode;
use super::location::Location;
use super::params::{prefixed, FlatParam};
use super::ValidationState;
use crate::error::{StoreError, ValidationError};
use crate::schema::{EachSchema, TrackKey};
use crate::types::Path;

pub struct CollectionNode {
    location: Rc<Location>,
    wiring: Wiring,
    schema: RefCell<EachSchema>,
    tracked: RefCell<HashMap<TrackKey, Rc<GroupNode>>>,
    /// Tracking key of each position, as of the last reconciliation.
    order: RefCell<Vec<TrackKey>>,
}

impl CollectionNode {
    pub(super) fn new(location: Rc<Location>, wiring: Wiring, schema: EachSchema) -> Self {
        Self {
            location,
            wiring,
            schema: RefCell::new(schema),
            tracked: RefCell::new(HashMap::new()),
            order: RefCell::new(Vec::new()),
        }
    }

    /// Data path of the sequence.
    pub fn path(&self) -> Path {
        self.location.path()
    }

    /// Swap in a new element schema. Element nodes survive unless the
    /// tracking policy changed.
    pub(super) fn apply(&self, schema: &EachSchema) {
        let same_tracking = self.schema.borrow().tracking().same_as(schema.tracking());
        *self.schema.borrow_mut() = schema.clone();

        if !same_tracking {
            debug!(path = %self.path(), "tracking policy changed, dropping element nodes");
            self.dispose();
            return;
        }
        let nodes: Vec<Rc<GroupNode>> = self.tracked.borrow().values().cloned().collect();
        for node in nodes {
            apply_group(&node, schema.item());
        }
    }

    /// Match element nodes to the current sequence.
    fn reconcile(&self) {
        let value = self.wiring.store.get(&self.path());
        let elements = match value {
            Some(Value::Array(elements)) => elements,
            _ => Vec::new(),
        };

        let schema = self.schema.borrow();
        let mut previous = self.tracked.take();
        let mut tracked = HashMap::with_capacity(elements.len());
        let mut order = Vec::with_capacity(elements.len());
        let mut built = 0usize;

        for (index, item) in elements.iter().enumerate() {
            let key = schema.tracking().key(index, item);
            if !tracked.contains_key(&key) {
                let node = match previous.remove(&key) {
                    Some(node) => {
                        node.location.set_slot(index);
                        node
                    }
                    None => {
                        built += 1;
                        element(&self.location, index, &self.wiring, schema.item())
                    }
                };
                tracked.insert(key.clone(), node);
            }
            order.push(key);
        }

        let dropped = previous.len();
        for node in previous.into_values() {
            node.dispose();
        }
        if built > 0 || dropped > 0 {
            debug!(
                tree = %self.wiring.config.label(),
                path = %self.path(),
                len = order.len(),
                built,
                dropped,
                "reconciled collection"
            );
        }

        *self.tracked.borrow_mut() = tracked;
        *self.order.borrow_mut() = order;
    }

    // -------------------------------------------------------------------------
    // Element Access
    // -------------------------------------------------------------------------

    /// Present `(index, node)` pairs in sequence order.
    pub fn iter(&self) -> Vec<(usize, Rc<GroupNode>)> {
        self.reconcile();
        let tracked = self.tracked.borrow();
        self.order
            .borrow()
            .iter()
            .enumerate()
            .filter_map(|(index, key)| tracked.get(key).map(|node| (index, node.clone())))
            .collect()
    }

    pub fn node_at(&self, index: usize) -> Option<Rc<GroupNode>> {
        self.reconcile();
        let key = self.order.borrow().get(index).cloned()?;
        self.tracked.borrow().get(&key).cloned()
    }

    /// Tracking keys in sequence order.
    pub fn keys(&self) -> Vec<TrackKey> {
        self.reconcile();
        self.order.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.reconcile();
        self.order.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn nodes(&self) -> Vec<Rc<GroupNode>> {
        self.iter().into_iter().map(|(_, node)| node).collect()
    }

    pub(crate) fn dispose(&self) {
        let tracked = self.tracked.take();
        self.order.take();
        for node in tracked.into_values() {
            node.dispose();
        }
    }
}

impl ValidationState for CollectionNode {
    fn invalid(&self) -> Result<bool, ValidationError> {
        for node in self.nodes() {
            if node.invalid()? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn pending(&self) -> Result<bool, ValidationError> {
        for node in self.nodes() {
            if node.pending()? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn dirty(&self) -> bool {
        let nodes = self.nodes();
        !nodes.is_empty() && nodes.iter().all(|node| node.dirty())
    }

    fn any_dirty(&self) -> bool {
        self.nodes().iter().any(|node| node.any_dirty())
    }

    fn touch(&self) {
        for node in self.nodes() {
            node.touch();
        }
    }

    fn reset(&self) {
        for node in self.nodes() {
            node.reset();
        }
    }

    fn model(&self) -> Option<Value> {
        None
    }

    fn set_model(&self, _value: Value) -> Result<(), StoreError> {
        Ok(())
    }

    fn params(&self) -> Value {
        let params: Map<String, Value> = self
            .iter()
            .into_iter()
            .map(|(index, node)| (index.to_string(), node.params()))
            .collect();
        Value::Object(params)
    }

    fn flatten_params(&self) -> Vec<FlatParam> {
        self.iter()
            .into_iter()
            .flat_map(|(index, node)| prefixed(&index.to_string(), node.flatten_params()))
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
