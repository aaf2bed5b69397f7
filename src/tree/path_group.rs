//! Group-by-Path Node - Aggregation over nodes elsewhere in the tree.
//!
//! Paths are tree paths from the root (`"name"`, `"items.$each.0.title"`),
//! resolved on every read. A path with no node behind it yields
//! [`PathEntry::Absent`], which counts as invalid in the aggregate.

use std::cell::{Cell, RefCell};
use std::rc::Weak;

use serde_json::{Map, Value};
use tracing::warn;

use super::group::GroupNode;
use super::params::FlatParam;
use super::{Node, ValidationState};
use crate::error::{StoreError, ValidationError};
use crate::types::Path;

/// One resolved path of a path group.
#[derive(Debug, Clone)]
pub enum PathEntry {
    Node(Node),
    /// Nothing at this path. Its own `invalid` reads false.
    Absent,
}

impl PathEntry {
    pub fn node(&self) -> Option<&Node> {
        match self {
            PathEntry::Node(node) => Some(node),
            PathEntry::Absent => None,
        }
    }

    pub fn invalid(&self) -> Result<bool, ValidationError> {
        match self {
            PathEntry::Node(node) => node.invalid(),
            PathEntry::Absent => Ok(false),
        }
    }
}

pub struct PathGroupNode {
    root: Weak<GroupNode>,
    paths: RefCell<Vec<Path>>,
    /// Set while this node is aggregating, to cut self-referencing paths.
    busy: Cell<bool>,
}

/// Clears the busy flag when an aggregation returns.
struct Busy<'a>(&'a Cell<bool>);

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl PathGroupNode {
    pub(super) fn new(root: Weak<GroupNode>, paths: Vec<Path>) -> Self {
        Self {
            root,
            paths: RefCell::new(paths),
            busy: Cell::new(false),
        }
    }

    pub fn paths(&self) -> Vec<Path> {
        self.paths.borrow().clone()
    }

    pub(super) fn set_paths(&self, paths: Vec<Path>) {
        *self.paths.borrow_mut() = paths;
    }

    pub fn entry(&self, path: &Path) -> PathEntry {
        match self.root.upgrade().and_then(|root| root.resolve(path)) {
            Some(node) => PathEntry::Node(node),
            None => PathEntry::Absent,
        }
    }

    /// Each configured path with what it resolves to, in order.
    pub fn entries(&self) -> Vec<(Path, PathEntry)> {
        self.paths()
            .into_iter()
            .map(|path| {
                let entry = self.entry(&path);
                (path, entry)
            })
            .collect()
    }

    fn nodes(&self) -> Vec<Node> {
        self.entries()
            .into_iter()
            .filter_map(|(_, entry)| match entry {
                PathEntry::Node(node) => Some(node),
                PathEntry::Absent => None,
            })
            .collect()
    }

    /// Run `read` unless this node is already being read further up the stack.
    fn guarded<T>(&self, fallback: T, read: impl FnOnce() -> T) -> T {
        if self.busy.replace(true) {
            warn!(paths = ?self.paths(), "path group refers to itself, reading as clean");
            return fallback;
        }
        let _busy = Busy(&self.busy);
        read()
    }
}

impl ValidationState for PathGroupNode {
    fn invalid(&self) -> Result<bool, ValidationError> {
        self.guarded(Ok(false), || {
            for (_, entry) in self.entries() {
                let invalid = match entry {
                    PathEntry::Node(node) => node.invalid()?,
                    PathEntry::Absent => true,
                };
                if invalid {
                    return Ok(true);
                }
            }
            Ok(false)
        })
    }

    fn pending(&self) -> Result<bool, ValidationError> {
        self.guarded(Ok(false), || {
            for node in self.nodes() {
                if node.pending()? {
                    return Ok(true);
                }
            }
            Ok(false)
        })
    }

    fn dirty(&self) -> bool {
        self.guarded(false, || {
            let nodes = self.nodes();
            !nodes.is_empty() && nodes.iter().all(|node| node.dirty())
        })
    }

    fn any_dirty(&self) -> bool {
        self.guarded(false, || self.nodes().iter().any(|node| node.any_dirty()))
    }

    fn touch(&self) {
        self.guarded((), || {
            for node in self.nodes() {
                node.touch();
            }
        })
    }

    fn reset(&self) {
        self.guarded((), || {
            for node in self.nodes() {
                node.reset();
            }
        })
    }

    fn model(&self) -> Option<Value> {
        None
    }

    fn set_model(&self, _value: Value) -> Result<(), StoreError> {
        Ok(())
    }

    fn params(&self) -> Value {
        self.guarded(Value::Object(Map::new()), || {
            let params: Map<String, Value> = self
                .entries()
                .into_iter()
                .map(|(path, entry)| {
                    let params = entry.node().map_or(Value::Null, |node| node.params());
                    (path.to_string(), params)
                })
                .collect();
            Value::Object(params)
        })
    }

    /// Members are reported where they live; a path group adds nothing.
    fn flatten_params(&self) -> Vec<FlatParam> {
        Vec::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
