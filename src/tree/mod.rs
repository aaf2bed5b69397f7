//! Validation Tree - Nodes mirroring the schema over the live store.
//!
//! - [`GroupNode`] - Fields and nested objects (owns rules and children)
//! - [`RuleNode`] - One rule bound to its field's value
//! - [`CollectionNode`] - `$each` element nodes, tracked by key
//! - [`PathGroupNode`] - Aggregation over arbitrary tree paths
//!
//! Every node implements [`ValidationState`]. Rule results are cached by
//! `Derived`s; the aggregates are recomputed from those caches on read, so a
//! reader inside a `derived`/`effect` depends on exactly the rules and store
//! paths the aggregate touched.

mod builder;
mod collection;
mod group;
mod location;
mod params;
mod path_group;
mod rule_node;

pub(crate) use builder::{apply_group, build_root};

pub use collection::CollectionNode;
pub use group::{Entry, GroupKind, GroupNode};
pub use params::FlatParam;
pub use path_group::{PathEntry, PathGroupNode};
pub use rule_node::RuleNode;

use std::rc::Rc;

use serde_json::Value;

use crate::error::{StoreError, ValidationError};
use crate::types::{NodeStatus, Segment};

// =============================================================================
// ValidationState
// =============================================================================

/// Reactive attributes shared by every node.
pub trait ValidationState {
    /// True if an own rule fails or any descendant is invalid.
    fn invalid(&self) -> Result<bool, ValidationError>;

    /// True while a deferred rule in this subtree is outstanding.
    fn pending(&self) -> Result<bool, ValidationError>;

    /// Touched (groups: touched, or every child is dirty).
    fn dirty(&self) -> bool;

    /// This node or any descendant is dirty.
    fn any_dirty(&self) -> bool;

    /// Mark this node and its subtree as touched.
    fn touch(&self);

    /// Clear dirty flags of this node and its subtree.
    fn reset(&self);

    /// Current bound value, `None` for nodes without a model.
    fn model(&self) -> Option<Value>;

    /// Write through to the bound value and touch the subtree.
    /// No-op for nodes without a model.
    fn set_model(&self, value: Value) -> Result<(), StoreError>;

    /// Rule name / child name to parameter payload.
    fn params(&self) -> Value;

    /// Every rule of the subtree with its path, depth-first in declaration order.
    fn flatten_params(&self) -> Vec<FlatParam>;

    fn error(&self) -> Result<bool, ValidationError> {
        Ok(self.dirty() && self.invalid()?)
    }

    fn any_error(&self) -> Result<bool, ValidationError> {
        Ok(self.any_dirty() && self.invalid()?)
    }

    /// All boolean attributes at once.
    fn status(&self) -> Result<NodeStatus, ValidationError> {
        let mut status = NodeStatus::NONE;
        let invalid = self.invalid()?;
        let dirty = self.dirty();
        let any_dirty = self.any_dirty();
        status.set(NodeStatus::INVALID, invalid);
        status.set(NodeStatus::DIRTY, dirty);
        status.set(NodeStatus::ANY_DIRTY, any_dirty);
        status.set(NodeStatus::ERROR, dirty && invalid);
        status.set(NodeStatus::ANY_ERROR, any_dirty && invalid);
        status.set(NodeStatus::PENDING, self.pending()?);
        Ok(status)
    }
}

// =============================================================================
// Node
// =============================================================================

/// Any child of a group.
#[derive(Clone)]
pub enum Node {
    Group(Rc<GroupNode>),
    Collection(Rc<CollectionNode>),
    Paths(Rc<PathGroupNode>),
}

impl Node {
    pub fn as_group(&self) -> Option<&Rc<GroupNode>> {
        match self {
            Node::Group(group) => Some(group),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&Rc<CollectionNode>> {
        match self {
            Node::Collection(collection) => Some(collection),
            _ => None,
        }
    }

    pub fn as_paths(&self) -> Option<&Rc<PathGroupNode>> {
        match self {
            Node::Paths(paths) => Some(paths),
            _ => None,
        }
    }

    /// Same node instance.
    pub fn ptr_eq(&self, other: &Node) -> bool {
        match (self, other) {
            (Node::Group(a), Node::Group(b)) => Rc::ptr_eq(a, b),
            (Node::Collection(a), Node::Collection(b)) => Rc::ptr_eq(a, b),
            (Node::Paths(a), Node::Paths(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// One step down the tree: a group child by name or a collection
    /// element by index.
    pub fn child(&self, segment: &Segment) -> Option<Node> {
        match self {
            Node::Group(group) => group.child(&segment.as_string()),
            Node::Collection(collection) => {
                collection.node_at(segment.index()?).map(Node::Group)
            }
            Node::Paths(_) => None,
        }
    }

    pub(crate) fn dispose(&self) {
        match self {
            Node::Group(group) => group.dispose(),
            Node::Collection(collection) => collection.dispose(),
            Node::Paths(_) => {}
        }
    }

    fn state(&self) -> &dyn ValidationState {
        match self {
            Node::Group(group) => group.as_ref(),
            Node::Collection(collection) => collection.as_ref(),
            Node::Paths(paths) => paths.as_ref(),
        }
    }
}

impl ValidationState for Node {
    fn invalid(&self) -> Result<bool, ValidationError> {
        self.state().invalid()
    }

    fn pending(&self) -> Result<bool, ValidationError> {
        self.state().pending()
    }

    fn dirty(&self) -> bool {
        self.state().dirty()
    }

    fn any_dirty(&self) -> bool {
        self.state().any_dirty()
    }

    fn touch(&self) {
        self.state().touch()
    }

    fn reset(&self) {
        self.state().reset()
    }

    fn model(&self) -> Option<Value> {
        self.state().model()
    }

    fn set_model(&self, value: Value) -> Result<(), StoreError> {
        self.state().set_model(value)
    }

    fn params(&self) -> Value {
        self.state().params()
    }

    fn flatten_params(&self) -> Vec<FlatParam> {
        self.state().flatten_params()
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Node::Group(group) => write!(f, "Group({})", group.path()),
            Node::Collection(collection) => write!(f, "Collection({})", collection.path()),
            Node::Paths(paths) => write!(f, "Paths({:?})", paths.paths()),
        }
    }
}
