//! Tree Builder - Instantiates and reconciles nodes from a schema.
//!
//! The same walk builds a fresh tree and re-applies a changed schema to an
//! existing one. Entries are matched by name:
//!
//! - Rules are reused when name, predicate and params are unchanged
//! - Groups, collections and path groups are reused when the kind matches,
//!   and the new schema is applied to them recursively
//! - Anything left over is disposed (pending work aborted)
//!
//! Reused nodes keep their dirty flags; new nodes start clean.

use std::rc::{Rc, Weak};

use tracing::debug;

use super::collection::CollectionNode;
use super::group::{Entry, GroupKind, GroupNode};
use super::location::Location;
use super::path_group::PathGroupNode;
use super::rule_node::RuleNode;
use super::Node;
use crate::config::ValidationConfig;
use crate::rules::Rule;
use crate::schema::{GroupSchema, SchemaEntry};
use crate::store::Store;

/// Handles every node of one tree carries.
#[derive(Clone)]
pub(crate) struct Wiring {
    pub(crate) store: Store,
    pub(crate) config: Rc<ValidationConfig>,
    /// Root of the tree, for path-group resolution.
    pub(crate) root: Weak<GroupNode>,
}

// =============================================================================
// Entry Points
// =============================================================================

/// Build the root group of a new tree.
pub(crate) fn build_root(
    store: Store,
    config: Rc<ValidationConfig>,
    schema: &GroupSchema,
) -> Rc<GroupNode> {
    Rc::new_cyclic(|root| {
        let wiring = Wiring {
            store,
            config,
            root: root.clone(),
        };
        let group = GroupNode::new(GroupKind::Root, Location::root(), wiring);
        apply_group(&group, schema);
        group
    })
}

/// Build the node of one collection element.
pub(crate) fn element(
    parent: &Rc<Location>,
    index: usize,
    wiring: &Wiring,
    item: &GroupSchema,
) -> Rc<GroupNode> {
    let node = Rc::new(GroupNode::new(
        GroupKind::Element,
        Location::slot(parent, index),
        wiring.clone(),
    ));
    apply_group(&node, item);
    node
}

/// Bring `group`'s entries in line with `schema`.
pub(crate) fn apply_group(group: &GroupNode, schema: &GroupSchema) {
    let mut previous = group.entries.take();
    let mut entries = Vec::with_capacity(schema.entries().len());
    let mut reused = 0usize;

    for (name, entry) in schema.entries() {
        match entry {
            SchemaEntry::Rule(rule) => {
                let node = match take_rule(&mut previous, name, rule) {
                    Some(existing) => {
                        reused += 1;
                        existing
                    }
                    None => {
                        RuleNode::new(name, rule.clone(), group.location.clone(), &group.wiring)
                    }
                };
                entries.push(Entry::Rule(node));
            }
            SchemaEntry::Group(child) => {
                let node = match take_child(&mut previous, name) {
                    Some(Node::Group(existing)) => {
                        reused += 1;
                        apply_group(&existing, child);
                        existing
                    }
                    other => {
                        discard(other);
                        let fresh = Rc::new(GroupNode::new(
                            GroupKind::Field,
                            Location::key(&group.location, name),
                            group.wiring.clone(),
                        ));
                        apply_group(&fresh, child);
                        fresh
                    }
                };
                entries.push(Entry::Child {
                    name: name.clone(),
                    node: Node::Group(node),
                    params: child.params().cloned(),
                });
            }
            SchemaEntry::Each(each) => {
                let node = match take_child(&mut previous, name) {
                    Some(Node::Collection(existing)) => {
                        reused += 1;
                        existing.apply(each);
                        existing
                    }
                    other => {
                        discard(other);
                        // The collection validates the owning field's value
                        Rc::new(CollectionNode::new(
                            group.location.clone(),
                            group.wiring.clone(),
                            each.clone(),
                        ))
                    }
                };
                entries.push(Entry::Child {
                    name: name.clone(),
                    node: Node::Collection(node),
                    params: None,
                });
            }
            SchemaEntry::Paths(paths) => {
                let node = match take_child(&mut previous, name) {
                    Some(Node::Paths(existing)) => {
                        reused += 1;
                        existing.set_paths(paths.clone());
                        existing
                    }
                    other => {
                        discard(other);
                        Rc::new(PathGroupNode::new(group.wiring.root.clone(), paths.clone()))
                    }
                };
                entries.push(Entry::Child {
                    name: name.clone(),
                    node: Node::Paths(node),
                    params: None,
                });
            }
        }
    }

    let dropped = previous.len();
    for entry in previous {
        match entry {
            Entry::Rule(rule) => rule.dispose(),
            Entry::Child { node, .. } => node.dispose(),
        }
    }

    if reused > 0 || dropped > 0 {
        debug!(
            tree = %group.wiring.config.label(),
            path = %group.path(),
            entries = entries.len(),
            reused,
            dropped,
            "reconciled group"
        );
    }
    *group.entries.borrow_mut() = entries;
}

// =============================================================================
// Matching
// =============================================================================

/// Remove and return the rule node named `name` if it runs the same check.
fn take_rule(previous: &mut Vec<Entry>, name: &str, rule: &Rule) -> Option<Rc<RuleNode>> {
    let index = previous.iter().position(|entry| match entry {
        Entry::Rule(existing) => {
            existing.name() == name
                && existing.rule().same_predicate(rule)
                && existing.params() == rule.params()
        }
        Entry::Child { .. } => false,
    })?;
    match previous.remove(index) {
        Entry::Rule(existing) => Some(existing),
        Entry::Child { .. } => None,
    }
}

/// Remove and return the child named `name`, whatever its kind.
fn take_child(previous: &mut Vec<Entry>, name: &str) -> Option<Node> {
    let index = previous.iter().position(
        |entry| matches!(entry, Entry::Child { name: existing, .. } if existing == name),
    )?;
    match previous.remove(index) {
        Entry::Child { node, .. } => Some(node),
        Entry::Rule(_) => None,
    }
}

/// Dispose a child replaced by one of a different kind.
fn discard(node: Option<Node>) {
    if let Some(node) = node {
        node.dispose();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{min_length, required};
    use crate::schema::EachSchema;
    use crate::tree::ValidationState;
    use serde_json::json;

    fn setup(schema: &GroupSchema) -> (Store, Rc<GroupNode>) {
        let store = Store::new(json!({
            "name": "",
            "tags": ["a", "b"],
        }));
        let root = build_root(store.clone(), Rc::new(ValidationConfig::new()), schema);
        (store, root)
    }

    #[test]
    fn test_builds_shape_in_declaration_order() {
        let schema = GroupSchema::new()
            .field("name", GroupSchema::new().rule("required", required()))
            .field("tags", GroupSchema::new().each(EachSchema::new(GroupSchema::new())))
            .paths("everything", ["name", "tags"]);
        let (_store, root) = setup(&schema);

        let names: Vec<String> = root.children().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["name", "tags", "everything"]);
        assert!(root.group("name").is_some_and(|name| name.rule("required").is_some()));
        assert!(root.group("tags").and_then(|tags| tags.collection()).is_some());
        assert!(root.child("everything").is_some_and(|node| node.as_paths().is_some()));
    }

    #[test]
    fn test_reapply_keeps_matching_nodes() {
        let required = required();
        let schema = GroupSchema::new()
            .field("name", GroupSchema::new().rule("required", required.clone()));
        let (_store, root) = setup(&schema);

        let name = root.group("name").unwrap();
        let rule = name.rule("required").unwrap();
        name.touch();

        let next = GroupSchema::new()
            .field("name", GroupSchema::new().rule("required", required).rule("min", min_length(2)))
            .field("tags", GroupSchema::new());
        apply_group(&root, &next);

        let again = root.group("name").unwrap();
        assert!(Rc::ptr_eq(&name, &again));
        assert!(Rc::ptr_eq(&rule, &again.rule("required").unwrap()));
        assert!(again.rule("min").is_some());
        assert!(again.dirty());
        assert!(!root.group("tags").unwrap().dirty());
    }

    #[test]
    fn test_reapply_replaces_changed_rule() {
        let schema =
            GroupSchema::new().field("name", GroupSchema::new().rule("min", min_length(2)));
        let (_store, root) = setup(&schema);
        let before = root.group("name").unwrap().rule("min").unwrap();

        // Same name, different params
        let next = GroupSchema::new().field("name", GroupSchema::new().rule("min", min_length(3)));
        apply_group(&root, &next);

        let after = root.group("name").unwrap().rule("min").unwrap();
        assert!(!Rc::ptr_eq(&before, &after));
        assert_eq!(after.params(), json!({ "type": "minLength", "min": 3 }));
    }

    #[test]
    fn test_kind_change_builds_fresh_node() {
        let schema = GroupSchema::new().field("tags", GroupSchema::new());
        let (_store, root) = setup(&schema);
        root.group("tags").unwrap().touch();

        let next = GroupSchema::new().paths("tags", ["name"]);
        apply_group(&root, &next);

        let tags = root.child("tags").unwrap();
        assert!(tags.as_paths().is_some());
        assert!(!tags.dirty());
    }

    #[test]
    fn test_removed_entries_are_dropped() {
        let schema = GroupSchema::new()
            .field("name", GroupSchema::new())
            .field("tags", GroupSchema::new());
        let (_store, root) = setup(&schema);

        apply_group(&root, &GroupSchema::new().field("tags", GroupSchema::new()));
        assert!(root.child("name").is_none());
        assert_eq!(root.children().len(), 1);
    }
}
