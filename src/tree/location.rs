//! Data locations of tree nodes.
//!
//! A location is a chain of steps back to the root. Collection elements use a
//! slot step whose index is rewritten on every reconciliation, so a node keeps
//! its identity while the element it validates moves through the sequence.
//! The slot is a signal: a rule that read a moved path re-runs on its next read.

use std::rc::Rc;

use spark_signals::{signal, untrack, Signal};

use crate::types::{Path, Segment};

pub(crate) enum Step {
    Root,
    Key(String),
    Slot(Signal<usize>),
}

pub(crate) struct Location {
    parent: Option<Rc<Location>>,
    step: Step,
}

impl Location {
    pub(crate) fn root() -> Rc<Self> {
        Rc::new(Self {
            parent: None,
            step: Step::Root,
        })
    }

    pub(crate) fn key(parent: &Rc<Location>, key: &str) -> Rc<Self> {
        Rc::new(Self {
            parent: Some(parent.clone()),
            step: Step::Key(key.to_string()),
        })
    }

    pub(crate) fn slot(parent: &Rc<Location>, index: usize) -> Rc<Self> {
        Rc::new(Self {
            parent: Some(parent.clone()),
            step: Step::Slot(signal(index)),
        })
    }

    /// Move a slot to a new position. No-op for other steps.
    pub(crate) fn set_slot(&self, index: usize) {
        if let Step::Slot(slot) = &self.step {
            if untrack(|| slot.get()) != index {
                slot.set(index);
            }
        }
    }

    /// Current data path. Tracked: reading it inside a derived depends on
    /// every slot along the chain.
    pub(crate) fn path(&self) -> Path {
        let mut path = match &self.parent {
            Some(parent) => parent.path(),
            None => Path::root(),
        };
        match &self.step {
            Step::Root => {}
            Step::Key(key) => path.push(key.as_str()),
            Step::Slot(slot) => path.push(Segment::Index(slot.get())),
        }
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_moves_descendant_paths() {
        let root = Location::root();
        let items = Location::key(&root, "items");
        let element = Location::slot(&items, 0);
        let value = Location::key(&element, "value");

        assert_eq!(value.path().to_string(), "items.0.value");
        element.set_slot(3);
        assert_eq!(value.path().to_string(), "items.3.value");
        assert!(root.path().is_empty());
    }

    #[test]
    fn test_moving_a_slot_invalidates_path_readers() {
        let items = Location::key(&Location::root(), "items");
        let element = Location::slot(&items, 1);
        let name = Location::key(&element, "name");

        let reader = {
            let name = name.clone();
            spark_signals::derived(move || name.path().to_string())
        };
        assert_eq!(reader.get(), "items.1.name");
        element.set_slot(2);
        assert_eq!(reader.get(), "items.2.name");
    }
}
