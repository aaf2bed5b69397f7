//! Store - Reactive JSON data model.
//!
//! Holds one `serde_json::Value` and a version signal per path that has ever
//! been read. Reads register a dependency on the exact path; writes bump the
//! version of every overlapping path (the written path, its ancestors and its
//! descendants) so readers of unrelated siblings stay cached.
//!
//! Version signals are never dropped: the map holds one entry per distinct
//! path read over the store's lifetime (see [`Store::tracked_paths`]). For a
//! validation tree that is bounded by the schema's paths times the longest
//! each sequence seen, so build a fresh store rather than reusing one across
//! unrelated documents.
//!
//! # Example
//!
//! ```ignore
//! use serde_json::json;
//! use spark_validation::{Path, Store};
//!
//! let store = Store::new(json!({ "items": [{ "value": 1 }] }));
//! let value = store.get(&Path::parse("items.0.value")); // tracked read
//! store.set(&Path::parse("items.0.value"), json!(3))?;  // invalidates it
//! ```

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::{Map, Value};
use spark_signals::{batch, signal, Signal};
use tracing::trace;

use crate::error::StoreError;
use crate::types::{Path, Segment};

// =============================================================================
// Store Handle
// =============================================================================

/// Cheap-clone handle to a reactive JSON document.
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

struct StoreInner {
    value: RefCell<Value>,
    /// One per distinct path ever read. Only grows.
    versions: RefCell<HashMap<Path, Signal<u64>>>,
    clock: Cell<u64>,
}

impl Store {
    pub fn new(value: Value) -> Self {
        Self {
            inner: Rc::new(StoreInner {
                value: RefCell::new(value),
                versions: RefCell::new(HashMap::new()),
                clock: Cell::new(0),
            }),
        }
    }

    /// True if both handles point at the same document.
    pub fn ptr_eq(&self, other: &Store) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Tracked read of the value at `path`. `None` if nothing is stored there.
    pub fn get(&self, path: &Path) -> Option<Value> {
        self.track(path);
        self.peek(path)
    }

    /// Tracked read of the whole document.
    pub fn root(&self) -> Value {
        self.get(&Path::root()).unwrap_or(Value::Null)
    }

    /// Untracked read of the value at `path`.
    pub fn peek(&self, path: &Path) -> Option<Value> {
        let value = self.inner.value.borrow();
        lookup(&value, path).cloned()
    }

    /// Number of distinct paths with a version signal.
    pub fn tracked_paths(&self) -> usize {
        self.inner.versions.borrow().len()
    }

    /// Untracked clone of the whole document.
    pub fn snapshot(&self) -> Value {
        self.inner.value.borrow().clone()
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Replace the value at `path`, creating intermediate objects as needed.
    ///
    /// Writing one past the end of an array appends.
    pub fn set(&self, path: &Path, value: Value) -> Result<(), StoreError> {
        {
            let mut root = self.inner.value.borrow_mut();
            let slot = slot_mut(&mut root, path)?;
            *slot = value;
        }
        self.notify(path);
        Ok(())
    }

    /// Mutate the existing value at `path` in place.
    pub fn update(&self, path: &Path, f: impl FnOnce(&mut Value)) -> Result<(), StoreError> {
        {
            let mut root = self.inner.value.borrow_mut();
            f(existing_mut(&mut root, path)?);
        }
        self.notify(path);
        Ok(())
    }

    /// Append to the array at `path`.
    ///
    /// Existing elements are untouched, so only readers of the array itself
    /// (and its ancestors) are invalidated.
    pub fn push(&self, path: &Path, value: Value) -> Result<(), StoreError> {
        let index = {
            let mut root = self.inner.value.borrow_mut();
            let items = array_mut(&mut root, path)?;
            items.push(value);
            items.len() - 1
        };
        self.notify_append(path, index);
        Ok(())
    }

    /// Insert into the array at `path`, shifting later elements.
    pub fn insert(&self, path: &Path, index: usize, value: Value) -> Result<(), StoreError> {
        {
            let mut root = self.inner.value.borrow_mut();
            let items = array_mut(&mut root, path)?;
            if index > items.len() {
                return Err(StoreError::IndexOutOfBounds {
                    path: path.to_string(),
                    index,
                    len: items.len(),
                });
            }
            items.insert(index, value);
        }
        self.notify(path);
        Ok(())
    }

    /// Remove and return the element at `index` of the array at `path`.
    pub fn remove(&self, path: &Path, index: usize) -> Result<Value, StoreError> {
        let removed = {
            let mut root = self.inner.value.borrow_mut();
            let items = array_mut(&mut root, path)?;
            if index >= items.len() {
                return Err(StoreError::IndexOutOfBounds {
                    path: path.to_string(),
                    index,
                    len: items.len(),
                });
            }
            items.remove(index)
        };
        self.notify(path);
        Ok(removed)
    }

    /// Delete the object key addressed by `path`. Returns the old value.
    pub fn delete(&self, path: &Path) -> Result<Option<Value>, StoreError> {
        let Some(parent) = path.parent() else {
            return Err(StoreError::NotAContainer {
                path: path.to_string(),
            });
        };
        let Some(Segment::Key(key)) = path.last() else {
            return Err(StoreError::NotAContainer {
                path: path.to_string(),
            });
        };
        let removed = {
            let mut root = self.inner.value.borrow_mut();
            match existing_mut(&mut root, &parent)? {
                Value::Object(map) => map.remove(key),
                _ => {
                    return Err(StoreError::NotAContainer {
                        path: parent.to_string(),
                    });
                }
            }
        };
        self.notify(path);
        Ok(removed)
    }

    // -------------------------------------------------------------------------
    // Dependency tracking
    // -------------------------------------------------------------------------

    fn track(&self, path: &Path) {
        let version = {
            let mut versions = self.inner.versions.borrow_mut();
            versions
                .entry(path.clone())
                .or_insert_with(|| signal(0))
                .clone()
        };
        // Reading inside a derived records the dependency
        let _ = version.get();
    }

    fn notify(&self, path: &Path) {
        self.bump(path, |tracked| tracked.overlaps(path));
    }

    fn notify_append(&self, path: &Path, index: usize) {
        let appended = path.join(index);
        self.bump(path, |tracked| {
            tracked.is_prefix_of(path) || appended.is_prefix_of(tracked)
        });
    }

    fn bump(&self, path: &Path, affected: impl Fn(&Path) -> bool) {
        // Collect first: setting a version may synchronously re-enter the store
        let touched: Vec<Signal<u64>> = self
            .inner
            .versions
            .borrow()
            .iter()
            .filter(|(tracked, _)| affected(tracked))
            .map(|(_, version)| version.clone())
            .collect();

        let stamp = self.inner.clock.get() + 1;
        self.inner.clock.set(stamp);
        trace!(path = %path, readers = touched.len(), stamp, "store write");

        batch(|| {
            for version in &touched {
                version.set(stamp);
            }
        });
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("value", &self.inner.value.borrow())
            .field("tracked_paths", &self.tracked_paths())
            .finish()
    }
}

// =============================================================================
// Path Navigation
// =============================================================================

/// Look up `path` inside `value`.
pub(crate) fn lookup<'a>(value: &'a Value, path: &Path) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.segments() {
        current = match current {
            Value::Object(map) => map.get(&segment.as_string())?,
            Value::Array(items) => items.get(segment.index()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn prefix(path: &Path, depth: usize) -> String {
    Path::from(path.segments()[..depth].to_vec()).to_string()
}

/// Mutable slot at `path`, creating missing object entries on the way.
fn slot_mut<'a>(root: &'a mut Value, path: &Path) -> Result<&'a mut Value, StoreError> {
    let mut current = root;
    for (depth, segment) in path.segments().iter().enumerate() {
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        current = match current {
            Value::Object(map) => map.entry(segment.as_string()).or_insert(Value::Null),
            Value::Array(items) => {
                let index = segment.index().ok_or_else(|| StoreError::NotAContainer {
                    path: prefix(path, depth + 1),
                })?;
                let len = items.len();
                if index == len {
                    items.push(Value::Null);
                }
                items
                    .get_mut(index)
                    .ok_or_else(|| StoreError::IndexOutOfBounds {
                        path: prefix(path, depth),
                        index,
                        len,
                    })?
            }
            _ => {
                return Err(StoreError::NotAContainer {
                    path: prefix(path, depth),
                });
            }
        };
    }
    Ok(current)
}

/// Mutable reference to an existing value at `path`.
fn existing_mut<'a>(root: &'a mut Value, path: &Path) -> Result<&'a mut Value, StoreError> {
    let mut current = root;
    for (depth, segment) in path.segments().iter().enumerate() {
        current = match current {
            Value::Object(map) => map.get_mut(&segment.as_string()),
            Value::Array(items) => segment.index().and_then(|index| items.get_mut(index)),
            _ => {
                return Err(StoreError::NotAContainer {
                    path: prefix(path, depth),
                });
            }
        }
        .ok_or_else(|| StoreError::Missing {
            path: prefix(path, depth + 1),
        })?;
    }
    Ok(current)
}

fn array_mut<'a>(root: &'a mut Value, path: &Path) -> Result<&'a mut Vec<Value>, StoreError> {
    match existing_mut(root, path)? {
        Value::Array(items) => Ok(items),
        _ => Err(StoreError::NotAContainer {
            path: path.to_string(),
        }),
    }
}

// =============================================================================
// Tests
// =============================================================================
