//! # spark-validation
//!
//! Reactive validation trees for Rust.
//!
//! Built on [spark-signals](https://github.com/RLabs-Inc/spark-signals) for fine-grained
//! reactivity.
//!
//! ## Architecture
//!
//! A declarative [`GroupSchema`] is mirrored into a tree of nodes bound to a
//! reactive JSON [`Store`]. Rule results are lazy `Derived` caches keyed on
//! exactly the store paths the predicate read; every aggregate attribute is
//! computed from those caches on read:
//! ```text
//! Store paths → RuleNode derived → GroupNode / CollectionNode / PathGroupNode → reader
//! ```
//!
//! Collections (`$each`) keep one element node per tracking key, so dirty
//! state follows an element through inserts, deletes and reorders.
//!
//! ## Modules
//!
//! - [`types`] - Paths, segments and status flags
//! - [`store`] - Reactive JSON store with per-path change tracking
//! - [`schema`] - Schema builders (`GroupSchema`, `EachSchema`, `TrackBy`)
//! - [`rules`] - Rule wrapper, built-in rules and composition
//! - [`tree`] - Validation nodes and the `ValidationState` trait
//! - [`validation`] - Host handle (static or dynamic schema, teardown)

pub mod config;
pub mod error;
pub mod rules;
pub mod schema;
pub mod store;
pub mod tree;
pub mod types;
pub mod validation;

// Re-export commonly used items
pub use types::*;

pub use config::ValidationConfig;

pub use error::{RuleError, SchemaError, StoreError, ValidationError};

pub use rules::{Context, Outcome, Rule};

pub use schema::{EachSchema, GroupSchema, SchemaEntry, TrackBy, TrackKey, EACH_KEY};

pub use store::Store;

pub use tree::{
    CollectionNode, Entry, FlatParam, GroupKind, GroupNode, Node, PathEntry, PathGroupNode,
    RuleNode, ValidationState,
};

pub use validation::Validation;
