//! Error types.
//!
//! Every error is `Clone + PartialEq` so it can be cached inside a `Derived`
//! alongside successful rule results and handed to every reader.

use thiserror::Error;

// =============================================================================
// Validation Errors
// =============================================================================

/// Errors surfaced to readers of node attributes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A predicate returned an error synchronously.
    #[error("rule `{rule}` at `{path}` failed: {message}")]
    Rule {
        rule: String,
        path: String,
        message: String,
    },

    /// A predicate returned a deferred outcome but no spawner is configured.
    #[error("rule `{rule}` at `{path}` returned a deferred outcome but no scheduler is configured")]
    NoScheduler { rule: String, path: String },

    /// The executor refused the deferred outcome.
    #[error("rule `{rule}` at `{path}` could not be scheduled: {message}")]
    Schedule {
        rule: String,
        path: String,
        message: String,
    },

    /// A dynamic schema produced an invalid schema on refresh.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

// =============================================================================
// Schema Errors
// =============================================================================

/// Construction-time schema defects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("entry `{name}` is declared twice in group `{group}`")]
    DuplicateEntry { group: String, name: String },

    #[error("group `{group}` has an entry with an empty name")]
    EmptyName { group: String },

    #[error("entry name `{name}` in group `{group}` uses the reserved `$` prefix")]
    ReservedName { group: String, name: String },

    #[error("path group `{field}` contains an empty path")]
    EmptyPath { field: String },

    #[error("`$trackBy` of collection `{group}` names an empty field")]
    EmptyTrackField { group: String },
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors from writes into the reactive store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("`{path}` does not point into an object or array")]
    NotAContainer { path: String },

    #[error("index {index} is out of bounds at `{path}` (len {len})")]
    IndexOutOfBounds {
        path: String,
        index: usize,
        len: usize,
    },

    #[error("nothing stored at `{path}`")]
    Missing { path: String },
}

// =============================================================================
// Rule Errors
// =============================================================================

/// Error a predicate reports, either synchronously (propagated to the reader)
/// or from a deferred outcome (coerced to a failed result).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct RuleError(pub String);

impl RuleError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
