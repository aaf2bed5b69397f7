//! Validation configuration.
//!
//! # Example
//!
//! ```ignore
//! use futures::executor::LocalPool;
//! use spark_validation::ValidationConfig;
//!
//! let mut pool = LocalPool::new();
//! let config = ValidationConfig::new()
//!     .with_spawner(pool.spawner())
//!     .with_label("signup-form");
//!
//! // ... after reading a deferred rule
//! pool.run_until_stalled(); // one scheduler turn
//! ```

use std::fmt;

use futures::executor::LocalSpawner;

const DEFAULT_LABEL: &str = "validation";

/// Options shared by every node of one validation tree.
#[derive(Clone, Default)]
pub struct ValidationConfig {
    spawner: Option<LocalSpawner>,
    label: Option<String>,
}

impl ValidationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Executor used to settle deferred rule outcomes. Without one, a rule
    /// that defers reports `ValidationError::NoScheduler`.
    pub fn with_spawner(mut self, spawner: LocalSpawner) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Name attached to log events of this tree.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn spawner(&self) -> Option<&LocalSpawner> {
        self.spawner.as_ref()
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(DEFAULT_LABEL)
    }
}

impl fmt::Debug for ValidationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationConfig")
            .field("spawner", &self.spawner.is_some())
            .field("label", &self.label())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::LocalPool;

    #[test]
    fn test_defaults() {
        let config = ValidationConfig::new();
        assert!(config.spawner().is_none());
        assert_eq!(config.label(), "validation");
    }

    #[test]
    fn test_builder() {
        let pool = LocalPool::new();
        let config = ValidationConfig::new()
            .with_spawner(pool.spawner())
            .with_label("signup");
        assert!(config.spawner().is_some());
        assert_eq!(config.label(), "signup");
    }
}
