//! Configuration types for grouped metric tracing.
//!
//! A [`TracerConfig`] declares, once, the ordered set of groups a
//! [`GroupTracer`](crate::GroupTracer) routes into and the smoothing window
//! each group's meters use. The set never grows after construction.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TracerError};

/// Default smoothing window for training-phase metrics.
pub const DEFAULT_TRAIN_WINDOW: usize = 50;

/// Window size that disables smoothing.
pub const UNSMOOTHED_WINDOW: usize = 1;

/// A single declared group and its smoothing policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    /// Group name, e.g. `"train"` or `"eval"`. Must not contain `.`.
    pub name: String,
    /// Moving-average window for meters in this group. `1` means no smoothing.
    pub window_size: usize,
}

impl GroupSpec {
    /// Create a new group spec.
    pub fn new(name: impl Into<String>, window_size: usize) -> Self {
        Self {
            name: name.into(),
            window_size,
        }
    }
}

/// Configuration for a group tracer.
///
/// # Example
///
/// ```
/// use metric_tracer_rs::TracerConfig;
///
/// let config = TracerConfig::new()
///     .with_group("train", 50)
///     .with_group("eval", 1);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracerConfig {
    /// Declared groups, in declaration order.
    pub groups: Vec<GroupSpec>,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self::new()
            .with_group("train", DEFAULT_TRAIN_WINDOW)
            .with_group("test", UNSMOOTHED_WINDOW)
    }
}

impl TracerConfig {
    /// Create an empty configuration. At least one group must be added
    /// before it validates.
    #[must_use]
    pub fn new() -> Self {
        Self { groups: Vec::new() }
    }

    /// Declare a group with the given smoothing window.
    #[must_use]
    pub fn with_group(mut self, name: impl Into<String>, window_size: usize) -> Self {
        self.groups.push(GroupSpec::new(name, window_size));
        self
    }

    /// Names of the declared groups, in declaration order.
    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|g| g.name.as_str())
    }

    /// Look up the spec for a group.
    #[must_use]
    pub fn group(&self, name: &str) -> Option<&GroupSpec> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TracerError::InvalidConfig`] if no group is declared, a name
    /// is empty, contains `.`, or is declared twice, or a window size is zero.
    pub fn validate(&self) -> Result<()> {
        if self.groups.is_empty() {
            return Err(TracerError::InvalidConfig(
                "at least one group must be declared".into(),
            ));
        }

        let mut seen = HashSet::new();
        for spec in &self.groups {
            if spec.name.is_empty() {
                return Err(TracerError::InvalidConfig("group name is empty".into()));
            }
            if spec.name.contains('.') {
                return Err(TracerError::InvalidConfig(format!(
                    "group name `{}` must not contain `.`",
                    spec.name
                )));
            }
            if spec.window_size == 0 {
                return Err(TracerError::InvalidConfig(format!(
                    "group `{}` has window_size 0, must be >= 1",
                    spec.name
                )));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(TracerError::InvalidConfig(format!(
                    "group `{}` declared more than once",
                    spec.name
                )));
            }
        }

        Ok(())
    }
}
