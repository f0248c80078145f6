//! Compound `(group, metric)` keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TracerError;

/// Address of one meter inside a [`GroupTracer`](crate::GroupTracer).
///
/// The text form is `group.metric`; the group part never contains `.`, so
/// everything after the first `.` belongs to the metric name.
///
/// ```
/// use metric_tracer_rs::TraceKey;
///
/// let key: TraceKey = "train.loss/total".parse().unwrap();
/// assert_eq!(key.group(), "train");
/// assert_eq!(key.metric(), "loss/total");
/// assert_eq!(key.to_string(), "train.loss/total");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TraceKey {
    group: String,
    metric: String,
}

impl TraceKey {
    /// Create a key from its parts.
    pub fn new(group: impl Into<String>, metric: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            metric: metric.into(),
        }
    }

    /// Group part.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Metric part.
    #[must_use]
    pub fn metric(&self) -> &str {
        &self.metric
    }
}

impl fmt::Display for TraceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.metric)
    }
}

impl FromStr for TraceKey {
    type Err = TracerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((group, metric)) if !group.is_empty() && !metric.is_empty() => {
                Ok(Self::new(group, metric))
            }
            _ => Err(TracerError::InvalidTraceName(s.to_string())),
        }
    }
}

impl TryFrom<String> for TraceKey {
    type Error = TracerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TraceKey> for String {
    fn from(key: TraceKey) -> Self {
        key.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_names_without_both_parts() {
        for bad in ["loss", ".loss", "train.", ""] {
            assert!(
                matches!(bad.parse::<TraceKey>(), Err(TracerError::InvalidTraceName(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_serializes_as_text() {
        let key = TraceKey::new("eval", "acc");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"eval.acc\"");
        let back: TraceKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
