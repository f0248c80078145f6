//! Error types for metric tracing.

use thiserror::Error;

use crate::sink::SinkError;

/// Result type alias for tracer operations.
pub type Result<T> = std::result::Result<T, TracerError>;

/// Errors that can occur while tracing metrics.
#[derive(Debug, Error)]
pub enum TracerError {
    /// A group name that was not declared at construction.
    #[error("unknown group `{group}`, expected one of {}", format_groups(.valid))]
    UnknownGroup {
        /// The offending group name.
        group: String,
        /// Groups declared at construction, in declaration order.
        valid: Vec<String>,
    },

    /// Invalid configuration parameter.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A trace name that is not of the form `group.metric`.
    #[error("invalid trace name `{0}`, expected `group.metric`")]
    InvalidTraceName(String),

    /// The trace already feeds another figure.
    #[error("trace `{name}` is already registered in another figure")]
    TraceAlreadyRegistered {
        /// Full trace name.
        name: String,
    },

    /// A persisted state that breaks a meter or figure invariant.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Visualization sink failure.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// State (de)serialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Filesystem error while reading or writing state.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The global log subscriber could not be installed.
    #[error("logging setup failed: {0}")]
    Logging(String),
}

fn format_groups(groups: &[String]) -> String {
    let quoted: Vec<String> = groups.iter().map(|g| format!("\"{g}\"")).collect();
    format!("[{}]", quoted.join(", "))
}

impl TracerError {
    /// Build an [`TracerError::UnknownGroup`] from any iterator of valid names.
    pub(crate) fn unknown_group<'a>(
        group: &str,
        valid: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self::UnknownGroup {
            group: group.to_string(),
            valid: valid.into_iter().map(str::to_string).collect(),
        }
    }
}
