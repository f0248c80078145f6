//! Log subscriber setup for applications embedding the tracer.
//!
//! The library itself only emits `tracing` events. [`init_logging`] installs
//! a global subscriber with a console layer and, optionally, a plain-text
//! log file with its own level.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::error::{Result, TracerError};

/// Console and file logging levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Filter for the console layer; `RUST_LOG` takes precedence.
    pub stream_level: String,
    /// Log file, appended to if it exists.
    pub file: Option<PathBuf>,
    /// Filter for the file layer.
    pub file_level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            stream_level: "info".to_string(),
            file: None,
            file_level: "debug".to_string(),
        }
    }
}

impl LogConfig {
    /// Set the console filter.
    #[must_use]
    pub fn with_stream_level(mut self, level: impl Into<String>) -> Self {
        self.stream_level = level.into();
        self
    }

    /// Also log to `path` at `level`.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>, level: impl Into<String>) -> Self {
        self.file = Some(path.into());
        self.file_level = level.into();
        self
    }
}

fn filter(directives: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directives)
        .map_err(|e| TracerError::InvalidConfig(format!("log filter `{directives}`: {e}")))
}

/// Install the global subscriber described by `config`.
///
/// Returns the log file in use, if any.
///
/// # Errors
///
/// Returns [`TracerError::InvalidConfig`] for malformed filters,
/// [`TracerError::Io`] if the log file cannot be opened and
/// [`TracerError::Logging`] if a global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<Option<PathBuf>> {
    let stream_filter = match EnvFilter::try_from_default_env() {
        Ok(env) => env,
        Err(_) => filter(&config.stream_level)?,
    };
    let stream = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(stream_filter);

    let file_layer = match &config.file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file))
                    .with_filter(filter(&config.file_level)?),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stream)
        .with(file_layer)
        .try_init()
        .map_err(|e| TracerError::Logging(e.to_string()))?;

    Ok(config.file.clone())
}
