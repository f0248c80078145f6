//! Visualization sinks for live metric plots.
//!
//! A sink renders line plots made of named series grouped into windows.
//! Tracers only ever need three capabilities from it:
//!
//! - open a window with initial data and display options
//! - append one point to a series of a window
//! - replace a series of a window with a bulk of points
//!
//! Handles are only valid within the sink session that issued them; a
//! restarted process must open new windows.
//!
//! # Backends
//!
//! - [`RecordingSink`]: in-memory, records every call (headless runs, tests)
//! - [`JsonLinesSink`]: appends one JSON event per call to a file
//! - `RerunSink`: streams scalars to a [Rerun](https://rerun.io) viewer
//!   (requires the `rerun` feature)

mod jsonl;
mod memory;
#[cfg(feature = "rerun")]
mod rerun_viewer;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use jsonl::{JsonLinesSink, SinkEvent};
pub use memory::{RecordingSink, SinkCall};
#[cfg(feature = "rerun")]
pub use rerun_viewer::RerunSink;

/// Errors reported by a visualization sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The backend cannot be reached.
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    /// The handle was not issued by this sink session.
    #[error("unknown window: {0}")]
    UnknownWindow(WindowHandle),

    /// Mismatched or malformed point data.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(String),

    /// I/O failure of a file-backed sink.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for sink operations.
pub type SinkResult<T> = Result<T, SinkError>;

/// Opaque identifier of a window within one sink session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowHandle(String);

impl WindowHandle {
    /// Wrap a backend-specific identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The backend-specific identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Display options of a plot window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowOptions {
    /// Window title.
    pub title: String,
    /// X axis label.
    pub xlabel: String,
    /// Y axis label.
    pub ylabel: String,
    /// Series names, one per initial column.
    pub legend: Vec<String>,
}

/// External plot renderer.
///
/// Implementations synchronize internally; every method takes `&self`.
pub trait VisualizationSink: Send + Sync {
    /// Open a new window. `initial_y` holds one series per legend entry,
    /// each the same length as `initial_x`.
    fn open_window(
        &self,
        initial_x: &[f64],
        initial_y: &[Vec<f64>],
        options: &WindowOptions,
    ) -> SinkResult<WindowHandle>;

    /// Append one point to `series` in `handle`.
    fn append(&self, handle: &WindowHandle, x: f64, y: f64, series: &str) -> SinkResult<()>;

    /// Replace the points of `series` in `handle` with `xs`/`ys`.
    fn bulk_replace(
        &self,
        handle: &WindowHandle,
        xs: &[f64],
        ys: &[f64],
        series: &str,
    ) -> SinkResult<()>;

    /// Append several points to `series`, one [`Self::append`] per point.
    fn extend(&self, handle: &WindowHandle, xs: &[f64], ys: &[f64], series: &str) -> SinkResult<()> {
        check_lengths(xs, ys)?;
        for (&x, &y) in xs.iter().zip(ys) {
            self.append(handle, x, y, series)?;
        }
        Ok(())
    }
}

impl<S: VisualizationSink + ?Sized> VisualizationSink for Arc<S> {
    fn open_window(
        &self,
        initial_x: &[f64],
        initial_y: &[Vec<f64>],
        options: &WindowOptions,
    ) -> SinkResult<WindowHandle> {
        (**self).open_window(initial_x, initial_y, options)
    }

    fn append(&self, handle: &WindowHandle, x: f64, y: f64, series: &str) -> SinkResult<()> {
        (**self).append(handle, x, y, series)
    }

    fn bulk_replace(
        &self,
        handle: &WindowHandle,
        xs: &[f64],
        ys: &[f64],
        series: &str,
    ) -> SinkResult<()> {
        (**self).bulk_replace(handle, xs, ys, series)
    }
}

impl<S: VisualizationSink + ?Sized> VisualizationSink for Box<S> {
    fn open_window(
        &self,
        initial_x: &[f64],
        initial_y: &[Vec<f64>],
        options: &WindowOptions,
    ) -> SinkResult<WindowHandle> {
        (**self).open_window(initial_x, initial_y, options)
    }

    fn append(&self, handle: &WindowHandle, x: f64, y: f64, series: &str) -> SinkResult<()> {
        (**self).append(handle, x, y, series)
    }

    fn bulk_replace(
        &self,
        handle: &WindowHandle,
        xs: &[f64],
        ys: &[f64],
        series: &str,
    ) -> SinkResult<()> {
        (**self).bulk_replace(handle, xs, ys, series)
    }
}

pub(crate) fn check_lengths(xs: &[f64], ys: &[f64]) -> SinkResult<()> {
    if xs.len() == ys.len() {
        Ok(())
    } else {
        Err(SinkError::InvalidData(format!(
            "x has {} points but y has {}",
            xs.len(),
            ys.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SinkError::UnknownWindow(WindowHandle::new("win-3"));
        assert_eq!(err.to_string(), "unknown window: win-3");
    }

    #[test]
    fn test_extend_rejects_ragged_input() {
        let sink = RecordingSink::new();
        let options = WindowOptions {
            title: "t".into(),
            xlabel: "x".into(),
            ylabel: "y".into(),
            legend: vec!["a".into()],
        };
        let handle = sink.open_window(&[0.0], &[vec![f64::NAN]], &options).unwrap();
        let result = sink.extend(&handle, &[0.0, 1.0], &[1.0], "a");
        assert!(matches!(result, Err(SinkError::InvalidData(_))));
    }

    #[test]
    fn test_arc_sink_forwards() {
        let sink = Arc::new(RecordingSink::new());
        let shared: Arc<dyn VisualizationSink> = sink.clone();
        let options = WindowOptions {
            title: "t".into(),
            xlabel: "x".into(),
            ylabel: "y".into(),
            legend: vec!["a".into()],
        };
        let handle = shared.open_window(&[0.0], &[vec![f64::NAN]], &options).unwrap();
        shared.append(&handle, 1.0, 2.0, "a").unwrap();
        assert_eq!(sink.points(&handle, "a"), vec![(1.0, 2.0)]);
    }
}
