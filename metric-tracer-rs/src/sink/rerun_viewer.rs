//! Rerun viewer backend.
//!
//! Each window becomes an entity subtree `figures/<n>` and each series a
//! scalar entity below it, plotted against the `x` timeline. Rerun sequence
//! timelines are integers, so `x` is logged as seconds instead: fractional
//! indices such as epoch 0.5 stay distinct from 1.0. Non-finite `x` has no
//! place on a timeline and is rejected.

use std::path::Path;

use parking_lot::Mutex;
use rerun::{RecordingStream, RecordingStreamBuilder};
use tracing::warn;

use super::{check_lengths, SinkError, SinkResult, VisualizationSink, WindowHandle, WindowOptions};

const TIMELINE: &str = "x";

/// Sink streaming plots to a Rerun viewer.
pub struct RerunSink {
    rec: RecordingStream,
    windows: Mutex<Vec<WindowHandle>>,
}

impl RerunSink {
    /// Connect to a running viewer on the default address.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Unavailable`] if the stream cannot be created.
    pub fn connect(app_id: &str) -> SinkResult<Self> {
        let rec = RecordingStreamBuilder::new(app_id)
            .connect_tcp()
            .map_err(|e| SinkError::Unavailable(e.to_string()))?;
        Ok(Self::from_stream(rec))
    }

    /// Spawn a viewer process and connect to it.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Unavailable`] if the viewer cannot be spawned.
    pub fn spawn(app_id: &str) -> SinkResult<Self> {
        let rec = RecordingStreamBuilder::new(app_id)
            .spawn()
            .map_err(|e| SinkError::Unavailable(e.to_string()))?;
        Ok(Self::from_stream(rec))
    }

    /// Record into an `.rrd` file instead of a live viewer.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Backend`] if the file cannot be created.
    pub fn save(app_id: &str, path: impl AsRef<Path>) -> SinkResult<Self> {
        let rec = RecordingStreamBuilder::new(app_id)
            .save(path)
            .map_err(|e| SinkError::Backend(e.to_string()))?;
        Ok(Self::from_stream(rec))
    }

    /// Wrap an existing recording stream.
    #[must_use]
    pub fn from_stream(rec: RecordingStream) -> Self {
        Self {
            rec,
            windows: Mutex::new(Vec::new()),
        }
    }

    /// The underlying recording stream.
    #[must_use]
    pub fn recording_stream(&self) -> &RecordingStream {
        &self.rec
    }

    fn known(&self, handle: &WindowHandle) -> SinkResult<()> {
        if self.windows.lock().contains(handle) {
            Ok(())
        } else {
            Err(SinkError::UnknownWindow(handle.clone()))
        }
    }

    fn log_point(&self, path: &str, x: f64, y: f64) -> SinkResult<()> {
        if !x.is_finite() {
            return Err(SinkError::InvalidData(format!(
                "x must be finite, got {x} for `{path}`"
            )));
        }
        self.rec.set_time_seconds(TIMELINE, x);
        self.rec
            .log(path, &rerun::Scalar::new(y))
            .map_err(|e| SinkError::Backend(e.to_string()))
    }
}

fn series_path(handle: &WindowHandle, series: &str) -> String {
    format!("{handle}/{}", series.replace('/', "_"))
}

impl VisualizationSink for RerunSink {
    fn open_window(
        &self,
        initial_x: &[f64],
        initial_y: &[Vec<f64>],
        options: &WindowOptions,
    ) -> SinkResult<WindowHandle> {
        for ys in initial_y {
            check_lengths(initial_x, ys)?;
        }

        let handle = {
            let mut windows = self.windows.lock();
            let handle = WindowHandle::new(format!("figures/{}", windows.len()));
            windows.push(handle.clone());
            handle
        };

        let description = format!(
            "# {}\n\nx: {}\n\ny: {}",
            options.title, options.xlabel, options.ylabel
        );
        self.rec
            .log_static(
                format!("{handle}/description"),
                &rerun::TextDocument::from_markdown(description),
            )
            .map_err(|e| SinkError::Backend(e.to_string()))?;

        for (series, ys) in options.legend.iter().zip(initial_y) {
            let path = series_path(&handle, series);
            for (&x, &y) in initial_x.iter().zip(ys) {
                if !y.is_nan() {
                    self.log_point(&path, x, y)?;
                }
            }
        }
        Ok(handle)
    }

    fn append(&self, handle: &WindowHandle, x: f64, y: f64, series: &str) -> SinkResult<()> {
        self.known(handle)?;
        self.log_point(&series_path(handle, series), x, y)
    }

    fn bulk_replace(
        &self,
        handle: &WindowHandle,
        xs: &[f64],
        ys: &[f64],
        series: &str,
    ) -> SinkResult<()> {
        check_lengths(xs, ys)?;
        self.known(handle)?;
        let path = series_path(handle, series);
        self.rec
            .log(path.as_str(), &rerun::Clear::recursive())
            .map_err(|e| SinkError::Backend(e.to_string()))?;
        let mut skipped = 0;
        for (&x, &y) in xs.iter().zip(ys) {
            if x.is_finite() {
                self.log_point(&path, x, y)?;
            } else {
                skipped += 1;
            }
        }
        if skipped > 0 {
            warn!("dropped {} point(s) with non-finite x from `{}`", skipped, path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_sink() -> RerunSink {
        let (rec, _storage) = RecordingStreamBuilder::new("metric_tracer_test")
            .memory()
            .unwrap();
        RerunSink::from_stream(rec)
    }

    fn options() -> WindowOptions {
        WindowOptions {
            title: "loss".into(),
            xlabel: "step".into(),
            ylabel: "loss".into(),
            legend: vec!["train/a".into()],
        }
    }

    #[test]
    fn test_windows_get_distinct_entity_paths() {
        let sink = memory_sink();
        let first = sink.open_window(&[0.0], &[vec![f64::NAN]], &options()).unwrap();
        let second = sink.open_window(&[0.0], &[vec![f64::NAN]], &options()).unwrap();
        assert_eq!(first.as_str(), "figures/0");
        assert_eq!(second.as_str(), "figures/1");
        assert_eq!(series_path(&first, "train/a"), "figures/0/train_a");

        sink.append(&first, 1.0, 0.5, "train/a").unwrap();
        sink.bulk_replace(&second, &[0.0, 1.0], &[1.0, 2.0], "train/a").unwrap();
    }

    #[test]
    fn test_non_finite_x_is_rejected_not_rounded() {
        let sink = memory_sink();
        let handle = sink.open_window(&[0.0], &[vec![f64::NAN]], &options()).unwrap();
        sink.append(&handle, 0.5, 1.0, "train/a").unwrap();
        sink.append(&handle, 1.0, 2.0, "train/a").unwrap();

        let result = sink.append(&handle, f64::NAN, 3.0, "train/a");
        assert!(matches!(result, Err(SinkError::InvalidData(_))));
        let result = sink.append(&handle, f64::INFINITY, 3.0, "train/a");
        assert!(matches!(result, Err(SinkError::InvalidData(_))));

        // A replay with a bad point still lands the rest of the curve.
        sink.bulk_replace(&handle, &[0.0, f64::NAN, 2.0], &[1.0, 2.0, 3.0], "train/a")
            .unwrap();
    }

    #[test]
    fn test_stale_handle_is_rejected() {
        let sink = memory_sink();
        let result = sink.append(&WindowHandle::new("figures/9"), 0.0, 0.0, "a");
        assert!(matches!(result, Err(SinkError::UnknownWindow(_))));
    }
}
