//! In-memory sink that records every call.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use super::{check_lengths, SinkError, SinkResult, VisualizationSink, WindowHandle, WindowOptions};

/// One call received by a [`RecordingSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    /// A window was opened.
    Open {
        /// Target window.
        handle: WindowHandle,
        /// Display options.
        options: WindowOptions,
    },
    /// One point was appended.
    Append {
        /// Target window.
        handle: WindowHandle,
        /// Series name.
        series: String,
        /// Point index.
        x: f64,
        /// Point value.
        y: f64,
    },
    /// A series was replaced.
    BulkReplace {
        /// Target window.
        handle: WindowHandle,
        /// Series name.
        series: String,
        /// Point indices.
        xs: Vec<f64>,
        /// Point values.
        ys: Vec<f64>,
    },
}

#[derive(Debug, Default)]
struct Window {
    options: Option<WindowOptions>,
    series: BTreeMap<String, Vec<(f64, f64)>>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: usize,
    windows: BTreeMap<WindowHandle, Window>,
    opened: Vec<WindowHandle>,
    calls: Vec<SinkCall>,
    unavailable: bool,
}

/// Sink that keeps every window in memory and logs every call.
///
/// Useful for headless runs and for asserting on what a tracer plotted.
/// [`Self::set_available`] simulates an unreachable backend: while
/// unavailable, every call fails with [`SinkError::Unavailable`] and
/// nothing is recorded.
#[derive(Debug, Default)]
pub struct RecordingSink {
    inner: Mutex<Inner>,
}

impl RecordingSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following call succeed (`true`) or fail (`false`).
    pub fn set_available(&self, available: bool) {
        self.inner.lock().unavailable = !available;
    }

    /// Every successful call so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<SinkCall> {
        self.inner.lock().calls.clone()
    }

    /// Forget recorded calls, keeping windows.
    pub fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }

    /// Handles of all windows opened so far, oldest first.
    #[must_use]
    pub fn windows(&self) -> Vec<WindowHandle> {
        self.inner.lock().opened.clone()
    }

    /// Options a window was opened with.
    #[must_use]
    pub fn options(&self, handle: &WindowHandle) -> Option<WindowOptions> {
        self.inner
            .lock()
            .windows
            .get(handle)
            .and_then(|w| w.options.clone())
    }

    /// Current points of one series, empty if unknown.
    #[must_use]
    pub fn points(&self, handle: &WindowHandle, series: &str) -> Vec<(f64, f64)> {
        self.inner
            .lock()
            .windows
            .get(handle)
            .and_then(|w| w.series.get(series).cloned())
            .unwrap_or_default()
    }
}

impl Inner {
    fn ensure_available(&self) -> SinkResult<()> {
        if self.unavailable {
            Err(SinkError::Unavailable("recording sink switched off".into()))
        } else {
            Ok(())
        }
    }

    fn window_mut(&mut self, handle: &WindowHandle) -> SinkResult<&mut Window> {
        self.windows
            .get_mut(handle)
            .ok_or_else(|| SinkError::UnknownWindow(handle.clone()))
    }
}

impl VisualizationSink for RecordingSink {
    fn open_window(
        &self,
        initial_x: &[f64],
        initial_y: &[Vec<f64>],
        options: &WindowOptions,
    ) -> SinkResult<WindowHandle> {
        let mut inner = self.inner.lock();
        inner.ensure_available()?;
        for ys in initial_y {
            check_lengths(initial_x, ys)?;
        }

        let handle = WindowHandle::new(format!("window-{}", inner.next_id));
        inner.next_id += 1;

        let mut window = Window {
            options: Some(options.clone()),
            series: BTreeMap::new(),
        };
        for (name, ys) in options.legend.iter().zip(initial_y) {
            let points = initial_x
                .iter()
                .zip(ys)
                .filter(|(_, y)| !y.is_nan())
                .map(|(&x, &y)| (x, y))
                .collect();
            window.series.insert(name.clone(), points);
        }

        inner.windows.insert(handle.clone(), window);
        inner.opened.push(handle.clone());
        inner.calls.push(SinkCall::Open {
            handle: handle.clone(),
            options: options.clone(),
        });
        Ok(handle)
    }

    fn append(&self, handle: &WindowHandle, x: f64, y: f64, series: &str) -> SinkResult<()> {
        let mut inner = self.inner.lock();
        inner.ensure_available()?;
        inner
            .window_mut(handle)?
            .series
            .entry(series.to_string())
            .or_default()
            .push((x, y));
        inner.calls.push(SinkCall::Append {
            handle: handle.clone(),
            series: series.to_string(),
            x,
            y,
        });
        Ok(())
    }

    fn bulk_replace(
        &self,
        handle: &WindowHandle,
        xs: &[f64],
        ys: &[f64],
        series: &str,
    ) -> SinkResult<()> {
        let mut inner = self.inner.lock();
        inner.ensure_available()?;
        check_lengths(xs, ys)?;
        let points = xs.iter().copied().zip(ys.iter().copied()).collect();
        inner
            .window_mut(handle)?
            .series
            .insert(series.to_string(), points);
        inner.calls.push(SinkCall::BulkReplace {
            handle: handle.clone(),
            series: series.to_string(),
            xs: xs.to_vec(),
            ys: ys.to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(legend: &[&str]) -> WindowOptions {
        WindowOptions {
            title: "loss".into(),
            xlabel: "step".into(),
            ylabel: "value".into(),
            legend: legend.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_open_skips_nan_placeholders() {
        let sink = RecordingSink::new();
        let handle = sink
            .open_window(&[0.0], &[vec![f64::NAN], vec![f64::NAN]], &options(&["a", "b"]))
            .unwrap();
        assert!(sink.points(&handle, "a").is_empty());
        assert_eq!(sink.options(&handle).unwrap().legend, vec!["a", "b"]);
        assert_eq!(sink.windows(), vec![handle]);
    }

    #[test]
    fn test_append_then_bulk_replace() {
        let sink = RecordingSink::new();
        let handle = sink.open_window(&[], &[], &options(&["a"])).unwrap();
        sink.append(&handle, 0.0, 1.0, "a").unwrap();
        sink.append(&handle, 1.0, 2.0, "a").unwrap();
        assert_eq!(sink.points(&handle, "a"), vec![(0.0, 1.0), (1.0, 2.0)]);

        sink.bulk_replace(&handle, &[5.0], &[6.0], "a").unwrap();
        assert_eq!(sink.points(&handle, "a"), vec![(5.0, 6.0)]);
        assert_eq!(sink.calls().len(), 4);
    }

    #[test]
    fn test_windows_are_listed_in_open_order() {
        let sink = RecordingSink::new();
        let opened: Vec<WindowHandle> = (0..12)
            .map(|_| sink.open_window(&[], &[], &options(&[])).unwrap())
            .collect();
        assert_eq!(sink.windows(), opened);
        assert_eq!(sink.windows()[10], WindowHandle::new("window-10"));
    }

    #[test]
    fn test_unknown_window() {
        let sink = RecordingSink::new();
        let result = sink.append(&WindowHandle::new("nope"), 0.0, 0.0, "a");
        assert!(matches!(result, Err(SinkError::UnknownWindow(_))));
    }

    #[test]
    fn test_unavailable_records_nothing() {
        let sink = RecordingSink::new();
        sink.set_available(false);
        assert!(matches!(
            sink.open_window(&[], &[], &options(&[])),
            Err(SinkError::Unavailable(_))
        ));
        assert!(sink.calls().is_empty());

        sink.set_available(true);
        assert!(sink.open_window(&[], &[], &options(&[])).is_ok());
    }
}
