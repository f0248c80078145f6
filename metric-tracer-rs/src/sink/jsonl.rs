//! Sink that writes plot events as JSON lines.
//!
//! Each call becomes one line in the output file, so an external viewer can
//! tail the file and rebuild every window. Window handles embed a session
//! stamp, so handles from a previous run never collide with new ones.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{check_lengths, SinkError, SinkResult, VisualizationSink, WindowHandle, WindowOptions};
use crate::float_serde::{json_float, json_float_matrix, json_float_seq};

/// One line of a [`JsonLinesSink`] file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SinkEvent {
    /// A window was opened.
    Open {
        /// Target window.
        window: WindowHandle,
        /// Time the call was received.
        timestamp: DateTime<Utc>,
        /// Display options.
        options: WindowOptions,
        /// Point indices.
        #[serde(with = "json_float_seq")]
        x: Vec<f64>,
        /// Initial values, one series per legend entry.
        #[serde(with = "json_float_matrix")]
        y: Vec<Vec<f64>>,
    },
    /// One point was appended to a series.
    Append {
        /// Target window.
        window: WindowHandle,
        /// Time the call was received.
        timestamp: DateTime<Utc>,
        /// Series name.
        series: String,
        /// Point index.
        #[serde(with = "json_float")]
        x: f64,
        /// Point value.
        #[serde(with = "json_float")]
        y: f64,
    },
    /// A series was replaced.
    BulkReplace {
        /// Target window.
        window: WindowHandle,
        /// Time the call was received.
        timestamp: DateTime<Utc>,
        /// Series name.
        series: String,
        /// Point indices.
        #[serde(with = "json_float_seq")]
        x: Vec<f64>,
        /// Point values.
        #[serde(with = "json_float_seq")]
        y: Vec<f64>,
    },
}

impl SinkEvent {
    /// Window the event targets.
    #[must_use]
    pub fn window(&self) -> &WindowHandle {
        match self {
            Self::Open { window, .. }
            | Self::Append { window, .. }
            | Self::BulkReplace { window, .. } => window,
        }
    }
}

static SESSIONS: AtomicUsize = AtomicUsize::new(0);

struct State {
    writer: BufWriter<File>,
    windows: HashSet<WindowHandle>,
    next_id: usize,
}

/// Sink appending one [`SinkEvent`] per call to a file.
pub struct JsonLinesSink {
    path: PathBuf,
    session: String,
    state: Mutex<State>,
}

impl JsonLinesSink {
    /// Create (or truncate) the event file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Io`] if the file cannot be created.
    pub fn create(path: impl AsRef<Path>) -> SinkResult<Self> {
        let file = File::create(path.as_ref())?;
        Ok(Self::from_file(path.as_ref(), file))
    }

    /// Open the event file at `path` for appending, creating it if needed.
    ///
    /// Use this when resuming a run so earlier events stay in the file.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Io`] if the file cannot be opened.
    pub fn append_to(path: impl AsRef<Path>) -> SinkResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self::from_file(path.as_ref(), file))
    }

    fn from_file(path: &Path, file: File) -> Self {
        Self {
            path: path.to_path_buf(),
            session: format!(
                "{}-s{}",
                Utc::now().format("%Y%m%dT%H%M%S%.3f"),
                SESSIONS.fetch_add(1, Ordering::Relaxed)
            ),
            state: Mutex::new(State {
                writer: BufWriter::new(file),
                windows: HashSet::new(),
                next_id: 0,
            }),
        }
    }

    /// Path of the event file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every event from an event file.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Io`] if the file cannot be read and
    /// [`SinkError::InvalidData`] for malformed lines.
    pub fn read_events(path: impl AsRef<Path>) -> SinkResult<Vec<SinkEvent>> {
        let reader = BufReader::new(File::open(path)?);
        let mut events = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let event = serde_json::from_str(&line)
                .map_err(|e| SinkError::InvalidData(format!("line {}: {e}", lineno + 1)))?;
            events.push(event);
        }
        Ok(events)
    }

    fn write(state: &mut State, event: &SinkEvent) -> SinkResult<()> {
        let line = serde_json::to_string(event).map_err(|e| SinkError::Backend(e.to_string()))?;
        state.writer.write_all(line.as_bytes())?;
        state.writer.write_all(b"\n")?;
        state.writer.flush()?;
        Ok(())
    }

    fn known(state: &State, handle: &WindowHandle) -> SinkResult<()> {
        if state.windows.contains(handle) {
            Ok(())
        } else {
            Err(SinkError::UnknownWindow(handle.clone()))
        }
    }
}

impl VisualizationSink for JsonLinesSink {
    fn open_window(
        &self,
        initial_x: &[f64],
        initial_y: &[Vec<f64>],
        options: &WindowOptions,
    ) -> SinkResult<WindowHandle> {
        for ys in initial_y {
            check_lengths(initial_x, ys)?;
        }

        let mut state = self.state.lock();
        let handle = WindowHandle::new(format!("{}-{}", self.session, state.next_id));
        let event = SinkEvent::Open {
            window: handle.clone(),
            timestamp: Utc::now(),
            options: options.clone(),
            x: initial_x.to_vec(),
            y: initial_y.to_vec(),
        };
        Self::write(&mut state, &event)?;
        state.next_id += 1;
        state.windows.insert(handle.clone());
        Ok(handle)
    }

    fn append(&self, handle: &WindowHandle, x: f64, y: f64, series: &str) -> SinkResult<()> {
        let mut state = self.state.lock();
        Self::known(&state, handle)?;
        let event = SinkEvent::Append {
            window: handle.clone(),
            timestamp: Utc::now(),
            series: series.to_string(),
            x,
            y,
        };
        Self::write(&mut state, &event)
    }

    fn bulk_replace(
        &self,
        handle: &WindowHandle,
        xs: &[f64],
        ys: &[f64],
        series: &str,
    ) -> SinkResult<()> {
        check_lengths(xs, ys)?;
        let mut state = self.state.lock();
        Self::known(&state, handle)?;
        let event = SinkEvent::BulkReplace {
            window: handle.clone(),
            timestamp: Utc::now(),
            series: series.to_string(),
            x: xs.to_vec(),
            y: ys.to_vec(),
        };
        Self::write(&mut state, &event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn options() -> WindowOptions {
        WindowOptions {
            title: "loss".into(),
            xlabel: "step".into(),
            ylabel: "loss".into(),
            legend: vec!["train".into()],
        }
    }

    #[test]
    fn test_events_round_trip_through_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plots.jsonl");
        let sink = JsonLinesSink::create(&path).unwrap();

        let handle = sink.open_window(&[0.0], &[vec![f64::NAN]], &options()).unwrap();
        sink.append(&handle, 1.0, 0.5, "train").unwrap();
        sink.bulk_replace(&handle, &[0.0, 1.0], &[0.7, 0.6], "train").unwrap();

        let events = JsonLinesSink::read_events(&path).unwrap();
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.window() == &handle));
        match &events[0] {
            SinkEvent::Open { y, options, .. } => {
                assert!(y[0][0].is_nan());
                assert_eq!(options.title, "loss");
            }
            other => panic!("expected open, got {other:?}"),
        }
        match &events[2] {
            SinkEvent::BulkReplace { x, y, series, .. } => {
                assert_eq!(series, "train");
                assert_eq!(x, &vec![0.0, 1.0]);
                assert_eq!(y, &vec![0.7, 0.6]);
            }
            other => panic!("expected bulk replace, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_window_is_rejected() {
        let dir = tempdir().unwrap();
        let sink = JsonLinesSink::create(dir.path().join("plots.jsonl")).unwrap();
        let result = sink.append(&WindowHandle::new("stale"), 0.0, 0.0, "train");
        assert!(matches!(result, Err(SinkError::UnknownWindow(_))));
    }

    #[test]
    fn test_append_to_keeps_previous_session() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plots.jsonl");

        let first = JsonLinesSink::create(&path).unwrap();
        let old = first.open_window(&[], &[], &options()).unwrap();
        drop(first);

        let second = JsonLinesSink::append_to(&path).unwrap();
        second.open_window(&[], &[], &options()).unwrap();
        assert!(matches!(
            second.append(&old, 0.0, 0.0, "train"),
            Err(SinkError::UnknownWindow(_))
        ));

        assert_eq!(JsonLinesSink::read_events(&path).unwrap().len(), 2);
    }
}
