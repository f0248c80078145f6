//! Figure registration and the resume-by-replay protocol.
//!
//! A figure groups several traces into one sink window. Its lifecycle:
//!
//! ```text
//! Unregistered ──open──▶ Registered ──persist/restore──▶ Detached ──replay──▶ Reattached
//!                                                           ▲                      │
//!                                                           └──── sink failure ────┘
//! ```
//!
//! Window handles never survive a restart, so a restored figure starts out
//! [`DetachedFigure`]. The only way back to an attached state is
//! [`DetachedFigure::reattach`], which opens a fresh window *and* replays the
//! full smoothed history of every trace into it. A resumed plot therefore
//! never shows a gap, and live updates are never sent to a detached figure.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, TracerError};
use crate::sink::{SinkError, VisualizationSink, WindowHandle, WindowOptions};

/// One trace of a figure: the meter it follows and its legend entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceSpec<K> {
    /// Meter the trace follows.
    pub key: K,
    /// Series name shown in the legend.
    pub legend: String,
}

/// Everything needed to (re)open a figure; persisted with the tracer state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FigureSpec<K> {
    /// Window title.
    pub title: String,
    /// X axis label.
    pub xlabel: String,
    /// Y axis label.
    pub ylabel: String,
    /// Traces in legend order.
    pub traces: Vec<TraceSpec<K>>,
}

impl<K> FigureSpec<K> {
    /// Create a figure spec without traces.
    pub fn new(title: impl Into<String>, xlabel: impl Into<String>, ylabel: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            xlabel: xlabel.into(),
            ylabel: ylabel.into(),
            traces: Vec::new(),
        }
    }

    /// Add a trace.
    #[must_use]
    pub fn with_trace(mut self, key: K, legend: impl Into<String>) -> Self {
        self.traces.push(TraceSpec {
            key,
            legend: legend.into(),
        });
        self
    }

    /// Sink display options for this figure.
    #[must_use]
    pub fn options(&self) -> WindowOptions {
        WindowOptions {
            title: self.title.clone(),
            xlabel: self.xlabel.clone(),
            ylabel: self.ylabel.clone(),
            legend: self.traces.iter().map(|t| t.legend.clone()).collect(),
        }
    }

    fn open(&self, sink: &dyn VisualizationSink) -> std::result::Result<WindowHandle, SinkError> {
        let initial_y = vec![vec![f64::NAN]; self.traces.len()];
        sink.open_window(&[0.0], &initial_y, &self.options())
    }
}

/// Observable lifecycle state of a figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FigureState {
    /// Opened by registration in this session.
    Registered,
    /// Restored from persisted state, not yet replayed into a window.
    Detached,
    /// Restored and fully replayed into a new window.
    Reattached,
}

impl fmt::Display for FigureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Registered => "registered",
            Self::Detached => "detached",
            Self::Reattached => "reattached",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attachment {
    Registered,
    Reattached,
}

/// A figure with a live window in the current sink session.
///
/// Only built by registration or by [`DetachedFigure::reattach`].
#[derive(Debug, Clone)]
pub struct AttachedFigure<K> {
    spec: FigureSpec<K>,
    handle: WindowHandle,
    attachment: Attachment,
}

impl<K> AttachedFigure<K> {
    fn register(
        spec: FigureSpec<K>,
        sink: &dyn VisualizationSink,
    ) -> std::result::Result<Self, (FigureSpec<K>, SinkError)> {
        match spec.open(sink) {
            Ok(handle) => Ok(Self {
                spec,
                handle,
                attachment: Attachment::Registered,
            }),
            Err(err) => Err((spec, err)),
        }
    }

    /// The figure's spec.
    #[must_use]
    pub fn spec(&self) -> &FigureSpec<K> {
        &self.spec
    }

    /// The window this figure draws into.
    #[must_use]
    pub fn handle(&self) -> &WindowHandle {
        &self.handle
    }

    /// Drop the window handle.
    #[must_use]
    pub fn detach(self) -> DetachedFigure<K> {
        DetachedFigure::new(self.spec)
    }
}

/// A figure without a window, waiting for a full replay.
#[derive(Debug, Clone)]
pub struct DetachedFigure<K> {
    spec: FigureSpec<K>,
    // Opened by a replay that failed part way; the next replay reuses it.
    pending: Option<WindowHandle>,
}

impl<K> DetachedFigure<K> {
    /// Wrap a persisted spec.
    #[must_use]
    pub fn new(spec: FigureSpec<K>) -> Self {
        Self {
            spec,
            pending: None,
        }
    }

    /// Window left open by an unfinished replay, if any.
    #[must_use]
    pub fn pending_window(&self) -> Option<&WindowHandle> {
        self.pending.as_ref()
    }

    /// The figure's spec.
    #[must_use]
    pub fn spec(&self) -> &FigureSpec<K> {
        &self.spec
    }

    /// Open a new window and replay every trace's full history into it,
    /// one bulk call per trace.
    ///
    /// `history` returns the `(x, smoothed y)` curve of a trace. On any sink
    /// failure the figure is handed back detached with the error. A window
    /// that was opened before the failure is kept and replayed into again
    /// by the next call, unless the sink no longer knows it.
    pub fn reattach<F>(
        mut self,
        sink: &dyn VisualizationSink,
        mut history: F,
    ) -> std::result::Result<AttachedFigure<K>, (Self, SinkError)>
    where
        F: FnMut(&K) -> (Vec<f64>, Vec<f64>),
    {
        let handle = match self.pending.take() {
            Some(handle) => handle,
            None => match self.spec.open(sink) {
                Ok(handle) => handle,
                Err(err) => return Err((self, err)),
            },
        };

        for trace in &self.spec.traces {
            let (xs, ys) = history(&trace.key);
            if let Err(err) = sink.bulk_replace(&handle, &xs, &ys, &trace.legend) {
                if matches!(err, SinkError::UnknownWindow(_)) {
                    warn!("abandoning window {} of figure `{}`", handle, self.spec.title);
                } else {
                    self.pending = Some(handle);
                }
                return Err((self, err));
            }
        }

        Ok(AttachedFigure {
            spec: self.spec,
            handle,
            attachment: Attachment::Reattached,
        })
    }
}

#[derive(Debug, Clone)]
enum Slot<K> {
    Attached(AttachedFigure<K>),
    Detached(DetachedFigure<K>),
}

impl<K> Slot<K> {
    fn spec(&self) -> &FigureSpec<K> {
        match self {
            Self::Attached(f) => f.spec(),
            Self::Detached(f) => f.spec(),
        }
    }

    fn state(&self) -> FigureState {
        match self {
            Self::Attached(f) if f.attachment == Attachment::Registered => FigureState::Registered,
            Self::Attached(_) => FigureState::Reattached,
            Self::Detached(_) => FigureState::Detached,
        }
    }
}

/// Registry of figures plus the reverse index from trace key to figure.
///
/// A trace key feeds at most one figure.
#[derive(Debug, Clone)]
pub struct FigureBook<K> {
    figures: Vec<Slot<K>>,
    lines: HashMap<K, (usize, usize)>,
}

impl<K> Default for FigureBook<K> {
    fn default() -> Self {
        Self {
            figures: Vec::new(),
            lines: HashMap::new(),
        }
    }
}

impl<K> FigureBook<K>
where
    K: Clone + Eq + Hash + fmt::Display,
{
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of figures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.figures.len()
    }

    /// Whether no figure is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.figures.is_empty()
    }

    /// Whether `key` feeds a figure.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.lines.contains_key(key)
    }

    /// Fail if any trace of `spec` is already registered or repeated.
    ///
    /// # Errors
    ///
    /// Returns [`TracerError::TraceAlreadyRegistered`] naming the first clash.
    pub fn check_available(&self, spec: &FigureSpec<K>) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for trace in &spec.traces {
            if self.lines.contains_key(&trace.key) || !seen.insert(&trace.key) {
                return Err(TracerError::TraceAlreadyRegistered {
                    name: trace.key.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Register a figure and open its window.
    ///
    /// When the sink fails the figure is still recorded, as detached, and
    /// `Ok(None)` is returned; [`Self::reattach_detached`] brings it back.
    ///
    /// # Errors
    ///
    /// Returns [`TracerError::TraceAlreadyRegistered`] before touching the
    /// sink if a trace already feeds a figure.
    pub fn register(
        &mut self,
        spec: FigureSpec<K>,
        sink: &dyn VisualizationSink,
    ) -> Result<Option<WindowHandle>> {
        self.check_available(&spec)?;

        let slot = match AttachedFigure::register(spec, sink) {
            Ok(figure) => {
                debug!("registered figure `{}` as {}", figure.spec.title, figure.handle);
                Slot::Attached(figure)
            }
            Err((spec, err)) => {
                warn!("could not open window for figure `{}`: {}", spec.title, err);
                Slot::Detached(DetachedFigure::new(spec))
            }
        };

        let handle = match &slot {
            Slot::Attached(f) => Some(f.handle.clone()),
            Slot::Detached(_) => None,
        };
        self.push(slot);
        Ok(handle)
    }

    fn push(&mut self, slot: Slot<K>) {
        let index = self.figures.len();
        for (pos, trace) in slot.spec().traces.iter().enumerate() {
            self.lines.insert(trace.key.clone(), (index, pos));
        }
        self.figures.push(slot);
    }

    /// Window and legend a live update of `key` goes to, if its figure is
    /// attached.
    #[must_use]
    pub fn target(&self, key: &K) -> Option<(&WindowHandle, &str)> {
        let &(index, pos) = self.lines.get(key)?;
        match &self.figures[index] {
            Slot::Attached(figure) => {
                Some((&figure.handle, figure.spec.traces[pos].legend.as_str()))
            }
            Slot::Detached(_) => None,
        }
    }

    /// Specs of every figure, in registration order.
    #[must_use]
    pub fn specs(&self) -> Vec<FigureSpec<K>> {
        self.figures.iter().map(|s| s.spec().clone()).collect()
    }

    /// Title and state of every figure, in registration order.
    #[must_use]
    pub fn states(&self) -> Vec<(String, FigureState)> {
        self.figures
            .iter()
            .map(|s| (s.spec().title.clone(), s.state()))
            .collect()
    }

    /// Current window handles of attached figures.
    #[must_use]
    pub fn handles(&self) -> Vec<WindowHandle> {
        self.figures
            .iter()
            .filter_map(|s| match s {
                Slot::Attached(f) => Some(f.handle.clone()),
                Slot::Detached(_) => None,
            })
            .collect()
    }

    /// Build a registry of detached figures from persisted specs.
    ///
    /// # Errors
    ///
    /// Returns [`TracerError::TraceAlreadyRegistered`] if a trace key
    /// appears twice, in one spec or across specs.
    pub fn detached(specs: Vec<FigureSpec<K>>) -> Result<Self> {
        let mut book = Self::new();
        for spec in specs {
            book.check_available(&spec)?;
            book.push(Slot::Detached(DetachedFigure::new(spec)));
        }
        Ok(book)
    }

    /// Replace every figure with detached ones built from `specs`,
    /// retiring all current window handles.
    ///
    /// # Errors
    ///
    /// Same as [`Self::detached`]; the registry is left unchanged.
    pub fn restore(&mut self, specs: Vec<FigureSpec<K>>) -> Result<()> {
        *self = Self::detached(specs)?;
        Ok(())
    }

    /// Try to reattach every detached figure by replaying `history`.
    ///
    /// Figures whose replay fails stay detached.
    ///
    /// # Errors
    ///
    /// Returns the first sink error after every figure has been tried.
    pub fn reattach_detached<F>(
        &mut self,
        sink: &dyn VisualizationSink,
        mut history: F,
    ) -> std::result::Result<(), SinkError>
    where
        F: FnMut(&K) -> (Vec<f64>, Vec<f64>),
    {
        let mut first_error = None;
        for slot in &mut self.figures {
            let Slot::Detached(figure) = slot else {
                continue;
            };
            let detached = figure.clone();
            match detached.reattach(sink, &mut history) {
                Ok(attached) => {
                    debug!(
                        "replayed figure `{}` into {}",
                        attached.spec.title, attached.handle
                    );
                    *slot = Slot::Attached(attached);
                }
                Err((detached, err)) => {
                    warn!("could not replay figure `{}`: {}", detached.spec.title, err);
                    *figure = detached;
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Number of figures waiting for a replay.
    #[must_use]
    pub fn detached_count(&self) -> usize {
        self.figures
            .iter()
            .filter(|s| matches!(s, Slot::Detached(_)))
            .count()
    }
}
