//! Tracers that mirror their smoothed meters into a [`VisualizationSink`].
//!
//! Both variants forward every update to the sink as one `(x, average)`
//! point per registered trace, and persist their figures next to the meter
//! state. Loading that state reopens every figure in a new window and
//! replays each trace's full smoothed history before live updates resume.
//!
//! Sink failures never abort an update: the in-memory aggregation is always
//! committed and the failure is logged.
//!
//! # Example
//!
//! ```
//! use metric_tracer_rs::sink::RecordingSink;
//! use metric_tracer_rs::{GroupPlottingTracer, TracerConfig};
//!
//! let config = TracerConfig::new().with_group("train", 2).with_group("eval", 1);
//! let plots = GroupPlottingTracer::new(config, RecordingSink::new())?;
//! plots.register_figure("loss", "step", "loss", [("train.loss", "train"), ("eval.loss", "eval")])?;
//!
//! plots.update("train", 0.0, [("loss", 1.0)])?;
//! plots.update("train", 1.0, [("loss", 3.0)])?;
//!
//! let windows = plots.sink().windows();
//! assert_eq!(plots.sink().points(&windows[0], "train"), vec![(0.0, 1.0), (1.0, 2.0)]);
//! # Ok::<(), metric_tracer_rs::TracerError>(())
//! ```

use std::collections::BTreeMap;

use parking_lot::{MappedRwLockWriteGuard, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::TracerConfig;
use crate::error::{Result, TracerError};
use crate::figure::{FigureBook, FigureSpec, FigureState};
use crate::group::{GroupTracer, GroupTracerState};
use crate::key::TraceKey;
use crate::meter::{Meter, MeterFactory};
use crate::sink::{VisualizationSink, WindowHandle};
use crate::tracer::{ConfigMismatch, Tracer, TracerState};

/// Persisted form of a plotting tracer: meter state plus figure specs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotState<T, K> {
    /// Meter state of the wrapped tracer.
    pub tracer: T,
    /// Registered figures, in registration order.
    #[serde(default = "Vec::new")]
    pub figures: Vec<FigureSpec<K>>,
}

/// Persisted form of a [`PlottingTracer`].
pub type PlotTracerState = PlotState<TracerState, String>;

/// Persisted form of a [`GroupPlottingTracer`].
pub type GroupPlotState = PlotState<GroupTracerState, TraceKey>;

fn log_sink_failure(what: &str, key: &dyn std::fmt::Display, err: &dyn std::fmt::Display) {
    warn!("sink dropped {} for `{}`: {}", what, key, err);
}

/// A single [`Tracer`] whose figures are keyed by plain metric names.
pub struct PlottingTracer<S> {
    tracer: Tracer,
    figures: FigureBook<String>,
    sink: S,
}

impl<S: VisualizationSink> PlottingTracer<S> {
    /// Create a plotting tracer without figures.
    pub fn new(factory: MeterFactory, sink: S) -> Self {
        Self {
            tracer: Tracer::new(factory),
            figures: FigureBook::new(),
            sink,
        }
    }

    /// The wrapped tracer.
    #[must_use]
    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    /// The sink receiving plot calls.
    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Title and lifecycle state of every figure.
    #[must_use]
    pub fn figure_states(&self) -> Vec<(String, FigureState)> {
        self.figures.states()
    }

    /// Register a figure showing the meters named in `traces`, each mapped
    /// to its legend label.
    ///
    /// Meters are created if missing. Returns the new window handle, or
    /// `None` if the sink was unavailable; such a figure attaches on the
    /// next [`Self::retry_detached`].
    ///
    /// # Errors
    ///
    /// Returns [`TracerError::InvalidTraceName`] for empty names and
    /// [`TracerError::TraceAlreadyRegistered`] if a meter already feeds a
    /// figure. Nothing is registered on error.
    pub fn register_figure<I, N, L>(
        &mut self,
        title: &str,
        xlabel: &str,
        ylabel: &str,
        traces: I,
    ) -> Result<Option<WindowHandle>>
    where
        I: IntoIterator<Item = (N, L)>,
        N: AsRef<str>,
        L: Into<String>,
    {
        let mut spec = FigureSpec::new(title, xlabel, ylabel);
        for (name, legend) in traces {
            let name = name.as_ref();
            if name.is_empty() {
                return Err(TracerError::InvalidTraceName(name.to_string()));
            }
            spec = spec.with_trace(name.to_string(), legend);
        }
        self.figures.check_available(&spec)?;

        for trace in &spec.traces {
            self.tracer.get_meter(&trace.key);
        }
        self.figures.register(spec, &self.sink)
    }

    /// Get the meter for `key`, creating it on first access.
    pub fn get_meter(&mut self, key: &str) -> &mut Meter {
        self.tracer.get_meter(key)
    }

    /// Record `data` at `x` and send the new average of every registered
    /// meter to its figure.
    pub fn update<I, K>(&mut self, x: f64, data: I)
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        let points: Vec<(String, f64)> = data
            .into_iter()
            .map(|(key, value)| {
                let meter = self.tracer.get_meter(key.as_ref());
                meter.update(x, value);
                (key.as_ref().to_string(), meter.average())
            })
            .collect();

        for (key, average) in points {
            if let Some((handle, legend)) = self.figures.target(&key) {
                if let Err(err) = self.sink.append(handle, x, average, legend) {
                    log_sink_failure("point", &key, &err);
                }
            }
        }
    }

    /// Record `data` at `x` without plotting.
    pub fn update_history<I, K>(&mut self, x: f64, data: I)
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        self.tracer.update_history(x, data);
    }

    /// Append arbitrary points to the trace of `key` without touching its
    /// meter. Returns whether the sink accepted them.
    pub fn update_trace(&self, key: &str, xs: &[f64], ys: &[f64]) -> bool {
        let key = key.to_string();
        let Some((handle, legend)) = self.figures.target(&key) else {
            return false;
        };
        match self.sink.extend(handle, xs, ys, legend) {
            Ok(()) => true,
            Err(err) => {
                log_sink_failure("points", &key, &err);
                false
            }
        }
    }

    /// Snapshot the meters and figures.
    #[must_use]
    pub fn state_dict(&self) -> PlotTracerState {
        PlotState {
            tracer: self.tracer.state_dict(),
            figures: self.figures.specs(),
        }
    }

    /// Restore meters, then reopen every figure and replay its history.
    ///
    /// Figures the sink cannot take stay detached and are logged.
    ///
    /// # Errors
    ///
    /// Returns [`TracerError::InvalidState`] for a malformed meter record
    /// and [`TracerError::TraceAlreadyRegistered`] for a trace listed in two
    /// figures. Nothing is modified in either case.
    pub fn load_state_dict(&mut self, state: PlotTracerState) -> Result<Vec<ConfigMismatch>> {
        let figures = FigureBook::detached(state.figures)?;
        let mismatches = self.tracer.load_state_dict(state.tracer)?;
        self.figures = figures;
        if let Err(err) = self.replay() {
            warn!(
                "{} figure(s) left detached after resume: {}",
                self.figures.detached_count(),
                err
            );
        }
        Ok(mismatches)
    }

    /// Reattach figures left detached by a failed replay.
    ///
    /// # Errors
    ///
    /// Returns [`TracerError::Sink`] if any figure is still detached.
    pub fn retry_detached(&mut self) -> Result<()> {
        self.replay()
    }

    fn replay(&mut self) -> Result<()> {
        let tracer = &mut self.tracer;
        self.figures
            .reattach_detached(&self.sink, |key| tracer.get_meter(key).export())?;
        Ok(())
    }

    /// Emit one info line per meter.
    pub fn logging(&self) {
        self.tracer.logging();
    }
}

/// A [`GroupTracer`] whose figures are keyed by `group.metric` names.
///
/// All methods take `&self`; the plotting tracer can be shared between
/// threads when the sink is.
pub struct GroupPlottingTracer<S> {
    tracer: GroupTracer,
    figures: RwLock<FigureBook<TraceKey>>,
    sink: S,
}

impl<S: VisualizationSink> GroupPlottingTracer<S> {
    /// Create a plotting tracer without figures.
    ///
    /// # Errors
    ///
    /// Returns [`TracerError::InvalidConfig`] if the configuration is invalid.
    pub fn new(config: TracerConfig, sink: S) -> Result<Self> {
        Ok(Self::from_tracer(GroupTracer::new(config)?, sink))
    }

    /// Wrap an existing group tracer.
    pub fn from_tracer(tracer: GroupTracer, sink: S) -> Self {
        Self {
            tracer,
            figures: RwLock::new(FigureBook::new()),
            sink,
        }
    }

    /// The wrapped group tracer.
    #[must_use]
    pub fn tracer(&self) -> &GroupTracer {
        &self.tracer
    }

    /// The sink receiving plot calls.
    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Title and lifecycle state of every figure.
    #[must_use]
    pub fn figure_states(&self) -> Vec<(String, FigureState)> {
        self.figures.read().states()
    }

    /// Window handles of every attached figure.
    #[must_use]
    pub fn window_handles(&self) -> Vec<WindowHandle> {
        self.figures.read().handles()
    }

    /// Register a figure showing the `group.metric` traces in `traces`,
    /// each mapped to its legend label.
    ///
    /// Every name is validated before the sink is touched, and the
    /// underlying meters are created eagerly. Returns the new window
    /// handle, or `None` if the sink was unavailable.
    ///
    /// # Errors
    ///
    /// Returns [`TracerError::InvalidTraceName`] for names that are not
    /// `group.metric`, [`TracerError::UnknownGroup`] for undeclared groups
    /// and [`TracerError::TraceAlreadyRegistered`] for traces that already
    /// feed a figure.
    pub fn register_figure<I, N, L>(
        &self,
        title: &str,
        xlabel: &str,
        ylabel: &str,
        traces: I,
    ) -> Result<Option<WindowHandle>>
    where
        I: IntoIterator<Item = (N, L)>,
        N: AsRef<str>,
        L: Into<String>,
    {
        let mut spec = FigureSpec::new(title, xlabel, ylabel);
        for (name, legend) in traces {
            let key: TraceKey = name.as_ref().parse()?;
            self.tracer.check_group(key.group())?;
            spec = spec.with_trace(key, legend);
        }

        let mut figures = self.figures.write();
        figures.check_available(&spec)?;
        for trace in &spec.traces {
            self.tracer
                .write(trace.key.group())?
                .get_meter(trace.key.metric());
        }
        figures.register(spec, &self.sink)
    }

    /// Get the meter for `(group, key)`, creating it on first access.
    ///
    /// # Errors
    ///
    /// Returns [`TracerError::UnknownGroup`] for undeclared groups.
    pub fn get_meter(&self, group: &str, key: &str) -> Result<MappedRwLockWriteGuard<'_, Meter>> {
        self.tracer.get_meter(group, key)
    }

    /// Record `data` in `group` at `x`, then send the new average of every
    /// registered meter to its figure.
    ///
    /// # Errors
    ///
    /// Returns [`TracerError::UnknownGroup`] for undeclared groups; nothing
    /// is recorded or plotted in that case.
    pub fn update<I, K>(&self, group: &str, x: f64, data: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        let points: Vec<(TraceKey, f64)> = {
            let mut tracer = self.tracer.write(group)?;
            data.into_iter()
                .map(|(key, value)| {
                    let meter = tracer.get_meter(key.as_ref());
                    meter.update(x, value);
                    (TraceKey::new(group, key.as_ref()), meter.average())
                })
                .collect()
        };

        let figures = self.figures.read();
        for (key, average) in points {
            if let Some((handle, legend)) = figures.target(&key) {
                if let Err(err) = self.sink.append(handle, x, average, legend) {
                    log_sink_failure("point", &key, &err);
                }
            }
        }
        Ok(())
    }

    /// Record `data` in `group` at `x` without plotting.
    ///
    /// # Errors
    ///
    /// Returns [`TracerError::UnknownGroup`] for undeclared groups.
    pub fn update_history<I, K>(&self, group: &str, x: f64, data: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        self.tracer.update_history(group, x, data)
    }

    /// Append arbitrary points to the trace of `(group, key)` without
    /// touching its meter. Returns whether the sink accepted them.
    ///
    /// # Errors
    ///
    /// Returns [`TracerError::UnknownGroup`] for undeclared groups.
    pub fn update_trace(&self, group: &str, key: &str, xs: &[f64], ys: &[f64]) -> Result<bool> {
        self.tracer.check_group(group)?;
        let key = TraceKey::new(group, key);
        let figures = self.figures.read();
        let Some((handle, legend)) = figures.target(&key) else {
            return Ok(false);
        };
        match self.sink.extend(handle, xs, ys, legend) {
            Ok(()) => Ok(true),
            Err(err) => {
                log_sink_failure("points", &key, &err);
                Ok(false)
            }
        }
    }

    /// Snapshot the meters of every group and all figures.
    #[must_use]
    pub fn state_dict(&self) -> GroupPlotState {
        PlotState {
            tracer: self.tracer.state_dict(),
            figures: self.figures.read().specs(),
        }
    }

    /// Resume from `state`.
    ///
    /// Restores every group's meters, reopens each figure in a new window
    /// and replays every trace's full smoothed history into it with one
    /// bulk call, after which live updates target the new windows. Figures
    /// the sink cannot take stay detached and are logged.
    ///
    /// # Errors
    ///
    /// Returns [`TracerError::UnknownGroup`] if the state names an
    /// undeclared group, [`TracerError::InvalidState`] for a malformed
    /// meter record and [`TracerError::TraceAlreadyRegistered`] for a trace
    /// listed in two figures. Nothing is modified in any of these cases.
    pub fn load_state_dict(&self, state: GroupPlotState) -> Result<Vec<ConfigMismatch>> {
        for spec in &state.figures {
            for trace in &spec.traces {
                self.tracer.check_group(trace.key.group())?;
            }
        }
        let restored = FigureBook::detached(state.figures)?;

        let mut figures = self.figures.write();
        let mismatches = self.tracer.load_state_dict(state.tracer)?;
        *figures = restored;
        if let Err(err) = self.replay(&mut figures) {
            warn!(
                "{} figure(s) left detached after resume: {}",
                figures.detached_count(),
                err
            );
        }
        Ok(mismatches)
    }

    /// Reattach figures left detached by a failed replay.
    ///
    /// # Errors
    ///
    /// Returns [`TracerError::Sink`] if any figure is still detached.
    pub fn retry_detached(&self) -> Result<()> {
        let mut figures = self.figures.write();
        self.replay(&mut figures)
    }

    fn replay(&self, figures: &mut FigureBook<TraceKey>) -> Result<()> {
        figures.reattach_detached(&self.sink, |key| {
            self.tracer
                .meter(key)
                .map(|meter| meter.export())
                .unwrap_or_default()
        })?;
        Ok(())
    }

    /// Smoothed curves of every meter in `group`.
    ///
    /// # Errors
    ///
    /// Returns [`TracerError::UnknownGroup`] for undeclared groups.
    pub fn curves(&self, group: &str) -> Result<BTreeMap<String, (Vec<f64>, Vec<f64>)>> {
        self.tracer.curves(group)
    }

    /// Emit the log lines of one group, or of all groups.
    ///
    /// # Errors
    ///
    /// Returns [`TracerError::UnknownGroup`] for undeclared groups.
    pub fn logging(&self, group: Option<&str>) -> Result<()> {
        self.tracer.logging(group)?;
        info!("{} figure(s) registered", self.figures.read().len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{RecordingSink, SinkCall};

    fn group_plots() -> GroupPlottingTracer<RecordingSink> {
        let config = TracerConfig::new().with_group("train", 3).with_group("eval", 1);
        GroupPlottingTracer::new(config, RecordingSink::new()).unwrap()
    }

    #[test]
    fn test_register_validates_before_opening() {
        let plots = group_plots();
        let err = plots
            .register_figure("loss", "step", "loss", [("train.loss", "a"), ("bogus.loss", "b")])
            .unwrap_err();
        assert!(matches!(err, TracerError::UnknownGroup { ref group, .. } if group == "bogus"));

        let err = plots
            .register_figure("loss", "step", "loss", [("loss", "a")])
            .unwrap_err();
        assert!(matches!(err, TracerError::InvalidTraceName(_)));

        assert!(plots.sink().calls().is_empty());
        assert!(plots.figure_states().is_empty());
        assert!(plots.tracer().read("train").unwrap().is_empty());
    }

    #[test]
    fn test_register_materializes_meters() {
        let plots = group_plots();
        plots
            .register_figure("acc", "step", "acc", [("eval.acc", "eval")])
            .unwrap();
        assert!(plots.tracer().read("eval").unwrap().contains("acc"));
        assert_eq!(plots.figure_states(), vec![("acc".to_string(), FigureState::Registered)]);
    }

    #[test]
    fn test_update_sends_smoothed_value_for_registered_traces_only() {
        let plots = group_plots();
        let handle = plots
            .register_figure("loss", "step", "loss", [("train.loss", "train")])
            .unwrap()
            .unwrap();

        plots.update("train", 0.0, [("loss", 2.0), ("lr", 0.1)]).unwrap();
        plots.update("train", 1.0, [("loss", 4.0), ("lr", 0.1)]).unwrap();

        assert_eq!(plots.sink().points(&handle, "train"), vec![(0.0, 2.0), (1.0, 3.0)]);
        let appends = plots
            .sink()
            .calls()
            .into_iter()
            .filter(|c| matches!(c, SinkCall::Append { .. }))
            .count();
        assert_eq!(appends, 2);
    }

    #[test]
    fn test_sink_failure_does_not_lose_updates() {
        let plots = group_plots();
        plots
            .register_figure("loss", "step", "loss", [("train.loss", "train")])
            .unwrap();
        plots.sink().set_available(false);
        plots.update("train", 0.0, [("loss", 1.0)]).unwrap();
        assert_eq!(plots.get_meter("train", "loss").unwrap().len(), 1);
    }

    #[test]
    fn test_update_trace_bypasses_meters() {
        let plots = group_plots();
        let handle = plots
            .register_figure("lr", "step", "lr", [("train.lr", "lr")])
            .unwrap()
            .unwrap();
        assert!(plots.update_trace("train", "lr", &[0.0, 1.0], &[0.1, 0.2]).unwrap());
        assert!(!plots.update_trace("train", "other", &[0.0], &[0.0]).unwrap());
        assert!(plots.update_trace("nope", "lr", &[0.0], &[0.0]).is_err());

        assert_eq!(plots.sink().points(&handle, "lr"), vec![(0.0, 0.1), (1.0, 0.2)]);
        assert!(plots.get_meter("train", "lr").unwrap().is_empty());
    }

    #[test]
    fn test_single_tracer_resume_replays_history() {
        let mut plots = PlottingTracer::new(MeterFactory::windowed(2), RecordingSink::new());
        plots.register_figure("loss", "step", "loss", [("loss", "loss")]).unwrap();
        for (x, v) in [(0.0, 1.0), (1.0, 3.0), (2.0, 5.0)] {
            plots.update(x, [("loss", v)]);
        }
        let state = plots.state_dict();

        let mut resumed = PlottingTracer::new(MeterFactory::windowed(2), RecordingSink::new());
        assert!(resumed.load_state_dict(state).unwrap().is_empty());
        assert_eq!(resumed.figure_states()[0].1, FigureState::Reattached);

        let windows = resumed.sink().windows();
        assert_eq!(
            resumed.sink().points(&windows[0], "loss"),
            vec![(0.0, 1.0), (1.0, 2.0), (2.0, 4.0)]
        );
    }

    #[test]
    fn test_single_tracer_rejects_empty_trace_name() {
        let mut plots = PlottingTracer::new(MeterFactory::unsmoothed(), RecordingSink::new());
        let err = plots.register_figure("t", "x", "y", [("", "legend")]).unwrap_err();
        assert!(matches!(err, TracerError::InvalidTraceName(_)));
        assert!(plots.tracer().is_empty());
    }

    #[test]
    fn test_plot_state_json_shape() {
        let plots = group_plots();
        plots
            .register_figure("loss", "step", "loss", [("train.loss", "train")])
            .unwrap();
        let json = serde_json::to_value(plots.state_dict()).unwrap();
        assert_eq!(json["figures"][0]["traces"][0]["key"], "train.loss");
        assert_eq!(json["tracer"]["train"]["loss"]["window_size"], 3);
    }

    #[test]
    fn test_group_plot_state_loads_back_from_json() {
        let plots = group_plots();
        plots
            .register_figure("loss", "step", "loss", [("train.loss", "train"), ("eval.loss", "eval")])
            .unwrap();
        plots.update("train", 0.0, [("loss", 2.0)]).unwrap();
        plots.update("eval", 0.0, [("loss", f64::NAN)]).unwrap();
        let state = plots.state_dict();

        let json = serde_json::to_string(&state).unwrap();
        let back: GroupPlotState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
        assert_eq!(back.figures[0].traces[1].key, TraceKey::new("eval", "loss"));

        let bare: GroupPlotState = serde_json::from_str(r#"{"tracer": {}}"#).unwrap();
        assert!(bare.figures.is_empty());
    }

    #[test]
    fn test_group_resume_rejects_ragged_record() {
        let target = group_plots();
        target
            .register_figure("loss", "step", "loss", [("train.loss", "train")])
            .unwrap();
        target.update("train", 0.0, [("loss", 1.0)]).unwrap();
        let calls_before = target.sink().calls().len();

        let state: GroupPlotState = serde_json::from_str(
            r#"{
                "tracer": {"train": {"loss": {"window_size": 3, "x_history": [0], "y_history": [2.0, 4.0]}}},
                "figures": [{"title": "loss", "xlabel": "step", "ylabel": "loss",
                             "traces": [{"key": "train.loss", "legend": "train"}]}]
            }"#,
        )
        .unwrap();
        let err = target.load_state_dict(state).unwrap_err();
        assert!(matches!(err, TracerError::InvalidState(_)));
        assert_eq!(target.sink().calls().len(), calls_before);
        assert_eq!(target.figure_states()[0].1, FigureState::Registered);
        assert_eq!(target.get_meter("train", "loss").unwrap().y_history(), &[1.0]);
    }

    #[test]
    fn test_group_resume_rejects_trace_in_two_figures() {
        let target = group_plots();
        target.update("train", 0.0, [("loss", 1.0)]).unwrap();

        let loss = TraceKey::new("train", "loss");
        let state = GroupPlotState {
            tracer: GroupTracerState::default(),
            figures: vec![
                FigureSpec::new("a", "step", "loss").with_trace(loss.clone(), "a"),
                FigureSpec::new("b", "step", "loss").with_trace(loss, "b"),
            ],
        };
        let err = target.load_state_dict(state).unwrap_err();
        assert!(matches!(err, TracerError::TraceAlreadyRegistered { ref name } if name == "train.loss"));
        assert!(target.figure_states().is_empty());
        assert_eq!(target.get_meter("train", "loss").unwrap().len(), 1);
        assert!(target.sink().calls().is_empty());
    }

    #[test]
    fn test_single_tracer_resume_rejects_ragged_record() {
        let mut plots = PlottingTracer::new(MeterFactory::windowed(2), RecordingSink::new());
        plots.update(0.0, [("loss", 1.0)]);

        let mut state = PlotTracerState {
            tracer: TracerState::default(),
            figures: Vec::new(),
        };
        state.tracer.meters.insert(
            "loss".into(),
            crate::meter::MeterRecord {
                window_size: 2,
                x_history: vec![0.0, 1.0],
                y_history: vec![5.0],
            },
        );
        assert!(matches!(
            plots.load_state_dict(state),
            Err(TracerError::InvalidState(_))
        ));
        assert_eq!(plots.get_meter("loss").y_history(), &[1.0]);
    }
}
