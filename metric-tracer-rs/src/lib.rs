//! # metric-tracer-rs
//!
//! Windowed metric aggregation for training loops, with live plots that
//! survive a restart.
//!
//! Every named metric gets a [`Meter`]: a bounded moving-average window plus
//! the complete `(x, y)` history. Meters are created lazily by a
//! [`Tracer`], and a [`GroupTracer`] keeps one tracer per declared phase
//! (`train`, `eval`, ...) with its own smoothing window. The plotting
//! variants forward each smoothed value to a [`VisualizationSink`] and, on
//! resume, replay the full smoothed history into freshly opened windows.
//!
//! ## Quick Start
//!
//! ```
//! use metric_tracer_rs::{GroupTracer, TracerConfig};
//!
//! let tracer = GroupTracer::new(
//!     TracerConfig::new().with_group("train", 3).with_group("eval", 1),
//! )?;
//!
//! for (step, loss) in [2.0, 4.0, 6.0, 8.0].into_iter().enumerate() {
//!     tracer.update_history("train", step as f64, [("loss", loss)])?;
//! }
//! assert_eq!(tracer.get_meter("train", "loss")?.average(), 6.0);
//!
//! // Persist and restore.
//! let restored = GroupTracer::new(tracer.config().clone())?;
//! restored.load_state_dict(tracer.state_dict())?;
//! assert_eq!(restored.get_meter("train", "loss")?.average(), 6.0);
//! # Ok::<(), metric_tracer_rs::TracerError>(())
//! ```
//!
//! ## Modules
//!
//! - [`smoothing`]: trailing moving average over a sequence
//! - [`meter`]: single-series meters and the meter factory
//! - [`tracer`]: lazily populated meter registry for one group
//! - [`group`]: tracers partitioned into declared groups
//! - [`sink`]: the visualization sink trait and its implementations
//! - [`figure`]: figure registration and resume-by-replay
//! - [`plotting`]: tracers that mirror meters into a sink
//! - [`checkpoint`]: JSON state files
//! - [`telemetry`]: log subscriber setup

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod figure;
mod float_serde;
pub mod group;
pub mod key;
pub mod meter;
pub mod plotting;
pub mod sink;
pub mod smoothing;
pub mod telemetry;
pub mod tracer;

pub use config::{GroupSpec, TracerConfig};
pub use error::{Result, TracerError};
pub use figure::{FigureSpec, FigureState};
pub use group::{GroupTracer, GroupTracerState};
pub use key::TraceKey;
pub use meter::{Meter, MeterFactory, MeterRecord};
pub use plotting::{GroupPlotState, GroupPlottingTracer, PlotState, PlotTracerState, PlottingTracer};
pub use sink::{SinkError, VisualizationSink, WindowHandle, WindowOptions};
pub use smoothing::smooth;
pub use tracer::{ConfigMismatch, Tracer, TracerState};
