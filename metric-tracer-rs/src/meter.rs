//! Single-series meters with a bounded moving-average window.
//!
//! A [`Meter`] keeps two views of one metric:
//! - a live window of the most recent `window_size` values, giving the
//!   current moving average in O(1) per update
//! - the full `(x, y)` history, used to rebuild the smoothed curve offline
//!   and to replay it after a restart
//!
//! # Example
//!
//! ```
//! use metric_tracer_rs::Meter;
//!
//! let mut meter = Meter::new(3);
//! meter.update(0.0, 2.0);
//! meter.update(1.0, 4.0);
//! meter.update(2.0, 6.0);
//! meter.update(3.0, 8.0);
//! assert_eq!(meter.average(), 6.0);
//! assert_eq!(meter.to_string(), "8.0000 (6.0000)");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::UNSMOOTHED_WINDOW;
use crate::error::{Result, TracerError};
use crate::float_serde::json_float_seq;
use crate::smoothing::{smooth, RollingMean};

/// Streaming accumulator for one named numeric time series.
#[derive(Debug, Clone)]
pub struct Meter {
    window_size: usize,
    window: RollingMean,
    current: f64,
    x_history: Vec<f64>,
    y_history: Vec<f64>,
}

impl Meter {
    /// Create an empty meter. A `window_size` of zero is treated as one.
    #[must_use]
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            window_size,
            window: RollingMean::new(window_size),
            current: f64::NAN,
            x_history: Vec::new(),
            y_history: Vec::new(),
        }
    }

    /// Record `value` observed at index `x`.
    pub fn update(&mut self, x: f64, value: f64) {
        self.x_history.push(x);
        self.y_history.push(value);
        self.window.push(value);
        self.current = value;
    }

    /// Mean of the live window, NaN before the first update.
    #[must_use]
    pub fn average(&self) -> f64 {
        self.window.mean()
    }

    /// Last observed value, NaN before the first update.
    #[must_use]
    pub fn current(&self) -> f64 {
        self.current
    }

    /// Sum of every value in the history.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.y_history.iter().sum()
    }

    /// Configured smoothing window.
    #[must_use]
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Whether the meter smooths at all.
    #[must_use]
    pub fn is_smoothed(&self) -> bool {
        self.window_size != UNSMOOTHED_WINDOW
    }

    /// Number of values currently in the live window.
    #[must_use]
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Number of updates since creation or the last reset.
    #[must_use]
    pub fn len(&self) -> usize {
        self.y_history.len()
    }

    /// Whether the meter has seen no updates since creation or the last reset.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.y_history.is_empty()
    }

    /// Every submitted index, in submission order.
    #[must_use]
    pub fn x_history(&self) -> &[f64] {
        &self.x_history
    }

    /// Every submitted value, in submission order.
    #[must_use]
    pub fn y_history(&self) -> &[f64] {
        &self.y_history
    }

    /// The full history with the values smoothed from scratch.
    ///
    /// The curve depends only on the history, never on the live window, so
    /// a meter restored from a [`MeterRecord`] exports exactly what the
    /// original would have.
    #[must_use]
    pub fn export(&self) -> (Vec<f64>, Vec<f64>) {
        let y = if self.is_smoothed() {
            smooth(&self.y_history, self.window_size)
        } else {
            self.y_history.clone()
        };
        (self.x_history.clone(), y)
    }

    /// Clear the window and both histories.
    pub fn reset(&mut self) {
        self.window.clear();
        self.x_history.clear();
        self.y_history.clear();
        self.current = f64::NAN;
    }

    /// Serializable snapshot of this meter.
    #[must_use]
    pub fn to_record(&self) -> MeterRecord {
        MeterRecord {
            window_size: self.window_size,
            x_history: self.x_history.clone(),
            y_history: self.y_history.clone(),
        }
    }

    /// Rebuild a meter from a record, refilling the live window from the
    /// tail of the history.
    ///
    /// The record is taken as is; call [`MeterRecord::validate`] first when
    /// it comes from outside the process.
    #[must_use]
    pub fn from_record(record: MeterRecord) -> Self {
        let mut meter = Self::new(record.window_size);
        let tail = record.y_history.len().saturating_sub(meter.window_size);
        for &value in &record.y_history[tail..] {
            meter.window.push(value);
        }
        meter.current = record.y_history.last().copied().unwrap_or(f64::NAN);
        meter.x_history = record.x_history;
        meter.y_history = record.y_history;
        meter
    }
}

impl fmt::Display for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_smoothed() {
            write!(f, "{:.4} ({:.4})", self.current, self.average())
        } else {
            write!(f, "{:.4}", self.current)
        }
    }
}

/// Produces meters with a fixed window size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterFactory {
    window_size: usize,
}

impl MeterFactory {
    /// Factory for smoothed meters.
    #[must_use]
    pub fn windowed(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(1),
        }
    }

    /// Factory for plain last-value meters.
    #[must_use]
    pub fn unsmoothed() -> Self {
        Self::windowed(UNSMOOTHED_WINDOW)
    }

    /// Window size of the meters this factory creates.
    #[must_use]
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Create a fresh meter.
    #[must_use]
    pub fn create(&self) -> Meter {
        Meter::new(self.window_size)
    }
}

/// Persisted form of a [`Meter`].
///
/// The record is `{window_size, x_history, y_history}`; the last observed
/// value is the tail of `y_history`. Non-finite values never collapse to a
/// number: NaN is written as `null` and infinities as `"inf"` / `"-inf"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterRecord {
    /// Smoothing window of the meter.
    pub window_size: usize,
    /// Every submitted index.
    #[serde(with = "json_float_seq")]
    pub x_history: Vec<f64>,
    /// Every submitted value.
    #[serde(with = "json_float_seq")]
    pub y_history: Vec<f64>,
}

impl MeterRecord {
    /// Check that both histories have one entry per update.
    ///
    /// `key` names the meter in the error message.
    ///
    /// # Errors
    ///
    /// Returns [`TracerError::InvalidState`] when the histories differ in
    /// length.
    pub fn validate(&self, key: &str) -> Result<()> {
        if self.x_history.len() != self.y_history.len() {
            return Err(TracerError::InvalidState(format!(
                "meter `{key}` has {} x values but {} y values",
                self.x_history.len(),
                self.y_history.len()
            )));
        }
        Ok(())
    }
}

impl PartialEq for MeterRecord {
    fn eq(&self, other: &Self) -> bool {
        fn same_seq(a: &[f64], b: &[f64]) -> bool {
            a.len() == b.len()
                && a.iter()
                    .zip(b)
                    .all(|(&x, &y)| x == y || (x.is_nan() && y.is_nan()))
        }
        self.window_size == other.window_size
            && same_seq(&self.x_history, &other.x_history)
            && same_seq(&self.y_history, &other.y_history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_sequence_with_eviction() {
        let mut meter = Meter::new(3);
        let mut averages = Vec::new();
        for (x, v) in [(0.0, 2.0), (1.0, 4.0), (2.0, 6.0)] {
            meter.update(x, v);
            averages.push(meter.average());
        }
        assert_eq!(averages, vec![2.0, 3.0, 4.0]);

        meter.update(3.0, 8.0);
        assert_eq!(meter.average(), 6.0);
        assert_eq!(meter.window_len(), 3);
        assert_eq!(meter.len(), 4);
    }

    #[test]
    fn test_empty_meter_reports_nan() {
        let meter = Meter::new(5);
        assert!(meter.average().is_nan());
        assert!(meter.current().is_nan());
        assert!(meter.is_empty());
        assert_eq!(meter.to_string(), "NaN (NaN)");
    }

    #[test]
    fn test_repeated_value_is_its_own_average() {
        let mut meter = Meter::new(4);
        for i in 0..4 {
            meter.update(f64::from(i), 0.25);
        }
        assert_eq!(meter.average(), 0.25);
    }

    #[test]
    fn test_reset_keeps_configuration() {
        let mut meter = Meter::new(2);
        meter.update(0.0, 1.0);
        meter.update(1.0, 3.0);
        meter.reset();

        assert!(meter.is_empty());
        assert_eq!(meter.window_len(), 0);
        assert!(meter.current().is_nan());
        assert!(meter.average().is_nan());
        assert_eq!(meter.window_size(), 2);

        meter.update(5.0, 10.0);
        assert_eq!(meter.average(), 10.0);
    }

    #[test]
    fn test_export_is_smoothed_and_idempotent() {
        let mut meter = Meter::new(2);
        for (x, v) in [(0.0, 1.0), (1.0, 3.0), (2.0, 5.0)] {
            meter.update(x, v);
        }
        let first = meter.export();
        let second = meter.export();
        assert_eq!(first, second);
        assert_eq!(first.0, vec![0.0, 1.0, 2.0]);
        assert_eq!(first.1, vec![1.0, 2.0, 4.0]);
    }

    #[test]
    fn test_unsmoothed_display_and_export() {
        let mut meter = MeterFactory::unsmoothed().create();
        meter.update(0.0, 0.5);
        meter.update(1.0, 0.75);
        assert!(!meter.is_smoothed());
        assert_eq!(meter.to_string(), "0.7500");
        assert_eq!(meter.export().1, vec![0.5, 0.75]);
        assert_eq!(meter.average(), 0.75);
    }

    #[test]
    fn test_sum_covers_whole_history() {
        let mut meter = Meter::new(2);
        for (i, v) in [1.0, 2.0, 3.0].into_iter().enumerate() {
            meter.update(i as f64, v);
        }
        assert_eq!(meter.sum(), 6.0);
    }

    #[test]
    fn test_record_restores_window_from_tail() {
        let mut meter = Meter::new(3);
        for i in 0..10 {
            meter.update(f64::from(i), f64::from(i));
        }
        let restored = Meter::from_record(meter.to_record());
        assert_eq!(restored.window_len(), 3);
        assert_eq!(restored.average(), meter.average());
        assert_eq!(restored.x_history(), meter.x_history());
        assert_eq!(restored.export(), meter.export());
    }

    #[test]
    fn test_record_json_keeps_non_finite_values() {
        let mut meter = Meter::new(2);
        meter.update(0.0, f64::NAN);
        meter.update(1.0, f64::INFINITY);
        meter.update(2.0, -1.5);
        let record = meter.to_record();

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("null"));
        assert!(json.contains("\"inf\""));

        let back: MeterRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        assert!(back.y_history[0].is_nan());
        assert_eq!(back.y_history[1], f64::INFINITY);
    }

    #[test]
    fn test_record_holds_window_and_histories_only() {
        let json = serde_json::to_value(Meter::new(4).to_record()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"window_size": 4, "x_history": [], "y_history": []})
        );
        let restored = Meter::from_record(serde_json::from_value(json).unwrap());
        assert!(restored.current().is_nan());
        assert!(restored.average().is_nan());
    }

    #[test]
    fn test_current_is_restored_from_history_tail() {
        let record: MeterRecord = serde_json::from_str(
            r#"{"window_size":3,"x_history":[0,1],"y_history":[2.0,4.0]}"#,
        )
        .unwrap();
        let meter = Meter::from_record(record);
        assert_eq!(meter.current(), 4.0);
        assert_eq!(meter.average(), 3.0);
        assert_eq!(meter.to_string(), "4.0000 (3.0000)");
    }

    #[test]
    fn test_validate_rejects_ragged_histories() {
        let record = MeterRecord {
            window_size: 3,
            x_history: vec![0.0],
            y_history: vec![2.0, 4.0],
        };
        let err = record.validate("train.loss").unwrap_err();
        assert!(matches!(err, TracerError::InvalidState(_)));
        assert!(err.to_string().contains("train.loss"));

        assert!(Meter::new(2).to_record().validate("m").is_ok());
    }
}
