//! Lazily populated registry of meters for one group.

use std::collections::btree_map::{BTreeMap, Entry};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::meter::{Meter, MeterFactory, MeterRecord};

/// Registry mapping metric names to [`Meter`]s.
///
/// Looking up an unknown name creates its meter through the factory, so
/// callers never have to declare metrics up front. The tracer owns every
/// meter it creates.
///
/// # Example
///
/// ```
/// use metric_tracer_rs::{MeterFactory, Tracer};
///
/// let mut tracer = Tracer::new(MeterFactory::windowed(2));
/// tracer.update_history(0.0, [("loss", 1.0), ("acc", 0.5)]);
/// tracer.update_history(1.0, [("loss", 3.0)]);
///
/// assert_eq!(tracer.get("loss").unwrap().average(), 2.0);
/// assert_eq!(tracer.log_lines(), vec!["acc: 0.5000 (0.5000)", "loss: 3.0000 (2.0000)"]);
/// ```
#[derive(Debug, Clone)]
pub struct Tracer {
    factory: MeterFactory,
    meters: BTreeMap<String, Meter>,
}

/// Persisted form of a [`Tracer`]: metric name to meter record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TracerState {
    /// Records keyed by metric name.
    pub meters: BTreeMap<String, MeterRecord>,
}

impl TracerState {
    /// Check every record before anything is restored from it.
    ///
    /// # Errors
    ///
    /// Returns the first record error, see [`MeterRecord::validate`].
    pub fn validate(&self) -> Result<()> {
        self.meters
            .iter()
            .try_for_each(|(key, record)| record.validate(key))
    }
}

/// A restored meter whose window differs from the live configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigMismatch {
    /// Metric name.
    pub key: String,
    /// Window size the live tracer would have used.
    pub expected: usize,
    /// Window size stored in the restored record, which is kept.
    pub restored: usize,
}

impl Tracer {
    /// Create an empty tracer.
    #[must_use]
    pub fn new(factory: MeterFactory) -> Self {
        Self {
            factory,
            meters: BTreeMap::new(),
        }
    }

    /// Factory used for new meters.
    #[must_use]
    pub fn factory(&self) -> MeterFactory {
        self.factory
    }

    /// Get the meter for `key`, creating it on first access.
    pub fn get_meter(&mut self, key: &str) -> &mut Meter {
        match self.meters.entry(key.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                debug!(
                    "creating meter `{}` (window {})",
                    key,
                    self.factory.window_size()
                );
                entry.insert(self.factory.create())
            }
        }
    }

    /// Get an existing meter without creating one.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Meter> {
        self.meters.get(key)
    }

    /// Whether a meter exists for `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.meters.contains_key(key)
    }

    /// Registered metric names, sorted.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.meters.keys().map(String::as_str)
    }

    /// Registered meters, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Meter)> {
        self.meters.iter().map(|(k, m)| (k.as_str(), m))
    }

    /// Number of registered meters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.meters.len()
    }

    /// Whether no meter has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.meters.is_empty()
    }

    /// Record every `(key, value)` pair at index `x`.
    ///
    /// Each meter only sees its own updates, so the iteration order of
    /// `data` does not matter.
    pub fn update_history<I, K>(&mut self, x: f64, data: I)
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        for (key, value) in data {
            self.get_meter(key.as_ref()).update(x, value);
        }
    }

    /// Reset every meter, keeping them registered.
    pub fn reset_all(&mut self) {
        for meter in self.meters.values_mut() {
            meter.reset();
        }
    }

    /// Smoothed curves of every meter, keyed by name.
    #[must_use]
    pub fn curves(&self) -> BTreeMap<String, (Vec<f64>, Vec<f64>)> {
        self.meters
            .iter()
            .map(|(k, m)| (k.clone(), m.export()))
            .collect()
    }

    /// Snapshot all meters, including their complete histories.
    #[must_use]
    pub fn state_dict(&self) -> TracerState {
        TracerState {
            meters: self
                .meters
                .iter()
                .map(|(k, m)| (k.clone(), m.to_record()))
                .collect(),
        }
    }

    /// Replace all meters with the ones in `state`.
    ///
    /// Records are restored verbatim even when their window size differs
    /// from the live configuration; each such meter is logged and returned.
    ///
    /// # Errors
    ///
    /// Returns [`TracerError::InvalidState`] if any record has histories of
    /// different lengths. Nothing is replaced in that case.
    pub fn load_state_dict(&mut self, state: TracerState) -> Result<Vec<ConfigMismatch>> {
        state.validate()?;
        let mut mismatches = Vec::new();

        for (key, record) in &state.meters {
            let expected = self
                .meters
                .get(key)
                .map_or(self.factory.window_size(), Meter::window_size);
            if record.window_size != expected {
                warn!(
                    "meter `{}` restored with window {} but configured window is {}",
                    key, record.window_size, expected
                );
                mismatches.push(ConfigMismatch {
                    key: key.clone(),
                    expected,
                    restored: record.window_size,
                });
            }
        }

        self.meters = state
            .meters
            .into_iter()
            .map(|(k, record)| (k, Meter::from_record(record)))
            .collect();

        Ok(mismatches)
    }

    /// One `"<key>: <meter>"` line per meter, sorted by key.
    #[must_use]
    pub fn log_lines(&self) -> Vec<String> {
        self.meters
            .iter()
            .map(|(key, meter)| format!("{key}: {meter}"))
            .collect()
    }

    /// Emit [`Self::log_lines`] at info level.
    pub fn logging(&self) {
        for line in self.log_lines() {
            info!("{}", line);
        }
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new(MeterFactory::windowed(crate::config::DEFAULT_TRAIN_WINDOW))
    }
}
