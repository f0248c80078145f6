//! Tracers partitioned into declared groups.
//!
//! Each group (e.g. `train` and `eval`) owns an independent [`Tracer`] with
//! its own smoothing window. Groups are fixed at construction; every call
//! naming an undeclared group fails with [`TracerError::UnknownGroup`].
//!
//! Each group's tracer sits behind its own writer lock, so concurrent
//! workers can update different groups in parallel, and lazy meter creation
//! within a group never races.

use std::collections::BTreeMap;

use parking_lot::{MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::TracerConfig;
use crate::error::{Result, TracerError};
use crate::key::TraceKey;
use crate::meter::{Meter, MeterFactory};
use crate::tracer::{ConfigMismatch, Tracer, TracerState};

/// Persisted form of a [`GroupTracer`]: group name to tracer state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupTracerState {
    /// Tracer states keyed by group name.
    pub groups: BTreeMap<String, TracerState>,
}

impl GroupTracerState {
    /// Check every record of every group, naming offenders `group.metric`.
    ///
    /// # Errors
    ///
    /// Returns [`TracerError::InvalidState`] for the first record whose
    /// histories differ in length.
    pub fn validate(&self) -> Result<()> {
        for (group, state) in &self.groups {
            for (key, record) in &state.meters {
                record.validate(&TraceKey::new(group.as_str(), key.as_str()).to_string())?;
            }
        }
        Ok(())
    }
}

/// Routes updates and queries into one [`Tracer`] per declared group.
///
/// # Example
///
/// ```
/// use metric_tracer_rs::{GroupTracer, TracerConfig, TracerError};
///
/// let tracer = GroupTracer::new(
///     TracerConfig::new().with_group("train", 50).with_group("eval", 1),
/// )?;
/// tracer.update_history("train", 0.0, [("loss", 0.7)])?;
/// assert_eq!(tracer.get_meter("train", "loss")?.current(), 0.7);
///
/// let err = tracer.get_meter("bogus", "loss").unwrap_err();
/// assert!(matches!(err, TracerError::UnknownGroup { .. }));
/// # Ok::<(), TracerError>(())
/// ```
#[derive(Debug)]
pub struct GroupTracer {
    config: TracerConfig,
    groups: Vec<(String, RwLock<Tracer>)>,
}

impl GroupTracer {
    /// Create a tracer with one empty group per declared spec.
    ///
    /// # Errors
    ///
    /// Returns [`TracerError::InvalidConfig`] if the configuration is invalid.
    pub fn new(config: TracerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    fn from_validated(config: TracerConfig) -> Self {
        let groups = config
            .groups
            .iter()
            .map(|spec| {
                let tracer = Tracer::new(MeterFactory::windowed(spec.window_size));
                (spec.name.clone(), RwLock::new(tracer))
            })
            .collect();
        Self { config, groups }
    }

    /// The configuration this tracer was built from.
    #[must_use]
    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    /// Declared group names, in declaration order.
    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(name, _)| name.as_str())
    }

    /// Whether `group` was declared.
    #[must_use]
    pub fn has_group(&self, group: &str) -> bool {
        self.groups.iter().any(|(name, _)| name == group)
    }

    /// Fail with [`TracerError::UnknownGroup`] unless `group` was declared.
    ///
    /// # Errors
    ///
    /// Returns [`TracerError::UnknownGroup`] for undeclared groups.
    pub fn check_group(&self, group: &str) -> Result<()> {
        self.tracer(group).map(|_| ())
    }

    fn tracer(&self, group: &str) -> Result<&RwLock<Tracer>> {
        self.groups
            .iter()
            .find(|(name, _)| name == group)
            .map(|(_, tracer)| tracer)
            .ok_or_else(|| TracerError::unknown_group(group, self.group_names()))
    }

    /// Read access to one group's tracer.
    ///
    /// # Errors
    ///
    /// Returns [`TracerError::UnknownGroup`] for undeclared groups.
    pub fn read(&self, group: &str) -> Result<RwLockReadGuard<'_, Tracer>> {
        Ok(self.tracer(group)?.read())
    }

    /// Write access to one group's tracer.
    ///
    /// # Errors
    ///
    /// Returns [`TracerError::UnknownGroup`] for undeclared groups.
    pub fn write(&self, group: &str) -> Result<RwLockWriteGuard<'_, Tracer>> {
        Ok(self.tracer(group)?.write())
    }

    /// Get the meter for `(group, key)`, creating it on first access.
    ///
    /// The group stays write-locked for as long as the guard lives.
    ///
    /// # Errors
    ///
    /// Returns [`TracerError::UnknownGroup`] for undeclared groups.
    pub fn get_meter(&self, group: &str, key: &str) -> Result<MappedRwLockWriteGuard<'_, Meter>> {
        let guard = self.write(group)?;
        Ok(RwLockWriteGuard::map(guard, |tracer| tracer.get_meter(key)))
    }

    /// Same as [`Self::get_meter`], addressed by a compound key.
    ///
    /// # Errors
    ///
    /// Returns [`TracerError::UnknownGroup`] for undeclared groups.
    pub fn meter(&self, key: &TraceKey) -> Result<MappedRwLockWriteGuard<'_, Meter>> {
        self.get_meter(key.group(), key.metric())
    }

    /// Record every `(key, value)` pair of `data` in `group` at index `x`.
    ///
    /// # Errors
    ///
    /// Returns [`TracerError::UnknownGroup`] for undeclared groups; nothing
    /// is recorded in that case.
    pub fn update_history<I, K>(&self, group: &str, x: f64, data: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        self.write(group)?.update_history(x, data);
        Ok(())
    }

    /// Reset every meter of one group.
    ///
    /// # Errors
    ///
    /// Returns [`TracerError::UnknownGroup`] for undeclared groups.
    pub fn reset_group(&self, group: &str) -> Result<()> {
        self.write(group)?.reset_all();
        Ok(())
    }

    /// Smoothed curves of every meter in `group`.
    ///
    /// # Errors
    ///
    /// Returns [`TracerError::UnknownGroup`] for undeclared groups.
    pub fn curves(&self, group: &str) -> Result<BTreeMap<String, (Vec<f64>, Vec<f64>)>> {
        Ok(self.read(group)?.curves())
    }

    /// Snapshot every group.
    #[must_use]
    pub fn state_dict(&self) -> GroupTracerState {
        GroupTracerState {
            groups: self
                .groups
                .iter()
                .map(|(name, tracer)| (name.clone(), tracer.read().state_dict()))
                .collect(),
        }
    }

    /// Restore every group from `state`.
    ///
    /// Declared groups absent from `state` end up empty. Window mismatches
    /// are returned with `group.metric` keys.
    ///
    /// # Errors
    ///
    /// Returns [`TracerError::UnknownGroup`] if `state` names a group that
    /// was not declared, or [`TracerError::InvalidState`] if any record is
    /// malformed. No group is modified in either case.
    pub fn load_state_dict(&self, mut state: GroupTracerState) -> Result<Vec<ConfigMismatch>> {
        self.check_state(&state)?;

        let mut mismatches = Vec::new();
        for (name, tracer) in &self.groups {
            let group_state = state.groups.remove(name).unwrap_or_default();
            let loaded = tracer.write().load_state_dict(group_state)?;
            mismatches.extend(loaded.into_iter().map(|m| ConfigMismatch {
                key: TraceKey::new(name.as_str(), m.key).to_string(),
                ..m
            }));
        }
        Ok(mismatches)
    }

    /// Every check [`Self::load_state_dict`] makes before touching a group.
    pub(crate) fn check_state(&self, state: &GroupTracerState) -> Result<()> {
        if let Some(unknown) = state.groups.keys().find(|g| !self.has_group(g)) {
            return Err(TracerError::unknown_group(unknown, self.group_names()));
        }
        state.validate()
    }

    /// Log lines for one group, or for every group with a `[group]` header
    /// before each.
    ///
    /// # Errors
    ///
    /// Returns [`TracerError::UnknownGroup`] for undeclared groups.
    pub fn log_lines(&self, group: Option<&str>) -> Result<Vec<String>> {
        if let Some(group) = group {
            return Ok(self.read(group)?.log_lines());
        }

        let mut lines = Vec::new();
        for (name, tracer) in &self.groups {
            lines.push(format!("[{name}]"));
            lines.extend(tracer.read().log_lines());
        }
        Ok(lines)
    }

    /// Emit [`Self::log_lines`] at info level.
    ///
    /// # Errors
    ///
    /// Returns [`TracerError::UnknownGroup`] for undeclared groups.
    pub fn logging(&self, group: Option<&str>) -> Result<()> {
        for line in self.log_lines(group)? {
            info!("{}", line);
        }
        Ok(())
    }
}

impl Default for GroupTracer {
    fn default() -> Self {
        Self::from_validated(TracerConfig::default())
    }
}
