//! Causal moving-average smoothing.
//!
//! Both the live window of a [`Meter`](crate::Meter) and the offline
//! reconstruction of a smoothed curve go through [`RollingMean`], so a curve
//! recomputed from history and the value a meter reported live agree.
//!
//! # Example
//!
//! ```
//! use metric_tracer_rs::smoothing::smooth;
//!
//! let smoothed = smooth(&[2.0, 4.0, 6.0, 8.0], 3);
//! assert_eq!(smoothed, vec![2.0, 3.0, 4.0, 6.0]);
//! ```

/// Fixed-capacity circular buffer with a running sum.
///
/// Pushing is O(1). The running sum is recomputed from the buffer once per
/// full rotation, and whenever it stops being finite, so floating-point
/// drift stays bounded over unbounded streams.
#[derive(Debug, Clone)]
pub struct RollingMean {
    values: Vec<f64>,
    capacity: usize,
    next: usize,
    sum: f64,
}

impl RollingMean {
    /// Create an empty window holding at most `capacity` values.
    ///
    /// A capacity of zero is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: Vec::with_capacity(capacity),
            capacity,
            next: 0,
            sum: 0.0,
        }
    }

    /// Push a value, evicting the oldest one if the window is full.
    pub fn push(&mut self, value: f64) {
        if self.values.len() < self.capacity {
            self.values.push(value);
            self.sum += value;
            self.next = self.values.len() % self.capacity;
            return;
        }

        let slot = self.next;
        self.sum += value - self.values[slot];
        self.values[slot] = value;
        self.next = (slot + 1) % self.capacity;

        if self.next == 0 || !self.sum.is_finite() {
            self.sum = self.values.iter().sum();
        }
    }

    /// Mean of the values currently held, NaN when empty.
    #[must_use]
    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            f64::NAN
        } else {
            self.sum / self.values.len() as f64
        }
    }

    /// Number of values currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the window holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Maximum number of values held.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Values in arrival order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        let split = if self.values.len() < self.capacity { 0 } else { self.next };
        self.values[split..].iter().chain(self.values[..split].iter())
    }

    /// Drop all values.
    pub fn clear(&mut self) {
        self.values.clear();
        self.next = 0;
        self.sum = 0.0;
    }
}

/// Smooth a sequence with a causal moving average.
///
/// Element `i` of the output is the mean of the last `min(i + 1, window)`
/// inputs ending at `i`. The first output always equals the first input and
/// no output depends on later inputs. A `window` of zero is treated as one.
#[must_use]
pub fn smooth(xs: &[f64], window: usize) -> Vec<f64> {
    let mut rolling = RollingMean::new(window);
    xs.iter()
        .map(|&x| {
            rolling.push(x);
            rolling.mean()
        })
        .collect()
}
