//! Bounded, ordered buffer of the most recent samples.
//!
//! [`History`] keeps at most `capacity` samples in generation order. Pushing
//! onto a full buffer discards the oldest entry. The coordinator replays the
//! whole buffer to every newly joined subscriber.

use std::collections::VecDeque;

use serde::Serialize;

use crate::generator::Sample;

/// Bounded ring of the most recent samples, oldest first.
#[derive(Debug, Clone)]
pub struct History {
    samples: VecDeque<Sample>,
    capacity: usize,
}

/// Aggregate view of the samples currently held in a [`History`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistorySummary {
    /// Number of samples held.
    pub count: usize,
    /// Smallest value, if any samples are held.
    pub min: Option<f64>,
    /// Largest value, if any samples are held.
    pub max: Option<f64>,
    /// Arithmetic mean, if any samples are held.
    pub average: Option<f64>,
    /// Most recent value, if any samples are held.
    pub latest: Option<f64>,
}

impl History {
    /// Create an empty history holding at most `capacity` samples.
    ///
    /// A capacity of zero is raised to one; configuration validation
    /// rejects zero before it gets here.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, discarding the oldest entries beyond capacity.
    pub fn push(&mut self, sample: Sample) {
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Remove every sample.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Number of samples held.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no samples are held.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Maximum number of samples held.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate samples oldest first.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Sample> + '_ {
        self.samples.iter()
    }

    /// Copy the held samples, oldest first.
    pub fn to_vec(&self) -> Vec<Sample> {
        self.samples.iter().copied().collect()
    }

    /// Minimum, maximum, mean, and latest value of the held samples.
    pub fn summary(&self) -> HistorySummary {
        let mut min: Option<f64> = None;
        let mut max: Option<f64> = None;
        let mut sum = 0.0_f64;
        let mut count = 0.0_f64;
        for sample in &self.samples {
            min = Some(min.map_or(sample.value, |m| m.min(sample.value)));
            max = Some(max.map_or(sample.value, |m| m.max(sample.value)));
            sum += sample.value;
            count += 1.0;
        }
        HistorySummary {
            count: self.samples.len(),
            min,
            max,
            average: (count > 0.0).then(|| sum / count),
            latest: self.samples.back().map(|s| s.value),
        }
    }
}
