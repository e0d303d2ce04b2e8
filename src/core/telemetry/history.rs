use std::collections::VecDeque;

use chrono::{DateTime, Utc};

const DEFAULT_HISTORY_SIZE: usize = 60;

/// One poll worth of headline readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistorySample {
    pub timestamp: DateTime<Utc>,
    pub cpu_temperature: Option<f32>,
    pub cpu_power: Option<f32>,
    pub gpu_temperature: Option<f32>,
    pub gpu_power: Option<f32>,
}

/// Circular buffer of recent samples, in memory only
#[derive(Debug, Clone)]
pub struct SnapshotHistory {
    capacity: usize,
    samples: VecDeque<HistorySample>,
}

impl SnapshotHistory {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, sample: HistorySample) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> impl Iterator<Item = &HistorySample> {
        self.samples.iter()
    }

    pub fn latest(&self) -> Option<&HistorySample> {
        self.samples.back()
    }

    /// (min, max) of the present values picked by `field`. Absent samples
    /// are skipped, never counted as zero.
    pub fn range<F>(&self, field: F) -> Option<(f32, f32)>
    where
        F: Fn(&HistorySample) -> Option<f32>,
    {
        self.samples
            .iter()
            .filter_map(field)
            .fold(None, |acc, value| match acc {
                None => Some((value, value)),
                Some((min, max)) => Some((min.min(value), max.max(value))),
            })
    }
}

impl Default for SnapshotHistory {
    fn default() -> Self {
        Self::new()
    }
}
