//! Windowed accumulation of readings into per-metric running averages.

use std::collections::BTreeMap;

use crate::metric::Snapshot;

#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    sum: f64,
    count: u64,
}

/// Running sum and sample count per metric since the last reset.
///
/// Each metric keeps its own count: a metric that is absent from some
/// snapshots (a GPU gone quiet, a sensor that vanished) averages over the
/// ticks where it was actually observed, not the window's total tick count.
#[derive(Debug, Clone, Default)]
pub struct WindowAccumulator {
    tallies: BTreeMap<String, Tally>,
}

impl WindowAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold every reading of `snapshot` into the window.
    pub fn add(&mut self, snapshot: &Snapshot) {
        for (name, reading) in snapshot.iter() {
            let tally = self.tallies.entry(name.to_string()).or_default();
            tally.sum += reading.value;
            tally.count += 1;
        }
    }

    /// Per-metric arithmetic mean over the samples seen since the last reset.
    pub fn average(&self) -> BTreeMap<String, f64> {
        self.tallies
            .iter()
            .map(|(name, tally)| (name.clone(), tally.sum / tally.count as f64))
            .collect()
    }

    /// Number of samples observed for one metric since the last reset.
    pub fn sample_count(&self, name: &str) -> u64 {
        self.tallies.get(name).map_or(0, |t| t.count)
    }

    /// Clear all sums and counts. Called once per report window, after the
    /// averages have been read and emitted.
    pub fn reset(&mut self) {
        self.tallies.clear();
    }

    /// Whether no samples have been added since the last reset.
    pub fn is_empty(&self) -> bool {
        self.tallies.is_empty()
    }
}
