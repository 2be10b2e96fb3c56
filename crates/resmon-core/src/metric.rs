//! Metric data model: named readings carrying an explicit gauge/counter kind.
//!
//! The kind travels with the value and is decided once, by the stats
//! provider. Downstream stages (rate conversion, accumulation, reporting)
//! never re-derive it from the metric name.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// How a metric value relates to the previous snapshot's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricKind {
    /// Instantaneous value, reported as-is.
    Gauge,
    /// Monotonically non-decreasing cumulative total, converted to a
    /// per-second rate before aggregation.
    Counter,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gauge => write!(f, "gauge"),
            Self::Counter => write!(f, "counter"),
        }
    }
}

/// One observed metric value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub value: f64,
    pub kind: MetricKind,
}

/// Point-in-time set of named metric readings.
///
/// Readings are keyed by metric name and ordered, so reports are emitted in
/// a stable order. Non-finite values are rejected at insertion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Wall-clock generation timestamp in milliseconds since the epoch.
    pub taken_unix_ms: u64,
    readings: BTreeMap<String, Reading>,
}

impl Snapshot {
    /// Empty snapshot stamped with the current wall clock.
    pub fn now() -> Self {
        Self {
            taken_unix_ms: unix_ms_now(),
            readings: BTreeMap::new(),
        }
    }

    /// Empty snapshot with an explicit timestamp.
    pub fn with_timestamp(taken_unix_ms: u64) -> Self {
        Self {
            taken_unix_ms,
            readings: BTreeMap::new(),
        }
    }

    /// Record an instantaneous value.
    pub fn push_gauge(&mut self, name: impl Into<String>, value: f64) {
        self.push(name, value, MetricKind::Gauge);
    }

    /// Record a cumulative counter value.
    pub fn push_counter(&mut self, name: impl Into<String>, value: f64) {
        self.push(name, value, MetricKind::Counter);
    }

    fn push(&mut self, name: impl Into<String>, value: f64, kind: MetricKind) {
        if !value.is_finite() {
            return;
        }
        self.readings.insert(name.into(), Reading { value, kind });
    }

    /// Look up one reading by metric name.
    pub fn get(&self, name: &str) -> Option<Reading> {
        self.readings.get(name).copied()
    }

    /// Iterate over readings in metric-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Reading)> {
        self.readings.iter().map(|(name, r)| (name.as_str(), *r))
    }

    /// Number of readings.
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// Whether the snapshot holds no readings.
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

fn unix_ms_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
