//! Conversion of cumulative counters into per-second rates.

use crate::metric::{MetricKind, Snapshot};

/// Turn a raw snapshot into directly reportable values.
///
/// Gauges pass through unchanged. A counter becomes the delta against the
/// previous raw snapshot divided by `elapsed_secs`; on the first tick, or
/// when the counter was absent from `previous`, it yields 0 instead of a
/// spurious rate. `elapsed_secs <= 0` (non-monotonic clock) is treated as a
/// no-op tick and counters also yield 0. Metrics present only in `previous`
/// are dropped, not carried forward.
///
/// Every reading in the returned snapshot is a gauge: after conversion the
/// values are instantaneous and must not be rate-converted again.
pub fn to_rates(previous: Option<&Snapshot>, current: &Snapshot, elapsed_secs: f64) -> Snapshot {
    let mut out = Snapshot::with_timestamp(current.taken_unix_ms);
    for (name, reading) in current.iter() {
        match reading.kind {
            MetricKind::Gauge => out.push_gauge(name, reading.value),
            MetricKind::Counter => {
                let rate = if elapsed_secs > 0.0 {
                    let base = previous
                        .and_then(|p| p.get(name))
                        .map_or(reading.value, |r| r.value);
                    (reading.value - base) / elapsed_secs
                } else {
                    0.0
                };
                out.push_gauge(name, rate);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters(taken_unix_ms: u64, values: &[(&str, f64)]) -> Snapshot {
        let mut s = Snapshot::with_timestamp(taken_unix_ms);
        for (name, value) in values {
            s.push_counter(*name, *value);
        }
        s
    }

    #[test]
    fn counter_delta_over_elapsed() {
        let prev = counters(0, &[("io_read_mbs", 100.0)]);
        let cur = counters(2_000, &[("io_read_mbs", 150.0)]);
        let rates = to_rates(Some(&prev), &cur, 2.0);
        assert!((rates.get("io_read_mbs").unwrap().value - 25.0).abs() < 1e-9);
    }

    #[test]
    fn first_tick_counter_is_zero() {
        let cur = counters(1_000, &[("network_tx_mbs", 123_456.0)]);
        let rates = to_rates(None, &cur, 0.5);
        assert!((rates.get("network_tx_mbs").unwrap().value).abs() < 1e-9);
    }

    #[test]
    fn counter_new_since_previous_is_zero() {
        let prev = counters(0, &[("io_read_mbs", 10.0)]);
        let cur = counters(500, &[("io_read_mbs", 11.0), ("io_write_mbs", 900.0)]);
        let rates = to_rates(Some(&prev), &cur, 0.5);
        assert!((rates.get("io_read_mbs").unwrap().value - 2.0).abs() < 1e-9);
        assert!((rates.get("io_write_mbs").unwrap().value).abs() < 1e-9);
    }

    #[test]
    fn zero_or_negative_elapsed_is_noop_tick() {
        let prev = counters(0, &[("io_read_mbs", 10.0)]);
        let cur = counters(0, &[("io_read_mbs", 9_999.0)]);
        for elapsed in [0.0, -1.0] {
            let rates = to_rates(Some(&prev), &cur, elapsed);
            assert!((rates.get("io_read_mbs").unwrap().value).abs() < 1e-9);
        }
    }

    #[test]
    fn gauges_pass_through() {
        let mut prev = Snapshot::with_timestamp(0);
        prev.push_gauge("cpu_usage", 80.0);
        let mut cur = Snapshot::with_timestamp(500);
        cur.push_gauge("cpu_usage", 20.0);
        let rates = to_rates(Some(&prev), &cur, 0.5);
        assert!((rates.get("cpu_usage").unwrap().value - 20.0).abs() < 1e-9);
    }

    #[test]
    fn departed_metrics_are_dropped() {
        let prev = counters(0, &[("io_read_mbs", 10.0), ("io_write_mbs", 20.0)]);
        let cur = counters(500, &[("io_read_mbs", 11.0)]);
        let rates = to_rates(Some(&prev), &cur, 0.5);
        assert!(rates.get("io_write_mbs").is_none());
        assert_eq!(rates.len(), 1);
    }

    #[test]
    fn converted_readings_are_gauges() {
        let cur = counters(0, &[("network_rx_mbs", 5.0)]);
        let rates = to_rates(None, &cur, 1.0);
        assert_eq!(rates.get("network_rx_mbs").unwrap().kind, MetricKind::Gauge);
    }
}
