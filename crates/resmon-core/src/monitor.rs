//! Background sampling loop with windowed reporting.
//!
//! One thread owns the window accumulator and the previous-snapshot cache;
//! nothing else touches them, so they carry no locks. The only cross-thread
//! pieces are the cancellation channel and the shared sink handle. A single
//! `recv_timeout` on the cancellation channel doubles as the sampling-period
//! timer and the cancellation check.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::metric::Snapshot;
use crate::provider::{MachineStatsProvider, StatsProvider};
use crate::rate::to_rates;
use crate::sink::{ReportSink, group_for};
use crate::window::WindowAccumulator;

/// Sampling cadence and reporting period.
#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    /// Snapshots taken per second.
    pub samples_per_second: f64,
    /// How often averaged values are flushed to the sink.
    pub report_period: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            samples_per_second: 2.0,
            report_period: Duration::from_secs(30),
        }
    }
}

impl MonitorConfig {
    /// Interval between two snapshots. Non-positive frequencies fall back
    /// to one sample per second.
    pub fn sample_period(&self) -> Duration {
        if self.samples_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / self.samples_per_second)
        } else {
            Duration::from_secs(1)
        }
    }
}

/// Lifecycle errors for [`ResourceMonitor`].
#[derive(Debug, Error)]
pub enum MonitorError {
    /// `start` was called while the sampling thread is running.
    #[error("monitor already started")]
    AlreadyStarted,
    /// `start` was called on a monitor whose lifecycle already ended.
    #[error("monitor already stopped; create a new instance to sample again")]
    Finished,
}

/// Background resource sampler.
///
/// `start` spawns the sampling thread and returns immediately; `stop`
/// requests cancellation and also returns immediately. The thread notices
/// the request at its next wake, so worst-case shutdown latency is one
/// sampling period. Dropping the monitor cancels the loop the same way.
/// Each monitor instance runs at most one lifecycle.
pub struct ResourceMonitor {
    config: MonitorConfig,
    sink: Arc<dyn ReportSink>,
    provider: Mutex<Option<Box<dyn StatsProvider>>>,
    stop_tx: Mutex<Option<Sender<()>>>,
}

impl ResourceMonitor {
    /// Monitor the local machine.
    pub fn new(config: MonitorConfig, sink: Arc<dyn ReportSink>) -> Self {
        Self::with_provider(config, sink, Box::new(MachineStatsProvider::new()))
    }

    /// Monitor through a caller-supplied stats provider.
    pub fn with_provider(
        config: MonitorConfig,
        sink: Arc<dyn ReportSink>,
        provider: Box<dyn StatsProvider>,
    ) -> Self {
        Self {
            config,
            sink,
            provider: Mutex::new(Some(provider)),
            stop_tx: Mutex::new(None),
        }
    }

    /// Spawn the sampling thread. Never blocks on the loop itself.
    pub fn start(&self) -> Result<(), MonitorError> {
        let mut stop_slot = self.stop_tx.lock().unwrap();
        if stop_slot.is_some() {
            return Err(MonitorError::AlreadyStarted);
        }
        let provider = self
            .provider
            .lock()
            .unwrap()
            .take()
            .ok_or(MonitorError::Finished)?;

        let (tx, rx) = mpsc::channel();
        let sampler = SamplerLoop::new(self.config, provider, Arc::clone(&self.sink));
        // Never joined; the loop exits at its next wake after cancellation.
        let _ = thread::spawn(move || sampler.run(&rx));

        *stop_slot = Some(tx);
        Ok(())
    }

    /// Request cancellation without waiting for the thread to exit.
    ///
    /// The loop exits on either the sent message or the sender's drop,
    /// whichever its next wake observes. Stopping a monitor that never
    /// started, or stopping twice, is a no-op.
    pub fn stop(&self) {
        if let Some(tx) = self.stop_tx.lock().unwrap().take() {
            let _ = tx.send(());
        }
    }

    /// Whether the sampling thread has been started and not yet told to stop.
    pub fn is_running(&self) -> bool {
        self.stop_tx.lock().unwrap().is_some()
    }
}

/// Loop-owned sampling state. Lives entirely on the sampling thread.
struct SamplerLoop {
    provider: Box<dyn StatsProvider>,
    sink: Arc<dyn ReportSink>,
    sample_period: Duration,
    report_period: Duration,
    window: WindowAccumulator,
    previous: Option<Snapshot>,
    previous_at: Instant,
    reported_seconds: u64,
}

impl SamplerLoop {
    fn new(config: MonitorConfig, provider: Box<dyn StatsProvider>, sink: Arc<dyn ReportSink>) -> Self {
        Self {
            provider,
            sink,
            sample_period: config.sample_period(),
            report_period: config.report_period,
            window: WindowAccumulator::new(),
            previous: None,
            previous_at: Instant::now(),
            reported_seconds: 0,
        }
    }

    fn run(mut self, stop_rx: &Receiver<()>) {
        loop {
            let window_start = Instant::now();
            while window_start.elapsed() < self.report_period {
                match stop_rx.recv_timeout(self.sample_period) {
                    Err(RecvTimeoutError::Timeout) => self.tick(),
                    // Cancelled: exit without flushing the partial window.
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                }
            }
            self.flush(window_start.elapsed());
        }
    }

    /// Take one snapshot and fold it into the current window.
    fn tick(&mut self) {
        let sampled = panic::catch_unwind(AssertUnwindSafe(|| self.provider.sample()));
        let now = Instant::now();
        let elapsed_secs = now.duration_since(self.previous_at).as_secs_f64();
        // The cache timestamp advances even when the sample is discarded,
        // so the next counter delta divides by the true interval.
        self.previous_at = now;
        match sampled {
            Ok(snapshot) => {
                let rates = to_rates(self.previous.as_ref(), &snapshot, elapsed_secs);
                self.window.add(&rates);
                self.previous = Some(snapshot);
            }
            Err(_) => log::warn!("stats provider panicked; skipping this sample"),
        }
    }

    /// Emit the window's averages and start a fresh window.
    fn flush(&mut self, window_elapsed: Duration) {
        self.reported_seconds += window_elapsed.as_secs_f64().round() as u64;
        for (series, value) in self.window.average() {
            let rounded = round3(value);
            if let Err(e) =
                self.sink
                    .report(group_for(&series), &series, self.reported_seconds, rounded)
            {
                log::warn!("failed to report {series}: {e}");
            }
        }
        self.window.reset();
    }
}

/// Round to three decimal digits before emission.
fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{GPU_GROUP, MACHINE_GROUP, SinkError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MemorySink {
        rows: Mutex<Vec<(String, String, u64, f64)>>,
    }

    impl MemorySink {
        fn rows(&self) -> Vec<(String, String, u64, f64)> {
            self.rows.lock().unwrap().clone()
        }
    }

    impl ReportSink for MemorySink {
        fn report(
            &self,
            group: &str,
            series: &str,
            seconds: u64,
            value: f64,
        ) -> Result<(), SinkError> {
            self.rows
                .lock()
                .unwrap()
                .push((group.to_string(), series.to_string(), seconds, value));
            Ok(())
        }
    }

    /// Sink that rejects one series and records the rest.
    struct RejectingSink {
        reject: &'static str,
        inner: MemorySink,
    }

    impl ReportSink for RejectingSink {
        fn report(
            &self,
            group: &str,
            series: &str,
            seconds: u64,
            value: f64,
        ) -> Result<(), SinkError> {
            if series == self.reject {
                return Err(format!("rejected {series}").into());
            }
            self.inner.report(group, series, seconds, value)
        }
    }

    /// Emits one gauge ramping 1.0, 2.0, ... per tick.
    struct RampProvider {
        ticks: Arc<AtomicUsize>,
    }

    impl StatsProvider for RampProvider {
        fn sample(&mut self) -> Snapshot {
            let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
            let mut snapshot = Snapshot::now();
            snapshot.push_gauge("cpu_usage", (tick + 1) as f64);
            snapshot
        }
    }

    struct PanickingProvider;

    impl StatsProvider for PanickingProvider {
        fn sample(&mut self) -> Snapshot {
            panic!("sensor exploded");
        }
    }

    fn test_loop(provider: Box<dyn StatsProvider>, sink: Arc<dyn ReportSink>) -> SamplerLoop {
        let config = MonitorConfig {
            samples_per_second: 2.0,
            report_period: Duration::from_secs(2),
        };
        SamplerLoop::new(config, provider, sink)
    }

    #[test]
    fn flush_reports_window_mean_and_advances_x_axis() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let sink = Arc::new(MemorySink::default());
        let mut sampler = test_loop(Box::new(RampProvider { ticks }), sink.clone());

        for _ in 0..4 {
            sampler.tick();
        }
        sampler.flush(Duration::from_secs(2));

        let rows = sink.rows();
        assert_eq!(rows.len(), 1);
        let (group, series, seconds, value) = &rows[0];
        assert_eq!(group, MACHINE_GROUP);
        assert_eq!(series, "cpu_usage");
        assert_eq!(*seconds, 2);
        // Mean of 1, 2, 3, 4.
        assert!((value - 2.5).abs() < 0.001);

        // Second window: ticks 5..=8, x-axis accumulates to 4.
        for _ in 0..4 {
            sampler.tick();
        }
        sampler.flush(Duration::from_secs(2));
        let rows = sink.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].2, 4);
        assert!((rows[1].3 - 6.5).abs() < 0.001);
    }

    #[test]
    fn flush_rounds_to_three_decimals() {
        struct ThirdsProvider;
        impl StatsProvider for ThirdsProvider {
            fn sample(&mut self) -> Snapshot {
                let mut s = Snapshot::now();
                s.push_gauge("cpu_usage", 1.0 / 3.0);
                s
            }
        }
        let sink = Arc::new(MemorySink::default());
        let mut sampler = test_loop(Box::new(ThirdsProvider), sink.clone());
        sampler.tick();
        sampler.flush(Duration::from_secs(2));
        assert!((sink.rows()[0].3 - 0.333).abs() < 1e-12);
    }

    #[test]
    fn gpu_series_route_to_gpu_group() {
        struct GpuProvider;
        impl StatsProvider for GpuProvider {
            fn sample(&mut self) -> Snapshot {
                let mut s = Snapshot::now();
                s.push_gauge("gpu_0_utilization", 55.0);
                s.push_gauge("cpu_usage", 10.0);
                s
            }
        }
        let sink = Arc::new(MemorySink::default());
        let mut sampler = test_loop(Box::new(GpuProvider), sink.clone());
        sampler.tick();
        sampler.flush(Duration::from_secs(2));

        let rows = sink.rows();
        assert!(rows.iter().any(|r| r.0 == MACHINE_GROUP && r.1 == "cpu_usage"));
        assert!(rows.iter().any(|r| r.0 == GPU_GROUP && r.1 == "gpu_0_utilization"));
    }

    #[test]
    fn first_tick_counter_averages_to_zero() {
        struct CounterProvider;
        impl StatsProvider for CounterProvider {
            fn sample(&mut self) -> Snapshot {
                let mut s = Snapshot::now();
                s.push_counter("network_rx_mbs", 123_456.789);
                s
            }
        }
        let sink = Arc::new(MemorySink::default());
        let mut sampler = test_loop(Box::new(CounterProvider), sink.clone());
        sampler.tick();
        sampler.flush(Duration::from_secs(2));
        assert!((sink.rows()[0].3).abs() < 1e-12);
    }

    #[test]
    fn rejected_series_does_not_block_siblings() {
        struct TwoSeriesProvider;
        impl StatsProvider for TwoSeriesProvider {
            fn sample(&mut self) -> Snapshot {
                let mut s = Snapshot::now();
                s.push_gauge("cpu_usage", 10.0);
                s.push_gauge("memory_used_gb", 4.0);
                s
            }
        }
        let sink = Arc::new(RejectingSink {
            reject: "cpu_usage",
            inner: MemorySink::default(),
        });
        let mut sampler = test_loop(Box::new(TwoSeriesProvider), sink.clone());
        sampler.tick();
        sampler.flush(Duration::from_secs(2));

        let rows = sink.inner.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1, "memory_used_gb");

        // The loop keeps working after a rejected report.
        sampler.tick();
        sampler.flush(Duration::from_secs(2));
        assert_eq!(sink.inner.rows().len(), 2);
    }

    #[test]
    fn provider_panic_discards_tick_but_loop_continues() {
        let sink = Arc::new(MemorySink::default());
        let mut sampler = test_loop(Box::new(PanickingProvider), sink.clone());
        sampler.tick();
        sampler.tick();
        assert!(sampler.window.is_empty());
        assert!(sampler.previous.is_none());
        sampler.flush(Duration::from_secs(2));
        assert!(sink.rows().is_empty());
    }

    #[test]
    fn start_twice_is_rejected() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let monitor = ResourceMonitor::with_provider(
            MonitorConfig::default(),
            Arc::new(MemorySink::default()),
            Box::new(RampProvider { ticks }),
        );
        monitor.start().unwrap();
        assert!(matches!(monitor.start(), Err(MonitorError::AlreadyStarted)));
        monitor.stop();
    }

    #[test]
    fn restart_after_stop_is_rejected() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let monitor = ResourceMonitor::with_provider(
            MonitorConfig::default(),
            Arc::new(MemorySink::default()),
            Box::new(RampProvider { ticks }),
        );
        monitor.start().unwrap();
        assert!(monitor.is_running());
        monitor.stop();
        assert!(!monitor.is_running());
        assert!(matches!(monitor.start(), Err(MonitorError::Finished)));
    }

    #[test]
    fn stop_without_start_is_a_noop() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let monitor = ResourceMonitor::with_provider(
            MonitorConfig::default(),
            Arc::new(MemorySink::default()),
            Box::new(RampProvider { ticks }),
        );
        monitor.stop();
        monitor.stop();
        assert!(!monitor.is_running());
    }

    #[test]
    fn cancellation_mid_window_emits_no_partial_report() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let sink = Arc::new(MemorySink::default());
        let config = MonitorConfig {
            samples_per_second: 20.0,
            report_period: Duration::from_secs(60),
        };
        let monitor = ResourceMonitor::with_provider(
            config,
            sink.clone(),
            Box::new(RampProvider {
                ticks: ticks.clone(),
            }),
        );
        monitor.start().unwrap();
        thread::sleep(Duration::from_millis(150));
        monitor.stop();
        // One sampling period is the worst-case shutdown latency.
        thread::sleep(Duration::from_millis(150));

        assert!(ticks.load(Ordering::SeqCst) > 0, "loop never sampled");
        assert!(
            sink.rows().is_empty(),
            "partial window must not be flushed on cancellation"
        );
    }

    #[test]
    fn round3_truncates_noise() {
        assert_eq!(round3(1.0005), 1.001);
        assert_eq!(round3(2.71828), 2.718);
        assert_eq!(round3(-0.1234), -0.123);
    }
}
