//! `resmon watch`: run the monitor against a console sink until Ctrl+C or a
//! duration limit.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use resmon_core::{MonitorConfig, ReportSink, ResourceMonitor, SinkError};

/// Sink that prints one aligned row per reported series.
struct ConsoleSink;

impl ReportSink for ConsoleSink {
    fn report(&self, group: &str, series: &str, seconds: u64, value: f64) -> Result<(), SinkError> {
        println!("{seconds:>8}s  {group:<18} {series:<24} {value:>12.3}");
        Ok(())
    }
}

/// Run the watch command.
pub fn run(frequency: f64, period: f64, duration: Option<f64>) {
    if frequency <= 0.0 || period <= 0.0 {
        eprintln!("Error: --frequency and --period must be positive");
        std::process::exit(1);
    }

    let config = MonitorConfig {
        samples_per_second: frequency,
        report_period: Duration::from_secs_f64(period),
    };
    let sample_period = config.sample_period();
    let monitor = ResourceMonitor::new(config, Arc::new(ConsoleSink));

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");

    if let Err(e) = monitor.start() {
        eprintln!("Error starting monitor: {e}");
        std::process::exit(1);
    }

    println!("Watching machine resources");
    println!("  Frequency: {frequency} samples/sec");
    println!("  Period:    {period}s");
    match duration {
        Some(d) => println!("  Duration:  {d}s"),
        None => println!("  Duration:  until Ctrl+C"),
    }
    println!();
    println!(
        "{:>8}   {:<18} {:<24} {:>12}",
        "elapsed", "group", "series", "average"
    );

    let started = Instant::now();
    while running.load(Ordering::SeqCst) {
        if let Some(d) = duration {
            if started.elapsed() >= Duration::from_secs_f64(d) {
                break;
            }
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    monitor.stop();
    // Give the sampling thread one wake to notice the cancellation.
    std::thread::sleep(sample_period.min(Duration::from_secs(1)));
    println!();
    println!("Stopped.");
}
