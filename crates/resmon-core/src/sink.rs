//! Reporting sink seam.
//!
//! The monitor pushes `(group, series, seconds, value)` rows to whatever
//! implements [`ReportSink`]. Series are routed into one of two groups by
//! metric-name prefix.

use std::error::Error;

/// Series group for host-level metrics.
pub const MACHINE_GROUP: &str = ":monitor:machine";
/// Series group for GPU metrics.
pub const GPU_GROUP: &str = ":monitor:gpu";
/// Metric-name prefix that routes a series into [`GPU_GROUP`].
pub const GPU_SERIES_PREFIX: &str = "gpu_";

/// Error a reporting sink may return for a single value.
pub type SinkError = Box<dyn Error + Send + Sync>;

/// Destination for averaged metric values.
///
/// `seconds` is the cumulative whole-second x-axis value of the report
/// window being flushed. A failed `report` affects only that one value;
/// the monitor logs it and keeps emitting the window's remaining series.
pub trait ReportSink: Send + Sync {
    fn report(
        &self,
        group: &str,
        series: &str,
        seconds: u64,
        value: f64,
    ) -> Result<(), SinkError>;
}

/// Route a series name to its group by prefix.
pub fn group_for(series: &str) -> &'static str {
    if series.starts_with(GPU_SERIES_PREFIX) {
        GPU_GROUP
    } else {
        MACHINE_GROUP
    }
}

/// Sink that routes every value to the `log` facade at info level.
pub struct LogSink;

impl ReportSink for LogSink {
    fn report(
        &self,
        group: &str,
        series: &str,
        seconds: u64,
        value: f64,
    ) -> Result<(), SinkError> {
        log::info!("{group} {series}={value} at {seconds}s");
        Ok(())
    }
}
