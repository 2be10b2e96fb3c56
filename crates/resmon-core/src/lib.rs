//! # resmon-core
//!
//! Background host (and optionally GPU) resource monitor for embedding in a
//! client process: a sampling thread periodically snapshots named metrics,
//! converts cumulative counters into per-second rates, accumulates windowed
//! averages, and flushes them to a reporting sink on a fixed cadence.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use resmon_core::{LogSink, MonitorConfig, ResourceMonitor};
//!
//! let monitor = ResourceMonitor::new(MonitorConfig::default(), Arc::new(LogSink));
//! monitor.start().expect("first start always succeeds");
//!
//! // ... application work ...
//!
//! // Fire-and-forget: the sampling thread exits at its next wake.
//! monitor.stop();
//! ```
//!
//! ## Architecture
//!
//! Stats Provider -> Rate Converter -> Window Accumulator -> (per report window) -> Reporting Sink
//!
//! The sampling thread is the sole owner of all aggregation state; the only
//! cross-thread pieces are the cancellation channel and the sink handle.
//! Failures degrade, never crash: a missing GPU capability is logged once
//! and its series omitted, a panicking provider costs one tick, a rejected
//! report costs one value.

pub mod gpu;
pub mod metric;
pub mod monitor;
pub mod provider;
pub mod rate;
pub mod sink;
pub mod window;

pub use gpu::GpuQuery;
pub use metric::{MetricKind, Reading, Snapshot};
pub use monitor::{MonitorConfig, MonitorError, ResourceMonitor};
pub use provider::{MachineStatsProvider, StatsProvider};
pub use rate::to_rates;
pub use sink::{
    GPU_GROUP, GPU_SERIES_PREFIX, LogSink, MACHINE_GROUP, ReportSink, SinkError, group_for,
};
pub use window::WindowAccumulator;

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
