//! NVIDIA GPU statistics via NVML.
//!
//! NVML is a runtime capability: the shared library or the driver may be
//! absent. Construction failing reports that once (through the caller);
//! per-device query errors on a tick leave those readings out of the
//! snapshot for that tick only.

use nvml_wrapper::Nvml;
use nvml_wrapper::enum_wrappers::device::TemperatureSensor;
use nvml_wrapper::error::NvmlError;

use crate::metric::Snapshot;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Handle to the NVML query capability.
pub struct GpuQuery {
    nvml: Nvml,
}

impl GpuQuery {
    /// Initialize NVML. Fails when the library or driver is absent.
    pub fn new() -> Result<Self, NvmlError> {
        Ok(Self { nvml: Nvml::init()? })
    }

    /// Number of GPUs NVML currently reports, if any.
    pub fn device_count(&self) -> u32 {
        self.nvml.device_count().unwrap_or(0)
    }

    /// Append per-device readings to `snapshot`, keyed by GPU ordinal as
    /// `gpu_{i}_*`. Devices failing a query this tick are skipped.
    pub fn append_readings(&self, snapshot: &mut Snapshot) {
        for idx in 0..self.device_count() {
            let Ok(device) = self.nvml.device_by_index(idx) else {
                continue;
            };
            if let Ok(temp) = device.temperature(TemperatureSensor::Gpu) {
                snapshot.push_gauge(format!("gpu_{idx}_temperature"), f64::from(temp));
            }
            if let Ok(util) = device.utilization_rates() {
                snapshot.push_gauge(format!("gpu_{idx}_utilization"), f64::from(util.gpu));
            }
            if let Ok(mem) = device.memory_info() {
                if mem.total > 0 {
                    snapshot.push_gauge(
                        format!("gpu_{idx}_mem_usage"),
                        100.0 * mem.used as f64 / mem.total as f64,
                    );
                }
                snapshot.push_gauge(format!("gpu_{idx}_mem_free_gb"), mem.free as f64 / BYTES_PER_GB);
                snapshot.push_gauge(format!("gpu_{idx}_mem_used_gb"), mem.used as f64 / BYTES_PER_GB);
            }
        }
    }
}
