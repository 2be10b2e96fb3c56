//! Host statistics provider.
//!
//! Best-effort and operational:
//! - works without elevated privileges where possible,
//! - captures only values observable from user space,
//! - leaves unavailable metrics absent rather than guessing.

use std::path::{Path, PathBuf};

use sysinfo::{Components, Disks, Networks, System};

use crate::gpu::GpuQuery;
use crate::metric::Snapshot;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Produces one [`Snapshot`] of named metrics per call.
///
/// The operating system is the implicit input. Implementations may cache OS
/// handles between calls but must not carry aggregation state; that lives
/// in the sampling loop.
pub trait StatsProvider: Send {
    fn sample(&mut self) -> Snapshot;
}

/// [`StatsProvider`] reading host statistics via sysinfo, procfs, and NVML.
///
/// Machine metrics: mean CPU utilization across cores, used/available
/// memory in gigabytes, free-space percentage of the home volume, optional
/// max core temperature, cumulative network and disk-IO megabytes. GPU
/// metrics are appended per device when the NVML capability is up.
pub struct MachineStatsProvider {
    system: System,
    networks: Networks,
    disks: Disks,
    components: Components,
    home: PathBuf,
    gpu: Option<GpuQuery>,
}

impl MachineStatsProvider {
    /// Detect capabilities and build the provider.
    ///
    /// A missing GPU capability is reported through the logging facade
    /// here, once, and never again per tick.
    pub fn new() -> Self {
        let gpu = match GpuQuery::new() {
            Ok(query) => Some(query),
            Err(e) => {
                log::warn!("GPU monitoring is not available ({e}); GPU series will be omitted");
                None
            }
        };
        Self {
            system: System::new(),
            networks: Networks::new_with_refreshed_list(),
            disks: Disks::new_with_refreshed_list(),
            components: Components::new_with_refreshed_list(),
            home: home_dir(),
            gpu,
        }
    }

    /// Whether the GPU query capability initialized.
    pub fn has_gpu(&self) -> bool {
        self.gpu.is_some()
    }
}

impl Default for MachineStatsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsProvider for MachineStatsProvider {
    fn sample(&mut self) -> Snapshot {
        let mut snapshot = Snapshot::now();

        self.system.refresh_cpu();
        self.system.refresh_memory();

        let cpus = self.system.cpus();
        if !cpus.is_empty() {
            let total: f64 = cpus.iter().map(|cpu| f64::from(cpu.cpu_usage())).sum();
            snapshot.push_gauge("cpu_usage", total / cpus.len() as f64);
        }

        snapshot.push_gauge(
            "memory_used_gb",
            self.system.used_memory() as f64 / BYTES_PER_GB,
        );
        snapshot.push_gauge(
            "memory_free_gb",
            self.system.available_memory() as f64 / BYTES_PER_GB,
        );

        self.disks.refresh();
        if let Some(percent) = home_volume_free_percent(&self.disks, &self.home) {
            snapshot.push_gauge("disk_free_percent", percent);
        }

        self.components.refresh();
        if let Some(max) = max_core_temperature(&self.components) {
            snapshot.push_gauge("cpu_temperature", max);
        }

        self.networks.refresh();
        let (rx_bytes, tx_bytes) = network_totals(&self.networks);
        snapshot.push_counter("network_rx_mbs", rx_bytes as f64 / BYTES_PER_MB);
        snapshot.push_counter("network_tx_mbs", tx_bytes as f64 / BYTES_PER_MB);

        if let Some((read_bytes, written_bytes)) = disk_io_totals() {
            snapshot.push_counter("io_read_mbs", read_bytes / BYTES_PER_MB);
            snapshot.push_counter("io_write_mbs", written_bytes / BYTES_PER_MB);
        }

        if let Some(gpu) = &self.gpu {
            gpu.append_readings(&mut snapshot);
        }

        snapshot
    }
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/"))
}

/// Free-space percentage of the volume holding `home`: the mounted disk
/// whose mount point is the longest prefix of the home path.
fn home_volume_free_percent(disks: &Disks, home: &Path) -> Option<f64> {
    let disk = disks
        .list()
        .iter()
        .filter(|disk| home.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())?;
    let total = disk.total_space();
    if total == 0 {
        return None;
    }
    Some(100.0 * disk.available_space() as f64 / total as f64)
}

/// Max temperature over sensors that look like CPU/core sensors.
fn max_core_temperature(components: &Components) -> Option<f64> {
    components
        .list()
        .iter()
        .filter(|component| {
            let label = component.label().to_ascii_lowercase();
            label.contains("core") || label.contains("cpu") || label.contains("tctl")
        })
        .map(|component| f64::from(component.temperature()))
        .filter(|temp| temp.is_finite() && *temp > 0.0)
        .fold(None, |max: Option<f64>, temp| {
            Some(max.map_or(temp, |m| m.max(temp)))
        })
}

/// Cumulative bytes received/transmitted summed over all interfaces.
fn network_totals(networks: &Networks) -> (u64, u64) {
    let mut rx = 0u64;
    let mut tx = 0u64;
    for (_name, data) in networks {
        rx = rx.saturating_add(data.total_received());
        tx = tx.saturating_add(data.total_transmitted());
    }
    (rx, tx)
}

/// Cumulative bytes read/written summed over physical disks, from
/// `/proc/diskstats` sector counts. Absent on platforms without it.
#[cfg(target_os = "linux")]
fn disk_io_totals() -> Option<(f64, f64)> {
    const SECTOR_BYTES: f64 = 512.0;
    let raw = std::fs::read_to_string("/proc/diskstats").ok()?;
    let mut read_bytes = 0.0;
    let mut written_bytes = 0.0;
    let mut seen = false;
    for line in raw.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 14 || !is_physical_disk(fields[2]) {
            continue;
        }
        let (Ok(read_sectors), Ok(written_sectors)) =
            (fields[5].parse::<f64>(), fields[9].parse::<f64>())
        else {
            continue;
        };
        read_bytes += read_sectors * SECTOR_BYTES;
        written_bytes += written_sectors * SECTOR_BYTES;
        seen = true;
    }
    seen.then_some((read_bytes, written_bytes))
}

#[cfg(not(target_os = "linux"))]
fn disk_io_totals() -> Option<(f64, f64)> {
    None
}

/// Whole-device rows only: partitions and pseudo devices would double or
/// pollute the totals.
#[cfg(target_os = "linux")]
fn is_physical_disk(name: &str) -> bool {
    const VIRTUAL_PREFIXES: [&str; 8] = ["loop", "ram", "dm-", "md", "zram", "sr", "fd", "nbd"];
    if VIRTUAL_PREFIXES.iter().any(|prefix| name.starts_with(prefix)) {
        return false;
    }
    // Partitions carry a `p` separator (nvme0n1p1) or a trailing digit (sda1).
    if name.starts_with("nvme") || name.starts_with("mmcblk") {
        return !name.contains('p');
    }
    !name.chars().last().is_some_and(|c| c.is_ascii_digit())
}
