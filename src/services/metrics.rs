use parking_lot::Mutex;
use std::fmt;
use std::path::Path;
use sysinfo::{
    CpuRefreshKind, Disks, MINIMUM_CPU_UPDATE_INTERVAL, MemoryRefreshKind, Networks, RefreshKind,
    System,
};

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * 1024 * 1024;

/// One reading of host utilization. Sizes are bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemSnapshot {
    pub cpu_percent: f32,
    pub memory_used: u64,
    pub memory_total: u64,
    pub disk_used: u64,
    pub disk_total: u64,
    pub uptime_secs: u64,
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        used as f64 / total as f64 * 100.0
    }
}

impl SystemSnapshot {
    pub fn memory_percent(&self) -> f64 {
        percent(self.memory_used, self.memory_total)
    }

    pub fn disk_percent(&self) -> f64 {
        percent(self.disk_used, self.disk_total)
    }

    pub fn uptime_display(&self) -> String {
        let hours = self.uptime_secs / 3600;
        let minutes = (self.uptime_secs % 3600) / 60;
        format!("{hours}h {minutes}m")
    }
}

impl fmt::Display for SystemSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "🖥️  System Information:")?;
        writeln!(f, "CPU Usage: {:.1}%", self.cpu_percent)?;
        writeln!(
            f,
            "Memory: {:.1}% ({}MB / {}MB)",
            self.memory_percent(),
            self.memory_used / MIB,
            self.memory_total / MIB
        )?;
        writeln!(
            f,
            "Disk: {:.1}% ({}GB / {}GB)",
            self.disk_percent(),
            self.disk_used / GIB,
            self.disk_total / GIB
        )?;
        write!(f, "Uptime: {}", self.uptime_display())
    }
}

/// `sysinfo`-backed sampler. CPU usage is a delta between refreshes, so the
/// first reading after construction may be zero.
pub struct MetricsSampler {
    system: Mutex<System>,
}

impl MetricsSampler {
    pub fn new() -> Self {
        let system = System::new_with_specifics(
            RefreshKind::new()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );
        Self {
            system: Mutex::new(system),
        }
    }

    pub fn snapshot(&self) -> SystemSnapshot {
        let (cpu_percent, memory_used, memory_total) = {
            let mut sys = self.system.lock();
            sys.refresh_cpu();
            sys.refresh_memory();
            (sys.global_cpu_info().cpu_usage(), sys.used_memory(), sys.total_memory())
        };

        let disks = Disks::new_with_refreshed_list();
        let root = disks
            .list()
            .iter()
            .find(|d| d.mount_point() == Path::new("/"))
            .or_else(|| disks.list().first());
        let (disk_used, disk_total) = root.map_or((0, 0), |d| {
            (d.total_space().saturating_sub(d.available_space()), d.total_space())
        });

        SystemSnapshot {
            cpu_percent,
            memory_used,
            memory_total,
            disk_used,
            disk_total,
            uptime_secs: System::uptime(),
        }
    }
}

impl Default for MetricsSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiskUsage {
    pub device: String,
    pub mount_point: String,
    pub used: u64,
    pub total: u64,
}

impl DiskUsage {
    pub fn percent(&self) -> f64 {
        percent(self.used, self.total)
    }
}

/// Cumulative traffic for one interface since boot.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceUsage {
    pub name: String,
    pub mac: String,
    pub received: u64,
    pub transmitted: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessUsage {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f32,
    pub memory_percent: f64,
}

pub fn disk_usage() -> Vec<DiskUsage> {
    Disks::new_with_refreshed_list()
        .list()
        .iter()
        .map(|d| DiskUsage {
            device: d.name().to_string_lossy().into_owned(),
            mount_point: d.mount_point().display().to_string(),
            used: d.total_space().saturating_sub(d.available_space()),
            total: d.total_space(),
        })
        .collect()
}

/// Interfaces sorted by name, loopback excluded.
pub fn network_usage() -> Vec<InterfaceUsage> {
    let networks = Networks::new_with_refreshed_list();
    let mut interfaces: Vec<InterfaceUsage> = networks
        .list()
        .iter()
        .filter(|(name, _)| !name.starts_with("lo"))
        .map(|(name, data)| InterfaceUsage {
            name: name.clone(),
            mac: data.mac_address().to_string(),
            received: data.total_received(),
            transmitted: data.total_transmitted(),
        })
        .collect();
    interfaces.sort_by(|a, b| a.name.cmp(&b.name));
    interfaces
}

/// The `limit` busiest processes by CPU. Usage is measured over one
/// minimum refresh interval, so this waits that long.
pub async fn top_processes(limit: usize) -> Vec<ProcessUsage> {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.refresh_processes();
    tokio::time::sleep(MINIMUM_CPU_UPDATE_INTERVAL).await;
    sys.refresh_processes();

    let total_memory = sys.total_memory();
    let mut processes: Vec<ProcessUsage> = sys
        .processes()
        .values()
        .map(|p| ProcessUsage {
            pid: p.pid().as_u32(),
            name: p.name().to_string(),
            cpu_percent: p.cpu_usage(),
            memory_percent: percent(p.memory(), total_memory),
        })
        .collect();
    processes.sort_by(|a, b| b.cpu_percent.total_cmp(&a.cpu_percent).then(a.pid.cmp(&b.pid)));
    processes.truncate(limit);
    processes
}

/// 1, 5 and 15 minute load averages. Zero where the platform has none.
pub fn load_average() -> (f64, f64, f64) {
    let load = System::load_average();
    (load.one, load.five, load.fifteen)
}

pub fn uptime_secs() -> u64 {
    System::uptime()
}
