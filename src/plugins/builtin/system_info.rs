//! Disk, network and process readings.

use async_trait::async_trait;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::info;

use crate::commands::{CommandHandler, Invocation, command_fn};
use crate::events::EventBus;
use crate::plugins::traits::{LifecyclePlugin, PluginShell};
use crate::services::metrics::{self, DiskUsage, InterfaceUsage, ProcessUsage};

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * 1024 * 1024;
const TOP_PROCESSES: usize = 10;
const COMMANDS: [&str; 4] = ["disk", "network", "processes", "top"];

/// Function-pair unit providing `disk`, `network`, `processes` and its
/// alias `top`.
pub struct SystemInfoPlugin;

#[async_trait]
impl LifecyclePlugin for SystemInfoPlugin {
    async fn register(&self, _bus: &Arc<EventBus>, shell: &PluginShell) -> anyhow::Result<()> {
        shell.register_command(
            "disk",
            command_fn("Show disk usage per mount", |_| {
                Ok(Some(format_disks(&metrics::disk_usage())))
            }),
        );
        shell.register_command(
            "network",
            command_fn("Show network interfaces and traffic", |_| {
                Ok(Some(format_interfaces(&metrics::network_usage())))
            }),
        );
        let processes: Arc<dyn CommandHandler> = Arc::new(ProcessesCommand);
        shell.register_command("processes", Arc::clone(&processes));
        shell.register_command("top", processes);
        info!(
            plugin = shell.plugin_id(),
            "📦 System info plugin loaded: disk, network, processes, top"
        );
        Ok(())
    }

    async fn unregister(&self, _bus: &Arc<EventBus>, shell: &PluginShell) -> anyhow::Result<()> {
        for name in COMMANDS {
            shell.unregister_command(name);
        }
        info!(plugin = shell.plugin_id(), "📦 System info plugin unloaded");
        Ok(())
    }
}

struct ProcessesCommand;

#[async_trait]
impl CommandHandler for ProcessesCommand {
    fn description(&self) -> &str {
        "Show the busiest processes by CPU"
    }

    async fn call(&self, _invocation: &Invocation) -> anyhow::Result<Option<String>> {
        let top = metrics::top_processes(TOP_PROCESSES).await;
        Ok(Some(format_processes(&top)))
    }
}

fn format_disks(disks: &[DiskUsage]) -> String {
    if disks.is_empty() {
        return "💿 No disks found".to_string();
    }
    let mut out = String::from("💿 Disk Usage:");
    for disk in disks {
        let _ = write!(
            out,
            "\n  {} ({}): {:.1}% used ({}GB / {}GB)",
            disk.device,
            disk.mount_point,
            disk.percent(),
            disk.used / GIB,
            disk.total / GIB
        );
    }
    out
}

fn format_interfaces(interfaces: &[InterfaceUsage]) -> String {
    if interfaces.is_empty() {
        return "🌐 No network interfaces found".to_string();
    }
    let mut out = String::from("🌐 Network Interfaces:");
    for iface in interfaces {
        let _ = write!(
            out,
            "\n  {}:\n    MAC: {}\n    RX: {}MB, TX: {}MB",
            iface.name,
            iface.mac,
            iface.received / MIB,
            iface.transmitted / MIB
        );
    }
    out
}

fn format_processes(processes: &[ProcessUsage]) -> String {
    let mut out = String::from("🔄 Top Processes (by CPU):\nPID     NAME            CPU%    MEM%");
    for p in processes {
        let name: String = p.name.chars().take(15).collect();
        let row = format!(
            "{:<8}{:<16}{:<8.1}{:.1}",
            p.pid, name, p.cpu_percent, p.memory_percent
        );
        let _ = write!(out, "\n{row}");
    }
    out
}
