use anyhow::{Result, bail};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::DockerConfig;

/// Text returned by every method when the daemon cannot be reached.
pub const DOCKER_UNAVAILABLE: &str = "❌ Docker not available";

#[derive(Debug)]
pub struct DockerOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

/// Container operations through the `docker` CLI.
pub struct DockerService {
    binary: String,
    available: bool,
    timeout: Duration,
}

/// The health probe never waits longer than this, whatever the configured
/// command timeout.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

impl DockerService {
    /// Probe the daemon with `docker info`; unavailable when the binary is
    /// missing or the probe fails.
    pub async fn detect(config: &DockerConfig) -> Self {
        let mut service = Self {
            binary: config.binary.clone(),
            available: false,
            timeout: Duration::from_secs(config.timeout_secs),
        };
        if which::which(&service.binary).is_err() {
            debug!(binary = %service.binary, "docker binary not found on PATH");
            return service;
        }
        let probe = ["info", "--format", "{{.ServerVersion}}"];
        let limit = service.timeout.min(PROBE_TIMEOUT);
        service.available = match service.exec_within(&probe, limit).await {
            Ok(out) => out.success,
            Err(e) => {
                warn!(error = %e, "docker health check failed");
                false
            }
        };
        service
    }

    /// A service that reports itself unavailable without probing anything.
    pub fn unavailable() -> Self {
        Self {
            binary: "docker".into(),
            available: false,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn available(&self) -> bool {
        self.available
    }

    async fn exec(&self, args: &[&str]) -> Result<DockerOutput> {
        self.exec_within(args, self.timeout).await
    }

    async fn exec_within(&self, args: &[&str], limit: Duration) -> Result<DockerOutput> {
        let child = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output();
        let Ok(output) = tokio::time::timeout(limit, child).await else {
            let verb = args.first().copied().unwrap_or_default();
            warn!(verb, ?limit, "docker command timed out");
            bail!("docker {verb} timed out after {limit:?}");
        };
        let output = output?;
        Ok(DockerOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
        })
    }

    /// Run `args`, mapping success through `on_success` and every failure to
    /// a `❌ Error:` line.
    async fn run<F>(&self, args: &[&str], on_success: F) -> String
    where
        F: FnOnce(DockerOutput) -> String,
    {
        if !self.available {
            return DOCKER_UNAVAILABLE.to_string();
        }
        match self.exec(args).await {
            Ok(out) if out.success => on_success(out),
            Ok(out) => format!("❌ Error: {}", first_line(&out.stderr)),
            Err(e) => format!("❌ Error: {e}"),
        }
    }

    pub async fn list_containers(&self, include_stopped: bool) -> String {
        let mut args = vec!["ps", "--format", "{{.ID}}\t{{.Image}}\t{{.Status}}\t{{.Names}}"];
        if include_stopped {
            args.push("-a");
        }
        self.run(&args, |out| format_container_table(&out.stdout)).await
    }

    pub async fn start_container(&self, name: &str) -> String {
        self.run(&["start", name], |_| format!("✅ Started: {name}")).await
    }

    pub async fn stop_container(&self, name: &str) -> String {
        self.run(&["stop", name], |_| format!("🛑 Stopped: {name}")).await
    }

    pub async fn restart_container(&self, name: &str) -> String {
        self.run(&["restart", name], |_| format!("🔄 Restarted: {name}"))
            .await
    }

    pub async fn logs(&self, name: &str, tail: usize) -> String {
        let tail = tail.to_string();
        self.run(&["logs", "--tail", &tail, name], |out| {
            // docker writes container stderr to our stderr
            let text = format!("{}{}", out.stdout, out.stderr);
            let text = text.trim_end();
            if text.is_empty() {
                format!("📄 No log output for {name}")
            } else {
                format!("📄 Logs for {name}:\n{text}")
            }
        })
        .await
    }
}

fn first_line(text: &str) -> &str {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("unknown docker error")
}

/// Render tab-separated `docker ps --format` rows as an aligned table.
fn format_container_table(raw: &str) -> String {
    let rows: Vec<Vec<&str>> = raw
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.split('\t').collect())
        .collect();
    if rows.is_empty() {
        return "No containers found".into();
    }

    let mut table = format!("{:<14}{:<24}{:<26}{}", "CONTAINER ID", "IMAGE", "STATUS", "NAMES");
    for row in rows {
        let cell = |i: usize| row.get(i).copied().unwrap_or("");
        table.push('\n');
        table.push_str(&format!("{:<14}{:<24}{:<26}{}", cell(0), cell(1), cell(2), cell(3)));
    }
    table
}
