//! Command history and system log viewer.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::commands::{CommandHandler, Invocation};
use crate::events::{COMMAND_COMPLETED, EventHandler, handler_fn};
use crate::plugins::traits::{PluginContext, PluginFactory, PluginInstance};

/// File under the logs directory the tracing file layer writes to.
pub const SYSTEM_LOG_FILE: &str = "system.log";
const HISTORY_CAPACITY: usize = 1000;
const DEFAULT_HISTORY: usize = 10;
const DEFAULT_TAIL: usize = 20;

#[derive(Debug, Clone)]
struct HistoryEntry {
    at: DateTime<Local>,
    line: String,
    success: bool,
    error: Option<String>,
}

type History = Arc<Mutex<VecDeque<HistoryEntry>>>;

pub struct SystemLogFactory;

#[async_trait]
impl PluginFactory for SystemLogFactory {
    async fn setup(&self, ctx: &PluginContext) -> anyhow::Result<Box<dyn PluginInstance>> {
        Ok(Box::new(SystemLog {
            history: Arc::new(Mutex::new(VecDeque::with_capacity(64))),
            log_file: ctx.logs_dir().join(SYSTEM_LOG_FILE),
            active: Arc::new(AtomicBool::new(true)),
        }))
    }
}

struct SystemLog {
    history: History,
    log_file: PathBuf,
    active: Arc<AtomicBool>,
}

#[async_trait]
impl PluginInstance for SystemLog {
    fn description(&self) -> &str {
        "Command history and system log viewer"
    }

    fn commands(&self) -> Vec<(String, Arc<dyn CommandHandler>)> {
        vec![
            (
                "history".to_string(),
                Arc::new(HistoryCommand {
                    history: Arc::clone(&self.history),
                }),
            ),
            (
                "syslog".to_string(),
                Arc::new(SyslogCommand {
                    log_file: self.log_file.clone(),
                }),
            ),
        ]
    }

    fn event_handlers(&self) -> Vec<(String, Arc<dyn EventHandler>)> {
        let history = Arc::clone(&self.history);
        let active = Arc::clone(&self.active);
        vec![(
            COMMAND_COMPLETED.to_string(),
            handler_fn(move |event| {
                if !active.load(Ordering::Acquire) {
                    return Ok(());
                }
                let entry = HistoryEntry {
                    at: event.timestamp().with_timezone(&Local),
                    line: event.str_field("command").unwrap_or_default().to_string(),
                    success: event
                        .data()
                        .get("success")
                        .and_then(serde_json::Value::as_bool)
                        .unwrap_or(false),
                    error: event.str_field("error").map(str::to_string),
                };
                let mut history = history.lock();
                if history.len() == HISTORY_CAPACITY {
                    history.pop_front();
                }
                history.push_back(entry);
                Ok(())
            }),
        )]
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        self.active.store(false, Ordering::Release);
        Ok(())
    }
}

struct HistoryCommand {
    history: History,
}

#[async_trait]
impl CommandHandler for HistoryCommand {
    fn description(&self) -> &str {
        "Show recent commands (default 10)"
    }

    async fn call(&self, invocation: &Invocation) -> anyhow::Result<Option<String>> {
        let count = invocation.count(0, DEFAULT_HISTORY)?;
        let history = self.history.lock();
        if history.is_empty() {
            return Ok(Some("📜 No commands recorded yet".to_string()));
        }

        let skip = history.len().saturating_sub(count);
        let shown = history.len() - skip;
        let mut out = format!("📜 Command history (last {shown}):");
        for (i, entry) in history.iter().skip(skip).enumerate() {
            let mark = if entry.success { "✅" } else { "❌" };
            let _ = write!(
                out,
                "\n  {:>3}. {} {} {}",
                skip + i + 1,
                entry.at.format("%H:%M:%S"),
                mark,
                entry.line
            );
            if let Some(error) = &entry.error {
                let _ = write!(out, "\n       Error: {error}");
            }
        }
        Ok(Some(out))
    }
}

struct SyslogCommand {
    log_file: PathBuf,
}

#[async_trait]
impl CommandHandler for SyslogCommand {
    fn description(&self) -> &str {
        "Show the tail of the system log (default 20 lines)"
    }

    async fn call(&self, invocation: &Invocation) -> anyhow::Result<Option<String>> {
        let count = invocation.count(0, DEFAULT_TAIL)?;
        let raw = match tokio::fs::read_to_string(&self.log_file).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Some(format!(
                    "📄 No system log at {} yet",
                    self.log_file.display()
                )));
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "failed to read {}: {e}",
                    self.log_file.display()
                ));
            }
        };

        let lines: Vec<&str> = raw.lines().collect();
        let tail = &lines[lines.len().saturating_sub(count)..];
        if tail.is_empty() {
            return Ok(Some(format!("📄 {} is empty", self.log_file.display())));
        }
        Ok(Some(format!(
            "📜 Last {} log entries from {}:\n{}",
            tail.len(),
            self.log_file.display(),
            tail.join("\n")
        )))
    }
}
