//! Error collector and command spell correction.
//!
//! Keeps its own handler registry keyed by pseudo-event name
//! (`error_occurred`, `missing_dependency`, `hardware_error`, ...). It is
//! independent of [`crate::events::EventBus`] and usable without one.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error};

/// Dispatched for every [`ErrorCollector::log_error`] call.
pub const ERROR_OCCURRED: &str = "error_occurred";
pub const MISSING_DEPENDENCY: &str = "missing_dependency";
pub const HARDWARE_ERROR: &str = "hardware_error";

/// Minimum similarity ratio for a spelling suggestion.
pub const CORRECTION_CUTOFF: f32 = 0.6;

const RECENT_CAPACITY: usize = 200;
const ERROR_LOG_FILE: &str = "dockevos_errors.log";

/// One logged error, as kept in memory and appended to the JSON-lines sink.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub message: String,
    pub context: Map<String, Value>,
}

pub type DiagnosticHandler = Arc<dyn Fn(&Value) -> Result<()> + Send + Sync>;

pub struct ErrorCollector {
    sink: Option<Mutex<File>>,
    sink_path: Option<PathBuf>,
    recent: Mutex<VecDeque<ErrorRecord>>,
    known_commands: RwLock<BTreeSet<String>>,
    handlers: RwLock<HashMap<String, Vec<DiagnosticHandler>>>,
}

impl ErrorCollector {
    /// Collector that also appends every record to `<log_dir>/dockevos_errors.log`.
    pub fn with_log_dir(log_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
        let path = log_dir.join(ERROR_LOG_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open error log {}", path.display()))?;
        Ok(Self {
            sink: Some(Mutex::new(file)),
            sink_path: Some(path),
            ..Self::in_memory()
        })
    }

    /// Collector without a persistent sink.
    pub fn in_memory() -> Self {
        Self {
            sink: None,
            sink_path: None,
            recent: Mutex::new(VecDeque::new()),
            known_commands: RwLock::new(BTreeSet::new()),
            handlers: RwLock::new(HashMap::new()),
        }
    }

    pub fn sink_path(&self) -> Option<&Path> {
        self.sink_path.as_deref()
    }

    // ── Error log ───────────────────────────────────────────────

    /// Record an error, append it to the sink and notify `error_occurred` handlers.
    pub fn log_error(
        &self,
        kind: &str,
        message: impl Into<String>,
        context: Map<String, Value>,
    ) -> ErrorRecord {
        let record = ErrorRecord {
            timestamp: Utc::now(),
            kind: kind.to_string(),
            message: message.into(),
            context,
        };

        let context = Value::Object(record.context.clone());
        error!(
            kind = %record.kind,
            context = %context,
            "{}",
            record.message
        );

        if let Some(sink) = &self.sink {
            match serde_json::to_string(&record) {
                Ok(line) => {
                    let mut file = sink.lock();
                    if let Err(e) = writeln!(file, "{line}") {
                        debug!(error = %e, "failed to append to error log");
                    }
                }
                Err(e) => debug!(error = %e, "failed to serialize error record"),
            }
        }

        {
            let mut recent = self.recent.lock();
            if recent.len() == RECENT_CAPACITY {
                recent.pop_front();
            }
            recent.push_back(record.clone());
        }

        let data = serde_json::to_value(&record).unwrap_or(Value::Null);
        self.notify(ERROR_OCCURRED, &data);
        record
    }

    /// The last `n` records, oldest first.
    pub fn recent(&self, n: usize) -> Vec<ErrorRecord> {
        let recent = self.recent.lock();
        let skip = recent.len().saturating_sub(n);
        recent.iter().skip(skip).cloned().collect()
    }

    pub fn error_count(&self) -> usize {
        self.recent.lock().len()
    }

    // ── Handler registry ────────────────────────────────────────

    pub fn register_handler(&self, event_type: &str, handler: DiagnosticHandler) {
        self.handlers
            .write()
            .entry(event_type.to_string())
            .or_default()
            .push(handler);
        debug!(event = event_type, "registered diagnostic handler");
    }

    pub fn handler_count(&self, event_type: &str) -> usize {
        self.handlers.read().get(event_type).map_or(0, Vec::len)
    }

    /// Run every handler for `event_type`. Returns how many completed without
    /// error; failures and panics are logged and skipped.
    pub fn notify(&self, event_type: &str, data: &Value) -> usize {
        let handlers = self
            .handlers
            .read()
            .get(event_type)
            .cloned()
            .unwrap_or_default();

        let mut succeeded = 0;
        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(data))) {
                Ok(Ok(())) => succeeded += 1,
                Ok(Err(e)) => error!(event = event_type, error = %e, "diagnostic handler failed"),
                Err(_) => error!(event = event_type, "diagnostic handler panicked"),
            }
        }
        succeeded
    }

    // ── Spell correction ────────────────────────────────────────

    pub fn register_commands<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut known = self.known_commands.write();
        known.extend(names.into_iter().map(Into::into));
    }

    pub fn known_commands(&self) -> Vec<String> {
        self.known_commands.read().iter().cloned().collect()
    }

    /// Closest known command to `word`, compared case-insensitively, when its
    /// similarity ratio clears [`CORRECTION_CUTOFF`].
    pub fn suggest_correction(&self, word: &str) -> Option<String> {
        let known = self.known_commands.read();
        if known.is_empty() || word.is_empty() {
            return None;
        }

        let lowered: Vec<(String, &String)> =
            known.iter().map(|name| (name.to_lowercase(), name)).collect();
        let candidates: Vec<&str> = lowered.iter().map(|(lower, _)| lower.as_str()).collect();
        let typed = word.to_lowercase();

        let best = similar::get_close_matches(typed.as_str(), &candidates, 1, CORRECTION_CUTOFF)
            .into_iter()
            .next()?;
        lowered
            .iter()
            .find(|(lower, _)| lower.as_str() == best)
            .map(|(_, original)| (*original).clone())
    }
}

impl Default for ErrorCollector {
    fn default() -> Self {
        Self::in_memory()
    }
}
