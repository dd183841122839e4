//! Passive usage tracking driven by `command.executed` events.

use crate::events::{COMMAND_EXECUTED, EventBus};
use crate::shell::output::Output;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Invocation count at which a one-time alias suggestion is produced.
pub const ALIAS_THRESHOLD: u64 = 5;

const TOP_COMMANDS: usize = 5;

#[derive(Default)]
struct Counters {
    counts: HashMap<String, u64>,
    /// Command names in first-seen order.
    order: Vec<String>,
    suggestions: Vec<String>,
}

pub struct UsageTracker {
    counters: Mutex<Counters>,
    started: Instant,
}

/// Snapshot returned by [`UsageTracker::get_stats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageStats {
    pub session: Duration,
    pub commands_used: usize,
    pub total_commands: u64,
    /// Up to five `(command, count)` pairs, highest count first, ties in
    /// first-seen order.
    pub most_used: Vec<(String, u64)>,
}

impl UsageStats {
    pub fn session_display(&self) -> String {
        format!("{:.1} minutes", self.session.as_secs_f64() / 60.0)
    }
}

impl fmt::Display for UsageStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "📊 Usage Statistics:")?;
        writeln!(f, "Session time: {}", self.session_display())?;
        writeln!(f, "Commands used: {}", self.commands_used)?;
        writeln!(f, "Total commands: {}", self.total_commands)?;
        write!(f, "\nMost used commands:")?;
        for (name, count) in &self.most_used {
            write!(f, "\n  {name}: {count} times")?;
        }
        Ok(())
    }
}

impl UsageTracker {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(Counters::default()),
            started: Instant::now(),
        }
    }

    /// Subscribe to `command.executed` on `bus`, printing suggestions to `output`.
    pub fn attach(self: &Arc<Self>, bus: &EventBus, output: Arc<dyn Output>) {
        let tracker = Arc::clone(self);
        bus.subscribe_fn(COMMAND_EXECUTED, move |event| {
            let line = event.str_field("command").unwrap_or_default();
            let suggestion = line
                .split_whitespace()
                .next()
                .and_then(|first| tracker.track(first));
            if let Some(suggestion) = suggestion {
                output.line(&suggestion);
            }
            Ok(())
        });
    }

    /// Count one invocation of `command`. Returns the alias suggestion exactly
    /// when the count reaches [`ALIAS_THRESHOLD`].
    pub fn track(&self, command: &str) -> Option<String> {
        let mut counters = self.counters.lock();
        let count = match counters.counts.get_mut(command) {
            Some(count) => {
                *count += 1;
                *count
            }
            None => {
                counters.counts.insert(command.to_string(), 1);
                counters.order.push(command.to_string());
                1
            }
        };

        if count != ALIAS_THRESHOLD {
            return None;
        }
        let suggestion =
            format!("💡 Command '{command}' used {count} times. Consider creating an alias.");
        counters.suggestions.push(suggestion.clone());
        Some(suggestion)
    }

    pub fn count(&self, command: &str) -> u64 {
        self.counters.lock().counts.get(command).copied().unwrap_or(0)
    }

    /// Every alias suggestion produced so far, in order.
    pub fn suggestions(&self) -> Vec<String> {
        self.counters.lock().suggestions.clone()
    }

    pub fn get_stats(&self) -> UsageStats {
        let counters = self.counters.lock();
        let mut ranked: Vec<(String, u64)> = counters
            .order
            .iter()
            .map(|name| (name.clone(), counters.counts.get(name).copied().unwrap_or(0)))
            .collect();
        // Stable sort keeps first-seen order among equal counts.
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(TOP_COMMANDS);

        UsageStats {
            session: self.started.elapsed(),
            commands_used: counters.order.len(),
            total_commands: counters.counts.values().sum(),
            most_used: ranked,
        }
    }
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new()
    }
}
