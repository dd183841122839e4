//! User-facing text sink.
//!
//! Everything the shell, plugins and services show the user goes through an
//! [`Output`]. Diagnostics go through `tracing` instead.

use parking_lot::Mutex;

pub trait Output: Send + Sync {
    /// Print `text` followed by a newline. `text` may span several lines.
    fn line(&self, text: &str);

    /// Print without a trailing newline (the prompt).
    fn prompt(&self, text: &str) {
        self.line(text);
    }
}

/// Writes to stdout.
#[derive(Debug, Default)]
pub struct ConsoleOutput;

impl Output for ConsoleOutput {
    fn line(&self, text: &str) {
        println!("{text}");
    }

    fn prompt(&self, text: &str) {
        use std::io::Write;
        print!("{text}");
        let _ = std::io::stdout().flush();
    }
}

/// Captures lines in memory.
#[derive(Debug, Default)]
pub struct BufferOutput {
    lines: Mutex<Vec<String>>,
}

impl BufferOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Captured lines; multi-line writes are split on `\n`.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Everything captured, newline-joined.
    pub fn text(&self) -> String {
        self.lines.lock().join("\n")
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|l| l.contains(needle))
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl Output for BufferOutput {
    fn line(&self, text: &str) {
        self.lines
            .lock()
            .extend(text.split('\n').map(str::to_string));
    }

    /// Prompts are not captured.
    fn prompt(&self, _text: &str) {}
}
