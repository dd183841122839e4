//! `weather`, `note`, `calc` and `uptime`.
//!
//! Notes persist to `notes.json` in the state directory. `calc` evaluates
//! plain arithmetic only: numbers, `+ - * /` and parentheses.

use anyhow::Context;
use async_trait::async_trait;
use chrono::Local;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::commands::{CommandHandler, command_fn};
use crate::plugins::traits::{PluginContext, PluginFactory, PluginInstance};
use crate::services::metrics;

pub const NOTES_FILE: &str = "notes.json";
const NOTES_SHOWN: usize = 5;
const NOTE_USAGE: &str = "Usage: note <add|list|clear> [text]";
const CALC_USAGE: &str = "Usage: calc <expression> (e.g., calc 2 + 2)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub text: String,
    pub timestamp: String,
}

/// Append-only note list backed by a JSON array on disk.
pub struct NoteStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl NoteStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    /// Saved notes, oldest first. An unreadable file counts as empty.
    pub fn all(&self) -> Vec<Note> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "notes unreadable");
                return Vec::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "notes file is corrupt, ignoring");
            Vec::new()
        })
    }

    pub fn add(&self, text: &str) -> anyhow::Result<Note> {
        let _guard = self.lock.lock();
        let note = Note {
            text: text.to_string(),
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        };
        let mut notes = self.all();
        notes.push(note.clone());

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&notes)?)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(note)
    }

    pub fn clear(&self) -> anyhow::Result<()> {
        let _guard = self.lock.lock();
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                Err(e).with_context(|| format!("Failed to remove {}", self.path.display()))
            }
            _ => Ok(()),
        }
    }

    fn run(&self, args: &[String]) -> anyhow::Result<String> {
        match args.first().map(String::as_str) {
            Some("add") if args.len() > 1 => {
                let note = self.add(&args[1..].join(" "))?;
                Ok(format!("📝 Note added: {}", note.text))
            }
            Some("list") => {
                let notes = self.all();
                if notes.is_empty() {
                    return Ok("📝 No notes found".to_string());
                }
                let recent = &notes[notes.len().saturating_sub(NOTES_SHOWN)..];
                let mut out = String::from("📝 Your notes:");
                for (i, note) in recent.iter().enumerate() {
                    let _ = write!(out, "\n  {}. {} ({})", i + 1, note.text, note.timestamp);
                }
                Ok(out)
            }
            Some("clear") => {
                self.clear()?;
                Ok("📝 All notes cleared".to_string())
            }
            _ => Ok(NOTE_USAGE.to_string()),
        }
    }
}

pub struct AdvancedFactory;

#[async_trait]
impl PluginFactory for AdvancedFactory {
    async fn setup(&self, ctx: &PluginContext) -> anyhow::Result<Box<dyn PluginInstance>> {
        let notes = NoteStore::new(&ctx.state_dir().join(NOTES_FILE));
        info!(plugin = %ctx.plugin_id, "📦 Advanced plugin loaded: weather, note, calc, uptime");
        Ok(Box::new(AdvancedPlugin {
            notes: Arc::new(notes),
        }))
    }
}

struct AdvancedPlugin {
    notes: Arc<NoteStore>,
}

#[async_trait]
impl PluginInstance for AdvancedPlugin {
    fn description(&self) -> &str {
        "Notes, calculator, canned weather and uptime"
    }

    fn commands(&self) -> Vec<(String, Arc<dyn CommandHandler>)> {
        let notes = Arc::clone(&self.notes);
        vec![
            (
                "weather".to_string(),
                command_fn("Canned weather report: weather [city]", |inv| {
                    Ok(Some(weather(inv.arg(0).unwrap_or("Unknown"))))
                }),
            ),
            (
                "note".to_string(),
                command_fn("Keep notes: note <add|list|clear> [text]", move |inv| {
                    notes.run(&inv.args).map(Some)
                }),
            ),
            (
                "calc".to_string(),
                command_fn("Evaluate arithmetic: calc <expression>", |inv| {
                    Ok(Some(calc_reply(&inv.joined_args())))
                }),
            ),
            (
                "uptime".to_string(),
                command_fn("Show system uptime and load", |_| {
                    let (one, five, fifteen) = metrics::load_average();
                    Ok(Some(format!(
                        "⏰ Uptime: {} | Load: {one:.2}, {five:.2}, {fifteen:.2}",
                        format_uptime(metrics::uptime_secs())
                    )))
                }),
            ),
        ]
    }
}

// There is no weather backend; the reply is fixed apart from the city.
fn weather(city: &str) -> String {
    format!("🌤️  Weather in {city}: 22°C, Sunny")
}

/// `H:MM:SS`, prefixed with the day count once it is non-zero.
fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let clock = format!(
        "{}:{:02}:{:02}",
        (secs % 86_400) / 3600,
        (secs % 3600) / 60,
        secs % 60
    );
    match days {
        0 => clock,
        1 => format!("1 day, {clock}"),
        n => format!("{n} days, {clock}"),
    }
}

fn calc_reply(expression: &str) -> String {
    let expression = expression.trim();
    if expression.is_empty() {
        return CALC_USAGE.to_string();
    }
    if !expression.chars().all(|c| "0123456789+-*/.() ".contains(c)) {
        return "❌ Invalid characters in expression".to_string();
    }
    match evaluate(expression) {
        Ok(value) => format!("🧮 {expression} = {}", format_number(value)),
        Err(e) => format!("❌ Calculation error: {e}"),
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalcError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("invalid number '{0}'")]
    BadNumber(String),
    #[error("unexpected '{0}'")]
    Unexpected(char),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Op(char),
}

fn tokenize(expression: &str) -> Result<Vec<Token>, CalcError> {
    let mut tokens = Vec::new();
    let mut chars = expression.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut literal = String::new();
            while let Some(&d) = chars.peek() {
                if !(d.is_ascii_digit() || d == '.') {
                    break;
                }
                literal.push(d);
                chars.next();
            }
            let value = literal
                .parse()
                .map_err(|_| CalcError::BadNumber(literal.clone()))?;
            tokens.push(Token::Number(value));
        } else {
            tokens.push(Token::Op(c));
            chars.next();
        }
    }
    Ok(tokens)
}

/// Recursive descent over `expr := term (('+'|'-') term)*`,
/// `term := factor (('*'|'/') factor)*`,
/// `factor := ('+'|'-') factor | number | '(' expr ')'`.
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    fn expr(&mut self) -> Result<f64, CalcError> {
        let mut value = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, CalcError> {
        let mut value = self.factor()?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek() {
            self.pos += 1;
            let rhs = self.factor()?;
            value = if op == '*' {
                value * rhs
            } else if rhs == 0.0 {
                return Err(CalcError::DivisionByZero);
            } else {
                value / rhs
            };
        }
        Ok(value)
    }

    fn factor(&mut self) -> Result<f64, CalcError> {
        match self.next() {
            Some(Token::Number(value)) => Ok(value),
            Some(Token::Op('-')) => Ok(-self.factor()?),
            Some(Token::Op('+')) => self.factor(),
            Some(Token::Op('(')) => {
                let value = self.expr()?;
                match self.next() {
                    Some(Token::Op(')')) => Ok(value),
                    Some(Token::Op(c)) => Err(CalcError::Unexpected(c)),
                    Some(Token::Number(n)) => Err(CalcError::BadNumber(n.to_string())),
                    None => Err(CalcError::UnexpectedEnd),
                }
            }
            Some(Token::Op(c)) => Err(CalcError::Unexpected(c)),
            None => Err(CalcError::UnexpectedEnd),
        }
    }
}

pub fn evaluate(expression: &str) -> Result<f64, CalcError> {
    let mut parser = Parser {
        tokens: tokenize(expression)?,
        pos: 0,
    };
    let value = parser.expr()?;
    match parser.peek() {
        None => Ok(value),
        Some(Token::Op(c)) => Err(CalcError::Unexpected(c)),
        Some(Token::Number(n)) => Err(CalcError::BadNumber(n.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Invocation;
    use crate::config::Config;
    use crate::diagnostics::ErrorCollector;
    use crate::events::EventBus;
    use crate::shell::output::BufferOutput;

    fn context(state: &Path) -> PluginContext {
        let mut config = Config::default();
        config.plugins.state_dir = state.display().to_string();
        PluginContext {
            plugin_id: "advanced".into(),
            bus: Arc::new(EventBus::new()),
            diagnostics: Arc::new(ErrorCollector::in_memory()),
            output: Arc::new(BufferOutput::new()),
            config: Arc::new(config),
        }
    }

    async fn run(instance: &dyn PluginInstance, line: &str) -> String {
        let mut words = line.split_whitespace();
        let name = words.next().unwrap();
        let (_, handler) = instance
            .commands()
            .into_iter()
            .find(|(n, _)| n == name)
            .unwrap();
        let args = words.map(str::to_string).collect();
        handler
            .call(&Invocation::new(name, name, args))
            .await
            .unwrap()
            .unwrap()
    }

    #[test]
    fn arithmetic_follows_precedence() {
        assert_eq!(evaluate("2 + 2").unwrap(), 4.0);
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(evaluate("7 / 2").unwrap(), 3.5);
        assert_eq!(evaluate("-3 - -2").unwrap(), -1.0);
        assert_eq!(evaluate("10 - 4 - 3").unwrap(), 3.0);
    }

    #[test]
    fn malformed_expressions_are_errors() {
        assert_eq!(evaluate("1 / 0"), Err(CalcError::DivisionByZero));
        assert_eq!(evaluate("(1 + 2"), Err(CalcError::UnexpectedEnd));
        assert_eq!(evaluate("1 +"), Err(CalcError::UnexpectedEnd));
        assert_eq!(evaluate("2 * * 3"), Err(CalcError::Unexpected('*')));
        assert_eq!(evaluate("1.2.3"), Err(CalcError::BadNumber("1.2.3".into())));
        assert_eq!(evaluate("1 )"), Err(CalcError::Unexpected(')')));
    }

    #[test]
    fn calc_replies() {
        assert_eq!(calc_reply("2 + 2"), "🧮 2 + 2 = 4");
        assert_eq!(calc_reply("7/2"), "🧮 7/2 = 3.5");
        assert_eq!(calc_reply(""), CALC_USAGE);
        assert_eq!(calc_reply("__import__('os')"), "❌ Invalid characters in expression");
        assert_eq!(calc_reply("1/0"), "❌ Calculation error: division by zero");
    }

    #[test]
    fn uptime_reads_like_a_clock() {
        assert_eq!(format_uptime(59), "0:00:59");
        assert_eq!(format_uptime(3 * 3600 + 5 * 60 + 9), "3:05:09");
        assert_eq!(format_uptime(86_400 + 61), "1 day, 0:01:01");
        assert_eq!(format_uptime(3 * 86_400), "3 days, 0:00:00");
    }

    #[tokio::test]
    async fn notes_persist_in_the_state_dir() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let instance = AdvancedFactory.setup(&ctx).await.unwrap();

        assert_eq!(run(instance.as_ref(), "note list").await, "📝 No notes found");
        assert_eq!(run(instance.as_ref(), "note").await, NOTE_USAGE);
        assert_eq!(run(instance.as_ref(), "note add").await, NOTE_USAGE);
        for i in 1..=6 {
            let added = run(instance.as_ref(), &format!("note add buy  milk {i}")).await;
            assert_eq!(added, format!("📝 Note added: buy milk {i}"));
        }

        let reopened = AdvancedFactory.setup(&ctx).await.unwrap();
        let listed = run(reopened.as_ref(), "note list").await;
        let lines: Vec<_> = listed.lines().collect();
        assert_eq!(lines[0], "📝 Your notes:");
        assert_eq!(lines.len(), 6);
        assert!(lines[1].starts_with("  1. buy milk 2 ("));
        assert!(lines[5].starts_with("  5. buy milk 6 ("));

        let saved: Vec<Note> =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join(NOTES_FILE)).unwrap())
                .unwrap();
        assert_eq!(saved.len(), 6);

        assert_eq!(run(reopened.as_ref(), "note clear").await, "📝 All notes cleared");
        assert!(!dir.path().join(NOTES_FILE).exists());
        assert_eq!(run(reopened.as_ref(), "note clear").await, "📝 All notes cleared");
        assert_eq!(run(reopened.as_ref(), "note list").await, "📝 No notes found");
    }

    #[test]
    fn corrupt_notes_read_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(NOTES_FILE);
        std::fs::write(&path, "{oops").unwrap();
        let store = NoteStore::new(&path);
        assert!(store.all().is_empty());
        store.add("fresh start").unwrap();
        assert_eq!(store.all().len(), 1);
    }

    #[tokio::test]
    async fn weather_and_uptime_answer() {
        let dir = tempfile::tempdir().unwrap();
        let instance = AdvancedFactory.setup(&context(dir.path())).await.unwrap();

        assert_eq!(
            run(instance.as_ref(), "weather Oslo").await,
            "🌤️  Weather in Oslo: 22°C, Sunny"
        );
        assert!(run(instance.as_ref(), "weather").await.contains("Weather in Unknown"));
        assert!(run(instance.as_ref(), "uptime").await.starts_with("⏰ Uptime: "));
    }
}
