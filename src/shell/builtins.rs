//! Commands compiled into the shell.

use async_trait::async_trait;
use serde_json::json;
use std::fmt::Write as _;
use std::sync::{Arc, Weak};
use std::time::Duration;

use super::Shell;
use crate::commands::{CommandHandler, CommandRegistry, Invocation};
use crate::diagnostics::{ErrorCollector, MISSING_DEPENDENCY};
use crate::services::docker::DOCKER_UNAVAILABLE;

const DEFAULT_LOG_TAIL: usize = 50;
const DEFAULT_LISTEN_SECS: usize = 30;
const DEFAULT_RECENT: usize = 10;
const WAKE_WORDS: &[&str] = &["hey ", "ok ", "computer ", "container ", "os "];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Builtin {
    Help,
    Exit,
    Containers,
    Start,
    Stop,
    Restart,
    Logs,
    Info,
    Speak,
    Listen,
    Plugins,
    Load,
    Unload,
    Reload,
    Stats,
    Errors,
    Events,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    System,
    Docker,
    Voice,
    Plugins,
}

impl Section {
    const ALL: [Section; 4] = [Self::System, Self::Docker, Self::Voice, Self::Plugins];

    fn title(self) -> &'static str {
        match self {
            Self::System => "📋 System Commands:",
            Self::Docker => "🐳 Docker Commands:",
            Self::Voice => "🎤 Voice Commands:",
            Self::Plugins => "🧩 Plugin Management:",
        }
    }
}

struct Spec {
    names: &'static [&'static str],
    usage: &'static str,
    summary: &'static str,
    section: Section,
    builtin: Builtin,
}

const BUILTINS: &[Spec] = &[
    Spec {
        names: &["help"],
        usage: "help",
        summary: "Show this help",
        section: Section::System,
        builtin: Builtin::Help,
    },
    Spec {
        names: &["info"],
        usage: "info",
        summary: "Show system information",
        section: Section::System,
        builtin: Builtin::Info,
    },
    Spec {
        names: &["stats"],
        usage: "stats",
        summary: "Show usage statistics",
        section: Section::System,
        builtin: Builtin::Stats,
    },
    Spec {
        names: &["errors"],
        usage: "errors [n]",
        summary: "Show recent errors",
        section: Section::System,
        builtin: Builtin::Errors,
    },
    Spec {
        names: &["events"],
        usage: "events [n]",
        summary: "Show recent events",
        section: Section::System,
        builtin: Builtin::Events,
    },
    Spec {
        names: &["exit", "quit"],
        usage: "exit, quit",
        summary: "Leave the shell",
        section: Section::System,
        builtin: Builtin::Exit,
    },
    Spec {
        names: &["ps", "containers"],
        usage: "ps, containers",
        summary: "List containers (-a for stopped ones too)",
        section: Section::Docker,
        builtin: Builtin::Containers,
    },
    Spec {
        names: &["start"],
        usage: "start <name>",
        summary: "Start a container",
        section: Section::Docker,
        builtin: Builtin::Start,
    },
    Spec {
        names: &["stop"],
        usage: "stop <name>",
        summary: "Stop a container",
        section: Section::Docker,
        builtin: Builtin::Stop,
    },
    Spec {
        names: &["restart"],
        usage: "restart <name>",
        summary: "Restart a container",
        section: Section::Docker,
        builtin: Builtin::Restart,
    },
    Spec {
        names: &["logs"],
        usage: "logs <name> [n]",
        summary: "Show the last lines of a container's logs",
        section: Section::Docker,
        builtin: Builtin::Logs,
    },
    Spec {
        names: &["speak", "voice"],
        usage: "speak <text>",
        summary: "Text-to-speech (voice is an alias)",
        section: Section::Voice,
        builtin: Builtin::Speak,
    },
    Spec {
        names: &["listen"],
        usage: "listen [secs]",
        summary: "Speech-to-text; wake words run the rest as a command",
        section: Section::Voice,
        builtin: Builtin::Listen,
    },
    Spec {
        names: &["plugins"],
        usage: "plugins",
        summary: "List loaded plugins",
        section: Section::Plugins,
        builtin: Builtin::Plugins,
    },
    Spec {
        names: &["load"],
        usage: "load <id>",
        summary: "Load or reload one plugin",
        section: Section::Plugins,
        builtin: Builtin::Load,
    },
    Spec {
        names: &["unload"],
        usage: "unload <id>",
        summary: "Unload one plugin",
        section: Section::Plugins,
        builtin: Builtin::Unload,
    },
    Spec {
        names: &["reload"],
        usage: "reload",
        summary: "Reload all plugins",
        section: Section::Plugins,
        builtin: Builtin::Reload,
    },
];

fn is_builtin_name(name: &str) -> bool {
    BUILTINS
        .iter()
        .any(|spec| spec.names.iter().any(|n| *n == name))
}

struct BuiltinCommand {
    shell: Weak<Shell>,
    builtin: Builtin,
    summary: &'static str,
}

#[async_trait]
impl CommandHandler for BuiltinCommand {
    fn description(&self) -> &str {
        self.summary
    }

    async fn call(&self, invocation: &Invocation) -> anyhow::Result<Option<String>> {
        let shell = self
            .shell
            .upgrade()
            .ok_or_else(|| anyhow::anyhow!("shell is shutting down"))?;
        shell.run_builtin(self.builtin, invocation).await
    }
}

/// Register every built-in on `registry` and teach their names to the
/// spell checker.
pub(super) fn register_all(
    registry: &CommandRegistry,
    diagnostics: &ErrorCollector,
    shell: &Weak<Shell>,
) {
    for spec in BUILTINS {
        for name in spec.names {
            registry.register(
                *name,
                Arc::new(BuiltinCommand {
                    shell: Weak::clone(shell),
                    builtin: spec.builtin,
                    summary: spec.summary,
                }),
            );
        }
        diagnostics.register_commands(spec.names.iter().copied());
    }
}

fn usage(text: &str) -> anyhow::Result<Option<String>> {
    Ok(Some(format!("Usage: {text}")))
}

impl Shell {
    async fn run_builtin(
        &self,
        builtin: Builtin,
        inv: &Invocation,
    ) -> anyhow::Result<Option<String>> {
        match builtin {
            Builtin::Help => Ok(Some(self.help())),
            Builtin::Exit => {
                self.announce("Goodbye!").await;
                self.request_exit();
                Ok(Some("👋 Goodbye!".to_string()))
            }
            Builtin::Containers => {
                let all = inv.args.iter().any(|a| a == "-a" || a == "--all");
                let listing = self.docker.list_containers(all).await;
                self.check_docker(&listing);
                Ok(Some(format!("🐳 Docker Containers:\n{listing}")))
            }
            Builtin::Start | Builtin::Stop | Builtin::Restart => {
                let verb = inv.name.as_str();
                let Some(name) = inv.arg(0) else {
                    return usage(&format!("{verb} <container_name>"));
                };
                let (result, done) = match builtin {
                    Builtin::Start => (self.docker.start_container(name).await, "started"),
                    Builtin::Stop => (self.docker.stop_container(name).await, "stopped"),
                    _ => (self.docker.restart_container(name).await, "restarted"),
                };
                self.check_docker(&result);
                if !result.starts_with('❌') {
                    self.announce(&format!("Container {name} {done}")).await;
                }
                Ok(Some(result))
            }
            Builtin::Logs => {
                let Some(name) = inv.arg(0) else {
                    return usage("logs <container_name> [lines]");
                };
                let tail = inv.count(1, DEFAULT_LOG_TAIL)?;
                let result = self.docker.logs(name, tail).await;
                self.check_docker(&result);
                Ok(Some(result))
            }
            Builtin::Info => {
                let metrics = Arc::clone(&self.metrics);
                let snapshot = tokio::task::spawn_blocking(move || metrics.snapshot()).await?;
                Ok(Some(snapshot.to_string()))
            }
            Builtin::Speak => {
                if inv.args.is_empty() {
                    return usage(&format!("{} <text>", inv.name));
                }
                let text = inv.joined_args();
                // A failed engine prints its own error line.
                if self.voice.speak(&text).await {
                    Ok(Some(format!("🔊 Spoke: {text}")))
                } else {
                    Ok(None)
                }
            }
            Builtin::Listen => self.listen(inv).await,
            Builtin::Plugins => Ok(Some(self.plugins_listing().await)),
            Builtin::Load => {
                let Some(id) = inv.arg(0) else {
                    return usage("load <plugin>");
                };
                self.loader.load(id).await?;
                Ok(Some(format!("✅ Loaded plugin: {id}")))
            }
            Builtin::Unload => {
                let Some(id) = inv.arg(0) else {
                    return usage("unload <plugin>");
                };
                if self.loader.unload(id).await {
                    Ok(Some(format!("🗑️  Unloaded plugin: {id}")))
                } else {
                    Ok(Some(format!("⚠️  Plugin not loaded: {id}")))
                }
            }
            Builtin::Reload => {
                let report = self.loader.reload_all().await;
                let mut out = format!("🔄 Reloaded {} plugins", report.loaded.len());
                for (id, error) in &report.failed {
                    let _ = write!(out, "\n❌ Plugin {id} failed to load: {error}");
                }
                Ok(Some(out))
            }
            Builtin::Stats => Ok(Some(self.usage.get_stats().to_string())),
            Builtin::Errors => {
                let records = self.diagnostics.recent(inv.count(0, DEFAULT_RECENT)?);
                if records.is_empty() {
                    return Ok(Some("✅ No errors recorded".to_string()));
                }
                let mut out = String::from("🧾 Recent errors:");
                for record in records {
                    let _ = write!(
                        out,
                        "\n  [{}] {}: {}",
                        record.timestamp.with_timezone(&chrono::Local).format("%H:%M:%S"),
                        record.kind,
                        record.message
                    );
                }
                Ok(Some(out))
            }
            Builtin::Events => {
                let events = self.bus.recent(inv.count(0, DEFAULT_RECENT)?);
                if events.is_empty() {
                    return Ok(Some("📡 No events yet".to_string()));
                }
                let mut out = String::from("📡 Recent events:");
                for event in events {
                    let _ = write!(
                        out,
                        "\n  {} {} {}",
                        event.timestamp().with_timezone(&chrono::Local).format("%H:%M:%S"),
                        event.kind(),
                        serde_json::Value::Object(event.data().clone())
                    );
                }
                Ok(Some(out))
            }
        }
    }

    fn help(&self) -> String {
        let mut out = String::from("🆘 dockevOS - Available Commands:");
        for section in Section::ALL {
            let _ = write!(out, "\n\n{}", section.title());
            for spec in BUILTINS.iter().filter(|s| s.section == section) {
                let _ = write!(out, "\n  {:<16} {}", spec.usage, spec.summary);
            }
        }

        out.push_str("\n\n📦 Plugin Commands:");
        let table = self.registry.snapshot();
        let mut any = false;
        for (name, handler) in table.iter().filter(|(name, _)| !is_builtin_name(name)) {
            any = true;
            let _ = write!(out, "\n  {name:<16} {}", handler.description());
        }
        if !any {
            out.push_str("\n  (No plugin commands loaded)");
        }
        let _ = write!(
            out,
            "\n\n🧩 Plugins live in {}; edit a manifest and run 'reload'.",
            self.loader.plugins_dir().display()
        );
        out
    }

    async fn plugins_listing(&self) -> String {
        let plugins = self.loader.loaded().await;
        let dir = self.loader.plugins_dir().display();
        if plugins.is_empty() {
            return format!("📦 No plugins loaded\n📁 Plugin directory: {dir}");
        }

        let mut out = String::from("📦 Loaded Plugins:");
        for plugin in &plugins {
            let version = plugin.version.as_deref().unwrap_or("-");
            let _ = write!(out, "\n  • {} v{version} ({})", plugin.id, plugin.kind);
            if !plugin.description.is_empty() {
                let _ = write!(out, " - {}", plugin.description);
            }
            if !plugin.commands.is_empty() {
                let _ = write!(out, "\n      commands: {}", plugin.commands.join(", "));
            }
        }
        let _ = write!(out, "\n\n📁 Plugin directory: {dir}");
        out
    }

    async fn listen(&self, inv: &Invocation) -> anyhow::Result<Option<String>> {
        if !self.voice.stt_available() {
            return Ok(Some(
                "❌ Speech recognition is not configured. Set [voice] listen_command in dockevos.toml"
                    .to_string(),
            ));
        }

        let secs = inv.count(0, DEFAULT_LISTEN_SECS)?;
        let heard = self.voice.listen(Duration::from_secs(secs as u64)).await;
        if heard.is_empty() {
            return Ok(Some("❌ No speech detected or recognized.".to_string()));
        }
        self.output.line(&format!("🎤 Recognized: {heard}"));

        let lowered = heard.to_lowercase();
        if WAKE_WORDS.iter().any(|w| lowered.starts_with(w)) {
            if let Some((_, command)) = heard.split_once(' ') {
                let command = command.trim();
                if !command.is_empty() {
                    self.output.line(&format!("🤖 Executing command: {command}"));
                    // Boxed: this call re-enters the dispatcher.
                    Box::pin(self.execute_line(command)).await;
                }
            }
        }
        Ok(None)
    }

    async fn announce(&self, text: &str) {
        if self.config.voice.announce && self.voice.tts_available() {
            self.voice.speak(text).await;
        }
    }

    /// Report a missing docker daemon to the diagnostics handlers.
    fn check_docker(&self, result: &str) {
        if result == DOCKER_UNAVAILABLE {
            self.diagnostics
                .notify(MISSING_DEPENDENCY, &json!({ "dependency": "docker" }));
        }
    }
}
