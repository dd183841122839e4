//! Interactive shell: service wiring, the dispatch loop and built-in commands.
//!
//! The loop is Idle while waiting for a line and Executing while a resolved
//! handler runs. Every line is handled to completion before the next one is
//! read. A failing or panicking handler is reported and the loop goes back
//! to Idle.

pub mod builtins;
pub mod output;

pub use output::{BufferOutput, ConsoleOutput, Output};

use anyhow::{Context, Result};
use console::style;
use futures_util::FutureExt;
use serde_json::json;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::commands::{CommandHandler, CommandRegistry, Invocation, Resolution};
use crate::config::Config;
use crate::diagnostics::ErrorCollector;
use crate::events::{COMMAND_COMPLETED, COMMAND_EXECUTED, EventBus, payload};
use crate::plugins::{LoadReport, PluginLoader, PluginUnit, seed_default_units};
use crate::services::{DockerService, MetricsSampler, VoiceService};
use crate::usage::UsageTracker;

/// What happened to one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Empty,
    Completed {
        name: String,
        output: Option<String>,
    },
    Failed {
        name: String,
        error: String,
    },
    Unknown {
        typed: String,
        suggestion: Option<String>,
    },
    Ambiguous {
        typed: String,
        candidates: Vec<String>,
    },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Empty | Self::Completed { .. })
    }
}

/// Wires the shell's services together. Collaborators not supplied are
/// detected from the environment.
pub struct ShellBuilder {
    config: Config,
    output: Option<Arc<dyn Output>>,
    docker: Option<DockerService>,
    voice: Option<VoiceService>,
    plugins: Vec<PluginUnit>,
}

impl ShellBuilder {
    pub fn output(mut self, output: Arc<dyn Output>) -> Self {
        self.output = Some(output);
        self
    }

    pub fn docker(mut self, docker: DockerService) -> Self {
        self.docker = Some(docker);
        self
    }

    pub fn voice(mut self, voice: VoiceService) -> Self {
        self.voice = Some(voice);
        self
    }

    /// Compiled-in plugin loaded ahead of the plugins directory.
    pub fn plugin(mut self, unit: PluginUnit) -> Self {
        self.plugins.push(unit);
        self
    }

    /// Build the shell with its built-ins registered. Plugins are not loaded
    /// until [`Shell::load_plugins`].
    pub async fn build(self) -> Result<Arc<Shell>> {
        let config = Arc::new(self.config);
        let output: Arc<dyn Output> = self.output.unwrap_or_else(|| Arc::new(ConsoleOutput));

        let bus = Arc::new(EventBus::with_history_capacity(config.events.history_capacity));
        let registry = Arc::new(CommandRegistry::new());
        let logs_dir = config.logs_dir();
        let diagnostics = Arc::new(
            ErrorCollector::with_log_dir(&logs_dir)
                .with_context(|| format!("Failed to open error log in {}", logs_dir.display()))?,
        );

        let usage = Arc::new(UsageTracker::new());
        usage.attach(&bus, Arc::clone(&output));

        let docker = match self.docker {
            Some(docker) => docker,
            None => DockerService::detect(&config.docker).await,
        };
        let voice = self
            .voice
            .unwrap_or_else(|| VoiceService::detect(&config.voice, Arc::clone(&output)));

        let loader = self.plugins.into_iter().fold(
            PluginLoader::new(
                Arc::clone(&registry),
                Arc::clone(&bus),
                Arc::clone(&diagnostics),
                Arc::clone(&output),
                Arc::clone(&config),
            ),
            PluginLoader::with_builtin,
        );

        let interrupted = CancellationToken::new();
        let shell = Arc::new_cyclic(|weak| {
            builtins::register_all(&registry, &diagnostics, weak);
            Shell {
                config,
                output,
                bus,
                registry,
                diagnostics,
                usage,
                loader,
                docker,
                voice,
                metrics: Arc::new(MetricsSampler::new()),
                shutdown: interrupted.child_token(),
                interrupted,
            }
        });
        info!(commands = shell.registry.len(), "shell ready");
        Ok(shell)
    }
}

pub struct Shell {
    config: Arc<Config>,
    output: Arc<dyn Output>,
    bus: Arc<EventBus>,
    registry: Arc<CommandRegistry>,
    diagnostics: Arc<ErrorCollector>,
    usage: Arc<UsageTracker>,
    loader: PluginLoader,
    docker: DockerService,
    voice: VoiceService,
    metrics: Arc<MetricsSampler>,
    shutdown: CancellationToken,
    interrupted: CancellationToken,
}

impl Shell {
    pub fn builder(config: Config) -> ShellBuilder {
        ShellBuilder {
            config,
            output: None,
            docker: None,
            voice: None,
            plugins: Vec::new(),
        }
    }

    /// Detect collaborators, register built-ins and load plugins.
    pub async fn bootstrap(config: Config, output: Arc<dyn Output>) -> Result<Arc<Self>> {
        let shell = Self::builder(config).output(output).build().await?;
        shell.load_plugins().await?;
        Ok(shell)
    }

    /// Seed the default plugins if the directory is missing, then load
    /// everything. Individual failures are printed, not returned.
    pub async fn load_plugins(&self) -> Result<LoadReport> {
        let plugins = &self.config.plugins;
        if plugins.enabled && plugins.seed_defaults {
            let written = seed_default_units(self.loader.plugins_dir())?;
            if !written.is_empty() {
                self.output.line(&format!(
                    "📝 Created {} default plugins in {}",
                    written.len(),
                    self.loader.plugins_dir().display()
                ));
            }
        }

        let report = self.loader.load_all().await;
        for (id, error) in &report.failed {
            self.output
                .line(&format!("❌ Plugin {id} failed to load: {error}"));
        }
        Ok(report)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn output(&self) -> &Arc<dyn Output> {
        &self.output
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    pub fn diagnostics(&self) -> &Arc<ErrorCollector> {
        &self.diagnostics
    }

    pub fn usage(&self) -> &Arc<UsageTracker> {
        &self.usage
    }

    pub fn loader(&self) -> &PluginLoader {
        &self.loader
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// Ask the dispatch loop to stop after the current line.
    pub fn request_exit(&self) {
        self.shutdown.cancel();
    }

    /// Stop the dispatch loop now, abandoning a running handler. Ctrl-C
    /// lands here.
    pub fn interrupt(&self) {
        self.interrupted.cancel();
    }

    /// Startup banner with collaborator availability.
    pub async fn banner(&self) -> String {
        let rule = "═".repeat(62);
        let docker = if self.docker.available() {
            format!("{}", style("✅ Available").green())
        } else {
            format!("{}", style("❌ Unavailable").red())
        };
        let voice = match self.voice.engine() {
            Some(engine) => format!("{}", style(format!("✅ TTS Available ({engine})")).green()),
            None => format!("{}", style("⚠️  Text only").yellow()),
        };
        format!(
            "{rule}\n  {}\n\n  🐳 Docker Management  🎤 Voice Control  🧩 Plugin System\n  \
             🔄 Hot-Reload        📊 Self-Learning   ⚡ Event-Driven\n  \
             Type 'help' for commands | 'speak hello' for voice test\n{rule}\n\
             🐳 Docker: {docker}\n🎤 Voice: {voice}\n🧩 Plugins: {} loaded\n",
            style("dockevOS").bold().cyan(),
            self.loader.loaded().await.len()
        )
    }

    /// Tokenize, resolve and run one line.
    pub async fn execute_line(&self, line: &str) -> Outcome {
        let line = line.trim();
        let mut tokens = line.split_whitespace();
        let Some(typed) = tokens.next() else {
            return Outcome::Empty;
        };
        let args: Vec<String> = tokens.map(str::to_string).collect();

        self.bus
            .emit(
                COMMAND_EXECUTED,
                payload(json!({ "command": line, "args": args })),
            )
            .await;

        let outcome = match self.registry.resolve(typed) {
            Resolution::Found { name, handler } => {
                self.invoke(Invocation::new(typed, name, args.clone()), handler)
                    .await
            }
            Resolution::Ambiguous(candidates) => {
                self.output.line(&format!(
                    "❌ Ambiguous command: {typed}. Did you mean one of: {}",
                    candidates.join(", ")
                ));
                Outcome::Ambiguous {
                    typed: typed.to_string(),
                    candidates,
                }
            }
            Resolution::NotFound => {
                self.output.line(&format!(
                    "❌ Unknown command: {typed}. Type 'help' for available commands."
                ));
                let suggestion = self.diagnostics.suggest_correction(typed);
                if let Some(suggestion) = &suggestion {
                    self.output.line(&format!("💡 Did you mean '{suggestion}'?"));
                }
                Outcome::Unknown {
                    typed: typed.to_string(),
                    suggestion,
                }
            }
        };

        let (name, error) = match &outcome {
            Outcome::Completed { name, .. } => (name.as_str(), None),
            Outcome::Failed { name, error } => (name.as_str(), Some(error.clone())),
            Outcome::Unknown { .. } => (typed, Some("unknown command".to_string())),
            Outcome::Ambiguous { .. } => (typed, Some("ambiguous command".to_string())),
            Outcome::Empty => (typed, None),
        };
        let mut completed = json!({
            "command": line,
            "name": name,
            "args": args,
            "success": outcome.is_success(),
        });
        if let Some(error) = error {
            completed["error"] = json!(error);
        }
        self.bus.emit(COMMAND_COMPLETED, payload(completed)).await;

        outcome
    }

    async fn invoke(&self, invocation: Invocation, handler: Arc<dyn CommandHandler>) -> Outcome {
        debug!(command = %invocation.name, args = ?invocation.args, "executing");
        let result = AssertUnwindSafe(handler.call(&invocation))
            .catch_unwind()
            .await;

        let error = match result {
            Ok(Ok(reply)) => {
                if let Some(text) = reply.as_deref().filter(|t| !t.is_empty()) {
                    self.output.line(text);
                }
                return Outcome::Completed {
                    name: invocation.name,
                    output: reply,
                };
            }
            Ok(Err(e)) => format!("{e:#}"),
            Err(panic) => format!("command panicked: {}", panic_message(panic.as_ref())),
        };

        self.output.line(&format!("❌ Command error: {error}"));
        self.diagnostics.log_error(
            "CommandError",
            error.clone(),
            payload(json!({ "command": invocation.name, "args": invocation.args })),
        );
        Outcome::Failed {
            name: invocation.name,
            error,
        }
    }

    /// Read lines from `input` until `exit`, end of input or Ctrl-C. Plugins
    /// are unloaded before returning so background tasks stop.
    pub async fn run<R>(&self, input: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        self.output.line("🚀 dockevOS ready!");

        let interrupted = self.interrupted.clone();
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupted.cancel();
            }
        });

        let result = self.dispatch(&mut lines).await;

        ctrl_c.abort();
        if self.interrupted.is_cancelled() {
            self.output.line("");
            self.output.line("👋 Goodbye!");
        }
        self.shutdown.cancel();
        self.loader.shutdown().await;
        info!("shell stopped");
        result
    }

    async fn dispatch<R>(&self, lines: &mut Lines<R>) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        loop {
            self.output.prompt(&self.config.shell.prompt);
            let line = tokio::select! {
                () = self.shutdown.cancelled() => return Ok(()),
                line = lines.next_line() => line.context("Failed to read input")?,
            };
            let Some(line) = line else {
                debug!("end of input");
                return Ok(());
            };
            if line.trim().is_empty() {
                continue;
            }

            tokio::select! {
                biased;
                () = self.interrupted.cancelled() => {
                    debug!(line = %line, "interrupted");
                    return Ok(());
                }
                _ = self.execute_line(&line) => {}
            }
            if !self.is_running() {
                return Ok(());
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
