//! Commands declared inline in a manifest.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::process::Command;

use super::manifest::{CommandAction, CommandSpec};
use super::traits::{LifecyclePlugin, PluginShell};
use crate::commands::{CommandHandler, Invocation};
use crate::events::EventBus;

/// Expand `{args}`, `{N}`, `{args|default}` and `{N|default}` in `template`.
/// Anything else in braces is copied through unchanged.
pub fn render_template(template: &str, args: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };

        let inner = &after[..close];
        match expand_placeholder(inner, args) {
            Some(value) => out.push_str(&value),
            None => {
                out.push('{');
                out.push_str(inner);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

fn expand_placeholder(inner: &str, args: &[String]) -> Option<String> {
    let (key, default) = match inner.split_once('|') {
        Some((key, default)) => (key.trim(), Some(default)),
        None => (inner.trim(), None),
    };

    let value = if key == "args" {
        Some(args.join(" ")).filter(|joined| !joined.is_empty())
    } else {
        let index: usize = key.parse().ok()?;
        args.get(index).cloned()
    };
    Some(value.unwrap_or_else(|| default.unwrap_or_default().to_string()))
}

struct ReplyCommand {
    description: String,
    template: String,
}

#[async_trait]
impl CommandHandler for ReplyCommand {
    fn description(&self) -> &str {
        &self.description
    }

    async fn call(&self, invocation: &Invocation) -> anyhow::Result<Option<String>> {
        Ok(Some(render_template(&self.template, &invocation.args)))
    }
}

struct ExecCommand {
    description: String,
    argv: Vec<String>,
}

#[async_trait]
impl CommandHandler for ExecCommand {
    fn description(&self) -> &str {
        &self.description
    }

    async fn call(&self, invocation: &Invocation) -> anyhow::Result<Option<String>> {
        let Some((program, fixed)) = self.argv.split_first() else {
            anyhow::bail!("empty exec command");
        };
        let output = Command::new(program)
            .args(fixed)
            .args(&invocation.args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| anyhow::anyhow!("failed to run `{program}`: {e}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
            anyhow::bail!("`{program}` exited with {}: {}", output.status, reason.trim());
        }
        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        Ok((!stdout.is_empty()).then_some(stdout))
    }
}

fn handler_for(spec: &CommandSpec) -> Option<Arc<dyn CommandHandler>> {
    let description = spec.description.clone().unwrap_or_default();
    match spec.action()? {
        CommandAction::Reply(template) => Some(Arc::new(ReplyCommand {
            description,
            template,
        })),
        CommandAction::Exec(argv) => Some(Arc::new(ExecCommand { description, argv })),
    }
}

/// Function-pair unit built from `[[commands]]` declarations.
pub struct DeclarativePlugin {
    commands: Vec<CommandSpec>,
}

impl DeclarativePlugin {
    pub fn new(commands: Vec<CommandSpec>) -> Self {
        Self { commands }
    }

    pub fn command_names(&self) -> Vec<&str> {
        self.commands.iter().map(|c| c.name.as_str()).collect()
    }
}

#[async_trait]
impl LifecyclePlugin for DeclarativePlugin {
    async fn register(&self, _bus: &Arc<EventBus>, shell: &PluginShell) -> anyhow::Result<()> {
        for spec in &self.commands {
            let handler = handler_for(spec).ok_or_else(|| {
                anyhow::anyhow!("command '{}' has no reply or exec action", spec.name)
            })?;
            shell.register_command(&spec.name, handler);
        }
        Ok(())
    }

    async fn unregister(&self, _bus: &Arc<EventBus>, shell: &PluginShell) -> anyhow::Result<()> {
        for spec in &self.commands {
            shell.unregister_command(&spec.name);
        }
        Ok(())
    }
}
