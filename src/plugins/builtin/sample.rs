use async_trait::async_trait;
use chrono::Local;
use std::sync::Arc;
use tracing::info;

use crate::commands::command_fn;
use crate::events::EventBus;
use crate::plugins::traits::{LifecyclePlugin, PluginShell};

/// Function-pair unit providing `hello` and `time`.
pub struct SamplePlugin;

#[async_trait]
impl LifecyclePlugin for SamplePlugin {
    async fn register(&self, _bus: &Arc<EventBus>, shell: &PluginShell) -> anyhow::Result<()> {
        shell.register_command(
            "hello",
            command_fn("Say hello (default: World)", |inv| {
                Ok(Some(format!("Hello, {}!", inv.arg(0).unwrap_or("World"))))
            }),
        );
        shell.register_command(
            "time",
            command_fn("Show the current local time", |_| {
                Ok(Some(format!(
                    "Current time: {}",
                    Local::now().format("%Y-%m-%d %H:%M:%S")
                )))
            }),
        );
        info!(plugin = shell.plugin_id(), "📦 Sample plugin loaded: hello, time");
        Ok(())
    }

    async fn unregister(&self, _bus: &Arc<EventBus>, shell: &PluginShell) -> anyhow::Result<()> {
        shell.unregister_command("hello");
        shell.unregister_command("time");
        info!(plugin = shell.plugin_id(), "📦 Sample plugin unloaded");
        Ok(())
    }
}
