//! Plugin contracts.
//!
//! A unit comes in one of two shapes:
//!
//! - **function pair** ([`LifecyclePlugin`]): `register` and `unregister` are
//!   handed the event bus and a [`PluginShell`] and add or remove commands
//!   themselves;
//! - **factory** ([`PluginFactory`]): `setup` builds a [`PluginInstance`] whose
//!   `commands` the loader registers directly.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::commands::{CommandHandler, CommandTable};
use crate::config::Config;
use crate::diagnostics::ErrorCollector;
use crate::events::{EventBus, EventHandler};
use crate::shell::output::Output;

// ── Function-pair protocol ──────────────────────────────────────

#[async_trait]
pub trait LifecyclePlugin: Send + Sync {
    async fn register(&self, bus: &Arc<EventBus>, shell: &PluginShell) -> anyhow::Result<()>;

    /// Remove what `register` added. Any command still attributed to the
    /// plugin afterwards is removed by the loader, so units without explicit
    /// teardown may keep this default.
    async fn unregister(&self, _bus: &Arc<EventBus>, _shell: &PluginShell) -> anyhow::Result<()> {
        Ok(())
    }
}

/// The host capability handed to function-pair plugins: command
/// registration and nothing else.
pub struct PluginShell {
    plugin_id: String,
    table: Arc<Mutex<CommandTable>>,
    attributed: Mutex<BTreeSet<String>>,
    diagnostics: Arc<ErrorCollector>,
}

impl PluginShell {
    pub(crate) fn new(
        plugin_id: &str,
        table: Arc<Mutex<CommandTable>>,
        diagnostics: Arc<ErrorCollector>,
        attributed: BTreeSet<String>,
    ) -> Self {
        Self {
            plugin_id: plugin_id.to_string(),
            table,
            attributed: Mutex::new(attributed),
            diagnostics,
        }
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Insert or replace `name`, attributing it to this plugin.
    pub fn register_command(&self, name: &str, handler: Arc<dyn CommandHandler>) {
        self.table.lock().insert(name, handler);
        self.attributed.lock().insert(name.to_string());
        self.diagnostics.register_commands([name]);
        debug!(plugin = %self.plugin_id, command = name, "registered command");
    }

    /// Remove `name` whoever registered it. Unknown names are ignored.
    pub fn unregister_command(&self, name: &str) {
        if self.table.lock().remove(name).is_some() {
            debug!(plugin = %self.plugin_id, command = name, "unregistered command");
        }
        self.attributed.lock().remove(name);
    }

    pub(crate) fn into_attributed(self) -> BTreeSet<String> {
        self.attributed.into_inner()
    }
}

// ── Factory protocol ────────────────────────────────────────────

/// Shared services handed to factory plugins at setup.
#[derive(Clone)]
pub struct PluginContext {
    pub plugin_id: String,
    pub bus: Arc<EventBus>,
    pub diagnostics: Arc<ErrorCollector>,
    pub output: Arc<dyn Output>,
    pub config: Arc<Config>,
}

impl PluginContext {
    /// Directory for the plugin's JSON state files.
    pub fn state_dir(&self) -> PathBuf {
        self.config.state_dir()
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.config.logs_dir()
    }
}

#[async_trait]
pub trait PluginFactory: Send + Sync {
    async fn setup(&self, ctx: &PluginContext) -> anyhow::Result<Box<dyn PluginInstance>>;
}

#[async_trait]
pub trait PluginInstance: Send + Sync {
    fn version(&self) -> &str {
        "1.0.0"
    }

    fn description(&self) -> &str {
        ""
    }

    /// Commands registered by the loader on load and removed on unload.
    fn commands(&self) -> Vec<(String, Arc<dyn CommandHandler>)>;

    /// Subscriptions made on the main bus at load. They outlive the instance.
    fn event_handlers(&self) -> Vec<(String, Arc<dyn EventHandler>)> {
        Vec::new()
    }

    /// Release background resources. Completes before unload returns.
    async fn shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

// ── Units ───────────────────────────────────────────────────────

#[derive(Clone)]
pub enum PluginKind {
    Paired(Arc<dyn LifecyclePlugin>),
    Factory(Arc<dyn PluginFactory>),
}

impl PluginKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Paired(_) => "function-pair",
            Self::Factory(_) => "factory",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitSource {
    /// Compiled-in unit handed to the loader directly.
    Builtin,
    /// Unit described by a manifest on disk.
    Manifest(PathBuf),
}

impl fmt::Display for UnitSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin => f.write_str("(builtin)"),
            Self::Manifest(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A loadable plugin with a stable identifier.
#[derive(Clone)]
pub struct PluginUnit {
    pub id: String,
    pub description: String,
    pub version: Option<String>,
    pub source: UnitSource,
    pub kind: PluginKind,
}

impl PluginUnit {
    pub fn paired(id: impl Into<String>, plugin: Arc<dyn LifecyclePlugin>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            version: None,
            source: UnitSource::Builtin,
            kind: PluginKind::Paired(plugin),
        }
    }

    pub fn factory(id: impl Into<String>, factory: Arc<dyn PluginFactory>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            version: None,
            source: UnitSource::Builtin,
            kind: PluginKind::Factory(factory),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_source(mut self, source: UnitSource) -> Self {
        self.source = source;
        self
    }
}

impl fmt::Debug for PluginUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginUnit")
            .field("id", &self.id)
            .field("kind", &self.kind.label())
            .field("source", &self.source)
            .finish()
    }
}
