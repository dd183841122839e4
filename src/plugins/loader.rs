//! Plugin loader: turns units into registered commands and back.
//!
//! Every mutation runs as a transaction against a staged copy of the command
//! table. The copy is published to the [`CommandRegistry`] in one swap, so a
//! command dispatched during `reload_all` sees either the old table or the
//! new one. Lifecycle events are emitted after the swap, once the loader lock
//! has been released.

use chrono::Local;
use futures_util::FutureExt;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::catalog::Catalog;
use super::declarative::DeclarativePlugin;
use super::discovery::{discover_units, locate_unit};
use super::error::PluginError;
use super::manifest::load_manifest;
use super::registry::{LoadReport, PluginHandle, PluginInfo, PluginRecord};
use super::traits::{PluginContext, PluginKind, PluginShell, PluginUnit, UnitSource};
use crate::commands::{CommandRegistry, CommandTable};
use crate::config::Config;
use crate::diagnostics::ErrorCollector;
use crate::events::{EventBus, PLUGIN_FAILED, PLUGIN_LOADED, PLUGIN_UNLOADED, payload};
use crate::shell::output::Output;

#[derive(Default)]
struct LoaderState {
    records: BTreeMap<String, PluginRecord>,
}

/// Staged command table plus the events to emit once it is published.
struct Transaction {
    table: Arc<Mutex<CommandTable>>,
    events: Vec<(&'static str, Map<String, Value>)>,
}

impl Transaction {
    fn begin(registry: &CommandRegistry) -> Self {
        Self {
            table: Arc::new(Mutex::new((*registry.snapshot()).clone())),
            events: Vec::new(),
        }
    }

    fn checkpoint(&self) -> CommandTable {
        self.table.lock().clone()
    }

    fn restore(&self, checkpoint: CommandTable) {
        *self.table.lock() = checkpoint;
    }

    fn push(&mut self, kind: &'static str, data: Value) {
        self.events.push((kind, payload(data)));
    }

    fn commit(self, registry: &CommandRegistry) -> Vec<(&'static str, Map<String, Value>)> {
        let table = std::mem::take(&mut *self.table.lock());
        registry.publish(table);
        self.events
    }
}

/// What a successful activation hands back to the record.
struct Activation {
    handle: PluginHandle,
    commands: BTreeSet<String>,
    version: Option<String>,
}

pub struct PluginLoader {
    state: tokio::sync::Mutex<LoaderState>,
    registry: Arc<CommandRegistry>,
    bus: Arc<EventBus>,
    diagnostics: Arc<ErrorCollector>,
    output: Arc<dyn Output>,
    config: Arc<Config>,
    plugins_dir: PathBuf,
    catalog: Catalog,
    builtin_units: Vec<PluginUnit>,
}

impl PluginLoader {
    pub fn new(
        registry: Arc<CommandRegistry>,
        bus: Arc<EventBus>,
        diagnostics: Arc<ErrorCollector>,
        output: Arc<dyn Output>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            state: tokio::sync::Mutex::new(LoaderState::default()),
            plugins_dir: config.plugins_dir(),
            registry,
            bus,
            diagnostics,
            output,
            config,
            catalog: Catalog::standard(),
            builtin_units: Vec::new(),
        }
    }

    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Compiled-in unit loaded by `load_all` ahead of anything on disk.
    pub fn with_builtin(mut self, unit: PluginUnit) -> Self {
        self.builtin_units.push(unit);
        self
    }

    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    // ── Public operations ───────────────────────────────────────

    /// Load (or reload) the unit called `id`.
    pub async fn load(&self, id: &str) -> Result<(), PluginError> {
        let (result, events) = {
            let mut state = self.state.lock().await;
            let mut txn = Transaction::begin(&self.registry);
            let unit = self.resolve_unit(id);
            let result = self.load_locked(&mut state, id, unit, &mut txn).await;
            (result, txn.commit(&self.registry))
        };
        self.announce(events).await;
        result
    }

    /// Load a unit that was not discovered on disk.
    pub async fn load_unit(&self, unit: PluginUnit) -> Result<(), PluginError> {
        let (result, events) = {
            let mut state = self.state.lock().await;
            let mut txn = Transaction::begin(&self.registry);
            let id = unit.id.clone();
            let result = self.load_locked(&mut state, &id, Ok(unit), &mut txn).await;
            (result, txn.commit(&self.registry))
        };
        self.announce(events).await;
        result
    }

    /// Unload `id`. Returns `false` when it was not loaded.
    pub async fn unload(&self, id: &str) -> bool {
        let (unloaded, events) = {
            let mut state = self.state.lock().await;
            let mut txn = Transaction::begin(&self.registry);
            let unloaded = self.unload_locked(&mut state, id, &mut txn).await;
            (unloaded, txn.commit(&self.registry))
        };
        self.announce(events).await;
        unloaded
    }

    /// Load every builtin and discovered unit, tolerating individual failures.
    pub async fn load_all(&self) -> LoadReport {
        let (report, events) = {
            let mut state = self.state.lock().await;
            let mut txn = Transaction::begin(&self.registry);
            let report = self.load_all_locked(&mut state, &mut txn).await;
            (report, txn.commit(&self.registry))
        };
        self.announce(events).await;
        report
    }

    /// Unload everything, then load everything, publishing the result once.
    pub async fn reload_all(&self) -> LoadReport {
        let (report, events) = {
            let mut state = self.state.lock().await;
            let mut txn = Transaction::begin(&self.registry);
            self.unload_all_locked(&mut state, &mut txn).await;
            let report = self.load_all_locked(&mut state, &mut txn).await;
            (report, txn.commit(&self.registry))
        };
        info!(%report, "plugins reloaded");
        self.announce(events).await;
        report
    }

    /// Unload every plugin. Used on shell exit so background tasks stop.
    pub async fn shutdown(&self) {
        let events = {
            let mut state = self.state.lock().await;
            let mut txn = Transaction::begin(&self.registry);
            self.unload_all_locked(&mut state, &mut txn).await;
            txn.commit(&self.registry)
        };
        self.announce(events).await;
    }

    pub async fn loaded(&self) -> Vec<PluginInfo> {
        self.state
            .lock()
            .await
            .records
            .values()
            .map(PluginRecord::info)
            .collect()
    }

    pub async fn is_loaded(&self, id: &str) -> bool {
        self.state.lock().await.records.contains_key(id)
    }

    // ── Unit resolution ─────────────────────────────────────────

    fn denied(&self, id: &str) -> bool {
        self.config.plugins.deny.iter().any(|d| d == id)
    }

    fn resolve_unit(&self, id: &str) -> Result<PluginUnit, PluginError> {
        if self.denied(id) {
            return Err(PluginError::Disabled {
                id: id.to_string(),
                reason: "blocked by denylist".into(),
            });
        }
        if let Some(unit) = self.builtin_units.iter().find(|u| u.id == id) {
            return Ok(unit.clone());
        }
        let path = locate_unit(&self.plugins_dir, id)
            .ok_or_else(|| PluginError::NotFound(id.to_string()))?;
        self.unit_from_manifest(id, &path)
    }

    fn unit_from_manifest(&self, id: &str, path: &Path) -> Result<PluginUnit, PluginError> {
        let manifest = load_manifest(path)?;
        if !manifest.enabled {
            return Err(PluginError::Disabled {
                id: id.to_string(),
                reason: "disabled in manifest".into(),
            });
        }

        let kind = if let Some(entry) = manifest.entry.as_deref() {
            self.catalog
                .resolve(entry)
                .ok_or_else(|| PluginError::UnknownEntry {
                    id: id.to_string(),
                    entry: entry.to_string(),
                })?
        } else if !manifest.commands.is_empty() {
            PluginKind::Paired(Arc::new(DeclarativePlugin::new(manifest.commands)))
        } else {
            return Err(PluginError::MissingEntryPoint(id.to_string()));
        };

        Ok(PluginUnit {
            id: id.to_string(),
            description: manifest.description.unwrap_or_default(),
            version: manifest.version,
            source: UnitSource::Manifest(path.to_path_buf()),
            kind,
        })
    }

    // ── Locked lifecycle ────────────────────────────────────────

    async fn load_locked(
        &self,
        state: &mut LoaderState,
        id: &str,
        unit: Result<PluginUnit, PluginError>,
        txn: &mut Transaction,
    ) -> Result<(), PluginError> {
        if state.records.contains_key(id) {
            self.unload_locked(state, id, txn).await;
        }

        let unit = match unit {
            Ok(unit) => unit,
            Err(e) if e.is_disabled() => {
                info!(plugin = %id, reason = %e, "plugin disabled");
                return Err(e);
            }
            Err(e) => {
                self.fail(id, &e, txn);
                return Err(e);
            }
        };

        let checkpoint = txn.checkpoint();
        match self.activate(&unit, txn).await {
            Ok(activation) => {
                info!(
                    plugin = %id,
                    kind = unit.kind.label(),
                    commands = activation.commands.len(),
                    "plugin loaded"
                );
                state.records.insert(
                    id.to_string(),
                    PluginRecord {
                        id: id.to_string(),
                        description: unit.description,
                        version: unit.version.or(activation.version),
                        source: unit.source,
                        handle: activation.handle,
                        commands: activation.commands,
                        loaded_at: Local::now(),
                    },
                );
                txn.push(PLUGIN_LOADED, json!({ "name": id }));
                Ok(())
            }
            Err(e) => {
                txn.restore(checkpoint);
                self.fail(id, &e, txn);
                Err(e)
            }
        }
    }

    async fn activate(
        &self,
        unit: &PluginUnit,
        txn: &Transaction,
    ) -> Result<Activation, PluginError> {
        match &unit.kind {
            PluginKind::Paired(plugin) => {
                let shell = PluginShell::new(
                    &unit.id,
                    Arc::clone(&txn.table),
                    Arc::clone(&self.diagnostics),
                    BTreeSet::new(),
                );
                match AssertUnwindSafe(plugin.register(&self.bus, &shell))
                    .catch_unwind()
                    .await
                {
                    Ok(Ok(())) => Ok(Activation {
                        handle: PluginHandle::Paired(Arc::clone(plugin)),
                        commands: shell.into_attributed(),
                        version: None,
                    }),
                    Ok(Err(e)) => Err(PluginError::Register {
                        id: unit.id.clone(),
                        message: format!("{e:#}"),
                    }),
                    Err(_) => Err(PluginError::RegisterPanic(unit.id.clone())),
                }
            }
            PluginKind::Factory(factory) => {
                let ctx = PluginContext {
                    plugin_id: unit.id.clone(),
                    bus: Arc::clone(&self.bus),
                    diagnostics: Arc::clone(&self.diagnostics),
                    output: Arc::clone(&self.output),
                    config: Arc::clone(&self.config),
                };
                let instance = match AssertUnwindSafe(factory.setup(&ctx)).catch_unwind().await {
                    Ok(Ok(instance)) => instance,
                    Ok(Err(e)) => {
                        return Err(PluginError::Setup {
                            id: unit.id.clone(),
                            message: format!("{e:#}"),
                        });
                    }
                    Err(_) => return Err(PluginError::SetupPanic(unit.id.clone())),
                };

                let mut commands = BTreeSet::new();
                {
                    let mut table = txn.table.lock();
                    for (name, handler) in instance.commands() {
                        table.insert(name.clone(), handler);
                        commands.insert(name);
                    }
                }
                self.diagnostics.register_commands(commands.iter().cloned());
                for (kind, handler) in instance.event_handlers() {
                    self.bus.subscribe(&kind, handler);
                }

                Ok(Activation {
                    version: Some(instance.version().to_string()),
                    handle: PluginHandle::Instance(instance),
                    commands,
                })
            }
        }
    }

    async fn unload_locked(
        &self,
        state: &mut LoaderState,
        id: &str,
        txn: &mut Transaction,
    ) -> bool {
        let Some(record) = state.records.remove(id) else {
            debug!(plugin = %id, "unload of unknown plugin ignored");
            return false;
        };

        match &record.handle {
            PluginHandle::Paired(plugin) => {
                let shell = PluginShell::new(
                    id,
                    Arc::clone(&txn.table),
                    Arc::clone(&self.diagnostics),
                    record.commands.clone(),
                );
                match AssertUnwindSafe(plugin.unregister(&self.bus, &shell))
                    .catch_unwind()
                    .await
                {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(plugin = %id, error = %e, "unregister failed"),
                    Err(_) => error!(plugin = %id, "unregister panicked"),
                }
                let leftover = shell.into_attributed();
                if !leftover.is_empty() {
                    debug!(plugin = %id, commands = ?leftover, "removing attributed commands");
                    let mut table = txn.table.lock();
                    for name in &leftover {
                        table.remove(name);
                    }
                }
            }
            PluginHandle::Instance(instance) => {
                match AssertUnwindSafe(instance.shutdown()).catch_unwind().await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(plugin = %id, error = %e, "shutdown failed"),
                    Err(_) => error!(plugin = %id, "shutdown panicked"),
                }
                let mut table = txn.table.lock();
                for name in &record.commands {
                    table.remove(name);
                }
            }
        }

        info!(plugin = %id, "plugin unloaded");
        txn.push(PLUGIN_UNLOADED, json!({ "name": id }));
        true
    }

    async fn unload_all_locked(&self, state: &mut LoaderState, txn: &mut Transaction) {
        let ids: Vec<String> = state.records.keys().cloned().collect();
        for id in ids.iter().rev() {
            self.unload_locked(state, id, txn).await;
        }
    }

    async fn load_all_locked(&self, state: &mut LoaderState, txn: &mut Transaction) -> LoadReport {
        let mut report = LoadReport::default();
        if !self.config.plugins.enabled {
            info!("plugin loading disabled");
            return report;
        }

        let mut builtin_ids = BTreeSet::new();
        for unit in &self.builtin_units {
            builtin_ids.insert(unit.id.clone());
            if self.denied(&unit.id) {
                info!(plugin = %unit.id, "plugin blocked by denylist");
                report.skipped.push(unit.id.clone());
                continue;
            }
            let result = self
                .load_locked(state, &unit.id, Ok(unit.clone()), txn)
                .await;
            Self::record_outcome(&mut report, &unit.id, result);
        }

        let discovery = discover_units(&self.plugins_dir);
        for message in &discovery.diagnostics {
            warn!(dir = %self.plugins_dir.display(), "{message}");
        }
        for discovered in discovery.units {
            let id = discovered.id;
            if builtin_ids.contains(&id) {
                info!(plugin = %id, "skipped: already loaded as builtin");
                report.skipped.push(id);
                continue;
            }
            if self.denied(&id) {
                info!(plugin = %id, "plugin blocked by denylist");
                report.skipped.push(id);
                continue;
            }
            let unit = self.unit_from_manifest(&id, &discovered.manifest_path);
            let result = self.load_locked(state, &id, unit, txn).await;
            Self::record_outcome(&mut report, &id, result);
        }

        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "plugin loading complete"
        );
        report
    }

    fn record_outcome(report: &mut LoadReport, id: &str, result: Result<(), PluginError>) {
        match result {
            Ok(()) => report.loaded.push(id.to_string()),
            Err(e) if e.is_disabled() => report.skipped.push(id.to_string()),
            Err(e) => report.failed.push((id.to_string(), e.to_string())),
        }
    }

    fn fail(&self, id: &str, error: &PluginError, txn: &mut Transaction) {
        let message = error.to_string();
        self.diagnostics.log_error(
            "PluginLoadError",
            message.clone(),
            payload(json!({ "plugin": id, "action": "load" })),
        );
        txn.push(PLUGIN_FAILED, json!({ "name": id, "error": message }));
    }

    async fn announce(&self, events: Vec<(&'static str, Map<String, Value>)>) {
        for (kind, data) in events {
            self.bus.emit(kind, data).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{CommandHandler, Invocation, Resolution, command_fn};
    use crate::events::EventBus;
    use crate::plugins::traits::{LifecyclePlugin, PluginFactory, PluginInstance};
    use crate::shell::output::BufferOutput;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        registry: Arc<CommandRegistry>,
        bus: Arc<EventBus>,
        diagnostics: Arc<ErrorCollector>,
        loader: PluginLoader,
        _dir: tempfile::TempDir,
    }

    fn fixture(configure: impl FnOnce(&mut Config)) -> Fixture {
        fixture_with(configure, Vec::new())
    }

    fn fixture_with(configure: impl FnOnce(&mut Config), builtins: Vec<PluginUnit>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.plugins.dir = dir.path().join("plugins").display().to_string();
        config.plugins.state_dir = dir.path().display().to_string();
        config.logs.dir = dir.path().join("logs").display().to_string();
        configure(&mut config);

        let registry = Arc::new(CommandRegistry::new());
        registry.register("help", command_fn("", |_| Ok(None)));
        let bus = Arc::new(EventBus::new());
        let diagnostics = Arc::new(ErrorCollector::in_memory());
        let loader = builtins.into_iter().fold(
            PluginLoader::new(
                Arc::clone(&registry),
                Arc::clone(&bus),
                Arc::clone(&diagnostics),
                Arc::new(BufferOutput::new()),
                Arc::new(config),
            ),
            PluginLoader::with_builtin,
        );
        Fixture {
            registry,
            bus,
            diagnostics,
            loader,
            _dir: dir,
        }
    }

    fn write_unit(fx: &Fixture, id: &str, manifest: &str) {
        let dir = fx.loader.plugins_dir();
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(format!("{id}.toml")), manifest).unwrap();
    }

    fn kinds(bus: &EventBus) -> Vec<String> {
        bus.history().iter().map(|e| e.kind().to_string()).collect()
    }

    struct Failing;

    #[async_trait]
    impl LifecyclePlugin for Failing {
        async fn register(&self, _bus: &Arc<EventBus>, shell: &PluginShell) -> anyhow::Result<()> {
            shell.register_command("half", command_fn("", |_| Ok(None)));
            anyhow::bail!("no microphone")
        }
    }

    struct Panicking;

    #[async_trait]
    impl LifecyclePlugin for Panicking {
        async fn register(&self, _bus: &Arc<EventBus>, _shell: &PluginShell) -> anyhow::Result<()> {
            panic!("intentional panic")
        }
    }

    struct Counting {
        shutdowns: Arc<AtomicUsize>,
    }

    struct CountingInstance {
        shutdowns: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PluginFactory for Counting {
        async fn setup(&self, _ctx: &PluginContext) -> anyhow::Result<Box<dyn PluginInstance>> {
            Ok(Box::new(CountingInstance {
                shutdowns: Arc::clone(&self.shutdowns),
            }))
        }
    }

    #[async_trait]
    impl PluginInstance for CountingInstance {
        fn commands(&self) -> Vec<(String, Arc<dyn CommandHandler>)> {
            vec![("count".to_string(), command_fn("", |_| Ok(Some("1".into()))))]
        }

        async fn shutdown(&self) -> anyhow::Result<()> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn declarative_unit_loads_and_unloads() {
        let fx = fixture(|_| {});
        write_unit(&fx, "greeter", "[[commands]]\nname = \"greet\"\nreply = \"hi {0|you}\"\n");

        fx.loader.load("greeter").await.unwrap();
        let Resolution::Found { handler, .. } = fx.registry.resolve("gre") else {
            panic!("greet should resolve by prefix");
        };
        let reply = handler
            .call(&Invocation::new("gre", "greet", vec!["Ann".into()]))
            .await
            .unwrap();
        assert_eq!(reply.as_deref(), Some("hi Ann"));
        assert!(fx.diagnostics.known_commands().contains(&"greet".to_string()));

        assert!(fx.loader.unload("greeter").await);
        assert!(matches!(fx.registry.resolve("greet"), Resolution::NotFound));
        assert_eq!(kinds(&fx.bus), vec![PLUGIN_LOADED, PLUGIN_UNLOADED]);
    }

    #[tokio::test]
    async fn loading_twice_replaces_the_first_command_set() {
        let fx = fixture(|_| {});
        write_unit(&fx, "tool", "[[commands]]\nname = \"old\"\nreply = \"x\"\n");
        fx.loader.load("tool").await.unwrap();

        write_unit(&fx, "tool", "[[commands]]\nname = \"new\"\nreply = \"y\"\n");
        fx.loader.load("tool").await.unwrap();

        assert_eq!(fx.registry.names(), vec!["help", "new"]);
        let info = fx.loader.loaded().await;
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].commands, vec!["new"]);
        assert_eq!(
            kinds(&fx.bus),
            vec![PLUGIN_LOADED, PLUGIN_UNLOADED, PLUGIN_LOADED]
        );
    }

    #[tokio::test]
    async fn register_error_rolls_back_and_is_logged() {
        let fx = fixture(|_| {});
        let err = fx
            .loader
            .load_unit(PluginUnit::paired("flaky", Arc::new(Failing)))
            .await
            .unwrap_err();

        assert!(matches!(err, PluginError::Register { .. }));
        assert!(err.to_string().contains("no microphone"));
        assert!(!fx.registry.contains("half"));
        assert!(!fx.loader.is_loaded("flaky").await);

        let logged = fx.diagnostics.recent(1);
        assert_eq!(logged[0].kind, "PluginLoadError");
        assert_eq!(logged[0].context["plugin"], "flaky");
        assert_eq!(logged[0].context["action"], "load");

        let failed = fx.bus.recent(1);
        assert_eq!(failed[0].kind(), PLUGIN_FAILED);
        assert_eq!(failed[0].str_field("name"), Some("flaky"));
    }

    #[tokio::test]
    async fn register_panic_is_isolated() {
        let fx = fixture(|_| {});
        let err = fx
            .loader
            .load_unit(PluginUnit::paired("boom", Arc::new(Panicking)))
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::RegisterPanic(_)));
        assert_eq!(fx.registry.names(), vec!["help"]);
    }

    #[tokio::test]
    async fn load_all_tolerates_broken_units() {
        let fx = fixture(|_| {});
        write_unit(&fx, "good", "[[commands]]\nname = \"ok\"\nreply = \"fine\"\n");
        write_unit(&fx, "no_entry", "description = \"nothing here\"\n");
        write_unit(&fx, "bad_syntax", "entry = ");
        write_unit(&fx, "unknown", "entry = \"teleporter\"\n");
        write_unit(&fx, "off", "enabled = false\nentry = \"sample\"\n");

        let report = fx.loader.load_all().await;
        assert_eq!(report.loaded, vec!["good"]);
        assert_eq!(report.skipped, vec!["off"]);
        let failed: Vec<&str> = report.failed.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(failed, vec!["bad_syntax", "no_entry", "unknown"]);
        assert!(report.failed[1].1.contains("no entry point"));
        assert!(fx.registry.contains("ok"));
    }

    #[tokio::test]
    async fn denylist_and_master_switch() {
        let fx = fixture(|c| c.plugins.deny = vec!["blocked".into()]);
        write_unit(&fx, "blocked", "entry = \"sample\"\n");
        let report = fx.loader.load_all().await;
        assert_eq!(report.skipped, vec!["blocked"]);
        assert!(fx.loader.load("blocked").await.unwrap_err().is_disabled());

        let off = fixture(|c| c.plugins.enabled = false);
        write_unit(&off, "sample", "entry = \"sample\"\n");
        assert_eq!(off.loader.load_all().await, LoadReport::default());
        assert!(!off.registry.contains("hello"));
    }

    #[tokio::test]
    async fn unknown_unit_is_not_found_and_unload_is_noop() {
        let fx = fixture(|_| {});
        assert!(matches!(
            fx.loader.load("ghost").await,
            Err(PluginError::NotFound(_))
        ));
        assert!(!fx.loader.unload("ghost").await);
        assert_eq!(fx.registry.names(), vec!["help"]);
    }

    #[tokio::test]
    async fn factory_shutdown_runs_on_unload_and_reload() {
        let shutdowns = Arc::new(AtomicUsize::new(0));
        let counter = PluginUnit::factory(
            "counter",
            Arc::new(Counting {
                shutdowns: Arc::clone(&shutdowns),
            }),
        );
        let fx = fixture_with(|_| {}, vec![counter]);
        let loader = &fx.loader;

        let report = loader.load_all().await;
        assert_eq!(report.loaded, vec!["counter"]);
        assert!(fx.registry.contains("count"));

        loader.reload_all().await;
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
        assert!(fx.registry.contains("count"));

        loader.shutdown().await;
        assert_eq!(shutdowns.load(Ordering::SeqCst), 2);
        assert_eq!(fx.registry.names(), vec!["help"]);
    }

    #[tokio::test]
    async fn catalog_entry_builds_sample_unit() {
        let fx = fixture(|_| {});
        write_unit(&fx, "sample", "version = \"2.0.0\"\nentry = \"sample\"\n");

        fx.loader.load("sample").await.unwrap();
        assert!(fx.registry.contains("hello"));
        assert!(fx.registry.contains("time"));

        let info = fx.loader.loaded().await;
        assert_eq!(info[0].kind, "function-pair");
        assert_eq!(info[0].version.as_deref(), Some("2.0.0"));
        assert!(matches!(info[0].source, UnitSource::Manifest(_)));
    }
}
