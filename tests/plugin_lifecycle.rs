use async_trait::async_trait;
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

use dockevos::Shell;
use dockevos::commands::{CommandHandler, command_fn};
use dockevos::config::Config;
use dockevos::events::{EventBus, EventHandler, PLUGIN_FAILED, PLUGIN_LOADED, handler_fn, payload};
use dockevos::plugins::{
    LifecyclePlugin, PluginContext, PluginError, PluginFactory, PluginInstance, PluginShell,
    PluginUnit,
};
use dockevos::services::{DockerService, VoiceService};
use dockevos::shell::{BufferOutput, Outcome};

async fn start(dir: &Path) -> (Arc<Shell>, Arc<BufferOutput>) {
    let mut config = Config::default();
    config.plugins.dir = dir.join("plugins").display().to_string();
    config.plugins.state_dir = dir.join("state").display().to_string();
    config.plugins.seed_defaults = false;
    config.logs.dir = dir.join("logs").display().to_string();

    let output = Arc::new(BufferOutput::new());
    let shell = Shell::builder(config)
        .output(output.clone())
        .docker(DockerService::unavailable())
        .voice(VoiceService::text_only(output.clone()))
        .build()
        .await
        .unwrap();
    (shell, output)
}

fn write_unit(dir: &Path, id: &str, manifest: &str) {
    let plugins = dir.join("plugins");
    fs::create_dir_all(&plugins).unwrap();
    fs::write(plugins.join(format!("{id}.toml")), manifest).unwrap();
}

fn events_of(shell: &Shell, kind: &str) -> usize {
    shell
        .bus()
        .history()
        .iter()
        .filter(|e| e.kind() == kind)
        .count()
}

/// Registers `status` answering with a fixed reply.
struct StatusPlugin {
    reply: &'static str,
}

#[async_trait]
impl LifecyclePlugin for StatusPlugin {
    async fn register(&self, _bus: &Arc<EventBus>, shell: &PluginShell) -> anyhow::Result<()> {
        let reply = self.reply;
        shell.register_command(
            "status",
            command_fn("Status", move |_| Ok(Some(reply.to_string()))),
        );
        Ok(())
    }

    async fn unregister(&self, _bus: &Arc<EventBus>, shell: &PluginShell) -> anyhow::Result<()> {
        shell.unregister_command("status");
        Ok(())
    }
}

/// Registers one command and then fails.
struct HalfPlugin;

#[async_trait]
impl LifecyclePlugin for HalfPlugin {
    async fn register(&self, _bus: &Arc<EventBus>, shell: &PluginShell) -> anyhow::Result<()> {
        shell.register_command("half", command_fn("", |_| Ok(None)));
        anyhow::bail!("database unreachable")
    }
}

/// Registers `step_a`, then `step_b`. From the second registration on it
/// parks between the two until `gate` is notified.
struct TwoStepPlugin {
    generation: AtomicUsize,
    entered: Arc<Notify>,
    gate: Arc<Notify>,
}

#[async_trait]
impl LifecyclePlugin for TwoStepPlugin {
    async fn register(&self, _bus: &Arc<EventBus>, shell: &PluginShell) -> anyhow::Result<()> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let reply = format!("v{generation}");
        shell.register_command(
            "step_a",
            command_fn("", {
                let reply = reply.clone();
                move |_| Ok(Some(reply.clone()))
            }),
        );
        if generation > 1 {
            self.entered.notify_one();
            self.gate.notified().await;
        }
        shell.register_command("step_b", command_fn("", move |_| Ok(Some(reply.clone()))));
        Ok(())
    }

    async fn unregister(&self, _bus: &Arc<EventBus>, shell: &PluginShell) -> anyhow::Result<()> {
        shell.unregister_command("step_a");
        shell.unregister_command("step_b");
        Ok(())
    }
}

struct PingFactory {
    seen: Arc<AtomicUsize>,
}

struct PingInstance {
    seen: Arc<AtomicUsize>,
}

#[async_trait]
impl PluginFactory for PingFactory {
    async fn setup(&self, _ctx: &PluginContext) -> anyhow::Result<Box<dyn PluginInstance>> {
        Ok(Box::new(PingInstance {
            seen: Arc::clone(&self.seen),
        }))
    }
}

#[async_trait]
impl PluginInstance for PingInstance {
    fn commands(&self) -> Vec<(String, Arc<dyn CommandHandler>)> {
        vec![("ping".to_string(), command_fn("Ping", |_| Ok(Some("pong".into()))))]
    }

    fn event_handlers(&self) -> Vec<(String, Arc<dyn EventHandler>)> {
        let seen = Arc::clone(&self.seen);
        vec![(
            "custom.ping".to_string(),
            handler_fn(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )]
    }
}

#[tokio::test]
async fn last_registration_wins_and_unload_removes_the_name() {
    let dir = tempfile::tempdir().unwrap();
    let (shell, _) = start(dir.path()).await;
    let loader = shell.loader();

    loader
        .load_unit(PluginUnit::paired("first", Arc::new(StatusPlugin { reply: "first" })))
        .await
        .unwrap();
    loader
        .load_unit(PluginUnit::paired("second", Arc::new(StatusPlugin { reply: "second" })))
        .await
        .unwrap();

    let outcome = shell.execute_line("status").await;
    assert_eq!(
        outcome,
        Outcome::Completed {
            name: "status".into(),
            output: Some("second".into())
        }
    );

    assert!(loader.unload("second").await);
    assert!(!shell.registry().contains("status"));
    assert!(matches!(shell.execute_line("status").await, Outcome::Unknown { .. }));

    assert!(loader.unload("first").await);
    assert!(!loader.unload("first").await);
    assert!(shell.registry().contains("help"));
}

#[tokio::test]
async fn loading_twice_replaces_the_first_instance() {
    let dir = tempfile::tempdir().unwrap();
    write_unit(
        dir.path(),
        "greeter",
        "[[commands]]\nname = \"greet\"\nreply = \"Hi {0|there}\"\n",
    );
    let (shell, _) = start(dir.path()).await;

    shell.loader().load("greeter").await.unwrap();
    shell.loader().load("greeter").await.unwrap();

    assert_eq!(shell.loader().loaded().await.len(), 1);
    assert_eq!(events_of(&shell, PLUGIN_LOADED), 2);
    assert_eq!(events_of(&shell, "plugin.unloaded"), 1);
    assert_eq!(
        shell.execute_line("greet Sam").await,
        Outcome::Completed {
            name: "greet".into(),
            output: Some("Hi Sam".into())
        }
    );
}

#[tokio::test]
async fn edited_manifests_take_effect_on_reload() {
    let dir = tempfile::tempdir().unwrap();
    write_unit(dir.path(), "echo", "[[commands]]\nname = \"say\"\nreply = \"v1\"\n");
    let (shell, _) = start(dir.path()).await;
    shell.load_plugins().await.unwrap();
    assert!(shell.registry().contains("say"));

    write_unit(dir.path(), "echo", "[[commands]]\nname = \"tell\"\nreply = \"v2\"\n");
    let report = shell.loader().reload_all().await;

    assert_eq!(report.loaded, vec!["echo".to_string()]);
    assert!(!shell.registry().contains("say"));
    assert_eq!(
        shell.execute_line("tell").await,
        Outcome::Completed {
            name: "tell".into(),
            output: Some("v2".into())
        }
    );
}

#[tokio::test]
async fn reload_with_no_plugins_keeps_the_builtins() {
    let dir = tempfile::tempdir().unwrap();
    let (shell, _) = start(dir.path()).await;
    let before = shell.registry().names();

    let report = shell.loader().reload_all().await;

    assert!(report.is_clean());
    assert!(report.loaded.is_empty());
    assert_eq!(shell.registry().names(), before);
}

#[tokio::test]
async fn a_broken_unit_does_not_block_the_others() {
    let dir = tempfile::tempdir().unwrap();
    write_unit(dir.path(), "broken", "this is = = not toml");
    write_unit(dir.path(), "good", "[[commands]]\nname = \"ok\"\nreply = \"fine\"\n");
    let (shell, output) = start(dir.path()).await;

    let report = shell.load_plugins().await.unwrap();

    assert_eq!(report.loaded, vec!["good".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "broken");
    assert!(output.contains("❌ Plugin broken failed to load:"));
    assert!(shell.registry().contains("ok"));

    assert_eq!(events_of(&shell, PLUGIN_FAILED), 1);
    let logged = shell.diagnostics().recent(1);
    assert_eq!(logged[0].kind, "PluginLoadError");
    assert_eq!(logged[0].context["plugin"], json!("broken"));
}

#[tokio::test]
async fn a_failed_register_leaves_no_commands_behind() {
    let dir = tempfile::tempdir().unwrap();
    let (shell, _) = start(dir.path()).await;

    let err = shell
        .loader()
        .load_unit(PluginUnit::paired("half", Arc::new(HalfPlugin)))
        .await
        .unwrap_err();

    assert!(matches!(err, PluginError::Register { .. }));
    assert!(err.to_string().contains("database unreachable"));
    assert!(!shell.registry().contains("half"));
    assert!(!shell.loader().is_loaded("half").await);
}

#[tokio::test]
async fn subscriptions_outlive_an_unloaded_plugin() {
    let dir = tempfile::tempdir().unwrap();
    let (shell, _) = start(dir.path()).await;
    let seen = Arc::new(AtomicUsize::new(0));

    shell
        .loader()
        .load_unit(PluginUnit::factory(
            "pinger",
            Arc::new(PingFactory {
                seen: Arc::clone(&seen),
            }),
        ))
        .await
        .unwrap();
    assert_eq!(
        shell.execute_line("ping").await,
        Outcome::Completed {
            name: "ping".into(),
            output: Some("pong".into())
        }
    );

    assert!(shell.loader().unload("pinger").await);
    assert!(!shell.registry().contains("ping"));

    shell.bus().emit("custom.ping", payload(json!({}))).await;
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(shell.bus().subscriber_count("custom.ping"), 1);
}

#[tokio::test]
async fn builder_units_load_ahead_of_disk_units() {
    let dir = tempfile::tempdir().unwrap();
    write_unit(dir.path(), "zeta", "[[commands]]\nname = \"zed\"\nreply = \"z\"\n");
    let output = Arc::new(BufferOutput::new());
    let mut config = Config::default();
    config.plugins.dir = dir.path().join("plugins").display().to_string();
    config.plugins.seed_defaults = false;
    config.logs.dir = dir.path().join("logs").display().to_string();

    let shell = Shell::builder(config)
        .output(output.clone())
        .docker(DockerService::unavailable())
        .voice(VoiceService::text_only(output.clone()))
        .plugin(PluginUnit::paired("status", Arc::new(StatusPlugin { reply: "up" })))
        .build()
        .await
        .unwrap();
    let report = shell.load_plugins().await.unwrap();

    assert_eq!(report.loaded, vec!["status".to_string(), "zeta".to_string()]);
    assert!(shell.registry().contains("status"));
    assert!(shell.registry().contains("zed"));
}

#[tokio::test]
async fn readers_see_the_old_command_set_until_reload_commits() {
    let dir = tempfile::tempdir().unwrap();
    let entered = Arc::new(Notify::new());
    let gate = Arc::new(Notify::new());
    let output = Arc::new(BufferOutput::new());
    let mut config = Config::default();
    config.plugins.dir = dir.path().join("plugins").display().to_string();
    config.plugins.seed_defaults = false;
    config.logs.dir = dir.path().join("logs").display().to_string();

    let shell = Shell::builder(config)
        .output(output.clone())
        .docker(DockerService::unavailable())
        .voice(VoiceService::text_only(output.clone()))
        .plugin(PluginUnit::paired(
            "steps",
            Arc::new(TwoStepPlugin {
                generation: AtomicUsize::new(0),
                entered: Arc::clone(&entered),
                gate: Arc::clone(&gate),
            }),
        ))
        .build()
        .await
        .unwrap();
    shell.load_plugins().await.unwrap();

    let reload = shell.loader().reload_all();
    let observe = async {
        entered.notified().await;
        let during = (
            shell.execute_line("step_a").await,
            shell.execute_line("step_b").await,
        );
        gate.notify_one();
        during
    };
    let (report, (step_a, step_b)) = tokio::join!(reload, observe);

    let reply = |name: &str, text: &str| Outcome::Completed {
        name: name.into(),
        output: Some(text.into()),
    };
    assert_eq!(step_a, reply("step_a", "v1"));
    assert_eq!(step_b, reply("step_b", "v1"));

    assert_eq!(report.loaded, vec!["steps".to_string()]);
    assert_eq!(shell.execute_line("step_a").await, reply("step_a", "v2"));
    assert_eq!(shell.execute_line("step_b").await, reply("step_b", "v2"));
}
