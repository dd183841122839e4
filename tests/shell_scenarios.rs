use serde_json::json;
use std::path::Path;
use std::sync::Arc;

use dockevos::Shell;
use dockevos::commands::Resolution;
use dockevos::config::Config;
use dockevos::events::payload;
use dockevos::services::{DockerService, VoiceService};
use dockevos::shell::{BufferOutput, Outcome};

fn config(dir: &Path, seed_defaults: bool) -> Config {
    let mut config = Config::default();
    config.plugins.dir = dir.join("plugins").display().to_string();
    config.plugins.state_dir = dir.join("state").display().to_string();
    config.plugins.seed_defaults = seed_defaults;
    config.logs.dir = dir.join("logs").display().to_string();
    config
}

async fn start(dir: &Path, seed_defaults: bool) -> (Arc<Shell>, Arc<BufferOutput>) {
    let output = Arc::new(BufferOutput::new());
    let shell = Shell::builder(config(dir, seed_defaults))
        .output(output.clone())
        .docker(DockerService::unavailable())
        .voice(VoiceService::text_only(output.clone()))
        .build()
        .await
        .unwrap();
    shell.load_plugins().await.unwrap();
    (shell, output)
}

fn reply(outcome: Outcome) -> String {
    match outcome {
        Outcome::Completed { output, .. } => output.unwrap_or_default(),
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test]
async fn default_plugins_are_seeded_and_answer() {
    let dir = tempfile::tempdir().unwrap();
    let (shell, output) = start(dir.path(), true).await;

    assert!(output.contains("📝 Created 8 default plugins"));
    assert!(dir.path().join("plugins/sample.toml").is_file());

    assert_eq!(reply(shell.execute_line("hello").await), "Hello, World!");
    assert_eq!(reply(shell.execute_line("hello Ada").await), "Hello, Ada!");
    assert!(reply(shell.execute_line("time").await).starts_with("Current time: "));
    assert_eq!(reply(shell.execute_line("greet Bob").await), "👋 Hello, Bob!");

    let listing = reply(shell.execute_line("plugins").await);
    assert!(listing.starts_with("📦 Loaded Plugins:"));
    assert!(listing.contains("• sample v1.0.0 (function-pair)"));
    assert!(listing.contains("• monitor v1.0.0 (factory)"));
    assert!(listing.contains("• system_info v1.0.0 (function-pair)"));
    assert!(listing.contains("• advanced v1.0.0 (factory)"));

    assert_eq!(reply(shell.execute_line("calc (1 + 2) * 3").await), "🧮 (1 + 2) * 3 = 9");
    assert_eq!(
        reply(shell.execute_line("note add water plants").await),
        "📝 Note added: water plants"
    );
    assert!(dir.path().join("state/notes.json").is_file());
    assert!(reply(shell.execute_line("disk").await).starts_with("💿 "));

    shell.loader().shutdown().await;
}

#[tokio::test]
async fn unique_prefixes_resolve_and_shared_ones_do_not() {
    let dir = tempfile::tempdir().unwrap();
    let (shell, output) = start(dir.path(), true).await;

    assert_eq!(
        shell.execute_line("hell").await,
        Outcome::Completed {
            name: "hello".into(),
            output: Some("Hello, World!".into())
        }
    );

    assert_eq!(
        shell.execute_line("hel").await,
        Outcome::Ambiguous {
            typed: "hel".into(),
            candidates: vec!["hello".into(), "help".into()],
        }
    );
    assert!(output.contains("❌ Ambiguous command: hel. Did you mean one of: hello, help"));

    assert!(shell.loader().unload("sample").await);
    assert!(matches!(shell.execute_line("hello").await, Outcome::Unknown { .. }));
    assert!(matches!(
        shell.registry().resolve("hel"),
        Resolution::Found { ref name, .. } if name == "help"
    ));

    shell.loader().shutdown().await;
}

#[tokio::test]
async fn unknown_commands_get_a_spelling_suggestion() {
    let dir = tempfile::tempdir().unwrap();
    let (shell, output) = start(dir.path(), false).await;

    assert_eq!(
        shell.execute_line("lisen").await,
        Outcome::Unknown {
            typed: "lisen".into(),
            suggestion: Some("listen".into()),
        }
    );
    assert!(output.contains("❌ Unknown command: lisen. Type 'help' for available commands."));
    assert!(output.contains("💡 Did you mean 'listen'?"));

    let completed = shell.bus().recent(1);
    assert_eq!(completed[0].data()["success"], json!(false));

    assert_eq!(
        shell.execute_line("zzzzzz").await,
        Outcome::Unknown {
            typed: "zzzzzz".into(),
            suggestion: None,
        }
    );
}

#[tokio::test]
async fn alias_suggestion_fires_once_at_the_fifth_use() {
    let dir = tempfile::tempdir().unwrap();
    let (shell, output) = start(dir.path(), false).await;

    for _ in 0..4 {
        shell.execute_line("stats").await;
    }
    assert!(shell.usage().suggestions().is_empty());

    shell.execute_line("stats").await;
    assert_eq!(
        shell.usage().suggestions(),
        vec!["💡 Command 'stats' used 5 times. Consider creating an alias.".to_string()]
    );

    shell.execute_line("stats").await;
    assert_eq!(shell.usage().suggestions().len(), 1);
    let printed = output
        .lines()
        .iter()
        .filter(|l| l.contains("Consider creating an alias"))
        .count();
    assert_eq!(printed, 1);
    assert_eq!(shell.usage().count("stats"), 6);
}

#[tokio::test]
async fn event_history_keeps_the_newest_hundred() {
    let dir = tempfile::tempdir().unwrap();
    let (shell, _) = start(dir.path(), false).await;

    for i in 0..150 {
        shell.bus().emit("test.tick", payload(json!({ "i": i }))).await;
    }
    let history = shell.bus().history();
    assert_eq!(history.len(), 100);
    assert_eq!(history[0].data()["i"], json!(50));
    assert_eq!(history[99].data()["i"], json!(149));
}

#[tokio::test]
async fn handler_failures_do_not_stop_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let (shell, output) = start(dir.path(), false).await;

    let input: &[u8] = b"logs\nerrors x\nstats\nexit\n";
    shell.run(input).await.unwrap();

    assert!(output.contains("Usage: logs <container_name> [lines]"));
    assert!(output.contains("❌ Command error: invalid count 'x', expected a number"));
    assert!(output.contains("📊 Usage Statistics:"));
    assert!(output.contains("👋 Goodbye!"));
    assert_eq!(shell.diagnostics().error_count(), 1);
}

#[tokio::test]
async fn history_plugin_records_completed_commands() {
    let dir = tempfile::tempdir().unwrap();
    let (shell, _) = start(dir.path(), true).await;

    shell.execute_line("hello").await;
    shell.execute_line("nosuchthing").await;
    let history = reply(shell.execute_line("history 2").await);

    assert!(history.starts_with("📜 Command history (last 2):"));
    assert!(history.contains("✅ hello"));
    assert!(history.contains("❌ nosuchthing"));

    shell.loader().shutdown().await;
}
