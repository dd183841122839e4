//! Fallback implementations for plugins that fail to load.
//!
//! The table of known alternatives and the user's selections persist to
//! `alternatives.json` in the state directory. When a plugin fails to load,
//! its alternatives are printed.

use anyhow::Context;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use crate::commands::{CommandHandler, command_fn};
use crate::events::{EventHandler, PLUGIN_FAILED, handler_fn};
use crate::plugins::traits::{PluginContext, PluginFactory, PluginInstance};
use crate::shell::output::Output;

pub const ALTERNATIVES_FILE: &str = "alternatives.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alternative {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AlternativesState {
    #[serde(default)]
    alternatives: BTreeMap<String, Vec<Alternative>>,
    #[serde(default)]
    selected: BTreeMap<String, String>,
}

fn default_alternatives() -> BTreeMap<String, Vec<Alternative>> {
    let alt = |name: &str, description: &str| Alternative {
        name: name.to_string(),
        description: description.to_string(),
    };
    BTreeMap::from([
        (
            "shell_assistant".to_string(),
            vec![
                alt("manual_installer", "Manual package installation guide"),
                alt("package_manager", "Use the system package manager directly"),
            ],
        ),
        (
            "voice_service".to_string(),
            vec![alt("text_input", "Type commands instead of speaking them")],
        ),
    ])
}

/// Alternatives table backed by a JSON file.
pub struct AlternativesStore {
    path: PathBuf,
    state: Mutex<AlternativesState>,
}

impl AlternativesStore {
    /// Load the defaults merged with `path`, if it exists. Entries in the
    /// file replace the defaults for the same plugin.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut state = AlternativesState {
            alternatives: default_alternatives(),
            selected: BTreeMap::new(),
        };
        if path.is_file() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let saved: AlternativesState = serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            state.alternatives.extend(saved.alternatives);
            state.selected = saved.selected;
        }
        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(state),
        })
    }

    fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&*self.state.lock())?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }

    pub fn alternatives_for(&self, plugin: &str) -> Vec<Alternative> {
        self.state
            .lock()
            .alternatives
            .get(&plugin.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    pub fn selected(&self, plugin: &str) -> Option<String> {
        self.state.lock().selected.get(&plugin.to_lowercase()).cloned()
    }

    /// Render the table, or one plugin's entries.
    pub fn describe(&self, plugin: Option<&str>) -> String {
        let state = self.state.lock();
        match plugin {
            Some(plugin) => {
                let key = plugin.to_lowercase();
                let Some(alts) = state.alternatives.get(&key).filter(|a| !a.is_empty()) else {
                    return format!("No alternatives found for {plugin}");
                };
                let selected = state.selected.get(&key);
                let mut out = format!("🔄 Alternatives for {plugin}:");
                for (i, alt) in alts.iter().enumerate() {
                    let marker = if selected == Some(&alt.name) { " (selected)" } else { "" };
                    let _ = write!(out, "\n{}. {} - {}{marker}", i + 1, alt.name, alt.description);
                }
                out
            }
            None => {
                if state.alternatives.is_empty() {
                    return "No alternatives configured".to_string();
                }
                let mut out = String::from("🔄 Available plugin alternatives:");
                for (plugin, alts) in &state.alternatives {
                    let _ = write!(out, "\n{plugin}:");
                    for alt in alts {
                        let _ = write!(out, "\n  - {}: {}", alt.name, alt.description);
                    }
                }
                out
            }
        }
    }

    /// Select `alternative` for `plugin` and persist the choice.
    pub fn select(&self, plugin: &str, alternative: &str) -> anyhow::Result<String> {
        let key = plugin.to_lowercase();
        {
            let mut state = self.state.lock();
            let Some(alts) = state.alternatives.get(&key).filter(|a| !a.is_empty()) else {
                return Ok(format!("No alternatives found for {plugin}"));
            };
            if !alts.iter().any(|a| a.name == alternative) {
                return Ok(format!("Alternative '{alternative}' not found for {plugin}"));
            }
            state.selected.insert(key, alternative.to_string());
        }
        self.save()?;
        info!(plugin, alternative, "alternative selected");
        Ok(format!("✅ Using {alternative} as alternative for {plugin}"))
    }

    /// Notice printed when `plugin` fails to load.
    pub fn fallback_notice(&self, plugin: &str, error: &str) -> String {
        let mut out = format!("🔍 No suitable implementation found for {plugin}");
        if !error.is_empty() {
            let _ = write!(out, "\n   Reason: {error}");
        }
        if let Some(selected) = self.selected(plugin) {
            let _ = write!(out, "\n💡 Configured alternative for {plugin}: {selected}");
            return out;
        }
        let alts = self.alternatives_for(plugin);
        if alts.is_empty() {
            return out;
        }
        out.push_str("\n🔄 Available alternatives:");
        for (i, alt) in alts.iter().enumerate() {
            let _ = write!(out, "\n{}. {} - {}", i + 1, alt.name, alt.description);
        }
        let _ = write!(out, "\n💡 Run 'use {plugin} <alternative>' to pick one");
        out
    }
}

pub struct AlternativesFactory;

#[async_trait]
impl PluginFactory for AlternativesFactory {
    async fn setup(&self, ctx: &PluginContext) -> anyhow::Result<Box<dyn PluginInstance>> {
        let store = AlternativesStore::load(&ctx.state_dir().join(ALTERNATIVES_FILE))?;
        Ok(Box::new(AlternativesPlugin {
            store: Arc::new(store),
            output: Arc::clone(&ctx.output),
            active: Arc::new(AtomicBool::new(true)),
        }))
    }
}

struct AlternativesPlugin {
    store: Arc<AlternativesStore>,
    output: Arc<dyn Output>,
    active: Arc<AtomicBool>,
}

#[async_trait]
impl PluginInstance for AlternativesPlugin {
    fn description(&self) -> &str {
        "Fallback implementations for missing plugins"
    }

    fn commands(&self) -> Vec<(String, Arc<dyn CommandHandler>)> {
        let list = Arc::clone(&self.store);
        let pick = Arc::clone(&self.store);
        vec![
            (
                "alternatives".to_string(),
                command_fn("List plugin alternatives", move |inv| {
                    Ok(Some(list.describe(inv.arg(0))))
                }),
            ),
            (
                "use".to_string(),
                command_fn("Pick an alternative: use <plugin> <alternative>", move |inv| {
                    match (inv.arg(0), inv.arg(1)) {
                        (Some(plugin), Some(alternative)) => {
                            pick.select(plugin, alternative).map(Some)
                        }
                        _ => Ok(Some("Usage: use <plugin> <alternative>".to_string())),
                    }
                }),
            ),
        ]
    }

    fn event_handlers(&self) -> Vec<(String, Arc<dyn EventHandler>)> {
        let store = Arc::clone(&self.store);
        let output = Arc::clone(&self.output);
        let active = Arc::clone(&self.active);
        vec![(
            PLUGIN_FAILED.to_string(),
            handler_fn(move |event| {
                if !active.load(Ordering::Acquire) {
                    return Ok(());
                }
                let Some(plugin) = event.str_field("name") else {
                    warn!("plugin.failed event without a name");
                    return Ok(());
                };
                output.line(&store.fallback_notice(plugin, event.str_field("error").unwrap_or("")));
                Ok(())
            }),
        )]
    }

    // The plugin.failed subscription outlives the instance; a reload would
    // otherwise print every notice twice.
    async fn shutdown(&self) -> anyhow::Result<()> {
        self.active.store(false, Ordering::Release);
        Ok(())
    }
}
