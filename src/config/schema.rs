use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "dockevos.toml";

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Where this config was loaded from, if anywhere. Not serialized.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    #[serde(default)]
    pub shell: ShellConfig,

    #[serde(default)]
    pub plugins: PluginsConfig,

    #[serde(default)]
    pub logs: LogsConfig,

    #[serde(default)]
    pub voice: VoiceConfig,

    #[serde(default)]
    pub docker: DockerConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub events: EventsConfig,
}

// ── Shell ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    #[serde(default = "default_prompt")]
    pub prompt: String,
    /// Show the startup banner.
    #[serde(default = "default_true")]
    pub banner: bool,
}

fn default_prompt() -> String {
    "dockevos> ".into()
}

fn default_true() -> bool {
    true
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            prompt: default_prompt(),
            banner: true,
        }
    }
}

// ── Plugins ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Directory scanned for plugin manifests.
    #[serde(default = "default_plugins_dir")]
    pub dir: String,
    /// Master switch: `false` loads no plugins at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Plugin identifiers that are never loaded.
    #[serde(default)]
    pub deny: Vec<String>,
    /// Write the default manifests when the plugins directory does not exist.
    #[serde(default = "default_true")]
    pub seed_defaults: bool,
    /// Where plugins keep their JSON state files.
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
}

fn default_plugins_dir() -> String {
    "plugins".into()
}

fn default_state_dir() -> String {
    ".".into()
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            dir: default_plugins_dir(),
            enabled: true,
            deny: Vec::new(),
            seed_defaults: true,
            state_dir: default_state_dir(),
        }
    }
}

// ── Logs ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsConfig {
    #[serde(default = "default_logs_dir")]
    pub dir: String,
    /// Default tracing filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Also write tracing output to `<dir>/system.log`.
    #[serde(default = "default_true")]
    pub file: bool,
}

fn default_logs_dir() -> String {
    "logs".into()
}

fn default_log_level() -> String {
    "warn".into()
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            dir: default_logs_dir(),
            level: default_log_level(),
            file: true,
        }
    }
}

// ── Voice ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// `false` skips engine detection; `speak` falls back to text.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Announce container start/stop through TTS.
    #[serde(default = "default_true")]
    pub announce: bool,
    /// Explicit TTS program; detected on `PATH` when unset.
    #[serde(default)]
    pub tts_command: Option<String>,
    /// argv of a speech-to-text program printing the transcript on stdout.
    #[serde(default)]
    pub listen_command: Vec<String>,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            announce: true,
            tts_command: None,
            listen_command: Vec::new(),
        }
    }
}

// ── Docker ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerConfig {
    #[serde(default = "default_docker_binary")]
    pub binary: String,
    /// Upper bound for a single `docker` invocation; the child is killed
    /// when it is exceeded.
    #[serde(default = "default_docker_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_docker_binary() -> String {
    "docker".into()
}

fn default_docker_timeout_secs() -> u64 {
    30
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            binary: default_docker_binary(),
            timeout_secs: default_docker_timeout_secs(),
        }
    }
}

// ── Monitor ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between background samples.
    #[serde(default = "default_monitor_interval")]
    pub interval_secs: u64,
    /// Samples retained by the monitor plugin.
    #[serde(default = "default_monitor_capacity")]
    pub capacity: usize,
}

fn default_monitor_interval() -> u64 {
    5
}

fn default_monitor_capacity() -> usize {
    120
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_monitor_interval(),
            capacity: default_monitor_capacity(),
        }
    }
}

// ── Events ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

fn default_history_capacity() -> usize {
    crate::events::DEFAULT_HISTORY_CAPACITY
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

impl Config {
    /// Load from `explicit` (must exist), else `./dockevos.toml` when present,
    /// else defaults. Environment overrides are applied last.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                Some(path.to_path_buf())
            }
            None => {
                let local = PathBuf::from(DEFAULT_CONFIG_FILE);
                local.exists().then_some(local)
            }
        };

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Apply `DOCKEVOS_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup. Empty values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get("DOCKEVOS_PLUGINS_DIR") {
            self.plugins.dir = dir;
        }
        if let Some(dir) = get("DOCKEVOS_LOGS_DIR") {
            self.logs.dir = dir;
        }
        if let Some(level) = get("DOCKEVOS_LOG_LEVEL") {
            self.logs.level = level;
        }
    }

    pub fn plugins_dir(&self) -> PathBuf {
        expand(&self.plugins.dir)
    }

    pub fn logs_dir(&self) -> PathBuf {
        expand(&self.logs.dir)
    }

    pub fn state_dir(&self) -> PathBuf {
        expand(&self.plugins.state_dir)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(path, toml_str)
            .with_context(|| format!("Failed to write config file {}", path.display()))
    }
}
