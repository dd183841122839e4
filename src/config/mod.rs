pub mod schema;

pub use schema::{
    Config, DockerConfig, EventsConfig, LogsConfig, MonitorConfig, PluginsConfig, ShellConfig,
    VoiceConfig,
};
