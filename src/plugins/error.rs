use thiserror::Error;

use super::manifest::ManifestError;

/// Why a plugin unit did not load.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin '{0}' not found")]
    NotFound(String),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("plugin '{0}' has no entry point: set `entry` or declare [[commands]]")]
    MissingEntryPoint(String),
    #[error("plugin '{id}' names unknown entry '{entry}'")]
    UnknownEntry { id: String, entry: String },
    #[error("plugin '{id}' failed to register: {message}")]
    Register { id: String, message: String },
    #[error("plugin '{0}' panicked during register")]
    RegisterPanic(String),
    #[error("plugin '{id}' failed to set up: {message}")]
    Setup { id: String, message: String },
    #[error("plugin '{0}' panicked during setup")]
    SetupPanic(String),
    #[error("plugin '{id}' is disabled ({reason})")]
    Disabled { id: String, reason: String },
}

impl PluginError {
    /// Disabled units are skipped, not reported as load faults.
    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled { .. })
    }
}
