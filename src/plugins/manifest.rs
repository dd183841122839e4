//! Plugin manifest: the TOML file describing one plugin unit.
//!
//! A unit lives either at `<plugins>/<id>.toml` or `<plugins>/<id>/plugin.toml`.
//! The manifest names a compiled-in entry point or declares its commands
//! inline:
//!
//! ```toml
//! description = "Friendly greetings"
//!
//! [[commands]]
//! name = "greet"
//! description = "Greet someone"
//! reply = "Hello, {0|stranger}!"
//!
//! [[commands]]
//! name = "kernel"
//! exec = ["uname", "-r"]
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Filename of a directory-style unit's manifest.
pub const PLUGIN_MANIFEST_FILENAME: &str = "plugin.toml";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse manifest {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
    #[error("invalid command name '{name}' in {}", .path.display())]
    InvalidCommandName { path: PathBuf, name: String },
    #[error("command '{name}' in {} must set exactly one of `reply` or `exec`", .path.display())]
    CommandAction { path: PathBuf, name: String },
    #[error("manifest {} sets both `entry` and [[commands]]", .path.display())]
    EntryAndCommands { path: PathBuf },
}

/// Parsed plugin manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Human-readable name.
    #[serde(default)]
    pub name: Option<String>,
    /// Short description shown by `plugins`.
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    /// Compiled-in catalog key implementing this unit.
    #[serde(default)]
    pub entry: Option<String>,
    /// `false` keeps the unit on disk without loading it.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Inline command declarations.
    #[serde(default)]
    pub commands: Vec<CommandSpec>,
}

fn default_enabled() -> bool {
    true
}

/// One declaratively defined command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Reply template with `{args}`, `{N}`, `{N|default}` and `{args|default}` placeholders.
    #[serde(default)]
    pub reply: Option<String>,
    /// Program and fixed arguments; the user's arguments are appended.
    #[serde(default)]
    pub exec: Option<Vec<String>>,
}

/// What a declared command does when invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandAction {
    Reply(String),
    Exec(Vec<String>),
}

impl CommandSpec {
    pub fn action(&self) -> Option<CommandAction> {
        match (&self.reply, &self.exec) {
            (Some(reply), None) => Some(CommandAction::Reply(reply.clone())),
            (None, Some(argv)) if !argv.is_empty() => Some(CommandAction::Exec(argv.clone())),
            _ => None,
        }
    }
}

fn valid_command_name(name: &str) -> bool {
    !name.is_empty() && !name.chars().any(char::is_whitespace)
}

impl PluginManifest {
    /// Parse and validate manifest text. `path` is used for error messages.
    pub fn parse(raw: &str, path: &Path) -> Result<Self, ManifestError> {
        let manifest: Self = toml::from_str(raw).map_err(|e| ManifestError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        if manifest.entry.is_some() && !manifest.commands.is_empty() {
            return Err(ManifestError::EntryAndCommands {
                path: path.to_path_buf(),
            });
        }
        for command in &manifest.commands {
            if !valid_command_name(&command.name) {
                return Err(ManifestError::InvalidCommandName {
                    path: path.to_path_buf(),
                    name: command.name.clone(),
                });
            }
            if command.action().is_none() {
                return Err(ManifestError::CommandAction {
                    path: path.to_path_buf(),
                    name: command.name.clone(),
                });
            }
        }
        Ok(manifest)
    }
}

/// Read and validate the manifest at `path`.
pub fn load_manifest(path: &Path) -> Result<PluginManifest, ManifestError> {
    let raw = fs::read_to_string(path).map_err(|source| ManifestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    PluginManifest::parse(&raw, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<PluginManifest, ManifestError> {
        PluginManifest::parse(raw, Path::new("test.toml"))
    }

    #[test]
    fn entry_manifest() {
        let m = parse(
            r#"
name = "Sample"
description = "hello and time"
version = "1.0.0"
entry = "sample"
"#,
        )
        .unwrap();
        assert_eq!(m.entry.as_deref(), Some("sample"));
        assert!(m.enabled);
        assert!(m.commands.is_empty());
    }

    #[test]
    fn declarative_manifest() {
        let m = parse(
            r#"
[[commands]]
name = "greet"
reply = "Hello, {0|stranger}!"

[[commands]]
name = "kernel"
description = "Kernel release"
exec = ["uname", "-r"]
"#,
        )
        .unwrap();
        assert_eq!(m.commands.len(), 2);
        assert_eq!(
            m.commands[0].action(),
            Some(CommandAction::Reply("Hello, {0|stranger}!".into()))
        );
        assert_eq!(
            m.commands[1].action(),
            Some(CommandAction::Exec(vec!["uname".into(), "-r".into()]))
        );
    }

    #[test]
    fn command_needs_exactly_one_action() {
        let both = parse(
            r#"
[[commands]]
name = "x"
reply = "a"
exec = ["b"]
"#,
        );
        assert!(matches!(both, Err(ManifestError::CommandAction { .. })));

        let neither = parse("[[commands]]\nname = \"x\"\n");
        assert!(matches!(neither, Err(ManifestError::CommandAction { .. })));

        let empty_exec = parse("[[commands]]\nname = \"x\"\nexec = []\n");
        assert!(matches!(empty_exec, Err(ManifestError::CommandAction { .. })));
    }

    #[test]
    fn command_names_cannot_contain_whitespace() {
        let err = parse("[[commands]]\nname = \"two words\"\nreply = \"x\"\n").unwrap_err();
        assert!(err.to_string().contains("two words"));
    }

    #[test]
    fn entry_and_commands_conflict() {
        let err = parse("entry = \"sample\"\n[[commands]]\nname = \"x\"\nreply = \"y\"\n");
        assert!(matches!(err, Err(ManifestError::EntryAndCommands { .. })));
    }

    #[test]
    fn syntax_errors_name_the_file() {
        let err = parse("entry = ").unwrap_err();
        assert!(matches!(err, ManifestError::Parse { .. }));
        assert!(err.to_string().contains("test.toml"));
    }

    #[test]
    fn missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_manifest(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ManifestError::Read { .. }));
    }
}
