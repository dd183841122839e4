//! Plugin discovery: scans the plugins directory for unit manifests.
//!
//! A unit is either `<dir>/<id>.toml` or `<dir>/<id>/plugin.toml`. Entries whose
//! name starts with `.` or `_` are ignored. Units are returned in identifier
//! order so loading is deterministic.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use super::manifest::PLUGIN_MANIFEST_FILENAME;

/// A unit found on disk, before its manifest is parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredUnit {
    pub id: String,
    pub manifest_path: PathBuf,
}

/// Result of a discovery scan.
#[derive(Debug, Default)]
pub struct DiscoveryResult {
    pub units: Vec<DiscoveredUnit>,
    /// Non-fatal problems (duplicate identifiers).
    pub diagnostics: Vec<String>,
}

fn ignored(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('_')
}

/// Manifest path of `path` if it is a unit, with the identifier it implies.
fn unit_at(path: &Path) -> Option<(String, PathBuf)> {
    if path.is_dir() {
        let id = path.file_name()?.to_str()?;
        let manifest = path.join(PLUGIN_MANIFEST_FILENAME);
        return manifest.is_file().then(|| (id.to_string(), manifest));
    }
    if path.extension().and_then(|e| e.to_str()) != Some("toml") {
        return None;
    }
    let id = path.file_stem()?.to_str()?;
    Some((id.to_string(), path.to_path_buf()))
}

/// Scan `dir` for units. A missing directory yields an empty result.
pub fn discover_units(dir: &Path) -> DiscoveryResult {
    let mut result = DiscoveryResult::default();
    let Ok(entries) = fs::read_dir(dir) else {
        return result;
    };

    let mut found: BTreeMap<String, PathBuf> = BTreeMap::new();
    for entry in entries.flatten() {
        if entry.file_name().to_str().is_none_or(ignored) {
            continue;
        }
        let Some((id, manifest)) = unit_at(&entry.path()) else {
            continue;
        };
        if let Some(existing) = found.get(&id) {
            // A file unit and a directory unit share the identifier.
            let (keep, drop) = if existing.ends_with(PLUGIN_MANIFEST_FILENAME) {
                (existing.clone(), manifest)
            } else {
                (manifest, existing.clone())
            };
            result.diagnostics.push(format!(
                "duplicate plugin '{id}': using {}, ignoring {}",
                keep.display(),
                drop.display()
            ));
            found.insert(id, keep);
            continue;
        }
        found.insert(id, manifest);
    }

    result.units = found
        .into_iter()
        .map(|(id, manifest_path)| DiscoveredUnit { id, manifest_path })
        .collect();
    result
}

/// Manifest path for a single identifier, directory form first.
pub fn locate_unit(dir: &Path, id: &str) -> Option<PathBuf> {
    if id.is_empty() || ignored(id) || id.contains(['/', '\\']) {
        return None;
    }
    let nested = dir.join(id).join(PLUGIN_MANIFEST_FILENAME);
    if nested.is_file() {
        return Some(nested);
    }
    let flat = dir.join(format!("{id}.toml"));
    flat.is_file().then_some(flat)
}

// ── Default units ───────────────────────────────────────────────

const DEFAULT_UNITS: &[(&str, &str)] = &[
    (
        "sample",
        "description = \"Sample commands: hello, time\"\nversion = \"1.0.0\"\nentry = \"sample\"\n",
    ),
    (
        "system_log",
        "description = \"Command history and system log viewer\"\n\
         version = \"1.0.0\"\nentry = \"system_log\"\n",
    ),
    (
        "alternatives",
        "description = \"Fallback implementations for missing plugins\"\n\
         version = \"1.0.0\"\nentry = \"alternatives\"\n",
    ),
    (
        "hardware_analyzer",
        "description = \"Dependency checks and hardware issue analysis\"\n\
         version = \"1.0.0\"\nentry = \"hardware_analyzer\"\n",
    ),
    (
        "monitor",
        "description = \"Background system metrics sampler\"\n\
         version = \"1.0.0\"\nentry = \"monitor\"\n",
    ),
    (
        "system_info",
        "description = \"Disk, network and process information\"\n\
         version = \"1.0.0\"\nentry = \"system_info\"\n",
    ),
    (
        "advanced",
        "description = \"Notes, calculator, canned weather and uptime\"\n\
         version = \"1.0.0\"\nentry = \"advanced\"\n",
    ),
    (
        "greeter",
        r#"description = "Declarative example: edit me and run `reload`"

[[commands]]
name = "greet"
description = "Greet someone"
reply = "👋 Hello, {0|stranger}!"

[[commands]]
name = "shout"
description = "Echo the arguments back"
reply = "📣 {args|nothing to say}"
"#,
    ),
];

/// Create `dir` and write the default unit manifests, unless `dir` already
/// exists. Returns the files written.
pub fn seed_default_units(dir: &Path) -> Result<Vec<PathBuf>> {
    if dir.exists() {
        return Ok(Vec::new());
    }
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create plugins directory {}", dir.display()))?;

    let mut written = Vec::with_capacity(DEFAULT_UNITS.len());
    for (id, manifest) in DEFAULT_UNITS {
        let path = dir.join(format!("{id}.toml"));
        fs::write(&path, manifest)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
    }
    info!(dir = %dir.display(), count = written.len(), "seeded default plugins");
    Ok(written)
}
