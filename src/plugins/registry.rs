//! Bookkeeping for loaded plugins.

use chrono::{DateTime, Local};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use super::traits::{LifecyclePlugin, PluginInstance, UnitSource};

/// What unload needs to tear a plugin down.
pub(crate) enum PluginHandle {
    Paired(Arc<dyn LifecyclePlugin>),
    Instance(Box<dyn PluginInstance>),
}

impl PluginHandle {
    fn label(&self) -> &'static str {
        match self {
            Self::Paired(_) => "function-pair",
            Self::Instance(_) => "factory",
        }
    }
}

/// A loaded plugin and the command names attributed to it.
pub(crate) struct PluginRecord {
    pub id: String,
    pub description: String,
    pub version: Option<String>,
    pub source: UnitSource,
    pub handle: PluginHandle,
    pub commands: BTreeSet<String>,
    pub loaded_at: DateTime<Local>,
}

impl PluginRecord {
    pub fn info(&self) -> PluginInfo {
        PluginInfo {
            id: self.id.clone(),
            kind: self.handle.label(),
            description: self.description.clone(),
            version: self.version.clone(),
            source: self.source.clone(),
            commands: self.commands.iter().cloned().collect(),
            loaded_at: self.loaded_at,
        }
    }
}

/// Public view of a loaded plugin.
#[derive(Debug, Clone)]
pub struct PluginInfo {
    pub id: String,
    pub kind: &'static str,
    pub description: String,
    pub version: Option<String>,
    pub source: UnitSource,
    pub commands: Vec<String>,
    pub loaded_at: DateTime<Local>,
}

/// Outcome of `load_all` / `reload_all`. Partial success is normal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub skipped: Vec<String>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} loaded", self.loaded.len())?;
        if !self.failed.is_empty() {
            write!(f, ", {} failed", self.failed.len())?;
        }
        if !self.skipped.is_empty() {
            write!(f, ", {} skipped", self.skipped.len())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_summary() {
        let mut report = LoadReport::default();
        assert_eq!(report.to_string(), "0 loaded");
        assert!(report.is_clean());

        report.loaded.push("sample".into());
        report.failed.push(("broken".into(), "boom".into()));
        report.skipped.push("denied".into());
        assert_eq!(report.to_string(), "1 loaded, 1 failed, 1 skipped");
        assert!(!report.is_clean());
    }
}
