//! Compiled-in units addressable from manifests by `entry` key.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::builtin::{
    AdvancedFactory, AlternativesFactory, HardwareAnalyzerFactory, MonitorFactory, SamplePlugin,
    SystemInfoPlugin, SystemLogFactory,
};
use super::traits::PluginKind;

type Constructor = fn() -> PluginKind;

#[derive(Clone, Default)]
pub struct Catalog {
    entries: BTreeMap<String, Constructor>,
}

impl Catalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every unit shipped with the shell.
    pub fn standard() -> Self {
        let mut catalog = Self::empty();
        catalog.insert("sample", || PluginKind::Paired(Arc::new(SamplePlugin)));
        catalog.insert("system_log", || PluginKind::Factory(Arc::new(SystemLogFactory)));
        catalog.insert("alternatives", || PluginKind::Factory(Arc::new(AlternativesFactory)));
        catalog.insert("hardware_analyzer", || {
            PluginKind::Factory(Arc::new(HardwareAnalyzerFactory))
        });
        catalog.insert("monitor", || PluginKind::Factory(Arc::new(MonitorFactory)));
        catalog.insert("system_info", || PluginKind::Paired(Arc::new(SystemInfoPlugin)));
        catalog.insert("advanced", || PluginKind::Factory(Arc::new(AdvancedFactory)));
        catalog
    }

    pub fn insert(&mut self, key: impl Into<String>, constructor: Constructor) {
        self.entries.insert(key.into(), constructor);
    }

    /// A fresh unit implementation for `key`.
    pub fn resolve(&self, key: &str) -> Option<PluginKind> {
        self.entries.get(key).map(|constructor| constructor())
    }

    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }
}
