//! Plugin subsystem: discovery, manifests, the compiled-in catalog and the
//! transactional loader.

pub mod builtin;
pub mod catalog;
pub mod declarative;
pub mod discovery;
pub mod error;
pub mod loader;
pub mod manifest;
pub mod registry;
pub mod traits;

pub use catalog::Catalog;
pub use discovery::{discover_units, seed_default_units};
pub use error::PluginError;
pub use loader::PluginLoader;
pub use manifest::{PluginManifest, load_manifest};
pub use registry::{LoadReport, PluginInfo};
pub use traits::{
    LifecyclePlugin, PluginContext, PluginFactory, PluginInstance, PluginKind, PluginShell,
    PluginUnit, UnitSource,
};
