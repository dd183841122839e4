//! Compiled-in plugin units, reachable from manifests through `entry = "<key>"`.

pub mod advanced;
pub mod alternatives;
pub mod hardware_analyzer;
pub mod monitor;
pub mod sample;
pub mod system_info;
pub mod system_log;

pub use advanced::AdvancedFactory;
pub use alternatives::AlternativesFactory;
pub use hardware_analyzer::HardwareAnalyzerFactory;
pub use monitor::MonitorFactory;
pub use sample::SamplePlugin;
pub use system_info::SystemInfoPlugin;
pub use system_log::SystemLogFactory;
