//! Thin wrappers around external collaborators.
//!
//! Every display-facing method converts its own failures into text; nothing
//! here returns an error to the dispatch loop.

pub mod docker;
pub mod metrics;
pub mod voice;

pub use docker::DockerService;
pub use metrics::{DiskUsage, InterfaceUsage, MetricsSampler, ProcessUsage, SystemSnapshot};
pub use voice::VoiceService;
