//! Dependency checks and hardware issue analysis.
//!
//! Install hints are printed, never executed.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::commands::{CommandHandler, command_fn};
use crate::diagnostics::{HARDWARE_ERROR, MISSING_DEPENDENCY};
use crate::plugins::traits::{PluginContext, PluginFactory, PluginInstance};
use crate::shell::output::Output;

/// Binaries the shell can make use of, with what they provide.
const DEPENDENCIES: &[(&str, &str)] = &[
    ("docker", "container management"),
    ("espeak", "text-to-speech"),
    ("arecord", "audio capture"),
    ("udevadm", "device management"),
];

/// Keywords in an error message and the dependencies they implicate.
const ISSUE_KEYWORDS: &[(&str, &[&str])] = &[
    ("audio", &["arecord", "espeak"]),
    ("microphone", &["arecord"]),
    ("docker", &["docker"]),
    ("port", &["docker"]),
    ("device", &["udevadm"]),
];

fn package_name(dependency: &str, os: &str) -> String {
    match (dependency, os) {
        ("docker", "linux") => "docker.io",
        ("docker", "macos" | "windows") => "docker-desktop",
        ("arecord", "linux") => "alsa-utils",
        ("udevadm", "linux") => "udev",
        (other, _) => other,
    }
    .to_string()
}

/// Suggested install command for `dependency` on `os`.
pub fn install_hint(dependency: &str, os: &str) -> Option<String> {
    let package = package_name(dependency, os);
    match os {
        "linux" => Some(format!("sudo apt-get install -y {package}")),
        "macos" => Some(format!("brew install {package}")),
        "windows" => Some(format!("choco install -y {package}")),
        _ => None,
    }
}

fn dependency_present(dependency: &str) -> bool {
    which::which(dependency).is_ok()
}

struct Analyzer {
    os: &'static str,
    output: Arc<dyn Output>,
    active: AtomicBool,
}

impl Analyzer {
    fn missing_line(&self, dependency: &str) -> String {
        match install_hint(dependency, self.os) {
            Some(hint) => format!("🔧 Install with: {hint}"),
            None => format!("❌ No install recipe for {dependency} on {}", self.os),
        }
    }

    fn check_dependencies(&self) -> String {
        let mut out = String::from("🔧 Dependency check:");
        for (dependency, purpose) in DEPENDENCIES {
            if dependency_present(dependency) {
                let _ = write!(out, "\n  ✅ {dependency:<8} {purpose}");
            } else {
                let hint = install_hint(dependency, self.os).unwrap_or_default();
                let _ = write!(out, "\n  ❌ {dependency:<8} {purpose}  {hint}");
            }
        }
        out
    }

    fn analyze(&self, message: &str) -> String {
        let lowered = message.to_lowercase();
        let issues: Vec<_> = ISSUE_KEYWORDS
            .iter()
            .filter(|(keyword, _)| lowered.contains(keyword))
            .collect();
        if issues.is_empty() {
            return format!("✅ No known hardware issue matched '{message}'");
        }

        let mut out = String::new();
        for (keyword, dependencies) in issues {
            if !out.is_empty() {
                out.push('\n');
            }
            let _ = write!(out, "🔧 Detected potential {keyword} issue. Checking dependencies...");
            for dependency in *dependencies {
                if dependency_present(dependency) {
                    let _ = write!(out, "\n  ✅ {dependency} installed");
                } else {
                    let hint = self.missing_line(dependency);
                    let _ = write!(out, "\n  ❌ {dependency} missing. {hint}");
                }
            }
        }
        out
    }

    fn on_missing_dependency(&self, data: &Value) {
        if !self.active.load(Ordering::Acquire) {
            return;
        }
        let dependency = data
            .get("dependency")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        self.output
            .line(&format!("🔍 Detected missing dependency: {dependency}"));
        self.output.line(&self.missing_line(dependency));
    }

    fn on_hardware_error(&self, data: &Value) {
        if !self.active.load(Ordering::Acquire) {
            return;
        }
        let message = data.get("message").and_then(Value::as_str).unwrap_or("");
        self.output
            .line(&format!("⚠️  Hardware issue detected: {message}"));
        self.output.line(&self.analyze(message));
    }
}

pub struct HardwareAnalyzerFactory;

#[async_trait]
impl PluginFactory for HardwareAnalyzerFactory {
    async fn setup(&self, ctx: &PluginContext) -> anyhow::Result<Box<dyn PluginInstance>> {
        let analyzer = Arc::new(Analyzer {
            os: std::env::consts::OS,
            output: Arc::clone(&ctx.output),
            active: AtomicBool::new(true),
        });

        let missing = Arc::clone(&analyzer);
        ctx.diagnostics.register_handler(
            MISSING_DEPENDENCY,
            Arc::new(move |data: &Value| -> anyhow::Result<()> {
                missing.on_missing_dependency(data);
                Ok(())
            }),
        );
        let hardware = Arc::clone(&analyzer);
        ctx.diagnostics.register_handler(
            HARDWARE_ERROR,
            Arc::new(move |data: &Value| -> anyhow::Result<()> {
                hardware.on_hardware_error(data);
                Ok(())
            }),
        );

        Ok(Box::new(HardwareAnalyzer { analyzer }))
    }
}

struct HardwareAnalyzer {
    analyzer: Arc<Analyzer>,
}

#[async_trait]
impl PluginInstance for HardwareAnalyzer {
    fn description(&self) -> &str {
        "Dependency checks and hardware issue analysis"
    }

    fn commands(&self) -> Vec<(String, Arc<dyn CommandHandler>)> {
        let deps = Arc::clone(&self.analyzer);
        let analyze = Arc::clone(&self.analyzer);
        vec![
            (
                "deps".to_string(),
                command_fn("Check external dependencies", move |_| {
                    Ok(Some(deps.check_dependencies()))
                }),
            ),
            (
                "analyze".to_string(),
                command_fn("Analyze a hardware error message", move |inv| {
                    if inv.args.is_empty() {
                        return Ok(Some("Usage: analyze <error message>".to_string()));
                    }
                    Ok(Some(analyze.analyze(&inv.joined_args())))
                }),
            ),
        ]
    }

    // Diagnostic handlers cannot be removed, so they go quiet instead.
    async fn shutdown(&self) -> anyhow::Result<()> {
        self.analyzer.active.store(false, Ordering::Release);
        Ok(())
    }
}
