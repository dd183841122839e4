use crate::config::VoiceConfig;
use crate::shell::output::Output;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// TTS programs probed on `PATH`, in preference order.
pub const TTS_ENGINES: &[&str] = &["espeak", "say", "spd-say"];

pub struct VoiceService {
    engine: Option<String>,
    listen_command: Vec<String>,
    output: Arc<dyn Output>,
}

impl VoiceService {
    /// Pick the configured engine if it resolves on `PATH`, otherwise the first
    /// installed entry of [`TTS_ENGINES`].
    pub fn detect(config: &VoiceConfig, output: Arc<dyn Output>) -> Self {
        let engine = if config.enabled {
            let configured = config.tts_command.iter().map(String::as_str);
            configured
                .chain(TTS_ENGINES.iter().copied())
                .find(|cmd| which::which(cmd).is_ok())
                .map(str::to_string)
        } else {
            None
        };
        debug!(engine = ?engine, "voice engine detection");

        let listen_command = if config.enabled {
            config.listen_command.clone()
        } else {
            Vec::new()
        };

        Self {
            engine,
            listen_command,
            output,
        }
    }

    /// A text-only voice service.
    pub fn text_only(output: Arc<dyn Output>) -> Self {
        Self {
            engine: None,
            listen_command: Vec::new(),
            output,
        }
    }

    pub fn engine(&self) -> Option<&str> {
        self.engine.as_deref()
    }

    pub fn tts_available(&self) -> bool {
        self.engine.is_some()
    }

    pub fn stt_available(&self) -> bool {
        !self.listen_command.is_empty()
    }

    /// Speak `text`, awaiting the engine. Without an engine the text is
    /// printed instead and the call still succeeds.
    pub async fn speak(&self, text: &str) -> bool {
        let Some(engine) = &self.engine else {
            self.output.line(&format!("🔊 [TTS] {text}"));
            return true;
        };

        match Command::new(engine).arg(text).status().await {
            Ok(status) if status.success() => true,
            Ok(status) => {
                warn!(engine = %engine, %status, "TTS engine failed");
                self.output.line(&format!("❌ TTS Error: {engine} exited with {status}"));
                false
            }
            Err(e) => {
                warn!(engine = %engine, error = %e, "TTS engine could not be started");
                self.output.line(&format!("❌ TTS Error: {e}"));
                false
            }
        }
    }

    /// Run the configured listen command for at most `timeout` and return its
    /// trimmed stdout. Empty on timeout, failure, or when no command is set.
    pub async fn listen(&self, timeout: Duration) -> String {
        let Some((program, args)) = self.listen_command.split_first() else {
            return String::new();
        };

        let child = Command::new(program).args(args).kill_on_drop(true).output();
        match tokio::time::timeout(timeout, child).await {
            Ok(Ok(out)) if out.status.success() => {
                String::from_utf8_lossy(&out.stdout).trim().to_string()
            }
            Ok(Ok(out)) => {
                debug!(status = %out.status, "listen command failed");
                String::new()
            }
            Ok(Err(e)) => {
                warn!(program = %program, error = %e, "listen command could not be started");
                String::new()
            }
            Err(_) => {
                debug!(timeout_secs = timeout.as_secs(), "listen timed out");
                String::new()
            }
        }
    }
}
