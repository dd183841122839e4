//! Background system metrics sampler.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::commands::{CommandHandler, Invocation};
use crate::plugins::traits::{PluginContext, PluginFactory, PluginInstance};
use crate::services::{MetricsSampler, SystemSnapshot};

const DEFAULT_SHOWN: usize = 5;

type Samples = Arc<Mutex<VecDeque<(DateTime<Local>, SystemSnapshot)>>>;

pub struct MonitorFactory;

#[async_trait]
impl PluginFactory for MonitorFactory {
    async fn setup(&self, ctx: &PluginContext) -> anyhow::Result<Box<dyn PluginInstance>> {
        let interval = Duration::from_secs(ctx.config.monitor.interval_secs.max(1));
        let capacity = ctx.config.monitor.capacity.max(1);
        let samples: Samples = Arc::new(Mutex::new(VecDeque::with_capacity(capacity)));
        let cancel = CancellationToken::new();

        let task = tokio::spawn(sample_loop(
            Arc::new(MetricsSampler::new()),
            Arc::clone(&samples),
            capacity,
            interval,
            cancel.clone(),
        ));
        info!(interval_secs = interval.as_secs(), "📈 monitor started");

        Ok(Box::new(Monitor {
            samples,
            interval,
            cancel,
            task: Mutex::new(Some(task)),
        }))
    }
}

async fn sample_loop(
    sampler: Arc<MetricsSampler>,
    samples: Samples,
    capacity: usize,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let sampler = Arc::clone(&sampler);
                match tokio::task::spawn_blocking(move || sampler.snapshot()).await {
                    Ok(snapshot) => {
                        let mut samples = samples.lock();
                        if samples.len() == capacity {
                            samples.pop_front();
                        }
                        samples.push_back((Local::now(), snapshot));
                    }
                    Err(e) => warn!(error = %e, "metrics sample failed"),
                }
            }
        }
    }
    debug!("monitor loop stopped");
}

struct Monitor {
    samples: Samples,
    interval: Duration,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

#[cfg(test)]
impl Monitor {
    fn stopped(&self) -> bool {
        self.cancel.is_cancelled() && self.task.lock().is_none()
    }
}

#[async_trait]
impl PluginInstance for Monitor {
    fn description(&self) -> &str {
        "Background system metrics sampler"
    }

    fn commands(&self) -> Vec<(String, Arc<dyn CommandHandler>)> {
        vec![(
            "monitor".to_string(),
            Arc::new(MonitorCommand {
                samples: Arc::clone(&self.samples),
                interval: self.interval,
            }),
        )]
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.await?;
        }
        info!("📈 monitor stopped");
        Ok(())
    }
}

struct MonitorCommand {
    samples: Samples,
    interval: Duration,
}

#[async_trait]
impl CommandHandler for MonitorCommand {
    fn description(&self) -> &str {
        "Show sampled CPU and memory usage"
    }

    async fn call(&self, invocation: &Invocation) -> anyhow::Result<Option<String>> {
        let shown = invocation.count(0, DEFAULT_SHOWN)?;
        let samples = self.samples.lock();
        let Some((_, latest)) = samples.back() else {
            return Ok(Some(format!(
                "📈 Monitor warming up (sampling every {}s)",
                self.interval.as_secs()
            )));
        };

        let cpu: Vec<f32> = samples.iter().map(|(_, s)| s.cpu_percent).collect();
        let average = cpu.iter().sum::<f32>() / cpu.len() as f32;
        let peak = cpu.iter().copied().fold(0.0_f32, f32::max);

        let mut out = format!(
            "📈 Monitor: {} samples every {}s\nCPU avg {average:.1}% | peak {peak:.1}%\nMemory now {:.1}%",
            samples.len(),
            self.interval.as_secs(),
            latest.memory_percent()
        );
        if shown > 0 {
            out.push_str("\nRecent:");
            for (at, s) in samples.iter().skip(samples.len().saturating_sub(shown)) {
                let _ = write!(
                    out,
                    "\n  {}  CPU {:>5.1}%  MEM {:>5.1}%",
                    at.format("%H:%M:%S"),
                    s.cpu_percent,
                    s.memory_percent()
                );
            }
        }
        Ok(Some(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::diagnostics::ErrorCollector;
    use crate::events::EventBus;
    use crate::shell::output::BufferOutput;

    fn snapshot(cpu: f32) -> SystemSnapshot {
        SystemSnapshot {
            cpu_percent: cpu,
            memory_used: 1,
            memory_total: 4,
            disk_used: 0,
            disk_total: 0,
            uptime_secs: 0,
        }
    }

    async fn call(command: &MonitorCommand, args: Vec<String>) -> String {
        command
            .call(&Invocation::new("monitor", "monitor", args))
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn summary_over_samples() {
        let samples: Samples = Arc::new(Mutex::new(VecDeque::new()));
        let command = MonitorCommand {
            samples: Arc::clone(&samples),
            interval: Duration::from_secs(5),
        };
        assert_eq!(
            call(&command, vec![]).await,
            "📈 Monitor warming up (sampling every 5s)"
        );

        for cpu in [10.0, 30.0, 20.0] {
            samples.lock().push_back((Local::now(), snapshot(cpu)));
        }
        let text = call(&command, vec!["2".into()]).await;
        assert!(text.starts_with("📈 Monitor: 3 samples every 5s"));
        assert!(text.contains("CPU avg 20.0% | peak 30.0%"));
        assert!(text.contains("Memory now 25.0%"));
        assert_eq!(text.lines().filter(|l| l.contains("CPU ") && l.contains("MEM")).count(), 2);
    }

    #[tokio::test]
    async fn sampler_runs_until_shutdown() {
        let mut config = Config::default();
        config.monitor.interval_secs = 1;
        config.monitor.capacity = 4;
        let ctx = PluginContext {
            plugin_id: "monitor".into(),
            bus: Arc::new(EventBus::new()),
            diagnostics: Arc::new(ErrorCollector::in_memory()),
            output: Arc::new(BufferOutput::new()),
            config: Arc::new(config),
        };

        let instance = MonitorFactory.setup(&ctx).await.unwrap();
        // The first tick fires immediately.
        let (_, command) = instance.commands().into_iter().next().unwrap();
        let mut text = String::new();
        for _ in 0..50 {
            text = command
                .call(&Invocation::new("monitor", "monitor", vec![]))
                .await
                .unwrap()
                .unwrap();
            if text.starts_with("📈 Monitor: ") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(text.starts_with("📈 Monitor: "), "{text}");

        instance.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_stops_the_task() {
        let cancel = CancellationToken::new();
        let samples: Samples = Arc::new(Mutex::new(VecDeque::new()));
        let task = tokio::spawn(sample_loop(
            Arc::new(MetricsSampler::new()),
            Arc::clone(&samples),
            2,
            Duration::from_secs(3600),
            cancel.clone(),
        ));
        let monitor = Monitor {
            samples,
            interval: Duration::from_secs(3600),
            cancel,
            task: Mutex::new(Some(task)),
        };

        assert!(!monitor.stopped());
        monitor.shutdown().await.unwrap();
        assert!(monitor.stopped());
    }
}
