#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::assigning_clones,
    clippy::bool_to_int_with_if,
    clippy::case_sensitive_file_extension_comparisons,
    clippy::cast_possible_wrap,
    clippy::doc_markdown,
    clippy::field_reassign_with_default,
    clippy::float_cmp,
    clippy::implicit_clone,
    clippy::items_after_statements,
    clippy::map_unwrap_or,
    clippy::manual_let_else,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::needless_pass_by_value,
    clippy::needless_raw_string_hashes,
    clippy::redundant_closure_for_method_calls,
    clippy::return_self_not_must_use,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::struct_field_names,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::unnecessary_cast,
    clippy::unnecessary_lazy_evaluations,
    clippy::unnecessary_literal_bound,
    clippy::unnecessary_map_or,
    clippy::unused_self,
    clippy::cast_precision_loss,
    clippy::unnecessary_wraps,
    dead_code
)]

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::BufReader;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use dockevos::shell::ConsoleOutput;
use dockevos::{Config, Shell};

const SYSTEM_LOG_FILE: &str = "system.log";

/// `dockevOS` - an interactive container shell with hot-reloadable plugins.
#[derive(Parser, Debug)]
#[command(name = "dockevos")]
#[command(version)]
#[command(about = "Interactive container shell with hot-reloadable plugins.", long_about = None)]
struct Cli {
    /// Path to a dockevos.toml (defaults to ./dockevos.toml when present)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Override the plugin directory
    #[arg(long)]
    plugins_dir: Option<String>,

    /// Start without loading any plugins
    #[arg(long)]
    no_plugins: bool,

    /// Skip the startup banner
    #[arg(long)]
    no_banner: bool,
}

/// Console output on stderr plus, when enabled, a plain-text copy in
/// `<logs>/system.log` for the `syslog` command.
fn init_tracing(config: &Config) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logs.level));

    let file_layer = if config.logs.file {
        let file = open_log_file(&config.logs_dir())?;
        Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("setting default subscriber failed")
}

fn open_log_file(dir: &Path) -> Result<fs::File> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(SYSTEM_LOG_FILE);
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.plugins_dir {
        config.plugins.dir = dir;
    }
    if cli.no_plugins {
        config.plugins.enabled = false;
    }
    let show_banner = config.shell.banner && !cli.no_banner;

    init_tracing(&config)?;
    tracing::info!(config = ?config.config_path, "starting dockevOS");

    let shell = Shell::bootstrap(config, Arc::new(ConsoleOutput)).await?;
    if show_banner {
        println!("{}", shell.banner().await);
    }
    shell.run(BufReader::new(tokio::io::stdin())).await
}
