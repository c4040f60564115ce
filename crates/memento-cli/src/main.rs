//! memento: an autonomous agent that carries one note between cycles
//!
//! Every cycle it reads its note, asks the model what to do, lets the model
//! write and run scripts in its tool directory, and saves a new note.

mod agent;
mod tools;

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use memento_core::{Config, Memento, NoteStore, OpenAiClient, RetryConfig};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::agent::Orchestrator;
use crate::tools::{ToolRegistry, ToolRouter};

const USAGE: &str = "usage: memento --api-key <key>\n   or: OPENAI_API_KEY=<key> memento";

/// Exit status when no credential is configured
const EXIT_MISSING_KEY: u8 = 1;

#[derive(Debug, Parser)]
#[command(name = "memento")]
#[command(about = "Autonomous agent loop with a single persistent note", version)]
struct Cli {
    /// API key for the language-model service
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Seconds to rest between cycles
    #[arg(short, long)]
    interval: Option<u64>,

    /// Report the current note and tools without contacting the model
    #[arg(long)]
    dry_run: bool,

    /// Configuration file (default: <config dir>/memento/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Model name (overrides config)
    #[arg(short, long)]
    model: Option<String>,

    /// Base URL of an OpenAI-compatible API (overrides config)
    #[arg(long)]
    base_url: Option<String>,

    /// Path of the note file (overrides config)
    #[arg(long)]
    memento: Option<PathBuf>,

    /// Tool directory (overrides config)
    #[arg(long)]
    tools_dir: Option<PathBuf>,

    /// Wall-clock limit for one script, in seconds (overrides config)
    #[arg(long)]
    exec_timeout: Option<u64>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Configuration file merged with command-line overrides
    fn resolve_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };

        if let Some(interval) = self.interval {
            config.agent.interval_secs = interval;
        }
        if let Some(model) = &self.model {
            config.api.model = model.clone();
        }
        if let Some(base_url) = &self.base_url {
            config.api.base_url = base_url.clone();
        }
        if let Some(path) = &self.memento {
            config.agent.memento_path = path.clone();
        }
        if let Some(dir) = &self.tools_dir {
            config.agent.tools_dir = dir.clone();
        }
        if let Some(secs) = self.exec_timeout {
            config.agent.exec_timeout_secs = secs;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = cli.resolve_config()?;
    let registry = ToolRegistry::new(
        config.agent.tools_dir.clone(),
        config.exec_timeout(),
        config.agent.max_output_len,
    );

    if cli.dry_run {
        dry_run(&config, &registry, &mut std::io::stdout().lock())?;
        return Ok(ExitCode::SUCCESS);
    }

    let api_key = match require_api_key(cli.api_key.as_deref(), &mut std::io::stderr().lock()) {
        Ok(key) => key,
        Err(code) => return Ok(ExitCode::from(code)),
    };

    let client = OpenAiClient::new(
        &config.api.base_url,
        api_key,
        &config.api.model,
        config.request_timeout(),
    )?
    .with_retry_config(RetryConfig {
        max_retries: config.api.max_retries,
        ..RetryConfig::default()
    });

    let memento = Memento::open(&config.agent.memento_path).with_context(|| {
        format!(
            "Failed to prepare note storage at {}",
            config.agent.memento_path.display()
        )
    })?;

    let orchestrator = Orchestrator::new(
        Arc::new(client),
        Arc::new(memento),
        ToolRouter::new(registry),
        config.interval(),
    );

    let cancel = CancellationToken::new();
    spawn_signal_listener(cancel.clone());

    orchestrator.run(cancel).await;
    info!("Goodbye");
    Ok(ExitCode::SUCCESS)
}

/// The configured API key, or the exit status after reporting it missing
fn require_api_key(key: Option<&str>, err: &mut impl Write) -> Result<String, u8> {
    match key.filter(|k| !k.trim().is_empty()) {
        Some(key) => Ok(key.to_string()),
        None => {
            let _ = writeln!(err, "error: OPENAI_API_KEY not found.");
            let _ = writeln!(err, "{}", USAGE);
            Err(EXIT_MISSING_KEY)
        }
    }
}

/// Report what the agent would wake up with, without any network access
fn dry_run(config: &Config, registry: &ToolRegistry, out: &mut impl Write) -> Result<()> {
    let memento = Memento::new(&config.agent.memento_path);
    let note = memento
        .read()
        .with_context(|| format!("Failed to read {}", memento.path().display()))?;
    let tools = registry
        .list_tools()
        .with_context(|| format!("Failed to list {}", registry.dir().display()))?;

    writeln!(out, "dry-run mode, no API calls will be made")?;
    writeln!(out, "note file: {}", memento.path().display())?;
    if note.is_empty() {
        writeln!(out, "current note: (empty - first awakening)")?;
    } else {
        writeln!(out, "current note: {}", note)?;
    }
    writeln!(out, "tools directory: {}", registry.dir().display())?;
    if tools.is_empty() {
        writeln!(out, "inventory: (empty - no tools invented yet)")?;
    } else {
        for tool in &tools {
            writeln!(out, "inventory: {}", tool)?;
        }
    }
    writeln!(
        out,
        "interval: {}s, script timeout: {}s",
        config.agent.interval_secs,
        registry.exec_timeout().as_secs()
    )?;
    Ok(())
}

/// Cancel on Ctrl-C or SIGTERM
fn spawn_signal_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_shutdown().await;
        warn!("Shutdown requested, finishing current step");
        cancel.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "Cannot listen for SIGTERM, Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
