//! Claimant Runner
//!
//! A polling worker that claims rows from a remote catalog and runs a job for
//! each claimed row.
//!
//! Architecture:
//! - Configuration: JSON file plus command-line/environment overrides
//! - Registry: named work units (query, targets, payloads, handler)
//! - Engine: conditional claim per unit, then per-row job execution
//! - Scheduler: fixed-interval poll cycles until shutdown
//!
//! Claims are made with an optimistic-concurrency precondition, so several
//! runners can poll the same catalog without ever processing a row twice.

mod config;
mod context;
mod engine;
mod handler;
mod registry;
mod scheduler;
#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::registry::Registry;
use crate::scheduler::{PollScheduler, PollSettings, PollerState};
use claimant_client::{CatalogClient, ClientOptions};

const DEFAULT_LOG_FILTER: &str = "claimant_runner=info,claimant_client=info";

#[derive(Parser)]
#[command(name = "claimant-runner")]
#[command(about = "Claims catalog rows and runs a job for each", long_about = None)]
struct Args {
    /// Configuration file
    #[arg(long, short, env = "CLAIMANT_CONFIG")]
    config: PathBuf,

    /// Seconds between poll cycles (overrides the configuration file)
    #[arg(long, env = "CLAIMANT_POLL_SECONDS")]
    poll_seconds: Option<u64>,

    /// Run a single poll cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args.config, args.poll_seconds)?;
    init_logging(&config)?;

    info!("Starting Claimant Runner");
    info!(
        "Loaded configuration: client_id={}, catalog_url={}",
        config.client_id, config.catalog_url
    );
    if config.credentials.is_none() {
        warn!("No credentials configured; requests are anonymous");
    }

    let client = CatalogClient::with_options(
        config.catalog_url.clone(),
        ClientOptions {
            cookie: config.credentials.as_ref().map(|c| c.cookie.clone()),
            client_id: Some(config.client_id.clone()),
            timeout: Some(config.request_timeout),
        },
    )
    .context("Failed to build catalog client")?;
    info!("Catalog client initialized");

    let registry = Registry::from_config(&config)?;

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone())?;

    let state = PollerState::new(registry, Arc::new(client));
    let mut scheduler = PollScheduler::new(state, PollSettings::from(&config), cancel);

    info!("Registered {} work unit(s)", scheduler.state().registry().len());
    for unit in scheduler.state().registry().iter() {
        info!("  - {} ({})", unit.name(), unit.claimable_query());
    }

    drive(&mut scheduler, args.once).await
}

/// Runs one cycle with `--once`, otherwise polls until shutdown
async fn drive(scheduler: &mut PollScheduler, once: bool) -> Result<()> {
    if !once {
        return scheduler.run().await;
    }

    let report = scheduler.poll_once().await?;
    info!(
        "Single cycle done: {} claimed, {} failed, {} unit(s) skipped, {} abandoned",
        report.claimed, report.failed, report.skipped_units, report.abandoned
    );
    Ok(())
}

fn load_config(path: &Path, poll_seconds: Option<u64>) -> Result<Config> {
    let config = Config::load(path, poll_seconds)?;
    config.validate()?;
    Ok(config)
}

/// RUST_LOG wins over the configured level; the optional log file gets a
/// plain-text copy of the console output
fn init_logging(config: &Config) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let configured = config.log_filter()?;
            let level = configured.as_deref().unwrap_or(DEFAULT_LOG_FILTER);
            EnvFilter::try_new(level).with_context(|| format!("Invalid log level '{}'", level))?
        }
    };

    let file_layer = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Log file {} not writable", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(())
}

/// Cancels `cancel` on Ctrl-C or SIGTERM; the poller finishes its current job first
fn spawn_shutdown_listener(cancel: CancellationToken) -> Result<()> {
    #[cfg(unix)]
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    tokio::spawn(async move {
        #[cfg(unix)]
        let terminate = async move {
            sigterm.recv().await;
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();
        tokio::pin!(terminate);

        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => info!("Interrupt received, stopping after the current job"),
                Err(e) => {
                    warn!("Cannot listen for Ctrl-C: {}", e);
                    (&mut terminate).await;
                    info!("SIGTERM received, stopping after the current job");
                }
            },
            _ = &mut terminate => info!("SIGTERM received, stopping after the current job"),
        }
        cancel.cancel();
    });

    Ok(())
}
