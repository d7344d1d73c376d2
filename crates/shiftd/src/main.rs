//! shiftd: the progressive rollout daemon.
//!
//! Runs one rollout described by a TOML file and exposes it over HTTP:
//! - `GET /metrics`: score update counters in Prometheus text format
//! - `GET /status`: current score and phase
//! - `POST /stop`: stop the rollout, leaving scores where they are
//!
//! # Usage
//!
//! ```text
//! shiftd run --config /etc/shiftd/shiftd.toml
//! shiftd validate --config shiftd.toml
//! ```

mod config;
mod server;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use shift_rollout::{RolloutController, RolloutMetrics, RolloutOutcome};

use crate::config::DaemonConfig;
use crate::server::AppState;

#[derive(Parser)]
#[command(name = "shiftd", about = "Progressive traffic shifting daemon")]
struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the configured rollout until it completes, reverts or is stopped.
    Run {
        /// Path to the daemon configuration file.
        #[arg(long, short)]
        config: PathBuf,

        /// Override `[server] listen`.
        #[arg(long)]
        listen: Option<SocketAddr>,
    },
    /// Check a configuration file without starting anything.
    Validate {
        #[arg(long, short)]
        config: PathBuf,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,shiftd=debug,shift_rollout=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Run { config, listen } => run(&config, listen).await,
        Command::Validate { config } => validate(&config),
    }
}

async fn run(path: &Path, listen: Option<SocketAddr>) -> anyhow::Result<()> {
    let config = DaemonConfig::from_file(path)?;
    let parts = config.build()?;
    info!(
        config = %path.display(),
        analyzer = config.analyzer_kind(),
        action = config.action_kind(),
        "shiftd starting"
    );

    let metrics = Arc::new(RolloutMetrics::new());
    let controller = RolloutController::from_settings(parts.settings, parts.analyzer, parts.action)
        .with_metrics(metrics.clone());
    let handle = controller.handle();

    // ── HTTP surface ───────────────────────────────────────────

    let addr = listen.unwrap_or(config.server.listen);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "http server listening");

    let router = server::build_router(AppState {
        metrics,
        rollout: handle.clone(),
    });
    let server_handle = handle.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { server_handle.wait_stopped().await })
            .await
    });

    // ── Ctrl-C ─────────────────────────────────────────────────

    let signal_handle = handle.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                signal_handle.stop();
            }
            Err(e) => warn!(error = %e, "failed to install ctrl-c handler"),
        }
    });

    // ── Rollout ────────────────────────────────────────────────

    let outcome = controller.start().await;
    let status = handle.status();
    match outcome {
        RolloutOutcome::Completed => info!(score = status.score, "rollout completed"),
        RolloutOutcome::Reverted => warn!(score = status.score, "rollout reverted"),
        RolloutOutcome::Stopped => info!(score = status.score, "rollout stopped"),
    }

    server.await.context("http server task")??;
    info!("shiftd stopped");
    Ok(())
}

fn validate(path: &Path) -> anyhow::Result<()> {
    let config = DaemonConfig::from_file(path)?;
    let parts = config.build()?;
    let settings = &parts.settings;

    println!("{}: ok", path.display());
    println!(
        "  rollout   {} -> {}, step {}, every {:?}",
        settings.old_cluster(),
        settings.new_cluster(),
        settings.step(),
        settings.rollout_interval()
    );
    match settings.analysis_timeout() {
        Some(timeout) => println!(
            "  analysis  {} every {:?}, timeout {:?}",
            config.analyzer_kind(),
            settings.analysis_interval(),
            timeout
        ),
        None => println!(
            "  analysis  {} every {:?}",
            config.analyzer_kind(),
            settings.analysis_interval()
        ),
    }
    println!("  action    {}", config.action_kind());
    println!("  listen    {}", config.server.listen);
    Ok(())
}
