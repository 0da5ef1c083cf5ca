//! capscaled — the capscale daemon.
//!
//! Single binary that assembles every capscale subsystem:
//! - Exception ledger
//! - Trend model
//! - Capacity controller
//! - Scaling loop
//! - REST API (notifications, throughput, windows)
//!
//! # Usage
//!
//! ```text
//! capscaled init --table Orders > capscale.toml
//! capscaled run --config capscale.toml --port 8080
//! ```

mod daemon;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use capscale_core::CapscaleConfig;

const DEFAULT_LOG_FILTER: &str = "info,capscaled=debug,capscale=debug";

#[derive(Parser)]
#[command(name = "capscaled", about = "capscale capacity-scaling daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scaling loop and the API server.
    Run {
        /// Path to capscale.toml.
        #[arg(long, default_value = "capscale.toml")]
        config: PathBuf,

        /// Override `api.port`.
        #[arg(long)]
        port: Option<u16>,

        /// Override `scaling.interval_ms`.
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// Print a starter capscale.toml.
    Init {
        /// Name of the seed table.
        #[arg(long, default_value = "Orders")]
        table: String,
    },
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Command::Run {
            config,
            port,
            interval_ms,
        } => run(config, port, interval_ms).await,
        Command::Init { table } => {
            print!("{}", CapscaleConfig::scaffold(&table).to_toml_string()?);
            Ok(())
        }
    }
}

async fn run(path: PathBuf, port: Option<u16>, interval_ms: Option<u64>) -> anyhow::Result<()> {
    let mut config = CapscaleConfig::from_file(&path)?;
    if let Some(port) = port {
        config.api.port = port;
    }
    if let Some(interval_ms) = interval_ms {
        config.scaling.interval_ms = interval_ms;
    }
    config.validate()?;
    info!(path = %path.display(), tables = config.tables.len(), "capscale daemon starting");

    let daemon::Daemon {
        mut scaler, api, ..
    } = daemon::assemble(&config).await?;

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let loop_handle = tokio::spawn(async move {
        scaler.run(shutdown_rx).await;
    });

    // ── API server ─────────────────────────────────────────────

    let router = capscale_api::build_router(api);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.api.port));
    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl-C, shutting down");
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    let _ = loop_handle.await;
    info!("capscale daemon stopped");
    Ok(())
}
