//! vigild: the Vigil daemon.
//!
//! Single binary that assembles the monitor:
//! - State store (redb)
//! - HTTP checker and debounced evaluator
//! - Alert channels (webhook, email)
//! - Job registry + retention sweep
//! - REST API
//!
//! # Usage
//!
//! ```text
//! vigild run --config /etc/vigil/vigil.toml --port 8080 --data-dir /var/lib/vigil
//! ```

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vigil_health::HttpChecker;
use vigil_notify::{EmailChannel, Notifier, WebhookChannel};
use vigil_scheduler::{CheckPipeline, MonitorScheduler, RetentionSweeper};
use vigil_state::StateStore;

use crate::config::VigilConfig;

const DEFAULT_LOG_FILTER: &str = "info,vigild=debug,vigil=debug";

#[derive(Parser)]
#[command(name = "vigild", about = "Vigil uptime monitor daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the monitor and its API server.
    Run {
        /// Path to vigil.toml. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on (overrides the config file).
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for persistent state (overrides the config file).
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
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
            data_dir,
        } => {
            let mut config = VigilConfig::load(config.as_deref())?;
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(data_dir) = data_dir {
                config.server.data_dir = data_dir;
            }
            run(config).await
        }
    }
}

async fn run(config: VigilConfig) -> anyhow::Result<()> {
    info!("Vigil daemon starting");

    std::fs::create_dir_all(&config.server.data_dir)?;
    let db_path = config.server.data_dir.join("vigil.redb");

    // ── Initialize subsystems ──────────────────────────────────

    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let checker = Arc::new(HttpChecker::new()?);

    let mut notifier =
        Notifier::new(config.dispatch_timeout()).with_channel(Arc::new(WebhookChannel::new()));
    match EmailChannel::from_settings(&config.smtp_settings())? {
        Some(email) => notifier = notifier.with_channel(Arc::new(email)),
        None => info!("SMTP not configured, email alerts disabled"),
    }
    info!(channels = ?notifier.channel_names(), "notifier initialized");

    let pipeline = CheckPipeline::new(store.clone(), checker, notifier);
    let retention = RetentionSweeper::new(store.clone())
        .with_max_age(config.retention_max_age())
        .with_period(config.sweep_interval());
    let scheduler =
        Arc::new(MonitorScheduler::new(store.clone(), pipeline).with_retention(retention));

    scheduler.start().await?;
    let scheduled = scheduler.reload_all().await?;
    info!(scheduled, "active endpoints scheduled");

    // ── Start API server ───────────────────────────────────────

    let router = vigil_api::build_router(vigil_api::ApiState {
        store,
        scheduler: Arc::clone(&scheduler),
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown signal received");
        })
        .await?;

    scheduler.stop().await;
    info!("Vigil daemon stopped");
    Ok(())
}
