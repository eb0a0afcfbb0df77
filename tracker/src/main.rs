// Tracker - offline-first productivity tracker
// Entry point: reconciliation server and device-side commands

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracker::app::AppState;
use tracker::config::DEFAULT_STATS_DAYS;
use tracker::server;
use tracker::services::SettingsService;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "tracker", version, about)]
struct Cli {
    /// Directory holding settings, the local store and exports
    #[arg(long, global = true, default_value = ".tracker")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the reconciliation server
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run one full sync against the configured server
    Sync,
    /// Keep syncing: health probe, reconnect trigger and periodic sync
    Run,
    /// Export active local records to a ZIP archive
    Export,
    /// Sync if the server is reachable, then hard-delete soft-deleted
    /// records the server has acknowledged
    Prune,
    /// Print habit and focus statistics from the local store
    Stats {
        #[arg(long, default_value_t = DEFAULT_STATS_DAYS)]
        days: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tracker=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    tracing::info!("Starting tracker ({:?})", cli.command);

    match cli.command {
        Command::Serve { host, port } => {
            std::fs::create_dir_all(&cli.data_dir)?;
            let settings = SettingsService::new(cli.data_dir.clone()).load().await?;

            let mut server_settings = settings.server.clone();
            server_settings.database_path = settings.server_database_path(&cli.data_dir);
            if let Some(host) = host {
                server_settings.host = host;
            }
            if let Some(port) = port {
                server_settings.port = port;
            }

            tokio::select! {
                result = server::run(&server_settings, settings.calendar) => {
                    result.context("reconciliation server failed")?;
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutting down reconciliation server");
                }
            }
        }
        Command::Sync => {
            let state = AppState::init(cli.data_dir).await?;
            if !state.probe_once().await {
                anyhow::bail!("server {} is unreachable", state.client.base_url());
            }

            let report = state.orchestrator.sync_all().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_success() {
                anyhow::bail!("sync failed for {:?}", report.failed());
            }
        }
        Command::Run => {
            let state = AppState::init(cli.data_dir).await?;
            let background = state.start_background().await?;

            tokio::signal::ctrl_c().await?;
            tracing::info!("Stopping background sync");
            background.shutdown().await?;
        }
        Command::Export => {
            let state = AppState::init(cli.data_dir).await?;
            let path = state.export.export().await?;
            println!("{}", path.display());
        }
        Command::Prune => {
            let state = AppState::init(cli.data_dir).await?;
            if state.probe_once().await {
                let report = state.orchestrator.sync_all().await?;
                if !report.is_success() {
                    tracing::warn!("Sync before prune failed for {:?}", report.failed());
                }
            }
            let removed = state.export.prune_deleted().await?;
            println!("{}", serde_json::to_string_pretty(&removed)?);
        }
        Command::Stats { days } => {
            let state = AppState::init(cli.data_dir).await?;
            let stats = serde_json::json!({
                "habits": state.habits.stats().await?,
                "focus": state.sessions.report(days).await?,
            });
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}
