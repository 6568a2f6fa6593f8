use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use reddit_insight::config::{InsightConfig, LogFormat, LoggingConfig};
use reddit_insight::http::{AppState, DashboardServer};
use reddit_insight::requestlog::RequestLog;

#[derive(Debug, Parser)]
#[command(name = "reddit-insight", version, about = "Reddit Insight dashboard core")]
struct Cli {
    /// YAML configuration file; environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the dashboard HTTP server
    Serve,
    /// Print request statistics from a persisted request log
    Stats {
        #[arg(long)]
        log_file: PathBuf,
        #[arg(long, default_value_t = 24)]
        hours: u32,
    },
    /// Print recent error responses from a persisted request log
    Errors {
        #[arg(long)]
        log_file: PathBuf,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = InsightConfig::load(cli.config.as_deref())?;
    init_tracing(&config.logging);

    match cli.command {
        Command::Serve => serve(config).await?,
        Command::Stats { log_file, hours } => {
            let log = RequestLog::load(&log_file)?;
            println!("{}", serde_json::to_string_pretty(&log.request_stats(hours))?);
        }
        Command::Errors { log_file, limit } => {
            let log = RequestLog::load(&log_file)?;
            println!("{}", serde_json::to_string_pretty(&log.error_logs(limit))?);
        }
    }

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match logging.format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn serve(config: InsightConfig) -> anyhow::Result<()> {
    info!("Starting Reddit Insight dashboard");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let state = AppState::from_config(&config)?;
    info!(
        listen_addr = %config.server.listen_addr,
        max_requests = config.http_rate_limit.max_requests,
        window_secs = config.http_rate_limit.window_secs,
        "Configuration loaded"
    );

    DashboardServer::new(config.server.listen_addr, state)
        .serve_with_shutdown(shutdown_signal())
        .await?;

    info!("Reddit Insight dashboard stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
