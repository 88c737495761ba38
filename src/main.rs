mod config;
mod logging;
mod queries;
mod sandbox;
mod session;
mod transport;
mod tui;

use crate::config::Config;
use anyhow::Result;
use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "adscope", version)]
#[command(about = "Adscope — terminal client for the Ad Optimiser agent stack", long_about = None)]
struct Cli {
    /// Config file path. Defaults to ./adscope.toml, then the user config dir.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// WebSocket URL of the orchestrator relay
    #[arg(long)]
    url: Option<String>,

    /// Query API endpoint override
    #[arg(long)]
    query_url: Option<String>,

    /// Sandbox API endpoint override
    #[arg(long)]
    sandbox_url: Option<String>,

    /// Log level for the file log (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, config_path) = Config::load_with_path(cli.config.as_deref())?;
    if let Some(url) = cli.url {
        config.transport.url = url;
    }
    if let Some(url) = cli.query_url {
        config.backends.query_url = url;
    }
    if let Some(url) = cli.sandbox_url {
        config.backends.sandbox_url = url;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = Some(level);
    }
    config.validate()?;

    let log_path = logging::setup_tracing_with_settings(logging::LoggingSettings {
        level: config.logging.level.as_deref(),
        directory: config.logging.directory.as_deref(),
        retention_days: config.logging.retention_days,
        suppress_stdout: true,
    })?;
    info!(
        config = ?config_path,
        log_dir = %log_path.display(),
        ws = %config.transport.url,
        "adscope starting"
    );

    tui::run_tui(config).await
}
