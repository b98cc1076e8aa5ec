//! # Gantry: process supervisor and distributed cron
//!
//! Usage:
//!   gantry app start [--daemon] [--address=:8888]   # HTTP service
//!   gantry app stop | restart | state
//!   gantry cron start [--daemon]                     # scheduler
//!   gantry cron list [--json]
//!   gantry cron stop | restart | state

mod commands;
mod jobs;

use anyhow::Result;
use clap::{Parser, Subcommand};
use gantry_core::{AppContext, GantryConfig, LogFormat};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use commands::Globals;
use commands::app::AppAction;
use commands::cron::CronAction;

#[derive(Parser)]
#[command(
    name = "gantry",
    version,
    about = "⚙️ Gantry — process supervisor and file-lease cron scheduler"
)]
struct Cli {
    /// Config file (default: $GANTRY_CONFIG or ~/.gantry/config.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage the HTTP app service
    App {
        #[command(subcommand)]
        action: AppAction,
    },
    /// Manage the cron scheduler
    Cron {
        #[command(subcommand)]
        action: CronAction,
    },
}

/// How long runtime teardown waits for leftover blocking work.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

fn init_logging(verbose: bool, format: LogFormat) {
    let filter = if verbose {
        "gantry=debug,tower_http=debug"
    } else {
        "gantry=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run(cli));
    // Work abandoned by a shutdown deadline must not keep the process alive.
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);
    result
}

async fn run(cli: Cli) -> Result<()> {
    let (config, config_path) = match &cli.config {
        Some(raw) => {
            let path = std::path::absolute(PathBuf::from(shellexpand::tilde(raw).into_owned()))?;
            (GantryConfig::load_from(&path)?, Some(path))
        }
        None => (GantryConfig::load()?, None),
    };
    init_logging(cli.verbose, config.log.format);

    let globals = Globals {
        ctx: AppContext::new(config),
        config_path,
        verbose: cli.verbose,
    };
    tracing::debug!(
        "🗂️ base={} runtime={} log={} id={}",
        globals.ctx.base_folder().display(),
        globals.ctx.runtime_folder().display(),
        globals.ctx.log_folder().display(),
        globals.ctx.app_id()
    );

    match cli.command {
        Command::App { action } => commands::app::run(action, &globals).await,
        Command::Cron { action } => commands::cron::run(action, &globals).await,
    }
}
