//! `gantry app ...`: the HTTP service.

use anyhow::Result;
use clap::{ArgAction, Subcommand};
use gantry_gateway::AppState;
use gantry_supervisor::{ProcessKind, ProcessState, StopOutcome, Supervisor};

use super::Globals;
use crate::jobs;

#[derive(Subcommand)]
pub enum AppAction {
    /// Start the app service
    Start {
        /// Run in the background (`--daemon=false` forces foreground)
        #[arg(
            short,
            long,
            action = ArgAction::Set,
            num_args = 0..=1,
            require_equals = true,
            default_value = "false",
            default_missing_value = "true"
        )]
        daemon: bool,

        /// Listen address, e.g. `:8888` or `127.0.0.1:9000`
        #[arg(long)]
        address: Option<String>,
    },
    /// Stop the running app service
    Stop,
    /// Restart the app service in the background
    Restart {
        #[arg(long)]
        address: Option<String>,
    },
    /// Show whether the app service is running
    State,
}

pub async fn run(action: AppAction, globals: &Globals) -> Result<()> {
    let ctx = &globals.ctx;
    let sup = Supervisor::new(ctx, ProcessKind::App);

    match action {
        AppAction::Start { daemon, address } => {
            let addr = ctx.config().resolve_address(address.as_deref());
            if daemon {
                let args = globals.child_args(&["app", "start", "--daemon=false", "--address", addr.as_str()]);
                let pid = sup.start_daemon(&args)?;
                println!("app service started, pid: {pid}");
                println!("log: {}", sup.log_path().display());
                return Ok(());
            }

            let catalog = jobs::registry(ctx)?.summaries();
            let state = AppState::new(ctx, catalog);
            sup.run_foreground(|token| gantry_gateway::serve(&addr, state, token))
                .await?;
        }
        AppAction::Stop => match sup.stop().await? {
            StopOutcome::NotRunning => println!("no app service"),
            StopOutcome::AlreadyExited(pid) => {
                println!("app service (pid {pid}) was not running, pid file cleared")
            }
            StopOutcome::Stopped(pid) => println!("app service stopped, pid: {pid}"),
        },
        AppAction::Restart { address } => {
            let addr = ctx.config().resolve_address(address.as_deref());
            let args = globals.child_args(&["app", "start", "--daemon=false", "--address", addr.as_str()]);
            let pid = sup.restart(&args).await?;
            println!("app service restarted, pid: {pid}");
        }
        AppAction::State => match sup.state()? {
            ProcessState::Running(pid) => println!("app service running, pid: {pid}"),
            ProcessState::Stopped => println!("no app service"),
        },
    }
    Ok(())
}
