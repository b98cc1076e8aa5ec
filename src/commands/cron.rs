//! `gantry cron ...`: the scheduler service.

use std::sync::Arc;

use anyhow::Result;
use clap::{ArgAction, Subcommand};
use gantry_core::GantryError;
use gantry_scheduler::{FileLease, Scheduler};
use gantry_supervisor::{ProcessKind, ProcessState, StopOutcome, Supervisor};

use super::Globals;
use crate::jobs;

#[derive(Subcommand)]
pub enum CronAction {
    /// Start the cron scheduler (foreground unless --daemon)
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
    },
    /// List registered cron jobs
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Stop the running cron scheduler
    Stop,
    /// Restart the cron scheduler in the background
    Restart,
    /// Show whether the cron scheduler is running
    State,
}

pub async fn run(action: CronAction, globals: &Globals) -> Result<()> {
    let ctx = &globals.ctx;
    let sup = Supervisor::new(ctx, ProcessKind::Cron);

    match action {
        CronAction::Start { daemon: true } => {
            let pid = sup.start_daemon(&globals.child_args(&["cron", "start", "--daemon=false"]))?;
            println!("cron service started, pid: {pid}");
            println!("log: {}", sup.log_path().display());
        }
        CronAction::Start { daemon: false } => {
            let registry = jobs::registry(ctx)?;
            let lease = FileLease::new(ctx.runtime_folder(), ctx.app_id());
            tracing::info!(
                "🔑 Lease holder {} in {}",
                lease.holder_id(),
                ctx.runtime_folder().display()
            );
            let scheduler = Scheduler::new(registry, Arc::new(lease));
            sup.run_foreground(|token| async move {
                scheduler.run(token).await;
                Ok::<(), GantryError>(())
            })
            .await?;
        }
        CronAction::List { json } => {
            let registry = jobs::registry(ctx)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&registry.summaries())?);
            } else if registry.is_empty() {
                println!("no cron jobs registered");
            } else {
                print!("{}", registry.render_table());
            }
        }
        CronAction::Stop => match sup.stop().await? {
            StopOutcome::NotRunning => println!("no cron service"),
            StopOutcome::AlreadyExited(pid) => {
                println!("cron service (pid {pid}) was not running, pid file cleared")
            }
            StopOutcome::Stopped(pid) => println!("cron service stopped, pid: {pid}"),
        },
        CronAction::Restart => {
            let pid = sup
                .restart(&globals.child_args(&["cron", "start", "--daemon=false"]))
                .await?;
            println!("cron service restarted, pid: {pid}");
        }
        CronAction::State => match sup.state()? {
            ProcessState::Running(pid) => println!("cron service running, pid: {pid}"),
            ProcessState::Stopped => println!("no cron service"),
        },
    }
    Ok(())
}
