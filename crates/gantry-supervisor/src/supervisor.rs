//! Service supervisor. Starts, stops and inspects the app and cron
//! processes, tracked through PID files in the runtime folder.

use std::future::Future;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use gantry_core::{AppContext, GantryError, Result};
use tokio_util::sync::CancellationToken;

use crate::pidfile::PidFile;
use crate::{daemon, process, shutdown};

/// Which long-running service a supervisor manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessKind {
    /// HTTP server.
    App,
    /// Cron scheduler.
    Cron,
}

impl ProcessKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::App => "app",
            Self::Cron => "cron",
        }
    }

    pub fn pid_file_name(self) -> String {
        format!("{}.pid", self.name())
    }

    pub fn log_file_name(self) -> String {
        format!("{}.log", self.name())
    }
}

impl std::fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What the PID file says, confirmed against the process table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running(i32),
    Stopped,
}

/// Outcome of a `stop` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// PID file was empty or missing.
    NotRunning,
    /// Recorded process was already gone; PID file cleared.
    AlreadyExited(i32),
    /// Process exited after SIGTERM.
    Stopped(i32),
}

pub struct Supervisor {
    kind: ProcessKind,
    runtime_dir: PathBuf,
    log_dir: PathBuf,
    close_wait: Duration,
    poll_interval: Duration,
}

impl Supervisor {
    pub fn new(ctx: &AppContext, kind: ProcessKind) -> Self {
        Self {
            kind,
            runtime_dir: ctx.runtime_folder().to_path_buf(),
            log_dir: ctx.log_folder().to_path_buf(),
            close_wait: Duration::from_secs(ctx.config().app.close_wait),
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn with_close_wait(mut self, close_wait: Duration) -> Self {
        self.close_wait = close_wait;
        self
    }

    /// Liveness poll interval used by `stop`.
    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll_interval = poll;
        self
    }

    pub fn pid_file(&self) -> PidFile {
        PidFile::new(self.runtime_dir.join(self.kind.pid_file_name()))
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_dir.join(self.kind.log_file_name())
    }

    /// Create the runtime and log folders (mode 0755).
    pub fn prepare_dirs(&self) -> Result<()> {
        for dir in [&self.runtime_dir, &self.log_dir] {
            create_dir(dir)?;
        }
        Ok(())
    }

    /// Read-only status check.
    pub fn state(&self) -> Result<ProcessState> {
        Ok(match self.pid_file().read()? {
            Some(pid) if process::is_alive(pid) => ProcessState::Running(pid),
            _ => ProcessState::Stopped,
        })
    }

    fn ensure_not_running(&self) -> Result<()> {
        if let ProcessState::Running(pid) = self.state()? {
            return Err(GantryError::pid_file(
                self.pid_file().path(),
                format!("{} already running with pid {pid}", self.kind),
            ));
        }
        Ok(())
    }

    /// Start detached: re-exec this binary with `child_args` and return its PID.
    pub fn start_daemon(&self, child_args: &[String]) -> Result<u32> {
        self.prepare_dirs()?;
        self.ensure_not_running()?;

        let log_path = self.log_path();
        let pid = daemon::reexec(child_args, &log_path)?;
        self.pid_file().write(pid)?;
        tracing::info!(
            "🚀 {} started in background (pid={}, log={})",
            self.kind,
            pid,
            log_path.display()
        );
        Ok(pid)
    }

    /// Start in the foreground with SIGINT/SIGTERM/SIGQUIT wired to shutdown.
    pub async fn run_foreground<F, Fut>(&self, workload: F) -> Result<()>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let token = shutdown::install_shutdown_handler()?;
        self.run_foreground_with(token, workload).await
    }

    /// Foreground run driven by an externally owned token.
    pub async fn run_foreground_with<F, Fut>(
        &self,
        token: CancellationToken,
        workload: F,
    ) -> Result<()>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.prepare_dirs()?;
        let pid_file = self.pid_file();
        let me = std::process::id();
        // A daemon parent records our PID before we get here.
        match self.state()? {
            ProcessState::Running(pid) if pid as u32 != me => {
                return Err(GantryError::pid_file(
                    pid_file.path(),
                    format!("{} already running with pid {pid}", self.kind),
                ));
            }
            _ => pid_file.write(me)?,
        }
        tracing::info!("🟢 {} running (pid={})", self.kind, me);

        let result = shutdown::run_until_shutdown(workload(token.clone()), &token, self.close_wait)
            .await
            .and_then(|r| r);

        if pid_file.read().ok().flatten() == Some(me as i32) {
            pid_file.clear()?;
        }
        match &result {
            Ok(()) => tracing::info!("👋 {} exited", self.kind),
            Err(e) => tracing::error!("❌ {} exited with error: {e}", self.kind),
        }
        result
    }

    /// SIGTERM the recorded process and wait up to `2 * close_wait`.
    pub async fn stop(&self) -> Result<StopOutcome> {
        let pid_file = self.pid_file();
        let Some(pid) = pid_file.read()? else {
            tracing::info!("💤 No {} service recorded", self.kind);
            return Ok(StopOutcome::NotRunning);
        };

        if !process::terminate(pid)? {
            pid_file.clear()?;
            tracing::info!("🧹 {} (pid={}) already exited", self.kind, pid);
            return Ok(StopOutcome::AlreadyExited(pid));
        }
        tracing::info!("⏹️ Sent SIGTERM to {} (pid={})", self.kind, pid);

        let budget = self.close_wait * 2;
        if !process::wait_for_exit(pid, budget, self.poll_interval).await {
            return Err(GantryError::ProcessSurvived {
                pid,
                waited_secs: budget.as_secs(),
            });
        }
        pid_file.clear()?;
        tracing::info!("✅ {} stopped (pid={})", self.kind, pid);
        Ok(StopOutcome::Stopped(pid))
    }

    /// `stop`, then start detached. Aborts if the old process survives.
    pub async fn restart(&self, child_args: &[String]) -> Result<u32> {
        self.stop().await?;
        self.start_daemon(child_args)
    }
}

fn create_dir(dir: &Path) -> Result<()> {
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o755)
        .create(dir)
        .map_err(|e| GantryError::config(format!("cannot create {}: {e}", dir.display())))
}
