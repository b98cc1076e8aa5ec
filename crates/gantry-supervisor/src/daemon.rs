//! Daemonization by re-exec: the parent spawns a detached copy of itself
//! with output redirected to a log file, then returns.

use std::fs::OpenOptions;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};

use gantry_core::Result;

/// Spawn `program args...` in its own process group with stdin closed and
/// stdout/stderr appended to `log_path`. Returns the child PID.
pub fn spawn_detached(program: &Path, args: &[String], log_path: &Path) -> Result<u32> {
    let log = OpenOptions::new().create(true).append(true).open(log_path)?;
    let err = log.try_clone()?;

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(log)
        .stderr(err)
        .process_group(0)
        .spawn()?;

    tracing::debug!("🚀 Spawned detached {} (pid={})", program.display(), child.id());
    Ok(child.id())
}

/// Re-execute the current binary detached.
pub fn reexec(args: &[String], log_path: &Path) -> Result<u32> {
    let exe = std::env::current_exe()?;
    spawn_detached(&exe, args, log_path)
}
