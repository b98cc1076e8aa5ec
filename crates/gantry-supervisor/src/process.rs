//! Liveness probes and termination for processes we only know by PID.

use std::time::Duration;

use gantry_core::{GantryError, Result};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::time::Instant;

/// Zero-signal probe. `EPERM` means the process exists under another user.
pub fn is_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Send SIGTERM. Returns `false` when the process was already gone.
pub fn terminate(pid: i32) -> Result<bool> {
    if pid <= 0 {
        return Err(GantryError::Signal(format!("refusing to signal pid {pid}")));
    }
    match kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(e) => Err(GantryError::Signal(format!("SIGTERM to {pid}: {e}"))),
    }
}

/// Poll until `pid` exits or `timeout` elapses. Returns whether it exited.
pub async fn wait_for_exit(pid: i32, timeout: Duration, poll: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if !is_alive(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(poll).await;
    }
}
