//! # Gantry Supervisor
//!
//! Lifecycle for long-running Gantry services: PID files, daemonization by
//! re-exec, liveness probes and signal-driven graceful shutdown.

pub mod daemon;
pub mod pidfile;
pub mod process;
pub mod shutdown;
pub mod supervisor;

pub use pidfile::PidFile;
pub use shutdown::{install_shutdown_handler, run_until_shutdown};
pub use supervisor::{ProcessKind, ProcessState, StopOutcome, Supervisor};
