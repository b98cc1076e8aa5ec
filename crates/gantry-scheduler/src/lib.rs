//! # Gantry Scheduler
//!
//! Cron-style job scheduling for a fleet of identical nodes.
//!
//! ## Architecture
//! ```text
//! CronRegistry (validated at boot)
//!   ├── Local:       "*/5 * * * * *" → heartbeat      (every node)
//!   └── Distributed: "*/1 * * * * *" → foo_func       (lease winner only)
//!
//! Scheduler::run(token)
//!   ├── sleep until next fire / shutdown
//!   ├── Local       → spawn job
//!   ├── Distributed → FileLease::acquire → owner? spawn job : skip
//!   └── shutdown    → stop dispatching, drain in-flight jobs
//! ```

pub mod cron;
pub mod engine;
pub mod entry;
pub mod lease;
pub mod registry;

pub use cron::Expression;
pub use engine::Scheduler;
pub use entry::{EntrySummary, Job, JobKind, JobResult, ScheduleEntry};
pub use lease::{FileLease, LeaseCoordinator, LeaseOutcome};
pub use registry::CronRegistry;
