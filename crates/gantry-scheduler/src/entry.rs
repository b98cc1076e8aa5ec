//! Schedule entries, the data model for registered jobs.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use gantry_core::Overlap;
use serde::{Deserialize, Serialize};

/// Outcome of one job invocation. Errors are logged, never propagated.
pub type JobResult = anyhow::Result<()>;

/// Who runs an entry on a given tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Every node runs it.
    Local,
    /// Only the node holding the job's lease runs it.
    Distributed,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Distributed => write!(f, "distributed"),
        }
    }
}

/// The callable bound to an entry.
#[derive(Clone)]
pub enum Job {
    /// Runs on the async runtime.
    Async(Arc<dyn Fn() -> BoxFuture<'static, JobResult> + Send + Sync>),
    /// Runs on a dedicated thread.
    Blocking(Arc<dyn Fn() -> JobResult + Send + Sync>),
}

impl Job {
    /// Wrap an async closure.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobResult> + Send + 'static,
    {
        Self::Async(Arc::new(move || Box::pin(f())))
    }

    /// Wrap a synchronous closure.
    pub fn blocking<F>(f: F) -> Self
    where
        F: Fn() -> JobResult + Send + Sync + 'static,
    {
        Self::Blocking(Arc::new(f))
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Async(_) => write!(f, "Job::Async"),
            Self::Blocking(_) => write!(f, "Job::Blocking"),
        }
    }
}

/// One registered job. Immutable once registered.
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    pub kind: JobKind,
    /// Expression as written by the caller.
    pub expression: String,
    /// Stable identifier. For distributed entries this is also the lease name.
    pub job_name: String,
    /// Catalog text shown by `cron list`.
    pub description: String,
    /// How long a lease winner keeps ownership. Distributed entries only.
    pub hold: Option<Duration>,
    /// Per-entry overlap policy; `None` defers to the registry default.
    pub overlap: Option<Overlap>,
    pub job: Job,
}

impl ScheduleEntry {
    /// Create a job every node runs.
    pub fn local(job_name: &str, expression: &str, job: Job) -> Self {
        Self {
            kind: JobKind::Local,
            expression: expression.to_string(),
            job_name: job_name.to_string(),
            description: String::new(),
            hold: None,
            overlap: None,
            job,
        }
    }

    /// Create a job only the lease winner runs.
    pub fn distributed(job_name: &str, expression: &str, hold: Duration, job: Job) -> Self {
        Self {
            kind: JobKind::Distributed,
            expression: expression.to_string(),
            job_name: job_name.to_string(),
            description: String::new(),
            hold: Some(hold),
            overlap: None,
            job,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_overlap(mut self, overlap: Overlap) -> Self {
        self.overlap = Some(overlap);
        self
    }

    /// Lease name for distributed entries.
    pub fn lease_name(&self) -> Option<&str> {
        match self.kind {
            JobKind::Distributed => Some(&self.job_name),
            JobKind::Local => None,
        }
    }
}

/// Serializable catalog row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySummary {
    pub kind: JobKind,
    pub expression: String,
    pub job: String,
    pub description: String,
    pub lease: Option<String>,
    /// Lease hold; registration only accepts whole seconds.
    pub hold_secs: Option<u64>,
}

impl From<&ScheduleEntry> for EntrySummary {
    fn from(entry: &ScheduleEntry) -> Self {
        Self {
            kind: entry.kind,
            expression: entry.expression.clone(),
            job: entry.job_name.clone(),
            description: entry.description.clone(),
            lease: entry.lease_name().map(str::to_string),
            hold_secs: entry.hold.map(|h| h.as_secs()),
        }
    }
}
