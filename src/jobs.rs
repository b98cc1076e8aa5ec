//! Jobs this binary schedules.

use std::time::Duration;

use gantry_core::{AppContext, Result};
use gantry_scheduler::{CronRegistry, Job, JobResult, ScheduleEntry};

/// Lease window for the distributed demo job.
const FOO_HOLD: Duration = Duration::from_secs(2);

/// Build the registry with every job, using the configured overlap default.
pub fn registry(ctx: &AppContext) -> Result<CronRegistry> {
    let mut registry = CronRegistry::with_overlap(ctx.config().cron.overlap);

    let node = ctx.app_id().to_string();
    registry.register(
        ScheduleEntry::local(
            "heartbeat",
            "*/30 * * * * *",
            Job::new(move || {
                let node = node.clone();
                async move {
                    tracing::info!("💓 {} alive", node);
                    JobResult::Ok(())
                }
            }),
        )
        .with_description("log node liveness every 30s"),
    )?;

    let node = ctx.app_id().to_string();
    registry.register(
        ScheduleEntry::distributed(
            "foo_func",
            "*/1 * * * * *",
            FOO_HOLD,
            Job::new(move || {
                let node = node.clone();
                async move {
                    tracing::info!("🦊 foo_func ran on {}", node);
                    JobResult::Ok(())
                }
            }),
        )
        .with_description("demo: one node per 2s window"),
    )?;

    Ok(registry)
}
