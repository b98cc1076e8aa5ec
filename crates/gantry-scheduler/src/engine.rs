//! Scheduler engine: the dispatch loop that fires due entries.
//!
//! The loop sleeps until the earliest next fire time (or shutdown), then
//! spawns one task per due entry. Each invocation runs behind its own panic
//! boundary, so a failing job never takes the loop or its siblings down.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use futures::FutureExt;
use gantry_core::Overlap;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::cron::Expression;
use crate::entry::{Job, JobResult, ScheduleEntry};
use crate::lease::LeaseCoordinator;
use crate::registry::CronRegistry;

/// Sleep used when no entry has a future fire time.
const IDLE_WAIT: Duration = Duration::from_secs(60);

struct Slot {
    entry: Arc<ScheduleEntry>,
    expression: Expression,
    overlap: Overlap,
    next_fire: Option<DateTime<Local>>,
    running: Arc<AtomicUsize>,
}

/// Counts an invocation as running until dropped.
struct RunningGuard(Arc<AtomicUsize>);

impl RunningGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Owns the registered entries and their in-flight runs.
pub struct Scheduler {
    slots: Vec<Slot>,
    lease: Arc<dyn LeaseCoordinator>,
    in_flight: JoinSet<()>,
}

impl Scheduler {
    /// Build a scheduler whose first fire times follow the current time.
    pub fn new(registry: CronRegistry, lease: Arc<dyn LeaseCoordinator>) -> Self {
        Self::starting_at(registry, lease, Local::now())
    }

    /// Build a scheduler whose first fire times follow `now`.
    pub fn starting_at(
        registry: CronRegistry,
        lease: Arc<dyn LeaseCoordinator>,
        now: DateTime<Local>,
    ) -> Self {
        let (entries, default_overlap) = registry.into_parts();
        let slots = entries
            .into_iter()
            .map(|r| Slot {
                overlap: r.entry.overlap.unwrap_or(default_overlap),
                next_fire: r.expression.next_after(&now),
                entry: r.entry,
                expression: r.expression,
                running: Arc::new(AtomicUsize::new(0)),
            })
            .collect();
        Self {
            slots,
            lease,
            in_flight: JoinSet::new(),
        }
    }

    /// Number of scheduled entries.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Invocations spawned and not yet reaped.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Earliest upcoming fire time across all entries.
    pub fn next_fire(&self) -> Option<DateTime<Local>> {
        self.slots.iter().filter_map(|s| s.next_fire).min()
    }

    /// Dispatch every entry due at `now` and advance its fire time.
    /// Returns the names of the jobs that were dispatched.
    pub fn tick(&mut self, now: DateTime<Local>) -> Vec<String> {
        let mut dispatched = Vec::new();

        for slot in &mut self.slots {
            let Some(due) = slot.next_fire else { continue };
            if due > now {
                continue;
            }
            slot.next_fire = slot.expression.next_after(&now);

            if slot.overlap == Overlap::Skip && slot.running.load(Ordering::SeqCst) > 0 {
                tracing::info!(
                    "⏭️ Skipping '{}': previous run still in progress",
                    slot.entry.job_name
                );
                continue;
            }

            let entry = slot.entry.clone();
            let lease = self.lease.clone();
            let guard = RunningGuard::enter(&slot.running);
            dispatched.push(entry.job_name.clone());
            self.in_flight.spawn(async move {
                let _guard = guard;
                if let (Some(name), Some(hold)) = (entry.lease_name(), entry.hold) {
                    match lease.acquire(name, hold).await {
                        Ok(outcome) if outcome.owner => {}
                        Ok(outcome) => {
                            tracing::debug!(
                                "🔒 '{}' held by {} this window, skipping",
                                name,
                                outcome.holder
                            );
                            return;
                        }
                        Err(e) => {
                            tracing::warn!("⚠️ Skipping '{}': lease unavailable: {e}", name);
                            return;
                        }
                    }
                }
                invoke(&entry).await;
            });
        }

        self.reap();
        dispatched
    }

    /// Run until `token` is cancelled, then wait for in-flight jobs.
    pub async fn run(mut self, token: CancellationToken) {
        tracing::info!("⏰ Scheduler started ({} entries)", self.slots.len());

        loop {
            let delay = self
                .next_fire()
                .map(|at| (at - Local::now()).to_std().unwrap_or(Duration::ZERO))
                .unwrap_or(IDLE_WAIT);

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {
                    self.tick(Local::now());
                }
            }
        }

        tracing::info!(
            "🛑 Scheduler stopped dispatching, waiting for {} in-flight job(s)",
            self.in_flight()
        );
        self.drain().await;
        tracing::info!("👋 Scheduler drained");
    }

    /// Wait for every in-flight invocation to finish.
    pub async fn drain(&mut self) {
        while let Some(joined) = self.in_flight.join_next().await {
            if let Err(e) = joined {
                tracing::error!("❌ Job task aborted: {e}");
            }
        }
    }

    fn reap(&mut self) {
        while let Some(joined) = self.in_flight.try_join_next() {
            if let Err(e) = joined {
                tracing::error!("❌ Job task aborted: {e}");
            }
        }
    }
}

/// Run one invocation, containing errors and panics.
async fn invoke(entry: &ScheduleEntry) {
    let name = &entry.job_name;
    let started = Instant::now();

    let result: Result<JobResult, String> = match &entry.job {
        Job::Async(f) => AssertUnwindSafe(async { f().await })
            .catch_unwind()
            .await
            .map_err(|payload| panic_message(payload.as_ref())),
        // Detached thread: a dropped runtime still waits on `spawn_blocking` work.
        Job::Blocking(f) => {
            let f = f.clone();
            let (tx, rx) = tokio::sync::oneshot::channel();
            let spawned = std::thread::Builder::new().spawn(move || {
                let _ = tx.send(std::panic::catch_unwind(AssertUnwindSafe(|| f())));
            });
            match spawned {
                Ok(_) => match rx.await {
                    Ok(outcome) => outcome.map_err(|payload| panic_message(payload.as_ref())),
                    Err(_) => Err("job thread exited without a result".to_string()),
                },
                Err(e) => Err(format!("could not start job thread: {e}")),
            }
        }
    };

    match result {
        Ok(Ok(())) => tracing::debug!("✅ Job '{}' finished in {:?}", name, started.elapsed()),
        Ok(Err(e)) => tracing::error!("❌ Job '{}' failed: {e:#}", name),
        Err(msg) => tracing::error!("💥 Job '{}' panicked: {msg}", name),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lease::LeaseOutcome;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use gantry_core::{GantryError, Result};

    /// Coordinator with a fixed answer.
    struct FixedLease(Option<bool>);

    #[async_trait]
    impl LeaseCoordinator for FixedLease {
        async fn acquire(&self, name: &str, _hold: Duration) -> Result<LeaseOutcome> {
            match self.0 {
                Some(owner) => Ok(LeaseOutcome {
                    holder: "node-x".into(),
                    owner,
                }),
                None => Err(GantryError::lease(name, "disk on fire")),
            }
        }
    }

    async fn async_boom() -> JobResult {
        panic!("async boom")
    }

    fn t0() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 4, 10, 0, 0).unwrap()
    }

    fn secs(n: i64) -> DateTime<Local> {
        t0() + chrono::Duration::seconds(n)
    }

    fn counting(counter: &Arc<AtomicUsize>) -> Job {
        let counter = counter.clone();
        Job::new(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                JobResult::Ok(())
            }
        })
    }

    fn scheduler(registry: CronRegistry, lease: Option<bool>) -> Scheduler {
        Scheduler::starting_at(registry, Arc::new(FixedLease(lease)), t0())
    }

    #[tokio::test]
    async fn test_local_job_fires_when_due() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut reg = CronRegistry::new();
        reg.register(ScheduleEntry::local("every", "*/1 * * * * *", counting(&hits)))
            .unwrap();
        let mut sched = scheduler(reg, Some(true));
        assert_eq!(sched.next_fire(), Some(secs(1)));

        assert!(sched.tick(t0()).is_empty());
        assert_eq!(sched.tick(secs(1)), ["every"]);
        assert_eq!(sched.next_fire(), Some(secs(2)));
        sched.drain().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_affect_siblings() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut reg = CronRegistry::new();
        reg.register(ScheduleEntry::local(
            "async-boom",
            "*/1 * * * * *",
            Job::new(async_boom),
        ))
        .unwrap();
        reg.register(ScheduleEntry::local(
            "blocking-boom",
            "*/1 * * * * *",
            Job::blocking(|| panic!("blocking boom")),
        ))
        .unwrap();
        reg.register(ScheduleEntry::local(
            "failing",
            "*/1 * * * * *",
            Job::blocking(|| Err(anyhow::anyhow!("nope"))),
        ))
        .unwrap();
        reg.register(ScheduleEntry::local("healthy", "*/1 * * * * *", counting(&hits)))
            .unwrap();
        let mut sched = scheduler(reg, Some(true));

        assert_eq!(sched.tick(secs(1)).len(), 4);
        sched.drain().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // The loop keeps going after the panics.
        assert_eq!(sched.tick(secs(2)).len(), 4);
        sched.drain().await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }

    #[test]
    fn test_abandoned_blocking_job_does_not_hold_runtime_open() {
        let started = Instant::now();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let mut reg = CronRegistry::new();
            reg.register(ScheduleEntry::local(
                "slow",
                "*/1 * * * * *",
                Job::blocking(|| {
                    std::thread::sleep(Duration::from_secs(6));
                    Ok(())
                }),
            ))
            .unwrap();
            let mut sched = scheduler(reg, Some(true));
            sched.tick(secs(1));
            assert_eq!(sched.in_flight(), 1);

            // Give up waiting, as a shutdown deadline does.
            let drained = tokio::time::timeout(Duration::from_millis(300), sched.drain()).await;
            assert!(drained.is_err());
        });
        drop(runtime);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    async fn run_gated(overlap: Overlap) -> usize {
        let starts = Arc::new(AtomicUsize::new(0));
        let gate = CancellationToken::new();
        let job = {
            let starts = starts.clone();
            let gate = gate.clone();
            Job::new(move || {
                let starts = starts.clone();
                let gate = gate.clone();
                async move {
                    starts.fetch_add(1, Ordering::SeqCst);
                    gate.cancelled().await;
                    JobResult::Ok(())
                }
            })
        };
        let mut reg = CronRegistry::new();
        reg.register(ScheduleEntry::local("slow", "*/1 * * * * *", job).with_overlap(overlap))
            .unwrap();
        let mut sched = scheduler(reg, Some(true));

        sched.tick(secs(1));
        sched.tick(secs(2));
        sched.tick(secs(3));
        gate.cancel();
        sched.drain().await;
        starts.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn test_overlap_allow_runs_concurrently() {
        assert_eq!(run_gated(Overlap::Allow).await, 3);
    }

    #[tokio::test]
    async fn test_overlap_skip_waits_for_previous_run() {
        assert_eq!(run_gated(Overlap::Skip).await, 1);
    }

    #[tokio::test]
    async fn test_registry_default_overlap_applies() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut reg = CronRegistry::with_overlap(Overlap::Skip);
        reg.register(ScheduleEntry::local("a", "@hourly", counting(&hits)))
            .unwrap();
        reg.register(
            ScheduleEntry::local("b", "@hourly", counting(&hits)).with_overlap(Overlap::Allow),
        )
        .unwrap();
        let sched = scheduler(reg, Some(true));
        assert_eq!(sched.slots[0].overlap, Overlap::Skip);
        assert_eq!(sched.slots[1].overlap, Overlap::Allow);
    }

    async fn distributed_hits(lease: Option<bool>) -> usize {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut reg = CronRegistry::new();
        reg.register(ScheduleEntry::distributed(
            "foo_func",
            "*/1 * * * * *",
            Duration::from_secs(2),
            counting(&hits),
        ))
        .unwrap();
        let mut sched = scheduler(reg, lease);
        assert_eq!(sched.tick(secs(1)), ["foo_func"]);
        sched.drain().await;
        hits.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn test_distributed_job_runs_only_for_owner() {
        assert_eq!(distributed_hits(Some(true)).await, 1);
        assert_eq!(distributed_hits(Some(false)).await, 0);
    }

    #[tokio::test]
    async fn test_lease_error_skips_tick() {
        assert_eq!(distributed_hits(None).await, 0);
    }

    #[tokio::test]
    async fn test_run_drains_in_flight_jobs_on_cancel() {
        let finished = Arc::new(AtomicUsize::new(0));
        let job = {
            let finished = finished.clone();
            Job::new(move || {
                let finished = finished.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(800)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                    JobResult::Ok(())
                }
            })
        };
        let mut reg = CronRegistry::new();
        reg.register(ScheduleEntry::local("slow", "@every 1s", job).with_overlap(Overlap::Skip))
            .unwrap();

        let token = CancellationToken::new();
        let sched = Scheduler::new(reg, Arc::new(FixedLease(Some(true))));
        let handle = tokio::spawn(sched.run(token.clone()));

        tokio::time::sleep(Duration::from_millis(1300)).await;
        token.cancel();
        handle.await.unwrap();
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_scheduler_exits_on_cancel() {
        let sched = Scheduler::new(CronRegistry::new(), Arc::new(FixedLease(Some(true))));
        assert!(sched.is_empty());
        let token = CancellationToken::new();
        token.cancel();
        sched.run(token).await;
    }
}
