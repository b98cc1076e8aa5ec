//! Two scheduler instances sharing one runtime folder must never both run
//! the same distributed job inside one lease window.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use gantry_scheduler::{CronRegistry, FileLease, Job, JobResult, ScheduleEntry, Scheduler};
use tokio_util::sync::CancellationToken;

type Runs = Arc<Mutex<Vec<(String, Instant)>>>;

fn node(dir: &std::path::Path, id: &str, runs: &Runs) -> Scheduler {
    let job = {
        let runs = runs.clone();
        let id = id.to_string();
        Job::new(move || {
            let runs = runs.clone();
            let id = id.clone();
            async move {
                runs.lock().unwrap().push((id, Instant::now()));
                JobResult::Ok(())
            }
        })
    };
    let mut registry = CronRegistry::new();
    registry
        .register(ScheduleEntry::distributed(
            "foo_func",
            "*/1 * * * * *",
            Duration::from_secs(2),
            job,
        ))
        .unwrap();
    Scheduler::new(registry, Arc::new(FileLease::new(dir, id)))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_nodes_share_one_lease() {
    let dir = tempfile::tempdir().unwrap();
    let runs: Runs = Arc::default();
    let token = CancellationToken::new();

    let started = Instant::now();
    let a = tokio::spawn(node(dir.path(), "node-a", &runs).run(token.clone()));
    let b = tokio::spawn(node(dir.path(), "node-b", &runs).run(token.clone()));

    tokio::time::sleep(Duration::from_millis(5200)).await;
    token.cancel();
    a.await.unwrap();
    b.await.unwrap();

    let elapsed_ticks = started.elapsed().as_secs() as usize;
    let runs = runs.lock().unwrap();
    assert!(!runs.is_empty(), "someone must win the lease");
    assert!(
        runs.len() <= elapsed_ticks,
        "{} runs in {} ticks",
        runs.len(),
        elapsed_ticks
    );

    // One winner per tick: no two runs land on the same second.
    let mut at: Vec<Instant> = runs.iter().map(|(_, t)| *t).collect();
    at.sort();
    for pair in at.windows(2) {
        assert!(
            pair[1].duration_since(pair[0]) >= Duration::from_millis(900),
            "two runs inside one window: {runs:?}"
        );
    }
}
