//! Signal-driven graceful shutdown.

use std::future::Future;
use std::time::Duration;

use gantry_core::{GantryError, Result};
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

/// Install handlers for SIGINT, SIGTERM and SIGQUIT.
///
/// Returns a `CancellationToken` cancelled on the first signal received.
/// Workloads watch the token, stop taking new work and drain.
pub fn install_shutdown_handler() -> Result<CancellationToken> {
    let listen = |kind: SignalKind, name: &str| {
        signal(kind).map_err(|e| GantryError::Signal(format!("failed to install {name} handler: {e}")))
    };
    let mut sigterm = listen(SignalKind::terminate(), "SIGTERM")?;
    let mut sigint = listen(SignalKind::interrupt(), "SIGINT")?;
    let mut sigquit = listen(SignalKind::quit(), "SIGQUIT")?;

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
            _ = sigquit.recv() => "SIGQUIT",
        };
        tracing::info!("🛑 Received {name}, initiating graceful shutdown");
        trigger.cancel();
    });

    Ok(token)
}

/// Drive `work` until it finishes. Once `token` is cancelled, `work` gets
/// `close_wait` more to finish; past that it is dropped and an error returned.
pub async fn run_until_shutdown<F>(
    work: F,
    token: &CancellationToken,
    close_wait: Duration,
) -> Result<F::Output>
where
    F: Future,
{
    tokio::pin!(work);
    tokio::select! {
        out = &mut work => return Ok(out),
        _ = token.cancelled() => {}
    }

    tracing::info!("⏳ Waiting up to {}s for in-flight work", close_wait.as_secs());
    tokio::time::timeout(close_wait, work)
        .await
        .map_err(|_| GantryError::ShutdownTimeout {
            secs: close_wait.as_secs(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test]
    async fn test_work_finishing_first_is_returned() {
        let token = CancellationToken::new();
        let out = run_until_shutdown(async { 7 }, &token, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(out, 7);
    }

    #[tokio::test]
    async fn test_drain_within_deadline() {
        let token = CancellationToken::new();
        let work = {
            let token = token.clone();
            async move {
                token.cancelled().await;
                tokio::time::sleep(Duration::from_millis(100)).await;
                "drained"
            }
        };
        token.cancel();
        let out = run_until_shutdown(work, &token, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(out, "drained");
    }

    #[tokio::test]
    async fn test_deadline_exceeded_is_error() {
        let token = CancellationToken::new();
        let work = {
            let token = token.clone();
            async move {
                token.cancelled().await;
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        };

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let err = run_until_shutdown(work, &token, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, GantryError::ShutdownTimeout { secs: 1 }));
        // The full close wait elapses after cancellation, and no more.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(1), "gave up after {elapsed:?}");
        assert!(elapsed < Duration::from_secs(3), "gave up after {elapsed:?}");
    }

    #[tokio::test]
    async fn test_handler_installs() {
        let token = install_shutdown_handler().unwrap();
        assert!(!token.is_cancelled());
    }
}
