//! HTTP server implementation using Axum.

use std::sync::Arc;

use axum::{Router, routing::get};
use chrono::{DateTime, Utc};
use gantry_core::{AppContext, GantryError, Result};
use gantry_scheduler::EntrySummary;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Shared state for the HTTP server.
#[derive(Debug, Clone)]
pub struct AppState {
    pub name: String,
    pub app_id: String,
    pub started_at: DateTime<Utc>,
    pub start_time: std::time::Instant,
    /// Catalog of the cron entries this binary registers.
    pub cron_entries: Arc<Vec<EntrySummary>>,
}

impl AppState {
    pub fn new(ctx: &AppContext, cron_entries: Vec<EntrySummary>) -> Self {
        Self {
            name: ctx.config().app.name.clone(),
            app_id: ctx.app_id().to_string(),
            started_at: Utc::now(),
            start_time: std::time::Instant::now(),
            cron_entries: Arc::new(cron_entries),
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(super::routes::health_check))
        .route("/api/v1/info", get(super::routes::system_info))
        .route("/api/v1/cron/entries", get(super::routes::cron_entries))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Bind `addr` and serve until `token` is cancelled.
pub async fn serve(addr: &str, state: AppState, token: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| GantryError::server(format!("cannot bind {addr}: {e}")))?;
    serve_listener(listener, state, token).await
}

/// Serve on an already bound listener. In-flight requests finish after
/// cancellation; new connections are refused.
pub async fn serve_listener(
    listener: TcpListener,
    state: AppState,
    token: CancellationToken,
) -> Result<()> {
    let local = listener.local_addr()?;
    tracing::info!("🌐 Gateway server listening on http://{}", local);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await
        .map_err(|e| GantryError::server(e.to_string()))?;

    tracing::info!("🌐 Gateway server on {} stopped", local);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use gantry_scheduler::{JobKind, Job, ScheduleEntry};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tower::ServiceExt;

    fn state() -> AppState {
        let ctx = AppContext::with_base("/tmp/gantry-gateway-test", "node-a");
        let entry = ScheduleEntry::distributed(
            "foo_func",
            "*/1 * * * * *",
            std::time::Duration::from_secs(2),
            Job::blocking(|| Ok(())),
        );
        AppState::new(&ctx, vec![EntrySummary::from(&entry)])
    }

    async fn get_json(uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = build_router(state())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, json) = get_json("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_info_reports_identity() {
        let (status, json) = get_json("/api/v1/info").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["app_id"], "node-a");
        assert_eq!(json["name"], "gantry");
        assert_eq!(json["pid"], std::process::id());
    }

    #[tokio::test]
    async fn test_cron_entries_catalog() {
        let (status, json) = get_json("/api/v1/cron/entries").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 1);
        let entry: EntrySummary = serde_json::from_value(json["entries"][0].clone()).unwrap();
        assert_eq!(entry.kind, JobKind::Distributed);
        assert_eq!(entry.job, "foo_func");
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let (status, _) = get_json("/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_serve_until_cancelled() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let token = CancellationToken::new();
        let server = tokio::spawn(serve_listener(listener, state(), token.clone()));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");

        token.cancel();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure_is_server_error() {
        let err = serve("256.0.0.1:1", state(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GantryError::Server(_)));
    }
}
