//! API route handlers.

use std::sync::Arc;

use axum::{Json, extract::State};

use crate::server::AppState;

/// Liveness probe.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "gantry",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Node identity and uptime.
pub async fn system_info(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": state.name,
        "app_id": state.app_id,
        "version": env!("CARGO_PKG_VERSION"),
        "pid": std::process::id(),
        "platform": format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
        "started_at": state.started_at.to_rfc3339(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// Registered cron catalog.
pub async fn cron_entries(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "count": state.cron_entries.len(),
        "entries": state.cron_entries.as_slice(),
    }))
}
