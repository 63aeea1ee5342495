//! HTTP route handlers.

pub mod auth;
pub mod numbering;

use axum::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Liveness probe. Reports queue depth so operators can spot a stuck
/// drain worker from the outside.
pub async fn health(state: axum::extract::State<AppState>) -> Json<Value> {
    let queue_depth = state.audit.len().await.ok();
    Json(json!({
        "status": "ok",
        "auditQueueDepth": queue_depth,
    }))
}
