//! Document numbering endpoint.
//!
//! Sequence generation is a read-modify-write over the shared store,
//! so it runs inside a distributed lock: exactly one API instance
//! advances a given rule's counter at a time, and numbers are never
//! duplicated across instances.

use axum::extract::{Path, State};
use axum::Json;
use meridian_core::AuditEntry;
use serde_json::{json, Value};
use tracing::debug;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::routes::auth::record_audit;
use crate::state::AppState;

const SEQUENCE_PREFIX: &str = "seq:";

/// POST /api/numbering/{rule}/next
///
/// Returns the next number for a numbering rule (e.g. `ORDER`,
/// `INVOICE`). 409 when the lock cannot be obtained within the
/// configured wait window.
pub async fn next_number(
    State(state): State<AppState>,
    user: AuthUser,
    Path(rule): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if rule.is_empty() || !rule.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ApiError::BadRequest("Invalid numbering rule".to_string()));
    }

    let coord = &state.config.coord;
    let guard = state
        .locks
        .acquire(
            &format!("{SEQUENCE_PREFIX}{rule}"),
            coord.lock_default_ttl(),
            coord.lock_wait_timeout(),
            coord.lock_retry_interval(),
        )
        .await?
        .ok_or_else(|| {
            ApiError::Conflict("Could not generate document number, please retry".to_string())
        })?;

    let number = advance_sequence(&state, &rule).await;
    let released = guard.release().await;

    let number = number?;
    if let Ok(false) = released {
        debug!(rule, "sequence lock expired before release");
    }

    record_audit(
        &state,
        AuditEntry::new("NUMBER_GENERATED", "numbering")
            .with_user(user.user_id, &user.user_name)
            .with_target(rule.clone(), "numbering_rule")
            .with_change(None, Some(number.to_string())),
    )
    .await;

    Ok(Json(json!({
        "success": true,
        "ruleType": rule,
        "number": number,
    })))
}

/// Read-increment-write under the caller's lock.
async fn advance_sequence(state: &AppState, rule: &str) -> Result<i64, ApiError> {
    let key = format!("{SEQUENCE_PREFIX}{rule}:current");

    let current: i64 = match state.store.get(&key).await? {
        Some(raw) => raw
            .parse()
            .map_err(|_| ApiError::Internal(format!("Corrupt sequence value for {}", rule)))?,
        None => 0,
    };
    let next = current + 1;
    state.store.set(&key, &next.to_string(), None).await?;

    Ok(next)
}
