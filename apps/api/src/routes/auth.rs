//! Authentication endpoints: login, logout, logout-all.
//!
//! Login verifies credentials, issues a JWT, and registers the token id
//! with the revocation store so it can be invalidated later. Logout
//! blacklists the presented token; logout-all sweeps every live token
//! the user holds.

use argon2::password_hash::PasswordHash;
use argon2::{Argon2, PasswordVerifier};
use axum::extract::State;
use axum::Json;
use meridian_core::AuditEntry;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    let config = &state.config;

    let Some(hash) = &config.admin_password_hash else {
        warn!("login attempted but no admin password hash is configured");
        return Err(ApiError::InvalidCredentials);
    };

    if body.username != config.admin_username {
        return Err(ApiError::InvalidCredentials);
    }

    let parsed = PasswordHash::new(hash)
        .map_err(|e| ApiError::Internal(format!("Malformed password hash: {}", e)))?;
    if Argon2::default()
        .verify_password(body.password.as_bytes(), &parsed)
        .is_err()
    {
        return Err(ApiError::InvalidCredentials);
    }

    let issued = state
        .jwt
        .generate_token(config.admin_user_id, &config.admin_username)?;

    state
        .revocation
        .track_user_token(
            &config.admin_user_id.to_string(),
            &issued.token_id,
            issued.expires_at,
        )
        .await?;

    record_audit(
        &state,
        AuditEntry::new("LOGIN", "auth")
            .with_user(config.admin_user_id, &config.admin_username),
    )
    .await;

    info!(user = %config.admin_username, "login succeeded");

    Ok(Json(json!({
        "success": true,
        "token": issued.token,
        "expiresAt": issued.expires_at.to_rfc3339(),
    })))
}

/// POST /api/auth/logout
///
/// Blacklists the presented token for its remaining lifetime.
pub async fn logout(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Value>, ApiError> {
    state
        .revocation
        .revoke(&user.token_id, user.token_expires_at)
        .await?;

    record_audit(
        &state,
        AuditEntry::new("LOGOUT", "auth").with_user(user.user_id, &user.user_name),
    )
    .await;

    Ok(Json(json!({ "success": true })))
}

/// POST /api/auth/logout-all
///
/// Revokes every live token tracked for the caller. Covers "log me out
/// everywhere" after a credential change or a lost device.
pub async fn logout_all(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Value>, ApiError> {
    let revoked = state
        .revocation
        .revoke_all_user_tokens(&user.user_id.to_string())
        .await?;

    record_audit(
        &state,
        AuditEntry::new("LOGOUT_ALL", "auth")
            .with_user(user.user_id, &user.user_name)
            .with_change(None, Some(format!("revoked {} tokens", revoked))),
    )
    .await;

    Ok(Json(json!({ "success": true, "revokedCount": revoked })))
}

/// Audit capture never blocks or fails the request it describes.
pub(crate) async fn record_audit(state: &AppState, entry: AuditEntry) {
    if let Err(err) = state.audit.enqueue(&entry).await {
        warn!(error = %err, action = %entry.action, "failed to enqueue audit entry");
    }
}
