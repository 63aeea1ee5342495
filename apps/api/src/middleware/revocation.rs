//! Token revocation interceptor.
//!
//! Validates the bearer token (signature + expiry), rejects tokens on
//! the revocation blacklist, and inserts the authenticated principal
//! into request extensions for downstream handlers. Requests without an
//! Authorization header pass through unauthenticated; handlers that
//! need a principal reject them individually.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::auth::{extract_bearer_token, AuthUser};
use crate::error::ApiError;
use crate::state::AppState;

pub async fn check(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let Some(token) = header.and_then(extract_bearer_token) else {
        return next.run(req).await;
    };

    let claims = match state.jwt.validate_token(token) {
        Ok(claims) => claims,
        Err(err) => return err.into_response(),
    };

    // Fail closed: a token we cannot check against the blacklist is not
    // accepted.
    match state.revocation.is_revoked(&claims.jti).await {
        Ok(true) => {
            return ApiError::Unauthorized("Token has been revoked".to_string()).into_response();
        }
        Ok(false) => {}
        Err(err) => {
            warn!(error = %err, "Revocation check unavailable, rejecting request");
            return ApiError::Unauthorized("Could not verify token status".to_string())
                .into_response();
        }
    }

    let user = match AuthUser::from_claims(&claims) {
        Ok(user) => user,
        Err(err) => return err.into_response(),
    };
    req.extensions_mut().insert(user);

    next.run(req).await
}
