//! Rate limit interceptor.
//!
//! Counts each request against the quota for its endpoint class and
//! rejects with 429 once the window is exhausted. Every response,
//! allowed or not, carries the `X-RateLimit-*` headers.
//!
//! When the backing store is unreachable the limiter fails open: the
//! request proceeds uncounted. Losing rate limiting for the outage is
//! preferred over taking the whole API down with it.

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use meridian_core::resolve_identifier;
use serde_json::json;
use std::net::SocketAddr;
use tracing::warn;

use crate::auth::AuthUser;
use crate::state::AppState;

pub async fn enforce(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let quota = state.policy.quota_for(&path);

    let principal = req
        .extensions()
        .get::<AuthUser>()
        .map(|u| u.user_id.to_string());
    let forwarded_for = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let remote_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let identifier = resolve_identifier(
        principal.as_deref(),
        forwarded_for.as_deref(),
        &remote_addr,
    );

    let result = match state.rate_limiter.check(&identifier, &path, quota).await {
        Ok(result) => result,
        Err(err) => {
            // Fail open
            warn!(error = %err, path, "Rate limiter unavailable, allowing request");
            return next.run(req).await;
        }
    };

    if !result.allowed {
        warn!(identifier, path, current = result.current, "Rate limit exceeded");
        let body = json!({
            "success": false,
            "message": "Too many requests, please try again later",
            "retryAfter": result.retry_after_secs,
        });
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        apply_headers(&mut response, &result);
        if let Ok(value) = HeaderValue::from_str(&result.retry_after_secs.to_string()) {
            response.headers_mut().insert("Retry-After", value);
        }
        return response;
    }

    let mut response = next.run(req).await;
    apply_headers(&mut response, &result);
    response
}

fn apply_headers(response: &mut Response, result: &meridian_core::RateLimitResult) {
    let headers = response.headers_mut();
    let pairs = [
        ("X-RateLimit-Limit", result.limit.to_string()),
        ("X-RateLimit-Remaining", result.remaining.to_string()),
        ("X-RateLimit-Reset", result.resets_at.timestamp().to_string()),
    ];
    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
}
